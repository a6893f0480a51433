//! NetFlow v5: 24-byte header, fixed 48-byte records, `count` records (§4.6).
//!
//! Decoded with `nom-derive` (`Header`, `FlowSet`) for the fixed 24-byte
//! header and 48-byte record layout, same sampling-interval bit split as the
//! wire format requires. Each typed `FlowSet` record is then projected into a
//! canonical-name [`crate::packet::FlowRecord`] so v5 output looks like
//! v9/IPFIX output per §6's uniform schema.

use nom::number::complete::be_u32;
use nom_derive::*;
use serde::Serialize;
use Nom;

use std::net::Ipv4Addr;

use crate::error::DecodeError;
use crate::field_value::FieldValue;
use crate::packet::{ExportPacket, FlowRecord, HeaderV5};
use crate::protocol::ProtocolTypes;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
struct WireHeader {
    #[nom(Value = "5")]
    version: u16,
    count: u16,
    sys_up_time: u32,
    unix_secs: u32,
    unix_nsecs: u32,
    flow_sequence: u32,
    engine_type: u8,
    engine_id: u8,
    sampling_interval: u16,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Nom)]
struct WireRecord {
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    src_addr: Ipv4Addr,
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    dst_addr: Ipv4Addr,
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    next_hop: Ipv4Addr,
    input: u16,
    output: u16,
    d_pkts: u32,
    d_octets: u32,
    first: u32,
    last: u32,
    src_port: u16,
    dst_port: u16,
    pad1: u8,
    tcp_flags: u8,
    protocol_number: u8,
    #[nom(Value(ProtocolTypes::from(protocol_number)))]
    #[serde(skip)]
    _protocol_type: ProtocolTypes,
    tos: u8,
    src_as: u16,
    dst_as: u16,
    src_mask: u8,
    dst_mask: u8,
    pad2: u16,
}

#[derive(Debug, Clone, Nom)]
struct Wire {
    header: WireHeader,
    #[nom(Count = "header.count")]
    records: Vec<WireRecord>,
}

fn record_to_flow(r: &WireRecord) -> FlowRecord {
    let mut flow = FlowRecord::new();
    flow.insert("IPV4_SRC_ADDR".into(), FieldValue::Ipv4(r.src_addr));
    flow.insert("IPV4_DST_ADDR".into(), FieldValue::Ipv4(r.dst_addr));
    flow.insert("IPV4_NEXT_HOP".into(), FieldValue::Ipv4(r.next_hop));
    flow.insert("INPUT_SNMP".into(), FieldValue::U16(r.input));
    flow.insert("OUTPUT_SNMP".into(), FieldValue::U16(r.output));
    flow.insert("IN_PKTS".into(), FieldValue::U32(r.d_pkts));
    flow.insert("IN_BYTES".into(), FieldValue::U32(r.d_octets));
    flow.insert("FIRST_SWITCHED".into(), FieldValue::U32(r.first));
    flow.insert("LAST_SWITCHED".into(), FieldValue::U32(r.last));
    flow.insert("L4_SRC_PORT".into(), FieldValue::U16(r.src_port));
    flow.insert("L4_DST_PORT".into(), FieldValue::U16(r.dst_port));
    flow.insert("TCP_FLAGS".into(), FieldValue::U8(r.tcp_flags));
    flow.insert("PROTOCOL".into(), FieldValue::U8(r.protocol_number));
    flow.insert("SRC_TOS".into(), FieldValue::U8(r.tos));
    flow.insert("SRC_AS".into(), FieldValue::U16(r.src_as));
    flow.insert("DST_AS".into(), FieldValue::U16(r.dst_as));
    flow.insert("SRC_MASK".into(), FieldValue::U8(r.src_mask));
    flow.insert("DST_MASK".into(), FieldValue::U8(r.dst_mask));
    flow
}

/// Decodes one v5 datagram. No template registry interaction (§4.6).
pub fn parse(data: &[u8]) -> Result<ExportPacket, DecodeError> {
    let (_, wire) = Wire::parse(data).map_err(|_| DecodeError::Truncated)?;

    let header = HeaderV5 {
        version: wire.header.version,
        count: wire.header.count,
        sys_uptime: wire.header.sys_up_time,
        unix_secs: wire.header.unix_secs,
        unix_nsecs: wire.header.unix_nsecs,
        flow_sequence: wire.header.flow_sequence,
        engine_type: wire.header.engine_type,
        engine_id: wire.header.engine_id,
        sampling_interval: wire.header.sampling_interval,
    };

    let flows = wire.records.iter().map(record_to_flow).collect();

    Ok(ExportPacket::V5 { header, flows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[172, 17, 0, 2]); // src_addr
        buf.extend_from_slice(&[172, 17, 0, 3]); // dst_addr
        buf.extend_from_slice(&[0, 0, 0, 0]); // next_hop
        buf.extend_from_slice(&0u16.to_be_bytes()); // input
        buf.extend_from_slice(&0u16.to_be_bytes()); // output
        buf.extend_from_slice(&1u32.to_be_bytes()); // d_pkts
        buf.extend_from_slice(&40u32.to_be_bytes()); // d_octets
        buf.extend_from_slice(&0u32.to_be_bytes()); // first
        buf.extend_from_slice(&0u32.to_be_bytes()); // last
        buf.extend_from_slice(&12345u16.to_be_bytes()); // src_port
        buf.extend_from_slice(&80u16.to_be_bytes()); // dst_port
        buf.push(0); // pad1
        buf.push(0); // tcp_flags
        buf.push(1); // protocol = ICMP
        buf.push(0); // tos
        buf.extend_from_slice(&0u16.to_be_bytes()); // src_as
        buf.extend_from_slice(&0u16.to_be_bytes()); // dst_as
        buf.push(0); // src_mask
        buf.push(0); // dst_mask
        buf.extend_from_slice(&0u16.to_be_bytes()); // pad2
    }

    #[test]
    fn decodes_header_and_records_in_order() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u16.to_be_bytes());
        buf.extend_from_slice(&3u16.to_be_bytes()); // count = 3
        buf.extend_from_slice(&0u32.to_be_bytes()); // sys_up_time
        buf.extend_from_slice(&0u32.to_be_bytes()); // unix_secs
        buf.extend_from_slice(&0u32.to_be_bytes()); // unix_nsecs
        buf.extend_from_slice(&42u32.to_be_bytes()); // flow_sequence
        buf.push(0); // engine_type
        buf.push(0); // engine_id
        buf.extend_from_slice(&0u16.to_be_bytes()); // sampling_interval
        for _ in 0..3 {
            sample_record(&mut buf);
        }

        let packet = parse(&buf).unwrap();
        assert_eq!(packet.version(), 5);
        assert_eq!(packet.flows().len(), 3);
        assert_eq!(
            packet.flows()[0].get("IPV4_SRC_ADDR"),
            Some(&FieldValue::Ipv4(Ipv4Addr::new(172, 17, 0, 2)))
        );
        assert_eq!(packet.flows()[0].get("PROTOCOL"), Some(&FieldValue::U8(1)));
    }

    #[test]
    fn truncated_buffer_fails() {
        let buf = [0u8; 10];
        assert!(matches!(parse(&buf), Err(DecodeError::Truncated)));
    }
}
