//! NetFlow v1: 16-byte header, fixed 48-byte records, `count` records (§4.6).
//!
//! Decoded in the same `nom-derive` idiom as [`crate::static_versions::v5`],
//! reusing [`crate::protocol::ProtocolTypes`] for the protocol-number field.
//! v1 predates AS/mask/sampling fields entirely, so its record is a strict
//! subset of v5's.

use nom::number::complete::be_u32;
use nom_derive::*;
use serde::Serialize;
use Nom;

use std::net::Ipv4Addr;

use crate::error::DecodeError;
use crate::field_value::FieldValue;
use crate::packet::{ExportPacket, FlowRecord, HeaderV1};
use crate::protocol::ProtocolTypes;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
struct WireHeader {
    #[nom(Value = "1")]
    version: u16,
    count: u16,
    sys_up_time: u32,
    unix_secs: u32,
    unix_nsecs: u32,
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
    pad1: u16,
    protocol_number: u8,
    #[nom(Value(ProtocolTypes::from(protocol_number)))]
    #[serde(skip)]
    _protocol_type: ProtocolTypes,
    tos: u8,
    tcp_flags: u8,
    pad2: u8,
    pad3: u16,
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
    flow.insert("PROTOCOL".into(), FieldValue::U8(r.protocol_number));
    flow.insert("SRC_TOS".into(), FieldValue::U8(r.tos));
    flow.insert("TCP_FLAGS".into(), FieldValue::U8(r.tcp_flags));
    flow
}

/// Decodes one v1 datagram. No template registry interaction (§4.6).
pub fn parse(data: &[u8]) -> Result<ExportPacket, DecodeError> {
    let (_, wire) = Wire::parse(data).map_err(|_| DecodeError::Truncated)?;

    let header = HeaderV1 {
        version: wire.header.version,
        count: wire.header.count,
        sys_uptime: wire.header.sys_up_time,
        unix_secs: wire.header.unix_secs,
        unix_nsecs: wire.header.unix_nsecs,
    };

    let flows = wire.records.iter().map(record_to_flow).collect();

    Ok(ExportPacket::V1 { header, flows })
}
