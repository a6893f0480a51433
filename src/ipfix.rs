//! IPFIX (RFC 7011) two-pass parser (§4.4, §4.5).
//!
//! The enterprise-bit test on the information element id and the `65535`
//! variable-length sentinel follow RFC 7011 directly. The two-pass
//! index-then-decode strategy mirrors
//! [`crate::v9`]; IPFIX additionally has to walk variable-length records
//! field-by-field through a [`Cursor`] rather than slicing a fixed stride.

use std::collections::BTreeSet;

use crate::catalog;
use crate::cursor::Cursor;
use crate::enterprise_registry::EnterpriseFieldRegistry;
use crate::error::DecodeError;
use crate::exporter::ExporterKey;
use crate::field_value;
use crate::packet::{FlowRecord, HeaderIpfix};
use crate::template::{Template, TemplateField, IPFIX_VARLEN};
use crate::template::TemplateRegistry;
use crate::template_events::TemplateProtocol;

const TEMPLATE_SET_ID: u16 = 2;
const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
const MIN_DATA_SET_ID: u16 = 256;

/// High bit of an information element id marks an enterprise-specific field
/// (RFC 7011 §3.2); clearing it yields the element id within that
/// enterprise's namespace.
const ENTERPRISE_BIT: u16 = 0x8000;

pub struct DecodedIpfix {
    pub header: HeaderIpfix,
    pub flows: Vec<FlowRecord>,
    pub new_templates: Vec<Template>,
    pub missing_template_ids: BTreeSet<u16>,
    /// Number of fields decoded against a field id absent from the catalog
    /// (§7's `CatalogGap`). Enterprise fields with no registered name count
    /// too — their value is always opaque bytes regardless.
    pub unknown_field_count: u64,
}

struct DataSet<'a> {
    template_id: u16,
    body: &'a [u8],
}

pub fn parse(
    data: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
    enterprise_names: Option<&EnterpriseFieldRegistry>,
) -> Result<DecodedIpfix, DecodeError> {
    let mut cursor = Cursor::new(data);

    let header = HeaderIpfix {
        version: cursor.u16()?,
        length: cursor.u16()?,
        export_time: cursor.u32()?,
        sequence: cursor.u32()?,
        observation_domain_id: cursor.u32()?,
    };

    let total_len = header.length as usize;
    if total_len > data.len() {
        return Err(DecodeError::Truncated);
    }

    let mut new_templates = Vec::new();
    let mut data_sets: Vec<DataSet> = Vec::new();

    // Pass 1: apply every template/options-template set to the registry and
    // index data sets by body, bounded by the header's declared length
    // rather than the number of sets (§4.4).
    while cursor.position() < total_len {
        if total_len - cursor.position() < 4 {
            break; // trailing padding shorter than a set header
        }
        let set_id = cursor.u16()?;
        let length = cursor.u16()? as usize;
        if length < 4 {
            return Err(DecodeError::Malformed("IPFIX set length below minimum"));
        }
        if cursor.position() + (length - 4) > total_len {
            return Err(DecodeError::Malformed("IPFIX set extends past packet length"));
        }
        let mut body = cursor.window(length - 4)?;

        match set_id {
            TEMPLATE_SET_ID => {
                while body.remaining() >= 4 {
                    let template = parse_template_record(&mut body)?;
                    if registry.put(exporter, TemplateProtocol::Ipfix, template.clone()) {
                        new_templates.push(template);
                    }
                }
            }
            OPTIONS_TEMPLATE_SET_ID => {
                while body.remaining() >= 6 {
                    let template = parse_options_template_record(&mut body)?;
                    if registry.put(exporter, TemplateProtocol::Ipfix, template.clone()) {
                        new_templates.push(template);
                    }
                }
            }
            id if id >= MIN_DATA_SET_ID => {
                data_sets.push(DataSet {
                    template_id: id,
                    body: body.bytes(body.remaining())?,
                });
            }
            _ => {}
        }
    }

    // Pass 2: decode data sets against the now-current registry.
    let mut flows = Vec::new();
    let mut missing_template_ids = BTreeSet::new();
    let mut unknown_field_count = 0u64;

    for set in &data_sets {
        match registry.get(exporter, set.template_id) {
            Some(template) => decode_data_set(
                set.body,
                &template,
                enterprise_names,
                &mut flows,
                &mut unknown_field_count,
            )?,
            None => {
                missing_template_ids.insert(set.template_id);
            }
        }
    }

    Ok(DecodedIpfix {
        header,
        flows,
        new_templates,
        missing_template_ids,
        unknown_field_count,
    })
}

fn parse_field_specifier(body: &mut Cursor) -> Result<TemplateField, DecodeError> {
    let raw_id = body.u16()?;
    let length = body.u16()?;
    let (field_id, enterprise_number) = if raw_id & ENTERPRISE_BIT != 0 {
        let (cleared, _) = raw_id.overflowing_sub(ENTERPRISE_BIT);
        (cleared, Some(body.u32()?))
    } else {
        (raw_id, None)
    };
    Ok(TemplateField {
        enterprise_number,
        field_id,
        length,
    })
}

fn parse_template_record(body: &mut Cursor) -> Result<Template, DecodeError> {
    let template_id = body.u16()?;
    let field_count = body.u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parse_field_specifier(body)?);
    }
    Ok(Template {
        template_id,
        is_option: false,
        scope_count: 0,
        fields,
    })
}

fn parse_options_template_record(body: &mut Cursor) -> Result<Template, DecodeError> {
    let template_id = body.u16()?;
    let field_count = body.u16()?;
    let scope_count = body.u16()?;
    if scope_count > field_count {
        return Err(DecodeError::Malformed(
            "IPFIX options template scope_field_count exceeds field_count",
        ));
    }
    if scope_count == 0 {
        return Err(DecodeError::Malformed("IPFIX options template scope_field_count zero"));
    }
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parse_field_specifier(body)?);
    }
    Ok(Template {
        template_id,
        is_option: true,
        scope_count,
        fields,
    })
}

/// Lower bound on a record's byte length: every fixed-width field at its
/// declared width, every variable-length field at its 1-byte short-form
/// prefix. A trailing run shorter than this is padding, not a record.
fn minimum_record_size(template: &Template) -> usize {
    template
        .fields
        .iter()
        .map(|f| if f.length == IPFIX_VARLEN { 1 } else { f.length as usize })
        .sum()
}

fn decode_data_set(
    body: &[u8],
    template: &Template,
    enterprise_names: Option<&EnterpriseFieldRegistry>,
    flows: &mut Vec<FlowRecord>,
    unknown_field_count: &mut u64,
) -> Result<(), DecodeError> {
    let min_size = minimum_record_size(template);
    if min_size == 0 {
        return Ok(());
    }

    let mut cursor = Cursor::new(body);
    while cursor.remaining() >= min_size {
        let flow = decode_record(&mut cursor, template, enterprise_names, unknown_field_count)
            .map_err(|_| {
                DecodeError::Malformed("IPFIX record's variable-length field extends past set boundary")
            })?;
        flows.push(flow);
    }
    Ok(())
}

fn decode_record(
    cursor: &mut Cursor,
    template: &Template,
    enterprise_names: Option<&EnterpriseFieldRegistry>,
    unknown_field_count: &mut u64,
) -> Result<FlowRecord, DecodeError> {
    let mut flow = FlowRecord::new();
    for field in &template.fields {
        let raw = if field.length == IPFIX_VARLEN {
            cursor.varlen_ipfix()?
        } else {
            cursor.bytes(field.length as usize)?
        };

        let name = match field.enterprise_number {
            Some(pen) => enterprise_names
                .and_then(|reg| reg.lookup(pen, field.field_id))
                .map(str::to_string)
                .unwrap_or_else(|| format!("_{}_{}", pen, field.field_id)),
            None => catalog::lookup(field.field_id)
                .map(|e| e.name.to_string())
                .unwrap_or_else(|| format!("_{}", field.field_id)),
        };

        let value = match (field.enterprise_number, catalog::lookup(field.field_id)) {
            (None, Some(entry)) => field_value::decode(raw, entry.kind, raw.len())?,
            (None, None) => {
                log::warn!("IPFIX field id {} absent from catalog, decoding as opaque bytes", field.field_id);
                *unknown_field_count += 1;
                field_value::decode_unknown(raw, raw.len())?
            }
            (Some(_), _) => field_value::decode_unknown(raw, raw.len())?,
        };

        flow.insert(name, value);
    }
    Ok(flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_value::FieldValue;

    fn key() -> ExporterKey {
        ExporterKey::new("198.51.100.7:4739".parse().unwrap(), 99)
    }

    fn header_bytes(length: u16) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(&10u16.to_be_bytes());
        h.extend_from_slice(&length.to_be_bytes());
        h.extend_from_slice(&0u32.to_be_bytes()); // export_time
        h.extend_from_slice(&55u32.to_be_bytes()); // sequence
        h.extend_from_slice(&99u32.to_be_bytes()); // observation_domain_id
        h
    }

    fn template_set(template_id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&template_id.to_be_bytes());
        body.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for (id, len) in fields {
            body.extend_from_slice(&id.to_be_bytes());
            body.extend_from_slice(&len.to_be_bytes());
        }
        let mut set = Vec::new();
        set.extend_from_slice(&TEMPLATE_SET_ID.to_be_bytes());
        set.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
        set.extend_from_slice(&body);
        set
    }

    #[test]
    fn variable_length_string_field_decodes_via_short_form_prefix() {
        let template = template_set(256, &[(8, 4), (82, IPFIX_VARLEN)]); // src addr + IF_NAME

        let mut data_body = Vec::new();
        data_body.extend_from_slice(&[203, 0, 113, 5]);
        data_body.push(3); // short-form length prefix
        data_body.extend_from_slice(b"eth");
        let mut data_set = Vec::new();
        data_set.extend_from_slice(&256u16.to_be_bytes());
        data_set.extend_from_slice(&((data_body.len() + 4) as u16).to_be_bytes());
        data_set.extend_from_slice(&data_body);

        let mut buf = Vec::new();
        let total_len = 16 + template.len() + data_set.len();
        buf.extend_from_slice(&header_bytes(total_len as u16));
        buf.extend_from_slice(&template);
        buf.extend_from_slice(&data_set);

        let mut registry = TemplateRegistry::new(16);
        let decoded = parse(&buf, key(), &mut registry, None).unwrap();

        assert!(decoded.missing_template_ids.is_empty());
        assert_eq!(decoded.flows.len(), 1);
        assert_eq!(
            decoded.flows[0].get("IPV4_SRC_ADDR"),
            Some(&FieldValue::Ipv4([203, 0, 113, 5].into()))
        );
        assert_eq!(
            decoded.flows[0].get("_82"),
            Some(&FieldValue::Bytes(b"eth".to_vec()))
        );
    }

    #[test]
    fn enterprise_field_is_keyed_by_pen_and_element_id() {
        let mut body = Vec::new();
        body.extend_from_slice(&256u16.to_be_bytes()); // template_id
        body.extend_from_slice(&1u16.to_be_bytes()); // field_count
        body.extend_from_slice(&(0x8001u16).to_be_bytes()); // enterprise bit + id 1
        body.extend_from_slice(&4u16.to_be_bytes()); // length
        body.extend_from_slice(&12345u32.to_be_bytes()); // enterprise number
        let mut template = Vec::new();
        template.extend_from_slice(&TEMPLATE_SET_ID.to_be_bytes());
        template.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
        template.extend_from_slice(&body);

        let mut data_body = Vec::new();
        data_body.extend_from_slice(&42u32.to_be_bytes());
        let mut data_set = Vec::new();
        data_set.extend_from_slice(&256u16.to_be_bytes());
        data_set.extend_from_slice(&((data_body.len() + 4) as u16).to_be_bytes());
        data_set.extend_from_slice(&data_body);

        let mut buf = Vec::new();
        let total_len = 16 + template.len() + data_set.len();
        buf.extend_from_slice(&header_bytes(total_len as u16));
        buf.extend_from_slice(&template);
        buf.extend_from_slice(&data_set);

        let mut registry = TemplateRegistry::new(16);
        let decoded = parse(&buf, key(), &mut registry, None).unwrap();

        assert_eq!(
            decoded.flows[0].get("_12345_1"),
            Some(&FieldValue::Bytes(42u32.to_be_bytes().to_vec()))
        );
    }

    #[test]
    fn data_set_with_unknown_template_is_reported_missing() {
        let mut data_body = Vec::new();
        data_body.extend_from_slice(&[9, 9, 9, 9]);
        let mut data_set = Vec::new();
        data_set.extend_from_slice(&512u16.to_be_bytes());
        data_set.extend_from_slice(&((data_body.len() + 4) as u16).to_be_bytes());
        data_set.extend_from_slice(&data_body);

        let mut buf = Vec::new();
        let total_len = 16 + data_set.len();
        buf.extend_from_slice(&header_bytes(total_len as u16));
        buf.extend_from_slice(&data_set);

        let mut registry = TemplateRegistry::new(16);
        let decoded = parse(&buf, key(), &mut registry, None).unwrap();
        assert_eq!(decoded.missing_template_ids, BTreeSet::from([512]));
    }

    #[test]
    fn set_extending_past_declared_length_fails_malformed() {
        // total_len covers only the set's 4-byte header; the set itself
        // claims a 20-byte length (16 bytes of body) that isn't present.
        let mut buf = header_bytes(20);
        buf.extend_from_slice(&256u16.to_be_bytes());
        buf.extend_from_slice(&20u16.to_be_bytes());
        let mut registry = TemplateRegistry::new(16);
        assert!(matches!(
            parse(&buf, key(), &mut registry, None),
            Err(DecodeError::Malformed(_))
        ));
    }
}
