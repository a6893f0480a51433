//! NetFlow v9 two-pass parser (§4.3, §4.5).
//!
//! Wire framing follows RFC 3954's Header/Template/Options-Template record
//! layout. The decode strategy indexes data sets in a first pass, decodes
//! them in a second once every same-datagram template has been applied, and
//! reports still-unresolved template ids back to the caller rather than
//! failing the datagram, to match §4.5's cross-packet deferred-resolution
//! contract.

use std::collections::BTreeSet;

use crate::catalog;
use crate::cursor::Cursor;
use crate::error::DecodeError;
use crate::exporter::ExporterKey;
use crate::field_value;
use crate::packet::{FlowRecord, HeaderV9};
use crate::template::{Template, TemplateField};
use crate::template_events::TemplateProtocol;
use crate::template::TemplateRegistry;

/// Template and options-template flowset ids are reserved; data flowsets
/// start at 256 (§3 invariant).
const TEMPLATE_FLOWSET_ID: u16 = 0;
const OPTIONS_TEMPLATE_FLOWSET_ID: u16 = 1;
const MIN_DATA_FLOWSET_ID: u16 = 256;

/// Result of decoding one v9 datagram against the registry as it stood (and
/// as it was updated by this datagram's own template flowsets).
pub struct DecodedV9 {
    pub header: HeaderV9,
    pub flows: Vec<FlowRecord>,
    pub new_templates: Vec<Template>,
    /// Template ids referenced by a data flowset that were still unknown
    /// after this datagram's own template flowsets were applied. Non-empty
    /// means the caller must defer (§4.5).
    pub missing_template_ids: BTreeSet<u16>,
    /// Number of fields decoded against a field id absent from the catalog
    /// (§7's `CatalogGap`).
    pub unknown_field_count: u64,
}

struct DataFlowset<'a> {
    template_id: u16,
    body: &'a [u8],
}

pub fn parse(
    data: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
) -> Result<DecodedV9, DecodeError> {
    let mut cursor = Cursor::new(data);

    let header = HeaderV9 {
        version: cursor.u16()?,
        count: cursor.u16()?,
        sys_uptime: cursor.u32()?,
        unix_secs: cursor.u32()?,
        sequence: cursor.u32()?,
        source_id: cursor.u32()?,
    };

    let mut new_templates = Vec::new();
    let mut data_flowsets: Vec<DataFlowset> = Vec::new();

    // Pass 1: apply every template/options-template flowset to the registry
    // and index data flowsets by body, ignoring header.count (§4.3).
    while !cursor.is_empty() {
        if cursor.remaining() < 4 {
            break; // trailing padding shorter than a flowset header
        }
        let flowset_id = cursor.u16()?;
        let length = cursor.u16()? as usize;
        if length < 4 {
            return Err(DecodeError::Malformed("v9 flowset length below minimum"));
        }
        let mut body = cursor.window(length - 4)?;

        match flowset_id {
            TEMPLATE_FLOWSET_ID => {
                while body.remaining() >= 4 {
                    let template = parse_template_record(&mut body)?;
                    if registry.put(exporter, TemplateProtocol::V9, template.clone()) {
                        new_templates.push(template);
                    }
                }
            }
            OPTIONS_TEMPLATE_FLOWSET_ID => {
                while body.remaining() >= 6 {
                    let template = parse_options_template_record(&mut body)?;
                    if registry.put(exporter, TemplateProtocol::V9, template.clone()) {
                        new_templates.push(template);
                    }
                }
            }
            id if id >= MIN_DATA_FLOWSET_ID => {
                data_flowsets.push(DataFlowset {
                    template_id: id,
                    body: body.bytes(body.remaining())?,
                });
            }
            _ => {
                // Reserved flowset id outside the known ranges; skip its body.
            }
        }
    }

    // Pass 2: decode data flowsets against the now-current registry.
    let mut flows = Vec::new();
    let mut missing_template_ids = BTreeSet::new();
    let mut unknown_field_count = 0u64;

    for flowset in &data_flowsets {
        match registry.get(exporter, flowset.template_id) {
            Some(template) => {
                decode_data_flowset(flowset.body, &template, &mut flows, &mut unknown_field_count)?;
            }
            None => {
                missing_template_ids.insert(flowset.template_id);
            }
        }
    }

    let observed_sets = data_flowsets.len() as u32;
    if header.count != 0 && header.count as u32 != observed_sets && header.count as usize != flows.len() {
        log::debug!(
            "v9 header.count={} matches neither the {observed_sets} data flowset(s) nor the {} decoded record(s); iteration stays length-driven",
            header.count,
            flows.len()
        );
    }

    Ok(DecodedV9 {
        header,
        flows,
        new_templates,
        missing_template_ids,
        unknown_field_count,
    })
}

fn parse_template_record(body: &mut Cursor) -> Result<Template, DecodeError> {
    let template_id = body.u16()?;
    let field_count = body.u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let field_id = body.u16()?;
        let length = body.u16()?;
        fields.push(TemplateField {
            enterprise_number: None,
            field_id,
            length,
        });
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
    let option_scope_length = body.u16()? as usize;
    let option_length = body.u16()? as usize;

    if option_scope_length % 4 != 0 || option_length % 4 != 0 {
        return Err(DecodeError::Malformed(
            "v9 options template scope/option length not a multiple of 4",
        ));
    }
    if option_scope_length == 0 {
        return Err(DecodeError::Malformed("v9 options template scope length zero"));
    }

    let scope_count = (option_scope_length / 4) as u16;
    let option_count = option_length / 4;
    let mut fields = Vec::with_capacity(scope_count as usize + option_count);

    for _ in 0..scope_count {
        let field_id = body.u16()?;
        let length = body.u16()?;
        fields.push(TemplateField {
            enterprise_number: None,
            field_id,
            length,
        });
    }
    for _ in 0..option_count {
        let field_id = body.u16()?;
        let length = body.u16()?;
        fields.push(TemplateField {
            enterprise_number: None,
            field_id,
            length,
        });
    }

    Ok(Template {
        template_id,
        is_option: true,
        scope_count,
        fields,
    })
}

fn decode_data_flowset(
    body: &[u8],
    template: &Template,
    flows: &mut Vec<FlowRecord>,
    unknown_field_count: &mut u64,
) -> Result<(), DecodeError> {
    let Some(stride) = template.record_stride() else {
        // v9 has no variable-length sentinel; an IPFIX-shaped template
        // reaching this parser is a caller bug, not malformed input.
        return Err(DecodeError::Malformed(
            "v9 data flowset against a variable-length template",
        ));
    };
    if stride == 0 {
        return Ok(());
    }

    let mut offset = 0;
    while offset + stride <= body.len() {
        let record = &body[offset..offset + stride];
        flows.push(decode_record(record, template, unknown_field_count)?);
        offset += stride;
    }
    Ok(())
}

fn decode_record(
    record: &[u8],
    template: &Template,
    unknown_field_count: &mut u64,
) -> Result<FlowRecord, DecodeError> {
    let mut flow = FlowRecord::new();
    let mut offset = 0;
    for field in &template.fields {
        let field_length = field.length as usize;
        let raw = &record[offset..offset + field_length];
        offset += field_length;

        match catalog::lookup(field.field_id) {
            Some(entry) => {
                let value = field_value::decode(raw, entry.kind, field_length)?;
                flow.insert(entry.name.to_string(), value);
            }
            None => {
                log::warn!("v9 field id {} absent from catalog, decoding as opaque bytes", field.field_id);
                *unknown_field_count += 1;
                let value = field_value::decode_unknown(raw, field_length)?;
                flow.insert(format!("_{}", field.field_id), value);
            }
        }
    }
    Ok(flow)
}
