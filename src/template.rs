//! Template shapes and the per-exporter template registry (§3, §4.2, §6).
//!
//! `Template`/`TemplateField` carry the enterprise-bit handling
//! (`overflowing_sub(32768)`) RFC 7011 requires. `TemplateRegistry` is an
//! `lru`-backed per-exporter cache keyed by one composite
//! [`crate::exporter::ExporterKey`] per §4.5, rather than
//! separate v9/IPFIX source-key types.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::net::{IpAddr, SocketAddr};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use lru::LruCache;
use serde::Serialize;

use crate::error::DecodeError;
use crate::exporter::ExporterKey;
use crate::metrics::CacheMetrics;
use crate::template_events::{TemplateEvent, TemplateHooks, TemplateProtocol};

pub const IPFIX_VARLEN: u16 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemplateField {
    pub enterprise_number: Option<u32>,
    pub field_id: u16,
    pub length: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub template_id: u16,
    pub is_option: bool,
    /// For option templates: how many of `fields` (counted from the front)
    /// are scope fields rather than option fields.
    pub scope_count: u16,
    pub fields: Vec<TemplateField>,
}

impl Template {
    /// The byte stride of one fixed-length data record, or `None` if any
    /// field is the IPFIX variable-length sentinel (§3 invariant).
    pub fn record_stride(&self) -> Option<usize> {
        if self.fields.iter().any(|f| f.length == IPFIX_VARLEN) {
            return None;
        }
        Some(self.fields.iter().map(|f| f.length as usize).sum())
    }

    pub fn is_variable_length(&self) -> bool {
        self.record_stride().is_none()
    }
}

#[derive(Default)]
struct ExporterBucket {
    templates: Option<LruCache<u16, Template>>,
}

/// Per-exporter cache of data templates and option templates, bounded by
/// `max_cache_size` entries per exporter (LRU eviction, not TTL — §4.2's
/// ambient addition note).
pub struct TemplateRegistry {
    buckets: HashMap<ExporterKey, ExporterBucket>,
    max_cache_size: NonZeroUsize,
    pub metrics: CacheMetrics,
    pub hooks: TemplateHooks,
}

impl TemplateRegistry {
    pub fn new(max_cache_size: usize) -> Self {
        TemplateRegistry {
            buckets: HashMap::new(),
            max_cache_size: NonZeroUsize::new(max_cache_size.max(1)).unwrap(),
            metrics: CacheMetrics::default(),
            hooks: TemplateHooks::new(),
        }
    }

    pub fn get(&mut self, exporter: ExporterKey, template_id: u16) -> Option<Template> {
        let bucket = self.buckets.get_mut(&exporter)?;
        let cache = bucket.templates.as_mut()?;
        match cache.get(&template_id) {
            Some(t) => {
                self.metrics.record_hit();
                Some(t.clone())
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Inserts or replaces a template, returning `true` if the shape
    /// actually changed (used by the deferred-resolution layer to decide
    /// whether to re-scan its queue).
    pub fn put(&mut self, exporter: ExporterKey, protocol: TemplateProtocol, template: Template) -> bool {
        let bucket = self
            .buckets
            .entry(exporter)
            .or_insert_with(ExporterBucket::default);
        let cache = bucket
            .templates
            .get_or_insert_with(|| LruCache::new(self.max_cache_size));

        let previous = cache.peek(&template.template_id).cloned();
        let changed = previous.as_ref() != Some(&template);

        if let Some((evicted_id, _)) = cache.push(template.template_id, template.clone()) {
            if evicted_id != template.template_id {
                self.metrics.record_eviction();
                self.hooks.trigger(&TemplateEvent::Evicted {
                    template_id: evicted_id,
                    protocol,
                });
            }
        }

        match previous {
            None => {
                self.metrics.record_insertion();
                self.hooks.trigger(&TemplateEvent::Learned {
                    template_id: template.template_id,
                    protocol,
                });
            }
            Some(_) if changed => {
                self.metrics.record_collision();
                self.hooks.trigger(&TemplateEvent::Collision {
                    template_id: template.template_id,
                    protocol,
                });
            }
            Some(_) => {}
        }

        changed
    }

    pub fn drop_exporter(&mut self, exporter: &ExporterKey) {
        self.buckets.remove(exporter);
    }

    /// Serializes the entire registry: a 4-byte magic, a 2-byte version, then
    /// one record per (exporter, template) pair (§6).
    pub fn snapshot(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"NFTS");
        out.write_u16::<BigEndian>(1).unwrap();

        let mut records: Vec<(ExporterKey, Template)> = Vec::new();
        for (key, bucket) in self.buckets.iter_mut() {
            if let Some(cache) = bucket.templates.as_mut() {
                for (_, template) in cache.iter() {
                    records.push((*key, template.clone()));
                }
            }
        }
        out.write_u32::<BigEndian>(records.len() as u32).unwrap();

        for (key, template) in records {
            write_exporter_key(&mut out, &key);
            out.write_u16::<BigEndian>(template.template_id).unwrap();
            out.write_u8(template.is_option as u8).unwrap();
            out.write_u16::<BigEndian>(template.scope_count).unwrap();
            out.write_u16::<BigEndian>(template.fields.len() as u16)
                .unwrap();
            for field in &template.fields {
                out.write_u32::<BigEndian>(field.enterprise_number.unwrap_or(0))
                    .unwrap();
                out.write_u16::<BigEndian>(field.field_id).unwrap();
                out.write_u16::<BigEndian>(field.length).unwrap();
            }
        }
        out
    }

    /// Rehydrates a registry from bytes produced by [`Self::snapshot`].
    /// Existing state is discarded wholesale, matching "restore(empty, ...)"
    /// in §8's testable property.
    pub fn restore(max_cache_size: usize, bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut registry = TemplateRegistry::new(max_cache_size);
        let mut cursor = std::io::Cursor::new(bytes);

        let mut magic = [0u8; 4];
        cursor
            .read_exact(&mut magic)
            .map_err(|_| DecodeError::Truncated)?;
        if &magic != b"NFTS" {
            return Err(DecodeError::Malformed("bad snapshot magic"));
        }
        let version = cursor
            .read_u16::<BigEndian>()
            .map_err(|_| DecodeError::Truncated)?;
        if version != 1 {
            return Err(DecodeError::Malformed("unsupported snapshot version"));
        }
        let count = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| DecodeError::Truncated)?;

        for _ in 0..count {
            let key = read_exporter_key(&mut cursor)?;
            let template_id = cursor
                .read_u16::<BigEndian>()
                .map_err(|_| DecodeError::Truncated)?;
            let is_option = cursor.read_u8().map_err(|_| DecodeError::Truncated)? != 0;
            let scope_count = cursor
                .read_u16::<BigEndian>()
                .map_err(|_| DecodeError::Truncated)?;
            let field_count = cursor
                .read_u16::<BigEndian>()
                .map_err(|_| DecodeError::Truncated)?;
            let mut fields = Vec::with_capacity(field_count as usize);
            for _ in 0..field_count {
                let enterprise = cursor
                    .read_u32::<BigEndian>()
                    .map_err(|_| DecodeError::Truncated)?;
                let field_id = cursor
                    .read_u16::<BigEndian>()
                    .map_err(|_| DecodeError::Truncated)?;
                let length = cursor
                    .read_u16::<BigEndian>()
                    .map_err(|_| DecodeError::Truncated)?;
                fields.push(TemplateField {
                    enterprise_number: if enterprise == 0 { None } else { Some(enterprise) },
                    field_id,
                    length,
                });
            }
            let template = Template {
                template_id,
                is_option,
                scope_count,
                fields,
            };
            registry.put(key, TemplateProtocol::V9, template);
        }

        Ok(registry)
    }
}

use std::io::Read as _;

fn write_exporter_key(out: &mut Vec<u8>, key: &ExporterKey) {
    match key.address.ip() {
        IpAddr::V4(v4) => {
            out.write_u8(0).unwrap();
            out.extend_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            out.write_u8(1).unwrap();
            out.extend_from_slice(&v6.octets());
        }
    }
    out.write_u16::<BigEndian>(key.address.port()).unwrap();
    out.write_u32::<BigEndian>(key.scope_id).unwrap();
}

fn read_exporter_key(cursor: &mut std::io::Cursor<&[u8]>) -> Result<ExporterKey, DecodeError> {
    let tag = cursor.read_u8().map_err(|_| DecodeError::Truncated)?;
    let ip = match tag {
        0 => {
            let mut octets = [0u8; 4];
            cursor
                .read_exact(&mut octets)
                .map_err(|_| DecodeError::Truncated)?;
            IpAddr::from(octets)
        }
        1 => {
            let mut octets = [0u8; 16];
            cursor
                .read_exact(&mut octets)
                .map_err(|_| DecodeError::Truncated)?;
            IpAddr::from(octets)
        }
        _ => return Err(DecodeError::Malformed("bad exporter key address tag")),
    };
    let port = cursor
        .read_u16::<BigEndian>()
        .map_err(|_| DecodeError::Truncated)?;
    let scope_id = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| DecodeError::Truncated)?;
    Ok(ExporterKey::new(SocketAddr::new(ip, port), scope_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(port: u16, scope: u32) -> ExporterKey {
        ExporterKey::new(format!("10.0.0.1:{port}").parse().unwrap(), scope)
    }

    fn tmpl(id: u16, field_ids: &[u16]) -> Template {
        Template {
            template_id: id,
            is_option: false,
            scope_count: 0,
            fields: field_ids
                .iter()
                .map(|&f| TemplateField {
                    enterprise_number: None,
                    field_id: f,
                    length: 4,
                })
                .collect(),
        }
    }

    #[test]
    fn get_before_put_is_none() {
        let mut reg = TemplateRegistry::new(16);
        assert!(reg.get(key(2055, 0), 1024).is_none());
    }

    #[test]
    fn put_then_get_roundtrips() {
        let mut reg = TemplateRegistry::new(16);
        let k = key(2055, 0);
        reg.put(k, TemplateProtocol::V9, tmpl(1024, &[1, 8, 12]));
        assert_eq!(reg.get(k, 1024), Some(tmpl(1024, &[1, 8, 12])));
    }

    #[test]
    fn redefinition_replaces_wholesale() {
        let mut reg = TemplateRegistry::new(16);
        let k = key(2055, 0);
        reg.put(k, TemplateProtocol::V9, tmpl(1024, &[1, 8, 12]));
        let changed = reg.put(k, TemplateProtocol::V9, tmpl(1024, &[1, 2]));
        assert!(changed);
        assert_eq!(reg.get(k, 1024), Some(tmpl(1024, &[1, 2])));
    }

    #[test]
    fn two_source_ids_behind_one_address_stay_disjoint() {
        let mut reg = TemplateRegistry::new(16);
        reg.put(key(2055, 1), TemplateProtocol::V9, tmpl(1024, &[1]));
        assert!(reg.get(key(2055, 2), 1024).is_none());
    }

    #[test]
    fn snapshot_restore_roundtrip_preserves_templates() {
        let mut reg = TemplateRegistry::new(16);
        let k = key(2055, 7);
        reg.put(k, TemplateProtocol::V9, tmpl(1024, &[1, 8, 12]));
        reg.put(k, TemplateProtocol::Ipfix, tmpl(2048, &[27, 28]));

        let bytes = reg.snapshot();
        let mut restored = TemplateRegistry::restore(16, &bytes).unwrap();

        assert_eq!(restored.get(k, 1024), Some(tmpl(1024, &[1, 8, 12])));
        assert_eq!(restored.get(k, 2048), Some(tmpl(2048, &[27, 28])));
    }

    #[test]
    fn variable_length_template_has_no_fixed_stride() {
        let mut t = tmpl(1024, &[1]);
        t.fields.push(TemplateField {
            enterprise_number: None,
            field_id: 999,
            length: IPFIX_VARLEN,
        });
        assert!(t.is_variable_length());
        assert_eq!(t.record_stride(), None);
    }

    #[test]
    fn lru_eviction_drops_oldest_template_first() {
        let mut reg = TemplateRegistry::new(1);
        let k = key(2055, 0);
        reg.put(k, TemplateProtocol::V9, tmpl(1024, &[1]));
        reg.put(k, TemplateProtocol::V9, tmpl(1025, &[2]));
        assert!(reg.get(k, 1024).is_none());
        assert!(reg.get(k, 1025).is_some());
        assert_eq!(reg.metrics.snapshot().evictions, 1);
    }
}
