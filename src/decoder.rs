//! Dispatch and cross-packet deferred resolution (§4.5).
//!
//! `Decoder` owns the template registry and routes each datagram to the
//! matching version parser by reading the leading 16-bit version tag. The
//! deferred queue goes further than same-packet template resolution: it
//! holds back an entire datagram across packet boundaries until a missing
//! template shows up on a later one, per §4.5.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime};

use crate::enterprise_registry::EnterpriseFieldRegistry;
use crate::error::{DecodeError, Diagnostics};
use crate::exporter::ExporterKey;
use crate::ipfix;
use crate::packet::ExportPacket;
use crate::static_versions::{v1, v5};
use crate::template::TemplateRegistry;
use crate::template_events::{TemplateEvent, TemplateHooks, TemplateProtocol};
use crate::v9;

/// Default bound on how many datagrams may sit in one exporter's deferred
/// queue before the oldest is dropped with a `TemplateTimeout` diagnostic
/// (§4.5).
pub const DEFAULT_MAX_DEFERRED_DATAGRAMS: usize = 500;
/// Default age bound on a deferred datagram, independent of queue length.
pub const DEFAULT_MAX_DEFERRED_AGE: Duration = Duration::from_secs(600);

struct DeferredDatagram {
    bytes: Vec<u8>,
    receipt_time: SystemTime,
    unresolved: std::collections::BTreeSet<u16>,
}

/// A successfully decoded datagram paired with the receipt timestamp it was
/// originally submitted with, so a downstream consumer can reorder deferred
/// packets against ones that arrived and resolved immediately (§4.5).
pub struct Resolved {
    pub receipt_time: SystemTime,
    pub packet: ExportPacket,
}

/// Owns the template registry and the per-exporter deferred queues. Not
/// `Clone`/`Sync`: an embedder runs one `Decoder` per collector thread, or
/// behind its own lock.
pub struct Decoder {
    registry: TemplateRegistry,
    enterprise_names: EnterpriseFieldRegistry,
    deferred: HashMap<ExporterKey, VecDeque<DeferredDatagram>>,
    diagnostics: HashMap<ExporterKey, Diagnostics>,
    max_deferred_datagrams: usize,
    max_deferred_age: Duration,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::builder().build()
    }
}

impl Decoder {
    pub fn builder() -> DecoderBuilder {
        DecoderBuilder::default()
    }

    /// Decodes one datagram. `Ok(Some(packet))` means it decoded (and
    /// resolved any same-datagram templates) immediately. `Ok(None)` means a
    /// v9/IPFIX data set referenced a template this exporter hasn't sent yet
    /// and the datagram was queued; call [`Decoder::drain_resolved`]
    /// afterward to collect it once resolved. Errors abort only this
    /// datagram (§4.1) and are also folded into this exporter's
    /// [`Diagnostics`].
    pub fn decode(
        &mut self,
        bytes: &[u8],
        exporter: ExporterKey,
        receipt_time: SystemTime,
    ) -> Result<Option<ExportPacket>, DecodeError> {
        let result = self.decode_inner(bytes, exporter, receipt_time);
        if let Err(err) = &result {
            self.diagnostics.entry(exporter).or_default().record(err);
        }
        result
    }

    fn decode_inner(
        &mut self,
        bytes: &[u8],
        exporter: ExporterKey,
        receipt_time: SystemTime,
    ) -> Result<Option<ExportPacket>, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::Truncated);
        }
        let version = u16::from_be_bytes([bytes[0], bytes[1]]);

        match version {
            1 => v1::parse(bytes).map(Some),
            5 => v5::parse(bytes).map(Some),
            9 => {
                let decoded = v9::parse(bytes, exporter, &mut self.registry)?;
                self.record_unknown_fields(exporter, decoded.unknown_field_count);
                if decoded.missing_template_ids.is_empty() {
                    Ok(Some(ExportPacket::V9 {
                        header: decoded.header,
                        flows: decoded.flows,
                        new_templates: decoded.new_templates,
                    }))
                } else {
                    self.defer(bytes, exporter, receipt_time, decoded.missing_template_ids, TemplateProtocol::V9);
                    Ok(None)
                }
            }
            10 => {
                let decoded =
                    ipfix::parse(bytes, exporter, &mut self.registry, Some(&self.enterprise_names))?;
                self.record_unknown_fields(exporter, decoded.unknown_field_count);
                if decoded.missing_template_ids.is_empty() {
                    Ok(Some(ExportPacket::Ipfix {
                        header: decoded.header,
                        flows: decoded.flows,
                        new_templates: decoded.new_templates,
                    }))
                } else {
                    self.defer(bytes, exporter, receipt_time, decoded.missing_template_ids, TemplateProtocol::Ipfix);
                    Ok(None)
                }
            }
            other => {
                log::debug!("rejecting datagram from {:?}: unsupported version tag {other}", exporter.address);
                Err(DecodeError::UnsupportedVersion(other))
            }
        }
    }

    fn record_unknown_fields(&mut self, exporter: ExporterKey, count: u64) {
        if count == 0 {
            return;
        }
        let diag = self.diagnostics.entry(exporter).or_default();
        for _ in 0..count {
            diag.record_catalog_gap();
        }
    }

    fn defer(
        &mut self,
        bytes: &[u8],
        exporter: ExporterKey,
        receipt_time: SystemTime,
        unresolved: std::collections::BTreeSet<u16>,
        protocol: TemplateProtocol,
    ) {
        for &template_id in &unresolved {
            log::debug!(
                "deferring datagram from {:?}: template {template_id} not yet seen ({protocol:?})",
                exporter.address
            );
            self.registry.hooks.trigger(&TemplateEvent::MissingTemplate {
                template_id,
                protocol,
            });
        }

        let queue = self.deferred.entry(exporter).or_default();
        queue.push_back(DeferredDatagram {
            bytes: bytes.to_vec(),
            receipt_time,
            unresolved,
        });
        self.enforce_bounds(exporter);
    }

    /// Drops deferred datagrams beyond the length or age bound for one
    /// exporter, recording a `TemplateTimeout` diagnostic per drop.
    fn enforce_bounds(&mut self, exporter: ExporterKey) {
        let Some(queue) = self.deferred.get_mut(&exporter) else {
            return;
        };
        let now = SystemTime::now();
        let max_age = self.max_deferred_age;
        let mut timeouts = 0u64;

        queue.retain(|entry| {
            let expired = now
                .duration_since(entry.receipt_time)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if expired {
                timeouts += 1;
            }
            !expired
        });
        while queue.len() > self.max_deferred_datagrams {
            queue.pop_front();
            timeouts += 1;
        }

        if timeouts > 0 {
            log::warn!(
                "dropping {timeouts} deferred datagram(s) from {:?}: template never arrived",
                exporter.address
            );
            let diag = self.diagnostics.entry(exporter).or_default();
            for _ in 0..timeouts {
                diag.record_template_timeout();
            }
        }
    }

    /// Re-attempts every deferred datagram whose unresolved template set is
    /// now fully present in the registry, in receipt order per exporter.
    /// Call this after any `decode` call that may have learned a template
    /// (i.e. whenever `new_templates` on a successful result is non-empty).
    pub fn drain_resolved(&mut self) -> Vec<Resolved> {
        let mut resolved = Vec::new();
        let mut unknown_fields_by_exporter: Vec<(ExporterKey, u64)> = Vec::new();

        for (exporter, queue) in self.deferred.iter_mut() {
            let mut still_pending = VecDeque::new();
            while let Some(entry) = queue.pop_front() {
                let now_unresolved: std::collections::BTreeSet<u16> = entry
                    .unresolved
                    .iter()
                    .copied()
                    .filter(|id| self.registry.get(*exporter, *id).is_none())
                    .collect();

                if now_unresolved.is_empty() {
                    if let Ok(Some((packet, unknown_field_count))) =
                        redecode(&entry.bytes, *exporter, &mut self.registry, &self.enterprise_names)
                    {
                        if unknown_field_count > 0 {
                            unknown_fields_by_exporter.push((*exporter, unknown_field_count));
                        }
                        resolved.push(Resolved {
                            receipt_time: entry.receipt_time,
                            packet,
                        });
                    }
                } else {
                    still_pending.push_back(DeferredDatagram {
                        unresolved: now_unresolved,
                        ..entry
                    });
                }
            }
            *queue = still_pending;
        }

        self.deferred.retain(|_, q| !q.is_empty());
        for (exporter, count) in unknown_fields_by_exporter {
            self.record_unknown_fields(exporter, count);
        }
        resolved
    }

    pub fn diagnostics(&self, exporter: &ExporterKey) -> Diagnostics {
        self.diagnostics.get(exporter).cloned().unwrap_or_default()
    }

    pub fn deferred_count(&self, exporter: &ExporterKey) -> usize {
        self.deferred.get(exporter).map(VecDeque::len).unwrap_or(0)
    }

    /// Drops all template and deferred-datagram state for one exporter, for
    /// an embedder's idle-timeout policy (§4.2).
    pub fn drop_exporter(&mut self, exporter: &ExporterKey) {
        self.registry.drop_exporter(exporter);
        self.deferred.remove(exporter);
        self.diagnostics.remove(exporter);
    }

    pub fn snapshot_templates(&mut self) -> Vec<u8> {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }
}

fn redecode(
    bytes: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
    enterprise_names: &EnterpriseFieldRegistry,
) -> Result<Option<(ExportPacket, u64)>, DecodeError> {
    if bytes.len() < 2 {
        return Err(DecodeError::Truncated);
    }
    match u16::from_be_bytes([bytes[0], bytes[1]]) {
        9 => {
            let decoded = v9::parse(bytes, exporter, registry)?;
            if decoded.missing_template_ids.is_empty() {
                Ok(Some((
                    ExportPacket::V9 {
                        header: decoded.header,
                        flows: decoded.flows,
                        new_templates: decoded.new_templates,
                    },
                    decoded.unknown_field_count,
                )))
            } else {
                Ok(None)
            }
        }
        10 => {
            let decoded = ipfix::parse(bytes, exporter, registry, Some(enterprise_names))?;
            if decoded.missing_template_ids.is_empty() {
                Ok(Some((
                    ExportPacket::Ipfix {
                        header: decoded.header,
                        flows: decoded.flows,
                        new_templates: decoded.new_templates,
                    },
                    decoded.unknown_field_count,
                )))
            } else {
                Ok(None)
            }
        }
        other => Err(DecodeError::UnsupportedVersion(other)),
    }
}

/// Builder for [`Decoder`].
#[derive(Clone)]
pub struct DecoderBuilder {
    cache_size: usize,
    max_deferred_datagrams: usize,
    max_deferred_age: Duration,
    hooks: TemplateHooks,
    enterprise_names: EnterpriseFieldRegistry,
}

impl Default for DecoderBuilder {
    fn default() -> Self {
        DecoderBuilder {
            cache_size: 1000,
            max_deferred_datagrams: DEFAULT_MAX_DEFERRED_DATAGRAMS,
            max_deferred_age: DEFAULT_MAX_DEFERRED_AGE,
            hooks: TemplateHooks::new(),
            enterprise_names: EnterpriseFieldRegistry::new(),
        }
    }
}

impl DecoderBuilder {
    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_max_deferred_datagrams(mut self, count: usize) -> Self {
        self.max_deferred_datagrams = count;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_max_deferred_age(mut self, age: Duration) -> Self {
        self.max_deferred_age = age;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn on_template_event<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TemplateEvent) + Send + Sync + 'static,
    {
        self.hooks.register(hook);
        self
    }

    /// Registers a display name for an IPFIX enterprise-specific field.
    /// Cosmetic only — the decoded value stays raw bytes (§9).
    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn register_enterprise_field(
        mut self,
        enterprise_number: u32,
        element_id: u16,
        name: impl Into<String>,
    ) -> Self {
        self.enterprise_names.register(enterprise_number, element_id, name);
        self
    }

    pub fn build(self) -> Decoder {
        let mut registry = TemplateRegistry::new(self.cache_size);
        registry.hooks = self.hooks;
        Decoder {
            registry,
            enterprise_names: self.enterprise_names,
            deferred: HashMap::new(),
            diagnostics: HashMap::new(),
            max_deferred_datagrams: self.max_deferred_datagrams,
            max_deferred_age: self.max_deferred_age,
        }
    }

    /// Restores a decoder whose template registry is rehydrated from a
    /// previous [`Decoder::snapshot_templates`] (§4.2's restore contract).
    pub fn build_from_snapshot(self, bytes: &[u8]) -> Result<Decoder, DecodeError> {
        let mut registry = TemplateRegistry::restore(self.cache_size, bytes)?;
        registry.hooks = self.hooks;
        Ok(Decoder {
            registry,
            enterprise_names: self.enterprise_names,
            deferred: HashMap::new(),
            diagnostics: HashMap::new(),
            max_deferred_datagrams: self.max_deferred_datagrams,
            max_deferred_age: self.max_deferred_age,
        })
    }
}
