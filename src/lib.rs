#![doc = include_str!("../README.md")]

mod catalog;
mod cursor;
mod decoder;
mod enterprise_registry;
mod error;
mod exporter;
mod field_value;
mod ipfix;
mod metrics;
mod packet;
mod protocol;
mod static_versions;
mod template;
mod template_events;
mod v9;

pub use decoder::{
    Decoder, DecoderBuilder, Resolved, DEFAULT_MAX_DEFERRED_AGE, DEFAULT_MAX_DEFERRED_DATAGRAMS,
};
pub use enterprise_registry::EnterpriseFieldRegistry;
pub use error::{DecodeError, Diagnostics};
pub use exporter::ExporterKey;
pub use field_value::FieldValue;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use packet::{ExportPacket, FlowRecord, HeaderIpfix, HeaderV1, HeaderV5, HeaderV9};
pub use protocol::ProtocolTypes;
pub use template::{Template, TemplateField, TemplateRegistry};
pub use template_events::{TemplateEvent, TemplateHook, TemplateHooks, TemplateProtocol};
