//! `ExportPacket` and the per-version header types (§3, §9).
//!
//! A tagged enum per §9: "class-per-version polymorphism becomes a tagged
//! variant", narrowed to four versions — v1, v5, v9, IPFIX.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::field_value::FieldValue;
use crate::template::Template;

/// An ordered mapping from canonical field name to decoded value. Built once
/// per data record and never mutated afterward (§3).
pub type FlowRecord = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderV1 {
    pub version: u16,
    pub count: u16,
    pub sys_uptime: u32,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderV5 {
    pub version: u16,
    pub count: u16,
    pub sys_uptime: u32,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
    pub flow_sequence: u32,
    pub engine_type: u8,
    pub engine_id: u8,
    /// Low 14 bits: sampling interval. Top 2 bits: sampling mode.
    pub sampling_interval: u16,
}

impl HeaderV5 {
    pub fn sampling_mode(&self) -> u8 {
        (self.sampling_interval >> 14) as u8
    }

    pub fn sampling_rate(&self) -> u16 {
        self.sampling_interval & 0x3FFF
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderV9 {
    pub version: u16,
    pub count: u16,
    pub sys_uptime: u32,
    pub unix_secs: u32,
    pub sequence: u32,
    pub source_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderIpfix {
    pub version: u16,
    pub length: u16,
    pub export_time: u32,
    pub sequence: u32,
    pub observation_domain_id: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "version_tag")]
pub enum ExportPacket {
    V1 {
        header: HeaderV1,
        flows: Vec<FlowRecord>,
    },
    V5 {
        header: HeaderV5,
        flows: Vec<FlowRecord>,
    },
    V9 {
        header: HeaderV9,
        flows: Vec<FlowRecord>,
        /// Templates newly learned while decoding this datagram.
        new_templates: Vec<Template>,
    },
    Ipfix {
        header: HeaderIpfix,
        flows: Vec<FlowRecord>,
        new_templates: Vec<Template>,
    },
}

impl ExportPacket {
    pub fn version(&self) -> u16 {
        match self {
            ExportPacket::V1 { .. } => 1,
            ExportPacket::V5 { .. } => 5,
            ExportPacket::V9 { .. } => 9,
            ExportPacket::Ipfix { .. } => 10,
        }
    }

    pub fn flows(&self) -> &[FlowRecord] {
        match self {
            ExportPacket::V1 { flows, .. } => flows,
            ExportPacket::V5 { flows, .. } => flows,
            ExportPacket::V9 { flows, .. } => flows,
            ExportPacket::Ipfix { flows, .. } => flows,
        }
    }
}
