//! `ExporterKey`: the identity under which templates are namespaced.
//!
//! Collapsed into one composite key since the dispatch layer treats v9's
//! `source_id` and IPFIX's `observation_domain_id` as the same kind of thing
//! (a per-exporter namespace discriminator alongside the transport address).

use serde::Serialize;
use std::net::SocketAddr;

/// Tuple of (transport address, source/observation-domain id) uniquely
/// identifying a template namespace. Derived per datagram by the embedder
/// (typically from the UDP peer address and a peek of the header) and passed
/// into [`crate::decoder::Decoder::decode`]; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ExporterKey {
    pub address: SocketAddr,
    pub scope_id: u32,
}

impl ExporterKey {
    pub fn new(address: SocketAddr, scope_id: u32) -> Self {
        ExporterKey { address, scope_id }
    }
}
