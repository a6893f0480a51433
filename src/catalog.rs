//! Shared v9/IPFIX Information Element catalog (§4.3, §4.4).
//!
//! NetFlow v9 and IPFIX number their fields identically below the
//! enterprise-bit boundary (RFC 3954 §8 / the IANA IPFIX Information
//! Elements registry), so one table serves both parsers.
//!
//! Field ids use canonical uppercase-underscore identifiers and
//! are expressed as plain data (a name plus a [`FieldKind`]) rather than a
//! Rust enum matched against one `Option<T>` struct field per id — the
//! "dynamic attribute assignment" pattern §9 calls out for
//! replacement. Unknown ids are not an error: they decode as opaque
//! bytes and are surfaced under a synthesized `_<id>` name so no information
//! is lost.

/// The semantic shape a catalog entry decodes to. The template's declared
/// field length, not this table, determines which [`crate::field_value::FieldValue`]
/// integer width is actually produced for [`FieldKind::UnsignedInt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    UnsignedInt,
    Ipv4Addr,
    Ipv6Addr,
    MacAddr,
    Bytes,
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn e(name: &'static str, kind: FieldKind) -> CatalogEntry {
    CatalogEntry { name, kind }
}

/// Looks up a known Information Element id. Returns `None` for ids this
/// catalog does not name; the caller is responsible for the `_<id>` /
/// `_<pen>_<id>` fallback naming (§6).
pub fn lookup(id: u16) -> Option<CatalogEntry> {
    use FieldKind::*;
    Some(match id {
        1 => e("IN_BYTES", UnsignedInt),
        2 => e("IN_PKTS", UnsignedInt),
        3 => e("FLOWS", UnsignedInt),
        4 => e("PROTOCOL", UnsignedInt),
        5 => e("SRC_TOS", UnsignedInt),
        6 => e("TCP_FLAGS", UnsignedInt),
        7 => e("L4_SRC_PORT", UnsignedInt),
        8 => e("IPV4_SRC_ADDR", Ipv4Addr),
        9 => e("SRC_MASK", UnsignedInt),
        10 => e("INPUT_SNMP", UnsignedInt),
        11 => e("L4_DST_PORT", UnsignedInt),
        12 => e("IPV4_DST_ADDR", Ipv4Addr),
        13 => e("DST_MASK", UnsignedInt),
        14 => e("OUTPUT_SNMP", UnsignedInt),
        15 => e("IPV4_NEXT_HOP", Ipv4Addr),
        16 => e("SRC_AS", UnsignedInt),
        17 => e("DST_AS", UnsignedInt),
        18 => e("BGP_IPV4_NEXT_HOP", Ipv4Addr),
        19 => e("MUL_DST_PKTS", UnsignedInt),
        20 => e("MUL_DST_BYTES", UnsignedInt),
        21 => e("LAST_SWITCHED", UnsignedInt),
        22 => e("FIRST_SWITCHED", UnsignedInt),
        23 => e("OUT_BYTES", UnsignedInt),
        24 => e("OUT_PKTS", UnsignedInt),
        25 => e("MIN_PKT_LNGTH", UnsignedInt),
        26 => e("MAX_PKT_LNGTH", UnsignedInt),
        27 => e("IPV6_SRC_ADDR", Ipv6Addr),
        28 => e("IPV6_DST_ADDR", Ipv6Addr),
        29 => e("IPV6_SRC_MASK", UnsignedInt),
        30 => e("IPV6_DST_MASK", UnsignedInt),
        31 => e("IPV6_FLOW_LABEL", UnsignedInt),
        32 => e("ICMP_TYPE", UnsignedInt),
        33 => e("MUL_IGMP_TYPE", UnsignedInt),
        34 => e("SAMPLING_INTERVAL", UnsignedInt),
        35 => e("SAMPLING_ALGORITHM", UnsignedInt),
        36 => e("FLOW_ACTIVE_TIMEOUT", UnsignedInt),
        37 => e("FLOW_INACTIVE_TIMEOUT", UnsignedInt),
        38 => e("ENGINE_TYPE", UnsignedInt),
        39 => e("ENGINE_ID", UnsignedInt),
        40 => e("TOTAL_BYTES_EXP", UnsignedInt),
        41 => e("TOTAL_PKTS_EXP", UnsignedInt),
        42 => e("TOTAL_FLOWS_EXP", UnsignedInt),
        46 => e("MPLS_TOP_LABEL_TYPE", UnsignedInt),
        47 => e("MPLS_TOP_LABEL_IP_ADDR", Ipv4Addr),
        48 => e("FLOW_SAMPLER_ID", UnsignedInt),
        49 => e("FLOW_SAMPLER_MODE", UnsignedInt),
        50 => e("FLOW_SAMPLER_RANDOM_INTERVAL", UnsignedInt),
        52 => e("MIN_TTL", UnsignedInt),
        53 => e("MAX_TTL", UnsignedInt),
        54 => e("IPV4_IDENT", UnsignedInt),
        55 => e("DST_TOS", UnsignedInt),
        56 => e("IN_SRC_MAC", MacAddr),
        57 => e("OUT_DST_MAC", MacAddr),
        58 => e("SRC_VLAN", UnsignedInt),
        59 => e("DST_VLAN", UnsignedInt),
        60 => e("IP_PROTOCOL_VERSION", UnsignedInt),
        61 => e("DIRECTION", UnsignedInt),
        62 => e("IPV6_NEXT_HOP", Ipv6Addr),
        63 => e("BGP_IPV6_NEXT_HOP", Ipv6Addr),
        64 => e("IPV6_OPTION_HEADERS", UnsignedInt),
        80 => e("IN_DST_MAC", MacAddr),
        81 => e("OUT_SRC_MAC", MacAddr),
        88 => e("FRAGMENT_OFFSET", UnsignedInt),
        89 => e("FORWARDING_STATUS", UnsignedInt),
        _ => return None,
    })
}
