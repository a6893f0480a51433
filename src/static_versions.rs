//! Fixed-layout, template-free parsers: v1 and v5 (§4.6).

pub mod v1;
pub mod v5;
