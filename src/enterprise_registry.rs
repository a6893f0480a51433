//! Optional display names for IPFIX enterprise-specific fields (§4.4, §9).
//!
//! Narrowed to a naming role only: per §9's open-question
//! resolution, a registered name never changes how a field decodes — an
//! enterprise field's [`crate::field_value::FieldValue`] is always raw bytes,
//! regardless of whether a name is registered for it. This stays a
//! cosmetic lookup, not a parsing hook, matching the Non-goal on enterprise
//! PEN semantics beyond field-id passthrough.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct EnterpriseFieldRegistry {
    names: HashMap<(u32, u16), String>,
}

impl EnterpriseFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, enterprise_number: u32, element_id: u16, name: impl Into<String>) {
        self.names.insert((enterprise_number, element_id), name.into());
    }

    pub fn lookup(&self, enterprise_number: u32, element_id: u16) -> Option<&str> {
        self.names
            .get(&(enterprise_number, element_id))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_pen_and_id_resolve_to_a_name() {
        let mut reg = EnterpriseFieldRegistry::new();
        reg.register(12345, 1, "customMetric");
        assert_eq!(reg.lookup(12345, 1), Some("customMetric"));
        assert_eq!(reg.lookup(12345, 2), None);
    }
}
