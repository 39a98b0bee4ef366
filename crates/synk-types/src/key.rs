//! Component identity.

use serde::{Deserialize, Serialize};

/// Immutable `(type_tag, name)` pair identifying a registered component.
///
/// The type tag groups components by role (`"resource"`, `"agent"`,
/// `"data"`); the name is the canonical `snake_case` form of the
/// component's concrete type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentKey {
    /// Role of the component (e.g. `"resource"`).
    pub type_tag: String,
    /// Canonical component name (e.g. `"clock"`).
    pub name: String,
}

impl ComponentKey {
    /// Build a key from a type tag and name.
    pub fn new(type_tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            name: name.into(),
        }
    }
}

impl core::fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.type_tag, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_tag_and_name() {
        let key = ComponentKey::new("resource", "clock");
        assert_eq!(key.to_string(), "resource/clock");
    }

    #[test]
    fn keys_order_by_tag_then_name() {
        let a = ComponentKey::new("agent", "zebra");
        let b = ComponentKey::new("resource", "apple");
        assert!(a < b);
    }
}
