//! Stable coverage keys for package/class/method nodes

use crate::method::Method;
use serde::{Deserialize, Serialize};

/// Stable short id of a coverage node name (first 8 bytes of Blake3, hex)
#[must_use]
pub fn coverage_id(name: &str) -> String {
    hex::encode(&blake3::hash(name.as_bytes()).as_bytes()[..8])
}

/// Package part of an internal class name (`com/acme/Foo` -> `com/acme`)
#[inline]
#[must_use]
pub fn package_of(class_name: &str) -> &str {
    class_name.rsplit_once('/').map_or("", |(package, _)| package)
}

/// Simple class name (`com/acme/Foo` -> `Foo`)
#[inline]
#[must_use]
pub fn simple_name(class_name: &str) -> &str {
    class_name.rsplit_once('/').map_or(class_name, |(_, name)| name)
}

/// Key addressing one node of the coverage tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverageKey {
    /// Stable id
    pub id: String,
    /// Package of the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Class of the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Method name for method nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    /// Method descriptor for method nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_desc: Option<String>,
}

impl CoverageKey {
    /// Key of a package
    #[must_use]
    pub fn package(name: &str) -> Self {
        Self {
            id: coverage_id(name),
            package_name: Some(name.to_string()),
            class_name: None,
            method_name: None,
            method_desc: None,
        }
    }

    /// Key of a class
    #[must_use]
    pub fn class(full_name: &str) -> Self {
        Self {
            id: coverage_id(full_name),
            package_name: Some(package_of(full_name).to_string()),
            class_name: Some(full_name.to_string()),
            method_name: None,
            method_desc: None,
        }
    }

    /// Key of a method
    #[must_use]
    pub fn method(method: &Method) -> Self {
        Self {
            id: coverage_id(&method.full_name()),
            package_name: Some(package_of(&method.owner_class).to_string()),
            class_name: Some(method.owner_class.clone()),
            method_name: Some(method.name.clone()),
            method_desc: Some(method.desc.clone()),
        }
    }

    /// Whether the key addresses a method
    #[inline]
    #[must_use]
    pub fn is_method(&self) -> bool {
        self.method_name.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_short() {
        let a = coverage_id("com/acme/Foo");
        assert_eq!(a, coverage_id("com/acme/Foo"));
        assert_ne!(a, coverage_id("com/acme/Bar"));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn class_name_parts() {
        assert_eq!(package_of("com/acme/Foo"), "com/acme");
        assert_eq!(package_of("Foo"), "");
        assert_eq!(simple_name("com/acme/Foo"), "Foo");
        assert_eq!(simple_name("Foo"), "Foo");
    }

    #[test]
    fn method_key_carries_all_parts() {
        let key = CoverageKey::method(&Method::new("com/acme/Foo", "bar", "()V", "h"));
        assert!(key.is_method());
        assert_eq!(key.package_name.as_deref(), Some("com/acme"));
        assert_eq!(key.class_name.as_deref(), Some("com/acme/Foo"));
        assert!(!CoverageKey::class("com/acme/Foo").is_method());
    }
}
