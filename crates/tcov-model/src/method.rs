//! Build methods and their identity
//!
//! Provides [`Method`], the unit the differ and the risk ledger operate on, and
//! helpers for rendering JVM method descriptors.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::Chars;

/// Marker in the name of compiler-synthesized lambda helpers
pub const LAMBDA: &str = "lambda$";

/// Identity key of a method: `(owner_class, name, desc)`, ordered lexicographically
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodKey {
    /// Owner class in internal form (`com/example/Foo`)
    pub owner_class: String,
    /// Method name
    pub name: String,
    /// JVM descriptor
    pub desc: String,
}

impl Display for MethodKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner_class, self.name, self.desc)
    }
}

/// A method declared in a build
///
/// Two methods have the same identity when their [`MethodKey`] matches.
/// Equality additionally requires the content hash to match; lambda hashes
/// are derived data and never take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    /// Owner class in internal form
    pub owner_class: String,
    /// Method name
    pub name: String,
    /// JVM descriptor
    pub desc: String,
    /// Content hash of the method body
    pub hash: String,
    /// Hashes of lambda bodies declared by this method, keyed by synthetic name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lambdas_hash: BTreeMap<String, String>,
}

impl Method {
    /// Create a method without lambdas
    #[inline]
    #[must_use]
    pub fn new(
        owner_class: impl Into<String>,
        name: impl Into<String>,
        desc: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            owner_class: owner_class.into(),
            name: name.into(),
            desc: desc.into(),
            hash: hash.into(),
            lambdas_hash: BTreeMap::new(),
        }
    }

    /// With lambda body hashes
    #[inline]
    #[must_use]
    pub fn with_lambdas<I, K, V>(mut self, lambdas: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.lambdas_hash = lambdas
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Owned identity key
    #[must_use]
    pub fn key(&self) -> MethodKey {
        MethodKey {
            owner_class: self.owner_class.clone(),
            name: self.name.clone(),
            desc: self.desc.clone(),
        }
    }

    /// Compare identity keys only, ignoring content
    #[inline]
    #[must_use]
    pub fn identity_cmp(&self, other: &Self) -> Ordering {
        self.owner_class
            .cmp(&other.owner_class)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.desc.cmp(&other.desc))
    }

    /// Whether `other` has the same identity key
    #[inline]
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.identity_cmp(other) == Ordering::Equal
    }

    /// Full name, `owner.name desc`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}{}", self.owner_class, self.name, self.desc)
    }

    /// Signature, `owner:name desc`
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}:{}{}", self.owner_class, self.name, self.desc)
    }

    /// Whether this is a synthesized lambda helper
    #[inline]
    #[must_use]
    pub fn is_lambda(&self) -> bool {
        self.name.contains(LAMBDA)
    }

    /// Java-style declaration of the descriptor
    #[must_use]
    pub fn declaration(&self) -> String {
        declaration(&self.desc)
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other) && self.hash == other.hash
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner_class.hash(state);
        self.name.hash(state);
        self.desc.hash(state);
        self.hash.hash(state);
    }
}

impl PartialOrd for Method {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Method {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity_cmp(other)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner_class, self.name, self.desc)
    }
}

/// Render a JVM method descriptor as a Java-style declaration
///
/// - `()V` -> `(): void`
/// - `(IZ)V` -> `(int, boolean): void`
/// - `([[IJLjava/lang/String;)Ljava/lang/String;` -> `(int[][], long, String): String`
///
/// Returns an empty string when `desc` is not a method descriptor.
#[must_use]
pub fn declaration(desc: &str) -> String {
    let Some(rest) = desc.strip_prefix('(') else {
        return String::new();
    };
    let Some(close) = rest.rfind(')') else {
        return String::new();
    };
    let (args, ret) = (&rest[..close], &rest[close + 1..]);
    if ret.is_empty() {
        return String::new();
    }
    let args = parse_desc_types(args).join(", ");
    let ret = parse_desc_types(ret).into_iter().next().unwrap_or_default();
    format!("({args}): {ret}")
}

/// Split a sequence of field descriptors into readable type names
#[must_use]
pub fn parse_desc_types(desc: &str) -> Vec<String> {
    let mut chars = desc.chars();
    let mut types = Vec::new();
    while let Some(c) = chars.next() {
        types.push(parse_desc_type(c, &mut chars));
    }
    types
}

fn parse_desc_type(c: char, chars: &mut Chars<'_>) -> String {
    match c {
        'V' => "void".to_string(),
        'J' => "long".to_string(),
        'Z' => "boolean".to_string(),
        'I' => "int".to_string(),
        'F' => "float".to_string(),
        'B' => "byte".to_string(),
        'D' => "double".to_string(),
        'S' => "short".to_string(),
        'C' => "char".to_string(),
        '[' => match chars.next() {
            Some(next) => format!("{}[]", parse_desc_type(next, chars)),
            None => "!Error".to_string(),
        },
        'L' => {
            let object: String = chars.by_ref().take_while(|&c| c != ';').collect();
            object
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        }
        _ => "!Error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn declaration_renders_descriptors() {
        assert_eq!(declaration("()V"), "(): void");
        assert_eq!(declaration("(IZ)V"), "(int, boolean): void");
        assert_eq!(declaration("(ILjava/lang/String;)V"), "(int, String): void");
        assert_eq!(
            declaration("([Ljava/lang/String;IJ)V"),
            "(String[], int, long): void"
        );
        assert_eq!(
            declaration("([[IJLjava/lang/String;)Ljava/lang/String;"),
            "(int[][], long, String): String"
        );
    }

    #[test]
    fn declaration_of_garbage_is_empty() {
        assert_eq!(declaration(""), "");
        assert_eq!(declaration("V"), "");
        assert_eq!(declaration("(I"), "");
        assert_eq!(declaration("(I)"), "");
        assert_eq!(declaration("(Q)V"), "(!Error): void");
    }

    #[test]
    fn equality_includes_hash_but_not_lambdas() {
        let a = Method::new("a/B", "run", "()V", "h1").with_lambdas([("lambda$run$0", "x")]);
        let b = Method::new("a/B", "run", "()V", "h1");
        let c = Method::new("a/B", "run", "()V", "h2");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.same_identity(&c));

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn identity_order_is_lexicographic() {
        let mut methods = vec![
            Method::new("b/A", "a", "()V", ""),
            Method::new("a/Z", "z", "()V", ""),
            Method::new("a/Z", "a", "(I)V", ""),
            Method::new("a/Z", "a", "()V", ""),
        ];
        methods.sort();
        let names: Vec<_> = methods.iter().map(Method::full_name).collect();
        assert_eq!(
            names,
            vec!["a/Z.a()V", "a/Z.a(I)V", "a/Z.z()V", "b/A.a()V"]
        );
    }

    #[test]
    fn lambda_detection() {
        assert!(Method::new("a/B", "lambda$run$0", "()V", "").is_lambda());
        assert!(!Method::new("a/B", "run", "()V", "").is_lambda());
    }

    #[test]
    fn names_and_signature() {
        let m = Method::new("com/acme/Foo", "bar", "(I)V", "h");
        assert_eq!(m.full_name(), "com/acme/Foo.bar(I)V");
        assert_eq!(m.signature(), "com/acme/Foo:bar(I)V");
        assert_eq!(m.key().to_string(), m.full_name());
        assert_eq!(m.declaration(), "(int): void");
    }
}
