//! Method differ
//!
//! Classifies the methods of a build against a baseline build with a
//! two-pointer merge over identity-sorted sequences.

use crate::method::Method;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Classification of a build's methods against its baseline
///
/// # Invariants
/// With lambda helpers removed from both inputs:
/// - `new ∪ modified ∪ unaffected == current`
/// - `deleted ∪ modified ∪ unaffected == baseline`
/// - the four lists are pairwise disjoint
///
/// `modified` and `unaffected` hold the *current* version of each method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffMethods {
    /// Present only in the current build
    pub new: Vec<Method>,
    /// Present in both with different content
    pub modified: Vec<Method>,
    /// Present only in the baseline
    pub deleted: Vec<Method>,
    /// Present in both with the same content
    pub unaffected: Vec<Method>,
}

impl DiffMethods {
    /// Every method of the current build (new, modified, unaffected)
    pub fn current(&self) -> impl Iterator<Item = &Method> {
        self.new
            .iter()
            .chain(self.modified.iter())
            .chain(self.unaffected.iter())
    }

    /// Risk methods: new and modified
    pub fn risks(&self) -> impl Iterator<Item = &Method> {
        self.new.iter().chain(self.modified.iter())
    }

    /// Number of risk methods
    #[inline]
    #[must_use]
    pub fn risk_count(&self) -> usize {
        self.new.len() + self.modified.len()
    }

    /// Whether nothing changed against the baseline
    #[inline]
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Diff `current` against `baseline`
///
/// Inputs need not be sorted. Lambda helpers are dropped from the output;
/// their bodies only count through the `lambdas_hash` of the enclosing method.
///
/// A method present in both builds is unaffected when its content hash is
/// equal and every lambda hash of the current version is found among the
/// baseline's lambda hash *values* (synthetic lambda names are not stable
/// across recompiles).
#[must_use]
pub fn diff(current: &[Method], baseline: &[Method]) -> DiffMethods {
    let current = sorted_without_lambdas(current);
    let baseline = sorted_without_lambdas(baseline);

    let mut result = DiffMethods::default();
    let (mut i, mut j) = (0, 0);
    while i < current.len() && j < baseline.len() {
        let (left, right) = (current[i], baseline[j]);
        match left.identity_cmp(right) {
            Ordering::Less => {
                result.new.push(left.clone());
                i += 1;
            }
            Ordering::Greater => {
                result.deleted.push(right.clone());
                j += 1;
            }
            Ordering::Equal => {
                if is_unaffected(left, right) {
                    result.unaffected.push(left.clone());
                } else {
                    result.modified.push(left.clone());
                }
                i += 1;
                j += 1;
            }
        }
    }
    result.new.extend(current[i..].iter().map(|m| (*m).clone()));
    result.deleted.extend(baseline[j..].iter().map(|m| (*m).clone()));
    result
}

fn sorted_without_lambdas(methods: &[Method]) -> Vec<&Method> {
    let mut sorted: Vec<&Method> = methods.iter().filter(|m| !m.is_lambda()).collect();
    sorted.sort_by(|a, b| a.identity_cmp(b));
    sorted
}

fn is_unaffected(current: &Method, baseline: &Method) -> bool {
    if current.hash != baseline.hash {
        return false;
    }
    if current.lambdas_hash.is_empty() {
        return true;
    }
    let known: HashSet<&str> = baseline.lambdas_hash.values().map(String::as_str).collect();
    current
        .lambdas_hash
        .values()
        .all(|hash| known.contains(hash.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(name: &str, hash: &str) -> Method {
        Method::new("com/acme/Service", name, "()V", hash)
    }

    #[test]
    fn empty_baseline_makes_everything_new() {
        let result = diff(&[m("m1", "a")], &[]);
        assert_eq!(result.new, vec![m("m1", "a")]);
        assert!(result.modified.is_empty());
        assert!(result.deleted.is_empty());
        assert!(result.unaffected.is_empty());
    }

    #[test]
    fn same_content_is_unaffected() {
        let result = diff(&[m("m1", "a")], &[m("m1", "a")]);
        assert_eq!(result.unaffected, vec![m("m1", "a")]);
        assert!(result.is_unchanged());
    }

    #[test]
    fn changed_hash_is_modified() {
        let result = diff(&[m("m1", "b")], &[m("m1", "a")]);
        assert_eq!(result.modified, vec![m("m1", "b")]);
        assert!(result.new.is_empty());
        assert!(result.deleted.is_empty());
    }

    #[test]
    fn empty_current_makes_everything_deleted() {
        let result = diff(&[], &[m("m1", "a")]);
        assert_eq!(result.deleted, vec![m("m1", "a")]);
        assert!(result.new.is_empty());
    }

    #[test]
    fn interleaved_sets() {
        let current = vec![m("d", "1"), m("a", "1"), m("c", "2")];
        let baseline = vec![m("b", "1"), m("c", "1"), m("e", "1"), m("a", "1")];

        let result = diff(&current, &baseline);
        assert_eq!(result.new, vec![m("d", "1")]);
        assert_eq!(result.modified, vec![m("c", "2")]);
        assert_eq!(result.unaffected, vec![m("a", "1")]);
        assert_eq!(result.deleted, vec![m("b", "1"), m("e", "1")]);
        assert_eq!(result.risk_count(), 2);
    }

    #[test]
    fn lambda_helpers_are_excluded() {
        let current = vec![m("run", "1"), m("lambda$run$0", "x")];
        let baseline = vec![m("lambda$run$1", "y")];

        let result = diff(&current, &baseline);
        assert_eq!(result.new, vec![m("run", "1")]);
        assert!(result.deleted.is_empty());
    }

    #[test]
    fn renamed_lambda_with_same_body_is_unaffected() {
        let current = m("run", "1").with_lambdas([("lambda$run$1", "body")]);
        let baseline = m("run", "1").with_lambdas([("lambda$run$0", "body")]);

        let result = diff(&[current], &[baseline]);
        assert_eq!(result.unaffected.len(), 1);
    }

    #[test]
    fn changed_lambda_body_is_modified() {
        let current = m("run", "1").with_lambdas([("lambda$run$0", "new-body")]);
        let baseline = m("run", "1").with_lambdas([("lambda$run$0", "body")]);

        let result = diff(&[current], &[baseline]);
        assert_eq!(result.modified.len(), 1);
    }

    #[test]
    fn lambda_names_are_not_matched_as_values() {
        let current = m("run", "1").with_lambdas([("lambda$run$0", "lambda$run$0")]);
        let baseline = m("run", "1").with_lambdas([("lambda$run$0", "body")]);

        let result = diff(&[current], &[baseline]);
        assert_eq!(result.modified.len(), 1);
    }
}
