//! Probe hit vectors and the session data built from them

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};

const WORD_BITS: u32 = 64;

/// Fixed-length bit vector of probe hits for one class
///
/// Decoding rejects vectors whose word count does not match their length or
/// that carry hits past the last probe.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawProbes")]
pub struct Probes {
    len: u32,
    words: Vec<u64>,
}

/// Wire form of [`Probes`], checked before use
#[derive(Deserialize)]
struct RawProbes {
    len: u32,
    words: Vec<u64>,
}

/// Inconsistent probe vector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbesError {
    /// Word count does not fit the probe count
    #[error("{len} probes need {expected} words, got {actual}")]
    WordCount {
        /// Declared probe count
        len: u32,
        /// Words needed for `len`
        expected: usize,
        /// Words received
        actual: usize,
    },

    /// Bits set beyond the declared probe count
    #[error("hits beyond probe {len}")]
    OutOfRange {
        /// Declared probe count
        len: u32,
    },
}

impl TryFrom<RawProbes> for Probes {
    type Error = ProbesError;

    fn try_from(raw: RawProbes) -> Result<Self, Self::Error> {
        let expected = raw.len.div_ceil(WORD_BITS) as usize;
        if raw.words.len() != expected {
            return Err(ProbesError::WordCount {
                len: raw.len,
                expected,
                actual: raw.words.len(),
            });
        }
        let tail = raw.len % WORD_BITS;
        if tail != 0 && raw.words.last().is_some_and(|last| last >> tail != 0) {
            return Err(ProbesError::OutOfRange { len: raw.len });
        }
        Ok(Self {
            len: raw.len,
            words: raw.words,
        })
    }
}

impl Probes {
    /// Create vector of `len` unhit probes
    #[must_use]
    pub fn new(len: u32) -> Self {
        Self {
            len,
            words: vec![0; len.div_ceil(WORD_BITS) as usize],
        }
    }

    /// Create from a boolean hit array
    #[must_use]
    pub fn from_bools(hits: &[bool]) -> Self {
        let len = u32::try_from(hits.len()).unwrap_or(u32::MAX);
        let mut probes = Self::new(len);
        for (index, _) in hits.iter().enumerate().filter(|(_, hit)| **hit) {
            probes.set(index as u32);
        }
        probes
    }

    /// Number of probes
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Whether the vector has no probes at all
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark probe `index` as hit; out-of-range indexes are ignored
    #[inline]
    pub fn set(&mut self, index: u32) {
        if index < self.len {
            self.words[(index / WORD_BITS) as usize] |= 1u64 << (index % WORD_BITS);
        }
    }

    /// Whether probe `index` was hit
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> bool {
        index < self.len && self.words[(index / WORD_BITS) as usize] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Whether any probe was hit
    #[inline]
    #[must_use]
    pub fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    /// Number of hit probes
    #[inline]
    #[must_use]
    pub fn hit_count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Logical OR with `other`, growing to the longer length
    pub fn merge(&mut self, other: &Self) {
        if other.len > self.len {
            self.len = other.len;
            let words = self.words.len().max(other.words.len());
            self.words.resize(words, 0);
        }
        for (word, theirs) in self.words.iter_mut().zip(&other.words) {
            *word |= theirs;
        }
    }

    /// Indexes of hit probes, ascending
    pub fn iter_hits(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).filter(move |i| self.get(*i))
    }
}

impl Debug for Probes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let bits: String = (0..self.len)
            .map(|i| if self.get(i) { '1' } else { '0' })
            .collect();
        write!(f, "Probes({bits})")
    }
}

/// Probe hits of one class recorded by one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecClassData {
    /// Class id assigned by the instrumentation (0 when unknown)
    #[serde(default)]
    pub id: u64,
    /// Class name in internal form
    pub class_name: String,
    /// Test that produced the hits (empty when unattributed)
    #[serde(default)]
    pub test_name: String,
    /// Hit vector
    pub probes: Probes,
}

impl ExecClassData {
    /// Create exec data for an unattributed test
    #[inline]
    #[must_use]
    pub fn new(class_name: impl Into<String>, probes: Probes) -> Self {
        Self {
            id: 0,
            class_name: class_name.into(),
            test_name: String::new(),
            probes,
        }
    }

    /// With test name
    #[inline]
    #[must_use]
    pub fn with_test(mut self, test_name: impl Into<String>) -> Self {
        self.test_name = test_name.into();
        self
    }

    /// With class id
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

/// A test identified by name and test type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypedTest {
    /// Test name
    pub name: String,
    /// Test type (e.g. `AUTO`, `MANUAL`)
    #[serde(rename = "type")]
    pub test_type: String,
}

impl TypedTest {
    /// Create typed test
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, test_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            test_type: test_type.into(),
        }
    }

    /// Stable id
    #[must_use]
    pub fn id(&self) -> String {
        crate::coverage_id(&format!("{}:{}", self.name, self.test_type))
    }
}

/// Probe data of one session, frozen at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedSession {
    /// Session id
    pub id: String,
    /// Test type of the session
    pub test_type: String,
    /// Name given to the session (used for unattributed hits)
    #[serde(default)]
    pub name: String,
    /// Exec data per `(test, class)`
    pub probes: Vec<ExecClassData>,
}

impl FinishedSession {
    /// Whether no probe was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.probes.iter().any(|d| d.probes.any())
    }

    /// Total number of hit probes
    #[must_use]
    pub fn hit_count(&self) -> u64 {
        self.probes.iter().map(|d| u64::from(d.probes.hit_count())).sum()
    }

    /// Test name of an exec datum, defaulting to the session name
    #[must_use]
    pub fn test_name_of<'a>(&'a self, data: &'a ExecClassData) -> &'a str {
        if data.test_name.is_empty() {
            &self.name
        } else {
            &data.test_name
        }
    }

    /// Tests that recorded data in this session
    #[must_use]
    pub fn tests(&self) -> BTreeSet<TypedTest> {
        self.probes
            .iter()
            .map(|d| TypedTest::new(self.test_name_of(d), self.test_type.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_count() {
        let mut probes = Probes::new(130);
        probes.set(0);
        probes.set(64);
        probes.set(129);
        probes.set(500);

        assert!(probes.get(0) && probes.get(64) && probes.get(129));
        assert!(!probes.get(1) && !probes.get(500));
        assert_eq!(probes.hit_count(), 3);
        assert_eq!(probes.iter_hits().collect::<Vec<_>>(), vec![0, 64, 129]);
    }

    #[test]
    fn merge_is_or_and_grows() {
        let mut a = Probes::from_bools(&[true, false, false]);
        let b = Probes::from_bools(&[false, true, false, true, true]);
        a.merge(&b);

        assert_eq!(a.len(), 5);
        assert_eq!(a.iter_hits().collect::<Vec<_>>(), vec![0, 1, 3, 4]);

        let before = a.clone();
        a.merge(&b);
        assert_eq!(a, before);
    }

    #[test]
    fn inconsistent_vectors_are_not_decoded() {
        let short = serde_json::from_str::<Probes>(r#"{"len":100,"words":[]}"#);
        assert!(short.unwrap_err().to_string().contains("100 probes need 2 words, got 0"));

        let long = serde_json::from_str::<Probes>(r#"{"len":3,"words":[1,0]}"#);
        assert!(long.is_err());

        let stray = serde_json::from_str::<Probes>(r#"{"len":3,"words":[9]}"#);
        assert!(stray.unwrap_err().to_string().contains("hits beyond probe 3"));

        let mut full = Probes::new(64);
        full.set(63);
        let json = serde_json::to_string(&full).unwrap();
        assert_eq!(serde_json::from_str::<Probes>(&json).unwrap(), full);
    }

    #[test]
    fn malformed_exec_data_leaves_earlier_hits_alone() {
        let raw = r#"{"class_name":"a/B","probes":{"len":100,"words":[]}}"#;
        assert!(serde_json::from_str::<ExecClassData>(raw).is_err());

        let mut merged = Probes::from_bools(&[true, true]);
        merged.merge(&Probes::new(100));
        assert_eq!(merged.len(), 100);
        assert_eq!(merged.iter_hits().collect::<Vec<_>>(), vec![0, 1]);
        assert!(!merged.get(99));
    }

    #[test]
    fn debug_prints_bits() {
        let probes = Probes::from_bools(&[true, false, true]);
        assert_eq!(format!("{probes:?}"), "Probes(101)");
    }

    #[test]
    fn empty_session_has_no_hits() {
        let session = FinishedSession {
            id: "s".into(),
            test_type: "AUTO".into(),
            name: String::new(),
            probes: vec![ExecClassData::new("a/B", Probes::new(4))],
        };
        assert!(session.is_empty());
        assert_eq!(session.hit_count(), 0);
    }

    #[test]
    fn unattributed_hits_use_session_name() {
        let session = FinishedSession {
            id: "s".into(),
            test_type: "MANUAL".into(),
            name: "smoke".into(),
            probes: vec![
                ExecClassData::new("a/B", Probes::from_bools(&[true])),
                ExecClassData::new("a/B", Probes::from_bools(&[true])).with_test("login"),
            ],
        };
        let tests: Vec<_> = session.tests().into_iter().map(|t| t.name).collect();
        assert_eq!(tests, vec!["login", "smoke"]);
    }
}
