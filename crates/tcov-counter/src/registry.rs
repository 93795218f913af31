//! Static class metadata and its arena-indexed registry
//!
//! The registry is an explicit context object built once per build from the
//! instrumentation's class descriptions and passed by reference to every
//! aggregation. Classes are addressed by [`ClassIndex`] into a flat arena.

use crate::error::MetadataError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tcov_model::{ExecClassData, Method, Probes};

/// Instruction weight of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeWeight {
    /// Probe index within the class
    pub probe: u32,
    /// Instructions executed when the probe is hit
    pub instructions: u32,
}

/// Static description of a method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodMetadata {
    /// Method name
    pub name: String,
    /// JVM descriptor
    pub desc: String,
    /// Content hash of the body
    pub hash: String,
    /// Lambda body hashes keyed by synthetic name
    #[serde(default)]
    pub lambdas_hash: BTreeMap<String, String>,
    /// Probes belonging to the method
    pub probes: Vec<ProbeWeight>,
}

impl MethodMetadata {
    /// Create method metadata
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        desc: impl Into<String>,
        hash: impl Into<String>,
        probes: Vec<ProbeWeight>,
    ) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            hash: hash.into(),
            lambdas_hash: BTreeMap::new(),
            probes,
        }
    }

    /// Total instructions of the method
    #[must_use]
    pub fn instructions(&self) -> u32 {
        self.probes.iter().map(|p| p.instructions).sum()
    }
}

/// Static description of a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMetadata {
    /// Class id assigned by the instrumentation
    #[serde(default)]
    pub id: u64,
    /// Class name in internal form
    pub name: String,
    /// Length of the class probe vector
    pub probe_count: u32,
    /// Declared methods
    pub methods: Vec<MethodMetadata>,
}

impl ClassMetadata {
    /// Check the class for internal consistency
    ///
    /// # Errors
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.is_empty() {
            return Err(MetadataError::EmptyClassName);
        }
        let mut seen = HashSet::new();
        for method in &self.methods {
            for weight in &method.probes {
                if weight.probe >= self.probe_count {
                    return Err(MetadataError::ProbeOutOfRange {
                        class: self.name.clone(),
                        method: method.name.clone(),
                        probe: weight.probe,
                        probe_count: self.probe_count,
                    });
                }
                if !seen.insert(weight.probe) {
                    return Err(MetadataError::DuplicateProbe {
                        class: self.name.clone(),
                        probe: weight.probe,
                    });
                }
            }
        }
        Ok(())
    }

    /// Build methods declared by the class
    pub fn to_methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.methods.iter().map(|m| {
            Method::new(self.name.as_str(), m.name.as_str(), m.desc.as_str(), m.hash.as_str())
                .with_lambdas(m.lambdas_hash.clone())
        })
    }
}

/// Index of a class in a [`ClassRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassIndex(u32);

impl ClassIndex {
    /// Position in the arena
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }
}

/// Exec data merged per class, with the data that had to be skipped
#[derive(Debug, Clone, Default)]
pub struct MergedHits {
    /// OR-merged hit vector per class
    pub hits: HashMap<ClassIndex, Probes>,
    /// Exec data rejected against the metadata
    pub skipped: Vec<MetadataError>,
}

/// Arena of validated class metadata
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassMetadata>,
    by_name: HashMap<String, ClassIndex>,
}

impl ClassRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, skipping invalid classes with a warning
    pub fn from_classes(classes: impl IntoIterator<Item = ClassMetadata>) -> (Self, Vec<MetadataError>) {
        let mut registry = Self::new();
        let mut skipped = Vec::new();
        for class in classes {
            if let Err(e) = registry.register(class) {
                tracing::warn!(error = %e, "Class metadata skipped");
                skipped.push(e);
            }
        }
        (registry, skipped)
    }

    /// Add a class
    ///
    /// # Errors
    /// Returns error if the class is inconsistent or already registered.
    pub fn register(&mut self, class: ClassMetadata) -> Result<ClassIndex, MetadataError> {
        class.validate()?;
        if self.by_name.contains_key(&class.name) {
            return Err(MetadataError::DuplicateClass(class.name));
        }
        let index = ClassIndex(u32::try_from(self.classes.len()).unwrap_or(u32::MAX));
        self.by_name.insert(class.name.clone(), index);
        self.classes.push(class);
        Ok(index)
    }

    /// Number of classes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no class is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class at `index`
    #[inline]
    #[must_use]
    pub fn get(&self, index: ClassIndex) -> Option<&ClassMetadata> {
        self.classes.get(index.get())
    }

    /// Index of a class by name
    #[inline]
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<ClassIndex> {
        self.by_name.get(name).copied()
    }

    /// Classes with their indexes, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (ClassIndex, &ClassMetadata)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassIndex(u32::try_from(i).unwrap_or(u32::MAX)), c))
    }

    /// Every method of the build
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        self.classes.iter().flat_map(ClassMetadata::to_methods).collect()
    }

    /// OR-merge exec data per class
    ///
    /// Exec data for unknown classes, or longer than the class probe count,
    /// is skipped and reported in [`MergedHits::skipped`].
    pub fn merge_hits<'a>(&self, data: impl IntoIterator<Item = &'a ExecClassData>) -> MergedHits {
        let mut merged = MergedHits::default();
        for exec in data {
            let Some(index) = self.index_of(&exec.class_name) else {
                merged.skipped.push(MetadataError::UnknownClass(exec.class_name.clone()));
                continue;
            };
            let class = &self.classes[index.get()];
            if exec.probes.len() > class.probe_count {
                merged.skipped.push(MetadataError::ProbeCountMismatch {
                    class: class.name.clone(),
                    expected: class.probe_count,
                    actual: exec.probes.len(),
                });
                continue;
            }
            merged
                .hits
                .entry(index)
                .or_insert_with(|| Probes::new(class.probe_count))
                .merge(&exec.probes);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(range: std::ops::Range<u32>) -> Vec<ProbeWeight> {
        range.map(|probe| ProbeWeight { probe, instructions: 2 }).collect()
    }

    fn class(name: &str) -> ClassMetadata {
        ClassMetadata {
            id: 1,
            name: name.to_string(),
            probe_count: 4,
            methods: vec![
                MethodMetadata::new("a", "()V", "ha", weights(0..2)),
                MethodMetadata::new("b", "()V", "hb", weights(2..4)),
            ],
        }
    }

    #[test]
    fn invalid_classes_are_skipped() {
        let mut out_of_range = class("p/Bad");
        out_of_range.probe_count = 3;
        let mut overlapping = class("p/Overlap");
        overlapping.methods[1].probes = weights(1..3);

        let (registry, skipped) = ClassRegistry::from_classes([
            class("p/Good"),
            out_of_range,
            overlapping,
            class("p/Good"),
            ClassMetadata { name: String::new(), ..class("x") },
        ]);

        assert_eq!(registry.len(), 1);
        assert!(registry.index_of("p/Good").is_some());
        assert_eq!(skipped.len(), 4);
        assert!(matches!(skipped[0], MetadataError::ProbeOutOfRange { probe: 3, .. }));
        assert!(matches!(skipped[1], MetadataError::DuplicateProbe { probe: 1, .. }));
        assert_eq!(skipped[2], MetadataError::DuplicateClass("p/Good".into()));
        assert_eq!(skipped[3], MetadataError::EmptyClassName);
    }

    #[test]
    fn methods_carry_owner_and_hash() {
        let (registry, _) = ClassRegistry::from_classes([class("p/A")]);
        let methods = registry.methods();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].owner_class, "p/A");
        assert_eq!(methods[1].hash, "hb");
    }

    #[test]
    fn merge_hits_ors_and_skips() {
        let (registry, _) = ClassRegistry::from_classes([class("p/A")]);
        let data = [
            ExecClassData::new("p/A", Probes::from_bools(&[true, false, false, false])),
            ExecClassData::new("p/A", Probes::from_bools(&[false, false, true])),
            ExecClassData::new("p/Missing", Probes::from_bools(&[true])),
            ExecClassData::new("p/A", Probes::from_bools(&[true; 5])),
        ];

        let merged = registry.merge_hits(&data);
        let index = registry.index_of("p/A").unwrap();
        let hits = &merged.hits[&index];
        assert_eq!(hits.len(), 4);
        assert_eq!(hits.iter_hits().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(merged.skipped.len(), 2);
        assert_eq!(merged.skipped[0].class_name(), Some("p/Missing"));
    }
}
