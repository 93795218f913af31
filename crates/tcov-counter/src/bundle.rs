//! Bundle counters
//!
//! A [`BundleCounter`] rolls probe hits up from methods to classes, packages
//! and the whole bundle. Every registered class contributes its totals, hit
//! or not; a probe hit in several sessions counts once.

use crate::error::MetadataError;
use crate::registry::{ClassIndex, ClassRegistry};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tcov_model::{package_of, Count, ExecClassData, FinishedSession, MethodKey, Probes, TypedTest};

/// Name of the bundle over all sessions
pub const ALL: &str = "all";

/// Counter of one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCounter {
    /// Method name
    pub name: String,
    /// JVM descriptor
    pub desc: String,
    /// Instruction counter
    pub count: Count,
}

/// Counter of one class with its methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounter {
    /// Class id assigned by the instrumentation
    pub id: u64,
    /// Class name in internal form
    pub name: String,
    /// Instruction counter
    pub count: Count,
    /// Method counters in declaration order
    pub methods: Vec<MethodCounter>,
}

/// Counter of one package with its classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCounter {
    /// Package name in internal form
    pub name: String,
    /// Instruction counter
    pub count: Count,
    /// Class counters ordered by name
    pub classes: Vec<ClassCounter>,
}

/// Coverage counters of one set of probe hits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleCounter {
    /// Bundle name
    pub name: String,
    /// Instruction counter over everything
    pub count: Count,
    /// Covered/total methods (methods without instructions excluded)
    pub method_count: Count,
    /// Covered/total classes
    pub class_count: Count,
    /// Covered/total packages
    pub package_count: Count,
    /// Package counters ordered by name
    pub packages: Vec<PackageCounter>,
    methods: BTreeMap<MethodKey, Count>,
}

impl BundleCounter {
    /// Aggregate merged hits against the registry
    #[must_use]
    pub fn from_hits(
        name: impl Into<String>,
        registry: &ClassRegistry,
        hits: &HashMap<ClassIndex, Probes>,
    ) -> Self {
        let mut methods = BTreeMap::new();
        let mut by_package: BTreeMap<String, Vec<ClassCounter>> = BTreeMap::new();

        for (index, class) in registry.iter() {
            let class_hits = hits.get(&index);
            let method_counters: Vec<MethodCounter> = class
                .methods
                .iter()
                .map(|m| {
                    let covered = class_hits.map_or(0, |h| {
                        m.probes
                            .iter()
                            .filter(|w| h.get(w.probe))
                            .map(|w| w.instructions)
                            .sum()
                    });
                    let count = Count::new(covered, m.instructions());
                    methods.insert(
                        MethodKey {
                            owner_class: class.name.clone(),
                            name: m.name.clone(),
                            desc: m.desc.clone(),
                        },
                        count,
                    );
                    MethodCounter {
                        name: m.name.clone(),
                        desc: m.desc.clone(),
                        count,
                    }
                })
                .collect();

            by_package
                .entry(package_of(&class.name).to_string())
                .or_default()
                .push(ClassCounter {
                    id: class.id,
                    name: class.name.clone(),
                    count: method_counters.iter().map(|m| m.count).sum(),
                    methods: method_counters,
                });
        }

        let packages: Vec<PackageCounter> = by_package
            .into_iter()
            .map(|(name, mut classes)| {
                classes.sort_by(|a, b| a.name.cmp(&b.name));
                PackageCounter {
                    name,
                    count: classes.iter().map(|c| c.count).sum(),
                    classes,
                }
            })
            .collect();

        Self {
            name: name.into(),
            count: packages.iter().map(|p| p.count).sum(),
            method_count: node_count(methods.values().copied()),
            class_count: node_count(packages.iter().flat_map(|p| &p.classes).map(|c| c.count)),
            package_count: node_count(packages.iter().map(|p| p.count)),
            packages,
            methods,
        }
    }

    /// Counter of a method; zero for unknown methods
    #[must_use]
    pub fn count_of(&self, key: &MethodKey) -> Count {
        self.methods.get(key).copied().unwrap_or(Count::ZERO)
    }

    /// Counters of every method
    pub fn method_counts(&self) -> impl Iterator<Item = (&MethodKey, Count)> {
        self.methods.iter().map(|(k, c)| (k, *c))
    }

    /// Methods with at least one covered instruction
    pub fn covered_methods(&self) -> impl Iterator<Item = (&MethodKey, Count)> {
        self.method_counts().filter(|(_, c)| c.is_covered())
    }

    /// Whether anything is covered
    #[inline]
    #[must_use]
    pub fn is_covered(&self) -> bool {
        self.count.is_covered()
    }
}

/// Covered/total nodes, counting only nodes that have instructions
fn node_count(counts: impl Iterator<Item = Count>) -> Count {
    let (covered, total) = counts
        .filter(|c| c.total > 0)
        .fold((0u32, 0u32), |(covered, total), c| {
            (covered + u32::from(c.is_covered()), total + 1)
        });
    Count::new(covered, total)
}

/// Aggregate exec data into one bundle, logging skipped data
pub fn bundle<'a>(
    name: impl Into<String>,
    registry: &ClassRegistry,
    data: impl IntoIterator<Item = &'a ExecClassData>,
) -> BundleCounter {
    let merged = registry.merge_hits(data);
    for skipped in &merged.skipped {
        tracing::warn!(error = %skipped, "Exec data skipped");
    }
    BundleCounter::from_hits(name, registry, &merged.hits)
}

/// Bundles over all sessions, per test type and per test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleCounters {
    /// Every session together
    pub all: BundleCounter,
    /// Sessions grouped by test type
    pub by_test_type: BTreeMap<String, BundleCounter>,
    /// Exec data grouped by test
    pub by_test: BTreeMap<TypedTest, BundleCounter>,
    /// Exec data rejected against the metadata
    pub skipped: Vec<MetadataError>,
}

impl BundleCounters {
    /// Aggregate sessions; per-test bundles are computed in parallel
    pub fn calculate<'a>(
        registry: &ClassRegistry,
        sessions: impl IntoIterator<Item = &'a FinishedSession>,
    ) -> Self {
        let sessions: Vec<&FinishedSession> = sessions.into_iter().collect();

        let merged = registry.merge_hits(sessions.iter().flat_map(|s| &s.probes));
        if !merged.skipped.is_empty() {
            tracing::warn!(count = merged.skipped.len(), "Exec data skipped during aggregation");
            for skipped in &merged.skipped {
                tracing::debug!(error = %skipped, "Skipped exec data");
            }
        }
        let all = BundleCounter::from_hits(ALL, registry, &merged.hits);

        let mut by_type: BTreeMap<String, Vec<&ExecClassData>> = BTreeMap::new();
        let mut by_test: BTreeMap<TypedTest, Vec<&ExecClassData>> = BTreeMap::new();
        for session in &sessions {
            for exec in &session.probes {
                by_type.entry(session.test_type.clone()).or_default().push(exec);
                by_test
                    .entry(TypedTest::new(session.test_name_of(exec), session.test_type.as_str()))
                    .or_default()
                    .push(exec);
            }
        }

        let by_test_type = by_type
            .into_par_iter()
            .map(|(test_type, data)| {
                let merged = registry.merge_hits(data);
                let counter = BundleCounter::from_hits(test_type.as_str(), registry, &merged.hits);
                (test_type, counter)
            })
            .collect();

        let by_test = by_test
            .into_par_iter()
            .map(|(test, data)| {
                let merged = registry.merge_hits(data);
                let counter = BundleCounter::from_hits(test.name.as_str(), registry, &merged.hits);
                (test, counter)
            })
            .collect();

        tracing::debug!(sessions = sessions.len(), count = ?all.count, "Bundle counters calculated");
        Self {
            all,
            by_test_type,
            by_test,
            skipped: merged.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClassMetadata, MethodMetadata, ProbeWeight};

    fn registry() -> ClassRegistry {
        let class = ClassMetadata {
            id: 7,
            name: "com/acme/Foo".into(),
            probe_count: 3,
            methods: vec![
                MethodMetadata::new(
                    "run",
                    "()V",
                    "h1",
                    vec![
                        ProbeWeight { probe: 0, instructions: 4 },
                        ProbeWeight { probe: 1, instructions: 6 },
                    ],
                ),
                MethodMetadata::new("<init>", "()V", "h2", vec![]),
                MethodMetadata::new("stop", "()V", "h3", vec![ProbeWeight { probe: 2, instructions: 5 }]),
            ],
        };
        let other = ClassMetadata {
            id: 8,
            name: "com/other/Bar".into(),
            probe_count: 1,
            methods: vec![MethodMetadata::new("go", "()V", "h4", vec![ProbeWeight { probe: 0, instructions: 3 }])],
        };
        ClassRegistry::from_classes([class, other]).0
    }

    fn key(owner: &str, name: &str) -> MethodKey {
        MethodKey {
            owner_class: owner.into(),
            name: name.into(),
            desc: "()V".into(),
        }
    }

    #[test]
    fn rollup_sums_children() {
        let registry = registry();
        let data = [ExecClassData::new("com/acme/Foo", Probes::from_bools(&[true, false, true]))];
        let bundle = bundle("b", &registry, &data);

        assert_eq!(bundle.count_of(&key("com/acme/Foo", "run")), Count::new(4, 10));
        assert_eq!(bundle.count_of(&key("com/acme/Foo", "stop")), Count::new(5, 5));
        assert_eq!(bundle.count_of(&key("com/acme/Foo", "<init>")), Count::ZERO);
        assert_eq!(bundle.count_of(&key("com/other/Bar", "go")), Count::new(0, 3));

        assert_eq!(bundle.packages[0].name, "com/acme");
        assert_eq!(bundle.packages[0].count, Count::new(9, 15));
        assert_eq!(bundle.count, Count::new(9, 18));
        assert_eq!(bundle.method_count, Count::new(2, 3));
        assert_eq!(bundle.class_count, Count::new(1, 2));
        assert_eq!(bundle.package_count, Count::new(1, 2));
        assert_eq!(bundle.covered_methods().count(), 2);
    }

    #[test]
    fn hits_in_many_sessions_count_once() {
        let registry = registry();
        let hit = || ExecClassData::new("com/acme/Foo", Probes::from_bools(&[true, false, false]));
        let session = |id: &str, test: &str| FinishedSession {
            id: id.into(),
            test_type: "AUTO".into(),
            name: String::new(),
            probes: vec![hit().with_test(test)],
        };
        let sessions = [session("s1", "t1"), session("s2", "t2")];

        let counters = BundleCounters::calculate(&registry, &sessions);
        assert_eq!(counters.all.count, Count::new(4, 18));
        assert_eq!(counters.by_test_type["AUTO"].count, Count::new(4, 18));
        assert_eq!(counters.by_test.len(), 2);
        assert!(counters.by_test.values().all(|b| b.count == Count::new(4, 18)));
        assert!(counters.skipped.is_empty());
    }

    #[test]
    fn unattributed_hits_group_under_session_name() {
        let registry = registry();
        let sessions = [FinishedSession {
            id: "s".into(),
            test_type: "MANUAL".into(),
            name: "smoke".into(),
            probes: vec![ExecClassData::new("com/other/Bar", Probes::from_bools(&[true]))],
        }];

        let counters = BundleCounters::calculate(&registry, &sessions);
        let test = TypedTest::new("smoke", "MANUAL");
        assert_eq!(counters.by_test[&test].count, Count::new(3, 18));
    }

    #[test]
    fn skipped_data_does_not_abort() {
        let registry = registry();
        let sessions = [FinishedSession {
            id: "s".into(),
            test_type: "AUTO".into(),
            name: String::new(),
            probes: vec![
                ExecClassData::new("com/unknown/Baz", Probes::from_bools(&[true])),
                ExecClassData::new("com/other/Bar", Probes::from_bools(&[true])),
            ],
        }];

        let counters = BundleCounters::calculate(&registry, &sessions);
        assert_eq!(counters.skipped, vec![MetadataError::UnknownClass("com/unknown/Baz".into())]);
        assert_eq!(counters.all.count, Count::new(3, 18));
    }
}
