//! Reporting summaries
//!
//! Pure folds over a [`DiffMethods`], [`BundleCounters`] and typed risks.
//! Every tree level reuses the counters of the bundle, so package and class
//! figures keep summing their children.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tcov_counter::{BundleCounter, BundleCounters, ClassCounter, PackageCounter};
use tcov_model::{
    coverage_id, declaration, package_of, simple_name, Count, CoverageRate, DiffMethods, Method,
    MethodKey, TypedTest,
};
use tcov_risk::{Risk, RiskCounts, RiskStatus, RiskType, TypedRisks};
use tcov_session::ScopeCoverage;

/// Covered/total methods by diff classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodsSummary {
    /// Every method of the build
    pub all: Count,
    /// Methods added since the baseline
    pub new: Count,
    /// Methods changed since the baseline
    pub modified: Count,
    /// Methods equal to the baseline
    pub unaffected: Count,
    /// Methods gone since the baseline; never covered
    pub deleted: Count,
    /// Risk counts, filled in for build reports
    #[serde(default)]
    pub risks: RiskCounts,
}

impl MethodsSummary {
    /// Count covered methods of every classification
    ///
    /// Methods without instructions are left out, as in the bundle's own
    /// method counter.
    #[must_use]
    pub fn of(diff: &DiffMethods, bundle: &BundleCounter) -> Self {
        Self {
            all: method_count(diff.current(), bundle),
            new: method_count(diff.new.iter(), bundle),
            modified: method_count(diff.modified.iter(), bundle),
            unaffected: method_count(diff.unaffected.iter(), bundle),
            deleted: Count::new(0, count_u32(diff.deleted.len())),
            risks: RiskCounts::default(),
        }
    }

    /// With risk counts
    #[inline]
    #[must_use]
    pub fn with_risks(mut self, risks: RiskCounts) -> Self {
        self.risks = risks;
        self
    }
}

fn method_count<'a>(methods: impl Iterator<Item = &'a Method>, bundle: &BundleCounter) -> Count {
    let (covered, total) = methods
        .map(|m| bundle.count_of(&m.key()))
        .filter(|c| c.total > 0)
        .fold((0u32, 0u32), |(covered, total), c| {
            (covered + u32::from(c.is_covered()), total + 1)
        });
    Count::new(covered, total)
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Tests exercising each method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociatedTests {
    by_method: BTreeMap<MethodKey, BTreeSet<TypedTest>>,
}

/// Tests associated with one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedTestsDto {
    /// Coverage id of the method
    pub id: String,
    /// Package of the method
    pub package_name: String,
    /// Owner class
    pub class_name: String,
    /// Method name and descriptor
    pub method_name: String,
    /// Tests that covered the method
    pub tests: Vec<TypedTest>,
}

impl AssociatedTests {
    /// Collect the covered methods of every per-test bundle
    #[must_use]
    pub fn of(by_test: &BTreeMap<TypedTest, BundleCounter>) -> Self {
        let mut by_method: BTreeMap<MethodKey, BTreeSet<TypedTest>> = BTreeMap::new();
        for (test, bundle) in by_test {
            for (key, _) in bundle.covered_methods() {
                by_method.entry(key.clone()).or_default().insert(test.clone());
            }
        }
        Self { by_method }
    }

    /// Number of methods with tests
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_method.len()
    }

    /// Whether no method was covered by any test
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }

    /// Tests of one method
    #[must_use]
    pub fn tests_of(&self, key: &MethodKey) -> usize {
        self.by_method.get(key).map_or(0, BTreeSet::len)
    }

    /// Distinct tests over the methods of a class
    #[must_use]
    pub fn tests_of_class(&self, class_name: &str) -> usize {
        self.class_tests(class_name).len()
    }

    fn class_tests(&self, class_name: &str) -> BTreeSet<&TypedTest> {
        let from = MethodKey {
            owner_class: class_name.to_string(),
            name: String::new(),
            desc: String::new(),
        };
        self.by_method
            .range(from..)
            .take_while(|(key, _)| key.owner_class == class_name)
            .flat_map(|(_, tests)| tests)
            .collect()
    }

    /// One DTO per method
    #[must_use]
    pub fn to_dtos(&self) -> Vec<AssociatedTestsDto> {
        self.by_method
            .iter()
            .map(|(key, tests)| AssociatedTestsDto {
                id: coverage_id(&key.to_string()),
                package_name: package_of(&key.owner_class).to_string(),
                class_name: key.owner_class.clone(),
                method_name: format!("{}{}", key.name, key.desc),
                tests: tests.iter().cloned().collect(),
            })
            .collect()
    }
}

/// Coverage of one method in a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCoverage {
    /// Coverage id
    pub id: String,
    /// Method name
    pub name: String,
    /// JVM descriptor
    pub desc: String,
    /// Java-style declaration
    pub decl: String,
    /// Covered percentage
    pub coverage: f64,
    /// Instruction counter
    pub count: Count,
    /// Classification
    pub coverage_rate: CoverageRate,
    /// Tests that covered the method
    pub assoc_tests_count: usize,
}

/// Coverage of one class in a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCoverage {
    /// Coverage id
    pub id: String,
    /// Simple class name
    pub name: String,
    /// Internal class name
    pub path: String,
    /// Covered percentage
    pub coverage: f64,
    /// Instruction counter
    pub count: Count,
    /// Covered/total methods
    pub method_count: Count,
    /// Distinct tests over the class
    pub assoc_tests_count: usize,
    /// Methods in declaration order
    pub methods: Vec<MethodCoverage>,
}

/// Coverage of one package in a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageCoverage {
    /// Coverage id
    pub id: String,
    /// Package name
    pub name: String,
    /// Covered percentage
    pub coverage: f64,
    /// Instruction counter
    pub count: Count,
    /// Covered/total classes
    pub class_count: Count,
    /// Covered/total methods
    pub method_count: Count,
    /// Classes by name
    pub classes: Vec<ClassCoverage>,
}

impl PackageCoverage {
    /// Copy without classes, for package lists
    #[must_use]
    pub fn without_classes(&self) -> Self {
        Self {
            classes: Vec::new(),
            ..self.clone()
        }
    }
}

/// Package/class/method tree of a bundle
#[must_use]
pub fn package_tree(bundle: &BundleCounter, associated: &AssociatedTests) -> Vec<PackageCoverage> {
    bundle
        .packages
        .iter()
        .map(|package| package_coverage(package, associated))
        .collect()
}

fn package_coverage(package: &PackageCounter, associated: &AssociatedTests) -> PackageCoverage {
    let classes: Vec<ClassCoverage> = package
        .classes
        .iter()
        .map(|class| class_coverage(class, associated))
        .collect();
    let class_count = covered_nodes(classes.iter().map(|c| c.count));
    let method_count = classes.iter().map(|c| c.method_count).sum();
    PackageCoverage {
        id: coverage_id(&package.name),
        name: package.name.clone(),
        coverage: package.count.percentage(),
        count: package.count,
        class_count,
        method_count,
        classes,
    }
}

fn class_coverage(class: &ClassCounter, associated: &AssociatedTests) -> ClassCoverage {
    let methods: Vec<MethodCoverage> = class
        .methods
        .iter()
        .map(|m| {
            let key = MethodKey {
                owner_class: class.name.clone(),
                name: m.name.clone(),
                desc: m.desc.clone(),
            };
            MethodCoverage {
                id: coverage_id(&key.to_string()),
                name: m.name.clone(),
                desc: m.desc.clone(),
                decl: declaration(&m.desc),
                coverage: m.count.percentage(),
                count: m.count,
                coverage_rate: m.count.rate(),
                assoc_tests_count: associated.tests_of(&key),
            }
        })
        .collect();
    ClassCoverage {
        id: coverage_id(&class.name),
        name: simple_name(&class.name).to_string(),
        path: class.name.clone(),
        coverage: class.count.percentage(),
        count: class.count,
        method_count: covered_nodes(methods.iter().map(|m| m.count)),
        assoc_tests_count: associated.tests_of_class(&class.name),
        methods,
    }
}

fn covered_nodes(counts: impl Iterator<Item = Count>) -> Count {
    let (covered, total) = counts
        .filter(|c| c.total > 0)
        .fold((0u32, 0u32), |(covered, total), c| {
            (covered + u32::from(c.is_covered()), total + 1)
        });
    Count::new(covered, total)
}

/// Coverage reached by one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCoverage {
    /// Test id
    pub id: String,
    /// Test name
    pub test_name: String,
    /// Test type
    pub test_type: String,
    /// Covered percentage
    pub coverage: f64,
    /// Instruction counter
    pub count: Count,
    /// Methods the test covered
    pub covered_methods_count: usize,
}

/// One entry per test
#[must_use]
pub fn test_coverages(by_test: &BTreeMap<TypedTest, BundleCounter>) -> Vec<TestCoverage> {
    by_test
        .iter()
        .map(|(test, bundle)| TestCoverage {
            id: test.id(),
            test_name: test.name.clone(),
            test_type: test.test_type.clone(),
            coverage: bundle.count.percentage(),
            count: bundle.count,
            covered_methods_count: bundle.covered_methods().count(),
        })
        .collect()
}

/// Aggregate over a group of tests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestsSummary {
    /// Number of tests
    pub test_count: usize,
    /// Instruction counter of the group
    pub count: Count,
    /// Covered percentage
    pub coverage: f64,
}

/// Summary of one test type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTypeSummary {
    /// Test type
    pub test_type: String,
    /// Its aggregate
    pub summary: TestsSummary,
}

/// Test aggregates overall and per test type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageByTests {
    /// All tests together
    pub all: TestsSummary,
    /// Per test type, ordered by type
    pub by_type: Vec<TestTypeSummary>,
}

impl CoverageByTests {
    /// Fold bundle counters into test aggregates
    #[must_use]
    pub fn of(counters: &BundleCounters) -> Self {
        let mut tests_per_type: BTreeMap<&str, usize> = BTreeMap::new();
        for test in counters.by_test.keys() {
            *tests_per_type.entry(test.test_type.as_str()).or_default() += 1;
        }
        let by_type = counters
            .by_test_type
            .iter()
            .map(|(test_type, bundle)| TestTypeSummary {
                test_type: test_type.clone(),
                summary: TestsSummary {
                    test_count: tests_per_type.get(test_type.as_str()).copied().unwrap_or(0),
                    count: bundle.count,
                    coverage: bundle.count.percentage(),
                },
            })
            .collect();
        Self {
            all: TestsSummary {
                test_count: counters.by_test.len(),
                count: counters.all.count,
                coverage: counters.all.count.percentage(),
            },
            by_type,
        }
    }
}

/// A method covered by a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoveredMethod {
    /// Owner class
    pub owner_class: String,
    /// Method name
    pub name: String,
    /// JVM descriptor
    pub desc: String,
    /// Content hash
    pub hash: String,
    /// Covered percentage
    pub coverage: f64,
    /// Instruction counter
    pub count: Count,
    /// Classification
    pub coverage_rate: CoverageRate,
}

/// Number of covered methods per classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveredMethodCounts {
    /// All covered methods
    pub all: usize,
    /// Covered new methods
    pub new: usize,
    /// Covered modified methods
    pub modified: usize,
    /// Covered unaffected methods
    pub unaffected: usize,
}

/// What one test covered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestedMethodsSummary {
    /// Test id
    pub id: String,
    /// Test name
    pub test_name: String,
    /// Test type
    pub test_type: String,
    /// Covered methods per classification
    pub method_counts: CoveredMethodCounts,
}

/// Methods covered by one test, split by classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodsCoveredByTest {
    /// Counts
    pub summary: TestedMethodsSummary,
    /// Every covered method
    pub all: Vec<CoveredMethod>,
    /// Covered new methods
    pub new: Vec<CoveredMethod>,
    /// Covered modified methods
    pub modified: Vec<CoveredMethod>,
    /// Covered unaffected methods
    pub unaffected: Vec<CoveredMethod>,
}

impl MethodsCoveredByTest {
    /// Methods of the build covered by `bundle`
    #[must_use]
    pub fn of(test: &TypedTest, bundle: &BundleCounter, diff: &DiffMethods) -> Self {
        let covered = |methods: &[Method]| -> Vec<CoveredMethod> {
            methods
                .iter()
                .filter_map(|m| {
                    let count = bundle.count_of(&m.key());
                    count.is_covered().then(|| CoveredMethod {
                        owner_class: m.owner_class.clone(),
                        name: m.name.clone(),
                        desc: m.desc.clone(),
                        hash: m.hash.clone(),
                        coverage: count.percentage(),
                        count,
                        coverage_rate: count.rate(),
                    })
                })
                .collect()
        };
        let new = covered(&diff.new);
        let modified = covered(&diff.modified);
        let unaffected = covered(&diff.unaffected);
        let mut all: Vec<CoveredMethod> = new.iter().chain(&modified).chain(&unaffected).cloned().collect();
        all.sort_by(|a, b| {
            (&a.owner_class, &a.name, &a.desc).cmp(&(&b.owner_class, &b.name, &b.desc))
        });

        Self {
            summary: TestedMethodsSummary {
                id: test.id(),
                test_name: test.name.clone(),
                test_type: test.test_type.clone(),
                method_counts: CoveredMethodCounts {
                    all: all.len(),
                    new: new.len(),
                    modified: modified.len(),
                    unaffected: unaffected.len(),
                },
            },
            all,
            new,
            modified,
            unaffected,
        }
    }
}

/// Covered methods of every test, computed in parallel, ordered by test
#[must_use]
pub fn methods_covered_by_tests(
    by_test: &BTreeMap<TypedTest, BundleCounter>,
    diff: &DiffMethods,
) -> Vec<MethodsCoveredByTest> {
    by_test
        .par_iter()
        .map(|(test, bundle)| MethodsCoveredByTest::of(test, bundle, diff))
        .collect()
}

/// Reporting form of a risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDto {
    /// Coverage id of the method
    pub id: String,
    /// New or modified
    #[serde(rename = "type")]
    pub risk_type: RiskType,
    /// Owner class
    pub owner_class: String,
    /// Method name
    pub name: String,
    /// JVM descriptor
    pub desc: String,
    /// Highest covered percentage
    pub coverage: f64,
    /// Highest instruction counter
    pub count: Count,
    /// Status per build
    pub status: BTreeMap<String, RiskStatus>,
    /// Classification of `count`
    pub coverage_rate: CoverageRate,
    /// Tests that covered the method
    pub assoc_tests_count: usize,
}

impl RiskDto {
    /// Build from a ledger entry
    #[must_use]
    pub fn of(risk_type: RiskType, risk: &Risk, associated: &AssociatedTests) -> Self {
        let key = risk.method.key();
        Self {
            id: coverage_id(&key.to_string()),
            risk_type,
            owner_class: risk.method.owner_class.clone(),
            name: risk.method.name.clone(),
            desc: risk.method.desc.clone(),
            coverage: risk.coverage.percentage(),
            count: risk.coverage,
            status: risk.status.clone(),
            coverage_rate: risk.coverage.rate(),
            assoc_tests_count: associated.tests_of(&key),
        }
    }
}

/// Flatten typed risks into DTOs, new before modified
#[must_use]
pub fn risk_dtos(risks: &TypedRisks, associated: &AssociatedTests) -> Vec<RiskDto> {
    risks
        .iter()
        .flat_map(|(risk_type, risks)| risks.iter().map(|r| RiskDto::of(*risk_type, r, associated)))
        .collect()
}

/// Covered/total risks; covered means covered in some build
#[must_use]
pub fn risk_count(risks: &TypedRisks) -> Count {
    let all = risks.values().flatten();
    let covered = all.clone().filter(|r| r.is_covered()).count();
    Count::new(count_u32(covered), count_u32(all.count()))
}

/// Coverage of the build over its enabled scopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildCoverage {
    /// Instruction counter
    pub count: Count,
    /// Covered percentage
    pub percentage: f64,
    /// Covered/total methods
    pub method_count: Count,
    /// Instruction counters per test type
    pub by_test_type: BTreeMap<String, Count>,
    /// Covered/total risks
    pub risk_count: Count,
    /// Scopes that contributed
    pub finished_scopes_count: usize,
}

impl BuildCoverage {
    /// Fold bundle counters and risks
    #[must_use]
    pub fn of(counters: &BundleCounters, risks: &TypedRisks, finished_scopes_count: usize) -> Self {
        Self {
            count: counters.all.count,
            percentage: counters.all.count.percentage(),
            method_count: counters.all.method_count,
            by_test_type: by_test_type(counters),
            risk_count: risk_count(risks),
            finished_scopes_count,
        }
    }
}

fn by_test_type(counters: &BundleCounters) -> BTreeMap<String, Count> {
    counters
        .by_test_type
        .iter()
        .map(|(test_type, bundle)| (test_type.clone(), bundle.count))
        .collect()
}

/// Coverage figures of a scope summary
#[must_use]
pub fn scope_coverage(counters: &BundleCounters) -> ScopeCoverage {
    ScopeCoverage {
        count: counters.all.count,
        percentage: counters.all.count.percentage(),
        method_count: counters.all.method_count,
        by_test_type: by_test_type(counters),
    }
}

/// Headline figures of a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Build version
    pub build_version: String,
    /// Instruction counter
    pub count: Count,
    /// Covered percentage
    pub coverage: f64,
    /// Covered/total methods
    pub method_count: Count,
    /// All risks by type
    pub risk_counts: RiskCounts,
    /// Risks never covered, by type
    pub not_covered_risk_counts: RiskCounts,
    /// Test names per test type
    pub tests: BTreeMap<String, Vec<String>>,
}

impl AgentSummary {
    /// Fold build counters and risks
    #[must_use]
    pub fn of(build_version: &str, counters: &BundleCounters, risks: &TypedRisks) -> Self {
        let mut tests: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for test in counters.by_test.keys() {
            tests.entry(test.test_type.clone()).or_default().push(test.name.clone());
        }
        Self {
            build_version: build_version.to_string(),
            count: counters.all.count,
            coverage: counters.all.count.percentage(),
            method_count: counters.all.method_count,
            risk_counts: RiskCounts::of(risks),
            not_covered_risk_counts: RiskCounts::of(&tcov_risk::not_covered(risks)),
            tests,
        }
    }
}

/// Everything reported for one aggregation (a scope or the build)
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageData {
    /// Method counts by classification
    pub methods: MethodsSummary,
    /// Package tree
    pub packages: Vec<PackageCoverage>,
    /// Per-test coverage
    pub tests: Vec<TestCoverage>,
    /// Test aggregates
    pub by_tests: CoverageByTests,
    /// Tests per method
    pub associated: AssociatedTests,
}

impl CoverageData {
    /// Fold one aggregation
    #[must_use]
    pub fn calculate(diff: &DiffMethods, counters: &BundleCounters) -> Self {
        let associated = AssociatedTests::of(&counters.by_test);
        Self {
            methods: MethodsSummary::of(diff, &counters.all),
            packages: package_tree(&counters.all, &associated),
            tests: test_coverages(&counters.by_test),
            by_tests: CoverageByTests::of(counters),
            associated,
        }
    }
}
