//! Per-build coverage context and persisted build data

use serde::{Deserialize, Serialize};
use tcov_counter::{BundleCounters, ClassMetadata, ClassRegistry};
use tcov_model::{diff, DiffMethods, FinishedSession, Method};
use tcov_store::Record;

/// Class metadata of a build, kept to restore the context and to diff children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBuild {
    /// Build version
    pub version: String,
    /// Build diffed against, if any
    #[serde(default)]
    pub parent_version: Option<String>,
    /// Class metadata sent by the agent
    pub classes: Vec<ClassMetadata>,
}

impl StoredBuild {
    /// Methods declared by the build's classes
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        self.classes.iter().flat_map(|c| c.to_methods()).collect()
    }
}

impl Record for StoredBuild {
    const COLLECTION: &'static str = "build_data";

    fn id(&self) -> String {
        self.version.clone()
    }
}

/// Baseline selected for an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Baseline build; empty when none was selected
    pub version: String,
    /// Parent of the baseline build; empty when none
    pub parent_version: String,
}

impl Baseline {
    /// Make `build_version` the baseline, or give the role back to its parent
    #[must_use]
    pub fn toggled(&self, build_version: &str, parent_version: Option<&str>) -> Self {
        if self.version == build_version {
            Self {
                version: self.parent_version.clone(),
                parent_version: self.parent_version.clone(),
            }
        } else {
            Self {
                version: build_version.to_string(),
                parent_version: parent_version.unwrap_or_default().to_string(),
            }
        }
    }
}

/// Data kept per agent across builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalAgentData {
    /// Agent id
    pub agent_id: String,
    /// Current baseline
    #[serde(default)]
    pub baseline: Baseline,
}

impl Record for GlobalAgentData {
    const COLLECTION: &'static str = "global_agent_data";

    fn id(&self) -> String {
        self.agent_id.clone()
    }
}

/// Everything coverage of one build is computed against
#[derive(Debug)]
pub struct CoverContext {
    build_version: String,
    parent_version: Option<String>,
    registry: ClassRegistry,
    diff: DiffMethods,
}

impl CoverContext {
    /// Create context, diffing the registry's methods against the parent's
    #[must_use]
    pub fn new(
        build_version: impl Into<String>,
        parent_version: Option<String>,
        registry: ClassRegistry,
        parent_methods: &[Method],
    ) -> Self {
        let changes = diff(&registry.methods(), parent_methods);
        let build_version = build_version.into();
        tracing::info!(
            build = %build_version,
            parent = ?parent_version,
            classes = registry.len(),
            new = changes.new.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            unaffected = changes.unaffected.len(),
            "Coverage context ready"
        );
        Self {
            build_version,
            parent_version,
            registry,
            diff: changes,
        }
    }

    /// Build version
    #[inline]
    #[must_use]
    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    /// Parent build, if any
    #[inline]
    #[must_use]
    pub fn parent_version(&self) -> Option<&str> {
        self.parent_version.as_deref()
    }

    /// Build whose risk ledger this build updates
    ///
    /// A build without a parent is its own baseline.
    #[inline]
    #[must_use]
    pub fn baseline(&self) -> &str {
        self.parent_version.as_deref().unwrap_or(&self.build_version)
    }

    /// Class metadata
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Methods of the build classified against the parent
    #[inline]
    #[must_use]
    pub fn diff(&self) -> &DiffMethods {
        &self.diff
    }

    /// Aggregate sessions against the build's metadata
    pub fn bundle_counters<'a>(&self, sessions: impl IntoIterator<Item = &'a FinishedSession>) -> BundleCounters {
        BundleCounters::calculate(&self.registry, sessions)
    }
}

/// Class metadata received so far
#[derive(Debug, Default)]
pub(crate) enum BuildData {
    /// Nothing received yet
    #[default]
    NoData,
    /// Metadata batches are arriving
    Building(Vec<ClassMetadata>),
    /// Context computed
    Ready(std::sync::Arc<CoverContext>),
}
