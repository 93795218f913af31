//! Errors for malformed instrumentation metadata
//!
//! None of these abort an aggregation: the affected class or exec datum is
//! skipped and the error is reported as a warning.

/// Malformed or missing class metadata
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// Class without a name
    #[error("class metadata without a name")]
    EmptyClassName,

    /// Class registered twice
    #[error("class {0} is already registered")]
    DuplicateClass(String),

    /// A method references a probe beyond the class probe count
    #[error("probe {probe} of {class}.{method} is out of range (class has {probe_count})")]
    ProbeOutOfRange {
        /// Class name
        class: String,
        /// Method name
        method: String,
        /// Offending probe index
        probe: u32,
        /// Probe count of the class
        probe_count: u32,
    },

    /// Two methods claim the same probe
    #[error("probe {probe} of {class} belongs to more than one method")]
    DuplicateProbe {
        /// Class name
        class: String,
        /// Offending probe index
        probe: u32,
    },

    /// Exec data for a class that has no metadata
    #[error("no metadata for class {0}")]
    UnknownClass(String),

    /// Exec data with more probes than the class declares
    #[error("exec data for {class} has {actual} probes, metadata declares {expected}")]
    ProbeCountMismatch {
        /// Class name
        class: String,
        /// Probe count from metadata
        expected: u32,
        /// Length of the exec vector
        actual: u32,
    },
}

impl MetadataError {
    /// Name of the class the error is about, if any
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::EmptyClassName => None,
            Self::DuplicateClass(class) | Self::UnknownClass(class) => Some(class),
            Self::ProbeOutOfRange { class, .. }
            | Self::DuplicateProbe { class, .. }
            | Self::ProbeCountMismatch { class, .. } => Some(class),
        }
    }
}
