//! tcov Counter
//!
//! Turns raw per-class probe hits into instruction coverage counters.
//!
//! # Core Concepts
//!
//! - [`ClassRegistry`]: arena of validated [`ClassMetadata`] for one build
//! - [`BundleCounter`]: method counters rolled up to classes, packages and the bundle
//! - [`BundleCounters`]: bundles over all sessions, per test type and per test
//!
//! # Merge Rule
//!
//! A probe is hit for an aggregation iff it is hit in any contributing
//! session. Methods without instructions contribute zero everywhere.
//!
//! # Example
//!
//! ```rust
//! use tcov_counter::{bundle, ClassMetadata, ClassRegistry, MethodMetadata, ProbeWeight};
//! use tcov_model::{Count, ExecClassData, Probes};
//!
//! let (registry, _) = ClassRegistry::from_classes([ClassMetadata {
//!     id: 1,
//!     name: "com/acme/Foo".into(),
//!     probe_count: 1,
//!     methods: vec![MethodMetadata::new("run", "()V", "h", vec![ProbeWeight { probe: 0, instructions: 3 }])],
//! }]);
//! let data = [ExecClassData::new("com/acme/Foo", Probes::from_bools(&[true]))];
//!
//! assert_eq!(bundle("all", &registry, &data).count, Count::new(3, 3));
//! ```

#![warn(unreachable_pub)]

mod bundle;
mod error;
mod registry;

// Re-exports
pub use bundle::{
    bundle, BundleCounter, BundleCounters, ClassCounter, MethodCounter, PackageCounter, ALL,
};
pub use error::MetadataError;
pub use registry::{
    ClassIndex, ClassMetadata, ClassRegistry, MergedHits, MethodMetadata, ProbeWeight,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for aggregation
    pub use crate::{BundleCounter, BundleCounters, ClassMetadata, ClassRegistry, MetadataError};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
