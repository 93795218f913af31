//! tcov Model
//!
//! Plain data shared by every tcov component.
//!
//! # Core Concepts
//!
//! - [`Method`]: a declared method, identified by `(owner_class, name, desc)`
//! - [`diff`]: classifies a build's methods against a baseline into [`DiffMethods`]
//! - [`Count`]: `covered/total` instruction counter with [`CoverageRate`]
//! - [`Probes`]: probe hit bit-vector; [`ExecClassData`] and [`FinishedSession`] carry them
//!
//! # Example
//!
//! ```rust
//! use tcov_model::{diff, Method};
//!
//! let baseline = vec![Method::new("com/acme/Foo", "bar", "()V", "a")];
//! let current = vec![Method::new("com/acme/Foo", "bar", "()V", "b")];
//!
//! let result = diff(&current, &baseline);
//! assert_eq!(result.modified.len(), 1);
//! ```

#![warn(unreachable_pub)]

mod count;
mod diff;
mod key;
mod method;
mod probes;

// Re-exports
pub use count::{Count, CoverageRate};
pub use diff::{diff, DiffMethods};
pub use key::{coverage_id, package_of, simple_name, CoverageKey};
pub use method::{declaration, parse_desc_types, Method, MethodKey, LAMBDA};
pub use probes::{ExecClassData, FinishedSession, Probes, ProbesError, TypedTest};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with tcov data
    pub use crate::{
        diff, Count, CoverageRate, DiffMethods, ExecClassData, FinishedSession, Method,
        MethodKey, Probes, TypedTest,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
