//! tcov Store
//!
//! The read/write contract tcov needs from its persistence layer, with two
//! backends.
//!
//! # Core Concepts
//!
//! - [`Store`]: raw async contract (`get`, `put`, `find_by`, `remove`) over JSON values
//! - [`Record`]: a serde type bound to a collection, with an id and optional secondary key
//! - [`StoreClient`]: typed, cloneable handle used by the rest of the workspace
//! - [`MemoryStore`] / [`JsonDirStore`]: in-process and on-disk backends
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use tcov_store::{MemoryStore, Record, StoreClient};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Note { id: String, text: String }
//!
//! impl Record for Note {
//!     const COLLECTION: &'static str = "notes";
//!     fn id(&self) -> String { self.id.clone() }
//! }
//!
//! # tokio_test_block_on(async {
//! let client = StoreClient::new(MemoryStore::new());
//! client.store(&Note { id: "1".into(), text: "hi".into() }).await.unwrap();
//! let note: Option<Note> = client.find_by_id("1").await.unwrap();
//! assert_eq!(note.unwrap().text, "hi");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(unreachable_pub)]

mod error;
mod json_dir;
mod memory;
mod store;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;
pub use store::{Record, Store, StoreClient};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for persistence
    pub use crate::{Record, Store, StoreClient, StoreError, StoreResult};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
