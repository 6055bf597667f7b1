//! Block storage collaborators for cask collections.
//!
//! Collections never talk to a transport directly. Everything they need from
//! the outside world goes through two traits:
//!
//! - [`BlockStore`] -- content-addressed `put`/`get` of immutable blocks
//! - [`MetadataService`] -- lookup of a collection's manifest text by identifier
//!
//! # Backends
//!
//! - [`InMemoryBlockStore`] -- `HashMap`-based store for tests and embedding
//! - [`DirBlockStore`] -- one file per block under a local directory
//! - [`InMemoryMetadataService`] -- identifier to manifest map
//!
//! Stores never interpret block contents and never validate locator hints.

pub mod disk;
pub mod error;
pub mod memory;
pub mod traits;

pub use disk::DirBlockStore;
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryBlockStore, InMemoryMetadataService};
pub use traits::{BlockStore, MetadataService};
