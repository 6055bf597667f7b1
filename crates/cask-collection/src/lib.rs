//! Collections: versioned, content-addressed file sets.
//!
//! A collection is identified by its manifest. [`CollectionWriter`] chunks
//! files, directory trees or raw bytes into fixed-size blocks, stores them
//! through a [`BlockStore`](cask_store::BlockStore), and produces the
//! canonical manifest. [`CollectionReader`] goes the other way: from a
//! manifest locator or literal manifest text to normalized streams and files.
//!
//! # Design Rules
//!
//! 1. Manifest text leaving this crate is always normalized.
//! 2. A writer holds at most one open file and one block of buffered bytes.
//! 3. Readers fetch lazily, on first access, exactly once.
//! 4. Neither type is shared between threads; each has one owner.

pub mod config;
pub mod error;
pub mod reader;
pub mod source;
pub mod writer;

pub use config::{CollectionConfig, DEFAULT_BLOCK_SIZE};
pub use error::{CollectionError, CollectionResult};
pub use reader::{CollectionReader, FileEntry};
pub use source::Source;
pub use writer::{CollectionWriter, FileRecord, FinishedStream};
