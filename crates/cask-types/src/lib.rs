//! Foundation types for cask collections.
//!
//! A collection is a set of files described by a text manifest. The bytes of
//! those files live in fixed-size, content-addressed blocks, and the manifest
//! refers to them through locators.
//!
//! # Key Types
//!
//! - [`Locator`] -- MD5 hash + block size + opaque hint tokens
//! - [`Segment`] -- a byte range inside a single block

pub mod error;
pub mod locator;
pub mod segment;

pub use error::TypeError;
pub use locator::{Locator, EMPTY_BLOCK_LOCATOR, HASH_HEX_LEN};
pub use segment::Segment;
