//! Manifest text format for cask collections.
//!
//! A manifest has one line per stream:
//!
//! ```text
//! <stream name> <locator>+ <start>:<length>:<file name>+
//! ```
//!
//! File tokens address bytes in the concatenation of the stream's blocks.
//! Literal spaces in names are written as `\040`.
//!
//! [`parse_manifest`] reads text exactly as written. [`normalize`] turns the
//! parsed streams into a canonical [`Manifest`]: streams and files sorted by
//! name, each stream's blocks deduplicated in first-reference order, and each
//! file's ranges merged into maximal contiguous spans. Two manifests that
//! describe the same files serialize to identical text once normalized.

pub mod error;
pub mod escape;
pub mod normalize;
pub mod parse;
pub mod stream;

pub use error::{ManifestError, ManifestResult};
pub use escape::{escape_name, normalize_stream_name, unescape_name};
pub use normalize::{normalize, normalize_text};
pub use parse::{parse_manifest, FileToken, RawStream};
pub use stream::{locate, Manifest, Span, Stream, StreamFile};
