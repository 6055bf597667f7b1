use cask_types::Locator;

use crate::error::StoreResult;

/// Content-addressed block store.
///
/// All implementations must satisfy these invariants:
/// - `put` is idempotent: identical bytes always yield the same locator.
/// - Blocks are immutable once written.
/// - `get` fails with [`StoreError::NotFound`](crate::StoreError::NotFound)
///   for unknown blocks.
/// - Hints on a locator are opaque; lookups are by hash.
pub trait BlockStore: Send + Sync {
    /// Store a block and return its locator.
    fn put(&self, data: &[u8]) -> StoreResult<Locator>;

    /// Fetch the contents of a block.
    fn get(&self, locator: &Locator) -> StoreResult<Vec<u8>>;

    /// Check whether a block exists in the store.
    fn exists(&self, locator: &Locator) -> StoreResult<bool>;
}

/// Lookup service mapping collection identifiers to manifest text.
///
/// Failures are never fatal to readers: they fall back to fetching the
/// manifest from the block store.
pub trait MetadataService: Send + Sync {
    fn get_manifest_text(&self, id: &str) -> StoreResult<String>;
}
