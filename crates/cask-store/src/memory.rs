use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use cask_types::Locator;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockStore, MetadataService};

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Blocks are keyed by hash and held behind
/// a `RwLock`. Every `put` call is counted, including ones that hit an
/// existing block.
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
}

impl InMemoryBlockStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            puts: AtomicUsize::new(0),
        }
    }

    /// Number of distinct blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blocks.
    pub fn total_bytes(&self) -> u64 {
        self.blocks
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Number of `put` calls served so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    /// Size of the largest stored block.
    pub fn largest_block(&self) -> usize {
        self.blocks
            .read()
            .expect("lock poisoned")
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn put(&self, data: &[u8]) -> StoreResult<Locator> {
        let locator = Locator::for_data(data);
        self.puts.fetch_add(1, Ordering::Relaxed);
        let mut map = self.blocks.write().expect("lock poisoned");
        map.entry(locator.hash().to_string())
            .or_insert_with(|| data.to_vec());
        debug!(%locator, "stored block in memory");
        Ok(locator)
    }

    fn get(&self, locator: &Locator) -> StoreResult<Vec<u8>> {
        let map = self.blocks.read().expect("lock poisoned");
        map.get(locator.hash())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(locator.to_string()))
    }

    fn exists(&self, locator: &Locator) -> StoreResult<bool> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.contains_key(locator.hash()))
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockStore")
            .field("block_count", &self.len())
            .field("put_count", &self.put_count())
            .finish()
    }
}

/// In-memory metadata service mapping identifiers to manifest text.
#[derive(Debug, Default)]
pub struct InMemoryMetadataService {
    manifests: RwLock<HashMap<String, String>>,
}

impl InMemoryMetadataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the manifest text served for `id`.
    pub fn insert(&self, id: impl Into<String>, manifest_text: impl Into<String>) {
        self.manifests
            .write()
            .expect("lock poisoned")
            .insert(id.into(), manifest_text.into());
    }
}

impl MetadataService for InMemoryMetadataService {
    fn get_manifest_text(&self, id: &str) -> StoreResult<String> {
        self.manifests
            .read()
            .expect("lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("collection {id}")))
    }
}
