use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use cask_types::Locator;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockStore;

/// Block store backed by a local directory.
///
/// Each block lives in `root/<first 3 hex digits>/<hash>`. Writes go through
/// a temporary file in the same directory and are renamed into place, so a
/// reader never observes a partial block. Reads re-hash the contents and
/// report corruption as [`StoreError::HashMismatch`].
#[derive(Debug, Clone)]
pub struct DirBlockStore {
    root: PathBuf,
}

impl DirBlockStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, locator: &Locator) -> PathBuf {
        let hash = locator.hash();
        self.root.join(&hash[..3]).join(hash)
    }
}

impl BlockStore for DirBlockStore {
    fn put(&self, data: &[u8]) -> StoreResult<Locator> {
        let locator = Locator::for_data(data);
        let path = self.block_path(&locator);
        if path.exists() {
            return Ok(locator);
        }

        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(%locator, path = %path.display(), "stored block on disk");
        Ok(locator)
    }

    fn get(&self, locator: &Locator) -> StoreResult<Vec<u8>> {
        let path = self.block_path(locator);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(locator.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !locator.matches(&data) {
            return Err(StoreError::HashMismatch {
                locator: locator.clone(),
                computed: Locator::for_data(&data),
            });
        }
        Ok(data)
    }

    fn exists(&self, locator: &Locator) -> StoreResult<bool> {
        Ok(self.block_path(locator).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirBlockStore::open(dir.path().join("blocks")).unwrap();
        let loc = store.put(b"on disk").unwrap();

        let expected = dir
            .path()
            .join("blocks")
            .join(&loc.hash()[..3])
            .join(loc.hash());
        assert!(expected.is_file());
        assert_eq!(store.get(&loc).unwrap(), b"on disk");
        assert!(store.exists(&loc).unwrap());
    }

    #[test]
    fn put_twice_keeps_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirBlockStore::open(dir.path()).unwrap();
        let a = store.put(b"dup").unwrap();
        let b = store.put(b"dup").unwrap();
        assert_eq!(a, b);
        let entries = std::fs::read_dir(dir.path().join(&a.hash()[..3]))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn missing_block_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirBlockStore::open(dir.path()).unwrap();
        let err = store.get(&Locator::for_data(b"nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn corrupted_block_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirBlockStore::open(dir.path()).unwrap();
        let loc = store.put(b"pristine").unwrap();
        std::fs::write(store.block_path(&loc), b"tampered").unwrap();

        let err = store.get(&loc).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }

    #[test]
    fn empty_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirBlockStore::open(dir.path()).unwrap();
        let loc = store.put(b"").unwrap();
        assert_eq!(loc, Locator::empty_block());
        assert!(store.get(&loc).unwrap().is_empty());
    }
}
