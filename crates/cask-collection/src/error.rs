use cask_manifest::ManifestError;
use cask_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} names cannot contain tabs or newlines: {name:?}")]
    IllegalName { kind: &'static str, name: String },

    #[error("cannot finish an unnamed file ({len} bytes at offset {offset} in stream {stream:?})")]
    UnnamedFile {
        len: u64,
        offset: u64,
        stream: Option<String>,
    },

    #[error("cannot finish an unnamed stream ({len} bytes in {files} files)")]
    UnnamedStream { len: u64, files: usize },

    #[error("tried to queue more than one file (already writing {0})")]
    FileAlreadyQueued(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("manifest for {id} is not valid UTF-8")]
    InvalidEncoding { id: String },

    #[error("file not found in collection: {0}")]
    FileNotFound(String),

    #[error("block {locator} is shorter than the manifest claims")]
    ShortBlock { locator: String },

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CollectionResult<T> = Result<T, CollectionError>;
