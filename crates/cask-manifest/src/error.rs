use cask_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("line {line}: {source}")]
    InvalidLocator { line: usize, source: TypeError },

    #[error("line {line}: locator {token} has no block size")]
    MissingBlockSize { line: usize, token: String },

    #[error("line {line}: locator {token} follows file tokens")]
    LocatorAfterFile { line: usize, token: String },

    #[error("line {line}: invalid file token {token:?}")]
    InvalidFileToken { line: usize, token: String },

    #[error("line {line}: stream {name:?} has neither locators nor files")]
    EmptyStreamLine { line: usize, name: String },

    #[error("line {line}: invalid stream name {name:?}")]
    InvalidStreamName { line: usize, name: String },

    #[error("invalid path {path:?}: empty component")]
    InvalidPath { path: String },

    #[error("stream {stream:?}: block sizes add up to more than {} bytes", u64::MAX)]
    StreamTooLarge { stream: String },

    #[error("range {start}:{len} exceeds stream length {stream_len}")]
    RangeOutOfBounds { start: u64, len: u64, stream_len: u64 },
}

pub type ManifestResult<T> = Result<T, ManifestError>;
