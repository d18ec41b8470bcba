use std::path::PathBuf;

use crate::codec::ObjectType;
use crate::digest::Digest;

/// error type for arbor operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("object not found: {0}")]
    ObjectNotFound(Digest),

    #[error("no such tag: {0}")]
    NoSuchTag(String),

    #[error("invalid tag name: {0}")]
    InvalidTag(String),

    #[error("truncated object data")]
    Truncated,

    #[error("wrong object type: expected {expected}, got {actual}")]
    WrongType {
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("unknown digest algorithm: {0}")]
    UnknownAlgorithm(u8),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },

    #[error("{what} length {len} exceeds encoding limit")]
    Oversize { what: &'static str, len: usize },

    #[error("invalid directory entry name: {0}")]
    InvalidEntryName(String),

    #[error("path not found in tree: {0}")]
    PathNotFound(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("remote sent more requests than the in-flight window allows")]
    Backpressure,

    #[error("lock contention on repository")]
    LockContention,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stream i/o error: {0}")]
    Stream(std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// codec and pipe reads funnel through this: a short read is a framing error,
// anything else keeps its io cause
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Stream(e)
        }
    }
}

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
