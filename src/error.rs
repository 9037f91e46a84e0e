use std::fmt::Display;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors produced by the table subsystem.
///
/// Reads never retry internally; every error is returned to the caller and
/// the query layer decides whether to retry on another replica. Corruption
/// is always surfaced with offset context, never skipped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// Operation attempted on a stopped file. New reads are rejected once a
    /// file has been stopped by `stop()` or `remove()`.
    FileClosed,
    /// A table file basename did not match `<seq>-<level>-<merge>-<extent>`.
    /// `field` names the component that failed to parse.
    FileNameParse { name: String, field: String },
    /// The fixed-size footer failed structural validation.
    CorruptTrailer { path: String, detail: String },
    /// The meta-index section failed structural validation.
    CorruptMetaIndex { offset: u64, detail: String },
    /// A chunk-meta block failed checksum or structural validation.
    CorruptChunkMeta { offset: u64, detail: String },
    /// A data segment failed checksum or structural validation.
    CorruptSegment { offset: u64, detail: String },
    /// Segment index or meta-index position out of bounds.
    OutOfRange { index: usize, count: usize },
    /// File removed between locate and use.
    NotFound(String),
    /// The query monitor signalled the operation to abort.
    Aborted,
    /// An IO error, with path context where available.
    Io(String),
    /// Declared on the file type but delegated to a sibling subsystem; the
    /// query layer binds these at a higher level.
    Unsupported(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::FileClosed => write!(f, "tssp file closed"),
            Error::FileNameParse { name, field } => {
                write!(f, "invalid tssp file name {name:?}: bad {field}")
            }
            Error::CorruptTrailer { path, detail } => {
                write!(f, "corrupt trailer in {path}: {detail}")
            }
            Error::CorruptMetaIndex { offset, detail } => {
                write!(f, "corrupt meta index at offset {offset}: {detail}")
            }
            Error::CorruptChunkMeta { offset, detail } => {
                write!(f, "corrupt chunk meta at offset {offset}: {detail}")
            }
            Error::CorruptSegment { offset, detail } => {
                write!(f, "corrupt segment at offset {offset}: {detail}")
            }
            Error::OutOfRange { index, count } => {
                write!(f, "index {index} out of range {count}")
            }
            Error::NotFound(path) => write!(f, "file not found: {path}"),
            Error::Aborted => write!(f, "operation aborted by query monitor"),
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::Unsupported(msg) => write!(f, "not implemented in core: {msg}"),
        }
    }
}

impl Error {
    /// Wrap an IO error with the path it occurred on.
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        Error::Io(format!("{}: {}", path.display(), err))
    }
}

/// A subsystem Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Io(err.to_string())
    }
}
