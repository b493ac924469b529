use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum Error {
    /// A filesystem call failed; carries the syscall name and the path.
    Fs {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// Bad schema, unusable root directory, or data that does not match
    /// the declared schema.
    InvalidConfig(String),
    /// `add` exhausted its retry budget on exclusive-create conflicts.
    NameCollision(PathBuf),
    /// Codec input could not be decoded.
    Malformed(&'static str),
    /// The element's payload is gone and the caller did not ask for
    /// permissive handling.
    MissingElement(String),
    /// Another agent holds the lock.
    LockHeld(String),
    /// The operation requires a held lock and none exists.
    NotLocked(String),
    /// The caller passed a string that is not a `bucket/element` identifier.
    InvalidName(String),
}

impl Error {
    pub(crate) fn fs(op: &'static str, path: &Path, source: io::Error) -> Self {
        Error::Fs {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fs { op, path, source } => {
                write!(f, "cannot {}({}): {}", op, path.display(), source)
            }
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Error::NameCollision(path) => {
                write!(f, "name collision retries exhausted: {}", path.display())
            }
            Error::Malformed(msg) => write!(f, "malformed encoding: {msg}"),
            Error::MissingElement(name) => write!(f, "missing element: {name}"),
            Error::LockHeld(name) => write!(f, "element already locked: {name}"),
            Error::NotLocked(name) => write!(f, "element not locked: {name}"),
            Error::InvalidName(name) => write!(f, "invalid element name: {name}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fs { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
