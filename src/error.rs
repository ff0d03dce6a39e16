//! The error taxonomy shared by the whole crate. Every fallible operation
//! returns [`Result`], and the error kind tells the caller which subsystem
//! failed: the OS file layer, a format parser, the selection engine, etc.

use std::io;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// OS-level I/O failure, missing file, bad open mode, or use of a closed
    /// trajectory.
    #[error("file error: {0}")]
    File(String),

    /// The payload does not follow the declared format.
    #[error("format error: {0}")]
    Format(String),

    /// Allocation failure or overrun of an in-memory trajectory buffer.
    #[error("memory error: {0}")]
    Memory(String),

    /// Lexer, parser, or evaluator failure in a selection string.
    #[error("selection error: {0}")]
    Selection(String),

    /// Configuration file unreadable or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Wrong-typed access to a `Property`.
    #[error("property error: {0}")]
    Property(String),

    /// Index past the end of a collection.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// Invariant violations and unsupported operations.
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::File(err.to_string())
    }
}
