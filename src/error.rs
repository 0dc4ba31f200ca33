use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The observable failure categories of the crate. Serialization plumbing
/// reports `Io`; everything else is produced by validation in the builders,
/// the analyses or the parser.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid magic number, truncated stream, undecodable UTF-8 or a
    /// descriptor that does not follow the grammar.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// A 16-bit count somewhere in the file (constant pool, interfaces,
    /// fields, methods, attributes) would exceed 65535.
    #[error("count overflow: {0}")]
    PoolOverflow(String),

    /// A label, local variable or constant index was queried before it was
    /// assigned.
    #[error("unresolved reference: {0}")]
    Unresolved(String),

    /// Operand stack underflow or a merge the analyzer cannot reconcile.
    #[error("inconsistent flow: {0}")]
    InconsistentFlow(String),

    /// An operation that is never valid, such as attaching code to an
    /// abstract method or a duplicate switch case.
    #[error("illegal operation: {0}")]
    Illegal(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn malformed<S: ToString>(msg: S) -> Self {
        Error::Malformed(msg.to_string())
    }
}
