//! The error type shared by the structure, binary format and validation crates.

use thiserror::Error;

use super::opcodes::Opcode;
use super::modules::SectionId;

pub type Result<T> = ::std::result::Result<T, Error>;

/// Every failure is fatal for the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("buffer exhausted at offset {offset}: requested {requested} byte(s), {available} available")]
    BufferExhausted {
        offset: usize,
        requested: usize,
        available: usize,
    },

    #[error("malformed binary at offset {offset}: {message}")]
    Malformed { offset: usize, message: String },

    #[error("unsupported instruction {opcode} at offset {offset}")]
    UnsupportedInstruction { offset: usize, opcode: Opcode },

    #[error("duplicate {id:?} section at offset {offset}")]
    DuplicateSection { offset: usize, id: SectionId },

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    #[error("stack type mismatch at `{instruction}`: stack {stack} does not satisfy {signature}")]
    StackTypeMismatch {
        instruction: String,
        stack: String,
        signature: String,
    },
}

/// The coarse category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BufferExhausted,
    MalformedBinary,
    InvalidReference,
    InvalidStructure,
    StackTypeMismatch,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::BufferExhausted { .. } => ErrorKind::BufferExhausted,
            Error::Malformed { .. }
            | Error::UnsupportedInstruction { .. }
            | Error::DuplicateSection { .. } => ErrorKind::MalformedBinary,
            Error::InvalidReference(_) => ErrorKind::InvalidReference,
            Error::InvalidStructure(_) => ErrorKind::InvalidStructure,
            Error::StackTypeMismatch { .. } => ErrorKind::StackTypeMismatch,
        }
    }

    pub fn malformed(offset: usize, message: impl Into<String>) -> Self {
        Error::Malformed {
            offset,
            message: message.into(),
        }
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Error::InvalidReference(message.into())
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Error::InvalidStructure(message.into())
    }
}
