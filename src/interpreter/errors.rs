//! Fatal interpreter errors
//!
//! This module defines [`InterpError`], covering every way a parse-execute
//! run can abort: lex and syntax errors, type and name errors, arithmetic
//! and resource errors, runtime pointer errors, and the scripted program's
//! own `exit`. There is no local recovery inside the core; every error
//! propagates up the parse-execute call stack to the host entry point,
//! which prints the source-located diagnostic.

use std::fmt;

use thiserror::Error;

use crate::memory::{Address, ArenaError};

/// A resolved source position: file name, 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Errors that abort a parse-execute run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpError {
    #[error("{location}: {message}")]
    Lex {
        message: String,
        location: SourceLocation,
    },

    #[error("{location}: {message}")]
    Syntax {
        message: String,
        location: SourceLocation,
    },

    #[error("{location}: {message}")]
    Type {
        message: String,
        location: SourceLocation,
    },

    #[error("{location}: '{name}' is undefined")]
    Undefined {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: '{name}' is out of scope")]
    OutOfScope {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: '{name}' is already defined")]
    AlreadyDefined {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: division by zero")]
    DivisionByZero { location: SourceLocation },

    #[error("{location}: out of memory")]
    OutOfMemory { location: SourceLocation },

    #[error("{location}: stack underrun")]
    StackUnderrun { location: SourceLocation },

    #[error("{location}: NULL pointer dereference")]
    NullDereference { location: SourceLocation },

    #[error("{location}: invalid pointer access at 0x{addr:x}")]
    InvalidPointer {
        addr: Address,
        location: SourceLocation,
    },

    #[error("{location}: pointer target at 0x{addr:x} is out of scope")]
    OutOfScopeAccess {
        addr: Address,
        location: SourceLocation,
    },

    #[error("{location}: double free at address 0x{addr:x}")]
    DoubleFree {
        addr: Address,
        location: SourceLocation,
    },

    #[error("{location}: freeing address 0x{addr:x} which was never allocated")]
    InvalidFree {
        addr: Address,
        location: SourceLocation,
    },

    #[error("{location}: function '{function}' expects {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
        location: SourceLocation,
    },

    #[error("no main() function found")]
    NoMainFunction,

    #[error("program exited with value {value}")]
    Exit { value: i64 },

    #[error("{message}")]
    Host { message: String },
}

impl InterpError {
    /// The source position the error is anchored to, when it has one.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            InterpError::Lex { location, .. }
            | InterpError::Syntax { location, .. }
            | InterpError::Type { location, .. }
            | InterpError::Undefined { location, .. }
            | InterpError::OutOfScope { location, .. }
            | InterpError::AlreadyDefined { location, .. }
            | InterpError::DivisionByZero { location }
            | InterpError::OutOfMemory { location }
            | InterpError::StackUnderrun { location }
            | InterpError::NullDereference { location }
            | InterpError::InvalidPointer { location, .. }
            | InterpError::OutOfScopeAccess { location, .. }
            | InterpError::DoubleFree { location, .. }
            | InterpError::InvalidFree { location, .. }
            | InterpError::ArgumentCount { location, .. } => Some(location),
            InterpError::NoMainFunction | InterpError::Exit { .. } | InterpError::Host { .. } => {
                None
            }
        }
    }

    /// Convert an arena failure into a located interpreter error.
    pub fn from_arena(error: ArenaError, location: SourceLocation) -> InterpError {
        match error {
            ArenaError::OutOfMemory { .. } => InterpError::OutOfMemory { location },
            ArenaError::StackUnderrun | ArenaError::NoFrame => {
                InterpError::StackUnderrun { location }
            }
            ArenaError::InvalidFree { addr } => InterpError::InvalidFree { addr, location },
            ArenaError::DoubleFree { addr } => InterpError::DoubleFree { addr, location },
            ArenaError::NullAccess => InterpError::NullDereference { location },
            ArenaError::BadAccess { addr, .. } => InterpError::InvalidPointer { addr, location },
        }
    }
}

pub type Result<T, E = InterpError> = std::result::Result<T, E>;
