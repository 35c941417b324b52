use std::fmt;

use thiserror::Error;

/// Why a method call could not be bound to a class implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFailure {
    NoCurrentClass,
    NoBaseClass,
    MethodNotFound,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoCurrentClass => "super() used outside of a method",
            Self::NoBaseClass => "class has no base class",
            Self::MethodNotFound => "method not defined anywhere in the base chain",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorPosition {
    Binary,
    AugmentedAssignment,
}

impl fmt::Display for OperatorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let position = match self {
            Self::Binary => "binary",
            Self::AugmentedAssignment => "augmented assignment",
        };
        f.write_str(position)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranspileError {
    #[error("Unsupported construct: {construct} at line {line}, column {column}")]
    UnsupportedConstruct {
        construct: String,
        line: usize,
        column: usize,
    },
    #[error("Cannot resolve {class}.{method} at line {line}, column {column}: {reason}")]
    UnresolvedDispatch {
        class: String,
        method: String,
        reason: DispatchFailure,
        line: usize,
        column: usize,
    },
    #[error("Unsupported {position} operator '{operator}' at line {line}, column {column}")]
    UnsupportedOperator {
        operator: String,
        position: OperatorPosition,
        line: usize,
        column: usize,
    },
}

impl TranspileError {
    pub fn line(&self) -> usize {
        match self {
            Self::UnsupportedConstruct { line, .. }
            | Self::UnresolvedDispatch { line, .. }
            | Self::UnsupportedOperator { line, .. } => *line,
        }
    }
}

pub type TranspileResult<T> = Result<T, TranspileError>;
