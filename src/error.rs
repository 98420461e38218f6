//! Error types for the variable store, expression engine, and graph loader.
//!
//! Mirrors the rest of the crate's convention: small `Debug + Clone` enums
//! with a manual `Display` impl, composed with `From` conversions rather
//! than a single crate-wide error type. Expression-level errors never
//! escape `expr.rs` — per the error policy in the specification they are
//! converted to a soft failure at the call site, leaving the store
//! unchanged.

use std::fmt;

/// Failure modes for [`crate::variable::VariableStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableError {
    /// `name` does not start with `%` or has no recognized type prefix.
    InvalidName(String),
    /// `set`/`define` referenced a name that was never defined.
    UndefinedVariable(String),
    /// The runtime type of a value did not match the variable's declared type.
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    /// A literal could not be parsed into the variable's declared type.
    ParseFailure { name: String, literal: String },
}

impl fmt::Display for VariableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid variable name: {name}"),
            Self::UndefinedVariable(name) => write!(f, "undefined variable: {name}"),
            Self::TypeMismatch { name, expected, found } => {
                write!(f, "type mismatch for {name}: expected {expected}, found {found}")
            }
            Self::ParseFailure { name, literal } => {
                write!(f, "could not parse {literal:?} as the type of {name}")
            }
        }
    }
}

impl std::error::Error for VariableError {}

/// Failure modes for the expression engine (`condition`, `interpolate`,
/// mutation and arithmetic expressions).
///
/// Per the specification's error policy, none of these ever abort
/// execution: every caller treats an `Err` as "no-op, value unchanged".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Referenced a variable name that is not defined.
    NoSuchVariable(String),
    /// A string-typed variable appeared inside an arithmetic expression.
    StringInArithmetic(String),
    /// Division by zero inside an arithmetic expression.
    DivisionByZero,
    /// The expression text could not be tokenized/parsed.
    Malformed(String),
    /// Operand types were incompatible for the requested comparison.
    TypeIncompatible,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchVariable(name) => write!(f, "no such variable: {name}"),
            Self::StringInArithmetic(name) => write!(f, "string variable {name} used in arithmetic"),
            Self::DivisionByZero => f.write_str("division by zero"),
            Self::Malformed(s) => write!(f, "malformed expression: {s}"),
            Self::TypeIncompatible => f.write_str("incompatible operand types"),
        }
    }
}

impl std::error::Error for ExprError {}

impl From<VariableError> for ExprError {
    fn from(error: VariableError) -> Self {
        match error {
            VariableError::UndefinedVariable(name) | VariableError::InvalidName(name) => Self::NoSuchVariable(name),
            VariableError::TypeMismatch { name, .. } | VariableError::ParseFailure { name, .. } => {
                Self::NoSuchVariable(name)
            }
        }
    }
}

/// Failure modes for [`crate::graph::GraphLoader::load`].
///
/// This is the only error type in the crate allowed to propagate out of a
/// top-level call as a hard failure — load errors happen before the
/// executor ever enters `Running`.
#[derive(Debug)]
pub enum LoadError {
    /// The document was not valid JSON.
    Json(serde_json::Error),
    /// `var_global` was present but neither a string nor an array of strings.
    MalformedVarGlobal(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "malformed JSON: {e}"),
            Self::MalformedVarGlobal(msg) => write!(f, "malformed var_global: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<serde_json::Error> for LoadError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error)
    }
}
