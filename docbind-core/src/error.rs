//! Error types and result types for expression parsing and binding.
//!
//! This module provides the error handling shared by every stage of resolving an expression:
//! scanning, reading, placeholder binding and argument encoding.
//! Use [`ExpressionResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when resolving an expression into a document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// The expression text itself is unusable (for example, empty).
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
    /// The expression text is not valid relaxed extended JSON.
    /// `line` and `column` are 1-based and point at the offending input.
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        /// Description of what the reader expected or found.
        message: String,
        /// Line of the offending input.
        line: usize,
        /// Column of the offending input, counted in characters.
        column: usize,
    },
    /// A placeholder references an argument that was not supplied.
    #[error("Placeholder ?{index} is out of range, {available} argument(s) bound")]
    PlaceholderOutOfRange {
        /// The zero-based index named by the placeholder.
        index: usize,
        /// How many arguments the expression was bound with.
        available: usize,
    },
    /// A bound argument cannot be used where its placeholder appears.
    #[error("Binding error: {0}")]
    Binding(String),
    /// A bound argument could not be encoded into BSON.
    #[error("Encoding error: {0}")]
    Encoding(String),
    /// The codec registry is inconsistent and cannot supply a codec it advertises.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ExpressionError {
    /// Builds a [`ExpressionError::Parse`] for a byte `offset` into `source`.
    pub fn parse_at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        let consumed = source.get(..offset).unwrap_or(source);
        let line = consumed.matches('\n').count() + 1;
        let column = match consumed.rfind('\n') {
            Some(newline) => consumed[newline + 1..].chars().count() + 1,
            None => consumed.chars().count() + 1,
        };

        ExpressionError::Parse { message: message.into(), line, column }
    }
}

/// A specialized `Result` type for expression operations.
pub type ExpressionResult<T> = Result<T, ExpressionError>;

impl From<BsonError> for ExpressionError {
    fn from(err: BsonError) -> Self {
        ExpressionError::Encoding(err.to_string())
    }
}

impl From<SerdeJsonError> for ExpressionError {
    fn from(err: SerdeJsonError) -> Self {
        ExpressionError::Encoding(err.to_string())
    }
}
