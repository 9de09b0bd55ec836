//! Error types for identifier parsing, option validation and payload coding

use thiserror::Error;

/// Rejected identifiers and option structs
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Identifier text did not match `<prefix>-<32 hex>`
    #[error("Malformed {kind}: '{input}'")]
    MalformedId { kind: &'static str, input: String },

    /// Resource request with an unusable quantity
    #[error("Invalid quantity {quantity} for resource '{resource}'")]
    InvalidResource { resource: String, quantity: f64 },

    /// Option field that breaks a structural rule
    #[error("Invalid option '{field}': {message}")]
    InvalidOption { field: &'static str, message: String },
}

impl ValidationError {
    pub fn option(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            field,
            message: message.into(),
        }
    }
}

/// Payload encoding and argument decoding failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("Failed to encode {type_name}: {message}")]
    Encode { type_name: &'static str, message: String },

    #[error("Failed to decode {type_name}: {message}")]
    Decode { type_name: &'static str, message: String },

    /// Argument list length does not match the callee's arity
    #[error("Expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },
}
