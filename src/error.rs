//! Error types for namesake.

use thiserror::Error;

/// Result type for namesake operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for namesake operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A block referenced a signature id the store does not know.
    #[error("Unknown signature: {0}")]
    UnknownSignature(String),

    /// A signature was listed in more than one block.
    #[error("Signature {id} appears in blocks {first} and {second}")]
    DuplicateSignature {
        /// Offending signature id.
        id: String,
        /// Block that claimed the signature first.
        first: String,
        /// Block that claimed it again.
        second: String,
    },

    /// A configuration parameter is out of range or malformed.
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// Feature vector length does not match what the classifier was fitted on.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the fitted classifier expects.
        expected: usize,
        /// Dimensionality actually supplied.
        actual: usize,
    },

    /// Classifier inference failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Every hyperparameter trial failed; there is no model to select.
    #[error("Search failed: {0}")]
    SearchFailed(String),

    /// An operation that requires data received none.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Model state could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an unknown-signature error.
    pub fn unknown_signature(id: impl Into<String>) -> Self {
        Error::UnknownSignature(id.into())
    }

    /// Create an invalid-parameter error.
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an inference error.
    pub fn inference(msg: impl Into<String>) -> Self {
        Error::Inference(msg.into())
    }

    /// Create a search-failure error.
    pub fn search_failed(msg: impl Into<String>) -> Self {
        Error::SearchFailed(msg.into())
    }

    /// Create an empty-input error.
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Error::EmptyInput(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Error::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
