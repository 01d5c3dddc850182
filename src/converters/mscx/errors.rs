//! Error types for `.mscx` reading
//!
//! Any of these aborts a load before a score is handed out.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MscxError {
    /// Not well-formed XML
    #[error("invalid XML: {0}")]
    InvalidXml(String),

    /// A required element or attribute is absent
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// An attribute or text value does not parse
    #[error("invalid value '{value}' for {what}")]
    InvalidValue { what: String, value: String },

    /// Well-formed, but inconsistent with the score model
    #[error("corrupt score: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<roxmltree::Error> for MscxError {
    fn from(e: roxmltree::Error) -> Self {
        MscxError::InvalidXml(e.to_string())
    }
}

impl From<std::io::Error> for MscxError {
    fn from(e: std::io::Error) -> Self {
        MscxError::Io(e.to_string())
    }
}
