//! Error types for score editing
//!
//! Every failure of a command is one of these; lookups that may legitimately
//! miss return `Option` instead.

use crate::converters::MscxError;
use crate::models::{ElementId, TimeSigError};
use thiserror::Error;

/// Top-level editing error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngravingError {
    /// The edit would leave the score inconsistent; nothing was changed
    #[error("rewrite rejected: {0}")]
    RewriteRejected(String),

    /// A handle does not name a live element of the expected kind
    #[error("invalid reference: {0}")]
    InvalidReference(ElementId),

    /// Operation not allowed in the current command state
    #[error("invalid command state: {0}")]
    InvalidCommandState(String),

    #[error("invalid time signature: {0}")]
    InvalidTimeSig(#[from] TimeSigError),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("{0}")]
    File(#[from] MscxError),
}

pub type Result<T> = std::result::Result<T, EngravingError>;
