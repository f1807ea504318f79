//! Client error types

use dix_core::{CasError, MetaFormatError};
use thiserror::Error;

/// Error of a request, or of a single item within one
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DixError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("resource exhausted")]
    ResourceExhausted,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("device {device} unavailable")]
    Unavailable { device: u32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cancelled")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("layout error: {0}")]
    Layout(String),

    #[error("request not complete")]
    NotComplete,
}

impl DixError {
    /// Errors after which a read is re-issued to the next unit of the group
    pub fn is_retryable_read(&self) -> bool {
        matches!(
            self,
            DixError::NotFound
                | DixError::Transport(_)
                | DixError::Unavailable { .. }
                | DixError::ResourceExhausted
                | DixError::Protocol(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DixError::NotFound)
    }
}

impl From<CasError> for DixError {
    fn from(err: CasError) -> Self {
        match err {
            CasError::NotFound => DixError::NotFound,
            CasError::AlreadyExists => DixError::AlreadyExists,
            CasError::ResourceExhausted => DixError::ResourceExhausted,
            CasError::Protocol(msg) => DixError::Protocol(msg),
        }
    }
}

impl From<MetaFormatError> for DixError {
    fn from(err: MetaFormatError) -> Self {
        match err {
            MetaFormatError::EmptyBatch => DixError::InvalidArgument(err.to_string()),
            other => DixError::Protocol(other.to_string()),
        }
    }
}

impl From<dix_core::Error> for DixError {
    fn from(err: dix_core::Error) -> Self {
        match err {
            dix_core::Error::InvalidArgument(msg) => DixError::InvalidArgument(msg),
            dix_core::Error::Meta(meta) => meta.into(),
            other => DixError::Layout(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DixError>;
