//! Error types for dix-core

use thiserror::Error;

use crate::meta::MetaFormatError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid index id: {0}")]
    InvalidIndexId(String),

    #[error("Unknown pool version: {0}")]
    UnknownPoolVersion(u64),

    #[error("Pool too narrow: layout needs {width} devices, pool has {pool}")]
    PoolTooNarrow { width: usize, pool: usize },

    #[error("Invalid pool map: {0}")]
    InvalidPoolMap(String),

    #[error("Meta record error: {0}")]
    Meta(#[from] MetaFormatError),
}
