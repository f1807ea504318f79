//! Catalogue service protocol
//!
//! Requests and replies exchanged with a catalogue (CAS) service. One request
//! addresses one service; batched items are answered positionally, each with
//! its own result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fid::{CatalogueId, IndexId};
use crate::op::OpKind;

/// Per-record error reported by a catalogue service
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum CasError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("resource exhausted")]
    ResourceExhausted,

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A key/value record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Record {
    #[serde(with = "hex_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub val: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, val: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            val: val.into(),
        }
    }
}

pub type CasResult = Result<(), CasError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum CasRequest {
    Create {
        catalogues: Vec<CatalogueId>,
    },
    Delete {
        catalogues: Vec<CatalogueId>,
    },
    Lookup {
        catalogues: Vec<CatalogueId>,
    },
    /// Indices with a catalogue on the service, from `start` on
    List {
        start: IndexId,
        count: u32,
    },
    Put {
        catalogue: CatalogueId,
        records: Vec<Record>,
        /// Replace existing values instead of failing with `AlreadyExists`
        #[serde(default)]
        overwrite: bool,
    },
    Get {
        catalogue: CatalogueId,
        #[serde(with = "hex_bytes_list")]
        keys: Vec<Vec<u8>>,
    },
    /// Up to `counts[i]` records with key `>= start_keys[i]`
    Next {
        catalogue: CatalogueId,
        #[serde(with = "hex_bytes_list")]
        start_keys: Vec<Vec<u8>>,
        counts: Vec<u32>,
    },
    Del {
        catalogue: CatalogueId,
        #[serde(with = "hex_bytes_list")]
        keys: Vec<Vec<u8>>,
    },
}

impl CasRequest {
    pub fn kind(&self) -> OpKind {
        match self {
            CasRequest::Create { .. } => OpKind::Create,
            CasRequest::Delete { .. } => OpKind::Delete,
            CasRequest::Lookup { .. } => OpKind::Lookup,
            CasRequest::List { .. } => OpKind::List,
            CasRequest::Put { .. } => OpKind::Put,
            CasRequest::Get { .. } => OpKind::Get,
            CasRequest::Next { .. } => OpKind::Next,
            CasRequest::Del { .. } => OpKind::Del,
        }
    }

    /// Number of positional results the reply must carry
    ///
    /// `None` for `List`, whose reply length is bounded by `count` only.
    pub fn item_count(&self) -> Option<usize> {
        match self {
            CasRequest::Create { catalogues }
            | CasRequest::Delete { catalogues }
            | CasRequest::Lookup { catalogues } => Some(catalogues.len()),
            CasRequest::List { .. } => None,
            CasRequest::Put { records, .. } => Some(records.len()),
            CasRequest::Get { keys, .. } | CasRequest::Del { keys, .. } => Some(keys.len()),
            CasRequest::Next { start_keys, .. } => Some(start_keys.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "lowercase")]
pub enum CasReply {
    /// Create, delete, lookup, put and del
    Status { results: Vec<CasResult> },
    List { indices: Vec<IndexId> },
    /// Get: the found record per key
    Values { results: Vec<Result<Record, CasError>> },
    /// Next: one record list per start key; `NotFound` ends a list early
    Next { windows: Vec<Vec<Result<Record, CasError>>> },
}

impl CasReply {
    /// Number of positional results carried
    pub fn item_count(&self) -> usize {
        match self {
            CasReply::Status { results } => results.len(),
            CasReply::List { indices } => indices.len(),
            CasReply::Values { results } => results.len(),
            CasReply::Next { windows } => windows.len(),
        }
    }

    /// Check the reply variant against an operation kind and item count
    pub fn answers(&self, kind: OpKind, items: Option<usize>) -> bool {
        let shape_ok = match kind {
            OpKind::Create | OpKind::Delete | OpKind::Lookup | OpKind::Put | OpKind::Del => {
                matches!(self, CasReply::Status { .. })
            }
            OpKind::List => matches!(self, CasReply::List { .. }),
            OpKind::Get => matches!(self, CasReply::Values { .. }),
            OpKind::Next => matches!(self, CasReply::Next { .. }),
        };
        shape_ok && items.map_or(true, |n| n == self.item_count())
    }
}

pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

pub mod hex_bytes_list {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(list: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(list.len()))?;
        for bytes in list {
            seq.serialize_element(&hex::encode(bytes))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<String>::deserialize(deserializer)?;
        list.into_iter()
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}
