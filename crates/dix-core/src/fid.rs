//! Index and component catalogue identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Size of an index id in its byte form
pub const INDEX_ID_SIZE: usize = 16;

/// 128-bit identifier of a distributed index
///
/// Ordered by `(container, key)`. The byte form is big-endian so that the
/// lexicographic order of encoded ids matches the numeric order, which keeps
/// meta-index scans sorted by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexId {
    pub container: u64,
    pub key: u64,
}

/// Index holding `index id -> layout` records
pub const LAYOUT_INDEX: IndexId = IndexId::new(0x6978_0000_0000_0000, 0x1);

/// Index holding `layout id -> layout descriptor` records
pub const LDESCR_INDEX: IndexId = IndexId::new(0x6978_0000_0000_0000, 0x2);

impl IndexId {
    pub const fn new(container: u64, key: u64) -> Self {
        Self { container, key }
    }

    /// Returns true for the reserved meta-indices
    pub fn is_meta(&self) -> bool {
        *self == LAYOUT_INDEX || *self == LDESCR_INDEX
    }

    pub fn to_bytes(&self) -> [u8; INDEX_ID_SIZE] {
        let mut buf = [0u8; INDEX_ID_SIZE];
        buf[0..8].copy_from_slice(&self.container.to_be_bytes());
        buf[8..16].copy_from_slice(&self.key.to_be_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> crate::Result<Self> {
        let raw: [u8; INDEX_ID_SIZE] = data.try_into().map_err(|_| {
            Error::InvalidIndexId(format!("expected {} bytes, got {}", INDEX_ID_SIZE, data.len()))
        })?;
        let mut container = [0u8; 8];
        let mut key = [0u8; 8];
        container.copy_from_slice(&raw[0..8]);
        key.copy_from_slice(&raw[8..16]);
        Ok(Self {
            container: u64::from_be_bytes(container),
            key: u64::from_be_bytes(key),
        })
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:x}:{:x}>", self.container, self.key)
    }
}

impl FromStr for IndexId {
    type Err = Error;

    /// Accepts `<container:key>` or `container:key`, both parts in hex
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(s.trim());
        let (container, key) = inner
            .split_once(':')
            .ok_or_else(|| Error::InvalidIndexId(s.to_string()))?;
        let parse = |part: &str| {
            let part = part.strip_prefix("0x").unwrap_or(part);
            u64::from_str_radix(part, 16).map_err(|_| Error::InvalidIndexId(s.to_string()))
        };
        Ok(Self::new(parse(container)?, parse(key)?))
    }
}

/// Component catalogue: the slice of an index stored on one pool device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatalogueId {
    pub index: IndexId,
    pub device: u32,
}

impl CatalogueId {
    pub fn new(index: IndexId, device: u32) -> Self {
        Self { index, device }
    }
}

impl fmt::Display for CatalogueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.device)
    }
}
