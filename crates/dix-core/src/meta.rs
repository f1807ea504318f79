//! Record format of the layout meta-indices
//!
//! The `layout` meta-index maps an index id to its layout, the
//! `layout-descr` meta-index maps a layout id to a descriptor. Both store
//! batches of parallel key/value buffers.
//!
//! Keys:
//! - layout index: 16-byte index id, big-endian
//! - layout-descr index: 8-byte layout id, big-endian
//!
//! Values start with a 5-byte header, the magic `DXL1` followed by a tag:
//!
//! | tag | payload |
//! |-----|---------|
//! | `LAYOUT_BY_ID` (1) | layout id, `u64` little-endian |
//! | `LAYOUT_BY_DESCR` (2) | bincode-encoded [`LayoutDescriptor`] |

use thiserror::Error;

use crate::fid::{IndexId, INDEX_ID_SIZE};
use crate::layout::{IndexLayout, LayoutDescriptor, LayoutId};

/// Magic bytes opening every layout value
pub const META_MAGIC: [u8; 4] = *b"DXL1";

/// Value header size in bytes (magic + tag)
pub const META_HEADER_SIZE: usize = 5;

/// Value tag: the layout is a reference to a stored descriptor
pub const LAYOUT_BY_ID: u8 = 1;

/// Value tag: the layout is an inline descriptor
pub const LAYOUT_BY_DESCR: u8 = 2;

/// Parallel key and value buffers of one meta-index batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedBatch {
    pub keys: Vec<Vec<u8>>,
    pub vals: Vec<Vec<u8>>,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key/value pairs, consuming the batch
    pub fn into_records(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.keys.into_iter().zip(self.vals).collect()
    }

    fn check(&self) -> Result<(), MetaFormatError> {
        if self.keys.is_empty() {
            return Err(MetaFormatError::EmptyBatch);
        }
        if self.keys.len() != self.vals.len() {
            return Err(MetaFormatError::LengthMismatch {
                keys: self.keys.len(),
                vals: self.vals.len(),
            });
        }
        Ok(())
    }
}

/// Errors for meta record parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetaFormatError {
    #[error("empty batch")]
    EmptyBatch,

    #[error("batch has {keys} keys but {vals} values")]
    LengthMismatch { keys: usize, vals: usize },

    #[error("key is {actual} bytes, expected {expected}")]
    KeyLength { expected: usize, actual: usize },

    #[error("value too short: {actual} bytes")]
    ValueTooShort { actual: usize },

    #[error("invalid magic: {actual:?}")]
    InvalidMagic { actual: [u8; 4] },

    #[error("unknown layout tag {0}")]
    UnknownTag(u8),

    #[error("layout id payload is {actual} bytes, expected 8")]
    LayoutIdLength { actual: usize },

    #[error("bad layout descriptor: {0}")]
    Descriptor(String),
}

/// Encode one layout value
pub fn encode_layout(layout: &IndexLayout) -> Result<Vec<u8>, MetaFormatError> {
    match layout {
        IndexLayout::ById(id) => {
            let mut buf = header(LAYOUT_BY_ID);
            buf.extend_from_slice(&id.to_le_bytes());
            Ok(buf)
        }
        IndexLayout::Descr(descr) => encode_descr(descr),
    }
}

/// Decode one layout value
pub fn decode_layout(data: &[u8]) -> Result<IndexLayout, MetaFormatError> {
    let (tag, payload) = split_header(data)?;
    match tag {
        LAYOUT_BY_ID => {
            let raw: [u8; 8] = payload
                .try_into()
                .map_err(|_| MetaFormatError::LayoutIdLength {
                    actual: payload.len(),
                })?;
            Ok(IndexLayout::ById(u64::from_le_bytes(raw)))
        }
        LAYOUT_BY_DESCR => Ok(IndexLayout::Descr(decode_descr_payload(payload)?)),
        other => Err(MetaFormatError::UnknownTag(other)),
    }
}

/// Encode a batch of `index id -> layout` records
pub fn encode_layouts(items: &[(IndexId, IndexLayout)]) -> Result<EncodedBatch, MetaFormatError> {
    if items.is_empty() {
        return Err(MetaFormatError::EmptyBatch);
    }
    let mut batch = EncodedBatch::default();
    for (id, layout) in items {
        batch.keys.push(id.to_bytes().to_vec());
        batch.vals.push(encode_layout(layout)?);
    }
    Ok(batch)
}

/// Decode a batch produced by [`encode_layouts`]
pub fn decode_layouts(
    batch: &EncodedBatch,
) -> Result<Vec<(IndexId, IndexLayout)>, MetaFormatError> {
    batch.check()?;
    batch
        .keys
        .iter()
        .zip(&batch.vals)
        .map(|(key, val)| Ok((decode_index_key(key)?, decode_layout(val)?)))
        .collect()
}

/// Encode a batch of `layout id -> descriptor` records
pub fn encode_ldescrs(
    items: &[(LayoutId, LayoutDescriptor)],
) -> Result<EncodedBatch, MetaFormatError> {
    if items.is_empty() {
        return Err(MetaFormatError::EmptyBatch);
    }
    let mut batch = EncodedBatch::default();
    for (id, descr) in items {
        batch.keys.push(layout_id_key(*id));
        batch.vals.push(encode_descr(descr)?);
    }
    Ok(batch)
}

/// Decode a batch produced by [`encode_ldescrs`]
pub fn decode_ldescrs(
    batch: &EncodedBatch,
) -> Result<Vec<(LayoutId, LayoutDescriptor)>, MetaFormatError> {
    batch.check()?;
    batch
        .keys
        .iter()
        .zip(&batch.vals)
        .map(|(key, val)| Ok((decode_layout_id_key(key)?, decode_descr(val)?)))
        .collect()
}

/// Key of a layout id in the layout-descr index
pub fn layout_id_key(id: LayoutId) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub fn decode_layout_id_key(key: &[u8]) -> Result<LayoutId, MetaFormatError> {
    let raw: [u8; 8] = key.try_into().map_err(|_| MetaFormatError::KeyLength {
        expected: 8,
        actual: key.len(),
    })?;
    Ok(u64::from_be_bytes(raw))
}

pub fn decode_index_key(key: &[u8]) -> Result<IndexId, MetaFormatError> {
    IndexId::from_bytes(key).map_err(|_| MetaFormatError::KeyLength {
        expected: INDEX_ID_SIZE,
        actual: key.len(),
    })
}

/// Decode a descriptor value of the layout-descr index
pub fn decode_descr(data: &[u8]) -> Result<LayoutDescriptor, MetaFormatError> {
    match decode_layout(data)? {
        IndexLayout::Descr(descr) => Ok(descr),
        IndexLayout::ById(_) => Err(MetaFormatError::UnknownTag(LAYOUT_BY_ID)),
    }
}

fn encode_descr(descr: &LayoutDescriptor) -> Result<Vec<u8>, MetaFormatError> {
    let payload =
        bincode::serialize(descr).map_err(|e| MetaFormatError::Descriptor(e.to_string()))?;
    let mut buf = header(LAYOUT_BY_DESCR);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn decode_descr_payload(payload: &[u8]) -> Result<LayoutDescriptor, MetaFormatError> {
    bincode::deserialize(payload).map_err(|e| MetaFormatError::Descriptor(e.to_string()))
}

fn header(tag: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(META_HEADER_SIZE + 8);
    buf.extend_from_slice(&META_MAGIC);
    buf.push(tag);
    buf
}

fn split_header(data: &[u8]) -> Result<(u8, &[u8]), MetaFormatError> {
    if data.len() < META_HEADER_SIZE {
        return Err(MetaFormatError::ValueTooShort { actual: data.len() });
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&data[0..4]);
    if magic != META_MAGIC {
        return Err(MetaFormatError::InvalidMagic { actual: magic });
    }
    Ok((data[4], &data[META_HEADER_SIZE..]))
}
