//! Index mask: selects the bits of a key that take part in placement
//!
//! A mask is an ordered list of inclusive bit ranges. Applying it to a key
//! concatenates the selected bits, range by range in the order the ranges
//! were given. Bits are numbered little-endian inside each byte: bit `i` of a
//! buffer is `(buf[i / 8] >> (i % 8)) & 1`, and the output is packed the same
//! way.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::{Error, Result};

/// Range end meaning "up to the last bit of the input"
pub const IMASK_INF: u64 = u64::MAX;

/// Inclusive bit range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaskRange {
    pub start: u64,
    pub end: u64,
}

impl MaskRange {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Range starting at `start` and running to the end of the input
    pub const fn open(start: u64) -> Self {
        Self { start, end: IMASK_INF }
    }

    /// Number of bits this range selects from an input of `total_bits` bits
    fn selected(&self, total_bits: u64) -> u64 {
        if total_bits == 0 || self.start >= total_bits {
            return 0;
        }
        self.end.min(total_bits - 1) - self.start + 1
    }
}

/// Ordered set of bit ranges
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<MaskRange>", into = "Vec<MaskRange>")]
pub struct Imask {
    ranges: Vec<MaskRange>,
}

impl Imask {
    /// Build a mask, keeping the ranges in the order given
    pub fn new(ranges: Vec<MaskRange>) -> Result<Self> {
        if let Some(bad) = ranges.iter().find(|r| r.start > r.end) {
            return Err(Error::InvalidArgument(format!(
                "mask range start {} is past its end {}",
                bad.start, bad.end
            )));
        }
        Ok(Self { ranges })
    }

    /// Mask with no ranges
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ranges(&self) -> &[MaskRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Extract the masked bits of `buf`
    ///
    /// Ranges that start beyond the input contribute nothing, ranges that run
    /// past it are clamped. An empty mask selects nothing.
    pub fn apply(&self, buf: &[u8]) -> BitString {
        let total_bits = buf.len() as u64 * 8;
        let selected: u64 = self.ranges.iter().map(|r| r.selected(total_bits)).sum();
        if selected == 0 {
            return BitString::empty();
        }

        let mut out = BitString::with_capacity(selected);
        for range in &self.ranges {
            let count = range.selected(total_bits);
            for bit in range.start..range.start + count {
                let byte = buf[(bit / 8) as usize];
                out.push((byte >> (bit % 8)) & 1 == 1);
            }
        }
        out
    }

    /// Key bytes used for placement
    ///
    /// The empty mask is the identity filter: the whole key is used.
    pub fn filter_key<'a>(&self, key: &'a [u8]) -> Cow<'a, [u8]> {
        if self.is_empty() {
            Cow::Borrowed(key)
        } else {
            Cow::Owned(self.apply(key).into_bytes())
        }
    }
}

impl TryFrom<Vec<MaskRange>> for Imask {
    type Error = Error;

    fn try_from(ranges: Vec<MaskRange>) -> Result<Self> {
        Self::new(ranges)
    }
}

impl From<Imask> for Vec<MaskRange> {
    fn from(mask: Imask) -> Self {
        mask.ranges
    }
}

/// Packed bit sequence with an exact bit length
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitString {
    bytes: Vec<u8>,
    len: u64,
}

impl BitString {
    pub fn empty() -> Self {
        Self::default()
    }

    fn with_capacity(bits: u64) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8) as usize),
            len: 0,
        }
    }

    fn push(&mut self, bit: bool) {
        let offset = (self.len % 8) as u8;
        if offset == 0 {
            self.bytes.push(0);
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 1 << offset;
            }
        }
        self.len += 1;
    }

    /// Number of bits
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit at position `i`, `None` past the end
    pub fn bit(&self, i: u64) -> Option<bool> {
        if i >= self.len {
            return None;
        }
        Some((self.bytes[(i / 8) as usize] >> (i % 8)) & 1 == 1)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
