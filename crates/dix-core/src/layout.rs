//! Index layouts and key placement
//!
//! A layout descriptor names a pool version, a hash function and an index
//! mask. Placing a key filters it through the mask, hashes the result and
//! draws a permutation of the pool's devices seeded by the hash; the first
//! `N + 2K` devices of that permutation form the key's redundancy group.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tiny_keccak::{Hasher, Keccak};

use crate::imask::Imask;
use crate::pool::PoolVersion;
use crate::routing::{RedundancyGroup, Target};
use crate::{Error, Result};

/// Identifier of a descriptor stored in the layout-descriptor meta-index
pub type LayoutId = u64;

/// Hash applied to the masked key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFunction {
    /// First 8 bytes of the key, little-endian, zero padded
    None,
    /// 64-bit FNV-1
    #[default]
    Fnv1,
    /// First 8 bytes of Keccak-256
    Keccak,
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl HashFunction {
    pub fn hash(&self, data: &[u8]) -> u64 {
        match self {
            HashFunction::None => {
                let mut buf = [0u8; 8];
                let n = data.len().min(8);
                buf[..n].copy_from_slice(&data[..n]);
                u64::from_le_bytes(buf)
            }
            HashFunction::Fnv1 => data.iter().fold(FNV_OFFSET, |h, &b| {
                h.wrapping_mul(FNV_PRIME) ^ u64::from(b)
            }),
            HashFunction::Keccak => {
                let mut keccak = Keccak::v256();
                let mut out = [0u8; 32];
                keccak.update(data);
                keccak.finalize(&mut out);
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&out[..8]);
                u64::from_le_bytes(buf)
            }
        }
    }
}

impl fmt::Display for HashFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashFunction::None => write!(f, "none"),
            HashFunction::Fnv1 => write!(f, "fnv1"),
            HashFunction::Keccak => write!(f, "keccak"),
        }
    }
}

impl std::str::FromStr for HashFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(HashFunction::None),
            "fnv1" => Ok(HashFunction::Fnv1),
            "keccak" => Ok(HashFunction::Keccak),
            _ => Err(Error::InvalidArgument(format!("unknown hash function: {}", s))),
        }
    }
}

/// Everything needed to place the keys of an index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    pub pool_version: u64,
    pub hash: HashFunction,
    #[serde(default)]
    pub imask: Imask,
}

impl LayoutDescriptor {
    pub fn new(pool_version: u64, hash: HashFunction, imask: Imask) -> Self {
        Self {
            pool_version,
            hash,
            imask,
        }
    }

    /// Hash of the masked key
    pub fn key_hash(&self, key: &[u8]) -> u64 {
        self.hash.hash(&self.imask.filter_key(key))
    }
}

/// Layout attached to an index: a descriptor, or a reference to a stored one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexLayout {
    ById(LayoutId),
    Descr(LayoutDescriptor),
}

/// Role of a unit within a redundancy group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Data,
    Parity,
    Spare,
}

impl UnitKind {
    /// Data and parity units hold a replica, spares do not
    pub fn is_storing(&self) -> bool {
        !matches!(self, UnitKind::Spare)
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Data => write!(f, "data"),
            UnitKind::Parity => write!(f, "parity"),
            UnitKind::Spare => write!(f, "spare"),
        }
    }
}

/// A descriptor bound to the pool version it names
#[derive(Debug, Clone)]
pub struct LayoutInstance {
    descr: Arc<LayoutDescriptor>,
    pool: Arc<PoolVersion>,
}

impl LayoutInstance {
    pub fn new(descr: Arc<LayoutDescriptor>, pool: Arc<PoolVersion>) -> Result<Self> {
        if descr.pool_version != pool.id {
            return Err(Error::UnknownPoolVersion(descr.pool_version));
        }
        pool.validate()?;
        Ok(Self { descr, pool })
    }

    pub fn descriptor(&self) -> &LayoutDescriptor {
        &self.descr
    }

    pub fn pool(&self) -> &PoolVersion {
        &self.pool
    }

    pub fn group_width(&self) -> usize {
        self.pool.group_width()
    }

    /// Redundancy group of `key`
    ///
    /// Pure function of the descriptor, the pool version and the key.
    pub fn locate(&self, key: &[u8]) -> RedundancyGroup {
        let hash = self.descr.key_hash(key);
        let devices = permute(self.pool.pool_width(), self.group_width(), self.pool.id, hash);
        let n = self.pool.n as usize;
        let storing = self.pool.storing_units();

        let targets = devices
            .into_iter()
            .enumerate()
            .map(|(unit, device)| {
                let kind = if unit < n {
                    UnitKind::Data
                } else if unit < storing {
                    UnitKind::Parity
                } else {
                    UnitKind::Spare
                };
                self.target(unit as u32, device, kind)
            })
            .collect();
        RedundancyGroup::new(targets, storing)
    }

    /// Every device of the pool version, in device order
    pub fn all_targets(&self) -> Vec<Target> {
        (0..self.pool.pool_width() as u32)
            .map(|device| self.target(device, device, UnitKind::Data))
            .collect()
    }

    fn target(&self, unit: u32, device: u32, kind: UnitKind) -> Target {
        let dev = &self.pool.devices[device as usize];
        Target {
            unit,
            device,
            service: dev.service.clone(),
            kind,
            state: dev.state,
        }
    }
}

/// First `width` entries of a seeded permutation of `0..pool_width`
fn permute(pool_width: usize, width: usize, pool_id: u64, hash: u64) -> Vec<u32> {
    let mut devices: Vec<u32> = (0..pool_width as u32).collect();
    let mut state = pool_id ^ hash.rotate_left(29);
    for i in 0..width.min(pool_width) {
        let j = i + (splitmix64(&mut state) % (pool_width - i) as u64) as usize;
        devices.swap(i, j);
    }
    devices.truncate(width);
    devices
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imask::MaskRange;
    use std::collections::HashSet;

    fn instance(hash: HashFunction, imask: Imask) -> LayoutInstance {
        let pool = (0..8).fold(PoolVersion::new(3, 2, 1), |p, i| {
            p.with_device(format!("http://svc-{}", i))
        });
        LayoutInstance::new(
            Arc::new(LayoutDescriptor::new(3, hash, imask)),
            Arc::new(pool),
        )
        .unwrap()
    }

    #[test]
    fn test_locate_is_reproducible() {
        let layout = instance(HashFunction::Fnv1, Imask::empty());
        for key in [&b"alpha"[..], b"beta", b"", &[0u8; 64]] {
            assert_eq!(layout.locate(key), layout.locate(key));
        }
    }

    #[test]
    fn test_group_shape() {
        let layout = instance(HashFunction::Keccak, Imask::empty());
        let group = layout.locate(b"key");
        assert_eq!(group.len(), 4);
        let kinds: Vec<UnitKind> = group.targets().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![UnitKind::Data, UnitKind::Data, UnitKind::Parity, UnitKind::Spare]
        );
        assert_eq!(group.storing().len(), 3);
        let devices: HashSet<u32> = group.targets().iter().map(|t| t.device).collect();
        assert_eq!(devices.len(), 4);
        assert!(devices.iter().all(|&d| d < 8));
    }

    #[test]
    fn test_mask_limits_placement_input() {
        let layout = instance(HashFunction::Fnv1, Imask::new(vec![MaskRange::new(0, 15)]).unwrap());
        assert_eq!(layout.locate(b"ab-one"), layout.locate(b"ab-two"));
    }

    #[test]
    fn test_placement_spreads_keys() {
        let layout = instance(HashFunction::Fnv1, Imask::empty());
        let firsts: HashSet<u32> = (0..64u32)
            .map(|i| layout.locate(&i.to_be_bytes()).targets()[0].device)
            .collect();
        assert!(firsts.len() > 1);
    }

    #[test]
    fn test_instance_rejects_wrong_pool() {
        let pool = PoolVersion::new(4, 1, 0).with_device("http://svc");
        let descr = LayoutDescriptor::new(3, HashFunction::None, Imask::empty());
        assert!(LayoutInstance::new(Arc::new(descr), Arc::new(pool)).is_err());
    }

    #[test]
    fn test_hash_none_uses_key_prefix() {
        assert_eq!(HashFunction::None.hash(&[1, 0, 0, 0, 0, 0, 0, 0, 9]), 1);
        assert_eq!(HashFunction::None.hash(&[2]), 2);
    }

    #[test]
    fn test_fnv1_known_value() {
        assert_eq!(HashFunction::Fnv1.hash(b""), FNV_OFFSET);
        assert_eq!(HashFunction::Fnv1.hash(b"a"), 0xaf63_bd4c_8601_b7be);
    }

    #[test]
    fn test_hash_function_serialization() {
        assert_eq!(serde_json::to_string(&HashFunction::Keccak).unwrap(), "\"keccak\"");
        assert_eq!(HashFunction::Fnv1.to_string(), "fnv1");
        assert_eq!("KECCAK".parse::<HashFunction>().unwrap(), HashFunction::Keccak);
        assert!("sha1".parse::<HashFunction>().is_err());
    }
}
