//! Target routing: resolves layouts against the pool map

use serde::Serialize;
use std::sync::Arc;

use crate::layout::{LayoutDescriptor, LayoutInstance, UnitKind};
use crate::pool::{DeviceState, PoolMap};
use crate::Result;

/// One unit of a redundancy group and the device it lands on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    /// Position of the unit in its group
    pub unit: u32,
    /// Device number within the pool version
    pub device: u32,
    /// Catalogue service owning the device
    pub service: String,
    pub kind: UnitKind,
    pub state: DeviceState,
}

impl Target {
    pub fn is_online(&self) -> bool {
        self.state == DeviceState::Online
    }
}

/// Ordered targets of one key: data units, then parity, then spares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedundancyGroup {
    targets: Vec<Target>,
    storing: usize,
}

impl RedundancyGroup {
    pub(crate) fn new(targets: Vec<Target>, storing: usize) -> Self {
        Self { targets, storing }
    }

    /// All units in group order; also the order reads try them in
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Units that hold a replica of the key (data and parity)
    pub fn storing(&self) -> &[Target] {
        &self.targets[..self.storing]
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Routes keys of an index to their targets
///
/// Holds one snapshot of the pool map; requests keep the router they started
/// with so retries see the same groups.
#[derive(Debug, Clone)]
pub struct TargetRouter {
    pools: Arc<PoolMap>,
}

impl TargetRouter {
    pub fn new(pools: Arc<PoolMap>) -> Self {
        Self { pools }
    }

    /// Bind a descriptor to its pool version
    pub fn instance(&self, descr: Arc<LayoutDescriptor>) -> Result<LayoutInstance> {
        let pool = self.pools.get(descr.pool_version)?;
        LayoutInstance::new(descr, Arc::new(pool.clone()))
    }

    /// Redundancy group of `key` under `descr`
    pub fn route(&self, descr: &LayoutDescriptor, key: &[u8]) -> Result<RedundancyGroup> {
        Ok(self.instance(Arc::new(descr.clone()))?.locate(key))
    }

    pub fn pools(&self) -> &PoolMap {
        &self.pools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imask::Imask;
    use crate::layout::HashFunction;
    use crate::pool::PoolVersion;

    fn router() -> TargetRouter {
        let pool = (0..5).fold(PoolVersion::new(1, 1, 1), |p, i| {
            p.with_device(format!("http://svc-{}", i))
        });
        TargetRouter::new(Arc::new(PoolMap::new().with_version(pool)))
    }

    #[test]
    fn test_route_matches_instance_locate() {
        let router = router();
        let descr = LayoutDescriptor::new(1, HashFunction::Fnv1, Imask::empty());
        let inst = router.instance(Arc::new(descr.clone())).unwrap();
        assert_eq!(router.route(&descr, b"k").unwrap(), inst.locate(b"k"));
    }

    #[test]
    fn test_route_unknown_pool() {
        let descr = LayoutDescriptor::new(9, HashFunction::Fnv1, Imask::empty());
        assert!(router().route(&descr, b"k").is_err());
    }

    #[test]
    fn test_all_targets_cover_pool() {
        let descr = LayoutDescriptor::new(1, HashFunction::Fnv1, Imask::empty());
        let inst = router().instance(Arc::new(descr)).unwrap();
        let devices: Vec<u32> = inst.all_targets().iter().map(|t| t.device).collect();
        assert_eq!(devices, vec![0, 1, 2, 3, 4]);
        assert!(inst.all_targets().iter().all(|t| t.is_online()));
    }
}
