//! Pool map: pool versions and the devices backing them

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Device availability as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    #[default]
    Online,
    Failed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Online => write!(f, "online"),
            DeviceState::Failed => write!(f, "failed"),
        }
    }
}

/// One pool device and the catalogue service that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Base URL of the catalogue service, e.g. `http://10.0.0.4:3300`
    pub service: String,
    #[serde(default)]
    pub state: DeviceState,
}

/// A pool version: striping attributes plus an ordered device list
///
/// A layout over this version spans `N + 2K` of its devices: `N` data units,
/// `K` parity units and `K` spares. Device numbers are positions in `devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolVersion {
    pub id: u64,
    /// Data units per group
    pub n: u32,
    /// Parity units (and spares) per group
    pub k: u32,
    pub devices: Vec<Device>,
}

impl PoolVersion {
    pub fn new(id: u64, n: u32, k: u32) -> Self {
        Self {
            id,
            n,
            k,
            devices: Vec::new(),
        }
    }

    /// Append an online device served by `service`
    pub fn with_device(mut self, service: impl Into<String>) -> Self {
        self.devices.push(Device {
            service: service.into(),
            state: DeviceState::Online,
        });
        self
    }

    /// Redundancy group width, `N + 2K`
    pub fn group_width(&self) -> usize {
        self.n as usize + 2 * self.k as usize
    }

    /// Units that hold a replica of a record, `N + K`
    pub fn storing_units(&self) -> usize {
        self.n as usize + self.k as usize
    }

    /// Number of devices, `P`
    pub fn pool_width(&self) -> usize {
        self.devices.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(Error::InvalidPoolMap(format!(
                "pool version {} has no data units",
                self.id
            )));
        }
        if self.pool_width() < self.group_width() {
            return Err(Error::PoolTooNarrow {
                width: self.group_width(),
                pool: self.pool_width(),
            });
        }
        Ok(())
    }
}

/// All pool versions known to a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMap {
    pub versions: Vec<PoolVersion>,
}

impl PoolMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: PoolVersion) -> Self {
        self.versions.push(version);
        self
    }

    pub fn get(&self, id: u64) -> Result<&PoolVersion> {
        self.versions
            .iter()
            .find(|v| v.id == id)
            .ok_or(Error::UnknownPoolVersion(id))
    }

    /// Mark a device of a pool version as online or failed
    pub fn set_device_state(
        &mut self,
        version: u64,
        device: u32,
        state: DeviceState,
    ) -> Result<()> {
        let pver = self
            .versions
            .iter_mut()
            .find(|v| v.id == version)
            .ok_or(Error::UnknownPoolVersion(version))?;
        let dev = pver.devices.get_mut(device as usize).ok_or_else(|| {
            Error::InvalidArgument(format!("device {} not in pool version {}", device, version))
        })?;
        dev.state = state;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (i, v) in self.versions.iter().enumerate() {
            if self.versions[..i].iter().any(|other| other.id == v.id) {
                return Err(Error::InvalidPoolMap(format!("duplicate pool version {}", v.id)));
            }
            v.validate()?;
        }
        Ok(())
    }

    /// Load pool map from JSON file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let map: Self = serde_json::from_str(&content)?;
        map.validate()?;
        Ok(map)
    }

    /// Save pool map to JSON file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(devices: usize) -> PoolVersion {
        (0..devices).fold(PoolVersion::new(7, 1, 1), |p, i| {
            p.with_device(format!("http://svc-{}", i))
        })
    }

    #[test]
    fn test_widths() {
        let p = pool(4);
        assert_eq!(p.group_width(), 3);
        assert_eq!(p.storing_units(), 2);
        assert_eq!(p.pool_width(), 4);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_pool_too_narrow() {
        assert!(matches!(
            pool(2).validate(),
            Err(Error::PoolTooNarrow { width: 3, pool: 2 })
        ));
    }

    #[test]
    fn test_oversized_redundancy_is_rejected() {
        let p = PoolVersion::new(7, u32::MAX, u32::MAX).with_device("http://svc-0");
        assert_eq!(p.group_width(), 3 * u32::MAX as usize);
        assert_eq!(p.storing_units(), 2 * u32::MAX as usize);
        assert!(matches!(p.validate(), Err(Error::PoolTooNarrow { pool: 1, .. })));
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let map = PoolMap::new().with_version(pool(3)).with_version(pool(3));
        assert!(map.validate().is_err());
    }

    #[test]
    fn test_set_device_state() {
        let mut map = PoolMap::new().with_version(pool(3));
        map.set_device_state(7, 1, DeviceState::Failed).unwrap();
        assert_eq!(map.get(7).unwrap().devices[1].state, DeviceState::Failed);
        assert!(map.set_device_state(7, 9, DeviceState::Failed).is_err());
        assert!(map.set_device_state(8, 0, DeviceState::Failed).is_err());
    }

    #[test]
    fn test_load_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pools.json");
        let map = PoolMap::new().with_version(pool(5));
        map.save(&path).unwrap();
        assert_eq!(PoolMap::load(&path).unwrap(), map);
    }
}
