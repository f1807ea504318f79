//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::layout::LayoutDescriptor;

/// Protocol version constant
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Configuration of an index client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Pool map file (JSON)
    pub pool_map: PathBuf,
    /// Layout of the meta-indices; without it indices must carry their layout
    #[serde(default)]
    pub meta_layout: Option<LayoutDescriptor>,
    /// Deadline for one catalogue request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// TCP connect timeout for catalogue services
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Protocol version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

impl ClientConfig {
    /// Configuration rooted at a base directory
    ///
    /// Expects the following structure:
    /// ```text
    /// base_dir/
    ///   pools.json
    /// ```
    pub fn from_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool_map: base_dir.into().join("pools.json"),
            meta_layout: None,
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            version: default_version(),
        }
    }

    pub fn with_meta_layout(mut self, layout: LayoutDescriptor) -> Self {
        self.meta_layout = Some(layout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Load configuration from JSON file
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imask::Imask;
    use crate::layout::HashFunction;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"pool_map":"/tmp/pools.json"}"#).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.version, PROTOCOL_VERSION);
        assert!(config.meta_layout.is_none());
    }

    #[test]
    fn test_from_base_dir() {
        let config = ClientConfig::from_base_dir("/data/dix");
        assert_eq!(config.pool_map, PathBuf::from("/data/dix/pools.json"));
    }

    #[test]
    fn test_load_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        let config = ClientConfig::from_base_dir(dir.path())
            .with_meta_layout(LayoutDescriptor::new(1, HashFunction::Fnv1, Imask::empty()))
            .with_request_timeout(Duration::from_millis(250));
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded.request_timeout_ms, 250);
        assert_eq!(loaded.meta_layout, config.meta_layout);
    }
}
