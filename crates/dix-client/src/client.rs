//! Index client implementation

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dix_core::{ClientConfig, DeviceState, LayoutDescriptor, PoolMap};

use crate::error::{DixError, Result};
use crate::request::DixRequest;
use crate::transport::{CatalogueTransport, HttpTransport};

/// State shared by a client and its requests
pub(crate) struct ClientInner {
    pub(crate) transport: Arc<dyn CatalogueTransport>,
    pub(crate) pools: ArcSwap<PoolMap>,
    pub(crate) meta_layout: Option<Arc<LayoutDescriptor>>,
    pub(crate) timeout: Duration,
}

/// Client of distributed indices
///
/// Cheap to clone. Each request takes a snapshot of the pool map when it
/// starts, so pool map updates only affect requests posted afterwards.
#[derive(Clone)]
pub struct DixClient {
    inner: Arc<ClientInner>,
}

impl DixClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// New request in the `Initialised` state
    pub fn request(&self) -> DixRequest {
        DixRequest::new(self.inner.clone())
    }

    /// Current pool map
    pub fn pools(&self) -> Arc<PoolMap> {
        self.inner.pools.load_full()
    }

    /// Replace the pool map
    pub fn update_pools(&self, pools: PoolMap) -> Result<()> {
        pools.validate()?;
        tracing::info!(versions = pools.versions.len(), "pool map updated");
        self.inner.pools.store(Arc::new(pools));
        Ok(())
    }

    /// Mark a device online or failed for subsequent requests
    pub fn set_device_state(&self, version: u64, device: u32, state: DeviceState) -> Result<()> {
        let mut pools = PoolMap::clone(&self.inner.pools.load());
        pools.set_device_state(version, device, state)?;
        tracing::info!(version, device, state = %state, "device state changed");
        self.inner.pools.store(Arc::new(pools));
        Ok(())
    }

    pub(crate) fn meta_layout(&self) -> Result<LayoutDescriptor> {
        self.inner
            .meta_layout
            .as_deref()
            .cloned()
            .ok_or_else(|| DixError::Layout("no meta layout configured".into()))
    }
}

/// Builder for DixClient
pub struct ClientBuilder {
    pools: Option<PoolMap>,
    pool_map_path: Option<PathBuf>,
    transport: Option<Arc<dyn CatalogueTransport>>,
    meta_layout: Option<LayoutDescriptor>,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            pools: None,
            pool_map_path: None,
            transport: None,
            meta_layout: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Take pool map path, meta layout and timeouts from a configuration
    pub fn config(mut self, config: &ClientConfig) -> Self {
        self.pool_map_path = Some(config.pool_map.clone());
        self.meta_layout = config.meta_layout.clone();
        self.request_timeout = config.request_timeout();
        self.connect_timeout = config.connect_timeout();
        self
    }

    pub fn pools(mut self, pools: PoolMap) -> Self {
        self.pools = Some(pools);
        self
    }

    /// Use a custom transport instead of HTTP
    pub fn transport(mut self, transport: Arc<dyn CatalogueTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn meta_layout(mut self, layout: LayoutDescriptor) -> Self {
        self.meta_layout = Some(layout);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<DixClient> {
        let pools = match (self.pools, self.pool_map_path) {
            (Some(pools), _) => pools,
            (None, Some(path)) => PoolMap::load(&path)?,
            (None, None) => {
                return Err(DixError::InvalidArgument("no pool map given".into()));
            }
        };
        pools.validate()?;

        if let Some(meta) = &self.meta_layout {
            pools.get(meta.pool_version)?;
        }

        let transport: Arc<dyn CatalogueTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(self.connect_timeout)?),
        };

        tracing::info!(
            versions = pools.versions.len(),
            meta = self.meta_layout.is_some(),
            "index client ready"
        );

        Ok(DixClient {
            inner: Arc::new(ClientInner {
                transport,
                pools: ArcSwap::from_pointee(pools),
                meta_layout: self.meta_layout.map(Arc::new),
                timeout: self.request_timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
