//! Catalogue service

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::metrics::init_prometheus_recorder;
use crate::routes::create_router;
use crate::state::{ServerState, SharedState};

pub struct DixServer {
    state: SharedState,
    addr: SocketAddr,
}

impl DixServer {
    pub fn new(state: ServerState, addr: SocketAddr) -> Self {
        Self {
            state: std::sync::Arc::new(tokio::sync::RwLock::new(state)),
            addr,
        }
    }

    pub async fn run(self) -> Result<()> {
        let router = create_router(self.state);

        tracing::info!("Starting catalogue service on {}", self.addr);

        let listener = TcpListener::bind(self.addr).await?;
        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Get the server state for testing
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Builder for DixServer
pub struct ServerBuilder {
    config: ServerConfig,
    addr: SocketAddr,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        let addr = ([127, 0, 0, 1], config.port).into();
        Self { config, addr }
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.addr = ([0, 0, 0, 0], port).into();
        self
    }

    /// Install the Prometheus recorder when the configuration asks for it
    pub fn build(self) -> Result<DixServer> {
        let mut state = ServerState::new(self.config.clone());
        if self.config.metrics {
            state = state.with_metrics(init_prometheus_recorder()?);
        }
        Ok(DixServer::new(state, self.addr))
    }
}
