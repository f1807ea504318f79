//! Catalogue service state

use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use dix_core::{CasReply, CasRequest};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::metrics;
use crate::store::CatalogueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub catalogues: usize,
    pub records: usize,
    pub requests: u64,
}

pub struct ServerState {
    pub config: ServerConfig,
    pub store: CatalogueStore,
    pub metrics: Option<PrometheusHandle>,
    requests: u64,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let store = match config.max_records {
            Some(limit) => CatalogueStore::with_capacity_limit(limit),
            None => CatalogueStore::new(),
        };
        Self {
            config,
            store,
            metrics: None,
            requests: 0,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            catalogues: self.store.catalogue_count(),
            records: self.store.record_count(),
            requests: self.requests,
        }
    }

    /// Check and answer one catalogue request
    pub fn process(&mut self, request: CasRequest) -> Result<CasReply> {
        validate(&request)?;
        let op = request.kind();
        let start = Instant::now();

        let reply = self.store.execute(request);
        self.requests += 1;

        metrics::record_cas_request(&op.to_string(), metrics::OUTCOME_OK, start.elapsed());
        metrics::record_item_errors(&op.to_string(), item_errors(&reply));
        metrics::set_store_size(self.store.catalogue_count(), self.store.record_count());
        tracing::debug!(op = %op, elapsed_us = start.elapsed().as_micros() as u64, "cas request");
        Ok(reply)
    }
}

fn validate(request: &CasRequest) -> Result<()> {
    match request {
        CasRequest::Next {
            start_keys, counts, ..
        } if start_keys.len() != counts.len() => Err(ServerError::InvalidRequest(format!(
            "{} start keys but {} counts",
            start_keys.len(),
            counts.len()
        ))),
        CasRequest::Next { counts, .. } if counts.contains(&0) => {
            Err(ServerError::InvalidRequest("zero record count".into()))
        }
        CasRequest::List { count: 0, .. } => {
            Err(ServerError::InvalidRequest("zero list count".into()))
        }
        _ => Ok(()),
    }
}

fn item_errors(reply: &CasReply) -> usize {
    match reply {
        CasReply::Status { results } => results.iter().filter(|r| r.is_err()).count(),
        CasReply::Values { results } => results.iter().filter(|r| r.is_err()).count(),
        CasReply::Next { windows } => windows.iter().flatten().filter(|r| r.is_err()).count(),
        CasReply::List { .. } => 0,
    }
}

/// Thread-safe wrapper for server state
pub type SharedState = Arc<tokio::sync::RwLock<ServerState>>;

pub fn create_shared_state(config: ServerConfig) -> SharedState {
    Arc::new(tokio::sync::RwLock::new(ServerState::new(config)))
}
