//! Per-target request driver
//!
//! Every outbound catalogue request runs as its own task. Completions are
//! collected by the single executor that owns the driver, so item state is
//! only ever touched from one place.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use dix_core::{CasReply, CasRequest, Target};

use crate::error::DixError;
use crate::transport::{CatalogueTransport, TransportError};

/// Why a target produced no reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetFailure {
    /// The service could not be reached or timed out
    Transport(TransportError),
    /// The device is marked failed in the pool map; nothing was sent
    Unavailable { device: u32 },
    /// The reply does not answer the request
    Protocol(String),
}

impl From<TargetFailure> for DixError {
    fn from(failure: TargetFailure) -> Self {
        match failure {
            TargetFailure::Transport(e) => DixError::Transport(e.to_string()),
            TargetFailure::Unavailable { device } => DixError::Unavailable { device },
            TargetFailure::Protocol(msg) => DixError::Protocol(msg),
        }
    }
}

/// One outbound request: where it goes and which items it carries
#[derive(Debug)]
pub struct Dispatch {
    pub target: Target,
    /// Item positions, in the order the request lists them
    pub positions: Vec<usize>,
    pub request: CasRequest,
}

/// A finished dispatch
#[derive(Debug)]
pub struct Completion {
    pub target: Target,
    pub positions: Vec<usize>,
    pub outcome: Result<CasReply, TargetFailure>,
}

pub struct Driver {
    transport: Arc<dyn CatalogueTransport>,
    timeout: Duration,
    inflight: JoinSet<Completion>,
}

impl Driver {
    pub fn new(transport: Arc<dyn CatalogueTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            inflight: JoinSet::new(),
        }
    }

    /// Start a request; its completion is returned by [`Driver::next_completion`]
    pub fn issue(&mut self, dispatch: Dispatch) {
        let Dispatch {
            target,
            positions,
            request,
        } = dispatch;

        tracing::trace!(
            service = %target.service,
            device = target.device,
            op = %request.kind(),
            items = positions.len(),
            "issuing catalogue request"
        );

        if !target.is_online() {
            let device = target.device;
            self.inflight.spawn(async move {
                Completion {
                    target,
                    positions,
                    outcome: Err(TargetFailure::Unavailable { device }),
                }
            });
            return;
        }

        let transport = self.transport.clone();
        let timeout = self.timeout;
        self.inflight.spawn(async move {
            let kind = request.kind();
            let items = request.item_count();
            let call = AssertUnwindSafe(tokio::time::timeout(
                timeout,
                transport.execute(&target.service, request),
            ))
            .catch_unwind();

            let outcome = match call.await {
                Ok(Ok(Ok(reply))) if reply.answers(kind, items) => Ok(reply),
                Ok(Ok(Ok(_))) => Err(TargetFailure::Protocol(format!(
                    "{} reply from {} does not match the request",
                    kind, target.service
                ))),
                Ok(Ok(Err(e))) => Err(TargetFailure::Transport(e)),
                Ok(Err(_elapsed)) => Err(TargetFailure::Transport(TransportError::Timeout {
                    service: target.service.clone(),
                })),
                Err(_panic) => Err(TargetFailure::Protocol(format!(
                    "transport panicked talking to {}",
                    target.service
                ))),
            };
            Completion {
                target,
                positions,
                outcome,
            }
        });
    }

    /// Next finished request, `None` once nothing is outstanding
    pub async fn next_completion(&mut self) -> Option<Completion> {
        while let Some(joined) = self.inflight.join_next().await {
            match joined {
                Ok(completion) => return Some(completion),
                Err(e) if e.is_cancelled() => continue,
                Err(e) => tracing::error!(error = %e, "catalogue request task failed"),
            }
        }
        None
    }

    pub fn outstanding(&self) -> usize {
        self.inflight.len()
    }

    /// Abort every outstanding request
    pub fn cancel_all(&mut self) {
        if !self.inflight.is_empty() {
            tracing::debug!(outstanding = self.inflight.len(), "aborting catalogue requests");
        }
        self.inflight.abort_all();
    }
}
