//! Catalogue service transport

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use dix_core::{CasReply, CasRequest};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {service} timed out")]
    Timeout { service: String },

    #[error("connection to {service} failed: {message}")]
    Connect { service: String, message: String },

    #[error("{service} answered HTTP {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    #[error("malformed reply from {service}: {message}")]
    Malformed { service: String, message: String },
}

/// Sends catalogue requests to services
///
/// One call is one request to one service. Application errors come back
/// inside the reply; `Err` means the service could not be reached or
/// answered something unusable.
#[async_trait]
pub trait CatalogueTransport: Send + Sync {
    async fn execute(&self, service: &str, request: CasRequest) -> Result<CasReply, TransportError>;
}

/// JSON-over-HTTP transport: `POST {service}/cas`
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> crate::Result<Self> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| crate::DixError::Transport(e.to_string()))?;
        Ok(Self { http })
    }

    fn url(service: &str) -> String {
        format!("{}/cas", service.trim_end_matches('/'))
    }
}

#[async_trait]
impl CatalogueTransport for HttpTransport {
    async fn execute(
        &self,
        service: &str,
        request: CasRequest,
    ) -> Result<CasReply, TransportError> {
        let resp = self
            .http
            .post(Self::url(service))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        service: service.to_string(),
                    }
                } else {
                    TransportError::Connect {
                        service: service.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        if !resp.status().is_success() {
            return Err(TransportError::Status {
                service: service.to_string(),
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        resp.json::<CasReply>()
            .await
            .map_err(|e| TransportError::Malformed {
                service: service.to_string(),
                message: e.to_string(),
            })
    }
}
