//! Remote sync transport collaborator.
//!
//! The transport only moves bytes. Timeouts, retries and attempt accounting
//! belong to the engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub endpoint: String,
    /// Stable across retries so the server can de-duplicate
    pub idempotency_key: String,
    /// JSON body
    pub body: Vec<u8>,
}

/// Success/failure envelope returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl TransportResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("server rejected request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError>;
}

pub type SharedTransport = Arc<dyn SyncTransport>;
