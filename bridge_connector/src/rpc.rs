//! JSON-RPC layer (spec §4.4).
//!
//! Builds and parses JSON-RPC 2.0 requests/responses carried inside the
//! AEAD envelope, allocates ids, and classifies inbound payloads by
//! structural presence of `method` (request) or `result`/`error` (response).

mod params;

use serde::{Deserialize, Serialize};

pub use params::*;

pub const JSON_RPC_VERSION: &str = "2.0";

pub const METHOD_SESSION_REQUEST: &str = "wc_sessionRequest";
pub const METHOD_SESSION_UPDATE: &str = "wc_sessionUpdate";
pub const METHOD_EXCHANGE_KEY: &str = "wc_exchangeKey";

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl Request {
    /// Builds a request, allocating a fresh id via [`payload_id`].
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: payload_id(),
            jsonrpc: JSON_RPC_VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response: either a success carrying `result`, or a
/// failure carrying `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub jsonrpc: String,
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseOutcome {
    Success { result: serde_json::Value },
    Error { error: RpcErrorObject },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl Response {
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.to_owned(),
            outcome: ResponseOutcome::Success { result },
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.to_owned(),
            outcome: ResponseOutcome::Error {
                error: RpcErrorObject {
                    message: message.into(),
                    code: None,
                },
            },
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            ResponseOutcome::Success { result } => Some(result),
            ResponseOutcome::Error { .. } => None,
        }
    }
}

/// An inbound JSON-RPC payload, classified by structural presence of
/// `method` vs. `result`/`error`.
#[derive(Debug, Clone)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("payload is neither a well-formed request nor a response: {0}")]
    Unrecognized(serde_json::Error),
}

/// Classifies a raw inbound JSON payload as a request or a response.
pub fn classify(raw: &str) -> Result<Payload, ClassifyError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(ClassifyError::Unrecognized)?;

    if value.get("method").is_some() {
        serde_json::from_value(value)
            .map(Payload::Request)
            .map_err(ClassifyError::Unrecognized)
    } else {
        serde_json::from_value(value)
            .map(Payload::Response)
            .map_err(ClassifyError::Unrecognized)
    }
}

/// Allocates a JSON-RPC id that is monotonically non-colliding within a
/// session: a millisecond timestamp scaled up, plus a three-digit random
/// entropy suffix (spec §3 invariant 5), matching the reference WalletConnect
/// v1 client's `payloadId()`.
pub fn payload_id() -> u64 {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let entropy = rand::random::<u16>() % 1000;
    millis * 1000 + entropy as u64
}
