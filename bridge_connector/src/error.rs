//! Top-level connector errors.
//!
//! Per spec §7: state-machine preconditions fail fast to the caller,
//! transport-layer JSON errors are fatal to the receive path, rejected
//! sessions are *not* errors, and per-call errors are surfaced only through
//! the response future — there is no centralized error channel beyond this
//! enum.

use crate::{pairing_uri::ParseError, transport::TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Constructor admitted none of `{bridge, uri, session}`.
    #[error("one of bridge, uri or session must be supplied")]
    MissingInitialization,

    /// Malformed handshake URI, or unsupported protocol/version.
    #[error("invalid handshake uri: {0}")]
    InvalidUri(#[from] ParseError),

    /// A state-machine operation was invoked while the session was in the
    /// wrong state for it (e.g. `sendTransaction` while disconnected).
    #[error("precondition violated: {0}")]
    PreconditionViolation(&'static str),

    /// Malformed relay frame or envelope JSON.
    #[error("transport protocol error: {0}")]
    TransportProtocolError(#[from] TransportError),

    /// A response lacked `result` (or carried only `error`).
    #[error("peer returned an rpc error: {0}")]
    RpcError(String),

    /// The injected crypto provider returned `null`/`None` — missing key or
    /// unavailable library.
    #[error("crypto unavailable: no key material for this operation")]
    CryptoUnavailable,

    /// A pending call was never answered within `ClientOptions::call_timeout`.
    #[error("call timed out waiting for a response")]
    Timeout,

    /// The relay socket closed and nothing more can be sent or received.
    #[error("transport is closed")]
    TransportClosed,
}

pub type Result<T, E = ConnectorError> = std::result::Result<T, E>;
