//! Client-side connector for a relay-mediated, end-to-end encrypted
//! JSON-RPC session between a dApp and a remote wallet.
//!
//! Two peers that never directly connect rendezvous through an untrusted
//! message relay ("bridge") identified by a URL. They share a symmetric key
//! out-of-band via a [`pairing_uri::HandshakeUri`], derive per-peer relay
//! topics, exchange a session handshake, and then tunnel arbitrary
//! JSON-RPC 2.0 calls over the relay under an AEAD envelope. [`Client`]
//! additionally supports forward-secrecy key rotation mid-session and
//! durable session resumption across process restarts via an injected
//! [`store::SessionStore`].
//!
//! The cryptographic primitives, the relay server, persistent storage, and
//! the wallet-side approval policy are all external collaborators, admitted
//! through the [`crypto::CryptoProvider`] and [`store::SessionStore`]
//! traits and the [`client::ClientOptions`] constructor.

pub mod client;
pub mod crypto;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod key_manager;
pub mod pairing_uri;
pub mod rpc;
pub mod session;
pub mod store;
pub mod transport;

pub use {
    client::{Client, ClientOptions},
    crypto::{AeadCryptoProvider, CryptoProvider, Envelope},
    domain::Topic,
    error::{ConnectorError, Result},
    pairing_uri::HandshakeUri,
    session::{SessionSnapshot, SessionState},
    store::{InMemorySessionStore, SessionStore},
};
