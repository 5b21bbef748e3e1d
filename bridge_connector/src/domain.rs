//! Opaque identifier types used as relay topics.
//!
//! `clientId`, `peerId` and `handshakeTopic` are all, per spec, "opaque
//! identifiers, each also functioning as a relay topic" — a single newtype
//! covers all three so they can't be silently swapped with an arbitrary
//! `String` at a call site.

use {
    derive_more::{AsRef, Display, From},
    serde::{Deserialize, Serialize},
    std::sync::Arc,
};

/// A relay topic: a client id, a peer id, or a handshake rendezvous id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, AsRef)]
#[serde(transparent)]
#[as_ref(forward)]
pub struct Topic(Arc<str>);

impl Topic {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}
