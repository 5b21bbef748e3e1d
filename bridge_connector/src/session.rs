//! Session data model (spec §3) and state machine (spec §4.6).

use {
    crate::{domain::Topic, rpc::PeerMeta},
    serde::{Deserialize, Serialize},
};

/// `Fresh → Pending → Connected → Terminated`, derived from the snapshot
/// rather than stored redundantly (spec §3 invariant 1: exactly one of
/// `{fresh, pending, connected}` holds at any time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Fresh,
    Pending,
    Connected,
    Terminated,
}

/// The serializable unit persisted by the session store (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub bridge: String,
    #[serde(with = "hex_key")]
    pub key: Vec<u8>,
    pub client_id: Topic,
    #[serde(default)]
    pub peer_id: Option<Topic>,
    pub client_meta: PeerMeta,
    #[serde(default)]
    pub peer_meta: Option<PeerMeta>,
    #[serde(default)]
    pub handshake_id: Option<u64>,
    pub handshake_topic: Topic,
    #[serde(default)]
    pub chain_id: Option<i64>,
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Set once `killSession`/a rejecting `wc_sessionUpdate` has run; a
    /// terminated snapshot is never persisted (spec §4.6), but the in-memory
    /// copy still needs to record it so `state()` can report `Terminated`
    /// rather than reviving as `Fresh`.
    #[serde(default)]
    pub terminated: bool,
}

impl SessionSnapshot {
    pub fn state(&self) -> SessionState {
        if self.terminated {
            SessionState::Terminated
        } else if self.connected && self.peer_id.is_some() {
            SessionState::Connected
        } else if !self.handshake_topic.is_empty() {
            SessionState::Pending
        } else {
            SessionState::Fresh
        }
    }
}

mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionSnapshot {
        SessionSnapshot {
            connected: false,
            bridge: "https://b.example".into(),
            key: vec![0x11; 32],
            client_id: Topic::new("client-1"),
            peer_id: None,
            client_meta: PeerMeta::default(),
            peer_meta: None,
            handshake_id: Some(1),
            handshake_topic: Topic::new("handshake-1"),
            chain_id: None,
            accounts: vec![],
            terminated: false,
        }
    }

    #[test]
    fn fresh_when_no_handshake_topic() {
        let mut s = sample();
        s.handshake_topic = Topic::new("");
        assert_eq!(s.state(), SessionState::Fresh);
    }

    #[test]
    fn pending_when_handshake_topic_set_and_not_connected() {
        assert_eq!(sample().state(), SessionState::Pending);
    }

    #[test]
    fn connected_when_peer_known_and_connected_flag_set() {
        let mut s = sample();
        s.connected = true;
        s.peer_id = Some(Topic::new("peer-1"));
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[test]
    fn terminated_overrides_everything_else() {
        let mut s = sample();
        s.connected = true;
        s.peer_id = Some(Topic::new("peer-1"));
        s.terminated = true;
        assert_eq!(s.state(), SessionState::Terminated);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = sample();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: SessionSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.bridge, snapshot.bridge);
        assert_eq!(restored.key, snapshot.key);
        assert_eq!(restored.client_id, snapshot.client_id);
        assert_eq!(restored.handshake_topic, snapshot.handshake_topic);
    }

    #[test]
    fn key_is_hex_encoded_on_the_wire() {
        let snapshot = sample();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["key"], "1111111111111111111111111111111111111111111111111111111111111111".chars().take(64).collect::<String>());
    }
}
