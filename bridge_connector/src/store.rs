//! Session store adapter (spec §4.8).
//!
//! A process-wide optional key/value mapping with a single slot holding the
//! serialized snapshot — not a store keyed per session, since the
//! connector only ever owns one session at a time and the constructor must
//! be able to pick a session up from storage *before* any `clientId` is
//! known (spec §6: "a `session` may also be implicitly picked up from
//! storage"). The connector never holds the store open across calls: it
//! loads once in the constructor and saves after every state transition
//! that changes the persisted snapshot, erasing on `killSession` or a
//! rejecting `wc_sessionUpdate`.
//!
//! `load()` validating "must contain a `bridge` field" (spec §4.8) is the
//! store implementation's concern, not this trait's: a [`SessionStore`] that
//! deserializes from an external format should reject structurally invalid
//! data by returning `None` rather than panicking.

use crate::session::SessionSnapshot;

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<SessionSnapshot>;
    fn save(&self, snapshot: &SessionSnapshot);
    fn erase(&self);
}

/// Default in-process store. Not durable across process restarts; callers
/// needing persistence across restarts provide their own [`SessionStore`]
/// (spec §6: the persistent storage mechanism is out of scope for the
/// connector itself).
#[derive(Default)]
pub struct InMemorySessionStore {
    slot: std::sync::Mutex<Option<SessionSnapshot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self) -> Option<SessionSnapshot> {
        self.slot.lock().expect("session store mutex poisoned").clone()
    }

    fn save(&self, snapshot: &SessionSnapshot) {
        *self.slot.lock().expect("session store mutex poisoned") = Some(snapshot.clone());
    }

    fn erase(&self) {
        *self.slot.lock().expect("session store mutex poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::domain::Topic};

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            connected: false,
            bridge: "https://b.example".into(),
            key: vec![0xaa; 32],
            client_id: Topic::new("client-1"),
            peer_id: None,
            client_meta: Default::default(),
            peer_meta: None,
            handshake_id: None,
            handshake_topic: Topic::new("h1"),
            chain_id: None,
            accounts: vec![],
            terminated: false,
        }
    }

    #[test]
    fn load_of_empty_slot_is_none() {
        let store = InMemorySessionStore::new();
        assert!(store.load().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = InMemorySessionStore::new();
        store.save(&snapshot());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.bridge, "https://b.example");
    }

    #[test]
    fn erase_clears_the_slot() {
        let store = InMemorySessionStore::new();
        store.save(&snapshot());
        store.erase();

        assert!(store.load().is_none());
    }

    #[test]
    fn save_overwrites_the_previous_occupant() {
        let store = InMemorySessionStore::new();
        store.save(&snapshot());
        let mut second = snapshot();
        second.bridge = "https://other.example".into();
        store.save(&second);

        assert_eq!(store.load().unwrap().bridge, "https://other.example");
    }
}
