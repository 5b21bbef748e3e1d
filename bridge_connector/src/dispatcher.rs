//! Event dispatcher (spec §4.5).
//!
//! An append-only table of `{event, callback}` entries. Listeners are never
//! removed; duplicate registrations fire multiple times by design, to
//! support both specific-id and method-level observers simultaneously.

use std::sync::{Arc, Mutex};

/// A value delivered to a listener: a request's params, a response's
/// result/error, or a synthetic state-transition payload.
pub type Event = serde_json::Value;

pub type Callback = Arc<dyn Fn(Event) + Send + Sync>;

/// Generic request sink: listeners here fire for any inbound request whose
/// method matched no registered listener.
pub const CALL_REQUEST: &str = "call_request";

/// Builds the dispatch key for a response to request `id`.
pub fn response_key(id: u64) -> String {
    format!("response:{id}")
}

#[derive(Default)]
pub struct Dispatcher {
    listeners: Mutex<Vec<(String, Callback)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `event`. Never replaces or removes prior
    /// registrations for the same event.
    pub fn on(&self, event: impl Into<String>, callback: Callback) {
        self.listeners.lock().expect("dispatcher mutex poisoned").push((event.into(), callback));
    }

    /// Invokes every callback registered for `event`. If none match, falls
    /// back to listeners registered on [`CALL_REQUEST`].
    pub fn emit(&self, event: &str, payload: Event) {
        let listeners = self.listeners.lock().expect("dispatcher mutex poisoned");
        let matching: Vec<&Callback> = listeners
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, cb)| cb)
            .collect();

        if matching.is_empty() {
            for (name, cb) in listeners.iter() {
                if name == CALL_REQUEST {
                    cb(payload.clone());
                }
            }
        } else {
            for cb in matching {
                cb(payload.clone());
            }
        }
    }
}
