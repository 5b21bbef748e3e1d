//! Key manager — two-phase swap (spec §4.7).
//!
//! Only one key exchange may be in flight at a time (spec §3 invariant 6):
//! staging a `next_key` while one is already staged is rejected rather than
//! silently overwritten, which spec §9 flags as unspecified behavior in the
//! reference implementation.

use crate::crypto::payload::SymKey;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("a key exchange is already in flight")]
pub struct ExchangeInFlight;

#[derive(Debug, Clone)]
pub struct KeyManager {
    key: Option<SymKey>,
    next_key: Option<SymKey>,
}

impl KeyManager {
    pub fn new(key: Option<SymKey>) -> Self {
        Self { key, next_key: None }
    }

    pub fn key(&self) -> Option<&SymKey> {
        self.key.as_ref()
    }

    pub fn has_pending_swap(&self) -> bool {
        self.next_key.is_some()
    }

    pub fn set_key(&mut self, key: SymKey) {
        self.key = Some(key);
    }

    /// Stages `next_key` as the successor key. Fails if a swap is already
    /// in flight.
    pub fn stage_next_key(&mut self, next_key: SymKey) -> Result<(), ExchangeInFlight> {
        if self.next_key.is_some() {
            return Err(ExchangeInFlight);
        }
        self.next_key = Some(next_key);
        Ok(())
    }

    /// Performs the swap: `key := next_key; next_key := None`. A no-op
    /// (returns `false`) if nothing was staged.
    pub fn complete_swap(&mut self) -> bool {
        match self.next_key.take() {
            Some(next) => {
                self.key = Some(next);
                true
            }
            None => false,
        }
    }
}
