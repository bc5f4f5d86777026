//! Fingerprint -> session id mapping and per-fingerprint leases.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use forge_transfer::Fingerprint;
use rand::Rng;
use tracing::debug;

use crate::SessionStoreError;
use crate::kv::KeyValueStore;

/// Session id length in random bytes (produces 16 hex characters).
const SESSION_ID_BYTES: usize = 8;

/// Key prefix for session records in the key-value store.
const KEY_PREFIX: &str = "upload:";

/// Opaque identifier the remote storage groups chunk uploads under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session id as lowercase hex.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::thread_rng().fill(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps upload fingerprints to session ids in a persisted key-value store.
///
/// Records are created before the first byte of an upload is sent and
/// removed only once the upload completes. There is no expiry: abandoned
/// sessions stay until a later attempt of the same fingerprint completes.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    active: Arc<Mutex<HashSet<Fingerprint>>>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns the session id recorded for `fingerprint`, if any.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<SessionId> {
        self.kv.get(&record_key(fingerprint)).map(SessionId)
    }

    /// Records `session_id` for `fingerprint`, or removes the record on `None`.
    pub fn set(
        &self,
        fingerprint: &Fingerprint,
        session_id: Option<&SessionId>,
    ) -> Result<(), SessionStoreError> {
        self.kv
            .set(&record_key(fingerprint), session_id.map(SessionId::as_str))
    }

    /// Returns the recorded session id, or generates and persists a new one.
    ///
    /// The boolean is `true` when the session already existed.
    pub fn resolve_or_create(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<(SessionId, bool), SessionStoreError> {
        if let Some(existing) = self.get(fingerprint) {
            debug!(%fingerprint, session = %existing, "resuming existing session");
            return Ok((existing, true));
        }
        let created = SessionId::generate();
        self.set(fingerprint, Some(&created))?;
        debug!(%fingerprint, session = %created, "created new session");
        Ok((created, false))
    }

    /// Removes the record for `fingerprint`.
    pub fn clear(&self, fingerprint: &Fingerprint) -> Result<(), SessionStoreError> {
        self.set(fingerprint, None)
    }

    /// Claims the right to run an upload for `fingerprint` in this process.
    ///
    /// Returns `None` while another lease for the same fingerprint is alive.
    /// The claim is released when the returned lease drops. Leases do not
    /// coordinate across processes.
    pub fn lease(&self, fingerprint: &Fingerprint) -> Option<SessionLease> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(fingerprint.clone()) {
            return None;
        }
        Some(SessionLease {
            fingerprint: fingerprint.clone(),
            active: Arc::clone(&self.active),
        })
    }
}

/// In-process claim on a fingerprint; see [`SessionStore::lease`].
pub struct SessionLease {
    fingerprint: Fingerprint,
    active: Arc<Mutex<HashSet<Fingerprint>>>,
}

impl SessionLease {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.fingerprint);
        }
    }
}

fn record_key(fingerprint: &Fingerprint) -> String {
    format!("{KEY_PREFIX}{fingerprint}")
}
