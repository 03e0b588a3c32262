use cdm_api::{KeyInformation, KeyStatus, SessionType};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Lifecycle of one engine-managed session.
///
/// `Uninitialized` and `Requested` cover the window before the engine has
/// assigned an identifier; from `Active` the session loops on key-status
/// and expiration updates until it is closed or removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Requested,
    Active,
    Closing,
    Closed,
    Removed,
}

impl SessionState {
    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Uninitialized, Requested) => true,
            (Requested, Active) => true,
            // Key-status and expiration updates are a self-loop.
            (Active, Active) => true,
            (Active, Closing) => true,
            // The engine may close a session it was never asked to close.
            (Active, Closed) | (Closing, Closed) => true,
            (Active, Removed) | (Closing, Removed) => true,
            _ => false,
        }
    }
}

pub(crate) struct SessionRecord {
    pub state: SessionState,
    pub session_type: SessionType,
    pub key_statuses: HashMap<Vec<u8>, KeyStatus>,
    /// Wall-clock seconds since the epoch; `None` until the engine reports
    /// one.
    pub expiry: Option<f64>,
}

impl SessionRecord {
    fn new(session_type: SessionType) -> Self {
        Self {
            state: SessionState::Uninitialized,
            session_type,
            key_statuses: HashMap::new(),
            expiry: None,
        }
    }

    /// Applies a transition if the state machine allows it. Invalid
    /// transitions leave the record untouched.
    fn transition(&mut self, next: SessionState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

/// Local session table, keyed by the engine-assigned identifier. The
/// adapter does not own session identity, only this record of it.
pub(crate) struct SessionMap {
    sessions: Mutex<HashMap<Vec<u8>, SessionRecord>>,
    unknown_events: AtomicU64,
}

impl SessionMap {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            unknown_events: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Vec<u8>, SessionRecord>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a `Requested` record ahead of the engine's answer to a load
    /// request, since the identifier is already known.
    pub fn begin_load(&self, session_id: &[u8], session_type: SessionType) {
        let mut sessions = self.lock();
        let record = sessions
            .entry(session_id.to_vec())
            .or_insert_with(|| SessionRecord::new(session_type));
        if !record.transition(SessionState::Requested) {
            log::warn!(
                "load requested for session '{}' in state {:?}",
                String::from_utf8_lossy(session_id),
                record.state
            );
        }
    }

    /// Drops a record that never became active, after its load request was
    /// rejected.
    pub fn abandon(&self, session_id: &[u8]) {
        let mut sessions = self.lock();
        if sessions
            .get(session_id)
            .is_some_and(|record| record.state == SessionState::Requested)
        {
            sessions.remove(session_id);
        }
    }

    /// Marks a session active once the engine has resolved the promise that
    /// created or loaded it, supplying the identifier.
    pub fn activate(&self, session_id: &[u8], session_type: SessionType) {
        let mut sessions = self.lock();
        let record = sessions
            .entry(session_id.to_vec())
            .or_insert_with(|| SessionRecord::new(session_type));
        if record.state == SessionState::Uninitialized {
            record.transition(SessionState::Requested);
        }
        if !record.transition(SessionState::Active) {
            log::warn!(
                "session '{}' resolved again in state {:?}",
                String::from_utf8_lossy(session_id),
                record.state
            );
        }
    }

    pub fn contains(&self, session_id: &[u8]) -> bool {
        self.lock().contains_key(session_id)
    }

    /// `Active -> Closing`, on the host's close request. False when the
    /// session is unknown.
    pub fn mark_closing(&self, session_id: &[u8]) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(session_id) {
            None => false,
            Some(record) => {
                if !record.transition(SessionState::Closing) {
                    log::debug!(
                        "close requested for session '{}' in state {:?}",
                        String::from_utf8_lossy(session_id),
                        record.state
                    );
                }
                true
            }
        }
    }

    /// `-> Closed`, on the engine's session-closed callback. False when the
    /// session is unknown.
    pub fn mark_closed(&self, session_id: &[u8]) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(session_id) {
            None => false,
            Some(record) => {
                if !record.transition(SessionState::Closed) {
                    log::debug!(
                        "closed callback for session '{}' in state {:?}",
                        String::from_utf8_lossy(session_id),
                        record.state
                    );
                }
                true
            }
        }
    }

    /// `-> Removed`, on resolution of a remove request. False when the
    /// session is unknown.
    pub fn mark_removed(&self, session_id: &[u8]) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(session_id) {
            None => false,
            Some(record) => {
                if !record.transition(SessionState::Removed) {
                    log::debug!(
                        "remove resolved for session '{}' in state {:?}",
                        String::from_utf8_lossy(session_id),
                        record.state
                    );
                }
                true
            }
        }
    }

    /// Replaces the key-status table entries named in `keys`. A self-loop:
    /// the logical state does not change. False when the session is
    /// unknown.
    pub fn apply_keys_change(&self, session_id: &[u8], keys: &[KeyInformation]) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(session_id) {
            None => false,
            Some(record) => {
                for key in keys {
                    log::trace!(
                        "session '{}' key {} -> {:?}",
                        String::from_utf8_lossy(session_id),
                        hex::encode(&key.key_id),
                        key.status
                    );
                    record.key_statuses.insert(key.key_id.clone(), key.status);
                }
                record.transition(SessionState::Active);
                true
            }
        }
    }

    /// False when the session is unknown. An expiry of zero clears the
    /// stored value.
    pub fn apply_expiration(&self, session_id: &[u8], new_expiry: f64) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(session_id) {
            None => false,
            Some(record) => {
                record.expiry = (new_expiry != 0.0).then_some(new_expiry);
                record.transition(SessionState::Active);
                true
            }
        }
    }

    pub fn note_unknown(&self) {
        self.unknown_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_events(&self) -> u64 {
        self.unknown_events.load(Ordering::Relaxed)
    }

    pub fn state(&self, session_id: &[u8]) -> Option<SessionState> {
        self.lock().get(session_id).map(|record| record.state)
    }

    pub fn key_status(&self, session_id: &[u8], key_id: &[u8]) -> Option<KeyStatus> {
        self.lock()
            .get(session_id)
            .and_then(|record| record.key_statuses.get(key_id).copied())
    }

    pub fn expiry(&self, session_id: &[u8]) -> Option<f64> {
        self.lock().get(session_id).and_then(|record| record.expiry)
    }

    pub fn session_type(&self, session_id: &[u8]) -> Option<SessionType> {
        self.lock()
            .get(session_id)
            .map(|record| record.session_type)
    }
}
