use cdm_api::SessionType;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// Correlation token pairing an asynchronous request with its eventual
/// resolve or reject callback. Opaque to the adapter; forwarded verbatim.
pub type PromiseId = u32;

/// The request that issued an outstanding promise id, so its resolution can
/// drive the session state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PromiseOp {
    ServerCertificate,
    NewSession {
        session_type: SessionType,
    },
    LoadSession {
        session_id: Vec<u8>,
        session_type: SessionType,
    },
    UpdateSession {
        session_id: Vec<u8>,
    },
    CloseSession {
        session_id: Vec<u8>,
    },
    RemoveSession {
        session_id: Vec<u8>,
    },
}

impl PromiseOp {
    /// The session this request referenced, when it referenced one.
    pub fn session_id(&self) -> Option<&[u8]> {
        match self {
            PromiseOp::ServerCertificate | PromiseOp::NewSession { .. } => None,
            PromiseOp::LoadSession { session_id, .. }
            | PromiseOp::UpdateSession { session_id }
            | PromiseOp::CloseSession { session_id }
            | PromiseOp::RemoveSession { session_id } => Some(session_id),
        }
    }
}

/// Tracks outstanding promise ids. Ids are caller-supplied; two
/// concurrently outstanding requests must not share one, and the registry
/// refuses the second rather than corrupting the first. `next_id` mints
/// monotonically increasing ids for callers that want the adapter to do it.
pub(crate) struct PromiseRegistry {
    next_id: AtomicU32,
    outstanding: Mutex<HashMap<PromiseId, PromiseOp>>,
}

impl PromiseRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    /// Unique and increasing for the lifetime of the adapter instance.
    pub fn next_id(&self) -> PromiseId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Records an issued request. Returns false, recording nothing, if
    /// the id is already outstanding, which is a caller error.
    pub fn register(&self, promise_id: PromiseId, op: PromiseOp) -> bool {
        let mut outstanding = self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if outstanding.contains_key(&promise_id) {
            log::warn!("promise id {promise_id} is already outstanding, request refused");
            return false;
        }
        outstanding.insert(promise_id, op);
        true
    }

    /// Completes a promise (resolve or reject, whichever arrives first) and
    /// returns the request that issued it. `None` for ids that were never
    /// registered or were already completed.
    pub fn complete(&self, promise_id: PromiseId) -> Option<PromiseOp> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&promise_id)
    }

    pub fn outstanding_len(&self) -> usize {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_increasing() {
        let registry = PromiseRegistry::new();
        let first = registry.next_id();
        let second = registry.next_id();
        let third = registry.next_id();
        assert!(first < second && second < third);
    }

    #[test]
    fn duplicate_outstanding_id_is_refused() {
        let registry = PromiseRegistry::new();
        assert!(registry.register(7, PromiseOp::ServerCertificate));
        assert!(!registry.register(
            7,
            PromiseOp::NewSession {
                session_type: SessionType::Temporary
            }
        ));

        // The original registration survives.
        assert_eq!(registry.complete(7), Some(PromiseOp::ServerCertificate));
    }

    #[test]
    fn completion_is_exactly_once() {
        let registry = PromiseRegistry::new();
        registry.register(
            1,
            PromiseOp::CloseSession {
                session_id: b"sess".to_vec(),
            },
        );
        assert!(registry.complete(1).is_some());
        assert!(registry.complete(1).is_none());
        assert_eq!(registry.outstanding_len(), 0);
    }

    #[test]
    fn id_is_reusable_after_completion() {
        let registry = PromiseRegistry::new();
        assert!(registry.register(3, PromiseOp::ServerCertificate));
        registry.complete(3);
        assert!(registry.register(3, PromiseOp::ServerCertificate));
    }
}
