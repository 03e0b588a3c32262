use cdm_api::Buffer;
use std::sync::{Arc, Mutex, PoisonError};

/// Events the adapter delivers to its client. Each arrives with the opaque
/// session identifier it concerns (possibly empty), payload bytes and a
/// 32-bit status code whose meaning depends on the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// A rejected request. Payload is the engine's message, status the
    /// numeric system code.
    Error,
    /// Payload is the message body, status the message type tag.
    SessionMessage,
    SessionExpired,
    /// Status is 1 when an additional key became usable.
    SessionKeysChange,
    SessionClosed,
    LegacySessionError,
}

/// The single client registered with an adapter. Callbacks may arrive from
/// any thread, but never two at a time.
pub trait AdapterClient: Send + Sync {
    fn on_event(&self, session_id: &[u8], event: ClientEvent, payload: &[u8], status: u32);

    /// Log channel mirroring the adapter's own logging, for embedders that
    /// route diagnostics elsewhere.
    fn log(&self, line: &str);

    /// Allocates a writable buffer for the engine. Must be satisfied
    /// synchronously.
    fn allocate_buffer(&self, capacity: usize) -> Box<dyn Buffer>;
}

/// Serializes everything destined for the client behind one lock, since
/// engine callbacks arrive on decode, timer and I/O threads while the
/// client is assumed not reentrant-safe. The lock is held for the duration
/// of the client call and never across an engine call. Once detached,
/// events are dropped silently.
pub(crate) struct ClientDispatcher {
    client: Mutex<Option<Arc<dyn AdapterClient>>>,
}

impl ClientDispatcher {
    pub fn new(client: Arc<dyn AdapterClient>) -> Self {
        Self {
            client: Mutex::new(Some(client)),
        }
    }

    pub fn detach(&self) {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn notify(&self, session_id: &[u8], event: ClientEvent, payload: &[u8], status: u32) {
        let guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            client.on_event(session_id, event, payload, status);
        }
    }

    pub fn log(&self, line: &str) {
        let guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            client.log(line);
        }
    }

    pub fn allocate(&self, capacity: usize) -> Option<Box<dyn Buffer>> {
        let guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|client| client.allocate_buffer(capacity))
    }
}
