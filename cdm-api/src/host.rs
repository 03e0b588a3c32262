use crate::buffer::Buffer;
use crate::file_io::{FileIo, FileIoClient};
use crate::types::{
    Exception, KeyInformation, KeyStatus, MessageType, Status, StreamType, TimerContext,
};
use std::sync::Arc;
use std::time::Duration;

/// Marker for the revision-11 proxy extension. A host that brokers no proxy
/// answers proxy requests with `None`.
pub trait EngineProxy: Send + Sync {}

/// The callback surface the host exposes to the engine.
///
/// One trait covers all three interface revisions: [`EngineHost::on_initialized`]
/// only arrives from revision 10 and later engines, and
/// [`EngineHost::request_proxy`] is only meaningful on revision 11. The
/// engine may call any of these from any of its internal threads, at any
/// time between instantiation and destruction.
pub trait EngineHost: Send + Sync {
    /// Asks the client for a writable buffer of at least `capacity` bytes.
    /// Satisfied synchronously; `None` once the client is detached.
    fn allocate(&self, capacity: usize) -> Option<Box<dyn Buffer>>;

    /// Arranges for [`EngineInstance::timer_expired`](crate::EngineInstance::timer_expired)
    /// to be invoked with `context`, unmodified, no earlier than `delay`
    /// from now. There is no cancellation: pending timers die with the
    /// host.
    fn set_timer(&self, delay: Duration, context: TimerContext);

    /// Wall-clock time in fractional seconds since the Unix epoch.
    fn wall_time(&self) -> f64;

    fn on_resolve_promise(&self, promise_id: u32);

    /// Resolution of a session-creating request, carrying the
    /// engine-assigned session identifier.
    fn on_resolve_new_session_promise(&self, promise_id: u32, session_id: &[u8]);

    fn on_resolve_key_status_promise(&self, promise_id: u32, key_status: KeyStatus);

    fn on_reject_promise(
        &self,
        promise_id: u32,
        exception: Exception,
        system_code: u32,
        message: &str,
    );

    fn on_session_message(&self, session_id: &[u8], message_type: MessageType, message: &[u8]);

    fn on_session_keys_change(
        &self,
        session_id: &[u8],
        has_additional_usable_key: bool,
        keys: &[KeyInformation],
    );

    /// `new_expiry` is wall-clock seconds since the epoch; zero means no
    /// expiry.
    fn on_expiration_change(&self, session_id: &[u8], new_expiry: f64);

    fn on_session_closed(&self, session_id: &[u8]);

    fn send_platform_challenge(&self, service_id: &[u8], challenge: &[u8]);

    fn enable_output_protection(&self, desired_protection_mask: u32);

    /// Answered asynchronously through
    /// [`EngineInstance::on_query_output_protection_status`](crate::EngineInstance::on_query_output_protection_status).
    fn query_output_protection_status(&self);

    fn on_deferred_initialization_done(&self, stream_type: StreamType, status: Status);

    /// Creates a persistent-storage channel for the engine. `None` when the
    /// host forbids persistent state.
    fn create_file_io(&self, client: Arc<dyn FileIoClient>) -> Option<Box<dyn FileIo>>;

    /// Answered asynchronously through
    /// [`EngineInstance::on_storage_id`](crate::EngineInstance::on_storage_id).
    fn request_storage_id(&self, version: u32);

    /// Revision 10+: completion of the asynchronous initialize.
    fn on_initialized(&self, success: bool);

    /// Revision 11 only.
    fn request_proxy(&self) -> Option<Arc<dyn EngineProxy>>;
}
