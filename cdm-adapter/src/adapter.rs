use crate::client::{AdapterClient, ClientDispatcher, ClientEvent};
use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::file_io::FileIoBridge;
use crate::loader::{self, EngineHandle, NativeEngineModule};
use crate::promise::{PromiseId, PromiseOp, PromiseRegistry};
use crate::session::{SessionMap, SessionState};
use crate::timer::TimerScheduler;
use cdm_api::{
    ApiRevision, AudioDecoderConfig, AudioFrames, Buffer, DecryptedBlock, EngineHost,
    EngineInstance, EngineModule, EngineProxy, Exception, FileIo, FileIoClient, InitDataType,
    InputBuffer, KeyInformation, KeyStatus, MessageType, PlatformChallengeResponse, QueryResult,
    SessionType, Status, StreamType, TimerContext, VideoDecoderConfig, VideoFrame,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

/// Immutable permissions snapshot handed to the engine at initialization.
#[derive(Clone, Copy, Debug, Default)]
pub struct CdmConfig {
    pub allow_distinctive_identifier: bool,
    pub allow_persistent_state: bool,
    pub use_hw_secure_codecs: bool,
}

/// Everything an adapter needs at construction. Immutable thereafter.
pub struct AdapterOptions {
    /// Key-system identifier, e.g. "com.widevine.alpha".
    pub key_system: String,
    /// Shared library to load the engine from.
    pub module_path: PathBuf,
    /// Root under which the engine's per-session blobs are stored.
    pub base_storage_path: PathBuf,
    pub config: CdmConfig,
    pub clock: Arc<dyn Clock>,
}

impl AdapterOptions {
    pub fn new(
        key_system: impl Into<String>,
        module_path: impl Into<PathBuf>,
        base_storage_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            key_system: key_system.into(),
            module_path: module_path.into(),
            base_storage_path: base_storage_path.into(),
            config: CdmConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Mediator between the media pipeline and a loaded content-protection
/// engine.
///
/// All request methods are fire-and-forget: they forward to the engine and
/// return immediately, and the outcome arrives later through the registered
/// [`AdapterClient`] or the session queries. The decrypt/decode family is
/// the exception: those calls are synchronous and mutually exclusive with
/// each other, because the engine's decrypt path is not reentrant.
///
/// Dropping the adapter detaches the client first (further events are
/// dropped), discards pending timers, then instructs the engine to release
/// itself before the module is unloaded.
pub struct CdmAdapter {
    core: Arc<AdapterCore>,
}

impl CdmAdapter {
    /// Loads the engine module from `options.module_path` and negotiates an
    /// interface revision.
    pub fn new(options: AdapterOptions, client: Arc<dyn AdapterClient>) -> Result<Self, Error> {
        let module = Arc::new(NativeEngineModule::load(&options.module_path)?);
        Self::with_module(options, module, client)
    }

    /// Like [`CdmAdapter::new`] but with an already-obtained module. This
    /// is also the seam test doubles come through.
    pub fn with_module(
        options: AdapterOptions,
        module: Arc<dyn EngineModule>,
        client: Arc<dyn AdapterClient>,
    ) -> Result<Self, Error> {
        let core = Arc::new_cyclic(|weak| AdapterCore {
            weak_self: weak.clone(),
            config: options.config,
            base_path: options.base_storage_path,
            clock: options.clock,
            client: ClientDispatcher::new(client),
            promises: PromiseRegistry::new(),
            sessions: SessionMap::new(),
            timers: TimerScheduler::new(),
            decrypt_lock: Mutex::new(()),
            engine: RwLock::new(None),
            initialized: AtomicBool::new(false),
            output_protection_mask: AtomicU32::new(0),
        });

        let host: Arc<dyn EngineHost> = Arc::new(HostHandle {
            core: Arc::downgrade(&core),
        });
        let handle = loader::negotiate(module, &options.key_system, host)?;

        core.engine
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        core.with_engine(|engine, _| {
            engine.initialize(
                core.config.allow_distinctive_identifier,
                core.config.allow_persistent_state,
                core.config.use_hw_secure_codecs,
            )
        });

        Ok(Self { core })
    }

    /// Whether an engine is attached. Always true between a successful
    /// construction and teardown.
    pub fn valid(&self) -> bool {
        self.core
            .engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The interface revision the engine accepted.
    pub fn revision(&self) -> Option<ApiRevision> {
        self.core.with_engine(|_, revision| revision)
    }

    /// Whether the engine reported initialization complete. Revision 9
    /// engines initialize synchronously and never report.
    pub fn is_initialized(&self) -> bool {
        self.core.initialized.load(Ordering::Acquire)
    }

    /// Detaches the client. Subsequent events are dropped silently.
    pub fn remove_client(&self) {
        self.core.client.detach();
    }

    /// Mints a fresh promise id, unique and increasing for this adapter's
    /// lifetime. Callers may equally bring their own ids.
    pub fn next_promise_id(&self) -> PromiseId {
        self.core.promises.next_id()
    }

    pub fn set_server_certificate(&self, promise_id: PromiseId, certificate: &[u8]) {
        self.core
            .issue(promise_id, PromiseOp::ServerCertificate, |engine| {
                engine.set_server_certificate(promise_id, certificate)
            });
    }

    pub fn create_session_and_generate_request(
        &self,
        promise_id: PromiseId,
        session_type: SessionType,
        init_data_type: InitDataType,
        init_data: &[u8],
    ) {
        self.core
            .issue(promise_id, PromiseOp::NewSession { session_type }, |engine| {
                engine.create_session_and_generate_request(
                    promise_id,
                    session_type,
                    init_data_type,
                    init_data,
                )
            });
    }

    pub fn load_session(
        &self,
        promise_id: PromiseId,
        session_type: SessionType,
        session_id: &[u8],
    ) {
        self.core.sessions.begin_load(session_id, session_type);
        self.core.issue(
            promise_id,
            PromiseOp::LoadSession {
                session_id: session_id.to_vec(),
                session_type,
            },
            |engine| engine.load_session(promise_id, session_type, session_id),
        );
    }

    pub fn update_session(&self, promise_id: PromiseId, session_id: &[u8], response: &[u8]) {
        self.core.issue(
            promise_id,
            PromiseOp::UpdateSession {
                session_id: session_id.to_vec(),
            },
            |engine| engine.update_session(promise_id, session_id, response),
        );
    }

    pub fn close_session(&self, promise_id: PromiseId, session_id: &[u8]) {
        if !self.core.sessions.mark_closing(session_id) {
            log::debug!(
                "close requested for session '{}' this adapter does not know",
                String::from_utf8_lossy(session_id)
            );
        }
        self.core.issue(
            promise_id,
            PromiseOp::CloseSession {
                session_id: session_id.to_vec(),
            },
            |engine| engine.close_session(promise_id, session_id),
        );
    }

    pub fn remove_session(&self, promise_id: PromiseId, session_id: &[u8]) {
        self.core.issue(
            promise_id,
            PromiseOp::RemoveSession {
                session_id: session_id.to_vec(),
            },
            |engine| engine.remove_session(promise_id, session_id),
        );
    }

    /// Decrypts one buffer. Mutually exclusive with every other
    /// decrypt/decode entry point; concurrent callers block until the
    /// in-flight call completes. The status comes from the engine
    /// unmodified.
    pub fn decrypt(&self, encrypted: &InputBuffer<'_>, decrypted: &mut DecryptedBlock) -> Status {
        self.core
            .decrypt_call(|engine| engine.decrypt(encrypted, decrypted))
    }

    pub fn decrypt_and_decode_frame(
        &self,
        encrypted: &InputBuffer<'_>,
        frame: &mut VideoFrame,
    ) -> Status {
        self.core
            .decrypt_call(|engine| engine.decrypt_and_decode_frame(encrypted, frame))
    }

    pub fn decrypt_and_decode_samples(
        &self,
        encrypted: &InputBuffer<'_>,
        frames: &mut AudioFrames,
    ) -> Status {
        self.core
            .decrypt_call(|engine| engine.decrypt_and_decode_samples(encrypted, frames))
    }

    pub fn initialize_audio_decoder(&self, config: &AudioDecoderConfig) -> Status {
        self.core
            .decrypt_call(|engine| engine.initialize_audio_decoder(config))
    }

    pub fn initialize_video_decoder(&self, config: &VideoDecoderConfig) -> Status {
        self.core
            .decrypt_call(|engine| engine.initialize_video_decoder(config))
    }

    pub fn deinitialize_decoder(&self, stream_type: StreamType) {
        let _serial = self.core.lock_decrypt();
        self.core
            .with_engine(|engine, _| engine.deinitialize_decoder(stream_type));
    }

    pub fn reset_decoder(&self, stream_type: StreamType) {
        let _serial = self.core.lock_decrypt();
        self.core
            .with_engine(|engine, _| engine.reset_decoder(stream_type));
    }

    /// Delivers the platform's answer to an earlier platform challenge.
    pub fn on_platform_challenge_response(&self, response: &PlatformChallengeResponse) {
        self.core
            .with_engine(|engine, _| engine.on_platform_challenge_response(response));
    }

    /// Delivers the platform's answer to an output-protection query, for
    /// embedders that have a real answer. Without one, the adapter already
    /// responds on its own with "no outputs, query succeeded".
    pub fn on_query_output_protection_status(
        &self,
        result: QueryResult,
        link_mask: u32,
        output_protection_mask: u32,
    ) {
        self.core.with_engine(|engine, _| {
            engine.on_query_output_protection_status(result, link_mask, output_protection_mask)
        });
    }

    /// The protection mask the engine last asked for via
    /// `enable_output_protection`.
    pub fn desired_output_protection(&self) -> u32 {
        self.core.output_protection_mask.load(Ordering::Relaxed)
    }

    pub fn session_state(&self, session_id: &[u8]) -> Option<SessionState> {
        self.core.sessions.state(session_id)
    }

    pub fn session_type(&self, session_id: &[u8]) -> Option<SessionType> {
        self.core.sessions.session_type(session_id)
    }

    pub fn session_expiry(&self, session_id: &[u8]) -> Option<f64> {
        self.core.sessions.expiry(session_id)
    }

    pub fn key_status(&self, session_id: &[u8], key_id: &[u8]) -> Option<KeyStatus> {
        self.core.sessions.key_status(session_id, key_id)
    }

    /// Number of engine callbacks that referenced a session this adapter
    /// never created or loaded. Such callbacks are logged and dropped.
    pub fn unknown_session_events(&self) -> u64 {
        self.core.sessions.unknown_events()
    }

    /// Requests whose resolve/reject has not arrived yet.
    pub fn outstanding_promises(&self) -> usize {
        self.core.promises.outstanding_len()
    }
}

impl Drop for CdmAdapter {
    fn drop(&mut self) {
        self.core.teardown();
    }
}

struct AdapterCore {
    weak_self: Weak<AdapterCore>,
    config: CdmConfig,
    base_path: PathBuf,
    clock: Arc<dyn Clock>,
    client: ClientDispatcher,
    promises: PromiseRegistry,
    sessions: SessionMap,
    timers: TimerScheduler,
    /// Decrypt/decode exclusion domain: at most one call inside the
    /// engine's decrypt surface at a time.
    decrypt_lock: Mutex<()>,
    engine: RwLock<Option<EngineHandle>>,
    initialized: AtomicBool,
    output_protection_mask: AtomicU32,
}

impl AdapterCore {
    fn with_engine<R>(&self, call: impl FnOnce(&dyn EngineInstance, ApiRevision) -> R) -> Option<R> {
        let guard = self.engine.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map(|handle| call(handle.instance.as_ref(), handle.revision))
    }

    fn lock_decrypt(&self) -> MutexGuard<'_, ()> {
        self.decrypt_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn decrypt_call(&self, call: impl FnOnce(&dyn EngineInstance) -> Status) -> Status {
        let _serial = self.lock_decrypt();
        self.with_engine(|engine, _| call(engine))
            .unwrap_or(Status::InitializationError)
    }

    /// Registers a promise and forwards the request. If the engine is
    /// already detached the promise is completed locally so the id does not
    /// leak.
    fn issue(&self, promise_id: PromiseId, op: PromiseOp, call: impl FnOnce(&dyn EngineInstance)) {
        if !self.promises.register(promise_id, op) {
            return;
        }
        if self.with_engine(|engine, _| call(engine)).is_none() {
            self.promises.complete(promise_id);
            log::warn!("request {promise_id} dropped: engine detached");
        }
    }

    fn schedule_timer(&self, delay: Duration, context: TimerContext) {
        let weak = self.weak_self.clone();
        self.timers.schedule(
            delay,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.with_engine(|engine, _| engine.timer_expired(context));
                }
            }),
        );
    }

    /// Runs an engine-bound response on the timer thread. Used for host
    /// requests the engine issues from inside one of its own calls, so the
    /// answer does not re-enter the engine on the callback thread.
    fn defer_engine_call(&self, call: impl FnOnce(&dyn EngineInstance) + Send + 'static) {
        let weak = self.weak_self.clone();
        self.timers.schedule(
            Duration::ZERO,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.with_engine(|engine, _| call(engine));
                }
            }),
        );
    }

    fn note_unknown_session(&self, session_id: &[u8]) {
        self.sessions.note_unknown();
        let err = Error::UnknownSession(String::from_utf8_lossy(session_id).into_owned());
        log::warn!("{err}");
        self.client.log(&err.to_string());
    }

    fn handle_resolve(&self, promise_id: PromiseId) {
        match self.promises.complete(promise_id) {
            None => log::warn!("resolve for unknown promise {promise_id}"),
            Some(PromiseOp::RemoveSession { session_id }) => {
                if !self.sessions.mark_removed(&session_id) {
                    self.note_unknown_session(&session_id);
                }
            }
            // Close completes on the session-closed callback; the others
            // have no session transition attached.
            Some(_) => {}
        }
    }

    fn handle_resolve_new_session(&self, promise_id: PromiseId, session_id: &[u8]) {
        match self.promises.complete(promise_id) {
            None => log::warn!("new-session resolve for unknown promise {promise_id}"),
            Some(PromiseOp::NewSession { session_type }) => {
                self.sessions.activate(session_id, session_type);
            }
            Some(PromiseOp::LoadSession {
                session_id: requested,
                session_type,
            }) => {
                // The engine's answer is authoritative if it differs from
                // the id the load asked for.
                if requested != session_id {
                    log::debug!(
                        "load of session '{}' resolved as '{}'",
                        String::from_utf8_lossy(&requested),
                        String::from_utf8_lossy(session_id)
                    );
                    self.sessions.abandon(&requested);
                }
                self.sessions.activate(session_id, session_type);
            }
            Some(op) => {
                log::warn!("new-session resolve for mismatched request {op:?}");
            }
        }
    }

    fn handle_reject(
        &self,
        promise_id: PromiseId,
        exception: Exception,
        system_code: u32,
        message: &str,
    ) {
        let Some(op) = self.promises.complete(promise_id) else {
            log::warn!("reject for unknown promise {promise_id}");
            return;
        };
        if let PromiseOp::LoadSession { session_id, .. } = &op {
            self.sessions.abandon(session_id);
        }

        let session_id = op.session_id().unwrap_or_default();
        let line = format!(
            "engine rejected request {promise_id}: {exception:?} (system code {system_code}): {message}"
        );
        log::debug!("{line}");
        self.client.log(&line);
        self.client
            .notify(session_id, ClientEvent::Error, message.as_bytes(), system_code);
    }

    fn teardown(&self) {
        // Order matters: no client callbacks once teardown begins, no timer
        // may fire into a half-destroyed adapter, and the engine releases
        // itself before its module goes away.
        self.client.detach();
        self.timers.shutdown();
        let handle = self
            .engine
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.instance.destroy();
        }
    }
}

/// The host handle given to the engine. Holds only a weak back-reference:
/// callbacks arriving during or after teardown observe a detached adapter
/// and no-op instead of touching freed state.
struct HostHandle {
    core: Weak<AdapterCore>,
}

impl HostHandle {
    fn core(&self) -> Option<Arc<AdapterCore>> {
        self.core.upgrade()
    }
}

impl EngineHost for HostHandle {
    fn allocate(&self, capacity: usize) -> Option<Box<dyn Buffer>> {
        self.core()?.client.allocate(capacity)
    }

    fn set_timer(&self, delay: Duration, context: TimerContext) {
        if let Some(core) = self.core() {
            core.schedule_timer(delay, context);
        }
    }

    fn wall_time(&self) -> f64 {
        self.core().map(|core| core.clock.wall_time()).unwrap_or(0.0)
    }

    fn on_resolve_promise(&self, promise_id: u32) {
        if let Some(core) = self.core() {
            core.handle_resolve(promise_id);
        }
    }

    fn on_resolve_new_session_promise(&self, promise_id: u32, session_id: &[u8]) {
        if let Some(core) = self.core() {
            core.handle_resolve_new_session(promise_id, session_id);
        }
    }

    fn on_resolve_key_status_promise(&self, promise_id: u32, key_status: KeyStatus) {
        if let Some(core) = self.core() {
            log::trace!("key-status promise {promise_id} resolved as {key_status:?}");
            core.handle_resolve(promise_id);
        }
    }

    fn on_reject_promise(
        &self,
        promise_id: u32,
        exception: Exception,
        system_code: u32,
        message: &str,
    ) {
        if let Some(core) = self.core() {
            core.handle_reject(promise_id, exception, system_code, message);
        }
    }

    fn on_session_message(&self, session_id: &[u8], message_type: MessageType, message: &[u8]) {
        let Some(core) = self.core() else { return };
        if !core.sessions.contains(session_id) {
            core.note_unknown_session(session_id);
            return;
        }
        core.client.notify(
            session_id,
            ClientEvent::SessionMessage,
            message,
            message_type as u32,
        );
    }

    fn on_session_keys_change(
        &self,
        session_id: &[u8],
        has_additional_usable_key: bool,
        keys: &[KeyInformation],
    ) {
        let Some(core) = self.core() else { return };
        if !core.sessions.apply_keys_change(session_id, keys) {
            core.note_unknown_session(session_id);
            return;
        }
        core.client.notify(
            session_id,
            ClientEvent::SessionKeysChange,
            &[],
            has_additional_usable_key as u32,
        );
    }

    fn on_expiration_change(&self, session_id: &[u8], new_expiry: f64) {
        let Some(core) = self.core() else { return };
        if !core.sessions.apply_expiration(session_id, new_expiry) {
            core.note_unknown_session(session_id);
            return;
        }
        core.client
            .notify(session_id, ClientEvent::SessionExpired, &[], 0);
    }

    fn on_session_closed(&self, session_id: &[u8]) {
        let Some(core) = self.core() else { return };
        if !core.sessions.mark_closed(session_id) {
            core.note_unknown_session(session_id);
            return;
        }
        core.client
            .notify(session_id, ClientEvent::SessionClosed, &[], 0);
    }

    fn send_platform_challenge(&self, service_id: &[u8], challenge: &[u8]) {
        // No platform to forward to. The embedder can answer through
        // CdmAdapter::on_platform_challenge_response if it has one.
        if let Some(core) = self.core() {
            log::debug!(
                "engine sent platform challenge for service '{}' ({} bytes), no platform attached",
                String::from_utf8_lossy(service_id),
                challenge.len()
            );
            core.client.log("platform challenge ignored: no platform attached");
        }
    }

    fn enable_output_protection(&self, desired_protection_mask: u32) {
        if let Some(core) = self.core() {
            core.output_protection_mask
                .store(desired_protection_mask, Ordering::Relaxed);
            log::debug!("engine requested output protection mask {desired_protection_mask:#x}");
        }
    }

    fn query_output_protection_status(&self) {
        // Answered off the callback thread: the engine issues this from
        // inside one of its own calls. No protected outputs exist here, so
        // the query succeeds with empty masks.
        if let Some(core) = self.core() {
            core.defer_engine_call(|engine| {
                engine.on_query_output_protection_status(QueryResult::Succeeded, 0, 0)
            });
        }
    }

    fn on_deferred_initialization_done(&self, stream_type: StreamType, status: Status) {
        log::debug!("deferred {stream_type:?} decoder initialization finished: {status:?}");
    }

    fn create_file_io(&self, client: Arc<dyn FileIoClient>) -> Option<Box<dyn FileIo>> {
        let core = self.core()?;
        if !core.config.allow_persistent_state {
            log::warn!("engine requested file I/O but persistent state is not permitted");
            return None;
        }
        Some(Box::new(FileIoBridge::new(core.base_path.clone(), client)))
    }

    fn request_storage_id(&self, version: u32) {
        // No platform storage-id source; answer with an empty id.
        if let Some(core) = self.core() {
            core.defer_engine_call(move |engine| engine.on_storage_id(version, &[]));
        }
    }

    fn on_initialized(&self, success: bool) {
        if let Some(core) = self.core() {
            core.initialized.store(success, Ordering::Release);
            if !success {
                log::error!("engine reported failed initialization");
                core.client.log("engine reported failed initialization");
            }
        }
    }

    fn request_proxy(&self) -> Option<Arc<dyn EngineProxy>> {
        if let Some(core) = self.core() {
            let revision = core.with_engine(|_, revision| revision);
            if revision != Some(ApiRevision::V11) {
                log::warn!("proxy request from a revision {revision:?} engine");
            } else {
                log::debug!("proxy request refused: this adapter brokers no proxy");
            }
        }
        None
    }
}
