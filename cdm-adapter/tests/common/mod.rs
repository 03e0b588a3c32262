#![allow(dead_code)]

use cdm_adapter::api::{
    ApiRevision, AudioDecoderConfig, AudioFrames, Buffer, DecryptedBlock, EngineHost,
    EngineInstance, EngineModule, Exception, HeapBuffer, InitDataType, InputBuffer,
    KeyInformation, KeyStatus, MessageType, PlatformChallengeResponse, QueryResult, SessionType,
    Status, StreamType, TimerContext, VideoDecoderConfig, VideoFrame,
};
use cdm_adapter::{AdapterClient, AdapterOptions, CdmAdapter, Clock, ClientEvent};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub static STORAGE_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../target/cdm-adapter-tests")
});

/// Everything the fake engine observes, shared with the test so it can be
/// inspected after (or during) adapter calls.
#[derive(Default)]
pub struct FakeState {
    pub host: Mutex<Option<Arc<dyn EngineHost>>>,
    pub initialized_with: Mutex<Option<(bool, bool, bool)>>,
    pub next_session: AtomicU32,
    pub create_calls: AtomicU32,
    pub reject_create: AtomicBool,
    /// When set, session requests are swallowed: no resolve, no reject.
    pub defer_promises: AtomicBool,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
    pub timer_expirations: Mutex<Vec<(TimerContext, Instant)>>,
    pub output_protection_results: Mutex<Vec<(QueryResult, u32, u32)>>,
    pub storage_ids: Mutex<Vec<(u32, Vec<u8>)>>,
    pub destroyed: AtomicBool,
}

impl FakeState {
    /// The host handle the adapter gave the engine at instantiation. Tests
    /// use it to drive engine-originated callbacks directly.
    pub fn host(&self) -> Arc<dyn EngineHost> {
        self.host
            .lock()
            .unwrap()
            .clone()
            .expect("engine was never instantiated")
    }
}

/// Module double declaring a fixed set of supported revisions.
pub struct FakeModule {
    pub supported: Vec<ApiRevision>,
    pub state: Arc<FakeState>,
}

impl EngineModule for FakeModule {
    fn instantiate(
        &self,
        revision: ApiRevision,
        _key_system: &str,
        host: Arc<dyn EngineHost>,
    ) -> Option<Box<dyn EngineInstance>> {
        if !self.supported.contains(&revision) {
            return None;
        }
        self.state.host.lock().unwrap().replace(Arc::clone(&host));
        Some(Box::new(FakeEngine {
            state: Arc::clone(&self.state),
            host,
            revision,
        }))
    }
}

/// Engine double that answers every request immediately from the calling
/// thread, which makes promise outcomes observable as soon as the adapter
/// call returns.
pub struct FakeEngine {
    state: Arc<FakeState>,
    host: Arc<dyn EngineHost>,
    revision: ApiRevision,
}

impl FakeEngine {
    fn record_overlap(&self) -> Status {
        let concurrent = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_in_flight
            .fetch_max(concurrent, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        Status::Success
    }
}

impl EngineInstance for FakeEngine {
    fn initialize(
        &self,
        allow_distinctive_identifier: bool,
        allow_persistent_state: bool,
        use_hw_secure_codecs: bool,
    ) {
        self.state.initialized_with.lock().unwrap().replace((
            allow_distinctive_identifier,
            allow_persistent_state,
            use_hw_secure_codecs,
        ));
        if self.revision != ApiRevision::V9 {
            self.host.on_initialized(true);
        }
    }

    fn set_server_certificate(&self, promise_id: u32, _certificate: &[u8]) {
        if !self.state.defer_promises.load(Ordering::SeqCst) {
            self.host.on_resolve_promise(promise_id);
        }
    }

    fn create_session_and_generate_request(
        &self,
        promise_id: u32,
        _session_type: SessionType,
        _init_data_type: InitDataType,
        _init_data: &[u8],
    ) {
        self.state.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.defer_promises.load(Ordering::SeqCst) {
            return;
        }
        if self.state.reject_create.load(Ordering::SeqCst) {
            self.host.on_reject_promise(
                promise_id,
                Exception::TypeError,
                101,
                "create refused by engine",
            );
            return;
        }
        let n = self.state.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("sess-{n}");
        self.host
            .on_resolve_new_session_promise(promise_id, session_id.as_bytes());
        self.host.on_session_message(
            session_id.as_bytes(),
            MessageType::LicenseRequest,
            b"license-challenge",
        );
    }

    fn load_session(&self, promise_id: u32, _session_type: SessionType, session_id: &[u8]) {
        if !self.state.defer_promises.load(Ordering::SeqCst) {
            self.host
                .on_resolve_new_session_promise(promise_id, session_id);
        }
    }

    fn update_session(&self, promise_id: u32, session_id: &[u8], _response: &[u8]) {
        self.host.on_session_keys_change(
            session_id,
            true,
            &[KeyInformation {
                key_id: vec![0xab; 16],
                status: KeyStatus::Usable,
                system_code: 0,
            }],
        );
        self.host.on_resolve_promise(promise_id);
    }

    fn close_session(&self, promise_id: u32, session_id: &[u8]) {
        self.host.on_resolve_promise(promise_id);
        self.host.on_session_closed(session_id);
    }

    fn remove_session(&self, promise_id: u32, _session_id: &[u8]) {
        self.host.on_resolve_promise(promise_id);
    }

    fn timer_expired(&self, context: TimerContext) {
        self.state
            .timer_expirations
            .lock()
            .unwrap()
            .push((context, Instant::now()));
    }

    fn decrypt(&self, encrypted: &InputBuffer<'_>, decrypted: &mut DecryptedBlock) -> Status {
        self.state.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        // Exercise the buffer relay: client allocates, engine fills.
        if let Some(mut buffer) = self.host.allocate(encrypted.data.len()) {
            let n = encrypted.data.len();
            buffer.data_mut()[..n].copy_from_slice(encrypted.data);
            buffer.set_size(n);
            decrypted.set_buffer(buffer);
            decrypted.set_timestamp(encrypted.timestamp);
        }
        self.record_overlap()
    }

    fn initialize_audio_decoder(&self, _config: &AudioDecoderConfig) -> Status {
        self.record_overlap()
    }

    fn initialize_video_decoder(&self, _config: &VideoDecoderConfig) -> Status {
        self.record_overlap()
    }

    fn deinitialize_decoder(&self, _stream_type: StreamType) {}

    fn reset_decoder(&self, _stream_type: StreamType) {}

    fn decrypt_and_decode_frame(
        &self,
        _encrypted: &InputBuffer<'_>,
        _frame: &mut VideoFrame,
    ) -> Status {
        self.state.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.record_overlap()
    }

    fn decrypt_and_decode_samples(
        &self,
        _encrypted: &InputBuffer<'_>,
        _frames: &mut AudioFrames,
    ) -> Status {
        self.state.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.record_overlap()
    }

    fn on_platform_challenge_response(&self, _response: &PlatformChallengeResponse) {}

    fn on_query_output_protection_status(
        &self,
        result: QueryResult,
        link_mask: u32,
        output_protection_mask: u32,
    ) {
        self.state
            .output_protection_results
            .lock()
            .unwrap()
            .push((result, link_mask, output_protection_mask));
    }

    fn on_storage_id(&self, version: u32, storage_id: &[u8]) {
        self.state
            .storage_ids
            .lock()
            .unwrap()
            .push((version, storage_id.to_vec()));
    }

    fn destroy(&self) {
        self.state.destroyed.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub session_id: Vec<u8>,
    pub event: ClientEvent,
    pub payload: Vec<u8>,
    pub status: u32,
}

#[derive(Default)]
pub struct RecordingClient {
    pub events: Mutex<Vec<RecordedEvent>>,
    pub logs: Mutex<Vec<String>>,
}

impl RecordingClient {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_of(&self, event: ClientEvent) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|recorded| recorded.event == event)
            .collect()
    }
}

impl AdapterClient for RecordingClient {
    fn on_event(&self, session_id: &[u8], event: ClientEvent, payload: &[u8], status: u32) {
        self.events.lock().unwrap().push(RecordedEvent {
            session_id: session_id.to_vec(),
            event,
            payload: payload.to_vec(),
            status,
        });
    }

    fn log(&self, line: &str) {
        self.logs.lock().unwrap().push(line.to_owned());
    }

    fn allocate_buffer(&self, capacity: usize) -> Box<dyn Buffer> {
        Box::new(HeapBuffer::with_capacity(capacity))
    }
}

/// Clock double reporting a fixed wall time.
pub struct FixedClock(pub f64);

impl Clock for FixedClock {
    fn wall_time(&self) -> f64 {
        self.0
    }
}

pub fn options() -> AdapterOptions {
    let mut options = AdapterOptions::new(
        "com.widevine.alpha",
        "/nonexistent/engine.so",
        &*STORAGE_DIR,
    );
    options.config.allow_persistent_state = true;
    options
}

pub fn new_adapter(
    supported: &[ApiRevision],
) -> (CdmAdapter, Arc<FakeState>, Arc<RecordingClient>) {
    let state = Arc::new(FakeState::default());
    let client = Arc::new(RecordingClient::default());
    let module = Arc::new(FakeModule {
        supported: supported.to_vec(),
        state: Arc::clone(&state),
    });
    let adapter = CdmAdapter::with_module(options(), module, client.clone())
        .expect("negotiation should succeed");
    (adapter, state, client)
}

/// Polls `pred` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    pred()
}
