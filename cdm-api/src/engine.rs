use crate::frame::VideoFrame;
use crate::host::EngineHost;
use crate::types::{
    ApiRevision, AudioDecoderConfig, AudioFrames, DecryptedBlock, InitDataType, InputBuffer,
    PlatformChallengeResponse, QueryResult, SessionType, Status, StreamType, TimerContext,
    VideoDecoderConfig,
};
use std::sync::Arc;

/// One loaded instance of the content-protection engine.
///
/// Methods take `&self`: the engine serializes its own session bookkeeping
/// internally. The decrypt and decode entry points are the exception: they
/// are not safe for concurrent entry, and the host must not call two of
/// them at the same time.
pub trait EngineInstance: Send + Sync {
    /// Revision 9 completes synchronously; revision 10 and later report
    /// completion through [`EngineHost::on_initialized`].
    fn initialize(
        &self,
        allow_distinctive_identifier: bool,
        allow_persistent_state: bool,
        use_hw_secure_codecs: bool,
    );

    fn set_server_certificate(&self, promise_id: u32, certificate: &[u8]);

    fn create_session_and_generate_request(
        &self,
        promise_id: u32,
        session_type: SessionType,
        init_data_type: InitDataType,
        init_data: &[u8],
    );

    fn load_session(&self, promise_id: u32, session_type: SessionType, session_id: &[u8]);

    fn update_session(&self, promise_id: u32, session_id: &[u8], response: &[u8]);

    fn close_session(&self, promise_id: u32, session_id: &[u8]);

    fn remove_session(&self, promise_id: u32, session_id: &[u8]);

    /// Delivery of an expired timer requested through
    /// [`EngineHost::set_timer`]; `context` arrives exactly as the engine
    /// supplied it.
    fn timer_expired(&self, context: TimerContext);

    fn decrypt(&self, encrypted: &InputBuffer<'_>, decrypted: &mut DecryptedBlock) -> Status;

    fn initialize_audio_decoder(&self, config: &AudioDecoderConfig) -> Status;

    fn initialize_video_decoder(&self, config: &VideoDecoderConfig) -> Status;

    fn deinitialize_decoder(&self, stream_type: StreamType);

    fn reset_decoder(&self, stream_type: StreamType);

    fn decrypt_and_decode_frame(&self, encrypted: &InputBuffer<'_>, frame: &mut VideoFrame)
        -> Status;

    fn decrypt_and_decode_samples(
        &self,
        encrypted: &InputBuffer<'_>,
        frames: &mut AudioFrames,
    ) -> Status;

    fn on_platform_challenge_response(&self, response: &PlatformChallengeResponse);

    /// Answer to [`EngineHost::query_output_protection_status`].
    fn on_query_output_protection_status(
        &self,
        result: QueryResult,
        link_mask: u32,
        output_protection_mask: u32,
    );

    /// Answer to [`EngineHost::request_storage_id`].
    fn on_storage_id(&self, version: u32, storage_id: &[u8]);

    /// Instructs the engine to release itself. Called once, before the
    /// module is unloaded; no other method may be called afterwards.
    fn destroy(&self);
}

/// The loaded engine module, before revision negotiation.
///
/// Asked once per candidate revision, newest first. Returning `None` means
/// the module does not implement that revision; returning an instance ends
/// the negotiation. On success the module takes shared ownership of `host`
/// for the lifetime of the instance.
pub trait EngineModule: Send + Sync {
    fn instantiate(
        &self,
        revision: ApiRevision,
        key_system: &str,
        host: Arc<dyn EngineHost>,
    ) -> Option<Box<dyn EngineInstance>>;
}
