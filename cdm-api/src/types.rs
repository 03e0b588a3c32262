use crate::buffer::Buffer;

/// Interface revision of the plugin contract.
///
/// A module may implement any subset of these; the loader asks for each one
/// from newest to oldest and keeps the first the module accepts.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApiRevision {
    V9,
    V10,
    V11,
}

impl ApiRevision {
    /// Revisions in the order they are offered to a module during
    /// negotiation, newest first.
    pub const NEGOTIATION_ORDER: [ApiRevision; 3] =
        [ApiRevision::V11, ApiRevision::V10, ApiRevision::V9];

    pub fn tag(self) -> u32 {
        match self {
            ApiRevision::V9 => 9,
            ApiRevision::V10 => 10,
            ApiRevision::V11 => 11,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            9 => Some(ApiRevision::V9),
            10 => Some(ApiRevision::V10),
            11 => Some(ApiRevision::V11),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Status codes reported by the engine. Passed through to callers
/// unmodified; the host never retries on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    NeedsMoreData,
    NoKey,
    InitializationError,
    DecryptError,
    DecodeError,
    DeferredInitialization,
}

/// Exception categories carried by promise rejections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exception {
    TypeError,
    NotSupportedError,
    InvalidStateError,
    QuotaExceededError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStatus {
    Usable,
    InternalError,
    Expired,
    OutputRestricted,
    OutputDownscaled,
    StatusPending,
    Released,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionType {
    Temporary,
    PersistentLicense,
    PersistentKeyRelease,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitDataType {
    Cenc,
    KeyIds,
    WebM,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    LicenseRequest,
    LicenseRenewal,
    LicenseRelease,
    IndividualizationRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamType {
    Audio,
    Video,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EncryptionScheme {
    #[default]
    Unencrypted,
    Cenc,
    Cbcs,
}

/// Pattern encryption parameters, in 16-byte blocks. Both zero means
/// pattern encryption is not in use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncryptionPattern {
    pub crypt_byte_block: u32,
    pub skip_byte_block: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubsampleEntry {
    pub clear_bytes: u32,
    pub cipher_bytes: u32,
}

/// An encrypted buffer handed to the engine for decryption or decoding.
/// Borrows everything from the caller; the engine must copy what it keeps.
#[derive(Clone, Copy, Debug)]
pub struct InputBuffer<'a> {
    pub data: &'a [u8],
    pub key_id: &'a [u8],
    pub iv: &'a [u8],
    pub subsamples: &'a [SubsampleEntry],
    pub encryption_scheme: EncryptionScheme,
    pub pattern: EncryptionPattern,
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
}

impl<'a> InputBuffer<'a> {
    /// A buffer that is not encrypted at all.
    pub fn clear(data: &'a [u8]) -> Self {
        Self {
            data,
            key_id: &[],
            iv: &[],
            subsamples: &[],
            encryption_scheme: EncryptionScheme::Unencrypted,
            pattern: EncryptionPattern::default(),
            timestamp: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KeyInformation {
    pub key_id: Vec<u8>,
    pub status: KeyStatus,
    pub system_code: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioCodec {
    Opus,
    Vorbis,
    Aac,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoCodec {
    Vp8,
    Vp9,
    Avc,
    Hevc,
    Av1,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VideoFormat {
    #[default]
    Unknown,
    Yv12,
    I420,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AudioFormat {
    #[default]
    Unknown,
    U8,
    S16,
    S32,
    F32,
    PlanarS16,
    PlanarF32,
}

#[derive(Clone, Debug)]
pub struct AudioDecoderConfig {
    pub codec: AudioCodec,
    pub channel_count: u32,
    pub bits_per_channel: u32,
    pub samples_per_second: u32,
    pub extra_data: Vec<u8>,
    pub encryption_scheme: EncryptionScheme,
}

#[derive(Clone, Debug)]
pub struct VideoDecoderConfig {
    pub codec: VideoCodec,
    pub profile: u32,
    pub format: VideoFormat,
    pub coded_width: u32,
    pub coded_height: u32,
    pub extra_data: Vec<u8>,
    pub encryption_scheme: EncryptionScheme,
}

/// Decrypted output for the plain decrypt path. The buffer inside is
/// client-allocated and travels back to the client with the result.
#[derive(Default)]
pub struct DecryptedBlock {
    buffer: Option<Box<dyn Buffer>>,
    timestamp: i64,
}

impl DecryptedBlock {
    pub fn set_buffer(&mut self, buffer: Box<dyn Buffer>) {
        self.buffer = Some(buffer);
    }

    pub fn buffer(&self) -> Option<&dyn Buffer> {
        self.buffer.as_deref()
    }

    pub fn take_buffer(&mut self) -> Option<Box<dyn Buffer>> {
        self.buffer.take()
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Decoded audio output, interleaved as |timestamp|size|data| frames in the
/// format the engine reports.
#[derive(Default)]
pub struct AudioFrames {
    buffer: Option<Box<dyn Buffer>>,
    format: AudioFormat,
}

impl AudioFrames {
    pub fn set_buffer(&mut self, buffer: Box<dyn Buffer>) {
        self.buffer = Some(buffer);
    }

    pub fn buffer(&self) -> Option<&dyn Buffer> {
        self.buffer.as_deref()
    }

    pub fn take_buffer(&mut self) -> Option<Box<dyn Buffer>> {
        self.buffer.take()
    }

    pub fn set_format(&mut self, format: AudioFormat) {
        self.format = format;
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryResult {
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct PlatformChallengeResponse {
    pub signed_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub platform_key_certificate: Vec<u8>,
}

/// Opaque token attached to an engine timer request. The host returns it at
/// expiry exactly as received and attaches no meaning to it.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct TimerContext(pub u64);
