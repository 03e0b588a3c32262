//! This crate defines the plugin contract between a media host and a
//! dynamically loaded content-protection engine.
//!
//! The contract exists in three successive interface revisions (tagged 9, 10
//! and 11). The data types are shared by all revisions; the few calls that
//! only exist on newer revisions are folded into the [`EngineHost`] and
//! [`EngineInstance`] traits and gated by the adapter at runtime, so an
//! engine and a host always talk through a single pair of traits regardless
//! of the revision they negotiated.
//!
//! Nothing in here performs cryptographic or decoding work. The types are
//! carriers; the loaded engine owns the algorithms.

mod buffer;
mod engine;
mod file_io;
mod frame;
mod host;
mod types;

pub use buffer::{Buffer, HeapBuffer};
pub use engine::{EngineInstance, EngineModule};
pub use file_io::{FileIo, FileIoClient, FileIoStatus};
pub use frame::{ColorRange, ColorSpace, VideoFrame, VideoPlane, MAX_PLANES};
pub use host::{EngineHost, EngineProxy};
pub use types::{
    ApiRevision, AudioCodec, AudioDecoderConfig, AudioFormat, AudioFrames, DecryptedBlock,
    EncryptionPattern, EncryptionScheme, Exception, InitDataType, InputBuffer, KeyInformation,
    KeyStatus, MessageType, PlatformChallengeResponse, QueryResult, SessionType, Status,
    StreamType, SubsampleEntry, TimerContext, VideoCodec, VideoDecoderConfig, VideoFormat,
};
