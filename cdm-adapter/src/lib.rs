//! This crate mediates between a media-playback pipeline and a dynamically
//! loaded content-protection engine implementing the versioned plugin
//! contract from [`cdm_api`].
//!
//! [`CdmAdapter`] loads the engine module, negotiates the highest interface
//! revision the module accepts (11, then 10, then 9), translates host
//! requests (license and session management, buffer decryption, decode
//! initialization) into engine calls, and turns the engine's asynchronous
//! callbacks (promise resolution, session events, timers, file I/O) into a
//! uniform event stream for the single registered [`AdapterClient`].
//!
//! The engine performs all cryptographic and decoding work itself; the
//! adapter only orchestrates. Two exclusion domains keep that orchestration
//! race-free: one serializing event delivery to the client, one serializing
//! entry into the engine's decrypt/decode surface.

#![allow(improper_ctypes_definitions)]

mod adapter;
mod client;
mod clock;
mod error;
mod file_io;
mod loader;
mod promise;
mod session;
mod timer;

pub use adapter::{AdapterOptions, CdmAdapter, CdmConfig};
pub use client::{AdapterClient, ClientEvent};
pub use clock::{Clock, SystemClock};
pub use error::Error;
pub use file_io::{FileIoBridge, FileIoState};
pub use loader::{CreateEngineFn, NativeEngineModule, CREATE_ENGINE_SYMBOL};
pub use promise::PromiseId;
pub use session::SessionState;

pub use cdm_api as api;
