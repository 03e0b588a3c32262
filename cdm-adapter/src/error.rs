use std::path::PathBuf;
use thiserror::Error;

/// The errors the adapter reports on its own behalf. Engine-originated
/// status codes and promise rejections are passed through verbatim and are
/// not wrapped in this type.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine module could not be loaded or is missing its entry
    /// point. Fatal: surfaced from construction.
    #[error("Failed to load engine module from {}: {reason}", path.display())]
    EngineLoad { path: PathBuf, reason: String },

    /// The module loaded but accepted none of the known interface
    /// revisions. Fatal: surfaced from construction.
    #[error("Engine module implements none of the supported interface revisions (tried 11, 10, 9)")]
    UnsupportedVersion,

    /// An engine callback referenced a session this adapter never created
    /// or loaded. Recovered locally: logged, counted, dropped.
    #[error("Callback referenced unknown session '{0}'")]
    UnknownSession(String),

    /// A file-I/O open request hit an instance that is already open.
    /// Returned to the requester; the existing descriptor is untouched.
    #[error("File is already open")]
    AlreadyOpen,
}
