/// Completion status of a file I/O request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileIoStatus {
    Success,
    /// `open` was called on an instance that is already open. The existing
    /// descriptor is untouched.
    AlreadyOpen,
    Error,
}

/// Completion callbacks for a [`FileIo`] instance. Implemented by the
/// engine; the host calls back exactly once per request.
pub trait FileIoClient: Send + Sync {
    fn on_open_complete(&self, status: FileIoStatus);
    fn on_read_complete(&self, status: FileIoStatus, data: &[u8]);
    fn on_write_complete(&self, status: FileIoStatus);
}

/// Minimal persistent-storage contract the host provides to the engine, one
/// instance per open request. The stored blob is entirely engine-defined
/// and opaque to the host.
pub trait FileIo: Send {
    /// Opens the named file under the host's storage root. The name is
    /// chosen by the engine; the host rejects names that would escape the
    /// root. Reports [`FileIoStatus::AlreadyOpen`] if this instance is
    /// already open.
    fn open(&mut self, file_name: &str);

    /// Reads the whole file. Reading a file that was never written
    /// completes successfully with empty data.
    fn read(&mut self);

    /// Writes `data` as the new file content. All-or-error: a partial
    /// write is reported as [`FileIoStatus::Error`], never truncated
    /// silently.
    fn write(&mut self, data: &[u8]);

    /// Returns the instance to the closed state, clearing a previous error.
    fn close(&mut self);
}
