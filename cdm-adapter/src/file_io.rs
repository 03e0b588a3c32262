use crate::error::Error;
use cdm_api::{FileIo, FileIoClient, FileIoStatus};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

/// State of one file-I/O instance. `Error` is terminal until `close`
/// returns the instance to `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileIoState {
    Closed,
    Opening,
    Open,
    Reading,
    Writing,
    Error,
}

/// Implements the engine's persistent-storage contract on the local
/// filesystem: one opaque blob per engine-chosen file name under the
/// configured base path. The blob's format is entirely engine-defined.
pub struct FileIoBridge {
    base_path: PathBuf,
    client: Arc<dyn FileIoClient>,
    state: FileIoState,
    path: Option<PathBuf>,
}

impl FileIoBridge {
    pub(crate) fn new(base_path: PathBuf, client: Arc<dyn FileIoClient>) -> Self {
        Self {
            base_path,
            client,
            state: FileIoState::Closed,
            path: None,
        }
    }

    pub fn state(&self) -> FileIoState {
        self.state
    }
}

/// The engine picks the name; only names that cannot escape the storage
/// root are accepted.
fn valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 256
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl FileIo for FileIoBridge {
    fn open(&mut self, file_name: &str) {
        match self.state {
            FileIoState::Closed => {}
            // Error is terminal until close, not an open descriptor.
            FileIoState::Error => {
                self.client.on_open_complete(FileIoStatus::Error);
                return;
            }
            _ => {
                log::warn!("{} ('{}')", Error::AlreadyOpen, file_name);
                self.client.on_open_complete(FileIoStatus::AlreadyOpen);
                return;
            }
        }

        self.state = FileIoState::Opening;

        if !valid_file_name(file_name) {
            log::warn!("engine requested invalid file name '{file_name}'");
            self.state = FileIoState::Error;
            self.client.on_open_complete(FileIoStatus::Error);
            return;
        }

        if let Err(err) = fs::create_dir_all(&self.base_path) {
            log::warn!(
                "cannot create storage root {}: {err}",
                self.base_path.display()
            );
            self.state = FileIoState::Error;
            self.client.on_open_complete(FileIoStatus::Error);
            return;
        }

        self.path = Some(self.base_path.join(file_name));
        self.state = FileIoState::Open;
        self.client.on_open_complete(FileIoStatus::Success);
    }

    fn read(&mut self) {
        if self.state != FileIoState::Open {
            self.client.on_read_complete(FileIoStatus::Error, &[]);
            return;
        }
        let Some(path) = self.path.clone() else {
            self.state = FileIoState::Error;
            self.client.on_read_complete(FileIoStatus::Error, &[]);
            return;
        };

        self.state = FileIoState::Reading;
        match fs::read(&path) {
            Ok(data) => {
                self.state = FileIoState::Open;
                self.client.on_read_complete(FileIoStatus::Success, &data);
            }
            // A file that was never written reads back empty.
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.state = FileIoState::Open;
                self.client.on_read_complete(FileIoStatus::Success, &[]);
            }
            Err(err) => {
                log::warn!("cannot read {}: {err}", path.display());
                self.state = FileIoState::Error;
                self.client.on_read_complete(FileIoStatus::Error, &[]);
            }
        }
    }

    fn write(&mut self, data: &[u8]) {
        if self.state != FileIoState::Open {
            self.client.on_write_complete(FileIoStatus::Error);
            return;
        }
        let Some(path) = self.path.clone() else {
            self.state = FileIoState::Error;
            self.client.on_write_complete(FileIoStatus::Error);
            return;
        };

        self.state = FileIoState::Writing;
        // fs::write is write_all underneath: a short write surfaces as an
        // error instead of a truncated blob.
        match fs::write(&path, data) {
            Ok(()) => {
                self.state = FileIoState::Open;
                self.client.on_write_complete(FileIoStatus::Success);
            }
            Err(err) => {
                log::warn!("cannot write {}: {err}", path.display());
                self.state = FileIoState::Error;
                self.client.on_write_complete(FileIoStatus::Error);
            }
        }
    }

    fn close(&mut self) {
        self.state = FileIoState::Closed;
        self.path = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{LazyLock, Mutex};

    static OUTPUT_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../target/cdm-file-io-tests")
    });

    static NEXT_DIR: AtomicU32 = AtomicU32::new(0);

    fn storage_dir() -> PathBuf {
        OUTPUT_DIR.join(format!("case-{}", NEXT_DIR.fetch_add(1, Ordering::SeqCst)))
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Completion {
        Open(FileIoStatus),
        Read(FileIoStatus, Vec<u8>),
        Write(FileIoStatus),
    }

    #[derive(Default)]
    struct RecordingFileClient {
        completions: Mutex<Vec<Completion>>,
    }

    impl RecordingFileClient {
        fn take(&self) -> Vec<Completion> {
            std::mem::take(&mut self.completions.lock().unwrap())
        }
    }

    impl FileIoClient for RecordingFileClient {
        fn on_open_complete(&self, status: FileIoStatus) {
            self.completions.lock().unwrap().push(Completion::Open(status));
        }

        fn on_read_complete(&self, status: FileIoStatus, data: &[u8]) {
            self.completions
                .lock()
                .unwrap()
                .push(Completion::Read(status, data.to_vec()));
        }

        fn on_write_complete(&self, status: FileIoStatus) {
            self.completions
                .lock()
                .unwrap()
                .push(Completion::Write(status));
        }
    }

    #[test]
    fn double_open_reports_already_open() {
        let client = Arc::new(RecordingFileClient::default());
        let mut bridge = FileIoBridge::new(storage_dir(), client.clone());

        bridge.open("license");
        bridge.open("license");
        assert_eq!(
            client.take(),
            vec![
                Completion::Open(FileIoStatus::Success),
                Completion::Open(FileIoStatus::AlreadyOpen),
            ]
        );
        // The first descriptor is untouched.
        assert_eq!(bridge.state(), FileIoState::Open);

        bridge.close();
        assert_eq!(bridge.state(), FileIoState::Closed);

        bridge.open("license");
        assert_eq!(client.take(), vec![Completion::Open(FileIoStatus::Success)]);
    }

    #[test]
    fn write_then_read_round_trips_the_blob() {
        let client = Arc::new(RecordingFileClient::default());
        let mut bridge = FileIoBridge::new(storage_dir(), client.clone());

        bridge.open("state.bin");
        bridge.write(b"opaque-license-state");
        bridge.read();

        assert_eq!(
            client.take(),
            vec![
                Completion::Open(FileIoStatus::Success),
                Completion::Write(FileIoStatus::Success),
                Completion::Read(FileIoStatus::Success, b"opaque-license-state".to_vec()),
            ]
        );
        assert_eq!(bridge.state(), FileIoState::Open);
    }

    #[test]
    fn reading_a_never_written_file_is_empty_success() {
        let client = Arc::new(RecordingFileClient::default());
        let mut bridge = FileIoBridge::new(storage_dir(), client.clone());

        bridge.open("missing");
        bridge.read();
        assert_eq!(
            client.take(),
            vec![
                Completion::Open(FileIoStatus::Success),
                Completion::Read(FileIoStatus::Success, vec![]),
            ]
        );
    }

    #[test]
    fn requests_before_open_fail() {
        let client = Arc::new(RecordingFileClient::default());
        let mut bridge = FileIoBridge::new(storage_dir(), client.clone());

        bridge.read();
        bridge.write(b"data");
        assert_eq!(
            client.take(),
            vec![
                Completion::Read(FileIoStatus::Error, vec![]),
                Completion::Write(FileIoStatus::Error),
            ]
        );
        assert_eq!(bridge.state(), FileIoState::Closed);
    }

    #[test]
    fn traversal_names_are_rejected() {
        for name in ["", "../escape", "a/b", ".hidden", "a\\b"] {
            let client = Arc::new(RecordingFileClient::default());
            let mut bridge = FileIoBridge::new(storage_dir(), client.clone());
            bridge.open(name);
            assert_eq!(
                client.take(),
                vec![Completion::Open(FileIoStatus::Error)],
                "name {name:?} should be rejected"
            );
            assert_eq!(bridge.state(), FileIoState::Error);

            // Error is terminal until close; a retried open is not
            // "already open".
            bridge.read();
            bridge.open("retry");
            assert_eq!(
                client.take(),
                vec![
                    Completion::Read(FileIoStatus::Error, vec![]),
                    Completion::Open(FileIoStatus::Error),
                ]
            );
            assert_eq!(bridge.state(), FileIoState::Error);
            bridge.close();
            assert_eq!(bridge.state(), FileIoState::Closed);
        }
    }
}
