//! Recording session state machine: Idle until started, Recording until
//! stopped, nothing else. Frames arrive from the stream task while start and
//! stop arrive from the keyboard thread, so every operation takes the one
//! session lock for its whole duration — a stop can never observe a frame
//! write in flight against a half-closed writer.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::mov::MovWriter;
use super::{recording_filename, write_metadata, SessionMetadata, RECORDING_FORMAT};

struct SessionInner {
    recording: bool,
    writer: Option<MovWriter>,
    /// Recording filename, empty while idle.
    current_file: String,
    current_path: PathBuf,
    /// Frames accepted into the current (or most recently closed) recording.
    frame_count: u32,
    started_at: Option<DateTime<Utc>>,
}

pub struct RecordingSession {
    output_dir: PathBuf,
    inner: Mutex<SessionInner>,
}

impl RecordingSession {
    /// Session writing recordings into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            inner: Mutex::new(SessionInner {
                recording: false,
                writer: None,
                current_file: String::new(),
                current_path: PathBuf::new(),
                frame_count: 0,
                started_at: None,
            }),
        }
    }

    /// Begin a new recording. Ignored while already recording. A file
    /// creation failure is logged and leaves the session idle.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.start_locked(&mut inner);
    }

    /// Finalize and close the active recording. Ignored while idle.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.stop_locked(&mut inner);
    }

    /// Start or stop based on the current state, decided under the lock.
    pub fn toggle(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.recording {
            self.stop_locked(&mut inner);
        } else {
            self.start_locked(&mut inner);
        }
    }

    /// Forward one frame to the active writer. A no-op while idle, and
    /// empty payloads are tolerated without error.
    pub fn on_frame(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.recording {
            return;
        }
        if let Some(writer) = inner.writer.as_mut() {
            if let Err(e) = writer.write_frame(data) {
                log::error!("Frame write error: {e}");
            }
            inner.frame_count = writer.frame_count();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().unwrap().recording
    }

    /// Filename of the active recording, empty while idle.
    pub fn current_file(&self) -> String {
        self.inner.lock().unwrap().current_file.clone()
    }

    /// Frames accepted into the current recording, or into the last one
    /// once stopped.
    pub fn frame_count(&self) -> u32 {
        self.inner.lock().unwrap().frame_count
    }

    pub fn recording_format(&self) -> &'static str {
        RECORDING_FORMAT
    }

    fn start_locked(&self, inner: &mut SessionInner) {
        if inner.recording {
            return;
        }

        let started = Utc::now();
        let filename = recording_filename(started);
        let path = self.output_dir.join(&filename);

        let writer = match MovWriter::create(&path) {
            Ok(w) => w,
            Err(e) => {
                log::error!("{e}");
                return;
            }
        };

        inner.writer = Some(writer);
        inner.current_file = filename;
        inner.current_path = path;
        inner.frame_count = 0;
        inner.started_at = Some(started);
        inner.recording = true;
        log::info!("Recording started: {}", inner.current_file);
    }

    fn stop_locked(&self, inner: &mut SessionInner) {
        if !inner.recording {
            return;
        }

        if let Some(mut writer) = inner.writer.take() {
            inner.frame_count = writer.frame_count();
            match writer.finalize() {
                Ok(()) => {
                    log::info!("Recording stopped, file saved: {}", inner.current_file);
                    self.write_session_metadata(inner);
                }
                // The flag clears regardless: the file may be incomplete,
                // but the session is stopped from the caller's view.
                Err(e) => log::error!("Failed to save recording: {e}"),
            }
        }

        inner.recording = false;
        inner.current_file.clear();
        inner.current_path = PathBuf::new();
        inner.started_at = None;
    }

    fn write_session_metadata(&self, inner: &SessionInner) {
        let Some(started) = inner.started_at else {
            return;
        };
        let metadata = SessionMetadata {
            file: inner.current_file.clone(),
            format: RECORDING_FORMAT.to_string(),
            frames: inner.frame_count,
            started_at: started.to_rfc3339(),
            duration_seconds: (Utc::now() - started).num_milliseconds() as f64 / 1000.0,
        };
        if let Err(e) = write_metadata(&inner.current_path, &metadata) {
            log::warn!("{e}");
        }
    }
}
