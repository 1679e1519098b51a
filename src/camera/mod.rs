//! Camera viewer: the consumer end of the drone's video stream. Counts every
//! frame that arrives while the viewer runs and hands each one to the
//! recording session, which decides whether it is kept.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::recording::session::RecordingSession;

/// Frame-count log cadence, ~5 seconds at the stream's 30 fps.
const FRAME_LOG_INTERVAL: u64 = 150;

pub struct CameraViewer {
    session: Arc<RecordingSession>,
    running: AtomicBool,
    frame_count: AtomicU64,
}

impl CameraViewer {
    pub fn new(session: Arc<RecordingSession>) -> Self {
        Self {
            session,
            running: AtomicBool::new(false),
            frame_count: AtomicU64::new(0),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Relaxed);
        log::info!("Camera viewer started, receiving video stream");
    }

    /// Stop the viewer, closing any recording still open.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }
        if self.session.is_recording() {
            self.session.stop();
        }
        log::info!("Camera viewer stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Total frames seen while running, recording or not.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    // Recording controls, delegated to the session.

    pub fn start_recording(&self) {
        self.session.start();
    }

    pub fn stop_recording(&self) {
        self.session.stop();
    }

    pub fn toggle_recording(&self) {
        self.session.toggle();
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_recording()
    }

    /// Filename of the active recording, empty while idle.
    pub fn current_recording_file(&self) -> String {
        self.session.current_file()
    }

    /// Static label for the container flavor produced.
    pub fn recording_format(&self) -> &'static str {
        self.session.recording_format()
    }

    /// Handle one frame from the stream. Dropped while the viewer is not
    /// running; otherwise counted and offered to the session.
    pub fn process_frame(&self, data: &[u8]) {
        if !self.is_running() {
            return;
        }

        let count = self.frame_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % FRAME_LOG_INTERVAL == 0 {
            log::info!("Receiving frames... ({count} total)");
        }

        self.session.on_frame(data);
    }
}

/// Spawn the task draining the frame channel into the viewer. Returns the
/// stop signal; the task also ends when the stream side closes the channel.
pub fn spawn_frame_task(
    viewer: Arc<CameraViewer>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) -> watch::Sender<bool> {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(data) => viewer.process_frame(&data),
                    None => {
                        log::info!("Frame channel closed");
                        break;
                    }
                },
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("Frame task stopped");
    });

    stop_tx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer_in(dir: &std::path::Path) -> CameraViewer {
        CameraViewer::new(Arc::new(RecordingSession::new(dir)))
    }

    #[test]
    fn test_frames_counted_only_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = viewer_in(dir.path());

        viewer.process_frame(&[1, 2, 3]);
        assert_eq!(viewer.frame_count(), 0);

        viewer.start();
        viewer.process_frame(&[1, 2, 3]);
        viewer.process_frame(&[4, 5, 6]);
        assert_eq!(viewer.frame_count(), 2);
    }

    #[test]
    fn test_frames_counted_regardless_of_recording() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = viewer_in(dir.path());
        viewer.start();

        // Not recording: viewer counts, session drops.
        viewer.process_frame(&[1]);
        assert_eq!(viewer.frame_count(), 1);
        assert_eq!(viewer.session().frame_count(), 0);

        // Recording: both see the frame.
        viewer.session().start();
        viewer.process_frame(&[2]);
        assert_eq!(viewer.frame_count(), 2);
        assert_eq!(viewer.session().frame_count(), 1);
        viewer.session().stop();
    }

    #[test]
    fn test_stop_closes_open_recording() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = viewer_in(dir.path());
        viewer.start();
        viewer.session().start();
        assert!(viewer.session().is_recording());

        viewer.stop();
        assert!(!viewer.is_running());
        assert!(!viewer.session().is_recording());
    }

    #[test]
    fn test_recording_facade() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = viewer_in(dir.path());
        assert_eq!(viewer.recording_format(), "MOV");

        viewer.start_recording();
        assert!(viewer.is_recording());
        let file = viewer.current_recording_file();
        assert!(file.starts_with("tello_recording_"));
        assert!(file.ends_with(".mov"));

        viewer.toggle_recording();
        assert!(!viewer.is_recording());
        assert!(viewer.current_recording_file().is_empty());
        assert!(dir.path().join(&file).exists());
    }

    #[test]
    fn test_redundant_stop_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = viewer_in(dir.path());
        viewer.stop();
        viewer.start();
        viewer.stop();
        viewer.stop();
        assert!(!viewer.is_running());
    }
}
