pub mod atom;
pub mod mov;
pub mod session;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Fixed filename prefix for every recording.
pub const RECORDING_PREFIX: &str = "tello_recording";

/// Container flavor extension.
pub const RECORDING_EXT: &str = "mov";

/// Static label for the container flavor produced.
pub const RECORDING_FORMAT: &str = "MOV";

/// Recording filename for the given start time:
/// `tello_recording_YYYYMMDD_HHMMSS.ffffff.mov`. Microsecond resolution
/// keeps rapid back-to-back sessions from colliding.
pub fn recording_filename(start: DateTime<Utc>) -> String {
    format!(
        "{RECORDING_PREFIX}_{}.{RECORDING_EXT}",
        start.format("%Y%m%d_%H%M%S%.6f")
    )
}

/// Companion document written next to each finished recording.
#[derive(Serialize)]
pub struct SessionMetadata {
    pub file: String,
    pub format: String,
    pub frames: u32,
    pub started_at: String,
    pub duration_seconds: f64,
}

/// Write `<recording stem>.json` beside the recording. Best-effort: callers
/// log a failure and move on, the recording itself is already on disk.
pub fn write_metadata(recording_path: &Path, metadata: &SessionMetadata) -> Result<(), String> {
    let path = recording_path.with_extension("json");
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| format!("Failed to serialize session metadata: {e}"))?;
    std::fs::write(&path, json).map_err(|e| format!("Failed to write session metadata: {e}"))?;
    log::info!("Session metadata written: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_carries_prefix_and_extension() {
        let name = recording_filename(Utc::now());
        assert!(name.starts_with("tello_recording_"));
        assert!(name.ends_with(".mov"));
    }

    #[test]
    fn test_filename_has_microsecond_resolution() {
        let t = DateTime::parse_from_rfc3339("2024-03-01T12:30:45.000123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            recording_filename(t),
            "tello_recording_20240301_123045.000123.mov"
        );
    }

    #[test]
    fn test_distinct_times_give_distinct_names() {
        let a = DateTime::parse_from_rfc3339("2024-03-01T12:30:45.000001Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = a + chrono::Duration::microseconds(1);
        assert_ne!(recording_filename(a), recording_filename(b));
    }

    #[test]
    fn test_metadata_written_beside_recording() {
        let dir = tempfile::tempdir().unwrap();
        let rec = dir.path().join("tello_recording_x.mov");
        let meta = SessionMetadata {
            file: "tello_recording_x.mov".into(),
            format: RECORDING_FORMAT.into(),
            frames: 5,
            started_at: "2024-03-01T12:30:45Z".into(),
            duration_seconds: 1.5,
        };
        write_metadata(&rec, &meta).unwrap();

        let json = std::fs::read_to_string(dir.path().join("tello_recording_x.json")).unwrap();
        assert!(json.contains("\"frames\": 5"));
        assert!(json.contains("\"format\": \"MOV\""));
    }
}
