//! QuickTime (.mov) writer for the drone's raw H.264 stream.
//!
//! Frames are copied into memory as they arrive; nothing touches the disk
//! until [`MovWriter::finalize`], which builds the whole atom tree and writes
//! it in one burst:
//! - `ftyp` — 20-byte file type, `qt  ` brand
//! - `moov` — movie header plus a single fixed video track
//! - `mdat` — the collected frame bytes, back to back
//!
//! The track metadata is a fixed skeleton: the sample-to-chunk table is left
//! empty, so players see a declared video track whose mdat payload is not
//! indexed. The stream is stored, not muxed.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;

use super::atom::{put_u16, put_u32, put_version_flags, put_zeros, Atom};

/// Movie timescale: 1000 units per second.
const MOVIE_TIMESCALE: u32 = 1000;

/// Media timescale: 30000 units per second, 30fps with 1000-unit frames.
const MEDIA_TIMESCALE_FACTOR: u32 = 30;

/// Declared track dimensions. The device's nominal stream resolution;
/// declared, not measured from the actual frames.
const VIDEO_WIDTH: u16 = 960;
const VIDEO_HEIGHT: u16 = 720;

/// Seconds between the Mac HFS epoch (1904) and the Unix epoch (1970).
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Identity transformation matrix, 16.16/2.30 fixed point.
const UNITY_MATRIX: [u32; 9] = [
    0x0001_0000,
    0,
    0,
    0,
    0x0001_0000,
    0,
    0,
    0,
    0x4000_0000,
];

pub struct MovWriter {
    file: Option<File>,
    path: PathBuf,
    /// Frames in arrival order, each an owned copy.
    frames: Vec<Vec<u8>>,
    started: Instant,
}

impl MovWriter {
    /// Open `path` for writing. No bytes are emitted until finalize.
    pub fn create(path: &Path) -> Result<Self, String> {
        let file = File::create(path)
            .map_err(|e| format!("Failed to create recording file {}: {e}", path.display()))?;
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
            frames: Vec::new(),
            started: Instant::now(),
        })
    }

    /// Store one encoded frame. Empty input is tolerated and ignored, and
    /// calls after finalize are no-ops.
    pub fn write_frame(&mut self, data: &[u8]) -> Result<(), String> {
        if self.file.is_none() || data.is_empty() {
            return Ok(());
        }
        self.frames.push(data.to_vec());
        Ok(())
    }

    /// Frames stored so far.
    pub fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Build the atom tree, write the file, and close it. Idempotent; the
    /// file handle is released even when a write fails partway.
    pub fn finalize(&mut self) -> Result<(), String> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        let frames = std::mem::take(&mut self.frames);
        let frame_count = frames.len() as u32;

        // Duration in movie timescale units (milliseconds). A stopwatch
        // reading of zero falls back to the frame count so the header never
        // declares an empty movie when frames were stored.
        let elapsed = self.started.elapsed();
        let mut duration = elapsed.as_millis() as u32;
        if duration == 0 {
            duration = frame_count;
        }

        let created = mac_timestamp();

        ftyp_atom().write_to(&mut file)?;
        moov_atom(created, duration).write_to(&mut file)?;
        mdat_atom(frames).write_to(&mut file)?;

        file.sync_all()
            .map_err(|e| format!("Failed to flush recording file: {e}"))?;

        log::info!(
            "Recording finalized: {} ({frame_count} frames, {:.1}s)",
            self.path.display(),
            elapsed.as_secs_f64()
        );
        Ok(())
    }
}

/// Wall-clock seconds since the Mac HFS epoch, for atom timestamps.
fn mac_timestamp() -> u32 {
    (Utc::now().timestamp() + MAC_EPOCH_OFFSET) as u32
}

// ---------------------------------------------------------------------------
// Atom tree
// ---------------------------------------------------------------------------

fn ftyp_atom() -> Atom {
    let mut p = Vec::with_capacity(12);
    p.extend_from_slice(b"qt  "); // major brand
    p.extend_from_slice(&[0x20, 0x05, 0x03, 0x00]); // minor version
    p.extend_from_slice(b"qt  "); // compatible brand
    Atom::leaf(b"ftyp", p)
}

fn moov_atom(created: u32, duration: u32) -> Atom {
    Atom::container(b"moov", vec![mvhd_atom(created, duration), trak_atom(created, duration)])
}

fn mvhd_atom(created: u32, duration: u32) -> Atom {
    let mut p = Vec::with_capacity(100);
    put_version_flags(&mut p, 0, 0);
    put_u32(&mut p, created); // creation_time
    put_u32(&mut p, created); // modification_time
    put_u32(&mut p, MOVIE_TIMESCALE);
    put_u32(&mut p, duration);
    put_u32(&mut p, 0x0001_0000); // rate = 1.0
    put_u16(&mut p, 0x0100); // volume = 1.0
    put_zeros(&mut p, 10); // reserved
    for v in UNITY_MATRIX {
        put_u32(&mut p, v);
    }
    put_zeros(&mut p, 24); // pre_defined
    put_u32(&mut p, 2); // next_track_ID
    Atom::leaf(b"mvhd", p)
}

fn trak_atom(created: u32, duration: u32) -> Atom {
    Atom::container(b"trak", vec![tkhd_atom(created, duration), mdia_atom(created, duration)])
}

fn tkhd_atom(created: u32, duration: u32) -> Atom {
    let mut p = Vec::with_capacity(84);
    // flags: track enabled | in movie | in preview
    put_version_flags(&mut p, 0, 0x07);
    put_u32(&mut p, created); // creation_time
    put_u32(&mut p, created); // modification_time
    put_u32(&mut p, 1); // track_ID
    put_u32(&mut p, 0); // reserved
    put_u32(&mut p, duration);
    put_zeros(&mut p, 8); // reserved
    put_u16(&mut p, 0); // layer
    put_u16(&mut p, 0); // alternate_group
    put_u16(&mut p, 0); // volume (video track)
    put_u16(&mut p, 0); // reserved
    for v in UNITY_MATRIX {
        put_u32(&mut p, v);
    }
    put_u32(&mut p, (VIDEO_WIDTH as u32) << 16); // width, 16.16
    put_u32(&mut p, (VIDEO_HEIGHT as u32) << 16); // height, 16.16
    Atom::leaf(b"tkhd", p)
}

fn mdia_atom(created: u32, duration: u32) -> Atom {
    Atom::container(
        b"mdia",
        vec![mdhd_atom(created, duration), hdlr_atom(), minf_atom()],
    )
}

fn mdhd_atom(created: u32, duration: u32) -> Atom {
    let mut p = Vec::with_capacity(24);
    put_version_flags(&mut p, 0, 0);
    put_u32(&mut p, created); // creation_time
    put_u32(&mut p, created); // modification_time
    put_u32(&mut p, MOVIE_TIMESCALE * MEDIA_TIMESCALE_FACTOR); // timescale (30000)
    put_u32(&mut p, duration.wrapping_mul(MEDIA_TIMESCALE_FACTOR));
    put_u16(&mut p, 0x55C4); // language: undetermined
    put_u16(&mut p, 0); // pre_defined
    Atom::leaf(b"mdhd", p)
}

fn hdlr_atom() -> Atom {
    let mut p = Vec::new();
    put_version_flags(&mut p, 0, 0);
    put_u32(&mut p, 0); // pre_defined
    p.extend_from_slice(b"vide"); // handler_type
    put_zeros(&mut p, 12); // reserved
    p.extend_from_slice(b"VideoHandler\0");
    Atom::leaf(b"hdlr", p)
}

fn minf_atom() -> Atom {
    Atom::container(b"minf", vec![vmhd_atom(), dinf_atom(), stbl_atom()])
}

fn vmhd_atom() -> Atom {
    let mut p = Vec::with_capacity(12);
    put_version_flags(&mut p, 0, 0x01); // no lean ahead
    put_u16(&mut p, 0); // graphics_mode
    put_zeros(&mut p, 6); // opcolor
    Atom::leaf(b"vmhd", p)
}

fn dinf_atom() -> Atom {
    let mut p = Vec::new();
    put_version_flags(&mut p, 0, 0);
    put_u32(&mut p, 1); // entry_count
    // url entry: media data lives in this file
    put_u32(&mut p, 12); // entry size
    p.extend_from_slice(b"url ");
    put_version_flags(&mut p, 0, 0x01);
    Atom::container(b"dinf", vec![Atom::leaf(b"dref", p)])
}

fn stbl_atom() -> Atom {
    Atom::container(b"stbl", vec![stsd_atom(), stts_atom(), stsc_atom()])
}

fn stsd_atom() -> Atom {
    let mut p = Vec::new();
    put_version_flags(&mut p, 0, 0);
    put_u32(&mut p, 1); // entry_count
    // Minimal H.264 sample entry: tag only, no codec configuration.
    put_u32(&mut p, 8); // entry size
    p.extend_from_slice(b"avc1");
    Atom::leaf(b"stsd", p)
}

fn stts_atom() -> Atom {
    let mut p = Vec::with_capacity(16);
    put_version_flags(&mut p, 0, 0);
    put_u32(&mut p, 1); // entry_count
    put_u32(&mut p, 1); // sample_count
    put_u32(&mut p, 1000); // sample_delta
    Atom::leaf(b"stts", p)
}

fn stsc_atom() -> Atom {
    let mut p = Vec::with_capacity(8);
    put_version_flags(&mut p, 0, 0);
    put_u32(&mut p, 0); // entry_count
    Atom::leaf(b"stsc", p)
}

fn mdat_atom(frames: Vec<Vec<u8>>) -> Atom {
    let total: usize = frames.iter().map(Vec::len).sum();
    let mut p = Vec::with_capacity(total);
    for frame in &frames {
        p.extend_from_slice(frame);
    }
    Atom::leaf(b"mdat", p)
}
