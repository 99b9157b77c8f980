//! Offline mix renderer
//!
//! Renders the audible tracks into a fixed-length stereo buffer without
//! touching live engine state: the caller hands in a snapshot of the tracks
//! and a buffer resolver, and gets back samples plus a WAV file. Rendering
//! is synchronous, block-free, and deterministic.

use crate::bus::{db_to_gain, pan_gains, track_stage};
use crate::pattern::Pattern;
use crate::track::Track;
use crate::wav::{encode_wav, export_filename, write_wav_file};
use crossbeam_channel::Sender;
use loopdeck_assets::SharedBuffer;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Export duration ceiling in seconds.
pub const EXPORT_MAX_SECS: f64 = 120.0;

/// Errors that abort an export
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid export duration: {0} s")]
    InvalidDuration(f64),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters of an offline export.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub master_volume_db: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            duration_secs: EXPORT_MAX_SECS,
            sample_rate: 48000,
            master_volume_db: 0.0,
        }
    }
}

/// Export phases, in order. Progress percentages never decrease across them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Setup,
    Buffers,
    Scheduling,
    Rendering,
    Encoding,
}

#[derive(Debug, Clone, Copy)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    pub percent: u8,
}

/// The rendered mix before encoding.
pub struct RenderedMix {
    /// Interleaved stereo samples, master gain applied, unclamped
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// Result of a completed export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub path: PathBuf,
    pub filename: String,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// One scheduled buffer start in the offline graph.
struct ScheduledStart {
    frame: u64,
    buffer: SharedBuffer,
    gain_l: f32,
    gain_r: f32,
}

fn report(progress: Option<&Sender<ExportProgress>>, phase: ExportPhase, percent: u8) {
    if let Some(tx) = progress {
        let _ = tx.send(ExportProgress { phase, percent });
    }
}

/// Render all audible tracks into a stereo buffer of exactly
/// `duration_secs * sample_rate` frames.
///
/// `resolve` maps a sound key to its decoded buffer; keys it cannot resolve
/// lose their events, nothing else. Mute/solo is evaluated once for the
/// whole render. Degenerate tracks are skipped silently.
pub fn render_mix(
    tracks: &[Track],
    resolve: &mut dyn FnMut(char) -> Option<SharedBuffer>,
    options: &ExportOptions,
    progress: Option<&Sender<ExportProgress>>,
) -> Result<RenderedMix, ExportError> {
    report(progress, ExportPhase::Setup, 0);

    if !options.duration_secs.is_finite() || options.duration_secs <= 0.0 {
        return Err(ExportError::InvalidDuration(options.duration_secs));
    }
    if options.sample_rate == 0 {
        return Err(ExportError::Render("sample rate must be nonzero".into()));
    }

    let duration_secs = options.duration_secs.min(EXPORT_MAX_SECS);
    let sample_rate = options.sample_rate;
    let total_frames = (duration_secs * sample_rate as f64).round() as u64;

    // Audibility decided once for the whole render.
    let any_solo = tracks.iter().any(|t| t.soloed);
    let audible: Vec<&Track> = tracks
        .iter()
        .filter(|t| !t.muted && (!any_solo || t.soloed))
        .collect();
    report(progress, ExportPhase::Setup, 5);

    // Resolve the distinct keys the audible tracks reference.
    let keys: BTreeSet<char> = audible
        .iter()
        .flat_map(|t| t.playable_events().map(|e| e.key))
        .collect();

    let mut buffers: HashMap<char, SharedBuffer> = HashMap::new();
    let key_count = keys.len().max(1);
    for (i, key) in keys.iter().enumerate() {
        match resolve(*key) {
            Some(buffer) => {
                buffers.insert(*key, buffer);
            }
            None => warn!(key = %key, "unresolved sound dropped from export"),
        }
        let percent = 5 + ((i + 1) * 25 / key_count) as u8;
        report(progress, ExportPhase::Buffers, percent);
    }
    report(progress, ExportPhase::Buffers, 30);

    // Build the offline schedule: one start per (iteration x event).
    let voice_center = pan_gains(0.0).0;
    let mut schedule: Vec<ScheduledStart> = Vec::new();
    for &track in &audible {
        let Some(pattern) = Pattern::compile(track, sample_rate) else {
            continue;
        };
        let loop_len = pattern.loop_len();
        let iterations = total_frames.div_ceil(loop_len);
        let (gain_l, gain_r) = track_stage(track.volume_db(), track.pan());

        for iteration in 0..iterations {
            for step in pattern.steps() {
                let frame = iteration * loop_len + step.offset;
                if frame >= total_frames {
                    continue;
                }
                let Some(buffer) = buffers.get(&step.key) else {
                    continue;
                };
                schedule.push(ScheduledStart {
                    frame,
                    buffer: buffer.clone(),
                    gain_l: gain_l * voice_center,
                    gain_r: gain_r * voice_center,
                });
            }
        }
    }
    schedule.sort_by_key(|s| s.frame);
    report(progress, ExportPhase::Scheduling, 40);

    // Render: additive mixing of every scheduled start.
    let mut samples = vec![0.0f32; total_frames as usize * 2];
    let start_count = schedule.len().max(1);
    for (i, start) in schedule.iter().enumerate() {
        let remaining = (total_frames - start.frame) as usize;
        let frames = start.buffer.frames().min(remaining);
        let base = start.frame as usize * 2;
        for f in 0..frames {
            let (l, r) = start.buffer.frame(f);
            samples[base + f * 2] += l * start.gain_l;
            samples[base + f * 2 + 1] += r * start.gain_r;
        }
        if (i + 1) % 16 == 0 || i + 1 == schedule.len() {
            let percent = 40 + ((i + 1) * 50 / start_count) as u8;
            report(progress, ExportPhase::Rendering, percent);
        }
    }

    let master_gain = db_to_gain(options.master_volume_db);
    for sample in samples.iter_mut() {
        *sample *= master_gain;
    }
    report(progress, ExportPhase::Rendering, 90);

    info!(
        tracks = audible.len(),
        starts = schedule.len(),
        frames = total_frames,
        "offline render complete"
    );

    Ok(RenderedMix {
        samples,
        channels: 2,
        sample_rate,
        duration_secs,
    })
}

/// Render, encode, and write the mix to `out_dir` under the fixed naming
/// convention. Live state is untouched throughout; a failure aborts only
/// this export.
pub fn export_mix(
    tracks: &[Track],
    resolve: &mut dyn FnMut(char) -> Option<SharedBuffer>,
    options: &ExportOptions,
    out_dir: &Path,
    progress: Option<&Sender<ExportProgress>>,
) -> Result<ExportResult, ExportError> {
    let mix = render_mix(tracks, resolve, options, progress)?;

    report(progress, ExportPhase::Encoding, 90);
    let bytes = encode_wav(&mix.samples, mix.channels, mix.sample_rate)
        .map_err(|e| ExportError::Encode(e.to_string()))?;

    let filename = export_filename(mix.duration_secs);
    let path = out_dir.join(&filename);
    write_wav_file(&path, &bytes)?;
    report(progress, ExportPhase::Encoding, 100);

    info!(path = %path.display(), bytes = bytes.len(), "mix exported");
    Ok(ExportResult {
        path,
        filename,
        duration_secs: mix.duration_secs,
        sample_rate: mix.sample_rate,
        channels: mix.channels,
    })
}
