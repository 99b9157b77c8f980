//! Per-track recording state machine
//!
//! A track moves Idle -> Recording -> Idle(with events). Timestamps arrive
//! from the control thread in wall-clock milliseconds; quantize settings are
//! snapshotted when a take starts so the whole take lands on one grid.

use crate::track::{ActiveTake, Track, TrackEvent};
use tracing::debug;

/// Records key presses into tracks against the session tempo.
#[derive(Debug, Clone)]
pub struct Recorder {
    bpm: f32,
    quantize: bool,
}

impl Recorder {
    pub const MIN_BPM: f32 = 30.0;
    pub const MAX_BPM: f32 = 300.0;

    pub fn new(bpm: f32, quantize: bool) -> Self {
        let mut r = Self {
            bpm: 120.0,
            quantize,
        };
        r.set_bpm(bpm);
        r
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = bpm.clamp(Self::MIN_BPM, Self::MAX_BPM);
    }

    pub fn quantize(&self) -> bool {
        self.quantize
    }

    pub fn set_quantize(&mut self, on: bool) {
        self.quantize = on;
    }

    /// Duration of one beat at the session tempo, in ms.
    pub fn beat_ms(&self) -> f64 {
        60_000.0 / self.bpm as f64
    }

    /// Begin a take: clears previous events and stamps the start time.
    pub fn start(&self, track: &mut Track, now_ms: f64) {
        track.events.clear();
        track.total_duration_ms = None;
        track.take = Some(ActiveTake {
            started_ms: now_ms,
            quantize_beat_ms: self.quantize.then(|| self.beat_ms()),
        });
        debug!(track = %track.id, quantize = self.quantize, "recording started");
    }

    /// Capture one key press. Ignored unless the track is recording.
    /// Returns true when an event was appended.
    pub fn record_key(&self, track: &mut Track, key: char, now_ms: f64) -> bool {
        let Some(take) = track.take else {
            return false;
        };

        let raw = (now_ms - take.started_ms).max(0.0);
        let offset = match take.quantize_beat_ms {
            Some(beat) => snap_to_grid(raw, beat),
            None => raw,
        };

        track.events.push(TrackEvent::press(offset, key));
        true
    }

    /// End the take. With no captured events the track returns to Idle with
    /// an empty list; otherwise the loop-length marker is appended and the
    /// total duration recorded.
    pub fn stop(&self, track: &mut Track, now_ms: f64) {
        let Some(take) = track.take.take() else {
            return;
        };

        if track.events.is_empty() {
            debug!(track = %track.id, "recording stopped with no events");
            return;
        }

        let actual = (now_ms - take.started_ms).max(0.0);
        let final_duration = match take.quantize_beat_ms {
            Some(beat) => round_up_to_grid(actual, beat),
            None => actual,
        };

        track.events.push(TrackEvent::marker(final_duration));
        track.total_duration_ms = Some(final_duration);
        debug!(
            track = %track.id,
            events = track.events.len() - 1,
            duration_ms = final_duration,
            "recording stopped"
        );
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(120.0, false)
    }
}

/// Snap to the nearest whole multiple of `beat`.
fn snap_to_grid(offset_ms: f64, beat_ms: f64) -> f64 {
    (offset_ms / beat_ms).round() * beat_ms
}

/// Round up to the next whole multiple of `beat`; exact multiples stay.
fn round_up_to_grid(duration_ms: f64, beat_ms: f64) -> f64 {
    (duration_ms / beat_ms).ceil() * beat_ms
}
