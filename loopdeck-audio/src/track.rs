//! Track model - recorded events plus mix settings

/// Identifies a track for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u32);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track {}", self.0)
    }
}

/// Volume range in decibels.
pub const VOLUME_MIN_DB: f32 = -40.0;
pub const VOLUME_MAX_DB: f32 = 6.0;

/// One captured key press, or the terminating loop-length marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackEvent {
    /// Offset from recording start in milliseconds
    pub offset_ms: f64,
    /// Logical sound key; meaningless on the marker
    pub key: char,
    /// True only for the final loop-length marker
    pub is_marker: bool,
}

impl TrackEvent {
    pub fn press(offset_ms: f64, key: char) -> Self {
        Self {
            offset_ms,
            key,
            is_marker: false,
        }
    }

    pub fn marker(offset_ms: f64) -> Self {
        Self {
            offset_ms,
            key: '\0',
            is_marker: true,
        }
    }
}

/// Recording take in progress. Quantize settings are snapshotted here when
/// the take starts so one take is quantized consistently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTake {
    /// Wall-clock ms at `start_recording`
    pub started_ms: f64,
    /// Beat duration in ms when quantizing, None when the take is free
    pub quantize_beat_ms: Option<f64>,
}

/// A single looper track.
///
/// Events stay sorted by non-decreasing offset; when the track has any
/// events the last one is the loop-length marker.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub events: Vec<TrackEvent>,
    /// Present iff a recording take is running
    pub take: Option<ActiveTake>,
    pub is_looping: bool,
    volume_db: f32,
    pan: f32,
    pub muted: bool,
    pub soloed: bool,
    /// Loop length in ms; valid only after a take with events stopped
    pub total_duration_ms: Option<f64>,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            events: Vec::new(),
            take: None,
            is_looping: false,
            volume_db: 0.0,
            pan: 0.0,
            muted: false,
            soloed: false,
            total_duration_ms: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.take.is_some()
    }

    /// Volume in dB, clamped to -40..+6.
    pub fn volume_db(&self) -> f32 {
        self.volume_db
    }

    pub fn set_volume_db(&mut self, db: f32) {
        self.volume_db = db.clamp(VOLUME_MIN_DB, VOLUME_MAX_DB);
    }

    /// Stereo position, -1 (left) to 1 (right).
    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    /// The recorded presses, marker excluded.
    pub fn playable_events(&self) -> impl Iterator<Item = &TrackEvent> {
        self.events.iter().filter(|e| !e.is_marker)
    }

    pub fn has_playable_events(&self) -> bool {
        self.events.iter().any(|e| !e.is_marker)
    }

    /// Loop length in ms: the marker offset when present, else the last
    /// event's offset. None when nothing was recorded.
    pub fn loop_length_ms(&self) -> Option<f64> {
        self.events.last().map(|e| e.offset_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamped() {
        let mut track = Track::new(TrackId(0), "t");
        track.set_volume_db(20.0);
        assert_eq!(track.volume_db(), VOLUME_MAX_DB);
        track.set_volume_db(-100.0);
        assert_eq!(track.volume_db(), VOLUME_MIN_DB);
    }

    #[test]
    fn test_pan_clamped() {
        let mut track = Track::new(TrackId(0), "t");
        track.set_pan(2.0);
        assert_eq!(track.pan(), 1.0);
        track.set_pan(-1.5);
        assert_eq!(track.pan(), -1.0);
    }

    #[test]
    fn test_playable_events_excludes_marker() {
        let mut track = Track::new(TrackId(0), "t");
        track.events = vec![
            TrackEvent::press(0.0, 'a'),
            TrackEvent::press(250.0, 's'),
            TrackEvent::marker(1000.0),
        ];
        assert_eq!(track.playable_events().count(), 2);
        assert_eq!(track.loop_length_ms(), Some(1000.0));
    }

    #[test]
    fn test_loop_length_without_marker_uses_last_event() {
        let mut track = Track::new(TrackId(0), "t");
        track.events = vec![TrackEvent::press(0.0, 'a'), TrackEvent::press(800.0, 's')];
        assert_eq!(track.loop_length_ms(), Some(800.0));
    }

    #[test]
    fn test_empty_track_has_no_loop_length() {
        let track = Track::new(TrackId(0), "t");
        assert_eq!(track.loop_length_ms(), None);
        assert!(!track.has_playable_events());
    }
}
