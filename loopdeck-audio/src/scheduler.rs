//! Loop scheduler - owns patterns and their life against the transport
//!
//! One pattern per looping track, never more. The scheduler is the only
//! writer of the pattern map and the only caller of transport start/stop, so
//! the transport runs exactly while at least one loop does.

use crate::pattern::Pattern;
use crate::track::{Track, TrackId};
use crate::transport::Transport;
use std::collections::BTreeMap;
use tracing::debug;

/// One scheduled trigger inside the current audio block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fire {
    pub track: TrackId,
    pub key: char,
    /// Frame offset from the start of the block
    pub frame_offset: usize,
}

/// Converts recorded takes into repeating patterns and drains their fires
/// block by block.
pub struct LoopScheduler {
    /// BTreeMap keeps fire collection deterministic across runs.
    patterns: BTreeMap<TrackId, Pattern>,
    scratch: Vec<(u64, char)>,
}

impl LoopScheduler {
    pub fn new() -> Self {
        Self {
            patterns: BTreeMap::new(),
            scratch: Vec::with_capacity(64),
        }
    }

    pub fn is_active(&self, id: TrackId) -> bool {
        self.patterns.contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.patterns.len()
    }

    /// Loop length of a track's live pattern, in frames.
    pub fn loop_len(&self, id: TrackId) -> Option<u64> {
        self.patterns.get(&id).map(|p| p.loop_len())
    }

    /// Start looping a track. No-op while the track already loops, and on
    /// degenerate tracks (nothing recorded). Returns whether a loop runs
    /// afterwards.
    pub fn start_loop(&mut self, track: &mut Track, transport: &mut Transport) -> bool {
        if self.patterns.contains_key(&track.id) {
            // Already looping: never create a second pattern.
            track.is_looping = true;
            return true;
        }

        let Some(mut pattern) = Pattern::compile(track, transport.sample_rate()) else {
            debug!(track = %track.id, "no pattern to loop");
            return false;
        };

        transport.ensure_started();
        pattern.align_to(transport.position());
        debug!(track = %track.id, loop_frames = pattern.loop_len(), "loop started");
        self.patterns.insert(track.id, pattern);
        track.is_looping = true;
        true
    }

    /// Stop a track's loop, releasing its pattern and every pending fire.
    /// Idempotent; safe on a track that never looped. Stops the transport
    /// when the last loop goes.
    pub fn stop_loop(&mut self, track: &mut Track, transport: &mut Transport) {
        if self.patterns.remove(&track.id).is_some() {
            debug!(track = %track.id, "loop stopped");
        }
        track.is_looping = false;
        if self.patterns.is_empty() {
            transport.stop();
        }
    }

    /// Stop everything if anything loops, else start every track that has a
    /// recorded take.
    pub fn toggle_all(&mut self, tracks: &mut [Track], transport: &mut Transport) {
        if !self.patterns.is_empty() {
            for track in tracks.iter_mut() {
                track.is_looping = false;
            }
            self.patterns.clear();
            transport.stop();
            debug!("all loops stopped");
        } else {
            for track in tracks.iter_mut() {
                if track.has_playable_events() {
                    self.start_loop(track, transport);
                }
            }
        }
    }

    /// Drop every pattern (session teardown).
    pub fn clear(&mut self, transport: &mut Transport) {
        self.patterns.clear();
        transport.stop();
    }

    /// Collect the fires of the upcoming block of `frames`, sorted by time
    /// then track. Audibility is the caller's concern: it is evaluated at
    /// trigger time against live mute/solo state, not here.
    pub fn collect_fires(&mut self, transport: &Transport, frames: u64, out: &mut Vec<Fire>) {
        if !transport.is_running() || frames == 0 {
            return;
        }

        let start = transport.position();
        let end = start + frames;

        for (id, pattern) in self.patterns.iter_mut() {
            self.scratch.clear();
            pattern.pop_fires(end, &mut self.scratch);
            for &(at, key) in &self.scratch {
                out.push(Fire {
                    track: *id,
                    key,
                    frame_offset: at.saturating_sub(start) as usize,
                });
            }
        }

        out.sort_by_key(|f| (f.frame_offset, f.track));
    }
}

impl Default for LoopScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackEvent;

    const SR: u32 = 48000;

    fn looped_track(id: u32, events_ms: &[(f64, char)], marker_ms: f64) -> Track {
        let mut t = Track::new(TrackId(id), format!("t{id}"));
        t.events = events_ms
            .iter()
            .map(|&(off, key)| TrackEvent::press(off, key))
            .collect();
        t.events.push(TrackEvent::marker(marker_ms));
        t
    }

    fn drain(
        scheduler: &mut LoopScheduler,
        transport: &mut Transport,
        blocks: usize,
        block_frames: u64,
    ) -> Vec<Fire> {
        let mut all = Vec::new();
        for _ in 0..blocks {
            let mut fires = Vec::new();
            scheduler.collect_fires(transport, block_frames, &mut fires);
            transport.advance(block_frames);
            all.extend(fires);
        }
        all
    }

    #[test]
    fn test_start_loop_runs_transport() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut track = looped_track(0, &[(0.0, 'a')], 500.0);

        assert!(scheduler.start_loop(&mut track, &mut transport));
        assert!(transport.is_running());
        assert!(track.is_looping);
        assert_eq!(scheduler.active_count(), 1);
    }

    #[test]
    fn test_start_loop_degenerate_track_is_noop() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut empty = Track::new(TrackId(0), "empty");

        assert!(!scheduler.start_loop(&mut empty, &mut transport));
        assert!(!transport.is_running());
        assert!(!empty.is_looping);
    }

    #[test]
    fn test_start_loop_idempotent_single_fire_per_tick() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut track = looped_track(0, &[(0.0, 'a')], 500.0);

        scheduler.start_loop(&mut track, &mut transport);
        scheduler.start_loop(&mut track, &mut transport);
        scheduler.start_loop(&mut track, &mut transport);
        assert_eq!(scheduler.active_count(), 1);

        // One loop pass: exactly one fire, not three.
        let loop_len = scheduler.loop_len(TrackId(0)).unwrap();
        let fires = drain(&mut scheduler, &mut transport, 1, loop_len);
        assert_eq!(fires.len(), 1);
    }

    #[test]
    fn test_stop_loop_idempotent_and_silences_track() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut track = looped_track(0, &[(0.0, 'a')], 500.0);

        scheduler.start_loop(&mut track, &mut transport);
        scheduler.stop_loop(&mut track, &mut transport);
        scheduler.stop_loop(&mut track, &mut transport);

        assert!(!track.is_looping);
        assert_eq!(scheduler.active_count(), 0);
        assert!(!transport.is_running());

        // No callback fires after stop.
        transport.ensure_started();
        let fires = drain(&mut scheduler, &mut transport, 4, 4096);
        assert!(fires.is_empty());
    }

    #[test]
    fn test_stop_loop_on_never_started_track_is_safe() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut track = looped_track(0, &[(0.0, 'a')], 500.0);

        scheduler.stop_loop(&mut track, &mut transport);
        assert!(!track.is_looping);
    }

    #[test]
    fn test_transport_stops_exactly_when_last_loop_stops() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut a = looped_track(0, &[(0.0, 'a')], 500.0);
        let mut b = looped_track(1, &[(0.0, 'b')], 700.0);

        scheduler.start_loop(&mut a, &mut transport);
        scheduler.start_loop(&mut b, &mut transport);

        scheduler.stop_loop(&mut a, &mut transport);
        assert!(transport.is_running());

        scheduler.stop_loop(&mut b, &mut transport);
        assert!(!transport.is_running());
        assert_eq!(transport.position(), 0);
    }

    #[test]
    fn test_concurrent_loops_of_different_lengths_stay_locked() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut a = looped_track(0, &[(0.0, 'a')], 500.0);
        let mut b = looped_track(1, &[(0.0, 'b')], 750.0);

        scheduler.start_loop(&mut a, &mut transport);
        scheduler.start_loop(&mut b, &mut transport);

        let len_a = scheduler.loop_len(TrackId(0)).unwrap();
        let len_b = scheduler.loop_len(TrackId(1)).unwrap();

        // Walk three seconds in uneven blocks and check each track's fires
        // sit exactly on its own grid.
        let mut pos = 0u64;
        let mut abs_fires: Vec<(u64, TrackId)> = Vec::new();
        while pos < SR as u64 * 3 {
            let frames = if pos % 2 == 0 { 1024 } else { 999 };
            let mut fires = Vec::new();
            scheduler.collect_fires(&transport, frames, &mut fires);
            for f in &fires {
                abs_fires.push((pos + f.frame_offset as u64, f.track));
            }
            transport.advance(frames);
            pos += frames;
        }

        let a_fires: Vec<u64> = abs_fires
            .iter()
            .filter(|(_, id)| *id == TrackId(0))
            .map(|(at, _)| *at)
            .collect();
        let b_fires: Vec<u64> = abs_fires
            .iter()
            .filter(|(_, id)| *id == TrackId(1))
            .map(|(at, _)| *at)
            .collect();

        for (i, at) in a_fires.iter().enumerate() {
            assert_eq!(*at, i as u64 * len_a);
        }
        for (i, at) in b_fires.iter().enumerate() {
            assert_eq!(*at, i as u64 * len_b);
        }
        assert!(a_fires.len() >= 5);
        assert!(b_fires.len() >= 4);
    }

    #[test]
    fn test_late_started_loop_aligns_to_transport_grid() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut a = looped_track(0, &[(0.0, 'a')], 500.0);
        let mut b = looped_track(1, &[(0.0, 'b')], 500.0);

        scheduler.start_loop(&mut a, &mut transport);
        transport.advance(10_000);

        scheduler.start_loop(&mut b, &mut transport);
        let len = scheduler.loop_len(TrackId(1)).unwrap();

        // B's first fire is at the next multiple of its loop length, not at
        // the moment it was started.
        let mut fires = Vec::new();
        scheduler.collect_fires(&transport, len, &mut fires);
        let b_first = fires.iter().find(|f| f.track == TrackId(1)).unwrap();
        assert_eq!(10_000 + b_first.frame_offset as u64, len);
    }

    #[test]
    fn test_toggle_all_stops_everything_or_starts_recorded_tracks() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut tracks = vec![
            looped_track(0, &[(0.0, 'a')], 500.0),
            Track::new(TrackId(1), "empty"),
            looped_track(2, &[(100.0, 'c')], 800.0),
        ];

        scheduler.toggle_all(&mut tracks, &mut transport);
        assert!(tracks[0].is_looping);
        assert!(!tracks[1].is_looping);
        assert!(tracks[2].is_looping);
        assert_eq!(scheduler.active_count(), 2);

        scheduler.toggle_all(&mut tracks, &mut transport);
        assert!(tracks.iter().all(|t| !t.is_looping));
        assert_eq!(scheduler.active_count(), 0);
        assert!(!transport.is_running());
    }

    #[test]
    fn test_fires_sorted_by_time_then_track() {
        let mut scheduler = LoopScheduler::new();
        let mut transport = Transport::new(SR);
        let mut a = looped_track(3, &[(0.0, 'x')], 500.0);
        let mut b = looped_track(1, &[(0.0, 'y')], 500.0);

        scheduler.start_loop(&mut a, &mut transport);
        scheduler.start_loop(&mut b, &mut transport);

        let mut fires = Vec::new();
        scheduler.collect_fires(&transport, 256, &mut fires);
        assert_eq!(fires.len(), 2);
        assert_eq!(fires[0].track, TrackId(1));
        assert_eq!(fires[1].track, TrackId(3));
    }
}
