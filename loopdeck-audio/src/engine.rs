//! Audio engine - tracks, recorder, scheduler, and voice mixing
//!
//! `EngineState` is the single owner of every track, pattern, and playing
//! voice. The control thread mutates it only through `AudioCommand`s applied
//! between blocks; the audio callback calls `process` to render. Tests drive
//! both directly, no audio device needed.

use crate::bus::{db_to_gain, soft_clip, track_stage};
use crate::recorder::Recorder;
use crate::scheduler::{Fire, LoopScheduler};
use crate::track::{Track, TrackId};
use crate::transport::Transport;
use crate::voice::{Voice, VoiceSource};
use crossbeam_channel::{bounded, Receiver, Sender};
use loopdeck_assets::SoundBank;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum buffer size for pre-allocated processing buffers
const MAX_BUFFER_SIZE: usize = 4096;

/// Hard ceiling on simultaneously playing voices.
const MAX_VOICES: usize = 128;

/// Commands sent to the audio engine
pub enum AudioCommand {
    AddTrack { id: TrackId, name: String },
    RemoveTrack(TrackId),

    StartRecording { track: TrackId, at_ms: f64 },
    RecordKeyPress { track: TrackId, key: char, at_ms: f64 },
    StopRecording { track: TrackId, at_ms: f64 },

    StartLoop(TrackId),
    StopLoop(TrackId),
    ToggleAllLoops,

    SetTrackVolume { track: TrackId, db: f32 },
    SetTrackPan { track: TrackId, pan: f32 },
    ToggleMute(TrackId),
    ToggleSolo(TrackId),

    SetBpm(f32),
    SetQuantize(bool),
    SetMasterVolume(f32),

    /// Replace the key -> buffer arena the scheduler resolves against
    SetBank(Arc<SoundBank>),

    /// Play a sound immediately. `source: None` resolves `key` from the
    /// bank; the router passes an explicit source for cache misses.
    Trigger {
        key: char,
        track: Option<TrackId>,
        gain_db: f32,
        pan: f32,
        source: Option<VoiceSource>,
    },

    Shutdown,
}

/// Events sent from the audio engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// State update for UI rendering
    StateUpdate(SessionSnapshot),
    /// Error surfaced to the user
    Error(String),
}

/// Per-track state for UI rendering and export.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub name: String,
    pub is_recording: bool,
    pub is_looping: bool,
    pub volume_db: f32,
    pub pan: f32,
    pub muted: bool,
    pub soloed: bool,
    pub event_count: usize,
    pub loop_length_ms: Option<f64>,
}

/// Complete engine state for UI rendering.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub tracks: Vec<TrackSnapshot>,
    pub transport_running: bool,
    pub transport_secs: f64,
    pub bpm: f32,
    pub quantize: bool,
    pub master_volume_db: f32,
    pub active_voices: usize,
}

/// Audio engine state (held behind the engine mutex)
pub struct EngineState {
    sample_rate: u32,
    tracks: Vec<Track>,
    recorder: Recorder,
    scheduler: LoopScheduler,
    transport: Transport,
    bank: Arc<SoundBank>,
    voices: Vec<Voice>,
    master_volume_db: f32,
    // Pre-allocated buffers (no allocation in the audio callback)
    fires: Vec<Fire>,
    track_buf: Vec<f32>,
}

impl EngineState {
    pub fn new(sample_rate: u32, bpm: f32, quantize: bool) -> Self {
        Self {
            sample_rate,
            tracks: Vec::new(),
            recorder: Recorder::new(bpm, quantize),
            scheduler: LoopScheduler::new(),
            transport: Transport::new(sample_rate),
            bank: Arc::new(SoundBank::default()),
            voices: Vec::with_capacity(MAX_VOICES),
            master_volume_db: 0.0,
            fires: Vec::with_capacity(64),
            track_buf: vec![0.0f32; MAX_BUFFER_SIZE],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Deep copy of the track list for the offline renderer. The export path
    /// works on this copy, never on live state.
    pub fn clone_tracks(&self) -> Vec<Track> {
        self.tracks.clone()
    }

    fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// Process a command
    pub fn handle_command(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::AddTrack { id, name } => self.add_track(id, name),
            AudioCommand::RemoveTrack(id) => self.remove_track(id),

            AudioCommand::StartRecording { track, at_ms } => {
                if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track) {
                    self.recorder.start(t, at_ms);
                }
            }
            AudioCommand::RecordKeyPress { track, key, at_ms } => {
                if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track) {
                    self.recorder.record_key(t, key, at_ms);
                }
            }
            AudioCommand::StopRecording { track, at_ms } => {
                if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track) {
                    self.recorder.stop(t, at_ms);
                }
            }

            AudioCommand::StartLoop(id) => self.start_loop(id),
            AudioCommand::StopLoop(id) => self.stop_loop(id),
            AudioCommand::ToggleAllLoops => self.toggle_all_loops(),

            AudioCommand::SetTrackVolume { track, db } => {
                if let Some(t) = self.track_mut(track) {
                    t.set_volume_db(db);
                }
            }
            AudioCommand::SetTrackPan { track, pan } => {
                if let Some(t) = self.track_mut(track) {
                    t.set_pan(pan);
                }
            }
            AudioCommand::ToggleMute(id) => {
                if let Some(t) = self.track_mut(id) {
                    t.muted = !t.muted;
                }
            }
            AudioCommand::ToggleSolo(id) => {
                if let Some(t) = self.track_mut(id) {
                    t.soloed = !t.soloed;
                }
            }

            AudioCommand::SetBpm(bpm) => self.recorder.set_bpm(bpm),
            AudioCommand::SetQuantize(on) => self.recorder.set_quantize(on),
            AudioCommand::SetMasterVolume(db) => {
                self.master_volume_db = db.clamp(-40.0, 6.0);
            }
            AudioCommand::SetBank(bank) => self.bank = bank,

            AudioCommand::Trigger {
                key,
                track,
                gain_db,
                pan,
                source,
            } => self.trigger(key, track, gain_db, pan, source),

            AudioCommand::Shutdown => {} // Handled at higher level
        }
    }

    pub fn add_track(&mut self, id: TrackId, name: impl Into<String>) {
        if self.track(id).is_some() {
            warn!(%id, "duplicate track id ignored");
            return;
        }
        self.tracks.push(Track::new(id, name));
    }

    /// Remove a track, stopping its loop and dropping its playing voices.
    pub fn remove_track(&mut self, id: TrackId) {
        if let Some(pos) = self.tracks.iter().position(|t| t.id == id) {
            let mut track = self.tracks.remove(pos);
            self.scheduler.stop_loop(&mut track, &mut self.transport);
            self.voices.retain(|v| v.track != Some(id));
        }
    }

    pub fn start_recording(&mut self, id: TrackId, at_ms: f64) {
        self.handle_command(AudioCommand::StartRecording { track: id, at_ms });
    }

    pub fn record_key_press(&mut self, id: TrackId, key: char, at_ms: f64) {
        self.handle_command(AudioCommand::RecordKeyPress {
            track: id,
            key,
            at_ms,
        });
    }

    pub fn stop_recording(&mut self, id: TrackId, at_ms: f64) {
        self.handle_command(AudioCommand::StopRecording { track: id, at_ms });
    }

    pub fn start_loop(&mut self, id: TrackId) {
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == id) {
            self.scheduler.start_loop(track, &mut self.transport);
        }
    }

    pub fn stop_loop(&mut self, id: TrackId) {
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == id) {
            self.scheduler.stop_loop(track, &mut self.transport);
        }
    }

    pub fn toggle_all_loops(&mut self) {
        self.scheduler.toggle_all(&mut self.tracks, &mut self.transport);
    }

    /// Audibility rule, evaluated at trigger time against live state.
    pub fn is_audible(&self, id: TrackId) -> bool {
        let any_solo = self.tracks.iter().any(|t| t.soloed);
        match self.track(id) {
            Some(t) => !t.muted && (!any_solo || t.soloed),
            None => false,
        }
    }

    /// Spawn a voice for an immediate trigger.
    fn trigger(
        &mut self,
        key: char,
        track: Option<TrackId>,
        gain_db: f32,
        pan: f32,
        source: Option<VoiceSource>,
    ) {
        let source = match source {
            Some(s) => s,
            None => match self.bank.get(key) {
                Some(buffer) => VoiceSource::Buffer(buffer),
                None => {
                    debug!(key = %key, "trigger for unloaded sound dropped");
                    return;
                }
            },
        };
        self.spawn_voice(source, track, db_to_gain(gain_db), pan, 0);
    }

    fn spawn_voice(
        &mut self,
        source: VoiceSource,
        track: Option<TrackId>,
        gain: f32,
        pan: f32,
        delay_frames: usize,
    ) {
        if self.voices.len() >= MAX_VOICES {
            debug!("voice limit reached, dropping trigger");
            return;
        }
        self.voices.push(Voice::new(source, track, gain, pan, delay_frames));
    }

    /// Generate current state for UI
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tracks: self
                .tracks
                .iter()
                .map(|t| TrackSnapshot {
                    id: t.id,
                    name: t.name.clone(),
                    is_recording: t.is_recording(),
                    is_looping: t.is_looping,
                    volume_db: t.volume_db(),
                    pan: t.pan(),
                    muted: t.muted,
                    soloed: t.soloed,
                    event_count: t.playable_events().count(),
                    loop_length_ms: t.loop_length_ms(),
                })
                .collect(),
            transport_running: self.transport.is_running(),
            transport_secs: self.transport.position_secs(),
            bpm: self.recorder.bpm(),
            quantize: self.recorder.quantize(),
            master_volume_db: self.master_volume_db,
            active_voices: self.voices.len(),
        }
    }

    /// Render one block of interleaved stereo output.
    pub fn process(&mut self, output: &mut [f32]) {
        let len = output.len();
        let frames = len / 2;
        output.fill(0.0);

        if len > self.track_buf.len() {
            self.track_buf.resize(len, 0.0);
        }

        // Scheduled loop fires for this block, gated at trigger time.
        let mut fires = std::mem::take(&mut self.fires);
        fires.clear();
        self.scheduler
            .collect_fires(&self.transport, frames as u64, &mut fires);
        for fire in &fires {
            if !self.is_audible(fire.track) {
                continue;
            }
            match self.bank.get(fire.key) {
                Some(buffer) => self.spawn_voice(
                    VoiceSource::Buffer(buffer),
                    Some(fire.track),
                    1.0,
                    0.0,
                    fire.frame_offset,
                ),
                None => debug!(key = %fire.key, "loop fire for unloaded sound skipped"),
            }
        }
        self.fires = fires;
        self.transport.advance(frames as u64);

        // Mix per-track voices through each track's gain/pan stage.
        for idx in 0..self.tracks.len() {
            let (id, gain_l, gain_r) = {
                let t = &self.tracks[idx];
                let (l, r) = track_stage(t.volume_db(), t.pan());
                (t.id, l, r)
            };

            let mut any = false;
            self.track_buf[..len].fill(0.0);
            for voice in self.voices.iter_mut().filter(|v| v.track == Some(id)) {
                voice.mix(&mut self.track_buf[..len]);
                any = true;
            }
            if any {
                for frame in 0..frames {
                    output[frame * 2] += self.track_buf[frame * 2] * gain_l;
                    output[frame * 2 + 1] += self.track_buf[frame * 2 + 1] * gain_r;
                }
            }
        }

        // One-shots route straight to the master bus.
        for voice in self.voices.iter_mut().filter(|v| v.track.is_none()) {
            voice.mix(output);
        }

        let master_gain = db_to_gain(self.master_volume_db);
        for sample in output.iter_mut() {
            *sample = soft_clip(*sample * master_gain);
        }

        self.voices.retain(|v| !v.is_finished());
    }
}

/// Handle to communicate with the audio engine
pub struct EngineHandle {
    /// Send commands to the audio thread
    pub command_tx: Sender<AudioCommand>,
    /// Receive events from the audio thread
    pub event_rx: Receiver<EngineEvent>,
    /// Shutdown flag
    shutdown: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Create channels for engine communication
    /// Buffer size of 1024 provides headroom for command bursts without saturation
    pub fn create_channels() -> (
        Sender<AudioCommand>,
        Receiver<AudioCommand>,
        Sender<EngineEvent>,
        Receiver<EngineEvent>,
    ) {
        let (cmd_tx, cmd_rx) = bounded(1024);
        let (evt_tx, evt_rx) = bounded(1024);
        (cmd_tx, cmd_rx, evt_tx, evt_rx)
    }

    pub fn new(command_tx: Sender<AudioCommand>, event_rx: Receiver<EngineEvent>) -> Self {
        Self {
            command_tx,
            event_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send a command to the audio engine
    pub fn send(&self, cmd: AudioCommand) {
        let _ = self.command_tx.try_send(cmd);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.try_send(AudioCommand::Shutdown);
    }
}
