//! Session facade - the control-thread surface of the engine
//!
//! Owns the asset side (catalog, cache, bank) and talks to the audio thread
//! through commands. Playback routing lives here: a key press resolves to a
//! cached buffer when possible, falls back to a streaming voice otherwise,
//! and degrades to a logged no-op instead of failing the caller.

use crate::engine::{AudioCommand, EngineHandle, EngineState, SessionSnapshot};
use crate::render::{self, ExportError, ExportOptions, ExportProgress, ExportResult};
use crate::stream::StreamSource;
use crate::track::TrackId;
use crate::voice::VoiceSource;
use crossbeam_channel::Sender;
use loopdeck_assets::{preload, BufferCache, LoadProgress, PreloadResult, SoundBank, SoundCatalog};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Control-thread handle to a running engine.
pub struct Session {
    state: Arc<Mutex<EngineState>>,
    handle: EngineHandle,
    catalog: SoundCatalog,
    assets_dir: PathBuf,
    export_dir: PathBuf,
    cache: BufferCache,
    bank: Arc<SoundBank>,
    next_track_id: u32,
    epoch: Instant,
}

impl Session {
    pub fn new(
        state: Arc<Mutex<EngineState>>,
        handle: EngineHandle,
        catalog: SoundCatalog,
        assets_dir: PathBuf,
        export_dir: PathBuf,
        cache: BufferCache,
    ) -> Self {
        Self {
            state,
            handle,
            catalog,
            assets_dir,
            export_dir,
            cache,
            bank: Arc::new(SoundBank::default()),
            next_track_id: 0,
            epoch: Instant::now(),
        }
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Milliseconds since session start; the timestamp source for recording.
    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    /// Decode the whole catalog into the cache and hand the bank to the
    /// engine. Progress arrives on the optional channel.
    pub fn preload(&mut self, progress: Option<Sender<LoadProgress>>) -> PreloadResult {
        let result = preload(&self.catalog, &self.assets_dir, &mut self.cache, progress);
        self.bank = Arc::new(result.bank.clone());
        self.handle.send(AudioCommand::SetBank(self.bank.clone()));
        result
    }

    // --- track management ---

    pub fn add_track(&mut self, name: impl Into<String>) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;
        self.handle.send(AudioCommand::AddTrack {
            id,
            name: name.into(),
        });
        id
    }

    pub fn remove_track(&mut self, id: TrackId) {
        self.handle.send(AudioCommand::RemoveTrack(id));
    }

    // --- recording ---

    pub fn start_recording(&self, id: TrackId) {
        self.handle.send(AudioCommand::StartRecording {
            track: id,
            at_ms: self.now_ms(),
        });
    }

    pub fn stop_recording(&self, id: TrackId) {
        self.handle.send(AudioCommand::StopRecording {
            track: id,
            at_ms: self.now_ms(),
        });
    }

    /// A key-press notification from the UI collaborator: always plays the
    /// sound through the track's bus, and lands in the take when that track
    /// is recording.
    pub fn key_press(&mut self, key: char, track: Option<TrackId>) -> bool {
        if let Some(id) = track {
            self.handle.send(AudioCommand::RecordKeyPress {
                track: id,
                key,
                at_ms: self.now_ms(),
            });
        }
        self.play_sound(key, track, 0.0, 0.0)
    }

    // --- playback routing ---

    /// Play a catalog sound now. Returns false only when the key is unknown;
    /// every other failure degrades to a logged silent no-op inside the
    /// engine or the stream worker.
    pub fn play_sound(
        &mut self,
        key: char,
        track: Option<TrackId>,
        gain_db: f32,
        pan: f32,
    ) -> bool {
        let Some(descriptor) = self.catalog.get(key) else {
            debug!(key = %key, "unknown sound key");
            return false;
        };

        // Cached buffer: one-shot sampler voice.
        if self.bank.contains(key) {
            self.handle.send(AudioCommand::Trigger {
                key,
                track,
                gain_db,
                pan,
                source: None,
            });
            return true;
        }

        let path = self.assets_dir.join(descriptor.preferred_source());
        if let Some(buffer) = self.cache.get(&path) {
            // Cached under this path (or its known-good alternate) but not
            // banked yet; bank it so loop fires can resolve it too.
            let mut bank = (*self.bank).clone();
            bank.insert(key, buffer.clone());
            self.bank = Arc::new(bank);
            self.handle.send(AudioCommand::SetBank(self.bank.clone()));
            self.handle.send(AudioCommand::Trigger {
                key,
                track,
                gain_db,
                pan,
                source: Some(VoiceSource::Buffer(buffer)),
            });
            return true;
        }

        // Not cached: stream from disk. A recorded format fallback from an
        // earlier attempt short-circuits straight to the working container.
        let stream_path = self
            .cache
            .fallback_for(&path)
            .map(Path::to_path_buf)
            .unwrap_or(path);
        warn!(key = %key, path = %stream_path.display(), "buffer not cached, streaming");
        let source = StreamSource::open(stream_path, self.cache.target_sample_rate());
        self.handle.send(AudioCommand::Trigger {
            key,
            track,
            gain_db,
            pan,
            source: Some(VoiceSource::Stream(source)),
        });
        true
    }

    /// Independent one-shot playback of an arbitrary asset file (ambient and
    /// UI sounds), straight to the master bus with its own format fallback.
    pub fn play_one_shot(&mut self, path: &Path, gain_db: f32, pan: f32) -> bool {
        match self.cache.load(path) {
            Ok(buffer) => {
                self.handle.send(AudioCommand::Trigger {
                    key: '\0',
                    track: None,
                    gain_db,
                    pan,
                    source: Some(VoiceSource::Buffer(buffer)),
                });
                true
            }
            Err(err) => {
                // Last resort: the streaming player; it degrades to silence
                // on its own if the asset is truly unreadable.
                warn!(path = %path.display(), error = %err, "one-shot falling back to stream");
                let source = StreamSource::open(path.to_path_buf(), self.cache.target_sample_rate());
                self.handle.send(AudioCommand::Trigger {
                    key: '\0',
                    track: None,
                    gain_db,
                    pan,
                    source: Some(VoiceSource::Stream(source)),
                });
                true
            }
        }
    }

    // --- loops and mixing ---

    pub fn start_loop(&self, id: TrackId) {
        self.handle.send(AudioCommand::StartLoop(id));
    }

    pub fn stop_loop(&self, id: TrackId) {
        self.handle.send(AudioCommand::StopLoop(id));
    }

    pub fn toggle_all_loops(&self) {
        self.handle.send(AudioCommand::ToggleAllLoops);
    }

    pub fn set_track_volume(&self, id: TrackId, db: f32) {
        self.handle.send(AudioCommand::SetTrackVolume { track: id, db });
    }

    pub fn set_track_pan(&self, id: TrackId, pan: f32) {
        self.handle.send(AudioCommand::SetTrackPan { track: id, pan });
    }

    pub fn toggle_mute(&self, id: TrackId) {
        self.handle.send(AudioCommand::ToggleMute(id));
    }

    pub fn toggle_solo(&self, id: TrackId) {
        self.handle.send(AudioCommand::ToggleSolo(id));
    }

    pub fn set_bpm(&self, bpm: f32) {
        self.handle.send(AudioCommand::SetBpm(bpm));
    }

    pub fn set_quantize(&self, on: bool) {
        self.handle.send(AudioCommand::SetQuantize(on));
    }

    pub fn set_master_volume(&self, db: f32) {
        self.handle.send(AudioCommand::SetMasterVolume(db));
    }

    /// Read-only view of live state for the UI.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().snapshot()
    }

    // --- export ---

    /// Offline render of the current tracks to a WAV file in the export
    /// directory. Works on a deep copy of the track list; live playback
    /// state is untouched whether the export succeeds or fails.
    pub fn export_mix(
        &mut self,
        options: &ExportOptions,
        progress: Option<&Sender<ExportProgress>>,
    ) -> Result<ExportResult, ExportError> {
        let tracks = self.state.lock().clone_tracks();

        let bank = self.bank.clone();
        let catalog = &self.catalog;
        let assets_dir = &self.assets_dir;
        let cache = &mut self.cache;
        let mut resolve = |key: char| {
            if let Some(buffer) = bank.get(key) {
                return Some(buffer);
            }
            let descriptor = catalog.get(key)?;
            cache.load(&assets_dir.join(descriptor.preferred_source())).ok()
        };

        render::export_mix(&tracks, &mut resolve, options, &self.export_dir, progress)
    }

    pub fn shutdown(&self) {
        self.handle.shutdown();
    }
}
