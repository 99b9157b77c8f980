//! Audio engine for LoopDeck - transport, recorder, loop scheduler, export
//!
//! This crate provides the core playback pipeline:
//! - Track: recorded key events plus volume/pan/mute/solo
//! - Recorder: the per-track take state machine with quantize
//! - Transport: the shared sample-accurate clock
//! - LoopScheduler: repeating patterns drained block by block
//! - Voice: transient one-shot playback, buffer-backed or streamed
//! - EngineState: single owner of all of the above, driven by commands
//! - MixRenderer: deterministic offline export to RIFF/WAVE

mod bus;
mod engine;
mod pattern;
mod recorder;
mod render;
mod scheduler;
mod session;
mod stream;
mod track;
mod transport;
mod voice;
mod wav;

pub use bus::{db_to_gain, pan_gains, soft_clip, track_stage};
pub use engine::{
    AudioCommand, EngineEvent, EngineHandle, EngineState, SessionSnapshot, TrackSnapshot,
};
pub use pattern::{ms_to_frames, Pattern, PatternStep, LOOP_EPSILON_SECS};
pub use recorder::Recorder;
pub use render::{
    export_mix, render_mix, ExportError, ExportOptions, ExportPhase, ExportProgress,
    ExportResult, RenderedMix, EXPORT_MAX_SECS,
};
pub use scheduler::{Fire, LoopScheduler};
pub use session::Session;
pub use stream::StreamSource;
pub use track::{ActiveTake, Track, TrackEvent, TrackId, VOLUME_MAX_DB, VOLUME_MIN_DB};
pub use transport::Transport;
pub use voice::{Voice, VoiceSource};
pub use wav::{encode_wav, export_filename, write_wav_file};
