//! One-shot playback voices
//!
//! A voice is the transient gain+pan stage of a single triggered sound. It
//! is created at fire time, mixes additively into a stereo block each
//! process call, and is dropped as soon as its source runs dry. No per-sound
//! state outlives the voice.

use crate::bus::pan_gains;
use crate::stream::StreamSource;
use crate::track::TrackId;
use loopdeck_assets::SharedBuffer;

/// Audio data behind a voice.
pub enum VoiceSource {
    /// Cached decoded buffer
    Buffer(SharedBuffer),
    /// Streaming fallback fed by a worker thread
    Stream(StreamSource),
}

/// A playing one-shot.
pub struct Voice {
    source: VoiceSource,
    /// Track bus this voice belongs to; None plays on the master bus
    pub track: Option<TrackId>,
    /// Per-call linear gain (transient stage, on top of the track bus)
    gain: f32,
    gain_l: f32,
    gain_r: f32,
    /// Frames to wait inside the next block before the first sample
    delay_frames: usize,
    /// Frames already consumed from a buffer source
    position: usize,
    finished: bool,
}

impl Voice {
    /// `delay_frames` positions the voice sample-accurately within the block
    /// that spawned it.
    pub fn new(
        source: VoiceSource,
        track: Option<TrackId>,
        gain: f32,
        pan: f32,
        delay_frames: usize,
    ) -> Self {
        let (gain_l, gain_r) = pan_gains(pan);
        Self {
            source,
            track,
            gain,
            gain_l,
            gain_r,
            delay_frames,
            position: 0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Mix into an interleaved stereo block. Additive; the caller clears or
    /// pre-fills the buffer.
    pub fn mix(&mut self, out: &mut [f32]) {
        let frames = out.len() / 2;
        let start = self.delay_frames.min(frames);
        self.delay_frames -= start;
        if self.delay_frames > 0 {
            // Delay spans past this block entirely.
            return;
        }

        match &mut self.source {
            VoiceSource::Buffer(buffer) => {
                for frame in start..frames {
                    if self.position >= buffer.frames() {
                        self.finished = true;
                        break;
                    }
                    let (l, r) = buffer.frame(self.position);
                    out[frame * 2] += l * self.gain * self.gain_l;
                    out[frame * 2 + 1] += r * self.gain * self.gain_r;
                    self.position += 1;
                }
                if self.position >= buffer.frames() {
                    self.finished = true;
                }
            }
            VoiceSource::Stream(stream) => {
                for frame in start..frames {
                    match stream.pop_frame() {
                        Some((l, r)) => {
                            out[frame * 2] += l * self.gain * self.gain_l;
                            out[frame * 2 + 1] += r * self.gain * self.gain_r;
                        }
                        None => {
                            if stream.is_exhausted() {
                                self.finished = true;
                            }
                            // Underrun: leave the rest of the block silent.
                            break;
                        }
                    }
                }
                if stream.is_exhausted() {
                    self.finished = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopdeck_assets::AudioBuffer;
    use std::sync::Arc;

    fn buffer_voice(samples: Vec<f32>, gain: f32, pan: f32, delay: usize) -> Voice {
        let buffer = Arc::new(AudioBuffer::new(samples, 1, 48000));
        Voice::new(VoiceSource::Buffer(buffer), None, gain, pan, delay)
    }

    #[test]
    fn test_buffer_voice_mixes_and_finishes() {
        let mut voice = buffer_voice(vec![1.0, 1.0], 0.5, 0.0, 0);
        let mut out = vec![0.0f32; 8];
        voice.mix(&mut out);

        let (l, r) = pan_gains(0.0);
        assert!((out[0] - 0.5 * l).abs() < 1e-6);
        assert!((out[1] - 0.5 * r).abs() < 1e-6);
        assert!((out[2] - 0.5 * l).abs() < 1e-6);
        // Past the buffer end: untouched.
        assert_eq!(out[4], 0.0);
        assert!(voice.is_finished());
    }

    #[test]
    fn test_voice_delay_offsets_start_within_block() {
        let mut voice = buffer_voice(vec![1.0], 1.0, -1.0, 3);
        let mut out = vec![0.0f32; 12];
        voice.mix(&mut out);

        // Frames 0..3 silent, frame 3 carries the sample hard left.
        assert_eq!(&out[..6], &[0.0; 6]);
        assert!((out[6] - 1.0).abs() < 1e-6);
        assert!(out[7].abs() < 1e-6);
        assert!(voice.is_finished());
    }

    #[test]
    fn test_voice_delay_spanning_blocks() {
        let mut voice = buffer_voice(vec![1.0], 1.0, 0.0, 6);
        let mut first = vec![0.0f32; 8]; // 4 frames
        voice.mix(&mut first);
        assert_eq!(first, vec![0.0; 8]);
        assert!(!voice.is_finished());

        let mut second = vec![0.0f32; 8];
        voice.mix(&mut second);
        // Two frames of remaining delay, then the sample.
        assert_eq!(second[..4], [0.0; 4]);
        assert!(second[4] > 0.0);
        assert!(voice.is_finished());
    }

    #[test]
    fn test_voices_mix_additively() {
        let mut a = buffer_voice(vec![0.25], 1.0, 0.0, 0);
        let mut b = buffer_voice(vec![0.25], 1.0, 0.0, 0);
        let mut out = vec![0.0f32; 4];
        a.mix(&mut out);
        b.mix(&mut out);
        let (l, _) = pan_gains(0.0);
        assert!((out[0] - 0.5 * l).abs() < 1e-6);
    }
}
