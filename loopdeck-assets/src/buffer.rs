//! Decoded PCM buffer shared between the cache and the engine

use std::sync::Arc;

/// A fully decoded audio asset, resampled to the engine sample rate.
///
/// Samples are interleaved f32 normalized to -1.0..1.0. Short one-shot
/// sounds are kept mono when the source is mono; the engine upmixes at
/// playback time.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        debug_assert!(channels == 1 || channels == 2);
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (sample count per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Stereo view of frame `i`; mono sources feed both channels.
    #[inline]
    pub fn frame(&self, i: usize) -> (f32, f32) {
        match self.channels {
            1 => {
                let s = self.samples[i];
                (s, s)
            }
            _ => (self.samples[i * 2], self.samples[i * 2 + 1]),
        }
    }

    /// Rough memory footprint, used for cache diagnostics.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

/// Shared handle the rest of the system passes around.
pub type SharedBuffer = Arc<AudioBuffer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_frame_upmix() {
        let buf = AudioBuffer::new(vec![0.5, -0.5], 1, 48000);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.frame(0), (0.5, 0.5));
        assert_eq!(buf.frame(1), (-0.5, -0.5));
    }

    #[test]
    fn test_stereo_frame() {
        let buf = AudioBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 2, 48000);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.frame(1), (0.3, 0.4));
    }

    #[test]
    fn test_duration() {
        let buf = AudioBuffer::new(vec![0.0; 48000], 1, 48000);
        assert!((buf.duration_secs() - 1.0).abs() < 1e-9);
    }
}
