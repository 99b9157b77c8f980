//! Streaming playback fallback
//!
//! When a sound is not in the decoded-buffer cache, the router hands the
//! audio thread a stream source instead: a worker thread decodes the asset
//! and feeds frames through an SPSC ring buffer, so the audio callback never
//! touches the filesystem or the decoder. Underruns produce silence, never
//! blocking.

use loopdeck_assets::{decode_file, LoadError};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Ring capacity in stereo frames (~1/3 s at 48 kHz).
const STREAM_RING_FRAMES: usize = 16384;

/// Audio-thread end of a streaming voice.
pub struct StreamSource {
    consumer: HeapCons<f32>,
    producer_done: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl StreamSource {
    /// Start decoding `path` on a worker thread.
    ///
    /// Decode failures are reported by the worker as a warning and the
    /// stream simply ends; the voice degrades to silence.
    pub fn open(path: PathBuf, target_sample_rate: u32) -> Self {
        let rb = HeapRb::<f32>::new(STREAM_RING_FRAMES * 2);
        let (mut producer, consumer) = rb.split();

        let producer_done = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(AtomicBool::new(false));

        let done_flag = Arc::clone(&producer_done);
        let cancel_flag = Arc::clone(&cancel);

        thread::spawn(move || {
            let result: Result<(), LoadError> = (|| {
                let buffer = decode_file(&path, target_sample_rate)?;

                // Interleave to stereo once; mono sources feed both sides.
                let mut frames = Vec::with_capacity(buffer.frames() * 2);
                for i in 0..buffer.frames() {
                    let (l, r) = buffer.frame(i);
                    frames.push(l);
                    frames.push(r);
                }

                let mut idx = 0;
                while idx < frames.len() {
                    if cancel_flag.load(Ordering::Relaxed) {
                        return Ok(());
                    }
                    let pushed = producer.push_slice(&frames[idx..]);
                    idx += pushed;
                    if pushed == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
                Ok(())
            })();

            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "stream decode failed");
            }
            done_flag.store(true, Ordering::Release);
        });

        Self {
            consumer,
            producer_done,
            cancel,
        }
    }

    /// Pop one stereo frame; None when the ring is momentarily empty.
    #[inline]
    pub fn pop_frame(&mut self) -> Option<(f32, f32)> {
        if self.consumer.occupied_len() < 2 {
            return None;
        }
        let l = self.consumer.try_pop()?;
        let r = self.consumer.try_pop()?;
        Some((l, r))
    }

    /// True once the worker finished and every frame was consumed.
    pub fn is_exhausted(&self) -> bool {
        self.producer_done.load(Ordering::Acquire) && self.consumer.occupied_len() < 2
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_wav(path: &Path, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(8000i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_stream_delivers_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hit.wav");
        write_wav(&path, 2000);

        let mut stream = StreamSource::open(path, 48000);

        let mut got = 0usize;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            match stream.pop_frame() {
                Some((l, r)) => {
                    assert!((l - r).abs() < 1e-6);
                    got += 1;
                }
                None => {
                    if stream.is_exhausted() {
                        break;
                    }
                    assert!(std::time::Instant::now() < deadline, "stream stalled");
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
        assert_eq!(got, 2000);
    }

    #[test]
    fn test_missing_file_ends_stream() {
        let mut stream = StreamSource::open(PathBuf::from("/nonexistent/x.wav"), 48000);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !stream.is_exhausted() {
            assert!(std::time::Instant::now() < deadline, "stream never ended");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(stream.pop_frame().is_none());
    }
}
