//! WAV encoding for exported mixes
//!
//! Canonical RIFF/WAVE output: 16-bit signed little-endian interleaved PCM,
//! samples clamped to [-1, 1] before integer conversion.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;

/// Encode interleaved f32 samples to an in-memory WAV file.
pub fn encode_wav(
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write an encoded mix to disk.
pub fn write_wav_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

/// Fixed export naming convention: whole minutes when they divide evenly,
/// seconds otherwise.
pub fn export_filename(duration_secs: f64) -> String {
    let secs = duration_secs.round() as u64;
    if secs >= 60 && secs % 60 == 0 {
        format!("LoopDeck_Mix_{}min.wav", secs / 60)
    } else {
        format!("LoopDeck_Mix_{}s.wav", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
    }

    #[test]
    fn test_riff_header_fields() {
        let samples = vec![0.0f32; 400]; // 200 stereo frames
        let bytes = encode_wav(&samples, 2, 48000).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");

        // Canonical PCM header: 16-byte fmt chunk.
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1); // PCM
        assert_eq!(u16_at(&bytes, 22), 2); // channels
        assert_eq!(u32_at(&bytes, 24), 48000); // sample rate
        assert_eq!(u32_at(&bytes, 28), 48000 * 2 * 2); // byte rate
        assert_eq!(u16_at(&bytes, 32), 4); // block align
        assert_eq!(u16_at(&bytes, 34), 16); // bits per sample

        assert_eq!(&bytes[36..40], b"data");
        let data_len = u32_at(&bytes, 40);
        assert_eq!(data_len, 400 * 2); // samples * 2 bytes
        // RIFF chunk size covers everything after the first 8 bytes.
        assert_eq!(u32_at(&bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(bytes.len(), 44 + 800);
    }

    #[test]
    fn test_samples_clamped_before_conversion() {
        let bytes = encode_wav(&[2.0, -2.0, 1.0, -1.0], 2, 44100).unwrap();
        let data = &bytes[44..];
        let s0 = i16::from_le_bytes(data[0..2].try_into().unwrap());
        let s1 = i16::from_le_bytes(data[2..4].try_into().unwrap());
        let s2 = i16::from_le_bytes(data[4..6].try_into().unwrap());
        assert_eq!(s0, i16::MAX);
        assert_eq!(s1, -i16::MAX);
        assert_eq!(s2, i16::MAX);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let samples: Vec<f32> = (0..1000).map(|i| ((i as f32) * 0.01).sin()).collect();
        let a = encode_wav(&samples, 2, 48000).unwrap();
        let b = encode_wav(&samples, 2, 48000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_export_filename_convention() {
        assert_eq!(export_filename(120.0), "LoopDeck_Mix_2min.wav");
        assert_eq!(export_filename(60.0), "LoopDeck_Mix_1min.wav");
        assert_eq!(export_filename(30.0), "LoopDeck_Mix_30s.wav");
        assert_eq!(export_filename(90.0), "LoopDeck_Mix_90s.wav");
    }
}
