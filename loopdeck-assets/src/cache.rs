//! Bounded decoded-buffer cache with container-format fallback
//!
//! The cache is owned by a single thread (the control thread); a lookup that
//! misses triggers a synchronous read+decode. Eviction is strict FIFO by
//! insertion order, bounded at a fixed capacity. A path that fails to decode
//! is retried once under the alternate container extension; a successful
//! alternate is remembered for the rest of the session so later lookups skip
//! the dead format entirely.

use crate::buffer::AudioBuffer;
use crate::decode::{decode_file, LoadError};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum number of decoded buffers kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

/// The two container formats assets ship in; fallback swaps between them.
const FORMAT_PAIR: (&str, &str) = ("ogg", "wav");

/// Non-fatal record of an asset that failed both load attempts.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Bounded FIFO cache of decoded buffers plus the session's format-fallback
/// memory.
pub struct BufferCache {
    capacity: usize,
    target_sample_rate: u32,
    entries: HashMap<PathBuf, Arc<AudioBuffer>>,
    /// Insertion order; front is evicted first.
    order: VecDeque<PathBuf>,
    /// Requested path -> alternate path known to decode. Grows monotonically.
    fallback: HashMap<PathBuf, PathBuf>,
    /// Diagnostics for assets that failed both attempts.
    load_failures: Vec<LoadFailure>,
}

impl BufferCache {
    pub fn new(target_sample_rate: u32) -> Self {
        Self::with_capacity(target_sample_rate, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(target_sample_rate: u32, capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            target_sample_rate,
            entries: HashMap::new(),
            order: VecDeque::new(),
            fallback: HashMap::new(),
            load_failures: Vec::new(),
        }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.load_failures
    }

    /// Cached buffer for `path`, honoring the fallback map, without any IO.
    pub fn get(&self, path: &Path) -> Option<Arc<AudioBuffer>> {
        let effective = self.fallback.get(path).map(|p| p.as_path()).unwrap_or(path);
        self.entries.get(effective).cloned()
    }

    /// The alternate-format path for `path`, if one is recorded.
    pub fn fallback_for(&self, path: &Path) -> Option<&Path> {
        self.fallback.get(path).map(|p| p.as_path())
    }

    /// Resolve `path` to a decoded buffer, loading and caching on miss.
    ///
    /// On a decode or read failure the extension is swapped to the alternate
    /// container format and the load retried once; success records the
    /// mapping so the next call goes straight to the working format. Both
    /// attempts failing records a diagnostic entry and returns the first
    /// error.
    pub fn load(&mut self, path: &Path) -> Result<Arc<AudioBuffer>, LoadError> {
        if let Some(hit) = self.get(path) {
            return Ok(hit);
        }

        match decode_file(path, self.target_sample_rate) {
            Ok(buffer) => Ok(self.insert(path.to_path_buf(), buffer)),
            Err(primary_err) => {
                let Some(alternate) = alternate_path(path) else {
                    self.record_failure(path, &primary_err);
                    return Err(primary_err);
                };

                // The alternate may already be cached from another descriptor.
                if let Some(hit) = self.entries.get(&alternate).cloned() {
                    self.fallback.insert(path.to_path_buf(), alternate);
                    return Ok(hit);
                }

                match decode_file(&alternate, self.target_sample_rate) {
                    Ok(buffer) => {
                        warn!(
                            requested = %path.display(),
                            used = %alternate.display(),
                            "asset format fallback"
                        );
                        self.fallback.insert(path.to_path_buf(), alternate.clone());
                        Ok(self.insert(alternate, buffer))
                    }
                    Err(_) => {
                        self.record_failure(path, &primary_err);
                        Err(primary_err)
                    }
                }
            }
        }
    }

    /// Insert an externally decoded buffer, evicting FIFO as needed.
    ///
    /// `requested` is the path the caller asked for; when the decode actually
    /// happened under an alternate format, pass it as `actual` so the
    /// fallback map learns the redirect.
    pub fn insert_decoded(
        &mut self,
        requested: &Path,
        actual: PathBuf,
        buffer: AudioBuffer,
    ) -> Arc<AudioBuffer> {
        if requested != actual.as_path() {
            self.fallback.insert(requested.to_path_buf(), actual.clone());
        }
        self.insert(actual, buffer)
    }

    /// Record a failed load so batch callers can continue.
    pub fn record_failure(&mut self, path: &Path, err: &LoadError) {
        warn!(path = %path.display(), error = %err, "asset load failed");
        self.load_failures.push(LoadFailure {
            path: path.to_path_buf(),
            message: err.to_string(),
        });
    }

    fn insert(&mut self, path: PathBuf, buffer: AudioBuffer) -> Arc<AudioBuffer> {
        if let Some(existing) = self.entries.get(&path) {
            return existing.clone();
        }

        // Evict earliest-inserted entries until the new one fits. The whole
        // check-insert-evict sequence runs on the single owning thread.
        while self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                debug!(path = %oldest.display(), "evicting cached buffer");
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }

        let arc = Arc::new(buffer);
        self.entries.insert(path.clone(), arc.clone());
        self.order.push_back(path);
        arc
    }

    /// Drop every cached buffer. Fallback knowledge survives; it describes
    /// the environment, not the cache contents.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Swap a path's extension between the two shipped container formats.
///
/// Unknown extensions fall back to the pair's second format, which is the
/// one every build decodes.
pub fn alternate_path(path: &Path) -> Option<PathBuf> {
    let ext = path.extension().and_then(|e| e.to_str())?;
    let (primary, secondary) = FORMAT_PAIR;
    let alternate = if ext.eq_ignore_ascii_case(primary) {
        secondary
    } else if ext.eq_ignore_ascii_case(secondary) {
        primary
    } else {
        secondary
    };
    Some(path.with_extension(alternate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize) -> AudioBuffer {
        AudioBuffer::new(vec![0.25; frames], 1, 48000)
    }

    fn cache_with(capacity: usize) -> BufferCache {
        BufferCache::with_capacity(48000, capacity)
    }

    #[test]
    fn test_alternate_path_swaps_pair() {
        assert_eq!(
            alternate_path(Path::new("sounds/kick.ogg")),
            Some(PathBuf::from("sounds/kick.wav"))
        );
        assert_eq!(
            alternate_path(Path::new("sounds/kick.wav")),
            Some(PathBuf::from("sounds/kick.ogg"))
        );
        assert_eq!(
            alternate_path(Path::new("sounds/kick.mp3")),
            Some(PathBuf::from("sounds/kick.wav"))
        );
        assert_eq!(alternate_path(Path::new("noext")), None);
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = cache_with(4);
        let path = Path::new("a.wav");
        cache.insert_decoded(path, path.to_path_buf(), tone(10));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(path).is_some());
        assert!(cache.get(Path::new("b.wav")).is_none());
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let mut cache = cache_with(50);
        for i in 0..50 {
            let p = PathBuf::from(format!("s{i}.wav"));
            cache.insert_decoded(&p, p.clone(), tone(4));
        }
        assert_eq!(cache.len(), 50);

        // The 51st distinct path evicts exactly the earliest-inserted entry.
        let p = PathBuf::from("s50.wav");
        cache.insert_decoded(&p, p.clone(), tone(4));
        assert_eq!(cache.len(), 50);
        assert!(cache.get(Path::new("s0.wav")).is_none());
        assert!(cache.get(Path::new("s1.wav")).is_some());
        assert!(cache.get(Path::new("s50.wav")).is_some());
    }

    #[test]
    fn test_eviction_is_insertion_order_not_recency() {
        let mut cache = cache_with(2);
        for name in ["a.wav", "b.wav"] {
            let p = PathBuf::from(name);
            cache.insert_decoded(&p, p.clone(), tone(4));
        }
        // Touch "a" repeatedly; FIFO must still evict it first.
        for _ in 0..5 {
            assert!(cache.get(Path::new("a.wav")).is_some());
        }
        let p = PathBuf::from("c.wav");
        cache.insert_decoded(&p, p.clone(), tone(4));
        assert!(cache.get(Path::new("a.wav")).is_none());
        assert!(cache.get(Path::new("b.wav")).is_some());
    }

    #[test]
    fn test_fallback_map_redirects_get() {
        let mut cache = cache_with(4);
        let requested = Path::new("kick.ogg");
        let actual = PathBuf::from("kick.wav");
        cache.insert_decoded(requested, actual.clone(), tone(8));

        assert_eq!(cache.fallback_for(requested), Some(actual.as_path()));
        assert!(cache.get(requested).is_some());
        assert!(cache.get(&actual).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_duplicate_insert_keeps_single_entry() {
        let mut cache = cache_with(4);
        let p = PathBuf::from("a.wav");
        let first = cache.insert_decoded(&p, p.clone(), tone(8));
        let second = cache.insert_decoded(&p, p.clone(), tone(16));
        assert_eq!(cache.len(), 1);
        // First insert wins; the second returns the existing handle.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_load_missing_both_formats_records_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache_with(4);
        let missing = dir.path().join("ghost.ogg");

        let result = cache.load(&missing);
        assert!(result.is_err());
        assert_eq!(cache.load_failures().len(), 1);
        assert_eq!(cache.load_failures()[0].path, missing);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_falls_back_to_alternate_format() {
        let dir = tempfile::tempdir().unwrap();

        // Only the wav variant exists on disk.
        let wav_path = dir.path().join("kick.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
        for _ in 0..480 {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut cache = cache_with(4);
        let ogg_path = dir.path().join("kick.ogg");
        let buffer = cache.load(&ogg_path).unwrap();
        assert_eq!(buffer.frames(), 480);
        assert_eq!(cache.fallback_for(&ogg_path), Some(wav_path.as_path()));

        // Second load is a pure cache hit through the fallback map.
        let again = cache.load(&ogg_path).unwrap();
        assert!(Arc::ptr_eq(&buffer, &again));
        assert!(cache.load_failures().is_empty());
    }
}
