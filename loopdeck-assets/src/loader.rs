//! Batched asset preloading with progress reporting
//!
//! Decoding happens on a small worker pool; cache insertion stays on the
//! calling thread so the cache keeps its single-writer discipline. Partial
//! failures never abort the batch.

use crate::buffer::AudioBuffer;
use crate::cache::{alternate_path, BufferCache};
use crate::catalog::SoundCatalog;
use crate::decode::{decode_file, LoadError};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Number of assets decoded concurrently during preload.
pub const PRELOAD_WORKERS: usize = 5;

/// Progress updates during batch preloading
#[derive(Debug, Clone)]
pub enum LoadProgress {
    /// Preload started
    Started { total: usize },
    /// One asset finished decoding
    Loaded {
        current: usize,
        total: usize,
        path: PathBuf,
    },
    /// One asset failed both format attempts
    Failed {
        current: usize,
        total: usize,
        path: PathBuf,
        message: String,
    },
    /// Preload finished
    Complete { loaded: usize, failed: usize },
}

impl LoadProgress {
    /// Monotonic 0-100 percentage for progress bars.
    pub fn percent(&self) -> u8 {
        match self {
            LoadProgress::Started { .. } => 0,
            LoadProgress::Loaded { current, total, .. }
            | LoadProgress::Failed { current, total, .. } => {
                if *total == 0 {
                    100
                } else {
                    ((current * 100) / total) as u8
                }
            }
            LoadProgress::Complete { .. } => 100,
        }
    }
}

/// Decoded buffers keyed by sound key - the arena the engine resolves
/// against at trigger time. Immutable once handed to the engine; preloading
/// again produces a fresh bank.
#[derive(Debug, Clone, Default)]
pub struct SoundBank {
    buffers: HashMap<char, Arc<AudioBuffer>>,
}

impl SoundBank {
    pub fn get(&self, key: char) -> Option<Arc<AudioBuffer>> {
        self.buffers.get(&key).cloned()
    }

    pub fn insert(&mut self, key: char, buffer: Arc<AudioBuffer>) {
        self.buffers.insert(key, buffer);
    }

    pub fn contains(&self, key: char) -> bool {
        self.buffers.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Result of a batch preload
pub struct PreloadResult {
    pub bank: SoundBank,
    pub loaded: usize,
    pub failed: usize,
}

/// Outcome of decoding one path on a worker.
enum Decoded {
    Ok { actual: PathBuf, buffer: AudioBuffer },
    Err(LoadError),
}

/// Load every distinct catalog source into the cache and build the bank.
///
/// Sources already cached are reused without IO. Progress is emitted per
/// completed path in completion order; percentages are non-decreasing.
pub fn preload(
    catalog: &SoundCatalog,
    base_dir: &Path,
    cache: &mut BufferCache,
    progress: Option<Sender<LoadProgress>>,
) -> PreloadResult {
    let all = catalog.distinct_sources(base_dir);

    // Split into cache hits and paths that need decoding.
    let mut pending = Vec::new();
    let mut done = 0usize;
    for path in &all {
        if cache.get(path).is_none() {
            pending.push(path.clone());
        } else {
            done += 1;
        }
    }

    let total = all.len();
    if let Some(ref tx) = progress {
        let _ = tx.send(LoadProgress::Started { total });
    }

    let mut failed = 0usize;
    let results = decode_pool(&pending, cache.target_sample_rate());

    let mut current = done;
    for (path, outcome) in results {
        current += 1;
        match outcome {
            Decoded::Ok { actual, buffer } => {
                cache.insert_decoded(&path, actual, buffer);
                if let Some(ref tx) = progress {
                    let _ = tx.send(LoadProgress::Loaded {
                        current,
                        total,
                        path,
                    });
                }
            }
            Decoded::Err(err) => {
                failed += 1;
                let message = err.to_string();
                cache.record_failure(&path, &err);
                if let Some(ref tx) = progress {
                    let _ = tx.send(LoadProgress::Failed {
                        current,
                        total,
                        path,
                        message,
                    });
                }
            }
        }
    }

    // Attach resolved buffers onto the catalog's keys.
    let mut bank = SoundBank::default();
    for desc in catalog.sounds() {
        let path = base_dir.join(desc.preferred_source());
        if let Some(buffer) = cache.get(&path) {
            bank.insert(desc.key, buffer);
        }
    }

    let loaded = total - failed;
    info!(loaded, failed, "preload complete");
    if let Some(ref tx) = progress {
        let _ = tx.send(LoadProgress::Complete { loaded, failed });
    }

    PreloadResult {
        bank,
        loaded,
        failed,
    }
}

/// Decode `paths` on up to `PRELOAD_WORKERS` threads, with the two-tier
/// format fallback applied per path. Returns results in completion order.
fn decode_pool(paths: &[PathBuf], target_rate: u32) -> Vec<(PathBuf, Decoded)> {
    if paths.is_empty() {
        return Vec::new();
    }

    let queue = Mutex::new(paths.to_vec());
    let results = Mutex::new(Vec::with_capacity(paths.len()));
    let workers = PRELOAD_WORKERS.min(paths.len());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let path = {
                    let mut queue = queue.lock().unwrap();
                    match queue.pop() {
                        Some(p) => p,
                        None => break,
                    }
                };

                let outcome = decode_with_fallback(&path, target_rate);
                results.lock().unwrap().push((path, outcome));
            });
        }
    });

    results.into_inner().unwrap()
}

fn decode_with_fallback(path: &Path, target_rate: u32) -> Decoded {
    match decode_file(path, target_rate) {
        Ok(buffer) => Decoded::Ok {
            actual: path.to_path_buf(),
            buffer,
        },
        Err(primary_err) => match alternate_path(path) {
            Some(alt) => match decode_file(&alt, target_rate) {
                Ok(buffer) => Decoded::Ok {
                    actual: alt,
                    buffer,
                },
                Err(_) => Decoded::Err(primary_err),
            },
            None => Decoded::Err(primary_err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SoundCatalog;

    fn write_wav(path: &Path, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(2000i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn two_sound_catalog() -> SoundCatalog {
        SoundCatalog::from_yaml(
            r#"
sounds:
  - key: a
    name: kick
    source: [kick.ogg, kick.wav]
  - key: s
    name: snare
    source: [snare.ogg, snare.wav]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_preload_attaches_buffers_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("kick.wav"), 100);
        write_wav(&dir.path().join("snare.wav"), 200);

        let catalog = two_sound_catalog();
        let mut cache = BufferCache::with_capacity(48000, 8);
        let (tx, rx) = crossbeam_channel::unbounded();

        let result = preload(&catalog, dir.path(), &mut cache, Some(tx));

        // Both sounds resolved through the ogg->wav fallback.
        assert_eq!(result.loaded, 2);
        assert_eq!(result.failed, 0);
        assert_eq!(result.bank.len(), 2);
        assert_eq!(result.bank.get('a').unwrap().frames(), 100);
        assert_eq!(result.bank.get('s').unwrap().frames(), 200);

        let updates: Vec<LoadProgress> = rx.try_iter().collect();
        assert!(matches!(updates.first(), Some(LoadProgress::Started { total: 2 })));
        assert!(matches!(
            updates.last(),
            Some(LoadProgress::Complete { loaded: 2, failed: 0 })
        ));

        // Percentages never decrease.
        let percents: Vec<u8> = updates.iter().map(|u| u.percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[test]
    fn test_preload_partial_failure_continues() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("kick.wav"), 100);
        // snare missing in both formats

        let catalog = two_sound_catalog();
        let mut cache = BufferCache::with_capacity(48000, 8);
        let result = preload(&catalog, dir.path(), &mut cache, None);

        assert_eq!(result.loaded, 1);
        assert_eq!(result.failed, 1);
        assert!(result.bank.contains('a'));
        assert!(!result.bank.contains('s'));
        assert_eq!(cache.load_failures().len(), 1);
    }

    #[test]
    fn test_preload_reuses_cached_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("kick.wav"), 100);
        write_wav(&dir.path().join("snare.wav"), 200);

        let catalog = two_sound_catalog();
        let mut cache = BufferCache::with_capacity(48000, 8);

        let first = preload(&catalog, dir.path(), &mut cache, None);
        let second = preload(&catalog, dir.path(), &mut cache, None);

        assert_eq!(second.loaded, 2);
        assert!(Arc::ptr_eq(
            &first.bank.get('a').unwrap(),
            &second.bank.get('a').unwrap()
        ));
    }
}
