//! Sound catalog - the fixed key to sound-asset mapping
//!
//! The catalog is defined once at startup (YAML file or the built-in
//! default) and immutable afterwards. Decoded buffers are never attached to
//! descriptors; they live in the `SoundBank` keyed by the same sound keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Container formats the current build can decode, in preference order.
///
/// Mirrors the symphonia features compiled into this binary; the first entry
/// of a descriptor's source list with a supported extension wins.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["ogg", "wav", "flac", "mp3"];

/// Errors raised while reading a catalog file
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Duplicate sound key '{0}'")]
    DuplicateKey(char),
}

/// Where a sound's audio data lives.
///
/// `MultiFormat` lists identical content in different containers; entries
/// differ only by extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SoundSource {
    Single(PathBuf),
    MultiFormat(Vec<PathBuf>),
}

impl SoundSource {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            SoundSource::Single(p) => std::slice::from_ref(p),
            SoundSource::MultiFormat(ps) => ps,
        }
    }
}

/// Broad grouping used by the UI collaborator for layout and coloring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SoundCategory {
    #[default]
    Drum,
    Bass,
    Melody,
    Ambient,
    Fx,
}

/// Presentation hints consumed by the scene/UI collaborator, carried through
/// untouched by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisualHints {
    pub scale: f32,
    pub lifetime_ms: u32,
    pub pulse: bool,
}

impl Default for VisualHints {
    fn default() -> Self {
        Self {
            scale: 1.0,
            lifetime_ms: 500,
            pulse: false,
        }
    }
}

/// One entry of the sound catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoundDescriptor {
    /// Keyboard key that triggers this sound
    pub key: char,
    pub name: String,
    /// Display color as "#rrggbb"
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub category: SoundCategory,
    pub source: SoundSource,
    #[serde(default)]
    pub hints: VisualHints,
}

fn default_color() -> String {
    "#ffffff".to_string()
}

impl SoundDescriptor {
    /// The source path this runtime should try first: the first listed path
    /// whose container format the build decodes, else the first path.
    pub fn preferred_source(&self) -> &Path {
        self.source
            .paths()
            .iter()
            .find(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
                    .unwrap_or(false)
            })
            .unwrap_or(&self.source.paths()[0])
    }
}

/// The full key to sound mapping, immutable after startup.
#[derive(Debug, Clone)]
pub struct SoundCatalog {
    sounds: Vec<SoundDescriptor>,
    by_key: HashMap<char, usize>,
}

#[derive(Deserialize)]
struct CatalogFile {
    sounds: Vec<SoundDescriptor>,
}

impl SoundCatalog {
    pub fn from_descriptors(sounds: Vec<SoundDescriptor>) -> Result<Self, CatalogError> {
        let mut by_key = HashMap::with_capacity(sounds.len());
        for (i, s) in sounds.iter().enumerate() {
            if by_key.insert(s.key, i).is_some() {
                return Err(CatalogError::DuplicateKey(s.key));
            }
        }
        Ok(Self { sounds, by_key })
    }

    /// Parse a catalog from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(text)?;
        Self::from_descriptors(file.sounds)
    }

    /// Load a catalog file from disk.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// The built-in catalog used when no catalog file is configured.
    pub fn builtin() -> Self {
        Self::from_yaml(DEFAULT_CATALOG_YAML).expect("built-in catalog must parse")
    }

    pub fn get(&self, key: char) -> Option<&SoundDescriptor> {
        self.by_key.get(&key).map(|&i| &self.sounds[i])
    }

    pub fn contains(&self, key: char) -> bool {
        self.by_key.contains_key(&key)
    }

    pub fn sounds(&self) -> &[SoundDescriptor] {
        &self.sounds
    }

    pub fn keys(&self) -> impl Iterator<Item = char> + '_ {
        self.sounds.iter().map(|s| s.key)
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    /// Distinct preferred source paths across the catalog, resolved against
    /// `base_dir`, in catalog order. Input to the batch preloader.
    pub fn distinct_sources(&self, base_dir: &Path) -> Vec<PathBuf> {
        let mut seen = HashMap::new();
        let mut out = Vec::new();
        for desc in &self.sounds {
            let path = base_dir.join(desc.preferred_source());
            if seen.insert(path.clone(), ()).is_none() {
                out.push(path);
            }
        }
        out
    }
}

/// Default catalog: a home-row drum-machine layout.
pub const DEFAULT_CATALOG_YAML: &str = r##"
sounds:
  - key: a
    name: kick
    color: "#e74c3c"
    category: drum
    source: [sounds/kick.ogg, sounds/kick.wav]
    hints: { scale: 1.6, lifetime_ms: 400, pulse: true }
  - key: s
    name: snare
    color: "#e67e22"
    category: drum
    source: [sounds/snare.ogg, sounds/snare.wav]
    hints: { scale: 1.2, lifetime_ms: 350, pulse: true }
  - key: d
    name: hat
    color: "#f1c40f"
    category: drum
    source: [sounds/hat.ogg, sounds/hat.wav]
    hints: { scale: 0.8, lifetime_ms: 200, pulse: false }
  - key: f
    name: clap
    color: "#f39c12"
    category: drum
    source: [sounds/clap.ogg, sounds/clap.wav]
    hints: { scale: 1.0, lifetime_ms: 300, pulse: true }
  - key: g
    name: bass
    color: "#8e44ad"
    category: bass
    source: [sounds/bass.ogg, sounds/bass.wav]
    hints: { scale: 1.4, lifetime_ms: 900, pulse: false }
  - key: h
    name: chord
    color: "#2980b9"
    category: melody
    source: [sounds/chord.ogg, sounds/chord.wav]
    hints: { scale: 1.3, lifetime_ms: 1200, pulse: false }
  - key: j
    name: pluck
    color: "#27ae60"
    category: melody
    source: [sounds/pluck.ogg, sounds/pluck.wav]
    hints: { scale: 1.0, lifetime_ms: 700, pulse: false }
  - key: k
    name: pad
    color: "#16a085"
    category: ambient
    source: [sounds/pad.ogg, sounds/pad.wav]
    hints: { scale: 1.8, lifetime_ms: 2000, pulse: false }
  - key: l
    name: sweep
    color: "#2c3e50"
    category: fx
    source: [sounds/sweep.ogg, sounds/sweep.wav]
    hints: { scale: 2.0, lifetime_ms: 1500, pulse: false }
"##;
