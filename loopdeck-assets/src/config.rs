//! Simple configuration persistence for LoopDeck
//!
//! Stores user preferences like asset and export directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing the sound assets
    pub assets_dir: PathBuf,
    /// Optional catalog file; the built-in catalog is used when unset
    pub catalog_file: Option<PathBuf>,
    /// Directory exported mixes are written to
    pub export_dir: PathBuf,
    /// Engine sample rate in Hz
    pub sample_rate: u32,
    /// Default tempo in beats per minute
    pub bpm: f32,
    /// Whether quantize starts enabled
    pub quantize: bool,
    /// Maximum number of decoded buffers kept in memory
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            catalog_file: None,
            export_dir: PathBuf::from("."),
            sample_rate: 48000,
            bpm: 120.0,
            quantize: false,
            cache_capacity: crate::cache::DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.serialize();
        fs::write(path, content)
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loopdeck")
            .join("config.txt")
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                match key {
                    "assets_dir" => {
                        if !value.is_empty() {
                            config.assets_dir = PathBuf::from(value);
                        }
                    }
                    "catalog_file" => {
                        if !value.is_empty() {
                            config.catalog_file = Some(PathBuf::from(value));
                        }
                    }
                    "export_dir" => {
                        if !value.is_empty() {
                            config.export_dir = PathBuf::from(value);
                        }
                    }
                    "sample_rate" => {
                        if let Ok(v) = value.parse() {
                            config.sample_rate = v;
                        }
                    }
                    "bpm" => {
                        if let Ok(v) = value.parse::<f32>() {
                            if v.is_finite() && v > 0.0 {
                                config.bpm = v;
                            }
                        }
                    }
                    "quantize" => {
                        config.quantize = value == "true" || value == "1";
                    }
                    "cache_capacity" => {
                        if let Ok(v) = value.parse::<usize>() {
                            if v > 0 {
                                config.cache_capacity = v;
                            }
                        }
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = Vec::new();
        lines.push("# LoopDeck Configuration".to_string());
        lines.push(format!("assets_dir={}", self.assets_dir.display()));
        if let Some(ref catalog) = self.catalog_file {
            lines.push(format!("catalog_file={}", catalog.display()));
        }
        lines.push(format!("export_dir={}", self.export_dir.display()));
        lines.push(format!("sample_rate={}", self.sample_rate));
        lines.push(format!("bpm={}", self.bpm));
        lines.push(format!("quantize={}", self.quantize));
        lines.push(format!("cache_capacity={}", self.cache_capacity));
        lines.join("\n")
    }
}
