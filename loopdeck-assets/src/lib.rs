//! Sound catalog for LoopDeck - loading, decoding, and caching
//!
//! This crate owns everything between an asset file on disk and a decoded
//! PCM buffer ready for the audio engine:
//! - Catalog: key -> sound descriptor mapping, loaded from YAML
//! - Decode: symphonia decoding plus resampling to the engine rate
//! - Cache: bounded decoded-buffer cache with container-format fallback
//! - Loader: batched preloading with progress reporting

mod buffer;
mod cache;
mod catalog;
mod config;
mod decode;
mod loader;

pub use buffer::{AudioBuffer, SharedBuffer};
pub use cache::{alternate_path, BufferCache, LoadFailure, DEFAULT_CACHE_CAPACITY};
pub use catalog::{
    CatalogError, SoundCatalog, SoundCategory, SoundDescriptor, SoundSource, VisualHints,
    DEFAULT_CATALOG_YAML, SUPPORTED_EXTENSIONS,
};
pub use config::Config;
pub use decode::{decode_bytes, decode_file, LoadError};
pub use loader::{preload, LoadProgress, PreloadResult, SoundBank, PRELOAD_WORKERS};
