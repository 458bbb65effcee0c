// Sound bank - Holds the three decoded click buffers (normal/accent/first)
// The loader publishes a complete set atomically; readers never see a
// half-loaded bank.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::EngineError;

/// One decoded, mono click sound at a known sample rate
#[derive(Debug, Clone)]
pub struct ClickBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl ClickBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the click in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A complete set of click buffers, one per audible accent class
///
/// Buffers are individually reference-counted so a scheduled voice outlives
/// a bank swap without copying sample data.
#[derive(Debug, Clone)]
pub struct ClickSet {
    pub normal: Arc<ClickBuffer>,
    pub accent: Arc<ClickBuffer>,
    pub first: Arc<ClickBuffer>,
}

/// Serializable sound-set description: which files to load for each click
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundSetSpec {
    pub name: String,
    pub normal_path: PathBuf,
    pub accent_path: PathBuf,
    pub first_path: PathBuf,
}

impl SoundSetSpec {
    /// Load a sound-set description from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let json_str = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json_str)?)
    }

    /// Save a sound-set description to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        let json_str = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json_str)?;
        Ok(())
    }
}

/// Shared bank of click buffers
///
/// The scheduler reads the current set on every beat it schedules; the loader
/// installs a freshly built set in one swap. In-flight voices keep their own
/// `Arc` to the buffers they were scheduled with, so a reload never cuts a
/// click short.
#[derive(Clone, Default)]
pub struct SoundBank {
    current: Arc<RwLock<Option<Arc<ClickSet>>>>,
}

impl SoundBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current click set, if one has been installed
    pub fn current(&self) -> Option<Arc<ClickSet>> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    /// Install a complete click set (swap-on-completion)
    pub fn install(&self, set: ClickSet) {
        if let Ok(mut guard) = self.current.write() {
            *guard = Some(Arc::new(set));
        }
    }

    /// Drop the installed set (used when the clock source is rebuilt at a
    /// different sample rate and buffers must be reloaded)
    pub fn clear(&self) {
        if let Ok(mut guard) = self.current.write() {
            *guard = None;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }
}
