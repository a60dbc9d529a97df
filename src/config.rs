//! Configuration loading and the persisted model side-channel.
//!
//! Two layers of configuration feed stack setup:
//!
//! - `reduct.toml` in the working directory supplies engine defaults
//!   (`[engine]` table) and default reduction parameters (`[reductions]`
//!   table). CLI flags override file values.
//! - A JSON key/value file attached to a saved model records the reduction
//!   parameters the model was trained with. At setup the stored values win
//!   over conflicting fresh ones, since replaying a model with a different
//!   stack shape would address the wrong weight slices.
//!
//! ## Example
//!
//! ```toml
//! [engine]
//! bits = 20
//! learning-rate = 0.25
//!
//! [reductions]
//! autolink = 2
//! autorate = 3
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration with file values folded over defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// log2 of the weight-vector capacity.
    pub bits: u8,
    /// Base learning rate of the innermost optimizer.
    pub learning_rate: f32,
    /// Default polynomial term count for the augmentation reduction.
    pub autolink: Option<u32>,
    /// Default half-width for the rate-exploration reduction.
    pub autorate: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bits: 18,
            learning_rate: 0.5,
            autolink: None,
            autorate: None,
        }
    }
}

/// Raw config as deserialized from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    engine: Option<RawEngine>,
    reductions: Option<RawReductions>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawEngine {
    bits: Option<u8>,
    learning_rate: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawReductions {
    autolink: Option<u32>,
    autorate: Option<u32>,
}

impl EngineConfig {
    /// Load configuration from `reduct.toml` in the given directory,
    /// falling back to defaults when the file is absent or malformed.
    pub fn load(directory: &Path) -> Self {
        let path = directory.join("reduct.toml");
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| Self::from_toml_str(&s))
        {
            Ok(config) => config,
            Err(err) => {
                eprintln!("warning: ignoring {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(toml_str).context("parsing reduct.toml")?;
        let engine = raw.engine.unwrap_or_default();
        let reductions = raw.reductions.unwrap_or_default();
        let defaults = Self::default();
        Ok(Self {
            bits: engine.bits.unwrap_or(defaults.bits),
            learning_rate: engine.learning_rate.unwrap_or(defaults.learning_rate),
            autolink: reductions.autolink,
            autorate: reductions.autorate,
        })
    }
}

/// Key/value store attached to a serialized model.
///
/// Setup reads it to recover the reduction parameters a model was trained
/// with, and writes freshly supplied parameters once so later runs replay
/// the identical stack shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelState {
    entries: BTreeMap<String, String>,
}

impl ModelState {
    /// Load from a JSON file; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading model state {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing model state {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("serializing model state")?;
        fs::write(path, contents)
            .with_context(|| format!("writing model state {}", path.display()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored count for `key`, if present and well-formed.
    pub fn get_count(&self, key: &str) -> Option<u32> {
        self.entries.get(key).and_then(|v| v.parse().ok())
    }

    /// Reconcile a stored count with a freshly supplied one.
    ///
    /// The stored value wins over a conflicting fresh one with a warning;
    /// an absent key is written from the fresh value so the next run
    /// replays the same configuration.
    pub fn resolve_count(&mut self, key: &str, fresh: Option<u32>) -> Option<u32> {
        match (self.get_count(key), fresh) {
            (Some(stored), Some(supplied)) if supplied != stored => {
                eprintln!(
                    "warning: --{} {} differs from the value stored with the model; \
                     pursuing with stored value {}",
                    key, supplied, stored
                );
                Some(stored)
            }
            (Some(stored), _) => Some(stored),
            (None, Some(supplied)) => {
                self.entries.insert(key.to_string(), supplied.to_string());
                Some(supplied)
            }
            (None, None) => None,
        }
    }
}
