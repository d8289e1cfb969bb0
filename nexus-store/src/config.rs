//! Nexus configuration loading from `.nexus.toml`.
//!
//! Configuration is optional. Every section and every key has a default, so
//! an empty or missing file yields a working setup.
//!
//! # Example Configuration
//!
//! ```toml
//! [engine]
//! buffer_pool_mb = 512
//! threads = 1
//! embedding_dimension = 384
//!
//! [batch]
//! batch_size = 4
//! inter_batch_pause_ms = 0
//!
//! [embedding]
//! embed_batch_size = 16
//! max_text_chars = 2000
//! labels = ["Function", "Class", "Method", "Interface", "File"]
//!
//! [search]
//! default_k = 10
//! max_distance = 0.5
//! context_hops = 2
//! ```

use nexus_core::NodeLabel;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in the repository root.
pub const CONFIG_FILE: &str = ".nexus.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NexusConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Embedded engine sizing and schema parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Memory limit handed to the engine, in megabytes.
    ///
    /// Sized for embedding workloads: 384 floats per node add up quickly.
    #[serde(default = "default_buffer_pool_mb")]
    pub buffer_pool_mb: u64,

    /// Worker threads the engine may use.
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Length of every stored embedding vector.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Parent directory for bulk-load staging files.
    ///
    /// Defaults to the system temp directory.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_buffer_pool_mb() -> u64 {
    512
}

fn default_threads() -> u32 {
    1
}

fn default_embedding_dimension() -> usize {
    384
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_pool_mb: default_buffer_pool_mb(),
            threads: default_threads(),
            embedding_dimension: default_embedding_dimension(),
            staging_dir: None,
        }
    }
}

impl EngineConfig {
    /// Directory under which per-instance staging directories are created.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Batched statement execution tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Parameter sets executed per prepared statement before it is released.
    ///
    /// Small values keep engine-side statement state bounded; large values
    /// trade memory for throughput.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between sub-batches, in milliseconds. `0` yields once to the
    /// scheduler instead of sleeping.
    #[serde(default)]
    pub inter_batch_pause_ms: u64,
}

fn default_batch_size() -> usize {
    4
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_pause_ms: 0,
        }
    }
}

impl BatchConfig {
    pub fn inter_batch_pause(&self) -> Duration {
        Duration::from_millis(self.inter_batch_pause_ms)
    }
}

/// Embedding phase settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Texts handed to the model per call.
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    /// Characters of node content included in the embedding text.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Node labels that receive embeddings.
    #[serde(default = "default_embedding_labels")]
    pub labels: Vec<NodeLabel>,
}

fn default_embed_batch_size() -> usize {
    16
}

fn default_max_text_chars() -> usize {
    2000
}

fn default_embedding_labels() -> Vec<NodeLabel> {
    vec![
        NodeLabel::Function,
        NodeLabel::Class,
        NodeLabel::Method,
        NodeLabel::Interface,
        NodeLabel::File,
    ]
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embed_batch_size: default_embed_batch_size(),
            max_text_chars: default_max_text_chars(),
            labels: default_embedding_labels(),
        }
    }
}

/// Semantic search defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Cosine distance cutoff used for context-expansion seeds.
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,

    #[serde(default = "default_context_hops")]
    pub context_hops: usize,
}

fn default_k() -> usize {
    10
}

fn default_max_distance() -> f32 {
    0.5
}

fn default_context_hops() -> usize {
    2
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_distance: default_max_distance(),
            context_hops: default_context_hops(),
        }
    }
}

impl NexusConfig {
    /// Load `.nexus.toml` from `root`.
    ///
    /// A missing file yields defaults. Read and parse errors are logged as
    /// warnings and also yield defaults.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match Self::from_toml_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", CONFIG_FILE, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", CONFIG_FILE, e);
                }
            }
        }
        Self::default()
    }

    /// Parse configuration text, surfacing errors.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
