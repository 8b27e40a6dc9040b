//! Explicit configuration for the pipeline, the generator and the artifact
//! store. Built once at the entry points (CLI / server) and passed down;
//! nothing in the pipeline reads the environment on its own.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Repair-pipeline knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of repair iterations after the first execution attempt.
    pub max_retries: usize,
    /// Print the normalized script to stderr before execution.
    pub trace: bool,
    /// When set, the final script and diagnostic of every run are appended
    /// to this file.
    pub trace_log: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            trace: false,
            trace_log: None,
        }
    }
}

impl PipelineConfig {
    /// Read CADMEND_MAX_RETRIES (clamped to 0..=8), CADMEND_TRACE and
    /// CADMEND_TRACE_LOG.
    pub fn from_env() -> Self {
        let max_retries = env::var("CADMEND_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(3)
            .min(8);
        let trace = env::var("CADMEND_TRACE")
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                matches!(v.as_str(), "1" | "true" | "yes" | "on")
            })
            .unwrap_or(false);
        let trace_log = env::var("CADMEND_TRACE_LOG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        Self {
            max_retries,
            trace,
            trace_log,
        }
    }
}

/// Where and how to reach the Ollama generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub num_predict: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout: Duration::from_secs(120),
            num_predict: 512,
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = env::var("CADMEND_OLLAMA_URL").unwrap_or(defaults.base_url);
        let model = env::var("CADMEND_MODEL").unwrap_or(defaults.model);
        let timeout_secs = env::var("CADMEND_GEN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120)
            .clamp(1, 600);
        let num_predict = env::var("CADMEND_NUM_PREDICT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.num_predict);
        Self {
            base_url,
            model,
            timeout: Duration::from_secs(timeout_secs),
            num_predict,
        }
    }
}

/// Directory for stored model artifacts.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: env::temp_dir().join("cadmend-models"),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        match env::var("CADMEND_MODEL_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self {
                dir: PathBuf::from(dir),
            },
            _ => Self::default(),
        }
    }
}
