//! On-disk artifact store.
//!
//! Successful pipeline runs leave a JSON-serialized solid model behind
//! so it can be fetched again by id. Ids are generated here and only
//! ids of that shape are ever looked up, so a request can never name a
//! path outside the store directory.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};

use crate::config::StoreConfig;
use crate::sandbox::SolidModel;

/// Anything that can persist a solid model and hand back an id for it.
pub trait ArtifactSink: Send + Sync {
    fn save(&self, model: &SolidModel) -> Result<String>;
    fn load(&self, id: &str) -> Result<SolidModel>;
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{seq:x}")
}

/// Lowercase hex plus `-`, nothing else. Rejects anything that could
/// traverse out of the store directory.
pub fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c) || c == '-')
}

/// Stores one JSON file per artifact under a flat directory.
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(cfg: &StoreConfig) -> Result<Self> {
        fs::create_dir_all(&cfg.dir)
            .with_context(|| format!("creating artifact directory {}", cfg.dir.display()))?;
        Ok(Self {
            dir: cfg.dir.clone(),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl ArtifactSink for DirSink {
    fn save(&self, model: &SolidModel) -> Result<String> {
        let id = next_id();
        let path = self.path_for(&id);
        let json = serde_json::to_string_pretty(model)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(id)
    }

    fn load(&self, id: &str) -> Result<SolidModel> {
        if !valid_id(id) {
            return Err(anyhow!("invalid artifact id"));
        }
        let path = self.path_for(id);
        let json =
            fs::read_to_string(&path).with_context(|| format!("no artifact with id {id}"))?;
        Ok(serde_json::from_str(&json)?)
    }
}
