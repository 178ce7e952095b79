use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reconcile::Resource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const STATE_VERSION: u32 = 1;

// ============================================================================
// State Structures
// ============================================================================

/// Last observed snapshot of every managed object, keyed by `kind.key`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct State {
    #[serde(default = "current_version")]
    pub version: u32,

    /// Cluster the snapshots were read from
    #[serde(default)]
    pub cluster: Option<String>,

    #[serde(default)]
    pub resources: BTreeMap<String, Tracked>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// One tracked object
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tracked {
    pub snapshot: Resource,
    pub observed_at: DateTime<Utc>,
}

fn current_version() -> u32 {
    STATE_VERSION
}

// ============================================================================
// State Implementation
// ============================================================================

impl State {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.version > STATE_VERSION {
            bail!(
                "State file {} has version {}, this build understands up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }

        log::debug!(
            "Loaded {} tracked resource(s) from {}",
            state.resources.len(),
            path.display()
        );
        Ok(state)
    }

    /// Save state to disk, replacing the previous file in one rename
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Refuse to mix snapshots from different clusters.
    pub fn bind_cluster(&mut self, cluster: &str) -> Result<()> {
        match &self.cluster {
            Some(bound) if bound != cluster && !self.resources.is_empty() => bail!(
                "State tracks objects on '{bound}', not '{cluster}'; use a separate --state file"
            ),
            _ => {
                self.cluster = Some(cluster.to_string());
                Ok(())
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&Resource> {
        self.resources.get(address).map(|t| &t.snapshot)
    }

    /// Record a fresh snapshot
    pub fn upsert(&mut self, snapshot: Resource) {
        let now = Utc::now();
        self.resources.insert(
            snapshot.address(),
            Tracked {
                snapshot,
                observed_at: now,
            },
        );
        self.last_updated = now;
    }

    /// Stop tracking an object
    pub fn forget(&mut self, address: &str) -> Option<Resource> {
        let removed = self.resources.remove(address).map(|t| t.snapshot);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values().map(|t| &t.snapshot)
    }
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            cluster: None,
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
