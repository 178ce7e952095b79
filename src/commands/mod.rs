//! Subcommand implementations.

pub mod apply;
pub mod import;
pub mod plan;
pub mod refresh;
pub mod show;
pub mod validate;

use anyhow::{Context as AnyhowContext, Result};
use cypress::HttpStore;
use reconcile::{Context, LogObserver, PollPolicy};
use std::path::PathBuf;

use crate::Globals;
use crate::config::{Environment, ProviderConfig};
use crate::manifest::Manifest;
use crate::paths;
use crate::state::State;

/// Connection to one cluster.
pub struct Remote {
    pub cluster: String,
    store: HttpStore,
    poll: PollPolicy,
}

impl Remote {
    pub fn connect(config: &ProviderConfig, env: &Environment) -> Result<Self> {
        let store_config = config.store_config(env)?;
        let cluster = store_config.cluster.clone();
        let store = HttpStore::new(&store_config)
            .with_context(|| format!("Could not set up a client for {cluster}"))?;
        log::debug!("Connected to {cluster}");

        Ok(Self {
            cluster,
            store,
            poll: config.poll_policy(),
        })
    }

    pub fn context(&self) -> Context<'_> {
        Context::new(&self.store)
            .with_poll(self.poll)
            .with_observer(&LogObserver)
    }
}

/// Everything a cluster-facing command works with.
pub struct Session {
    pub remote: Remote,
    pub state: State,
    pub state_path: PathBuf,
}

impl Session {
    pub fn open(globals: &Globals) -> Result<Self> {
        let config = ProviderConfig::load(globals.config.as_deref())?;
        let remote = Remote::connect(&config, &Environment::from_process())?;

        let state_path = match &globals.state {
            Some(path) => path.clone(),
            None => paths::state_file()?,
        };
        let mut state = State::load(&state_path)?;
        state.bind_cluster(&remote.cluster)?;

        Ok(Self {
            remote,
            state,
            state_path,
        })
    }

    pub fn save(&self) -> Result<()> {
        self.state.save(&self.state_path)
    }
}

/// Load and check the manifest named on the command line.
pub fn load_manifest(globals: &Globals) -> Result<Manifest> {
    let manifest = Manifest::load(&globals.manifest)?;
    manifest
        .validate()
        .with_context(|| format!("Invalid manifest: {}", globals.manifest.display()))?;
    Ok(manifest)
}
