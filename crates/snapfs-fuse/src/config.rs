use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use snapfs_store::FsConfig;

use crate::cli::Cli;

/// Full daemon configuration: where the repository lives, where to mount,
/// mount options, and the store behavior knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub repository: PathBuf,
    pub mountpoint: PathBuf,
    pub allow_other: bool,
    pub auto_unmount: bool,
    pub store: FsConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            repository: PathBuf::new(),
            mountpoint: PathBuf::new(),
            allow_other: false,
            auto_unmount: true,
            store: FsConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load the configuration file (if any) and apply command-line
    /// overrides on top.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };

        if let Some(repository) = &cli.repository {
            config.repository = repository.clone();
        }
        if let Some(mountpoint) = &cli.mountpoint {
            config.mountpoint = mountpoint.clone();
        }
        if cli.read_only {
            config.store.read_only = true;
        }
        if cli.commit_on_write {
            config.store.commit_on_write = true;
        }
        if let Some(secs) = cli.flush_interval {
            config.store.flush_interval_secs = secs;
        }
        if cli.allow_other {
            config.allow_other = true;
        }
        if cli.auto_unmount {
            config.auto_unmount = true;
        }

        if config.repository.as_os_str().is_empty() {
            anyhow::bail!("no repository configured (use --repository or a config file)");
        }
        if config.mountpoint.as_os_str().is_empty() {
            anyhow::bail!("no mountpoint configured (use --mountpoint or a config file)");
        }
        Ok(config)
    }
}
