//! The snapfs daemon: mount a bare git repository as a filesystem.

mod cli;
mod config;
mod fs;
mod inode;

use std::sync::Arc;

use clap::Parser;
use fuser::MountOption;
use tracing::info;

use snapfs_handles::{flusher, HandleRegistry};
use snapfs_store::GitStore;

use crate::cli::Cli;
use crate::config::DaemonConfig;
use crate::fs::SnapFs;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig::load(&cli)?;

    let store = Arc::new(GitStore::open(&config.repository, config.store.clone())?);
    let registry = Arc::new(HandleRegistry::new());
    let _flusher = flusher::spawn(Arc::clone(&registry), config.store.flush_interval())?;

    let mut options = vec![
        MountOption::FSName("snapfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    if config.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    if config.store.read_only {
        options.push(MountOption::RO);
    }

    info!(
        repository = %config.repository.display(),
        mountpoint = %config.mountpoint.display(),
        "mounting"
    );
    let filesystem = SnapFs::new(store, registry);
    fuser::mount2(filesystem, &config.mountpoint, &options)?;
    Ok(())
}
