use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "snapfs",
    about = "Mount a bare git repository as a filesystem",
    version,
)]
pub struct Cli {
    /// TOML configuration file; flags below override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bare repository backing the mount (created if absent).
    #[arg(long)]
    pub repository: Option<PathBuf>,

    /// Directory to mount on.
    #[arg(long)]
    pub mountpoint: Option<PathBuf>,

    /// Reject every mutating operation.
    #[arg(long)]
    pub read_only: bool,

    /// Commit on every write call instead of waiting for flush/close.
    #[arg(long)]
    pub commit_on_write: bool,

    /// Seconds between forced-commit sweeps of open handles (0 disables).
    #[arg(long)]
    pub flush_interval: Option<u64>,

    /// Allow other users to access the mount.
    #[arg(long)]
    pub allow_other: bool,

    /// Unmount automatically when the process exits.
    #[arg(long)]
    pub auto_unmount: bool,
}
