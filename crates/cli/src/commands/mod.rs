// CLI subcommand dispatch.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use canvasdeck_common::types::PageSnapshot;
use canvasdeck_session::{HttpPersistenceAdapter, SessionConfig};
use clap::Subcommand;

use crate::output::OutputFormat;

pub mod config;
pub mod import;
pub mod pull;
pub mod push;

#[derive(Subcommand)]
pub enum Command {
    /// Fetch a page canvas from the remote API
    Pull(pull::PullArgs),
    /// Replace a page canvas with a snapshot file
    Push(push::PushArgs),
    /// Load a snapshot into a headless editor session and save it
    Import(import::ImportArgs),
    /// Show the resolved configuration
    Config(config::ConfigArgs),
}

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: SessionConfig,
    /// Path given with `--config`, if any.
    pub config_path: Option<PathBuf>,
    pub format: OutputFormat,
}

impl Context {
    pub fn adapter(&self) -> anyhow::Result<HttpPersistenceAdapter> {
        HttpPersistenceAdapter::new(&self.config.remote).context("invalid [remote] configuration")
    }
}

pub async fn run(cmd: Command, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        Command::Pull(args) => pull::run(args, ctx).await,
        Command::Push(args) => push::run(args, ctx).await,
        Command::Import(args) => import::run(args, ctx).await,
        Command::Config(args) => config::run(args, ctx),
    }
}

/// Read and validate a snapshot file.
pub fn read_snapshot(path: &Path) -> anyhow::Result<PageSnapshot> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    let snapshot: PageSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("`{}` is not a page snapshot", path.display()))?;
    snapshot.validate().with_context(|| format!("`{}` is not a valid snapshot", path.display()))?;
    Ok(snapshot)
}
