// canvasdeck CLI entry point.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context as _;
use canvasdeck_session::SessionConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "canvasdeck", about = "Pull, push and import page canvases")]
struct Cli {
    /// Config file to use instead of `~/.canvasdeck/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> process::ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::detect(cli.json);

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => {
            init_tracing(&config.log_filter);
            let ctx = commands::Context { config, config_path: cli.config, format };
            commands::run(cli.command, &ctx).await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(err) => {
            output::print_anyhow_error(format, &err);
            ExitCode::from_error(&err).into()
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::load());
    };
    let mut config = SessionConfig::load_from(path)
        .with_context(|| format!("failed to read config `{}`", path.display()))?;
    config.apply_env();
    Ok(config)
}

// RUST_LOG wins over the configured filter. Logs go to stderr so JSON on
// stdout stays clean.
fn init_tracing(log_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
