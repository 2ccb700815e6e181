// `canvasdeck config` — show (or initialise) the resolved configuration.

use std::path::PathBuf;

use anyhow::Context as _;
use canvasdeck_session::config::config_path;
use canvasdeck_session::SessionConfig;
use clap::Args;
use serde::Serialize;

use super::Context;
use crate::output;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Write a default config file if none exists yet.
    #[arg(long)]
    pub init: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub path: Option<PathBuf>,
    pub exists: bool,
    pub created: bool,
    pub config: SessionConfig,
}

pub fn run(args: ConfigArgs, ctx: &Context) -> anyhow::Result<()> {
    let path = ctx.config_path.clone().or_else(config_path);
    let exists = path.as_ref().is_some_and(|p| p.exists());

    let mut created = false;
    if args.init && !exists {
        let path = path.as_ref().context("cannot determine home directory for config")?;
        SessionConfig::default()
            .save_to(path)
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        created = true;
    }

    let report =
        ConfigReport { path, exists: exists || created, created, config: ctx.config.clone() };
    output::print_output(ctx.format, &report, format_human)?;
    Ok(())
}

fn format_human(report: &ConfigReport) -> String {
    let location = match (&report.path, report.exists) {
        (Some(path), true) => format!("# {}", path.display()),
        (Some(path), false) => format!("# {} (not found, using defaults)", path.display()),
        (None, _) => "# no home directory, using defaults".to_string(),
    };
    let body = toml::to_string_pretty(&report.config)
        .unwrap_or_else(|e| format!("# failed to render config: {e}"));
    let mut out = location;
    if report.created {
        out.push_str("\n# created with defaults");
    }
    out.push('\n');
    out.push_str(&body);
    out
}
