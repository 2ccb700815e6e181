// `canvasdeck pull` — fetch a page canvas from the remote API.

use std::path::PathBuf;

use anyhow::Context as _;
use canvasdeck_common::types::{PageId, PageSnapshot};
use canvasdeck_session::PersistenceAdapter;
use clap::Args;
use serde::Serialize;
use tracing::info;

use super::Context;
use crate::output;

#[derive(Debug, Args)]
pub struct PullArgs {
    /// Page id.
    pub page: String,

    /// Write the snapshot JSON to this file instead of printing it.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct PullResult {
    pub page_id: PageId,
    pub etag: Option<String>,
    pub components: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_to: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PageSnapshot>,
}

pub async fn run(args: PullArgs, ctx: &Context) -> anyhow::Result<()> {
    let page_id = PageId::new(args.page);
    let loaded = ctx
        .adapter()?
        .load(&page_id)
        .await
        .with_context(|| format!("failed to pull page `{page_id}`"))?;
    info!(page_id = %page_id, etag = ?loaded.etag, "page pulled");

    let mut result = PullResult {
        page_id,
        etag: loaded.etag,
        components: loaded.snapshot.component_count(),
        written_to: None,
        snapshot: None,
    };
    match args.out {
        Some(path) => {
            let contents = serde_json::to_string_pretty(&loaded.snapshot)?;
            std::fs::write(&path, contents)
                .with_context(|| format!("failed to write `{}`", path.display()))?;
            result.written_to = Some(path);
        }
        None => result.snapshot = Some(loaded.snapshot),
    }

    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &PullResult) -> String {
    let etag = result.etag.as_deref().unwrap_or("none");
    let mut out =
        format!("Pulled `{}` ({} components, etag {etag})", result.page_id, result.components);
    if let Some(path) = &result.written_to {
        out.push_str(&format!("\nWrote {}", path.display()));
    }
    if let Some(snapshot) = &result.snapshot {
        if !snapshot.html.is_empty() {
            out.push_str(&format!("\n\n{}", snapshot.html));
        }
    }
    out
}
