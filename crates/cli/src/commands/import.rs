// `canvasdeck import` — load a snapshot into a headless editor session and
// save it through the session's save path.
//
// Unlike `push`, the page is opened first, so the write goes through the
// same dirty tracking and ETag bookkeeping an interactive editor uses.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use canvasdeck_common::types::{PageId, SaveSummary};
use canvasdeck_session::{EditorSession, HeadlessEditor, SessionCapabilities};
use clap::Args;
use serde::Serialize;
use tracing::info;

use super::{read_snapshot, Context};
use crate::output;

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Page id.
    pub page: String,

    /// Snapshot JSON file to load into the page.
    pub file: PathBuf,

    /// Tab title (defaults to the page id).
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub page_id: PageId,
    pub components: usize,
    #[serde(flatten)]
    pub summary: SaveSummary,
}

pub async fn run(args: ImportArgs, ctx: &Context) -> anyhow::Result<()> {
    let snapshot = read_snapshot(&args.file)?;
    let page_id = PageId::new(args.page);
    let title = args.title.unwrap_or_else(|| page_id.to_string());

    let editor = Arc::new(HeadlessEditor::new());
    let session = EditorSession::new(
        &ctx.config,
        Arc::new(ctx.adapter()?),
        SessionCapabilities::headless(editor.clone()),
    );

    session
        .tabs()
        .focus_page(&page_id, &title)
        .await
        .with_context(|| format!("failed to open page `{page_id}`"))?;
    editor.edit_components(snapshot.components.clone());
    editor.edit_style(snapshot.styles.clone());

    let summary = session.save_all().await;
    session.teardown();
    info!(page_id = %page_id, succeeded = summary.succeeded, failed = summary.failed, "import finished");

    if summary.failed > 0 {
        output::print_warning(ctx.format, "IMPORT_FAILED", "the page could not be saved");
        bail!("failed to save imported page `{page_id}`");
    }

    let result = ImportResult { page_id, components: snapshot.component_count(), summary };
    output::print_output(ctx.format, &result, |r| {
        format!("Imported {} components into `{}`", r.components, r.page_id)
    })?;
    Ok(())
}
