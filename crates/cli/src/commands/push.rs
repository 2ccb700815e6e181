// `canvasdeck push` — replace a page canvas with a snapshot file.

use std::path::PathBuf;

use anyhow::Context as _;
use canvasdeck_common::types::PageId;
use canvasdeck_session::PersistenceAdapter;
use clap::Args;
use serde::Serialize;
use tracing::info;

use super::{read_snapshot, Context};
use crate::output;

#[derive(Debug, Args)]
pub struct PushArgs {
    /// Page id.
    pub page: String,

    /// Snapshot JSON file (`components`, `styles`, `html`, `css`).
    pub file: PathBuf,

    /// Only write if the remote page still has this ETag.
    #[arg(long)]
    pub if_match: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PushResult {
    pub page_id: PageId,
    pub etag: Option<String>,
    pub saved_at: String,
}

pub async fn run(args: PushArgs, ctx: &Context) -> anyhow::Result<()> {
    let snapshot = read_snapshot(&args.file)?;
    let page_id = PageId::new(args.page);

    let ack = ctx
        .adapter()?
        .store(&page_id, &snapshot, args.if_match.as_deref())
        .await
        .with_context(|| format!("failed to push page `{page_id}`"))?;
    info!(page_id = %page_id, etag = ?ack.etag, "page pushed");

    let result = PushResult { page_id, etag: ack.etag, saved_at: ack.saved_at.to_rfc3339() };
    output::print_output(ctx.format, &result, |r| {
        format!("Saved `{}` at {}", r.page_id, r.saved_at)
    })?;
    Ok(())
}
