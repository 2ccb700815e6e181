// Remote canvas API: `GET|PATCH {base}/{page_id}/canvas`.
//
// Both directions carry a `PageSnapshot` as JSON. The server answers writes
// with the stored snapshot's ETag; clients opting into optimistic concurrency
// echo it back in `If-Match`.

use thiserror::Error;
use url::Url;

use crate::types::PageId;

/// Trailing path segment of every canvas resource.
pub const CANVAS_SEGMENT: &str = "canvas";
/// Anti-forgery header name used when the caller does not configure one.
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRF-Token";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CanvasUrlError {
    #[error("invalid base url `{0}`")]
    InvalidBase(String),

    #[error("base url `{0}` cannot carry path segments")]
    CannotBeABase(String),

    #[error("page id is empty")]
    EmptyPageId,
}

/// Parse and validate the API base URL once, up front.
pub fn parse_base_url(base: &str) -> Result<Url, CanvasUrlError> {
    let url = Url::parse(base.trim()).map_err(|_| CanvasUrlError::InvalidBase(base.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(CanvasUrlError::CannotBeABase(base.to_string()));
    }
    Ok(url)
}

/// Build `{base}/{page_id}/canvas`, percent-encoding the page id as one segment.
pub fn canvas_url(base: &Url, page_id: &PageId) -> Result<Url, CanvasUrlError> {
    if page_id.as_str().trim().is_empty() {
        return Err(CanvasUrlError::EmptyPageId);
    }

    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| CanvasUrlError::CannotBeABase(base.to_string()))?;
        segments.pop_if_empty();
        segments.push(page_id.as_str());
        segments.push(CANVAS_SEGMENT);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
