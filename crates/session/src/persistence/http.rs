// HTTP adapter for the remote canvas API.
//
// GET   {base}/{page_id}/canvas  → PageSnapshot JSON (+ ETag)
// PATCH {base}/{page_id}/canvas  ← PageSnapshot JSON (→ ETag)
//
// The client keeps a cookie jar so the browser-style session cookie issued
// by the API survives across calls, and attaches the anti-forgery header to
// every request.

use canvasdeck_common::protocol::canvas::{self, CanvasUrlError};
use canvasdeck_common::types::{PageId, PageSnapshot};
use reqwest::header::{HeaderName, HeaderValue, ETAG, IF_MATCH};
use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use super::{LoadedPage, PersistenceAdapter, StoreAck};
use crate::config::RemoteConfig;
use crate::error::PersistenceError;

/// Longest slice of an error body kept in a failure message.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpPersistenceAdapter {
    client: Client,
    base_url: Url,
    csrf: Option<(HeaderName, HeaderValue)>,
}

impl HttpPersistenceAdapter {
    pub fn new(config: &RemoteConfig) -> Result<Self, PersistenceError> {
        let base_url = canvas::parse_base_url(&config.base_url).map_err(url_error)?;

        let csrf = match &config.csrf_token {
            Some(token) => {
                let name = HeaderName::from_bytes(config.csrf_header.as_bytes()).map_err(|e| {
                    PersistenceError::permanent(format!(
                        "invalid anti-forgery header name `{}`: {e}",
                        config.csrf_header
                    ))
                })?;
                let value = HeaderValue::from_str(token).map_err(|e| {
                    PersistenceError::permanent(format!("invalid anti-forgery token: {e}"))
                })?;
                Some((name, value))
            }
            None => None,
        };

        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PersistenceError::permanent(format!("failed to build http client: {e}")))?;

        Ok(Self { client, base_url, csrf })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn page_url(&self, page_id: &PageId) -> Result<Url, PersistenceError> {
        canvas::canvas_url(&self.base_url, page_id).map_err(url_error)
    }

    fn with_csrf(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.csrf {
            Some((name, value)) => request.header(name.clone(), value.clone()),
            None => request,
        }
    }
}

impl PersistenceAdapter for HttpPersistenceAdapter {
    async fn load(&self, page_id: &PageId) -> Result<LoadedPage, PersistenceError> {
        let url = self.page_url(page_id)?;
        debug!(page_id = %page_id, %url, "loading canvas");

        let response = self.with_csrf(self.client.get(url)).send().await.map_err(request_error)?;
        let response = check_status(response).await?;
        let etag = etag_header(&response);
        let snapshot = response
            .json::<PageSnapshot>()
            .await
            .map_err(|e| PersistenceError::permanent(format!("undecodable canvas response: {e}")))?;

        Ok(LoadedPage { snapshot, etag })
    }

    async fn store(
        &self,
        page_id: &PageId,
        snapshot: &PageSnapshot,
        if_match: Option<&str>,
    ) -> Result<StoreAck, PersistenceError> {
        snapshot
            .validate()
            .map_err(|e| PersistenceError::permanent(format!("refusing to send snapshot: {e}")))?;
        let url = self.page_url(page_id)?;
        debug!(page_id = %page_id, %url, "storing canvas");

        let mut request = self.with_csrf(self.client.patch(url)).json(snapshot);
        if let Some(etag) = if_match {
            request = request.header(IF_MATCH, etag);
        }

        let response = request.send().await.map_err(request_error)?;
        let response = check_status(response).await?;
        Ok(StoreAck::now(etag_header(&response)))
    }
}

async fn check_status(response: Response) -> Result<Response, PersistenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = if body.is_empty() { status.to_string() } else { format!("{status}: {body}") };
    Err(PersistenceError::from_status(status.as_u16(), message))
}

fn etag_header(response: &Response) -> Option<String> {
    response.headers().get(ETAG).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn request_error(err: reqwest::Error) -> PersistenceError {
    if err.is_builder() || err.is_decode() {
        PersistenceError::permanent(err.to_string())
    } else {
        // Timeouts, refused connections, and dropped bodies are all worth retrying.
        PersistenceError::transient(err.to_string())
    }
}

fn url_error(err: CanvasUrlError) -> PersistenceError {
    PersistenceError::permanent(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn rejects_invalid_base_url() {
        let config = RemoteConfig { base_url: "not a url".into(), ..RemoteConfig::default() };
        let err = HttpPersistenceAdapter::new(&config).unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
    }

    #[test]
    fn rejects_invalid_csrf_header_name() {
        let config = RemoteConfig {
            csrf_header: "bad header".into(),
            csrf_token: Some("tok".into()),
            ..RemoteConfig::default()
        };
        let err = HttpPersistenceAdapter::new(&config).unwrap_err();
        assert!(err.message.contains("bad header"));
    }

    #[test]
    fn builds_page_urls_under_base() {
        let adapter = HttpPersistenceAdapter::new(&RemoteConfig::default()).unwrap();
        let url = adapter.page_url(&PageId::new("home")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/pages/home/canvas");
    }

    #[test]
    fn empty_page_id_is_permanent() {
        let adapter = HttpPersistenceAdapter::new(&RemoteConfig::default()).unwrap();
        let err = adapter.page_url(&PageId::new("")).unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
    }
}
