use std::path::Path;

use takeoff_core::table::{LayoutPages, PageRange};

use crate::error::Error;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LayoutError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),
}

/// A layout-analysis service: per-page text and detected tables for a page
/// range of a document.
#[allow(async_fn_in_trait)]
pub trait LayoutService {
    async fn analyze(
        &self,
        document: &[u8],
        mime_type: &str,
        range: PageRange,
    ) -> Result<LayoutPages, LayoutError>;
}

/// Layout service reached over HTTP.
///
/// Sends `POST {endpoint}?pages={start}-{end}` with the raw document as the
/// body and expects a `LayoutPages` JSON response.
pub struct HttpLayoutService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpLayoutService {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

impl LayoutService for HttpLayoutService {
    async fn analyze(
        &self,
        document: &[u8],
        mime_type: &str,
        range: PageRange,
    ) -> Result<LayoutPages, LayoutError> {
        let pages = format!("{}-{}", range.start, range.end);
        let mut request = self
            .client
            .post(&self.endpoint)
            .query(&[("pages", pages.as_str())])
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(document.to_vec());

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LayoutError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LayoutError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<LayoutPages>()
            .await
            .map_err(|e| LayoutError::Decode(e.to_string()))
    }
}

/// Guess the MIME type from a file extension.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "tif" | "tiff" => Some("image/tiff"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Number of pages in the document. Images are a single page.
pub fn count_pages(document: &[u8], mime_type: &str) -> Result<u32, Error> {
    if mime_type.starts_with("image/") {
        return Ok(1);
    }
    if mime_type != "application/pdf" {
        return Err(Error::InvalidInput(format!(
            "unsupported document type: {mime_type}"
        )));
    }

    let doc = lopdf::Document::load_mem(document)
        .map_err(|e| Error::InvalidInput(format!("unreadable PDF: {e}")))?;
    if doc.is_encrypted() {
        return Err(Error::InvalidInput("encrypted PDF".into()));
    }

    match doc.get_pages().len() {
        0 => Err(Error::InvalidInput("PDF has no pages".into())),
        count => Ok(count as u32),
    }
}
