//! Fetch a URL and describe what it points at.

use encoding_rs::{Encoding, UTF_8};
use reqwest::header::CONTENT_TYPE;

/// Label used when the server sends no `Content-Type`.
const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// What a URL turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// An HTML document. `title` is `None` when it has no usable `<title>`.
    Html { title: Option<String> },
    /// Anything else, labelled with its raw content type.
    Other { content_type: String },
}

impl Classification {
    pub fn is_html(&self) -> bool {
        matches!(self, Classification::Html { .. })
    }

    /// Human-readable label; `None` only for an untitled HTML page.
    pub fn label(&self) -> Option<&str> {
        match self {
            Classification::Html { title } => title.as_deref(),
            Classification::Other { content_type } => Some(content_type),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("failed to connect")]
    Connect(#[source] reqwest::Error),
    #[error("error - HTTP status code {0}")]
    Status(u16),
    #[error("failed to read response")]
    Body(#[source] reqwest::Error),
}

impl ClassifyError {
    /// The one-line chat reply for this failure.
    pub fn reply(&self, url: &str) -> String {
        format!("{url}: {self}")
    }
}

/// Read-only fetcher; safe to call repeatedly for the same URL.
#[derive(Debug, Clone)]
pub struct Classifier {
    http: reqwest::Client,
    max_body_bytes: usize,
}

impl Classifier {
    pub fn new(http: reqwest::Client, max_body_bytes: usize) -> Self {
        Self { http, max_body_bytes }
    }

    pub async fn classify(&self, url: &str) -> Result<Classification, ClassifyError> {
        let mut resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ClassifyError::Connect)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClassifyError::Status(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(UNKNOWN_CONTENT_TYPE)
            .to_string();

        if !is_html(&content_type) {
            return Ok(Classification::Other { content_type });
        }

        // Capped at max_body_bytes.
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(ClassifyError::Body)? {
            body.extend_from_slice(&chunk);
            if body.len() >= self.max_body_bytes {
                body.truncate(self.max_body_bytes);
                break;
            }
        }

        let html = decode_body(&body, &content_type);
        Ok(Classification::Html {
            title: extract_title(&html),
        })
    }
}

fn is_html(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "text/html" || essence == "application/xhtml+xml"
}

/// Decode a (possibly truncated) body with the charset named in the
/// content type, defaulting to UTF-8. A byte-order mark overrides both.
pub fn decode_body(body: &[u8], content_type: &str) -> String {
    let encoding = charset(content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Text of the first `<title>`, trimmed with inner whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let raw: String = document.select(&selector).next()?.text().collect();
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() { None } else { Some(title) }
}
