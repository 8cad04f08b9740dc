//! Re-fetching the poster for the download button.
//!
//! The image API only hands back a short-lived URL, so the bytes are fetched
//! again on demand.

use chrono::NaiveDate;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

/// Poster bytes ready to be served as a file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PosterDownload {
    /// Image bytes.
    pub bytes: Vec<u8>,
    /// MIME type reported by the origin, or guessed from the URL.
    pub content_type: String,
}

/// Why the poster couldn't be fetched.
#[derive(Debug)]
pub enum DownloadError {
    /// Not an http(s) URL.
    InvalidUrl(String),
    /// The request never got a response.
    Transport(String),
    /// The origin answered with a non-success status.
    Status(u16),
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(url) => write!(f, "Poster URL is not downloadable: {url}"),
            Self::Transport(err) => write!(f, "Poster download failed: {err}"),
            Self::Status(status) => write!(f, "Poster download returned {status}"),
        }
    }
}

impl std::error::Error for DownloadError {}

/// Fetches the poster at `url`.
pub async fn fetch_poster(http: &reqwest::Client, url: &str) -> Result<PosterDownload, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DownloadError::InvalidUrl(url.to_string()));
    }

    let response = http
        .get(parsed.clone())
        .send()
        .await
        .map_err(|err| DownloadError::Transport(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status(status.as_u16()));
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| value.starts_with("image/"))
        .unwrap_or_else(|| guess_content_type(&parsed).to_string());
    let bytes = response
        .bytes()
        .await
        .map_err(|err| DownloadError::Transport(err.to_string()))?;
    debug!("Fetched {} bytes of {} from {}", bytes.len(), content_type, parsed);

    Ok(PosterDownload {
        bytes: bytes.to_vec(),
        content_type,
    })
}

fn guess_content_type(url: &Url) -> &'static str {
    let path = url.path().to_ascii_lowercase();
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Attachment name like `noir-mastermind-2026-10-19.png`.
pub fn download_filename(label: &str, content_type: &str, date: NaiveDate) -> String {
    let mut slug = String::with_capacity(label.len());
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "poster" } else { slug };
    format!(
        "{}-{}.{}",
        slug,
        date.format("%Y-%m-%d"),
        extension_for(content_type)
    )
}
