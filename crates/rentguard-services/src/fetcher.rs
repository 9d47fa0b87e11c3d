//! Document retrieval and model-input preparation.
//!
//! Downloads an uploaded insurance document from storage or a URL and turns
//! it into what the model needs: extracted text for PDFs, inline base64 image
//! data for images and for PDFs without a usable text layer.

use anyhow::{Context, Result};
use base64::Engine;
use rentguard_core::DocumentSettings;
use rentguard_storage::Storage;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::url_guard::{check_document_url, CheckedUrl};

/// PDFs with less extracted text than this are also sent as an image.
pub const MIN_PDF_TEXT_CHARS: usize = 100;

const PDF_MIME: &str = "application/pdf";

/// Where the document bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    StoragePath(String),
    Url(String),
}

impl DocumentSource {
    /// Absolute http(s) references are URLs; anything else is a storage key.
    pub fn from_reference(reference: &str) -> Self {
        let trimmed = reference.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            DocumentSource::Url(trimmed.to_string())
        } else {
            DocumentSource::StoragePath(trimmed.trim_start_matches('/').to_string())
        }
    }
}

/// Base64 image payload for a multimodal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Model input derived from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDocument {
    pub file_name: String,
    pub mime_type: String,
    /// Extracted text, or the extraction-failure placeholder.
    pub text: Option<String>,
    pub image: Option<InlineImage>,
    pub extraction_error: Option<String>,
}

impl PreparedDocument {
    /// Text worth embedding in a prompt.
    pub fn usable_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty() && !is_placeholder(text))
    }
}

pub fn pdf_placeholder(file_name: &str) -> String {
    format!("[PDF document: {} - text extraction failed]", file_name)
}

pub fn is_placeholder(text: &str) -> bool {
    text.starts_with("[PDF document:") && text.ends_with("text extraction failed]")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Image,
}

fn document_kind(mime_type: &str, file_name: &str) -> Option<DocumentKind> {
    let mime = mime_type.trim().to_lowercase();
    if mime == PDF_MIME {
        return Some(DocumentKind::Pdf);
    }
    if mime.starts_with("image/") {
        return Some(DocumentKind::Image);
    }

    // Generic content types: fall back to the extension.
    let name = file_name.to_lowercase();
    if name.ends_with(".pdf") {
        Some(DocumentKind::Pdf)
    } else if [".jpg", ".jpeg", ".png", ".webp", ".heic", ".gif"]
        .iter()
        .any(|ext| name.ends_with(ext))
    {
        Some(DocumentKind::Image)
    } else {
        None
    }
}

fn image_mime(mime_type: &str, file_name: &str) -> String {
    let mime = mime_type.trim().to_lowercase();
    if mime.starts_with("image/") {
        return mime;
    }
    let name = file_name.to_lowercase();
    if name.ends_with(".png") {
        "image/png".to_string()
    } else if name.ends_with(".webp") {
        "image/webp".to_string()
    } else if name.ends_with(".gif") {
        "image/gif".to_string()
    } else if name.ends_with(".heic") {
        "image/heic".to_string()
    } else {
        "image/jpeg".to_string()
    }
}

/// Extract text page by page, joining pages with a blank line.
fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    let mut temp = tempfile::NamedTempFile::new().context("Failed to create temp file for PDF")?;
    temp.write_all(bytes)
        .context("Failed to write PDF to temp file")?;
    temp.flush().context("Failed to flush temp file")?;

    let pages = pdf_extract::extract_text_by_pages(temp.path())
        .map_err(|e| anyhow::anyhow!("PDF text extraction failed: {}", e))?;

    Ok(pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Run a blocking extractor off the async runtime. A panic inside the
/// extractor is reported as an extraction error.
async fn extract_in_background<F>(bytes: Vec<u8>, extract: F) -> Result<String>
where
    F: FnOnce(&[u8]) -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(move || extract(&bytes))
        .await
        .map_err(|e| anyhow::anyhow!("PDF extraction task failed: {}", e))?
}

/// Turn raw bytes into model input. PDF extraction failures never abort:
/// the text becomes a placeholder and the error is recorded.
pub async fn prepare_document(
    bytes: Vec<u8>,
    mime_type: &str,
    file_name: &str,
) -> Result<PreparedDocument> {
    let kind = document_kind(mime_type, file_name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unsupported document type '{}' for file '{}'",
            mime_type,
            file_name
        )
    })?;

    match kind {
        DocumentKind::Image => Ok(PreparedDocument {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            text: None,
            image: Some(InlineImage::from_bytes(&image_mime(mime_type, file_name), &bytes)),
            extraction_error: None,
        }),
        DocumentKind::Pdf => {
            let extracted = extract_in_background(bytes.clone(), extract_pdf_text).await;

            let (text, extraction_error) = match extracted {
                Ok(text) => {
                    tracing::debug!(file_name = %file_name, text_len = text.len(), "PDF text extracted");
                    (text, None)
                }
                Err(e) => {
                    tracing::warn!(file_name = %file_name, error = %e, "PDF text extraction failed, using placeholder");
                    (pdf_placeholder(file_name), Some(e.to_string()))
                }
            };

            let needs_vision = is_placeholder(&text) || text.chars().count() < MIN_PDF_TEXT_CHARS;
            let image = needs_vision.then(|| InlineImage::from_bytes(PDF_MIME, &bytes));

            Ok(PreparedDocument {
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                text: Some(text),
                image,
                extraction_error,
            })
        }
    }
}

fn download_client(settings: &DocumentSettings) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.download_timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
}

pub struct DocumentFetcher {
    storage: Arc<dyn Storage>,
    http_client: reqwest::Client,
    settings: DocumentSettings,
    signed_url_ttl: Duration,
}

impl DocumentFetcher {
    pub fn new(
        storage: Arc<dyn Storage>,
        settings: DocumentSettings,
        signed_url_ttl: Duration,
    ) -> Result<Self> {
        let http_client = download_client(&settings)
            .build()
            .context("Failed to create HTTP client for document downloads")?;

        Ok(Self {
            storage,
            http_client,
            settings,
            signed_url_ttl,
        })
    }

    /// Download and prepare a document.
    #[tracing::instrument(skip(self), fields(file_name = %file_name, mime_type = %mime_type))]
    pub async fn fetch(
        &self,
        source: &DocumentSource,
        mime_type: &str,
        file_name: &str,
    ) -> Result<PreparedDocument> {
        let bytes = match source {
            DocumentSource::StoragePath(key) => self
                .storage
                .fetch_object(key)
                .await
                .with_context(|| format!("Failed to download document from storage: {}", key))?,
            DocumentSource::Url(url) => self.download_url(url).await?,
        };

        if bytes.len() > self.settings.max_document_size_bytes {
            return Err(anyhow::anyhow!(
                "Document is {} bytes, above the {} byte limit",
                bytes.len(),
                self.settings.max_document_size_bytes
            ));
        }

        tracing::debug!(size = bytes.len(), "Document downloaded");
        prepare_document(bytes, mime_type, file_name).await
    }

    async fn download_url(&self, url: &str) -> Result<Vec<u8>> {
        let checked = check_document_url(
            url,
            self.settings.allow_private_urls,
            self.settings.url_allowlist.as_deref(),
        )
        .await
        .context("Document URL rejected")?;

        let client = self.client_for(&checked)?;
        let mut response = client
            .get(checked.url)
            .send()
            .await
            .context("Failed to download document")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Document download failed with status {}", status));
        }

        let limit = self.settings.max_document_size_bytes;
        if response.content_length().is_some_and(|len| len as usize > limit) {
            return Err(anyhow::anyhow!("Document is above the {} byte limit", limit));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read document body")?
        {
            if body.len() + chunk.len() > limit {
                return Err(anyhow::anyhow!("Document is above the {} byte limit", limit));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    /// Client that connects only to the addresses the URL check vetted.
    fn client_for(&self, checked: &CheckedUrl) -> Result<reqwest::Client> {
        match &checked.pinned {
            None => Ok(self.http_client.clone()),
            Some((host, addrs)) => download_client(&self.settings)
                .resolve_to_addrs(host, addrs)
                .build()
                .context("Failed to create pinned HTTP client for document download"),
        }
    }

    /// Temporary read URL for a stored document.
    pub async fn resolve_url(&self, storage_path: &str) -> Result<String> {
        self.storage
            .signed_read_url(storage_path, self.signed_url_ttl)
            .await
            .with_context(|| format!("Failed to sign URL for {}", storage_path))
    }
}
