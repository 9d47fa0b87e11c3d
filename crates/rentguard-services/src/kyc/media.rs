//! Archiving of KYC session images into our own storage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentguard_core::models::{MediaContext, MediaSet};
use rentguard_core::KycSettings;
use rentguard_storage::{extension_for_content_type, identity_media_key, Storage};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::signature::sign;
use crate::model::truncate_for_log;

const AUTH_CLIENT_HEADER: &str = "X-AUTH-CLIENT";
const SIGNATURE_HEADER: &str = "X-HMAC-SIGNATURE";

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Copy the session's images into storage. Returns whatever succeeded.
    async fn retrieve(&self, session_id: &str) -> MediaSet;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VendorImage {
    id: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    timestamp: Option<JsonValue>,
}

impl VendorImage {
    fn taken_at(&self) -> Option<DateTime<Utc>> {
        let value = self.timestamp.as_ref()?;
        let text = value
            .as_str()
            .or_else(|| value.get("timestamp").and_then(JsonValue::as_str))?;
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Debug, Deserialize)]
struct MediaListing {
    #[serde(default)]
    images: Vec<VendorImage>,
}

/// Newest image per known context. Undated images lose to dated ones; among
/// undated images the later listing entry wins.
fn newest_per_context(images: Vec<VendorImage>) -> Vec<(MediaContext, VendorImage)> {
    let mut chosen: HashMap<MediaContext, VendorImage> = HashMap::new();
    for image in images {
        let Some(context) = image.context.as_deref().and_then(MediaContext::from_vendor_label)
        else {
            continue;
        };
        let replace = match chosen.get(&context) {
            None => true,
            Some(current) => match (image.taken_at(), current.taken_at()) {
                (Some(new), Some(old)) => new >= old,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => true,
            },
        };
        if replace {
            chosen.insert(context, image);
        }
    }

    MediaContext::ALL
        .into_iter()
        .filter_map(|context| chosen.remove(&context).map(|image| (context, image)))
        .collect()
}

/// Vendor media API client.
pub struct MediaRetriever {
    http_client: reqwest::Client,
    storage: Arc<dyn Storage>,
    base_url: String,
    api_key: Option<String>,
    shared_secret: Option<String>,
}

impl MediaRetriever {
    pub fn new(storage: Arc<dyn Storage>, settings: &KycSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.media_timeout_secs))
            .build()
            .context("Failed to create HTTP client for KYC media")?;

        Ok(Self {
            http_client,
            storage,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            shared_secret: settings.shared_secret.clone(),
        })
    }

    async fn signed_get(&self, url: &str, signed_value: &str) -> Result<reqwest::Response> {
        let (Some(api_key), Some(secret)) = (&self.api_key, &self.shared_secret) else {
            anyhow::bail!("KYC API credentials are not configured");
        };
        let signature = sign(secret, signed_value.as_bytes())?;

        let response = self
            .http_client
            .get(url)
            .header(AUTH_CLIENT_HEADER, api_key)
            .header(SIGNATURE_HEADER, signature)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Vendor media API returned {}: {}",
                status,
                truncate_for_log(&body)
            );
        }
        Ok(response)
    }

    async fn list_images(&self, session_id: &str) -> Result<Vec<VendorImage>> {
        let url = format!("{}/v1/sessions/{}/media", self.base_url, session_id);
        let listing: MediaListing = self
            .signed_get(&url, session_id)
            .await?
            .json()
            .await
            .context("Failed to parse media listing")?;
        Ok(listing.images)
    }

    async fn archive(
        &self,
        session_id: &str,
        context: MediaContext,
        image: &VendorImage,
    ) -> Result<String> {
        let url = format!("{}/v1/media/{}", self.base_url, image.id);
        let response = self.signed_get(&url, &image.id).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .or_else(|| image.mimetype.clone())
            .unwrap_or_else(|| "image/jpeg".to_string());
        let bytes = response
            .bytes()
            .await
            .context("Failed to read media body")?;

        let key = identity_media_key(
            session_id,
            context.vendor_label(),
            extension_for_content_type(&content_type),
        )?;
        let stored_url = self
            .storage
            .store_object(&key, bytes.to_vec(), &content_type)
            .await?;
        Ok(stored_url)
    }
}

#[async_trait]
impl MediaSource for MediaRetriever {
    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    async fn retrieve(&self, session_id: &str) -> MediaSet {
        let mut media = MediaSet::default();

        let images = match self.list_images(session_id).await {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list session media");
                return media;
            }
        };

        for (context, image) in newest_per_context(images) {
            match self.archive(session_id, context, &image).await {
                Ok(url) => {
                    tracing::debug!(context = context.vendor_label(), "Archived session image");
                    media.set(context, url);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        context = context.vendor_label(),
                        media_id = %image.id,
                        "Skipping session image"
                    );
                }
            }
        }

        media
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentguard_storage::LocalStorage;
    use serde_json::json;

    fn settings(base_url: String) -> KycSettings {
        KycSettings {
            shared_secret: Some("vendor-secret".to_string()),
            api_key: Some("client-key".to_string()),
            base_url,
            require_signature: false,
            media_timeout_secs: 5,
        }
    }

    #[test]
    fn test_newest_image_per_context() {
        let images: Vec<VendorImage> = serde_json::from_value(json!([
            {"id": "a", "context": "document-front", "timestamp": "2024-01-01T10:00:00Z"},
            {"id": "b", "context": "document-front", "timestamp": "2024-01-01T12:00:00Z"},
            {"id": "c", "context": "document-front", "timestamp": "2024-01-01T11:00:00Z"},
            {"id": "d", "context": "face"},
            {"id": "e", "context": "document-and-face"}
        ]))
        .unwrap();

        let chosen = newest_per_context(images);
        let ids: Vec<_> = chosen
            .iter()
            .map(|(context, image)| (*context, image.id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![(MediaContext::DocumentFront, "b"), (MediaContext::Face, "d")]
        );
    }

    #[tokio::test]
    async fn test_retrieve_archives_images_and_skips_failures() {
        let mut server = mockito::Server::new_async().await;
        let session = "3f1c9a2e-0c1d-4d52-9a57-1f0e8a7d6b11";
        let listing_signature = sign("vendor-secret", session.as_bytes()).unwrap();

        let listing = server
            .mock("GET", format!("/v1/sessions/{}/media", session).as_str())
            .match_header("x-auth-client", "client-key")
            .match_header("x-hmac-signature", listing_signature.as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"images": [
                    {"id": "front-1", "context": "document-front", "mimetype": "image/jpeg"},
                    {"id": "face-1", "context": "face", "mimetype": "image/png"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;
        let front = server
            .mock("GET", "/v1/media/front-1")
            .match_header(
                "x-hmac-signature",
                sign("vendor-secret", b"front-1").unwrap().as_str(),
            )
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(vec![0xff, 0xd8, 0xff])
            .create_async()
            .await;
        let face = server
            .mock("GET", "/v1/media/face-1")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            LocalStorage::new(dir.path(), "http://files.test".to_string())
                .await
                .unwrap(),
        );
        let retriever = MediaRetriever::new(storage.clone(), &settings(server.url())).unwrap();

        let media = retriever.retrieve(session).await;
        assert_eq!(
            media.document_front_url,
            Some(format!(
                "http://files.test/identity-verifications/{}/document-front.jpg",
                session
            ))
        );
        assert_eq!(media.face_url, None);
        assert_eq!(media.document_back_url, None);
        assert_eq!(
            storage
                .fetch_object(&format!("identity-verifications/{}/document-front.jpg", session))
                .await
                .unwrap(),
            vec![0xff, 0xd8, 0xff]
        );

        listing.assert_async().await;
        front.assert_async().await;
        face.assert_async().await;
    }

    #[tokio::test]
    async fn test_listing_failure_yields_empty_set() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/v1/sessions/sess-1/media")
            .with_status(401)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            LocalStorage::new(dir.path(), "http://files.test".to_string())
                .await
                .unwrap(),
        );
        let retriever = MediaRetriever::new(storage, &settings(server.url())).unwrap();
        assert!(retriever.retrieve("sess-1").await.is_empty());
    }
}
