//! Hosted cross-posting API client
//!
//! One HTTP POST per platform per post, sent to the hosted proxy which
//! holds the actual platform integrations. Each platform keeps its native
//! payload vocabulary so the proxy can pass bodies through unchanged.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::{PlatformError, Result};
use crate::types::{Platform, PlatformPost, PostContent};

use super::PlatformApi;

/// Client for the hosted posting proxy
pub struct HostedApi {
    base_url: String,
    client: reqwest::Client,
}

impl HostedApi {
    /// Create a client for the proxy at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn post_url(&self, platform: Platform) -> String {
        format!("{}/v1/{}/posts", self.base_url, platform)
    }
}

/// Response body returned by the proxy on success
#[derive(Debug, Deserialize)]
struct PostResponse {
    #[serde(alias = "postId")]
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[async_trait]
impl PlatformApi for HostedApi {
    #[instrument(skip(self, content, token), fields(platform = %platform))]
    async fn post_status(
        &self,
        platform: Platform,
        content: &PostContent,
        token: &str,
    ) -> Result<PlatformPost> {
        let payload = build_payload(platform, content)?;
        let url = self.post_url(platform);

        debug!(url = %url, "dispatching post to hosted API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlatformError::Network(format!("{} request timed out: {}", platform, e))
                } else {
                    PlatformError::Network(format!("{} request failed: {}", platform, e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let body: PostResponse = response.json().await.map_err(|e| {
                PlatformError::Posting(format!("{} returned an unreadable response: {}", platform, e))
            })?;
            return Ok(PlatformPost {
                id: body.id,
                url: body.url,
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(platform, status, &body).into())
    }
}

/// Build the per-platform request body
///
/// Each platform keeps its own field vocabulary; the proxy forwards these
/// bodies to the platform APIs as-is.
pub(crate) fn build_payload(
    platform: Platform,
    content: &PostContent,
) -> Result<serde_json::Value> {
    let media_urls: Vec<&str> = content.media.iter().map(|m| m.url.as_str()).collect();

    let payload = match platform {
        Platform::Twitter => {
            let mut body = json!({ "text": content.text });
            if !media_urls.is_empty() {
                body["media"] = json!({ "urls": media_urls });
            }
            body
        }
        Platform::Mastodon => {
            let mut body = json!({ "status": content.text });
            if !media_urls.is_empty() {
                body["media_urls"] = json!(media_urls);
            }
            body
        }
        Platform::Linkedin => json!({
            "commentary": content.text,
            "visibility": "PUBLIC",
            "media_urls": media_urls,
        }),
        Platform::Facebook => {
            let mut body = json!({ "message": content.text });
            if !media_urls.is_empty() {
                body["attached_media"] = json!(media_urls);
            }
            body
        }
        Platform::Instagram => {
            // Instagram has no text-only posts
            let first = media_urls.first().ok_or_else(|| {
                PlatformError::Validation(
                    "Instagram posts require at least one media item".to_string(),
                )
            })?;
            json!({
                "caption": content.text,
                "media_url": first,
            })
        }
    };

    Ok(payload)
}

/// Map an HTTP error status onto the platform error taxonomy
pub(crate) fn error_for_status(
    platform: Platform,
    status: StatusCode,
    body: &str,
) -> PlatformError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.chars().take(200).collect::<String>())
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::Authentication(format!("{} rejected the token ({})", platform, detail))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            PlatformError::RateLimit(format!("{} rate limit hit ({})", platform, detail))
        }
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY => {
            PlatformError::Validation(format!("{} rejected the content ({})", platform, detail))
        }
        s if s.is_server_error() => {
            PlatformError::Network(format!("{} upstream error ({})", platform, detail))
        }
        _ => PlatformError::Posting(format!("{} post failed ({})", platform, detail)),
    }
}
