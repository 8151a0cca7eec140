//! Publishing rendered regions to a social media account.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compose::EncodedImage;
use crate::config::ProfileSettings;
use crate::http::fetch_json;
use crate::model::{LonLat, RegionId, StatusId};
use crate::ports::PortError;

#[derive(Debug, Clone)]
/// Everything needed to publish one region.
pub struct Post {
    /// Region the post is about.
    pub region: RegionId,
    /// Status text.
    pub text: String,
    /// Image attached to the status.
    pub image: EncodedImage,
    /// Optional location of the region.
    pub location: Option<LonLat>,
}

#[async_trait]
/// Destination posts are published to.
pub trait Publisher: Send + Sync {
    /// Publish a post and return the id of the created status.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the upload or the status creation fails.
    async fn publish(&self, post: &Post) -> Result<StatusId, PortError>;
}

/// Image description for screen readers: the post text without its links.
#[must_use]
pub fn alt_text(text: &str) -> String {
    let described = text
        .lines()
        .map(|line| {
            line.split_whitespace()
                .filter(|word| !word.starts_with("http://") && !word.starts_with("https://"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("An aerial image of {}", described.trim())
}

#[derive(Debug, Deserialize)]
struct MediaAttachment {
    id: String,
}

#[derive(Debug, Serialize)]
struct StatusRequest<'post> {
    status: &'post str,
    media_ids: Vec<String>,
    sensitive: bool,
    visibility: &'static str,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
}

/// Publisher posting public statuses to a Mastodon account.
pub struct MastodonPublisher {
    client: Client,
    api_base_url: String,
    access_token: String,
}

impl MastodonPublisher {
    /// Create a publisher bound to the given HTTP client.
    #[must_use]
    pub fn new<U: Into<String>, T: Into<String>>(
        client: Client,
        api_base_url: U,
        access_token: T,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            access_token: access_token.into(),
        }
    }

    /// Publisher for a profile's bot account.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Config`] when the instance URL or the token is missing.
    pub fn from_settings(
        client: Client,
        profile: &str,
        settings: &ProfileSettings,
    ) -> Result<Self, PortError> {
        let missing = |key: &str| PortError::Config(format!("profiles.{profile}.{key} is not set"));
        let base_url = settings
            .mastodon_api_base_url
            .as_deref()
            .ok_or_else(|| missing("mastodon_api_base_url"))?;
        let token = settings
            .mastodon_access_token
            .as_deref()
            .ok_or_else(|| missing("mastodon_access_token"))?;
        Ok(Self::new(client, base_url, token))
    }
}

#[async_trait]
impl Publisher for MastodonPublisher {
    async fn publish(&self, post: &Post) -> Result<StatusId, PortError> {
        let file_name = format!("{}.{}", post.region, post.image.format.extension());
        let file = Part::bytes(post.image.bytes.clone())
            .file_name(file_name)
            .mime_str(post.image.format.mime_type())?;
        let form = Form::new()
            .part("file", file)
            .text("description", alt_text(&post.text));

        let media: MediaAttachment = fetch_json(
            self.client
                .post(format!("{}/api/v2/media", self.api_base_url))
                .bearer_auth(&self.access_token)
                .multipart(form),
            "media upload",
        )
        .await?;
        debug!(media_id = %media.id, "image uploaded");

        if let Some(location) = post.location {
            debug!(lon = location.lon, lat = location.lat, "mastodon statuses carry no location");
        }

        let status: Status = fetch_json(
            self.client
                .post(format!("{}/api/v1/statuses", self.api_base_url))
                .bearer_auth(&self.access_token)
                .json(&StatusRequest {
                    status: &post.text,
                    media_ids: vec![media.id],
                    sensitive: false,
                    visibility: "public",
                }),
            "status",
        )
        .await?;

        info!(region = %post.region, status_id = %status.id, "status published");
        Ok(StatusId(status.id))
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;
    use crate::compose::OutputFormat;

    #[test]
    fn alt_text_drops_links() {
        let text = concat!(
            "Alcalá de Henares (Madrid)\n\n\n",
            "https://es.wikipedia.org/wiki/Alcal%C3%A1_de_Henares"
        );
        assert_eq!(alt_text(text), "An aerial image of Alcalá de Henares (Madrid)");
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let settings = ProfileSettings {
            mastodon_api_base_url: Some(String::from("https://example.social")),
            ..ProfileSettings::default()
        };
        let result = MastodonPublisher::from_settings(Client::new(), "es", &settings);
        assert!(matches!(result, Err(PortError::Config(_))), "token missing");
    }

    #[tokio::test]
    async fn uploads_media_then_posts_status() {
        let router = Router::new()
            .route(
                "/api/v2/media",
                post(|| async { Json(serde_json::json!({ "id": "77" })) }),
            )
            .route(
                "/api/v1/statuses",
                post(|Json(body): Json<serde_json::Value>| async move {
                    let media_ok = body["media_ids"] == serde_json::json!(["77"]);
                    let id = if media_ok { "1234" } else { "wrong-media" };
                    Json(serde_json::json!({ "id": id }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local port");
        let addr = listener.local_addr().expect("local address");
        tokio::spawn(async move { axum::serve(listener, router).await });

        let publisher = MastodonPublisher::new(Client::new(), format!("http://{addr}/"), "token");
        let status = publisher
            .publish(&Post {
                region: RegionId::from("08019"),
                text: String::from("Barcelona (Barcelona)"),
                image: EncodedImage {
                    bytes: vec![0xFF, 0xD8, 0xFF],
                    format: OutputFormat::default(),
                    width: 1,
                    height: 1,
                },
                location: None,
            })
            .await
            .expect("published");
        assert_eq!(status, StatusId(String::from("1234")));
    }
}
