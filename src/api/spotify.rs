use super::{ApiError, Cursor, Page, Provider};
use crate::config::Config;
use crate::models::UserProfile;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::{json, Value};

/// Provider backed by the Spotify Web API.
/// Holds no token: every request carries the bearer passed by the caller.
pub struct SpotifyProvider {
    client: Client,
    api_base: String,
}

impl SpotifyProvider {
    /// `api_base` includes the version path, e.g. `https://api.spotify.com/v1`.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_base)
    }

    pub fn with_client(client: Client, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { client, api_base }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.api_base.clone())
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url_for(&self, cursor: &Cursor) -> String {
        match cursor {
            Cursor::Start(endpoint) => format!("{}/{}", self.api_base, endpoint.path_and_query()),
            Cursor::Next(url) => url.clone(),
        }
    }

    /// Turn a non-2xx response into an [`ApiError`] carrying the server message.
    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let err = ApiError::from_response(status.as_u16(), &body);
        warn!("API error: {}", err);
        Err(err.into())
    }

    async fn get_json(&self, url: &str, access_token: &str) -> Result<Value> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(ApiError::from)?;
        let resp = Self::check(resp).await?;
        let j: Value = resp.json().await.map_err(ApiError::from)?;
        Ok(j)
    }
}

#[async_trait]
impl Provider for SpotifyProvider {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn fetch_page(&self, cursor: &Cursor, access_token: &str) -> Result<Page<Value>> {
        let url = self.url_for(cursor);
        let j = self.get_json(&url, access_token).await?;
        let page: Page<Value> =
            serde_json::from_value(j).map_err(|source| ApiError::Decode { what: "page", source })?;
        Ok(page)
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String], access_token: &str) -> Result<()> {
        let url = format!(
            "{}/playlists/{}/tracks",
            self.api_base,
            urlencoding::encode(playlist_id)
        );
        let body = json!({ "uris": uris });
        debug!("POST {} ({} uris)", url, uris.len());
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ApiError::from)?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<UserProfile> {
        let url = format!("{}/me", self.api_base);
        let j = self.get_json(&url, access_token).await?;
        let profile: UserProfile =
            serde_json::from_value(j).map_err(|source| ApiError::Decode { what: "profile", source })?;
        Ok(profile)
    }
}
