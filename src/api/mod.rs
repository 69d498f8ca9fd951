pub mod mock;
pub mod pkce;
pub mod spotify;
pub mod spotify_auth;

use crate::models::UserProfile;
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

/// Typed failures of the remote API. Carried inside `anyhow::Error`;
/// use [`ApiError::is_unauthorized`] to detect an expired session.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API request failed with status 401: {message}")]
    Unauthorized { message: String },
    #[error("API request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected {what} payload: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Build the error for a non-2xx response from its status and raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = error_message(body).unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("unknown error")
                .to_string()
        });
        if status == 401 {
            ApiError::Unauthorized { message }
        } else {
            ApiError::Status { status, message }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode { .. } => None,
        }
    }

    pub fn is_unauthorized(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|c| matches!(c.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized { .. })))
    }
}

/// Pull a human readable message out of an error body. Handles the Web API
/// shape `{"error":{"message":..}}` and the OAuth shape
/// `{"error":"..","error_description":".."}`.
pub fn error_message(body: &str) -> Option<String> {
    let text = body.trim();
    if text.is_empty() {
        return None;
    }
    let Ok(j) = serde_json::from_str::<Value>(text) else {
        return Some(text.to_string());
    };
    j["error"]["message"]
        .as_str()
        .or_else(|| j["error_description"].as_str())
        .or_else(|| j["error"].as_str())
        .or_else(|| j["message"].as_str())
        .map(|s| s.to_string())
}

/// Collections the sync engine pages through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    SavedTracks { limit: u32 },
    UserPlaylists { limit: u32 },
    /// `uris_only` requests the `items(track(uri)),next` projection.
    PlaylistTracks {
        playlist_id: String,
        limit: u32,
        uris_only: bool,
    },
}

impl Endpoint {
    /// Path and query relative to the API base, without a leading slash.
    pub fn path_and_query(&self) -> String {
        match self {
            Endpoint::SavedTracks { limit } => format!("me/tracks?limit={}", limit),
            Endpoint::UserPlaylists { limit } => format!("me/playlists?limit={}", limit),
            Endpoint::PlaylistTracks {
                playlist_id,
                limit,
                uris_only,
            } => {
                let mut s = format!(
                    "playlists/{}/tracks?limit={}",
                    urlencoding::encode(playlist_id),
                    limit
                );
                if *uris_only {
                    s.push_str("&fields=items(track(uri)),next");
                }
                s
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Endpoint::SavedTracks { .. } => "liked songs",
            Endpoint::UserPlaylists { .. } => "playlists",
            Endpoint::PlaylistTracks { .. } => "playlist tracks",
        }
    }
}

/// Where to read the next page from: the first page of an endpoint, or an
/// opaque pointer handed out by the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Start(Endpoint),
    Next(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl<T> Page<T> {
    /// A null or empty `next` both end the collection.
    pub fn next_cursor(&self) -> Option<Cursor> {
        self.next
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map(|n| Cursor::Next(n.to_string()))
    }
}

/// Operations the sync engine needs from the streaming service. Every call
/// takes the bearer token explicitly; implementations hold no session.
/// Implementations: spotify::SpotifyProvider and mock::MockProvider.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Fetch one page of a collection.
    async fn fetch_page(&self, cursor: &Cursor, access_token: &str) -> Result<Page<Value>>;

    /// Append tracks (URIs) to a playlist. At most 100 per call; batching is
    /// done by the caller.
    async fn add_tracks(&self, playlist_id: &str, uris: &[String], access_token: &str) -> Result<()>;

    /// Profile of the user the token belongs to.
    async fn current_user(&self, access_token: &str) -> Result<UserProfile>;

    /// Return the provider's name (for logging)
    fn name(&self) -> &str;
}
