use super::{ApiError, Cursor, Endpoint, Page, Provider};
use crate::models::UserProfile;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// A request the mock provider served, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    Page { collection: String, offset: usize },
    AddTracks { playlist_id: String, uris: Vec<String> },
    CurrentUser,
}

#[derive(Default)]
struct MockState {
    liked: Vec<Value>,
    playlists: Vec<Value>,
    playlist_tracks: HashMap<String, Vec<String>>,
    /// playlist id -> 1-based add call that fails
    failing_adds: HashMap<String, usize>,
    add_calls: HashMap<String, usize>,
    /// collection keys whose page fetches fail
    failing_collections: Vec<String>,
    token_expired: bool,
    requests: Vec<MockRequest>,
}

/// In-memory library used in tests and for offline dry runs.
/// Pages are served `page_size` items at a time with opaque `mock://` next
/// pointers, and added tracks are appended to the stored playlist so later
/// runs observe them.
pub struct MockProvider {
    user: UserProfile,
    page_size: usize,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(user_id: &str) -> Self {
        Self {
            user: UserProfile {
                id: user_id.to_string(),
                display_name: Some(format!("Mock {}", user_id)),
            },
            page_size: 50,
            state: Mutex::new(MockState::default()),
        }
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_liked_track(mut self, name: &str, uri: &str, artists: &[&str]) -> Self {
        let artists: Vec<Value> = artists.iter().map(|a| json!({ "name": a })).collect();
        self.state_mut().liked.push(json!({
            "added_at": "2024-01-01T00:00:00Z",
            "track": { "uri": uri, "name": name, "artists": artists }
        }));
        self
    }

    /// Push a raw saved-track item, e.g. one with a null track.
    pub fn with_liked_item(mut self, item: Value) -> Self {
        self.state_mut().liked.push(item);
        self
    }

    pub fn with_playlist(mut self, id: &str, name: &str, owner_id: &str, uris: &[&str]) -> Self {
        let st = self.state_mut();
        st.playlists.push(json!({
            "id": id,
            "name": name,
            "owner": { "id": owner_id },
            "tracks": { "href": format!("mock://playlists/{}/tracks", id), "total": uris.len() }
        }));
        st.playlist_tracks
            .insert(id.to_string(), uris.iter().map(|u| u.to_string()).collect());
        self
    }

    /// Make the `nth` (1-based) add call against `playlist_id` fail with a 500.
    pub fn fail_add_call(mut self, playlist_id: &str, nth: usize) -> Self {
        self.state_mut().failing_adds.insert(playlist_id.to_string(), nth);
        self
    }

    /// Make every page fetch of `playlist_id`'s tracks fail with a 502.
    pub fn fail_playlist_fetch(mut self, playlist_id: &str) -> Self {
        self.state_mut()
            .failing_collections
            .push(format!("playlists/{}/tracks", playlist_id));
        self
    }

    /// Answer every later request with a 401.
    pub fn expire_token(&self) {
        self.state().token_expired = true;
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.state().requests.clone()
    }

    /// Batches passed to `add_tracks` for one playlist, in call order.
    pub fn added_batches(&self, playlist_id: &str) -> Vec<Vec<String>> {
        self.state()
            .requests
            .iter()
            .filter_map(|r| match r {
                MockRequest::AddTracks { playlist_id: p, uris } if p == playlist_id => Some(uris.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn playlist_uris(&self, playlist_id: &str) -> Vec<String> {
        self.state()
            .playlist_tracks
            .get(playlist_id)
            .cloned()
            .unwrap_or_default()
    }

    fn parse_cursor(cursor: &Cursor) -> (String, usize, bool) {
        match cursor {
            Cursor::Start(endpoint) => {
                let uris_only = matches!(endpoint, Endpoint::PlaylistTracks { uris_only: true, .. });
                let path = endpoint.path_and_query();
                let key = path.split('?').next().unwrap_or_default().to_string();
                (key, 0, uris_only)
            }
            Cursor::Next(next) => {
                let rest = next.trim_start_matches("mock://");
                let (key, query) = rest.split_once('?').unwrap_or((rest, ""));
                let mut offset = 0;
                let mut uris_only = false;
                for pair in query.split('&') {
                    match pair.split_once('=') {
                        Some(("offset", v)) => offset = v.parse().unwrap_or(0),
                        Some(("uris_only", v)) => uris_only = v == "1",
                        _ => {}
                    }
                }
                (key.to_string(), offset, uris_only)
            }
        }
    }

    fn unauthorized() -> anyhow::Error {
        ApiError::Unauthorized {
            message: "The access token expired".into(),
        }
        .into()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_page(&self, cursor: &Cursor, _access_token: &str) -> Result<Page<Value>> {
        let (key, offset, uris_only) = Self::parse_cursor(cursor);
        let mut st = self.state();
        st.requests.push(MockRequest::Page {
            collection: key.clone(),
            offset,
        });
        if st.token_expired {
            return Err(Self::unauthorized());
        }
        if st.failing_collections.contains(&key) {
            return Err(ApiError::Status {
                status: 502,
                message: "Bad gateway".into(),
            }
            .into());
        }

        let all: Vec<Value> = match key.as_str() {
            "me/tracks" => st.liked.clone(),
            "me/playlists" => st.playlists.clone(),
            other => {
                let id = other
                    .strip_prefix("playlists/")
                    .and_then(|s| s.strip_suffix("/tracks"))
                    .unwrap_or_default();
                let id = urlencoding::decode(id).map(|s| s.into_owned()).unwrap_or_default();
                let uris = st.playlist_tracks.get(&id).ok_or_else(|| ApiError::Status {
                    status: 404,
                    message: "Not found.".into(),
                })?;
                uris.iter()
                    .map(|u| {
                        if uris_only {
                            json!({ "track": { "uri": u } })
                        } else {
                            json!({ "track": { "uri": u, "name": u, "artists": [] } })
                        }
                    })
                    .collect()
            }
        };

        let end = (offset + self.page_size).min(all.len());
        let items = all.get(offset..end).map(|s| s.to_vec()).unwrap_or_default();
        let next = (end < all.len()).then(|| {
            format!(
                "mock://{}?offset={}&uris_only={}",
                key,
                end,
                if uris_only { 1 } else { 0 }
            )
        });
        Ok(Page {
            items,
            next,
            total: Some(all.len() as u64),
        })
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String], _access_token: &str) -> Result<()> {
        info!("MockProvider: add_tracks {} -> {} tracks", playlist_id, uris.len());
        let mut st = self.state();
        st.requests.push(MockRequest::AddTracks {
            playlist_id: playlist_id.to_string(),
            uris: uris.to_vec(),
        });
        if st.token_expired {
            return Err(Self::unauthorized());
        }
        let call = {
            let n = st.add_calls.entry(playlist_id.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if st.failing_adds.get(playlist_id) == Some(&call) {
            return Err(ApiError::Status {
                status: 500,
                message: "Server error".into(),
            }
            .into());
        }
        let tracks = st
            .playlist_tracks
            .get_mut(playlist_id)
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: "Not found.".into(),
            })?;
        tracks.extend(uris.iter().cloned());
        Ok(())
    }

    async fn current_user(&self, _access_token: &str) -> Result<UserProfile> {
        let mut st = self.state();
        st.requests.push(MockRequest::CurrentUser);
        if st.token_expired {
            return Err(Self::unauthorized());
        }
        Ok(self.user.clone())
    }
}
