//! Read-only views of the user's library for the CLI.
use crate::api::{Endpoint, Provider};
use crate::models::{Playlist, TrackObject, UserProfile};
use crate::paging::{collect_all, fetch_total};
use crate::sync::fetch_playlists;
use anyhow::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryOverview {
    pub user: UserProfile,
    pub liked_count: u64,
    pub playlists: Vec<Playlist>,
}

/// Profile, liked songs count and every playlist, fetched concurrently.
pub async fn load_overview(provider: &dyn Provider, access_token: &str, page_size: u32) -> Result<LibraryOverview> {
    let (user, liked_count, playlists) = futures::try_join!(
        provider.current_user(access_token),
        fetch_total(provider, Endpoint::SavedTracks { limit: 1 }, access_token),
        fetch_playlists(provider, access_token, page_size),
    )?;
    Ok(LibraryOverview {
        user,
        liked_count,
        playlists,
    })
}

/// Which collection `list_tracks` reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    Liked,
    Playlist(String),
}

impl TrackSource {
    /// "liked" selects the liked songs; anything else is a playlist id.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "liked" | "liked-songs" => TrackSource::Liked,
            id => TrackSource::Playlist(id.to_string()),
        }
    }
}

#[derive(serde::Deserialize)]
struct TrackItem {
    #[serde(default)]
    track: Option<TrackObject>,
}

/// Every track of the collection, skipping unavailable entries.
pub async fn list_tracks(
    provider: &dyn Provider,
    source: &TrackSource,
    access_token: &str,
    liked_page_size: u32,
    playlist_tracks_page_size: u32,
) -> Result<Vec<TrackObject>> {
    let endpoint = match source {
        TrackSource::Liked => Endpoint::SavedTracks { limit: liked_page_size },
        TrackSource::Playlist(id) => Endpoint::PlaylistTracks {
            playlist_id: id.clone(),
            limit: playlist_tracks_page_size,
            uris_only: false,
        },
    };
    let items: Vec<TrackItem> = collect_all(provider, endpoint, access_token).await?;
    Ok(items.into_iter().filter_map(|it| it.track).collect())
}
