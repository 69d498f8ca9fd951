use serde::{Deserialize, Serialize};

/// One entry of the saved-tracks ("liked songs") collection as the API
/// returns it. Either level may be missing for removed or local tracks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SavedTrackItem {
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub track: Option<TrackObject>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackObject {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Option<Vec<ArtistObject>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtistObject {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// Playlist as listed by `me/playlists`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub owner: OwnerObject,
    #[serde(default)]
    pub tracks: Option<TracksRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnerObject {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TracksRef {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub total: u64,
}

/// Item of a playlist's track listing. With the `items(track(uri))`
/// projection only `track.uri` is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaylistTrackItem {
    #[serde(default)]
    pub track: Option<TrackObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserProfile {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// A liked song as indexed under one of its artists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Song {
    pub uri: String,
    pub name: String,
    /// Every credited artist, in credit order.
    pub artists: Vec<String>,
}

impl Song {
    pub fn artist_names(&self) -> String {
        self.artists.join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub track_count: u64,
    pub tracks_endpoint: Option<String>,
}

impl From<PlaylistObject> for Playlist {
    fn from(p: PlaylistObject) -> Self {
        let (track_count, tracks_endpoint) = match p.tracks {
            Some(t) => (t.total, t.href),
            None => (0, None),
        };
        Self {
            id: p.id,
            name: p.name,
            owner_id: p.owner.id,
            track_count,
            tracks_endpoint,
        }
    }
}

/// A playlist proven eligible for sync: owned by the user and named after
/// an artist key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub playlist: Playlist,
    pub artist_key: String,
    pub songs: Vec<Song>,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncReport {
    pub artists_found: Vec<String>,
    pub playlists_matched: Vec<String>,
    pub songs_added: usize,
    pub errors: Vec<String>,
    /// Reserved; never populated.
    pub skipped_playlists: Vec<String>,
    /// Set when the run stopped early because there was nothing to do.
    #[serde(default)]
    pub message: Option<String>,
    /// When true `songs_added` counts songs that would have been added.
    #[serde(default)]
    pub dry_run: bool,
}

impl SyncReport {
    pub fn is_informational(&self) -> bool {
        self.message.is_some()
    }
}
