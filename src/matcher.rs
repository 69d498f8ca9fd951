use crate::index::{normalize, ArtistIndex};
use crate::models::{Match, Playlist};
use tracing::info;

/// Select the playlists owned by `user_id` whose normalized name is an
/// artist key. Output follows the input playlist order.
///
/// Playlists owned by anyone else are never matched, even on an exact name
/// match, since the sync would otherwise mutate them.
pub fn match_playlists(playlists: &[Playlist], index: &ArtistIndex, user_id: &str) -> Vec<Match> {
    let mut matches = Vec::new();
    for playlist in playlists {
        if playlist.owner_id != user_id {
            info!(
                "Skipping playlist \"{}\" - not owned by you (owner: {})",
                playlist.name, playlist.owner_id
            );
            continue;
        }
        let key = normalize(&playlist.name);
        if let Some(songs) = index.get(&key) {
            matches.push(Match {
                playlist: playlist.clone(),
                artist_key: key,
                songs: songs.to_vec(),
            });
        }
    }
    matches
}
