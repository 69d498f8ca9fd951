use crate::models::{SavedTrackItem, Song};
use std::collections::HashMap;

/// Join key between artist names and playlist names: lower-cased and
/// trimmed. No unicode folding, so "Beyoncé" and "Beyonce" stay distinct.
pub fn normalize(name: &str) -> String {
    name.to_lowercase().trim().to_string()
}

/// Artist key -> liked songs crediting that artist.
///
/// Keys keep first-discovery order and each list keeps liked-songs order.
/// A track crediting N artists appears in N lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtistIndex {
    keys: Vec<String>,
    songs: HashMap<String, Vec<Song>>,
}

impl ArtistIndex {
    pub fn build(items: &[SavedTrackItem]) -> Self {
        let mut index = Self::default();
        for item in items {
            let Some(track) = &item.track else { continue };
            let Some(artists) = &track.artists else { continue };
            let Some(uri) = &track.uri else { continue };

            let credited: Vec<String> = artists.iter().map(|a| a.name.clone()).collect();
            for artist in artists {
                index.push(
                    normalize(&artist.name),
                    Song {
                        uri: uri.clone(),
                        name: track.name.clone(),
                        artists: credited.clone(),
                    },
                );
            }
        }
        index
    }

    fn push(&mut self, key: String, song: Song) {
        match self.songs.get_mut(&key) {
            Some(list) => list.push(song),
            None => {
                self.keys.push(key.clone());
                self.songs.insert(key, vec![song]);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&[Song]> {
        self.songs.get(key).map(|v| v.as_slice())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.songs.contains_key(key)
    }

    /// Artist keys in discovery order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_trims() {
        assert_eq!(normalize("  The Beatles "), "the beatles");
        assert_eq!(normalize("THE BEATLES"), "the beatles");
        assert_eq!(normalize("Beyoncé"), "beyoncé");
    }
}
