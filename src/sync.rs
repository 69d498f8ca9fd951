//! Artist playlist reconciliation.
//!
//! Liked songs and playlists are collected in full, liked songs are indexed
//! by artist, owned playlists named after an artist are matched, and each
//! match gets the artist's liked songs it is missing appended in batches.
use crate::api::{ApiError, Endpoint, Provider};
use crate::config::Config;
use crate::index::ArtistIndex;
use crate::matcher::match_playlists;
use crate::models::{Match, Playlist, PlaylistObject, PlaylistTrackItem, SavedTrackItem, Song, SyncReport};
use crate::paging::collect_all;
use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Per-request limit of the add-tracks endpoint.
pub const MAX_BATCH_SIZE: usize = 100;

pub const NO_LIKED_SONGS: &str = "No liked songs found.";
pub const NO_MATCHING_PLAYLISTS: &str =
    "No playlists match artist names from your liked songs. Make sure the playlists are owned by you.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub liked_page_size: u32,
    pub playlist_page_size: u32,
    pub playlist_tracks_page_size: u32,
    /// Clamped to 1..=MAX_BATCH_SIZE when used.
    pub batch_size: usize,
    /// Compute what would be added without mutating anything.
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            liked_page_size: 50,
            playlist_page_size: 50,
            playlist_tracks_page_size: 100,
            batch_size: MAX_BATCH_SIZE,
            dry_run: false,
        }
    }
}

impl SyncOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            liked_page_size: cfg.liked_page_size,
            playlist_page_size: cfg.playlist_page_size,
            playlist_tracks_page_size: cfg.playlist_tracks_page_size,
            batch_size: cfg.max_batch_size,
            dry_run: false,
        }
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }
}

/// Result of reconciling one matched playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistOutcome {
    Synced { added: usize },
    /// Carries no count: batches already sent before the failure stay on the
    /// remote but are not reported as added.
    Failed { error: String },
}

impl PlaylistOutcome {
    pub fn added(&self) -> usize {
        match self {
            PlaylistOutcome::Synced { added } => *added,
            PlaylistOutcome::Failed { .. } => 0,
        }
    }
}

impl SyncReport {
    pub fn record(&mut self, outcome: PlaylistOutcome) {
        match outcome {
            PlaylistOutcome::Synced { added } => self.songs_added += added,
            PlaylistOutcome::Failed { error } => self.errors.push(error),
        }
    }
}

pub async fn fetch_liked_tracks(
    provider: &dyn Provider,
    access_token: &str,
    page_size: u32,
) -> Result<Vec<SavedTrackItem>> {
    collect_all(provider, Endpoint::SavedTracks { limit: page_size }, access_token).await
}

pub async fn fetch_playlists(provider: &dyn Provider, access_token: &str, page_size: u32) -> Result<Vec<Playlist>> {
    let raw: Vec<PlaylistObject> =
        collect_all(provider, Endpoint::UserPlaylists { limit: page_size }, access_token).await?;
    Ok(raw.into_iter().map(Playlist::from).collect())
}

/// Every track URI currently in the playlist. Unavailable entries (null
/// track) are skipped.
pub async fn fetch_playlist_uris(
    provider: &dyn Provider,
    playlist_id: &str,
    access_token: &str,
    page_size: u32,
) -> Result<HashSet<String>> {
    let endpoint = Endpoint::PlaylistTracks {
        playlist_id: playlist_id.to_string(),
        limit: page_size,
        uris_only: true,
    };
    let items: Vec<PlaylistTrackItem> = collect_all(provider, endpoint, access_token).await?;
    Ok(items
        .into_iter()
        .filter_map(|it| it.track.and_then(|t| t.uri))
        .collect())
}

/// Songs whose URI is not already present, first occurrence only, in the
/// order given.
pub fn songs_to_add<'a>(songs: &'a [Song], existing: &HashSet<String>) -> Vec<&'a Song> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for s in songs {
        if !existing.contains(&s.uri) && seen.insert(s.uri.as_str()) {
            out.push(s);
        }
    }
    out
}

/// Bring one matched playlist up to date. Failures are folded into the
/// outcome, except an expired session, which is returned as an error.
pub async fn reconcile_playlist(
    provider: &dyn Provider,
    m: &Match,
    access_token: &str,
    options: &SyncOptions,
) -> Result<PlaylistOutcome> {
    let playlist = &m.playlist;
    let failed = |e: &anyhow::Error| PlaylistOutcome::Failed {
        error: format!("Error syncing {}: {}", playlist.name, e),
    };

    let existing = match fetch_playlist_uris(provider, &playlist.id, access_token, options.playlist_tracks_page_size).await {
        Ok(uris) => uris,
        Err(e) if ApiError::is_unauthorized(&e) => return Err(e),
        Err(e) => {
            error!("Error reading tracks of {}: {}", playlist.name, e);
            return Ok(failed(&e));
        }
    };

    let pending: Vec<String> = songs_to_add(&m.songs, &existing)
        .into_iter()
        .map(|s| s.uri.clone())
        .collect();
    if pending.is_empty() {
        info!("No new songs to add to {}", playlist.name);
        return Ok(PlaylistOutcome::Synced { added: 0 });
    }
    if options.dry_run {
        info!("Would add {} songs to {}", pending.len(), playlist.name);
        return Ok(PlaylistOutcome::Synced { added: pending.len() });
    }

    let mut added = 0;
    for batch in pending.chunks(options.effective_batch_size()) {
        match provider.add_tracks(&playlist.id, batch, access_token).await {
            Ok(()) => {
                added += batch.len();
                info!("Added {} songs to {}", batch.len(), playlist.name);
            }
            Err(e) if ApiError::is_unauthorized(&e) => return Err(e),
            Err(e) => {
                error!("Failed to add batch to {}: {}", playlist.name, e);
                return Ok(failed(&e));
            }
        }
    }
    Ok(PlaylistOutcome::Synced { added })
}

/// Add every liked song to the owned playlist named after its artist.
///
/// Returns `Err` for failures that stop the whole run (collection failures,
/// expired session). Per-playlist failures land in `SyncReport::errors`.
/// When there is nothing to do, the report carries `message`.
pub async fn sync(
    provider: &dyn Provider,
    access_token: &str,
    user_id: &str,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let mut report = SyncReport {
        dry_run: options.dry_run,
        ..SyncReport::default()
    };

    info!("Fetching liked songs...");
    let liked = fetch_liked_tracks(provider, access_token, options.liked_page_size)
        .await
        .context("fetching liked songs")?;
    if liked.is_empty() {
        report.message = Some(NO_LIKED_SONGS.to_string());
        return Ok(report);
    }

    info!("Extracting artists from {} liked songs...", liked.len());
    let index = ArtistIndex::build(&liked);
    report.artists_found = index.keys().to_vec();

    info!("Fetching playlists...");
    let playlists = fetch_playlists(provider, access_token, options.playlist_page_size)
        .await
        .context("fetching playlists")?;

    let matches = match_playlists(&playlists, &index, user_id);
    report.playlists_matched = matches.iter().map(|m| m.playlist.name.clone()).collect();
    if matches.is_empty() {
        report.message = Some(NO_MATCHING_PLAYLISTS.to_string());
        return Ok(report);
    }

    for m in &matches {
        info!("Processing playlist: {}", m.playlist.name);
        let outcome = reconcile_playlist(provider, m, access_token, options).await?;
        if let PlaylistOutcome::Failed { error } = &outcome {
            warn!("{}", error);
        }
        report.record(outcome);
    }

    info!(
        "Sync finished: {} artists, {} playlists matched, {} songs {}, {} errors",
        report.artists_found.len(),
        report.playlists_matched.len(),
        report.songs_added,
        if report.dry_run { "to add" } else { "added" },
        report.errors.len()
    );
    Ok(report)
}
