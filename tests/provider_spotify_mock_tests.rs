use artist_playlist_sync::api::spotify::SpotifyProvider;
use artist_playlist_sync::api::{ApiError, Endpoint, Provider};
use artist_playlist_sync::models::SavedTrackItem;
use artist_playlist_sync::paging::collect_all;
use artist_playlist_sync::sync::{sync, SyncOptions};
use mockito::{Matcher, Server};
use serde_json::json;

fn track(uri: &str, name: &str, artist: &str) -> serde_json::Value {
    json!({ "added_at": "2024-01-01T00:00:00Z", "track": { "uri": uri, "name": name, "artists": [{ "name": artist }] } })
}

#[test]
fn spotify_follows_opaque_next_pointers() {
    // Create mock server outside of any tokio runtime
    let mut server = Server::new();
    let base = server.url();

    let _m1 = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::UrlEncoded("limit".into(), "2".into()))
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [track("spotify:track:1", "One", "X"), track("spotify:track:2", "Two", "X")],
                "next": format!("{}/cursor/liked-2", base),
                "total": 3
            })
            .to_string(),
        )
        .create();
    let _m2 = server
        .mock("GET", "/cursor/liked-2")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "items": [track("spotify:track:3", "Three", "Y")], "next": null, "total": 3 }).to_string())
        .create();

    let provider = SpotifyProvider::new(base.clone());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let items: Vec<SavedTrackItem> = rt
        .block_on(collect_all(&provider, Endpoint::SavedTracks { limit: 2 }, "tok"))
        .unwrap();

    let uris: Vec<String> = items.into_iter().filter_map(|i| i.track.and_then(|t| t.uri)).collect();
    assert_eq!(uris, vec!["spotify:track:1", "spotify:track:2", "spotify:track:3"]);
}

#[test]
fn spotify_401_is_unauthorized_with_server_message() {
    let mut server = Server::new();
    let _m = server
        .mock("GET", "/me/playlists")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(json!({ "error": { "status": 401, "message": "The access token expired" } }).to_string())
        .create();

    let provider = SpotifyProvider::new(server.url());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let res: anyhow::Result<Vec<serde_json::Value>> =
        rt.block_on(collect_all(&provider, Endpoint::UserPlaylists { limit: 50 }, "old"));

    let err = res.unwrap_err();
    assert!(ApiError::is_unauthorized(&err));
    assert!(err.to_string().contains("The access token expired"));
}

#[test]
fn spotify_add_tracks_posts_uris_and_reports_failures() {
    let mut server = Server::new();
    let ok = server
        .mock("POST", "/playlists/pl1/tracks")
        .match_header("authorization", "Bearer tok")
        .match_body(Matcher::Json(json!({ "uris": ["spotify:track:a", "spotify:track:b"] })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "snapshot_id": "s1" }).to_string())
        .create();
    let _limited = server
        .mock("POST", "/playlists/pl2/tracks")
        .with_status(429)
        .with_header("retry-after", "3")
        .with_header("content-type", "application/json")
        .with_body(json!({ "error": { "status": 429, "message": "API rate limit exceeded" } }).to_string())
        .create();

    let provider = SpotifyProvider::new(server.url());
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        provider
            .add_tracks("pl1", &["spotify:track:a".to_string(), "spotify:track:b".to_string()], "tok")
            .await
            .unwrap();

        let err = provider
            .add_tracks("pl2", &["spotify:track:a".to_string()], "tok")
            .await
            .unwrap_err();
        assert!(!ApiError::is_unauthorized(&err));
        assert_eq!(
            err.to_string(),
            "API request failed with status 429: API rate limit exceeded"
        );
    });
    ok.assert();
}

#[test]
fn spotify_current_user() {
    let mut server = Server::new();
    let _m = server
        .mock("GET", "/me")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "id": "mock_user", "display_name": "Mock User" }).to_string())
        .create();

    let provider = SpotifyProvider::new(format!("{}/", server.url()));
    let rt = tokio::runtime::Runtime::new().unwrap();
    let me = rt.block_on(provider.current_user("tok")).unwrap();
    assert_eq!(me.id, "mock_user");
    assert_eq!(me.label(), "Mock User");
}

#[test]
fn spotify_end_to_end_sync() {
    let mut server = Server::new();
    let base = server.url();

    let _liked = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [track("spotify:track:u1", "One", "X"), track("spotify:track:u2", "Two", "X")],
                "next": null
            })
            .to_string(),
        )
        .create();
    let _playlists = server
        .mock("GET", "/me/playlists")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    { "id": "p1", "name": "x", "owner": { "id": "me" }, "tracks": { "href": format!("{}/playlists/p1/tracks", base), "total": 1 } },
                    { "id": "p2", "name": "X", "owner": { "id": "someone" }, "tracks": { "href": format!("{}/playlists/p2/tracks", base), "total": 0 } }
                ],
                "next": null
            })
            .to_string(),
        )
        .create();
    let _existing = server
        .mock("GET", "/playlists/p1/tracks")
        .match_query(Matcher::UrlEncoded("fields".into(), "items(track(uri)),next".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "items": [{ "track": { "uri": "spotify:track:u1" } }, { "track": null }], "next": null }).to_string())
        .create();
    let add = server
        .mock("POST", "/playlists/p1/tracks")
        .match_body(Matcher::Json(json!({ "uris": ["spotify:track:u2"] })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "snapshot_id": "s2" }).to_string())
        .expect(1)
        .create();
    let untouched = server
        .mock("POST", "/playlists/p2/tracks")
        .expect(0)
        .create();

    let provider = SpotifyProvider::new(base.clone());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let report = rt
        .block_on(sync(&provider, "tok", "me", &SyncOptions::default()))
        .unwrap();

    assert_eq!(report.songs_added, 1);
    assert_eq!(report.playlists_matched, vec!["x".to_string()]);
    assert!(report.errors.is_empty());
    add.assert();
    untouched.assert();
}
