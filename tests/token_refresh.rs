use artist_playlist_sync as lib;
use lib::api::spotify_auth::{self, StoredToken};
use lib::api::{pkce, ApiError};
use lib::config::Config;
use lib::db;
use mockito::{Matcher, Server};
use serde_json::json;

fn test_config(auth_base: &str, db_path: std::path::PathBuf) -> Config {
    Config {
        auth_base: auth_base.to_string(),
        redirect_uri: "http://127.0.0.1:8888/callback".into(),
        db_path,
        ..Config::default()
    }
}

fn store(cfg: &Config, token: serde_json::Value, client_id: Option<&str>) {
    let conn = db::open_or_create(&cfg.db_path).expect("open db");
    db::save_credential_raw(&conn, spotify_auth::PROVIDER, &token.to_string(), client_id).expect("save cred");
}

#[test]
fn authorize_url_carries_pkce_parameters() {
    let cfg = test_config("https://accounts.example.com/", std::path::PathBuf::from("/tmp/unused.db"));
    let challenge = pkce::code_challenge_s256("artist-playlist-sync-verifier");
    let url = spotify_auth::authorize_url(&cfg, "cid", &challenge).unwrap();

    assert_eq!(url.path(), "/authorize");
    let q: std::collections::HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(q["client_id"], "cid");
    assert_eq!(q["response_type"], "code");
    assert_eq!(q["redirect_uri"], "http://127.0.0.1:8888/callback");
    assert_eq!(q["code_challenge_method"], "S256");
    assert_eq!(q["code_challenge"], "_dAFA3Fqri6kAk8I378kMWDXeVrGipthqMGsxy3U_KE");
    assert!(q["scope"].split(' ').any(|s| s == "user-library-read"));
}

#[test]
fn extract_code_from_redirect() {
    let code = spotify_auth::extract_code("http://127.0.0.1:8888/callback?code=AQB123&state=x\n").unwrap();
    assert_eq!(code, "AQB123");

    let denied = spotify_auth::extract_code("http://127.0.0.1:8888/callback?error=access_denied").unwrap_err();
    assert!(denied.to_string().contains("access_denied"));

    assert!(spotify_auth::extract_code("http://127.0.0.1:8888/callback").is_err());
    assert!(spotify_auth::extract_code("not a url").is_err());
}

#[test]
fn exchange_code_sends_verifier_without_secret() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/api/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("client_id".into(), "cid".into()),
            Matcher::UrlEncoded("code".into(), "the-code".into()),
            Matcher::UrlEncoded("code_verifier".into(), "the-verifier".into()),
            Matcher::UrlEncoded("redirect_uri".into(), "http://127.0.0.1:8888/callback".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "r1",
                "scope": "user-library-read"
            })
            .to_string(),
        )
        .create();

    let dir = tempfile::tempdir().expect("tmpdir");
    let cfg = test_config(&server.url(), dir.path().join("sync.db"));
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let client = reqwest::Client::new();
    let token = rt
        .block_on(spotify_auth::exchange_code(&client, &cfg, "cid", "the-code", "the-verifier"))
        .expect("exchange");

    assert_eq!(token.access_token, "fresh");
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    assert!(!token.needs_refresh(chrono::Utc::now().timestamp()));
}

#[test]
fn exchange_code_reports_error_description() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(json!({ "error": "invalid_request", "error_description": "code_verifier was incorrect" }).to_string())
        .create();

    let dir = tempfile::tempdir().expect("tmpdir");
    let cfg = test_config(&server.url(), dir.path().join("sync.db"));
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let err = rt
        .block_on(spotify_auth::exchange_code(&reqwest::Client::new(), &cfg, "cid", "c", "v"))
        .unwrap_err();
    assert!(err.to_string().contains("code_verifier was incorrect"));
    assert!(!ApiError::is_unauthorized(&err));
}

#[test]
fn valid_token_is_returned_without_refresh() {
    let dir = tempfile::tempdir().expect("tmpdir");
    // nothing listens here; a refresh attempt would fail
    let cfg = test_config("http://127.0.0.1:9", dir.path().join("sync.db"));
    let now = chrono::Utc::now().timestamp();
    store(
        &cfg,
        json!({ "access_token": "still-good", "token_type": "Bearer", "expires_at": now + 3600, "refresh_token": "r", "scope": null }),
        Some("cid"),
    );

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let token = rt
        .block_on(spotify_auth::load_access_token(&reqwest::Client::new(), &cfg))
        .expect("token");
    assert_eq!(token, "still-good");
}

#[test]
fn expired_token_is_refreshed_and_persisted() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/api/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-spotify".into()),
            Matcher::UrlEncoded("client_id".into(), "test_id".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "access_token": "new-access-token", "expires_in": 3600, "scope": "user-library-read" }).to_string())
        .create();

    let dir = tempfile::tempdir().expect("tmpdir");
    let cfg = test_config(&server.url(), dir.path().join("sync.db"));
    store(
        &cfg,
        json!({ "access_token": "old", "token_type": "Bearer", "expires_at": 0, "refresh_token": "refresh-spotify" }),
        Some("test_id"),
    );

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let token = rt
        .block_on(spotify_auth::load_access_token(&reqwest::Client::new(), &cfg))
        .expect("refresh");
    assert_eq!(token, "new-access-token");

    let conn = db::open_or_create(&cfg.db_path).unwrap();
    let (json, client_id) = db::load_credential_with_client(&conn, spotify_auth::PROVIDER)
        .unwrap()
        .unwrap();
    let stored: StoredToken = serde_json::from_str(&json).unwrap();
    assert_eq!(stored.access_token, "new-access-token");
    // the response carried no new refresh token; the old one is kept
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-spotify"));
    assert_eq!(client_id.as_deref(), Some("test_id"));
}

#[test]
fn revoked_refresh_token_asks_for_login() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(json!({ "error": "invalid_grant", "error_description": "Refresh token revoked" }).to_string())
        .create();

    let dir = tempfile::tempdir().expect("tmpdir");
    let cfg = test_config(&server.url(), dir.path().join("sync.db"));
    store(
        &cfg,
        json!({ "access_token": "old", "token_type": "Bearer", "expires_at": 0, "refresh_token": "gone" }),
        Some("test_id"),
    );

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let err = rt
        .block_on(spotify_auth::load_access_token(&reqwest::Client::new(), &cfg))
        .unwrap_err();
    assert!(ApiError::is_unauthorized(&err));
    assert!(err.to_string().contains("Refresh token revoked"));
}

#[test]
fn missing_token_asks_for_login_and_logout_clears() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let cfg = test_config("http://127.0.0.1:9", dir.path().join("sync.db"));
    let rt = tokio::runtime::Runtime::new().expect("rt");

    let err = rt
        .block_on(spotify_auth::load_access_token(&reqwest::Client::new(), &cfg))
        .unwrap_err();
    assert!(ApiError::is_unauthorized(&err));

    store(&cfg, json!({ "access_token": "a", "token_type": "Bearer", "expires_at": 0 }), None);
    assert!(rt.block_on(spotify_auth::logout(&cfg)).unwrap());
    assert!(!rt.block_on(spotify_auth::logout(&cfg)).unwrap());
}
