use super::{error_message, pkce, ApiError};
use crate::config::Config;
use crate::db;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

/// Key of the Spotify row in the credentials table.
pub const PROVIDER: &str = "spotify";

/// This module implements the OAuth authorization-code flow with PKCE:
/// 1. Generate a code verifier and its S256 challenge.
/// 2. Build the authorization URL and print it.
/// 3. User opens it in a browser, approves and gets redirected to the redirect URI (which may fail if nothing listens there).
/// 4. User copies the full redirect URL and pastes it into this CLI.
/// 5. The CLI extracts the `code` param and exchanges it, with the verifier, for an access_token + refresh_token.
/// 6. The tokens are stored in the DB credentials table as JSON.
///
/// No client secret is involved, and no HTTP server has to be embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64, // epoch seconds
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

impl StoredToken {
    /// True within 30 seconds of expiry.
    pub fn needs_refresh(&self, now: i64) -> bool {
        now + 30 >= self.expires_at
    }
}

fn default_token_type() -> String {
    "Bearer".into()
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_at: Utc::now().timestamp() + self.expires_in.unwrap_or(3600),
            refresh_token: self.refresh_token.or(previous_refresh),
            scope: self.scope,
        }
    }
}

fn token_url(cfg: &Config) -> String {
    format!("{}/api/token", cfg.auth_base.trim_end_matches('/'))
}

pub fn authorize_url(cfg: &Config, client_id: &str, code_challenge: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/authorize", cfg.auth_base.trim_end_matches('/')))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &cfg.redirect_uri)
        .append_pair("scope", &cfg.scopes.join(" "))
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", code_challenge);
    Ok(url)
}

/// Pull the authorization code out of the URL the browser was redirected to.
pub fn extract_code(redirect_url: &str) -> Result<String> {
    let parsed = Url::parse(redirect_url.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    if let Some((_, err)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(anyhow!("authorization was not granted: {}", err));
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("no code in redirect URL"))
}

async fn request_token(client: &Client, cfg: &Config, params: &[(&str, &str)]) -> Result<TokenResponse> {
    let resp = client
        .post(token_url(cfg))
        .form(params)
        .send()
        .await
        .map_err(ApiError::from)?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = format!(
            "Token request failed: {}",
            error_message(&body).unwrap_or_else(|| status.to_string())
        );
        // A revoked or expired grant means the user has to log in again.
        let oauth_error = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|j| j["error"].as_str().map(String::from));
        if status.as_u16() == 401 || oauth_error.as_deref() == Some("invalid_grant") {
            return Err(ApiError::Unauthorized { message }.into());
        }
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        }
        .into());
    }
    let tr: TokenResponse = resp.json().await.map_err(ApiError::from)?;
    Ok(tr)
}

/// Exchange an authorization code (plus the PKCE verifier) for tokens.
pub async fn exchange_code(
    client: &Client,
    cfg: &Config,
    client_id: &str,
    code: &str,
    code_verifier: &str,
) -> Result<StoredToken> {
    let params = [
        ("client_id", client_id),
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", cfg.redirect_uri.as_str()),
        ("code_verifier", code_verifier),
    ];
    let tr = request_token(client, cfg, &params).await?;
    Ok(tr.into_stored(None))
}

pub async fn refresh_access_token(
    client: &Client,
    cfg: &Config,
    client_id: &str,
    current: &StoredToken,
) -> Result<StoredToken> {
    let refresh_token = current.refresh_token.clone().ok_or_else(|| ApiError::Unauthorized {
        message: "token expired and no refresh token is stored".into(),
    })?;
    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.as_str()),
        ("client_id", client_id),
    ];
    let tr = request_token(client, cfg, &params).await?;
    Ok(tr.into_stored(Some(refresh_token)))
}

pub async fn persist_token(cfg: &Config, token: &StoredToken, client_id: Option<&str>) -> Result<()> {
    let db_path = cfg.db_path.clone();
    let token_json = serde_json::to_string(token)?;
    let client_id = client_id.map(String::from);
    tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
        let conn = db::open_or_create(&db_path)?;
        db::save_credential_raw(&conn, PROVIDER, &token_json, client_id.as_deref())?;
        Ok(())
    })
    .await??;
    Ok(())
}

async fn load_stored(cfg: &Config) -> Result<Option<(StoredToken, Option<String>)>> {
    let db_path = cfg.db_path.clone();
    let row = tokio::task::spawn_blocking(move || -> Result<Option<(String, Option<String>)>, anyhow::Error> {
        let conn = db::open_or_create(&db_path)?;
        db::load_credential_with_client(&conn, PROVIDER)
    })
    .await??;
    match row {
        Some((json, client_id)) => {
            let st: StoredToken = serde_json::from_str(&json).context("parse token json")?;
            Ok(Some((st, client_id)))
        }
        None => Ok(None),
    }
}

/// Return a usable access token from the credentials DB, refreshing and
/// persisting it when it is about to expire. A missing or unrefreshable
/// token is reported as [`ApiError::Unauthorized`].
pub async fn load_access_token(client: &Client, cfg: &Config) -> Result<String> {
    let Some((token, stored_client)) = load_stored(cfg).await? else {
        return Err(ApiError::Unauthorized {
            message: "no stored Spotify token".into(),
        }
        .into());
    };
    if !token.needs_refresh(Utc::now().timestamp()) {
        return Ok(token.access_token);
    }
    debug!("Spotify token is near expiry, refreshing");
    let client_id = cfg
        .resolve_client_id(stored_client)
        .ok_or_else(|| anyhow!("no Spotify client_id configured"))?;
    let refreshed = refresh_access_token(client, cfg, &client_id, &token).await?;
    persist_token(cfg, &refreshed, Some(&client_id)).await?;
    info!("Spotify token refreshed");
    Ok(refreshed.access_token)
}

/// Forget the stored token. Returns true if one was stored.
pub async fn logout(cfg: &Config) -> Result<bool> {
    let db_path = cfg.db_path.clone();
    let removed = tokio::task::spawn_blocking(move || -> Result<bool, anyhow::Error> {
        let conn = db::open_or_create(&db_path)?;
        db::delete_credential(&conn, PROVIDER)
    })
    .await??;
    Ok(removed)
}

pub async fn run_spotify_auth(cfg: &Config) -> Result<()> {
    use std::io;

    let stored_client = load_stored(cfg).await.ok().flatten().and_then(|(_, c)| c);
    let client_id = match cfg.resolve_client_id(stored_client) {
        Some(id) => id,
        None => {
            println!("Enter your Spotify client_id:");
            let mut client_id = String::new();
            io::stdin().read_line(&mut client_id)?;
            let client_id = client_id.trim().to_string();
            if client_id.is_empty() {
                return Err(anyhow!("no client_id provided"));
            }
            client_id
        }
    };

    let verifier = pkce::generate_code_verifier();
    let challenge = pkce::code_challenge_s256(&verifier);
    let url = authorize_url(cfg, &client_id, &challenge)?;

    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    println!(
        "After authorizing, you'll be redirected to {}. Copy the full redirect URL and paste it here.",
        cfg.redirect_uri
    );
    println!("Paste redirect URL:");
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let code = extract_code(&input)?;

    let client = Client::new();
    let token = exchange_code(&client, cfg, &client_id, &code, &verifier).await?;
    persist_token(cfg, &token, Some(&client_id)).await?;

    info!("Spotify tokens saved to DB for provider '{}'", PROVIDER);
    println!("Saved tokens to DB. You can now run `sync`.");
    Ok(())
}
