use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "artist-playlist-sync";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Spotify application client id. Falls back to the one stored with the
    /// credentials, then to SPOTIFY_CLIENT_ID.
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,

    // Endpoints
    pub api_base: String,
    pub auth_base: String,

    pub db_path: PathBuf,
    pub log_dir: PathBuf,

    // Paging and batching
    pub liked_page_size: u32,
    pub playlist_page_size: u32,
    pub playlist_tracks_page_size: u32,
    pub max_batch_size: usize,
}

fn default_scopes() -> Vec<String> {
    vec![
        "playlist-read-private",
        "playlist-read-collaborative",
        "user-read-private",
        "user-library-read",
        "playlist-modify-public",
        "playlist-modify-private",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_api_base() -> String {
    std::env::var("SPOTIFY_API_BASE").unwrap_or_else(|_| "https://api.spotify.com/v1".into())
}
fn default_auth_base() -> String {
    std::env::var("SPOTIFY_AUTH_BASE").unwrap_or_else(|_| "https://accounts.spotify.com".into())
}
fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: "http://127.0.0.1:8888/callback".into(),
            scopes: default_scopes(),
            api_base: default_api_base(),
            auth_base: default_auth_base(),
            db_path: data_dir().join("sync.db"),
            log_dir: data_dir().join("logs"),
            liked_page_size: 50,
            playlist_page_size: 50,
            playlist_tracks_page_size: 100,
            max_batch_size: 100,
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Explicit path wins; otherwise the per-user config file when present,
    /// else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(p) = explicit {
            return Self::from_path(p).with_context(|| format!("loading config from {}", p.display()));
        }
        match Self::default_path() {
            Some(p) if p.exists() => {
                Self::from_path(&p).with_context(|| format!("loading config from {}", p.display()))
            }
            _ => Ok(Self::default()),
        }
    }

    /// [`Config::load`] followed by [`Config::validate`].
    pub fn load_validated(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let cfg = Self::load(explicit)?;
        cfg.validate().context("invalid config")?;
        Ok(cfg)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.liked_page_size == 0 || self.playlist_page_size == 0 || self.playlist_tracks_page_size == 0 {
            bail!("page sizes must be greater than zero");
        }
        if self.max_batch_size == 0 {
            bail!("max_batch_size must be greater than zero");
        }
        if self.api_base.trim().is_empty() || self.auth_base.trim().is_empty() {
            bail!("api_base and auth_base must not be empty");
        }
        url::Url::parse(&self.redirect_uri)
            .with_context(|| format!("invalid redirect_uri {}", self.redirect_uri))?;
        Ok(())
    }

    /// Client id from config, then the stored one, then the environment.
    pub fn resolve_client_id(&self, stored: Option<String>) -> Option<String> {
        let from_cfg = self.client_id.trim();
        if !from_cfg.is_empty() {
            return Some(from_cfg.to_string());
        }
        stored
            .filter(|s| !s.trim().is_empty())
            .or_else(|| std::env::var("SPOTIFY_CLIENT_ID").ok().filter(|s| !s.trim().is_empty()))
    }
}
