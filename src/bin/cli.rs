use anyhow::{Context, Result};
use artist_playlist_sync as lib;
use clap::{Parser, Subcommand};
use lib::api::spotify::SpotifyProvider;
use lib::api::spotify_auth;
use lib::api::{ApiError, Provider};
use lib::config::Config;
use lib::library::{self, TrackSource};
use lib::models::SyncReport;
use lib::sync::SyncOptions;
use std::path::PathBuf;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status when the stored session is missing or expired.
const EXIT_SESSION_EXPIRED: i32 = 3;

#[derive(Parser)]
#[command(name = "artist-playlist-sync", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize with Spotify (PKCE) and store tokens in DB (interactive)
    Auth,
    /// Forget the stored Spotify tokens
    Logout,
    /// Show the logged in user
    Whoami,
    /// List liked songs count and all playlists
    Playlists,
    /// List the tracks of a playlist, or of liked songs with "liked"
    Tracks {
        /// Playlist id, or "liked"
        source: String,
    },
    /// Add liked songs to the playlists named after their artists
    Sync {
        /// Report what would be added without changing any playlist
        #[arg(long)]
        dry_run: bool,
    },
    /// Show recent sync runs
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Validate config file and exit
    ConfigValidate,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if ApiError::is_unauthorized(&e) {
            eprintln!("Your session expired or you are not logged in ({:#}). Run `auth` to log in again.", e);
            std::process::exit(EXIT_SESSION_EXPIRED);
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    // config-validate reports problems itself; every other command refuses
    // an invalid config before touching the network.
    let cfg = match cli.command {
        Commands::ConfigValidate => Config::load(cli.config.as_deref())?,
        _ => Config::load_validated(cli.config.as_deref())?,
    };

    // Initialize log->tracing bridge and structured logging.
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&cfg.log_dir, "artist-playlist-sync.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;

    match cli.command {
        Commands::ConfigValidate => match cfg.validate() {
            Ok(()) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        },
        Commands::Auth => {
            spotify_auth::run_spotify_auth(&cfg).await?;
        }
        Commands::Logout => {
            if spotify_auth::logout(&cfg).await? {
                println!("Logged out.");
            } else {
                println!("No stored session.");
            }
        }
        Commands::Whoami => {
            let (provider, token) = session(&cfg).await?;
            let user = provider.current_user(&token).await?;
            println!("{} ({})", user.label(), user.id);
        }
        Commands::Playlists => {
            let (provider, token) = session(&cfg).await?;
            let overview = library::load_overview(&provider, &token, cfg.playlist_page_size).await?;
            println!("{}'s Playlists", overview.user.label());
            if overview.liked_count == 0 && overview.playlists.is_empty() {
                println!("No playlists found.");
            }
            if overview.liked_count > 0 {
                println!("  Liked Songs ({} tracks)  [liked]", overview.liked_count);
            }
            for p in &overview.playlists {
                let owner = if p.owner_id == overview.user.id { String::new() } else { format!(" by {}", p.owner_id) };
                println!("  {} ({} tracks){}  [{}]", p.name, p.track_count, owner, p.id);
            }
        }
        Commands::Tracks { source } => {
            let (provider, token) = session(&cfg).await?;
            let source = TrackSource::parse(&source);
            let tracks = library::list_tracks(
                &provider,
                &source,
                &token,
                cfg.liked_page_size,
                cfg.playlist_tracks_page_size,
            )
            .await?;
            if tracks.is_empty() {
                println!("This playlist is empty.");
            }
            for t in &tracks {
                let artists: Vec<&str> = t
                    .artists
                    .iter()
                    .flatten()
                    .map(|a| a.name.as_str())
                    .collect();
                println!("{} - {}", t.name, artists.join(", "));
            }
        }
        Commands::Sync { dry_run } => {
            let (provider, token) = session(&cfg).await?;
            let user = provider.current_user(&token).await?;
            let options = SyncOptions {
                dry_run,
                ..SyncOptions::from_config(&cfg)
            };
            let started_at = chrono::Utc::now();
            let report = lib::sync::sync(&provider, &token, &user.id, &options).await?;
            print_report(&report);

            lib::db::persist_sync_run(&cfg.db_path, started_at, &user.id, &report).await;
        }
        Commands::History { limit } => {
            let db_path = cfg.db_path.clone();
            let runs = tokio::task::spawn_blocking(move || -> Result<Vec<lib::db::SyncRun>, anyhow::Error> {
                let conn = lib::db::open_or_create(&db_path)?;
                lib::db::recent_sync_runs(&conn, limit)
            })
            .await??;
            if runs.is_empty() {
                println!("No sync runs recorded.");
            }
            for r in &runs {
                println!(
                    "{}  {}  user={}  playlists={}  songs={}{}  errors={}",
                    r.started_at.format("%Y-%m-%d %H:%M:%S"),
                    r.run_id,
                    r.user_id,
                    r.playlists_matched,
                    r.songs_added,
                    if r.dry_run { " (dry run)" } else { "" },
                    r.error_count
                );
                if let Some(msg) = &r.report.message {
                    println!("    {}", msg);
                }
            }
        }
    }
    Ok(())
}

/// Provider plus a valid access token from the stored session.
async fn session(cfg: &Config) -> Result<(SpotifyProvider, String)> {
    let client = reqwest::Client::new();
    let token = spotify_auth::load_access_token(&client, cfg).await?;
    Ok((SpotifyProvider::with_client(client, cfg.api_base.clone()), token))
}

fn print_report(report: &SyncReport) {
    if let Some(msg) = &report.message {
        println!("{}", msg);
        return;
    }
    println!(
        "{}",
        if report.dry_run { "Dry run complete." } else { "Sync complete!" }
    );
    println!("  Artists found:     {}", report.artists_found.len());
    println!("  Playlists matched: {}", report.playlists_matched.len());
    println!(
        "  Songs {}:       {}",
        if report.dry_run { "to add" } else { "added" },
        report.songs_added
    );
    if !report.playlists_matched.is_empty() {
        println!("  Synced playlists:  {}", report.playlists_matched.join(", "));
    }
    if !report.errors.is_empty() {
        println!("  Errors:");
        for e in &report.errors {
            println!("    {}", e);
        }
    }
}
