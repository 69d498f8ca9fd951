use crate::models::SyncReport;
use anyhow::Result;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::warn;

const SCHEMA: &str = include_str!("../db/schema.sql");

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Save raw credential JSON for a provider, with the client id it was issued to
pub fn save_credential_raw(
    conn: &Connection,
    provider: &str,
    json_blob: &str,
    client_id: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO credentials (provider, token_json, client_id, last_refreshed) VALUES (?1, ?2, ?3, strftime('%s','now')) ON CONFLICT(provider) DO UPDATE SET token_json = excluded.token_json, client_id = COALESCE(excluded.client_id, credentials.client_id), last_refreshed = strftime('%s','now')",
        params![provider, json_blob, client_id],
    )?;
    Ok(())
}

/// Load raw credential JSON and client_id for a provider
pub fn load_credential_with_client(conn: &Connection, provider: &str) -> Result<Option<(String, Option<String>)>> {
    let mut stmt = conn.prepare("SELECT token_json, client_id FROM credentials WHERE provider = ?1 LIMIT 1")?;
    let row = stmt
        .query_row(params![provider], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
        })
        .optional()?;
    Ok(row)
}

/// Remove stored credentials. Returns true if a row was deleted.
pub fn delete_credential(conn: &Connection, provider: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM credentials WHERE provider = ?1", params![provider])?;
    Ok(n > 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRun {
    pub run_id: String,
    pub started_at: chrono::DateTime<Utc>,
    pub user_id: String,
    pub songs_added: i64,
    pub playlists_matched: i64,
    pub error_count: i64,
    pub dry_run: bool,
    pub report: SyncReport,
}

/// Record a finished sync. Returns the generated run id.
pub fn record_sync_run(
    conn: &Connection,
    started_at: chrono::DateTime<Utc>,
    user_id: &str,
    report: &SyncReport,
) -> Result<String> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let report_json = serde_json::to_string(report)?;
    conn.execute(
        "INSERT INTO sync_runs (run_id, started_at, user_id, songs_added, playlists_matched, error_count, dry_run, report_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run_id,
            started_at.timestamp_millis(),
            user_id,
            report.songs_added as i64,
            report.playlists_matched.len() as i64,
            report.errors.len() as i64,
            report.dry_run as i64,
            report_json
        ],
    )?;
    Ok(run_id)
}

/// Record a finished sync off the async runtime. A failure is logged and
/// swallowed: the sync itself already happened.
pub async fn persist_sync_run(
    db_path: &Path,
    started_at: chrono::DateTime<Utc>,
    user_id: &str,
    report: &SyncReport,
) -> Option<String> {
    let db_path = db_path.to_path_buf();
    let user_id = user_id.to_string();
    let report = report.clone();
    let res = tokio::task::spawn_blocking(move || -> Result<String> {
        let conn = open_or_create(&db_path)?;
        record_sync_run(&conn, started_at, &user_id, &report)
    })
    .await;
    match res {
        Ok(Ok(run_id)) => Some(run_id),
        Ok(Err(e)) => {
            warn!("Could not record sync run: {:#}", e);
            None
        }
        Err(e) => {
            warn!("Could not record sync run: {}", e);
            None
        }
    }
}

/// Most recent runs first. Rows with an unreadable start time are skipped.
pub fn recent_sync_runs(conn: &Connection, limit: usize) -> Result<Vec<SyncRun>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, user_id, songs_added, playlists_matched, error_count, dry_run, report_json FROM sync_runs ORDER BY started_at DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, i64>(3)?,
            r.get::<_, i64>(4)?,
            r.get::<_, i64>(5)?,
            r.get::<_, i64>(6)?,
            r.get::<_, String>(7)?,
        ))
    })?;
    let mut v = Vec::new();
    for row in rows {
        let (run_id, started_ms, user_id, songs_added, playlists_matched, error_count, dry_run, json) = row?;
        let Some(started_at) = Utc.timestamp_millis_opt(started_ms).single() else {
            warn!("Skipping sync run {} with unreadable start time {}", run_id, started_ms);
            continue;
        };
        let report: SyncReport = serde_json::from_str(&json)?;
        v.push(SyncRun {
            run_id,
            started_at,
            user_id,
            songs_added,
            playlists_matched,
            error_count,
            dry_run: dry_run != 0,
            report,
        });
    }
    Ok(v)
}
