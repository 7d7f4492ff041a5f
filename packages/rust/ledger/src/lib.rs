//! libSQL run ledger.
//!
//! The [`Ledger`] records every pipeline run and its state transitions, plus
//! the artifacts each stage wrote. It is history only: pipelines never read
//! it back to decide what to do.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, Row, params};
use seoforge_shared::{PipelineKind, Result, RunId, RunRecord, RunState, SeoforgeError, UserId};
use tokio::sync::Mutex;

/// One artifact written by a stage of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub run_id: String,
    pub stage: String,
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Handle to the run ledger database.
pub struct Ledger {
    #[allow(dead_code)]
    db: Database,
    conn: Mutex<Connection>,
}

fn storage_err(e: impl std::fmt::Display) -> SeoforgeError {
    SeoforgeError::Storage(e.to_string())
}

impl Ledger {
    /// Open or create the ledger at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SeoforgeError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let ledger = Self {
            db,
            conn: Mutex::new(conn),
        };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;
        let conn = self.conn.lock().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                conn.execute_batch(migration.sql).await.map_err(|e| {
                    SeoforgeError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        let conn = self.conn.lock().await;
        let result = conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a run, or overwrite its state if the id already exists.
    pub async fn record_run(&self, run: &RunRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO runs (id, user_id, pipeline, state, stage, error, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               state = excluded.state,
               stage = excluded.stage,
               error = excluded.error,
               updated_at = excluded.updated_at",
            params![
                run.id.to_string(),
                run.user_id.as_str(),
                run.pipeline.as_str(),
                run.state.label(),
                run.state.stage(),
                run.state.error(),
                timestamp(&run.started_at),
                timestamp(&run.updated_at),
            ],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    /// All runs for a user, newest first.
    pub async fn runs_for_user(&self, user_id: &UserId) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, user_id, pipeline, state, stage, error, started_at, updated_at
                 FROM runs WHERE user_id = ?1 ORDER BY started_at DESC, id DESC",
                params![user_id.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Stage artifacts
    // -----------------------------------------------------------------------

    /// Record an artifact written during a run.
    pub async fn record_artifact(
        &self,
        run_id: &RunId,
        stage: &str,
        path: &str,
        sha256: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO stage_runs (run_id, stage, path, sha256, size_bytes, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id.to_string(),
                stage,
                path,
                sha256,
                size_bytes as i64,
                timestamp(&Utc::now()),
            ],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    /// Artifacts of one run, in the order they were recorded.
    pub async fn artifacts_for_run(&self, run_id: &RunId) -> Result<Vec<StageRecord>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT run_id, stage, path, sha256, size_bytes
                 FROM stage_runs WHERE run_id = ?1 ORDER BY id",
                params![run_id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(StageRecord {
                run_id: row.get::<String>(0).map_err(storage_err)?,
                stage: row.get::<String>(1).map_err(storage_err)?,
                path: row.get::<String>(2).map_err(storage_err)?,
                sha256: row.get::<String>(3).map_err(storage_err)?,
                size_bytes: row.get::<i64>(4).map_err(storage_err)?.max(0) as u64,
            });
        }
        Ok(results)
    }

    /// Delete every run and artifact row belonging to a user.
    pub async fn purge_user(&self, user_id: &UserId) -> Result<u64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM stage_runs WHERE run_id IN (SELECT id FROM runs WHERE user_id = ?1)",
            params![user_id.as_str()],
        )
        .await
        .map_err(storage_err)?;
        let removed = conn
            .execute(
                "DELETE FROM runs WHERE user_id = ?1",
                params![user_id.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(removed)
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SeoforgeError::Storage(format!("bad timestamp `{raw}`: {e}")))
}

fn row_to_run(row: &Row) -> Result<RunRecord> {
    let id: String = row.get(0).map_err(storage_err)?;
    let user_id: String = row.get(1).map_err(storage_err)?;
    let pipeline: String = row.get(2).map_err(storage_err)?;
    let state: String = row.get(3).map_err(storage_err)?;
    let stage = row.get::<String>(4).ok();
    let error = row.get::<String>(5).ok();
    let started_at: String = row.get(6).map_err(storage_err)?;
    let updated_at: String = row.get(7).map_err(storage_err)?;

    Ok(RunRecord {
        id: id
            .parse::<RunId>()
            .map_err(|e| SeoforgeError::Storage(format!("bad run id `{id}`: {e}")))?,
        user_id: UserId::parse(&user_id)?,
        pipeline: pipeline.parse::<PipelineKind>()?,
        state: RunState::from_parts(&state, stage, error)?,
        started_at: parse_time(&started_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}
