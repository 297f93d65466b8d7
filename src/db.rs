//! SQLite pool setup and schema migrations.

use anyhow::{Context, Result};
use sqlx::{
    SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr};
use tracing::{debug, error, info};

use crate::config::AppConfig;

/// Migrations embedded from `./migrations` at build time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open the process-wide pool described by the configuration.
///
/// Creates the database file (and its parent directory) when missing.
pub async fn connect(cfg: &AppConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database URL `{}`", cfg.database_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let db_path = options.get_filename();
    debug!("Interpreted SQLite path => {}", db_path.display());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }

    SqlitePoolOptions::new()
        .max_connections(cfg.max_connections.max(1))
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))
}

/// A private in-memory database on a single long-lived connection.
///
/// Every connection to `sqlite::memory:` sees its own database, so the pool
/// is pinned to one connection that is never reaped.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("running database migrations")?;
    info!("Database schema is up to date");
    Ok(())
}

/// Acquire and release one connection, logging the outcome.
/// A failure here is reported but does not stop startup.
pub async fn check_connection(pool: &SqlitePool) -> bool {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => {
            info!("Database connectivity check succeeded");
            true
        }
        Err(err) => {
            error!("Database connectivity check failed: {}", err);
            false
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
        info!("Created missing directory {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_ledger_and_audit_tables() {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        // A second run is a no-op.
        run_migrations(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        for expected in ["audit_context", "auditoria_arquivos_log", "files"] {
            assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
        }
        assert!(check_connection(&pool).await);
    }

    #[tokio::test]
    async fn connect_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig {
            database_url: format!("sqlite://{}/meta/test.db", dir.path().display()),
            ..AppConfig::default()
        };

        let pool = connect(&cfg).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool.close().await;

        assert!(dir.path().join("meta/test.db").exists());
    }

    #[tokio::test]
    async fn mutations_outside_uploads_are_still_audited() {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO files (filename, originalname, size_bytes, upload_time)
             VALUES ('1-a.txt', 'a.txt', 1, '2024-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("UPDATE files SET originalname = 'b.txt'")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM files").execute(&pool).await.unwrap();

        let ops: Vec<(String, String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT operacao_tipo, requester_ip, dados_antigos, dados_novos
             FROM auditoria_arquivos_log ORDER BY log_id",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].0, "INSERT");
        assert!(ops[0].2.is_none() && ops[0].3.is_some());
        assert_eq!(ops[1].0, "UPDATE");
        assert!(ops[1].2.as_deref().unwrap().contains("a.txt"));
        assert!(ops[1].3.as_deref().unwrap().contains("b.txt"));
        assert_eq!(ops[2].0, "DELETE");
        assert!(ops[2].3.is_none());
        assert!(ops.iter().all(|op| op.1 == "unknown"));
    }
}
