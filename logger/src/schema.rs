//! Ordered, versioned schema for the logger database.
//!
//! Every step is safe to re-run: tables use `IF NOT EXISTS` and columns are
//! only added when `pragma_table_info` does not list them. That lets a
//! database created before `schema_migrations` existed be brought up to date.

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePool;
use std::collections::HashSet;

pub enum Step {
    Sql(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
        decl: &'static str,
    },
}

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub steps: &'static [Step],
}

const CREATE_PLAYS: &str = r#"
CREATE TABLE IF NOT EXISTS plays (
    played_at TEXT NOT NULL,
    track_id TEXT NOT NULL,
    track_name TEXT,
    artist_name TEXT,
    album_name TEXT,
    album_type TEXT,
    release_date TEXT,
    duration_ms INTEGER,
    popularity INTEGER,
    spotify_url TEXT,
    cover_url TEXT,
    track_href TEXT,
    PRIMARY KEY (played_at, track_id)
)
"#;

const CREATE_TRACK_ARTISTS: &str = r#"
CREATE TABLE IF NOT EXISTS track_artists (
    track_id TEXT NOT NULL,
    artist_id TEXT NOT NULL,
    artist_name TEXT,
    PRIMARY KEY (track_id, artist_id)
)
"#;

const CREATE_ARTISTS: &str = r#"
CREATE TABLE IF NOT EXISTS artists (
    artist_id TEXT PRIMARY KEY,
    name TEXT,
    genres TEXT,
    followers_total INTEGER,
    popularity INTEGER,
    url TEXT,
    href TEXT,
    image_url TEXT
)
"#;

const fn plays_column(column: &'static str, decl: &'static str) -> Step {
    Step::AddColumn {
        table: "plays",
        column,
        decl,
    }
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "plays",
        steps: &[Step::Sql(CREATE_PLAYS)],
    },
    Migration {
        version: 2,
        name: "plays_extended_columns",
        steps: &[
            plays_column("explicit", "INTEGER"),
            plays_column("track_number", "INTEGER"),
            plays_column("disc_number", "INTEGER"),
            plays_column("is_local", "INTEGER"),
            plays_column("isrc", "TEXT"),
            plays_column("available_markets_count", "INTEGER"),
            plays_column("context_type", "TEXT"),
            plays_column("context_uri", "TEXT"),
            plays_column("context_url", "TEXT"),
        ],
    },
    Migration {
        version: 3,
        name: "artist_tables",
        steps: &[Step::Sql(CREATE_TRACK_ARTISTS), Step::Sql(CREATE_ARTISTS)],
    },
];

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    apply(pool, MIGRATIONS).await
}

/// Runs every migration in `migrations` not yet recorded in `schema_migrations`.
pub async fn apply(pool: &SqlitePool, migrations: &[Migration]) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create schema_migrations")?;

    let applied: HashSet<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    for migration in migrations {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!(
            "applying schema migration {} ({})",
            migration.version,
            migration.name
        );

        for step in migration.steps {
            match step {
                Step::Sql(sql) => {
                    sqlx::query(sql).execute(pool).await.with_context(|| {
                        format!("schema migration {} failed", migration.version)
                    })?;
                }
                Step::AddColumn {
                    table,
                    column,
                    decl,
                } => add_column(pool, table, column, decl).await?,
            }
        }

        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(pool)
            .await?;
    }

    Ok(())
}

pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn add_column(pool: &SqlitePool, table: &str, column: &str, decl: &str) -> Result<()> {
    let existing: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
        .bind(table)
        .fetch_all(pool)
        .await?;

    if existing.iter().any(|c| c == column) {
        return Ok(());
    }

    let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);
    if let Err(e) = sqlx::query(&sql).execute(pool).await {
        tracing::warn!("ignoring failed column add {}.{}: {}", table, column, e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_latest_version() {
        let pool = memory_pool().await;
        migrate(&pool).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 3);

        migrate(&pool).await.unwrap();
        let recorded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(recorded, 3);
    }

    #[tokio::test]
    async fn test_failed_column_add_is_ignored() {
        const BROKEN: &[Migration] = &[Migration {
            version: 1,
            name: "column_on_missing_table",
            steps: &[Step::AddColumn {
                table: "no_such_table",
                column: "extra",
                decl: "TEXT",
            }],
        }];

        let pool = memory_pool().await;
        apply(&pool, BROKEN).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_sql_step_is_an_error() {
        const BROKEN: &[Migration] = &[Migration {
            version: 1,
            name: "bad_sql",
            steps: &[Step::Sql("CREATE TABLE (")],
        }];

        let pool = memory_pool().await;
        assert!(apply(&pool, BROKEN).await.is_err());
        assert_eq!(current_version(&pool).await.unwrap(), 0);
    }
}
