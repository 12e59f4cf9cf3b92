//! SQLite-backed key/value store standing in for browser local storage.
use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&normalized)
        .await
        .with_context(|| format!("failed to open session store at {normalized}"))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all, fields(key = %key))]
pub async fn get_item(pool: &Pool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM local_storage WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

#[instrument(skip_all, fields(key = %key))]
pub async fn set_item(pool: &Pool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO local_storage (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all, fields(key = %key))]
pub async fn remove_item(pool: &Pool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM local_storage WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> Pool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn prepare_url_passes_memory_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn prepare_url_keeps_query() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("s.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let out = prepare_sqlite_url(&url);
        assert_eq!(out, url);
        assert!(path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn set_get_remove_roundtrip() {
        let pool = memory_pool().await;
        assert_eq!(get_item(&pool, "token").await.unwrap(), None);

        set_item(&pool, "token", "t1").await.unwrap();
        set_item(&pool, "token", "t2").await.unwrap();
        assert_eq!(get_item(&pool, "token").await.unwrap().as_deref(), Some("t2"));

        remove_item(&pool, "token").await.unwrap();
        assert_eq!(get_item(&pool, "token").await.unwrap(), None);
    }
}
