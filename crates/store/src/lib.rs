//! SQLite persistence for channel links, translation mappings, delivery
//! credentials, and glossary terms.
//!
//! The schema is fixed and created once at startup by [`run_migrations`];
//! nothing probes table shapes at runtime.

mod credentials;
mod links;
mod mappings;
mod terms;

pub use {
    credentials::CredentialStore, links::LinkStore, mappings::MappingStore, terms::TermStore,
};

use anyhow::Result;

/// Create the schema and set connection pragmas. Idempotent; call once at
/// application startup before constructing any store.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL").execute(pool).await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS links (
            server_id INTEGER NOT NULL,
            channel_a INTEGER NOT NULL,
            lang_a    TEXT    NOT NULL,
            channel_b INTEGER NOT NULL,
            lang_b    TEXT    NOT NULL,
            owner_id  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (server_id, channel_a, channel_b)
        )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_server_cha ON links (server_id, channel_a)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS translation_mappings (
            server_id      INTEGER NOT NULL,
            src_msg_id     INTEGER NOT NULL,
            src_channel_id INTEGER NOT NULL,
            tgt_msg_id     INTEGER NOT NULL,
            tgt_channel_id INTEGER NOT NULL,
            delivery_id    INTEGER NOT NULL DEFAULT 0,
            created_at     INTEGER NOT NULL,
            last_edit_at   INTEGER,
            PRIMARY KEY (server_id, src_msg_id)
        )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mappings_created_at ON translation_mappings (created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS delivery_credentials (
            delivery_id  INTEGER PRIMARY KEY,
            server_id    INTEGER NOT NULL,
            channel_id   INTEGER NOT NULL,
            secret_token TEXT    NOT NULL,
            created_at   INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_credentials_channel ON delivery_credentials (channel_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS glossary_terms (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            term_src TEXT    NOT NULL,
            term_dst TEXT    NOT NULL,
            enabled  INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0
        )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_terms_src ON glossary_terms (lower(term_src))",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    #[allow(clippy::unwrap_used)]
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    #[allow(clippy::unwrap_used)]
    run_migrations(&pool).await.unwrap();
    pool
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent_on_a_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let opts = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(dir.path().join("babelink.sqlite"))
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(opts).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        // Schema is usable after the second pass.
        LinkStore::new(pool.clone())
            .link_pair(1, 100, "pt", 200, "en", 0)
            .await
            .unwrap();
        pool.close().await;
    }
}
