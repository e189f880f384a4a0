use anyhow::Result;

use babelink_common::types::GlossaryTerm;

#[derive(sqlx::FromRow)]
struct TermRow {
    id: i64,
    term_src: String,
    term_dst: String,
    enabled: i64,
    priority: i64,
}

impl From<TermRow> for GlossaryTerm {
    fn from(r: TermRow) -> Self {
        Self {
            id: r.id,
            term_src: r.term_src,
            term_dst: r.term_dst,
            enabled: r.enabled != 0,
            priority: r.priority,
        }
    }
}

/// Glossary term store. Terms are loaded once at startup and compiled into
/// the in-memory glossary engine.
#[derive(Clone)]
pub struct TermStore {
    pool: sqlx::SqlitePool,
}

impl TermStore {
    #[must_use]
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load_all(&self) -> Result<Vec<GlossaryTerm>> {
        let rows = sqlx::query_as::<_, TermRow>(
            "SELECT id, term_src, term_dst, enabled, priority FROM glossary_terms
             ORDER BY priority DESC, length(term_src) DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Insert or replace a term keyed by its case-insensitive source form.
    pub async fn upsert(&self, term_src: &str, term_dst: &str, priority: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO glossary_terms (term_src, term_dst, enabled, priority)
             VALUES (?, ?, 1, ?)
             ON CONFLICT (lower(term_src)) DO UPDATE SET
                 term_dst = excluded.term_dst,
                 enabled  = 1,
                 priority = excluded.priority",
        )
        .bind(term_src)
        .bind(term_dst)
        .bind(priority)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
