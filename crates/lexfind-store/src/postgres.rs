//! Production backend: the `documents` table with pgvector and pg_trgm.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, Postgres};
use sqlx::{ConnectOptions, QueryBuilder};
use std::str::FromStr;

use lexfind_core::traits::{CorpusSession, CorpusStore};
use lexfind_core::types::{CorpusHit, TemplateRef, TextQuery};
use lexfind_core::{Error, Result};

use crate::pool::{ConnectionManager, ConnectionPool, PoolStatus, SessionConnection};
use crate::tunnel::Endpoint;

const COLUMNS: &str = "doc_id, title, COALESCE(canonical_title, LOWER(TRIM(title))) AS canonical_title, \
     COALESCE(tags, ARRAY[]::text[]) AS tags, COALESCE(snippet, '') AS snippet, COALESCE(s3_path, '') AS s3_path";

/// Opens raw Postgres connections, optionally redirected through a tunnel.
pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    /// Parse `dsn`. With an endpoint, the DSN's host and port are replaced by
    /// it; credentials and database name are kept.
    pub fn new(dsn: &str, endpoint: Option<&Endpoint>) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(dsn).map_err(|e| Error::InvalidConfig(format!("store.dsn: {e}")))?;
        if let Some(ep) = endpoint {
            options = options.host(&ep.host).port(ep.port);
        }
        Ok(Self { options })
    }

    pub fn target(&self) -> String { format!("{}:{}", self.options.get_host(), self.options.get_port()) }
}

#[async_trait]
impl ConnectionManager for PgConnector {
    type Connection = PgConnection;

    async fn connect(&self) -> Result<PgConnection> {
        self.options.connect().await.map_err(Error::transient)
    }
}

pub struct PgCorpus {
    pool: ConnectionPool<PgConnector>,
}

impl PgCorpus {
    pub fn new(pool: ConnectionPool<PgConnector>) -> Self { Self { pool } }

    pub fn pool_status(&self) -> PoolStatus { self.pool.status() }

    pub fn close(&self) { self.pool.close() }
}

#[async_trait]
impl CorpusStore for PgCorpus {
    fn backend(&self) -> &'static str { "postgres" }

    async fn open_session(&self) -> Result<Box<dyn CorpusSession>> {
        let conn = SessionConnection::open(&self.pool).await?;
        Ok(Box::new(PgSession { conn }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    doc_id: String,
    title: String,
    canonical_title: String,
    tags: Vec<String>,
    snippet: String,
    s3_path: String,
    raw_score: f64,
}

impl From<TemplateRow> for CorpusHit {
    fn from(row: TemplateRow) -> Self {
        CorpusHit {
            template: TemplateRef {
                doc_id: row.doc_id,
                title: row.title,
                canonical_title: row.canonical_title,
                tags: row.tags,
                snippet: row.snippet,
                storage_path: row.s3_path,
            },
            raw_score: row.raw_score as f32,
        }
    }
}

/// Text search configuration for a query language.
pub fn ts_config(language: &str) -> &'static str { if language == "en" { "english" } else { "simple" } }

/// Escape `%`, `_` and `\` so a term matches literally inside `ILIKE '%…%'`.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') { out.push('\\'); }
        out.push(c);
    }
    out
}

/// Keywords as a web-search expression matching any of them. Characters the
/// web-search grammar treats as operators are dropped from each term.
pub fn any_of_expression(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| t.chars().map(|c| if c.is_alphanumeric() { c } else { ' ' }).collect::<String>())
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Whether a query error leaves the connection unusable. Database errors
/// (bad input, missing extension) run in autocommit, so the connection stays
/// good and the session's later queries reuse it.
pub fn connection_is_broken(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) | sqlx::Error::WorkerCrashed)
}

/// One pooled connection for the duration of a search.
struct PgSession {
    conn: SessionConnection<PgConnector>,
}

impl PgSession {
    fn settle<T>(&mut self, result: std::result::Result<T, sqlx::Error>) -> Result<T> {
        result.map_err(|e| {
            if connection_is_broken(&e) {
                tracing::warn!(error = %e, "discarding broken postgres connection");
                self.conn.discard();
            }
            Error::transient(e)
        })
    }
}

#[async_trait]
impl CorpusSession for PgSession {
    async fn vector_search(&mut self, embedding: &[f32], floor: f32, limit: usize) -> Result<Vec<CorpusHit>> {
        let sql = format!(
            "SELECT {COLUMNS}, (1 - (embedding <=> $1::real[]::vector))::float8 AS raw_score \
             FROM documents \
             WHERE embedding IS NOT NULL AND (1 - (embedding <=> $1::real[]::vector)) > $2 \
             ORDER BY raw_score DESC, doc_id \
             LIMIT $3"
        );
        let conn = self.conn.get().await?;
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(embedding)
            .bind(floor as f64)
            .bind(limit as i64)
            .fetch_all(conn)
            .await;
        Ok(self.settle(rows)?.into_iter().map(CorpusHit::from).collect())
    }

    async fn text_search(&mut self, query: TextQuery<'_>, language: &str, rank_scale: f32, limit: usize) -> Result<Vec<CorpusHit>> {
        let expression = match query {
            TextQuery::Raw(text) => text.trim().to_string(),
            TextQuery::AnyOf(terms) => any_of_expression(terms),
        };
        if expression.is_empty() { return Ok(Vec::new()); }
        let sql = format!(
            "SELECT {COLUMNS}, \
                    LEAST(ts_rank(search_vector, websearch_to_tsquery($1::regconfig, $2))::float8 * $3, 1.0)::float8 AS raw_score \
             FROM documents \
             WHERE search_vector @@ websearch_to_tsquery($1::regconfig, $2) \
             ORDER BY raw_score DESC, doc_id \
             LIMIT $4"
        );
        let conn = self.conn.get().await?;
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(ts_config(language))
            .bind(expression)
            .bind(rank_scale as f64)
            .bind(limit as i64)
            .fetch_all(conn)
            .await;
        Ok(self.settle(rows)?.into_iter().map(CorpusHit::from).collect())
    }

    async fn fuzzy_search(&mut self, query: &str, floor: f32, limit: usize) -> Result<Vec<CorpusHit>> {
        let sql = format!(
            "SELECT {COLUMNS}, similarity(canonical_title, $1::text)::float8 AS raw_score \
             FROM documents \
             WHERE similarity(canonical_title, $1::text) > $2 \
             ORDER BY raw_score DESC, doc_id \
             LIMIT $3"
        );
        let conn = self.conn.get().await?;
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(query)
            .bind(floor as f64)
            .bind(limit as i64)
            .fetch_all(conn)
            .await;
        Ok(self.settle(rows)?.into_iter().map(CorpusHit::from).collect())
    }

    async fn legacy_search(&mut self, terms: &[String], language: &str, score: f32, limit: usize) -> Result<Vec<CorpusHit>> {
        let patterns: Vec<String> = terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| format!("%{}%", escape_like(t)))
            .collect();
        if patterns.is_empty() { return Ok(Vec::new()); }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {COLUMNS}, "));
        builder.push_bind(score as f64).push("::float8 AS raw_score FROM documents WHERE language = ");
        builder.push_bind(language.to_string()).push(" AND (");
        {
            let mut separated = builder.separated(" OR ");
            for pattern in &patterns {
                separated.push("(canonical_title ILIKE ");
                separated
                    .push_bind_unseparated(pattern.clone())
                    .push_unseparated(" OR snippet ILIKE ")
                    .push_bind_unseparated(pattern.clone())
                    .push_unseparated(")");
            }
        }
        builder.push(") ORDER BY doc_id LIMIT ").push_bind(limit as i64);

        let conn = self.conn.get().await?;
        let rows = builder.build_query_as::<TemplateRow>().fetch_all(conn).await;
        Ok(self.settle(rows)?.into_iter().map(CorpusHit::from).collect())
    }
}
