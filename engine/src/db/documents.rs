/// Document store operations
///
/// Add, revise, remove and search long-term memories. Every mutation runs
/// in its own immediate transaction and commits before returning, so
/// concurrent readers only ever see whole documents and concurrent writers
/// queue on the write lock.
///
/// Searches are ranked by FTS5 bm25 over porter-stemmed terms. Access
/// control is applied to the ranked page the index returns: a requester
/// who is not the owner only sees `public` documents and `shared` ones
/// naming them on the access list.
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use sdk::{AccessList, Document, DocumentRevision, MemoryRecord, NewDocument, Privacy};
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteQueryResult, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Result, StoreError};

/// Default number of results returned by a search
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Query terms shorter than this are dropped
const MIN_TERM_CHARS: usize = 2;

/// Words too common to be worth matching on
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "for", "from", "have", "if", "in",
    "is", "it", "may", "not", "of", "on", "or", "tbd", "that", "the", "this", "to", "us", "we",
    "when", "will", "with", "yet", "you", "your",
];

/// Searchable document field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Content,
    Privacy,
    AccessList,
}

impl SearchField {
    /// Column name in the full-text index
    pub fn column(&self) -> &'static str {
        match self {
            SearchField::Content => "content",
            SearchField::Privacy => "privacy",
            SearchField::AccessList => "access_list",
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for SearchField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "content" => Ok(SearchField::Content),
            "privacy" => Ok(SearchField::Privacy),
            "access_list" | "access-list" => Ok(SearchField::AccessList),
            other => Err(format!(
                "unknown search field '{}'. Must be one of: content, privacy, access_list",
                other
            )),
        }
    }
}

/// How query terms combine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every term must match
    #[default]
    All,

    /// Any term may match; more matches rank higher
    Any,
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(MatchMode::All),
            "any" => Ok(MatchMode::Any),
            other => Err(format!("unknown match mode '{}'. Must be all or any", other)),
        }
    }
}

/// Repository for long-term memory documents
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    match_mode: MatchMode,
}

impl DocumentStore {
    /// Create a new document store
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            match_mode: MatchMode::default(),
        }
    }

    /// Use a different term combination for searches
    pub fn with_match_mode(mut self, match_mode: MatchMode) -> Self {
        self.match_mode = match_mode;
        self
    }

    /// Add a document, returning its freshly assigned id
    ///
    /// The id (UUIDv7) and creation time are assigned here; the document is
    /// searchable as soon as this returns.
    pub async fn add(&self, document: NewDocument) -> Result<String> {
        let document = document.validate().map_err(invalid_document)?;

        let id = Uuid::now_v7().to_string();
        let created_at = Utc::now();

        self.execute_write(
            sqlx::query(
                "INSERT INTO documents (id, content, created_at, user_id, privacy, access_list) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&document.content)
            .bind(created_at.timestamp_millis())
            .bind(&document.user_id)
            .bind(document.privacy.as_str())
            .bind(document.access_list.to_csv()),
        )
        .await?;

        debug!("Added {} memory {}", document.privacy, id);
        Ok(id)
    }

    /// Add a private note owned by `user_id`
    pub async fn add_private_note(
        &self,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<String> {
        self.add(NewDocument::private_note(user_id, content)).await
    }

    /// Remove the document with exactly this id
    ///
    /// Removing an unknown id is not an error. Returns whether a document
    /// was actually deleted.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let result = self
            .execute_write(sqlx::query("DELETE FROM documents WHERE id = ?").bind(id))
            .await?;

        let removed = result.rows_affected() > 0;
        debug!("Remove memory {}: removed={}", id, removed);
        Ok(removed)
    }

    /// Replace the mutable fields of a stored document
    ///
    /// `content`, `privacy` and `access_list` are all overwritten with the
    /// revision's values; `id`, `created_at` and the owner never change.
    /// Returns `false` when no document has this id.
    pub async fn update_fields(&self, id: &str, revision: DocumentRevision) -> Result<bool> {
        let revision = revision.validate().map_err(invalid_document)?;

        let result = self
            .execute_write(
                sqlx::query(
                    "UPDATE documents SET content = ?, privacy = ?, access_list = ? WHERE id = ?",
                )
                .bind(&revision.content)
                .bind(revision.privacy.as_str())
                .bind(revision.access_list.to_csv())
                .bind(id),
            )
            .await?;

        let updated = result.rows_affected() > 0;
        debug!("Update memory {}: updated={}", id, updated);
        Ok(updated)
    }

    /// Fetch a full document by id, without access filtering
    ///
    /// For owners and administrative tooling; model-facing reads go
    /// through `search`.
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, content, created_at, user_id, privacy, access_list \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?;

        row.map(|row| row_to_document(&row)).transpose()
    }

    /// Number of stored documents
    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(read_error)
    }

    /// Ranked, stemmed search across `fields` on behalf of `requester`
    ///
    /// The index returns at most `limit` candidates, best first. Documents
    /// the requester may not read are then dropped from that page, so the
    /// result can be shorter than `limit` even when further visible matches
    /// exist. An empty `fields` slice searches `content`.
    pub async fn search(
        &self,
        requester: &str,
        fields: &[SearchField],
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let fields = if fields.is_empty() {
            &[SearchField::Content][..]
        } else {
            fields
        };

        let Some(expression) = match_expression(fields, query, self.match_mode) else {
            debug!("Query {:?} has no searchable terms", query);
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT d.id, d.content, d.created_at, d.user_id, d.privacy, d.access_list
            FROM (
                SELECT rowid, rank
                FROM documents_fts
                WHERE documents_fts MATCH ?
                ORDER BY rank
                LIMIT ?
            ) AS hits
            JOIN documents d ON d.seq = hits.rowid
            ORDER BY hits.rank
            "#,
        )
        .bind(&expression)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        let candidates = rows.len();
        let mut records = Vec::with_capacity(candidates);
        for row in rows {
            let document = row_to_document(&row)?;
            if document.is_visible_to(requester) {
                records.push(document.to_record());
            }
        }

        debug!(
            "Search {:?} for {}: {} candidates, {} visible",
            expression,
            requester,
            candidates,
            records.len()
        );

        Ok(records)
    }

    /// Run one write statement in its own `BEGIN IMMEDIATE` transaction
    ///
    /// The write lock is taken before the statement runs, so a concurrent
    /// writer waits out `busy_timeout` instead of failing with SQLITE_BUSY
    /// when a deferred transaction tries to upgrade.
    async fn execute_write<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Result<SqliteQueryResult> {
        let mut conn = self.pool.acquire().await.map_err(write_error)?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(write_error)?;

        let result = match query.execute(&mut *conn).await {
            Ok(result) => result,
            Err(e) => {
                rollback(&mut conn).await;
                return Err(write_error(e));
            }
        };

        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            rollback(&mut conn).await;
            return Err(write_error(e));
        }

        Ok(result)
    }

    /// Search the `content` field only
    pub async fn content_search(
        &self,
        requester: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        self.search(requester, &[SearchField::Content], query, limit)
            .await
    }
}

/// Split free text into lower-cased search terms
///
/// Anything that is not alphanumeric separates terms, which keeps FTS5
/// query syntax out of the expression entirely.
pub(crate) fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query.split(|c: char| !c.is_alphanumeric()) {
        if token.chars().count() < MIN_TERM_CHARS {
            continue;
        }
        let term = token.to_lowercase();
        if STOP_WORDS.contains(&term.as_str()) || terms.contains(&term) {
            continue;
        }
        terms.push(term);
    }
    terms
}

/// Build an FTS5 MATCH expression restricted to `fields`
///
/// Returns `None` when the query has no usable terms.
pub(crate) fn match_expression(
    fields: &[SearchField],
    query: &str,
    mode: MatchMode,
) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }

    let columns: Vec<&str> = fields.iter().map(SearchField::column).collect();
    let column_filter = format!("{{{}}}", columns.join(" "));
    let joiner = match mode {
        MatchMode::All => " AND ",
        MatchMode::Any => " OR ",
    };

    Some(
        terms
            .iter()
            .map(|term| format!("{} : \"{}\"", column_filter, term))
            .collect::<Vec<_>>()
            .join(joiner),
    )
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let privacy: String = row.get("privacy");
    let privacy = privacy
        .parse::<Privacy>()
        .map_err(|e| StoreError::Read(e.to_string()))?;

    let created_at_ms: i64 = row.get("created_at");
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms).ok_or_else(|| {
        StoreError::Read(format!("invalid creation timestamp {}", created_at_ms))
    })?;

    let access_list: String = row.get("access_list");

    Ok(Document {
        id: row.get("id"),
        content: row.get("content"),
        created_at,
        user_id: row.get("user_id"),
        privacy,
        access_list: AccessList::parse(&access_list),
    })
}

async fn rollback(conn: &mut PoolConnection<Sqlite>) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut **conn).await {
        warn!("Rollback of failed memory write did not complete: {}", e);
    }
}

fn invalid_document(err: EngineError) -> StoreError {
    match err {
        EngineError::InvalidDocument(msg) => StoreError::InvalidDocument(msg),
        other => StoreError::InvalidDocument(other.to_string()),
    }
}

fn write_error(err: sqlx::Error) -> StoreError {
    StoreError::Write(err.to_string())
}

fn read_error(err: sqlx::Error) -> StoreError {
    StoreError::Read(err.to_string())
}
