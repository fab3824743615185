//! Lecture slide search over the prebuilt SQLite FTS5 index. Single keyword
//! search for plain cards, reciprocal-rank-fusion search for MCQ cards.

use std::path::Path;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

mod fusion;
mod mcq;
mod query;

pub use mcq::parse_mcq;
pub use query::sanitize_query;

pub const DEFAULT_LIMIT: usize = 8;

/// Lecture names that are administrative, never useful as study material.
const EXCLUDED_LECTURES: [&str; 4] = [
    "instudering",
    "seminarieuppgift",
    "seminareuppgift",
    "seminaruppgift",
];

/// One indexed slide. `part` is the curriculum part, `block` the course
/// block within it.
#[derive(Debug, Clone, Serialize)]
pub struct Slide {
    pub id: i64,
    pub part: String,
    pub block: String,
    pub lecture: String,
    pub slide_num: i64,
    pub slide_text: String,
    pub ai_text: String,
    pub key_terms: String,
    pub image_path: String,
}

/// A slide with its relevance metadata. `rrf_score` is set only for fused
/// MCQ searches; `matched_by` lists the sub-queries that found the slide.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub slide: Slide,
    pub rrf_score: Option<f64>,
    pub matched_by: Vec<String>,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to open slide index: {0}")]
    Open(#[from] sqlx::Error),
}

/// Handle on the slide index. Searches never fail: a query the FTS engine
/// rejects yields no results.
pub struct SlideIndex {
    pool: SqlitePool,
}

impl SlideIndex {
    /// Open the index at `path`. `Ok(None)` when no index has been built
    /// yet; the caller treats that as empty results.
    pub async fn open(path: impl AsRef<Path>) -> Result<Option<Self>, IndexError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no slide index at path");
            return Ok(None);
        }
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Some(Self { pool }))
    }

    #[cfg(test)]
    fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Single-query search, ranked by bm25.
    pub async fn search(&self, text: &str, limit: usize) -> Vec<SearchHit> {
        let rows = self.run_query(text, limit).await;
        rows.into_iter()
            .filter(|slide| !is_excluded(slide))
            .map(|slide| SearchHit {
                slide,
                rrf_score: None,
                matched_by: vec!["question".to_string()],
            })
            .collect()
    }

    /// MCQ search: one sub-query for the question and one per answer option,
    /// fused with reciprocal rank fusion.
    pub async fn search_mcq(
        &self,
        question: &str,
        answers: &[String],
        limit: usize,
    ) -> Vec<SearchHit> {
        let per_query = limit.max(20);
        let mut query_results = Vec::new();

        let rows = self.run_query(question, per_query).await;
        if !rows.is_empty() {
            query_results.push(("question".to_string(), rows));
        }
        for (index, answer) in answers.iter().enumerate() {
            let rows = self.run_query(answer, per_query).await;
            if !rows.is_empty() {
                query_results.push((format!("answer_{}", index + 1), rows));
            }
        }

        fusion::rrf_merge(query_results)
            .into_iter()
            .filter(|hit| !is_excluded(&hit.slide))
            .take(limit)
            .collect()
    }

    /// Run one sanitized FTS query. Slide text is weighted low, AI summaries
    /// medium, key terms high. Errors (FTS syntax the sanitizer let through,
    /// a missing table) come back as no results.
    async fn run_query(&self, text: &str, limit: usize) -> Vec<Slide> {
        let clean = sanitize_query(text);
        if clean.is_empty() {
            return Vec::new();
        }

        let rows = sqlx::query(
            r#"SELECT
                   s.id, s.del, s.block, s.lecture, s.slide_num,
                   s.slide_txt, s.ai_txt, s.key_terms, s.png_path,
                   bm25(slides_fts, 0, 0, 0, 5.0, 1.0, 50.0) AS score
               FROM slides_fts
               JOIN slides s ON slides_fts.rowid = s.id
               WHERE slides_fts MATCH ?1
               ORDER BY score
               LIMIT ?2"#,
        )
        .bind(&clean)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(err) => {
                tracing::debug!(query = %clean, error = %err, "slide query failed");
                return Vec::new();
            }
        };

        rows.into_iter()
            .filter_map(|row| {
                let slide = Slide {
                    id: row.try_get("id").ok()?,
                    part: row.try_get("del").ok()?,
                    block: row.try_get("block").ok()?,
                    lecture: row.try_get("lecture").ok()?,
                    slide_num: row.try_get("slide_num").ok()?,
                    slide_text: row.try_get("slide_txt").ok()?,
                    ai_text: row.try_get("ai_txt").ok()?,
                    key_terms: row.try_get("key_terms").ok()?,
                    image_path: row.try_get("png_path").ok()?,
                };
                Some(slide)
            })
            .collect()
    }
}

fn is_excluded(slide: &Slide) -> bool {
    let lecture = slide.lecture.to_lowercase();
    EXCLUDED_LECTURES
        .iter()
        .any(|needle| lecture.contains(needle))
}
