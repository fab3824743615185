//! Reciprocal rank fusion across the per-sub-query result lists of an MCQ
//! search.

use std::collections::HashMap;

use crate::{SearchHit, Slide};

/// RRF smoothing constant.
const RRF_K: f64 = 60.0;

/// Fuse ranked result lists into one list ordered by fused score. A slide at
/// rank `r` (zero-based) in one list contributes `1 / (K + r + 1)`; slides
/// found by several sub-queries accumulate. Ties keep discovery order, and
/// `matched_by` records which sub-queries found each slide.
pub(crate) fn rrf_merge(query_results: Vec<(String, Vec<Slide>)>) -> Vec<SearchHit> {
    let mut scores: HashMap<i64, f64> = HashMap::new();
    let mut slides: HashMap<i64, Slide> = HashMap::new();
    let mut matched: HashMap<i64, Vec<String>> = HashMap::new();
    let mut discovery: Vec<i64> = Vec::new();

    for (label, rows) in query_results {
        for (rank, slide) in rows.into_iter().enumerate() {
            let id = slide.id;
            *scores.entry(id).or_insert(0.0) += 1.0 / (RRF_K + rank as f64 + 1.0);
            matched.entry(id).or_default().push(label.clone());
            if !slides.contains_key(&id) {
                discovery.push(id);
                slides.insert(id, slide);
            }
        }
    }

    let mut order = discovery;
    // Stable sort: equal scores stay in discovery order.
    order.sort_by(|a, b| {
        let score_a = scores.get(a).copied().unwrap_or(0.0);
        let score_b = scores.get(b).copied().unwrap_or(0.0);
        score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    order
        .into_iter()
        .filter_map(|id| {
            let slide = slides.remove(&id)?;
            Some(SearchHit {
                rrf_score: scores.get(&id).copied(),
                matched_by: matched.remove(&id).unwrap_or_default(),
                slide,
            })
        })
        .collect()
}
