use crate::error::{EngineError, Result};
use crate::index::CorpusIndex;
use crate::{DocId, DocMeta};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// Sort descending by score with ties broken by ascending doc_id, then
/// truncate to `top_k`. The tie-break makes the ranking a total order, so two
/// identically scored lists always sort the same way.
pub fn rank(mut scored: Vec<ScoredDoc>, top_k: usize) -> Vec<ScoredDoc> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    scored.truncate(top_k);
    scored
}

/// Supplies a precomputed query/document semantic similarity in [-1, 1]
/// (cosine of external embeddings). The engine never computes embeddings
/// itself. Implementations are expected to bound their own latency; a slow or
/// failing lookup is recovered by [`fuse`] with a neutral score, never a query
/// failure.
pub trait SemanticProvider {
    fn similarity(&self, doc_id: DocId) -> Result<f32>;
}

/// Provider backed by a precomputed per-document similarity table, e.g.
/// loaded from an embedding collaborator's output file.
pub struct StaticSimilarities {
    scores: HashMap<DocId, f32>,
}

impl StaticSimilarities {
    pub fn new(scores: HashMap<DocId, f32>) -> Self {
        Self { scores }
    }
}

impl SemanticProvider for StaticSimilarities {
    fn similarity(&self, doc_id: DocId) -> Result<f32> {
        self.scores
            .get(&doc_id)
            .copied()
            .ok_or(EngineError::Provider {
                doc_id,
                reason: "no similarity entry".into(),
            })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionWeights {
    pub lexical: f64,
    pub semantic: f64,
    /// Added when the query string exactly matches a document's canonical
    /// label (case-insensitive).
    pub exact_match_bonus: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.5,
            semantic: 10.0,
            exact_match_bonus: 3.0,
        }
    }
}

/// Blend each lexical score with the external semantic similarity:
/// `w_lexical * lexical + w_semantic * semantic (+ bonus)`. A provider error
/// for a document is logged and that document falls back to semantic 0.
pub fn fuse(
    index: &CorpusIndex,
    scored: &[ScoredDoc],
    provider: &dyn SemanticProvider,
    weights: &FusionWeights,
    raw_query: &str,
) -> Vec<ScoredDoc> {
    let query = raw_query.trim();
    scored
        .iter()
        .map(|s| {
            let semantic = match provider.similarity(s.doc_id) {
                Ok(v) => v as f64,
                Err(err) => {
                    tracing::warn!(doc_id = s.doc_id, %err, "falling back to neutral semantic score");
                    0.0
                }
            };
            let mut score = weights.lexical * s.score + weights.semantic * semantic;
            if let Some(label) = index.meta(s.doc_id).label.as_deref() {
                if !query.is_empty() && label.trim().eq_ignore_ascii_case(query) {
                    score += weights.exact_match_bonus;
                }
            }
            ScoredDoc {
                doc_id: s.doc_id,
                score,
            }
        })
        .collect()
}

/// Collapse documents that describe the same logical entity (same title and
/// source page) to a single representative, chosen by a metadata quality
/// heuristic rather than a relevance score. Runs after scoring/fusion and
/// before the final sort and truncation; the output order is unspecified and
/// callers re-rank it.
pub fn collapse_groups(index: &CorpusIndex, scored: Vec<ScoredDoc>) -> Vec<ScoredDoc> {
    let mut out: Vec<ScoredDoc> = Vec::new();
    let mut groups: HashMap<(&str, &str), Vec<ScoredDoc>> = HashMap::new();
    for s in &scored {
        let meta = index.meta(s.doc_id);
        match meta.source.as_deref() {
            Some(src) => groups
                .entry((meta.title.as_str(), src))
                .or_default()
                .push(*s),
            // Documents without a source page are their own group.
            None => out.push(*s),
        }
    }
    for (_, members) in groups {
        let rep = members
            .into_iter()
            .max_by_key(|s| (quality(index.meta(s.doc_id)), Reverse(s.doc_id)))
            .expect("groups are non-empty");
        out.push(rep);
    }
    out
}

/// Deterministic quality of a document's metadata: richer captions win, then
/// longer titles; remaining ties go to the lowest doc_id via the caller.
fn quality(meta: &DocMeta) -> (usize, usize) {
    let caption_len = meta.caption.as_deref().map(str::len).unwrap_or(0);
    (caption_len, meta.title.len())
}
