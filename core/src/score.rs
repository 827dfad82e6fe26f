use crate::index::CorpusIndex;
use crate::query::PreparedQuery;
use crate::rank::ScoredDoc;
use crate::DocId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Floor applied to L2 norms in cosine scoring so a degenerate (all-zero)
/// vector yields similarity 0 instead of NaN.
pub const NORM_EPSILON: f64 = 1e-9;
/// Additive floor inside the LM logarithm, guarding ln(0).
pub const LM_EPSILON: f64 = 1e-6;
/// Corpus probability assumed for a term that never occurs in the corpus.
pub const UNSEEN_TERM_PROB: f64 = 1e-6;

pub const DEFAULT_K1: f64 = 2.9;
pub const DEFAULT_B: f64 = 0.3;
pub const DEFAULT_LAMBDA: f64 = 0.7;

/// Tunable scoring parameters. `k1` saturates BM25 term frequency, `b` weighs
/// BM25 length normalization, `lambda` interpolates the LM document and corpus
/// distributions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreParams {
    pub k1: f64,
    pub b: f64,
    pub lambda: f64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            lambda: DEFAULT_LAMBDA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Vsm,
    Bm25,
    Lm,
}

impl Model {
    pub const ALL: [Model; 3] = [Model::Vsm, Model::Bm25, Model::Lm];

    /// Tag written into TREC run files for this model.
    pub fn run_tag(&self) -> &'static str {
        match self {
            Model::Vsm => "VSM_run",
            Model::Bm25 => "BM25_run",
            Model::Lm => "LM_run",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Model::Vsm => "vsm",
            Model::Bm25 => "bm25",
            Model::Lm => "lm",
        };
        f.write_str(name)
    }
}

/// Sublinear document tf transform: 1 + ln(tf + 1) for tf > 0, else 0.
pub(crate) fn sublinear_tf(tf_raw: u32) -> f64 {
    if tf_raw == 0 {
        0.0
    } else {
        1.0 + (tf_raw as f64 + 1.0).ln()
    }
}

/// Cosine similarity between the query vector and the document's tf-idf
/// vector. Query terms are weighted by IDF alone (binary presence); document
/// terms use the sublinear tf transform. Both norms are floored so degenerate
/// vectors score 0.
pub fn vsm_score(index: &CorpusIndex, query: &PreparedQuery, doc: DocId) -> f64 {
    let mut dot = 0.0;
    let mut q_norm_sq = 0.0;
    for qt in &query.terms {
        let idf = index.idf(qt.id);
        q_norm_sq += idf * idf;
        let Some(tid) = qt.id else { continue };
        let tf = index.tf(tid, doc);
        if tf == 0 {
            continue;
        }
        dot += idf * (sublinear_tf(tf) * idf);
    }
    let q_norm = q_norm_sq.sqrt().max(NORM_EPSILON);
    let d_norm = index.doc_norm(doc).max(NORM_EPSILON);
    dot / (q_norm * d_norm)
}

/// Okapi BM25. Terms absent from the document contribute 0; a document
/// containing no query term scores exactly 0.
pub fn bm25_score(index: &CorpusIndex, query: &PreparedQuery, doc: DocId, params: &ScoreParams) -> f64 {
    let doc_len = index.doc_length(doc) as f64;
    let avg_len = index.avg_doc_length();
    let mut score = 0.0;
    for qt in &query.terms {
        let Some(tid) = qt.id else { continue };
        let tf = index.tf(tid, doc) as f64;
        if tf == 0.0 {
            continue;
        }
        let len_norm = if avg_len > 0.0 {
            1.0 - params.b + params.b * (doc_len / avg_len)
        } else {
            1.0
        };
        score += index.idf(qt.id) * (tf * (params.k1 + 1.0)) / (tf + params.k1 * len_norm);
    }
    score
}

/// Jelinek-Mercer smoothed unigram language model log-likelihood. Every query
/// term contributes one summand whether or not it occurs in the document;
/// skipping absent terms would stop this being a generative LM score.
pub fn lm_score(index: &CorpusIndex, query: &PreparedQuery, doc: DocId, params: &ScoreParams) -> f64 {
    let doc_len = index.doc_length(doc) as f64;
    let mut score = 0.0;
    for qt in &query.terms {
        let p_doc = match qt.id {
            Some(tid) if doc_len > 0.0 => index.tf(tid, doc) as f64 / doc_len,
            _ => 0.0,
        };
        let p_corpus = qt
            .id
            .map(|tid| index.corpus_term_prob(tid))
            .filter(|&p| p > 0.0)
            .unwrap_or(UNSEEN_TERM_PROB);
        score += (params.lambda * p_doc + (1.0 - params.lambda) * p_corpus + LM_EPSILON).ln();
    }
    score
}

pub fn score_one(
    index: &CorpusIndex,
    query: &PreparedQuery,
    model: Model,
    params: &ScoreParams,
    doc: DocId,
) -> f64 {
    match model {
        Model::Vsm => vsm_score(index, query, doc),
        Model::Bm25 => bm25_score(index, query, doc, params),
        Model::Lm => lm_score(index, query, doc, params),
    }
}

/// Score every document in the corpus against the query. Per-document scoring
/// has no cross-document dependency, so documents are scored in parallel. An
/// empty query or empty corpus yields an empty result, not an error.
pub fn score_all(
    index: &CorpusIndex,
    query: &PreparedQuery,
    model: Model,
    params: &ScoreParams,
) -> Vec<ScoredDoc> {
    if query.terms.is_empty() || index.num_docs() == 0 {
        return Vec::new();
    }
    (0..index.num_docs())
        .into_par_iter()
        .map(|doc_id| ScoredDoc {
            doc_id,
            score: score_one(index, query, model, params, doc_id),
        })
        .collect()
}
