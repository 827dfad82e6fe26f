use crate::index::{CorpusIndex, RELATED_TERMS_CAP};
use crate::rank::{collapse_groups, fuse, rank, FusionWeights, ScoredDoc, SemanticProvider};
use crate::score::{score_all, Model, ScoreParams};
use crate::TermId;
use std::collections::HashSet;

/// One normalized query term. `id` is `None` for terms outside the corpus
/// vocabulary; those still matter to the LM scorer, which assigns them a
/// floored corpus probability.
#[derive(Debug, Clone)]
pub struct QueryTerm {
    pub text: String,
    pub id: Option<TermId>,
}

/// A query normalized with the index's own analyzer, deduplicated with first
/// occurrence order preserved. Ephemeral; scoped to one evaluation.
#[derive(Debug, Clone, Default)]
pub struct PreparedQuery {
    pub raw: String,
    pub terms: Vec<QueryTerm>,
}

impl PreparedQuery {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Normalize a raw query string using the analyzer the index was built with.
pub fn prepare(index: &CorpusIndex, raw: &str) -> PreparedQuery {
    let mut seen: HashSet<String> = HashSet::new();
    let mut terms = Vec::new();
    for term in index.analyzer().analyze(raw) {
        if !seen.insert(term.clone()) {
            continue;
        }
        let id = index.term_id(&term);
        terms.push(QueryTerm { text: term, id });
    }
    PreparedQuery {
        raw: raw.to_string(),
        terms,
    }
}

/// Expand a query with up to `cap` related terms per original term, drawn from
/// the index's co-occurrence table. The result is a superset of the input;
/// expanding an already-expanded query with the same cap adds nothing new
/// beyond the first pass's related terms.
pub fn expand(index: &CorpusIndex, query: &PreparedQuery, cap: usize) -> PreparedQuery {
    let mut seen: HashSet<String> = query.terms.iter().map(|t| t.text.clone()).collect();
    let mut terms = query.terms.clone();
    for qt in &query.terms {
        let Some(tid) = qt.id else { continue };
        for &rid in index.co_terms().related(tid).iter().take(cap) {
            let text = index.term_text(rid).to_string();
            if seen.insert(text.clone()) {
                terms.push(QueryTerm {
                    text,
                    id: Some(rid),
                });
            }
        }
    }
    PreparedQuery {
        raw: query.raw.clone(),
        terms,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub model: Model,
    pub params: ScoreParams,
    pub top_k: usize,
    pub expand: bool,
    pub expansion_cap: usize,
    /// Lexical candidate pool handed to fusion/grouping before the final
    /// truncation to `top_k`. Only used by [`search_fused`].
    pub pool: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            model: Model::Bm25,
            params: ScoreParams::default(),
            top_k: 10,
            expand: false,
            expansion_cap: RELATED_TERMS_CAP,
            pool: 50,
        }
    }
}

/// Evaluate one query with a single model: normalize, optionally expand,
/// score every document, rank, truncate.
pub fn search(index: &CorpusIndex, raw_query: &str, opts: &SearchOptions) -> Vec<ScoredDoc> {
    let query = prepare_with_opts(index, raw_query, opts);
    let scored = score_all(index, &query, opts.model, &opts.params);
    rank(scored, opts.top_k)
}

/// Multimodal variant: lexical scores for a candidate pool are fused with an
/// externally supplied semantic similarity, near-duplicates are collapsed per
/// group, and the survivors are re-ranked and truncated.
pub fn search_fused(
    index: &CorpusIndex,
    raw_query: &str,
    opts: &SearchOptions,
    provider: &dyn SemanticProvider,
    weights: &FusionWeights,
) -> Vec<ScoredDoc> {
    let query = prepare_with_opts(index, raw_query, opts);
    let scored = score_all(index, &query, opts.model, &opts.params);
    let pool = rank(scored, opts.pool.max(opts.top_k));
    let fused = fuse(index, &pool, provider, weights, raw_query);
    let grouped = collapse_groups(index, fused);
    rank(grouped, opts.top_k)
}

fn prepare_with_opts(index: &CorpusIndex, raw_query: &str, opts: &SearchOptions) -> PreparedQuery {
    let query = prepare(index, raw_query);
    if opts.expand {
        let expanded = expand(index, &query, opts.expansion_cap);
        tracing::debug!(
            original = query.terms.len(),
            expanded = expanded.terms.len(),
            "query expanded"
        );
        expanded
    } else {
        query
    }
}
