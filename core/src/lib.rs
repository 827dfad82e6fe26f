use serde::{Deserialize, Serialize};

pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod rank;
pub mod score;
pub mod tokenizer;

pub use error::{EngineError, Result};
pub use index::{CoTermMap, CorpusIndex, IndexBuilder, Posting};
pub use query::{expand, prepare, search, search_fused, PreparedQuery, QueryTerm, SearchOptions};
pub use rank::{
    collapse_groups, fuse, rank, FusionWeights, ScoredDoc, SemanticProvider, StaticSimilarities,
};
pub use score::{score_all, Model, ScoreParams};
pub use tokenizer::Analyzer;

pub type TermId = u32;
pub type DocId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
    /// Page the document was extracted from; grouping key together with the title.
    pub source: Option<String>,
    /// Canonical label checked by the exact-match bonus during score fusion.
    pub label: Option<String>,
    /// Free-text caption, consulted by the grouping quality heuristic.
    pub caption: Option<String>,
}

impl DocMeta {
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            url: None,
            source: None,
            label: None,
            caption: None,
        }
    }
}
