use crate::error::{EngineError, Result};
use crate::score::sublinear_tf;
use crate::tokenizer::Analyzer;
use crate::{DocId, DocMeta, TermId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Floor weight for a term that occurs in no document, so an unseen query term
/// contributes a small fixed weight instead of zeroing out a dot product.
pub const IDF_FLOOR: f64 = 0.1;

/// How many co-occurring terms are retained per vocabulary term for query
/// expansion.
pub const RELATED_TERMS_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

/// Term-to-related-terms table for query expansion. This is deliberately a
/// separate structure from the postings lists: expansion only ever consumes
/// vocabulary terms, never document identifiers.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CoTermMap {
    related: Vec<Vec<TermId>>,
}

impl CoTermMap {
    pub fn related(&self, term: TermId) -> &[TermId] {
        self.related
            .get(term as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.related.len()
    }

    pub fn is_empty(&self) -> bool {
        self.related.is_empty()
    }
}

/// Immutable inverted index plus corpus statistics, built once per corpus
/// snapshot. Every query-time operation reads it without locking.
#[derive(Debug, Serialize, Deserialize)]
pub struct CorpusIndex {
    analyzer: Analyzer,
    dictionary: HashMap<String, TermId>,
    vocab: Vec<String>,
    /// Per-term posting lists, sorted by doc_id. Document frequency is the
    /// list length; the tf table and the postings set are one structure.
    postings: Vec<Vec<Posting>>,
    docs: Vec<DocMeta>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f64,
    corpus_term_freq: Vec<u64>,
    corpus_term_prob: Vec<f64>,
    /// L2 norm of each document's sublinear tf-idf vector, precomputed for
    /// cosine scoring.
    doc_norms: Vec<f64>,
    co_terms: CoTermMap,
}

impl CorpusIndex {
    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn num_docs(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn num_terms(&self) -> u32 {
        self.vocab.len() as u32
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.dictionary.get(term).copied()
    }

    pub fn term_text(&self, term: TermId) -> &str {
        &self.vocab[term as usize]
    }

    pub fn postings(&self, term: TermId) -> &[Posting] {
        &self.postings[term as usize]
    }

    /// Document frequency: number of documents containing the term.
    pub fn df(&self, term: TermId) -> u32 {
        self.postings[term as usize].len() as u32
    }

    /// Raw occurrence count of `term` in `doc`; 0 when absent.
    pub fn tf(&self, term: TermId, doc: DocId) -> u32 {
        let plist = &self.postings[term as usize];
        match plist.binary_search_by_key(&doc, |p| p.doc_id) {
            Ok(i) => plist[i].tf,
            Err(_) => 0,
        }
    }

    pub fn doc_length(&self, doc: DocId) -> u32 {
        self.doc_lengths[doc as usize]
    }

    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    pub fn corpus_term_freq(&self, term: TermId) -> u64 {
        self.corpus_term_freq[term as usize]
    }

    /// Corpus-wide probability of the term, i.e. its share of all term
    /// occurrences in the corpus.
    pub fn corpus_term_prob(&self, term: TermId) -> f64 {
        self.corpus_term_prob[term as usize]
    }

    pub fn doc_norm(&self, doc: DocId) -> f64 {
        self.doc_norms[doc as usize]
    }

    pub fn meta(&self, doc: DocId) -> &DocMeta {
        &self.docs[doc as usize]
    }

    pub fn docs(&self) -> &[DocMeta] {
        &self.docs
    }

    pub fn co_terms(&self) -> &CoTermMap {
        &self.co_terms
    }

    pub fn external_id_map(&self) -> HashMap<&str, DocId> {
        self.docs
            .iter()
            .enumerate()
            .map(|(i, m)| (m.external_id.as_str(), i as DocId))
            .collect()
    }

    /// Canonical IDF shared by the VSM and BM25 scorers:
    /// `ln(1 + N / (df + 1))`, floored at [`IDF_FLOOR`] for terms absent from
    /// the whole corpus (`None` or df == 0).
    pub fn idf(&self, term: Option<TermId>) -> f64 {
        let df = term.map(|t| self.df(t)).unwrap_or(0);
        if df > 0 {
            (1.0 + self.num_docs() as f64 / (df as f64 + 1.0)).ln()
        } else {
            IDF_FLOOR
        }
    }

    /// Check that statistics, postings, and document tables all describe the
    /// same corpus snapshot. Run before an index may serve queries; a failure
    /// here is fatal, never worked around.
    pub fn validate(&self) -> Result<()> {
        let n = self.docs.len();
        let v = self.vocab.len();
        if self.doc_lengths.len() != n {
            return Err(inconsistent(format!(
                "{} doc lengths for {} documents",
                self.doc_lengths.len(),
                n
            )));
        }
        if self.doc_norms.len() != n {
            return Err(inconsistent(format!(
                "{} doc norms for {} documents",
                self.doc_norms.len(),
                n
            )));
        }
        if self.dictionary.len() != v
            || self.postings.len() != v
            || self.corpus_term_freq.len() != v
            || self.corpus_term_prob.len() != v
            || self.co_terms.len() != v
        {
            return Err(inconsistent(format!(
                "vocabulary tables disagree on term count (vocab {v})"
            )));
        }
        let total: u64 = self.doc_lengths.iter().map(|&l| l as u64).sum();
        let expected_avg = if n == 0 { 0.0 } else { total as f64 / n as f64 };
        if (self.avg_doc_length - expected_avg).abs() > 1e-9 {
            return Err(inconsistent(format!(
                "avg_doc_length {} does not match recomputed {}",
                self.avg_doc_length, expected_avg
            )));
        }
        let prob_sum: f64 = self.corpus_term_prob.iter().sum();
        if prob_sum > 1.0 + 1e-9 {
            return Err(inconsistent(format!(
                "corpus term probabilities sum to {prob_sum}"
            )));
        }
        for (tid, plist) in self.postings.iter().enumerate() {
            if plist.is_empty() {
                return Err(inconsistent(format!("term {tid} has empty postings")));
            }
            let mut prev: Option<DocId> = None;
            for p in plist {
                if p.doc_id as usize >= n {
                    return Err(inconsistent(format!(
                        "term {tid} posting references unknown doc {}",
                        p.doc_id
                    )));
                }
                if prev.is_some_and(|d| d >= p.doc_id) {
                    return Err(inconsistent(format!(
                        "term {tid} postings not sorted by doc_id"
                    )));
                }
                prev = Some(p.doc_id);
            }
            let freq: u64 = plist.iter().map(|p| p.tf as u64).sum();
            if freq != self.corpus_term_freq[tid] {
                return Err(inconsistent(format!(
                    "corpus_term_freq[{tid}] = {} but postings sum to {freq}",
                    self.corpus_term_freq[tid]
                )));
            }
        }
        Ok(())
    }
}

fn inconsistent(reason: String) -> EngineError {
    EngineError::CorpusInconsistency { reason }
}

/// Single-pass index builder. Documents are assigned dense ids in ingestion
/// order; `finish` freezes the index after computing corpus statistics and
/// validating them.
pub struct IndexBuilder {
    analyzer: Analyzer,
    dictionary: HashMap<String, TermId>,
    vocab: Vec<String>,
    postings: Vec<Vec<Posting>>,
    docs: Vec<DocMeta>,
    doc_lengths: Vec<u32>,
    co_counts: Vec<HashMap<TermId, u32>>,
}

impl IndexBuilder {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            dictionary: HashMap::new(),
            vocab: Vec::new(),
            postings: Vec::new(),
            docs: Vec::new(),
            doc_lengths: Vec::new(),
            co_counts: Vec::new(),
        }
    }

    fn intern(&mut self, term: String) -> TermId {
        if let Some(&tid) = self.dictionary.get(&term) {
            return tid;
        }
        let tid = self.vocab.len() as TermId;
        self.dictionary.insert(term.clone(), tid);
        self.vocab.push(term);
        self.postings.push(Vec::new());
        self.co_counts.push(HashMap::new());
        tid
    }

    /// Ingest one document. Title and body fields are concatenated before
    /// analysis. A document whose content is empty after filtering still gets
    /// an entry, with length 0.
    pub fn add_document(&mut self, meta: DocMeta, title: &str, body: &str) -> DocId {
        let doc_id = self.docs.len() as DocId;
        let text = format!("{title} {body}");
        let mut counts: HashMap<TermId, u32> = HashMap::new();
        for term in self.analyzer.analyze(&text) {
            let tid = self.intern(term);
            *counts.entry(tid).or_insert(0) += 1;
        }
        let length: u32 = counts.values().sum();

        // Appending in doc_id order keeps every posting list sorted.
        for (&tid, &tf) in &counts {
            self.postings[tid as usize].push(Posting { doc_id, tf });
        }

        let unique: Vec<TermId> = counts.keys().copied().collect();
        for &a in &unique {
            for &b in &unique {
                if a != b {
                    *self.co_counts[a as usize].entry(b).or_insert(0) += 1;
                }
            }
        }

        self.doc_lengths.push(length);
        self.docs.push(meta);
        doc_id
    }

    pub fn finish(mut self) -> Result<CorpusIndex> {
        let n = self.docs.len();

        for plist in &mut self.postings {
            plist.sort_by_key(|p| p.doc_id);
        }

        let corpus_term_freq: Vec<u64> = self
            .postings
            .iter()
            .map(|plist| plist.iter().map(|p| p.tf as u64).sum())
            .collect();
        let total_terms: u64 = corpus_term_freq.iter().sum();
        let corpus_term_prob: Vec<f64> = corpus_term_freq
            .iter()
            .map(|&f| {
                if total_terms == 0 {
                    0.0
                } else {
                    f as f64 / total_terms as f64
                }
            })
            .collect();

        let avg_doc_length = if n == 0 {
            0.0
        } else {
            self.doc_lengths.iter().map(|&l| l as u64).sum::<u64>() as f64 / n as f64
        };

        // Document vector norms under the same tf transform and IDF the VSM
        // scorer uses at query time.
        let mut doc_norms = vec![0.0f64; n];
        for plist in self.postings.iter() {
            let df = plist.len() as f64;
            let idf = (1.0 + n as f64 / (df + 1.0)).ln();
            for p in plist {
                let w = sublinear_tf(p.tf) * idf;
                doc_norms[p.doc_id as usize] += w * w;
            }
        }
        for norm in &mut doc_norms {
            *norm = norm.sqrt();
        }

        let related: Vec<Vec<TermId>> = self
            .co_counts
            .into_iter()
            .map(|counts| {
                let mut pairs: Vec<(TermId, u32)> = counts.into_iter().collect();
                pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                pairs.truncate(RELATED_TERMS_CAP);
                pairs.into_iter().map(|(tid, _)| tid).collect()
            })
            .collect();

        let index = CorpusIndex {
            analyzer: self.analyzer,
            dictionary: self.dictionary,
            vocab: self.vocab,
            postings: self.postings,
            docs: self.docs,
            doc_lengths: self.doc_lengths,
            avg_doc_length,
            corpus_term_freq,
            corpus_term_prob,
            doc_norms,
            co_terms: CoTermMap { related },
        };
        index.validate()?;
        tracing::info!(
            num_docs = index.num_docs(),
            num_terms = index.num_terms(),
            avg_doc_length = index.avg_doc_length(),
            "corpus index built"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocMeta;

    fn tiny_index() -> CorpusIndex {
        let mut builder = IndexBuilder::new(Analyzer::new(false));
        builder.add_document(DocMeta::new("d1", "doc one"), "", "cat dog");
        builder.add_document(DocMeta::new("d2", "doc two"), "", "dog dog bird");
        builder.add_document(DocMeta::new("d3", "doc three"), "", "bird fish");
        builder.finish().unwrap()
    }

    #[test]
    fn statistics_count_occurrences_not_documents() {
        let index = tiny_index();
        let dog = index.term_id("dog").unwrap();
        // "dog" occurs once in d1 and twice in d2: total 3, df 2.
        assert_eq!(index.corpus_term_freq(dog), 3);
        assert_eq!(index.df(dog), 2);
        let total: u64 = (0..index.num_terms())
            .map(|t| index.corpus_term_freq(t))
            .sum();
        assert_eq!(total, 7);
        assert!((index.corpus_term_prob(dog) - 3.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn doc_lengths_and_average() {
        let index = tiny_index();
        assert_eq!(index.doc_length(0), 2);
        assert_eq!(index.doc_length(1), 3);
        assert_eq!(index.doc_length(2), 2);
        assert!((index.avg_doc_length() - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn idf_decreases_with_df() {
        let index = tiny_index();
        let fish = index.term_id("fish").unwrap(); // df 1
        let dog = index.term_id("dog").unwrap(); // df 2
        assert!(index.idf(Some(fish)) > index.idf(Some(dog)));
        assert_eq!(index.idf(None), IDF_FLOOR);
    }

    #[test]
    fn tf_lookup_is_sparse() {
        let index = tiny_index();
        let dog = index.term_id("dog").unwrap();
        assert_eq!(index.tf(dog, 0), 1);
        assert_eq!(index.tf(dog, 1), 2);
        assert_eq!(index.tf(dog, 2), 0);
    }

    #[test]
    fn empty_document_gets_zero_length_entry() {
        let mut builder = IndexBuilder::new(Analyzer::new(false));
        builder.add_document(DocMeta::new("d1", "t"), "", "the and of");
        builder.add_document(DocMeta::new("d2", "t"), "", "fish");
        let index = builder.finish().unwrap();
        assert_eq!(index.num_docs(), 2);
        assert_eq!(index.doc_length(0), 0);
        assert_eq!(index.doc_norm(0), 0.0);
    }

    #[test]
    fn empty_corpus_builds() {
        let index = IndexBuilder::new(Analyzer::default()).finish().unwrap();
        assert_eq!(index.num_docs(), 0);
        assert_eq!(index.avg_doc_length(), 0.0);
    }

    #[test]
    fn co_terms_hold_vocabulary_terms_only() {
        let index = tiny_index();
        let dog = index.term_id("dog").unwrap();
        let related = index.co_terms().related(dog);
        // dog co-occurs with cat (d1) and bird (d2).
        assert!(!related.is_empty());
        for &tid in related {
            assert!((tid as usize) < index.num_terms() as usize);
            assert_ne!(tid, dog);
        }
        let texts: Vec<&str> = related.iter().map(|&t| index.term_text(t)).collect();
        assert!(texts.contains(&"cat"));
        assert!(texts.contains(&"bird"));
    }

    #[test]
    fn validation_rejects_tampered_statistics() {
        let mut index = tiny_index();
        index.avg_doc_length += 1.0;
        let err = index.validate().unwrap_err();
        assert!(matches!(
            err,
            crate::EngineError::CorpusInconsistency { .. }
        ));
    }

    #[test]
    fn validation_rejects_dangling_postings() {
        let mut index = tiny_index();
        index.docs.pop();
        index.doc_lengths.pop();
        index.doc_norms.pop();
        index.avg_doc_length = 5.0 / 2.0;
        assert!(index.validate().is_err());
    }
}
