use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Text analysis configuration. The analyzer is stored inside the built index
/// so that queries are normalized with exactly the settings the corpus was
/// indexed with; an index/query mismatch silently degrades recall.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Analyzer {
    pub stemming: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self { stemming: true }
    }
}

impl Analyzer {
    pub fn new(stemming: bool) -> Self {
        Self { stemming }
    }

    /// Normalize raw text into an ordered term sequence: NFKC fold, lowercase,
    /// alphanumeric token extraction, stopword removal, optional stemming.
    /// Duplicates are kept; callers that need counts aggregate them.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut terms = Vec::new();
        for mat in WORD_RE.find_iter(&normalized) {
            let token = mat.as_str();
            if is_stopword(token) {
                continue;
            }
            let term = if self.stemming {
                STEMMER.stem(token).to_string()
            } else {
                token.to_string()
            };
            terms.push(term);
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_and_lowercases() {
        let terms = Analyzer::default().analyze("Running, runner's run!");
        assert!(terms.iter().any(|t| t == "run"));
    }

    #[test]
    fn keeps_duplicates_in_order() {
        let terms = Analyzer::new(false).analyze("dog cat dog");
        assert_eq!(terms, vec!["dog", "cat", "dog"]);
    }

    #[test]
    fn drops_punctuation_and_stopwords() {
        let terms = Analyzer::new(false).analyze("the quick... brown fox!");
        assert_eq!(terms, vec!["quick", "brown", "fox"]);
    }

    #[test]
    fn keeps_non_ascii_letters() {
        let terms = Analyzer::new(false).analyze("Café menu");
        assert_eq!(terms, vec!["café", "menu"]);
    }
}
