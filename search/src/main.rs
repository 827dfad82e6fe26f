use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quarry_core::persist::{load_index, IndexPaths};
use quarry_core::{
    search, search_fused, CorpusIndex, FusionWeights, Model, ScoreParams, ScoredDoc,
    SearchOptions, StaticSimilarities,
};
use quarry_core::score::{DEFAULT_B, DEFAULT_K1, DEFAULT_LAMBDA};
use tracing_subscriber::{fmt, EnvFilter};

use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Vsm,
    Bm25,
    Lm,
}

impl From<ModelArg> for Model {
    fn from(m: ModelArg) -> Self {
        match m {
            ModelArg::Vsm => Model::Vsm,
            ModelArg::Bm25 => Model::Bm25,
            ModelArg::Lm => Model::Lm,
        }
    }
}

#[derive(Parser)]
#[command(name = "quarry-search")]
#[command(about = "Query a built corpus index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct ParamArgs {
    /// BM25 term-frequency saturation
    #[arg(long, default_value_t = DEFAULT_K1)]
    k1: f64,
    /// BM25 length-normalization weight
    #[arg(long, default_value_t = DEFAULT_B)]
    b: f64,
    /// LM interpolation weight
    #[arg(long, default_value_t = DEFAULT_LAMBDA)]
    lambda: f64,
}

impl From<ParamArgs> for ScoreParams {
    fn from(p: ParamArgs) -> Self {
        ScoreParams {
            k1: p.k1,
            b: p.b,
            lambda: p.lambda,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query and print the ranked results
    Query {
        /// Index directory
        #[arg(long)]
        index: String,
        /// Raw query text
        query: String,
        /// Scoring model
        #[arg(long, value_enum, default_value_t = ModelArg::Bm25)]
        model: ModelArg,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Expand the query with co-occurring terms
        #[arg(long, default_value_t = false)]
        expand: bool,
        #[command(flatten)]
        params: ParamArgs,
        /// JSON file mapping external doc ids to semantic similarities;
        /// enables score fusion and grouping
        #[arg(long)]
        semantic: Option<PathBuf>,
        #[arg(long, default_value_t = 0.5)]
        w_lexical: f64,
        #[arg(long, default_value_t = 10.0)]
        w_semantic: f64,
        #[arg(long, default_value_t = 3.0)]
        exact_match_bonus: f64,
    },
    /// Score a queries file with all three models and write TREC run files
    Run {
        /// Index directory
        #[arg(long)]
        index: String,
        /// Queries file, one query per line; ids are assigned 1..n
        #[arg(long)]
        queries: String,
        /// Output directory for {model}_results.txt files
        #[arg(long)]
        output: String,
        #[arg(long, default_value_t = 1000)]
        top_k: usize,
        /// Expand queries with co-occurring terms
        #[arg(long, default_value_t = false)]
        expand: bool,
        #[command(flatten)]
        params: ParamArgs,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            index,
            query,
            model,
            top_k,
            expand,
            params,
            semantic,
            w_lexical,
            w_semantic,
            exact_match_bonus,
        } => {
            let index = load_index(&IndexPaths::new(&index))?;
            let opts = SearchOptions {
                model: model.into(),
                params: params.into(),
                top_k,
                expand,
                ..SearchOptions::default()
            };
            let hits = match semantic {
                Some(path) => {
                    let provider = load_similarities(&index, &path)?;
                    let weights = FusionWeights {
                        lexical: w_lexical,
                        semantic: w_semantic,
                        exact_match_bonus,
                    };
                    search_fused(&index, &query, &opts, &provider, &weights)
                }
                None => search(&index, &query, &opts),
            };
            print_hits(&index, &hits);
            Ok(())
        }
        Commands::Run {
            index,
            queries,
            output,
            top_k,
            expand,
            params,
        } => {
            let index = load_index(&IndexPaths::new(&index))?;
            let queries = load_queries(Path::new(&queries))?;
            run_batch(&index, &queries, Path::new(&output), top_k, expand, &params.into())
        }
    }
}

fn print_hits(index: &CorpusIndex, hits: &[ScoredDoc]) {
    if hits.is_empty() {
        println!("no results");
        return;
    }
    for (rank, hit) in hits.iter().enumerate() {
        let meta = index.meta(hit.doc_id);
        println!(
            "{:>3}  {:>10.4}  {}  {}",
            rank + 1,
            hit.score,
            meta.external_id,
            meta.title
        );
    }
}

/// Load a `{external_id: similarity}` JSON file produced by an external
/// embedding collaborator and rekey it by internal doc id. Entries for
/// unknown documents are dropped with a warning.
fn load_similarities(index: &CorpusIndex, path: &Path) -> Result<StaticSimilarities> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let raw: HashMap<String, f32> = serde_json::from_reader(f)?;
    let by_external = index.external_id_map();
    let mut scores = HashMap::with_capacity(raw.len());
    for (ext, sim) in raw {
        match by_external.get(ext.as_str()) {
            Some(&doc_id) => {
                scores.insert(doc_id, sim);
            }
            None => tracing::warn!(external_id = %ext, "similarity entry for unknown document"),
        }
    }
    Ok(StaticSimilarities::new(scores))
}

fn load_queries(path: &Path) -> Result<Vec<(u32, String)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading queries from {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, l)| (i as u32 + 1, l.to_string()))
        .collect())
}

/// One ranked line in TREC run format.
fn trec_line(query_id: u32, external_id: &str, rank: usize, score: f64, tag: &str) -> String {
    format!("{query_id} 0 {external_id} {rank} {score:.4} {tag}")
}

fn run_batch(
    index: &CorpusIndex,
    queries: &[(u32, String)],
    output: &Path,
    top_k: usize,
    expand: bool,
    params: &ScoreParams,
) -> Result<()> {
    create_dir_all(output)?;
    for model in Model::ALL {
        let path = output.join(format!("{model}_results.txt"));
        let mut writer = BufWriter::new(File::create(&path)?);
        let opts = SearchOptions {
            model,
            params: *params,
            top_k,
            expand,
            ..SearchOptions::default()
        };
        for (query_id, text) in queries {
            let hits = search(index, text, &opts);
            for (i, hit) in hits.iter().enumerate() {
                let meta = index.meta(hit.doc_id);
                writeln!(
                    writer,
                    "{}",
                    trec_line(*query_id, &meta.external_id, i + 1, hit.score, model.run_tag())
                )?;
            }
            tracing::debug!(query_id, %model, hits = hits.len(), "query scored");
        }
        writer.flush()?;
        tracing::info!(path = %path.display(), %model, "run file written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{Analyzer, DocMeta, IndexBuilder};
    use tempfile::tempdir;

    #[test]
    fn trec_line_matches_eval_format() {
        let line = trec_line(3, "cran-142", 1, 4.21987, "BM25_run");
        assert_eq!(line, "3 0 cran-142 1 4.2199 BM25_run");
    }

    #[test]
    fn queries_are_numbered_from_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.txt");
        std::fs::write(&path, "first query\n\n  second query  \n").unwrap();
        let queries = load_queries(&path).unwrap();
        assert_eq!(
            queries,
            vec![(1, "first query".to_string()), (2, "second query".to_string())]
        );
    }

    #[test]
    fn run_batch_writes_one_file_per_model() {
        let mut builder = IndexBuilder::new(Analyzer::new(false));
        builder.add_document(DocMeta::new("d1", "one"), "", "cat dog");
        builder.add_document(DocMeta::new("d2", "two"), "", "dog dog bird");
        let index = builder.finish().unwrap();

        let dir = tempdir().unwrap();
        let queries = vec![(1u32, "dog".to_string())];
        run_batch(
            &index,
            &queries,
            dir.path(),
            10,
            false,
            &ScoreParams::default(),
        )
        .unwrap();

        for model in Model::ALL {
            let text =
                std::fs::read_to_string(dir.path().join(format!("{model}_results.txt"))).unwrap();
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines.len(), 2, "{model}");
            assert!(lines[0].starts_with("1 0 "));
            assert!(lines[0].ends_with(model.run_tag()));
        }
        // BM25 puts the doc with the higher term frequency first.
        let bm25 = std::fs::read_to_string(dir.path().join("bm25_results.txt")).unwrap();
        assert!(bm25.lines().next().unwrap().contains(" d2 "));
    }
}
