use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quarry_core::persist::{load_meta, save_index, IndexPaths};
use quarry_core::{Analyzer, DocMeta, IndexBuilder};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    title: String,
    body: String,
    url: Option<String>,
    /// Page the document came from; used for result grouping.
    source: Option<String>,
    /// Canonical label for the fused exact-match bonus.
    label: Option<String>,
    caption: Option<String>,
}

#[derive(Parser)]
#[command(name = "quarry-indexer")]
#[command(about = "Build and inspect corpus indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Disable stemming during analysis
        #[arg(long, default_value_t = false)]
        no_stemming: bool,
    },
    /// Print an index's meta file
    Info {
        /// Index directory
        #[arg(long)]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            no_stemming,
        } => build_index(&input, &output, no_stemming),
        Commands::Info { index } => {
            let meta = load_meta(&IndexPaths::new(&index))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
            Ok(())
        }
    }
}

fn build_index(input: &str, output: &str, no_stemming: bool) -> Result<()> {
    let input_path = Path::new(input);
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        anyhow::bail!("input path {input} does not exist");
    }

    let mut builder = IndexBuilder::new(Analyzer::new(!no_stemming));
    let mut ingested = 0u64;
    for file in &files {
        let count = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            ingest_jsonl(file, &mut builder)?
        } else {
            ingest_json(file, &mut builder)?
        };
        tracing::info!(file = %file.display(), count, "ingested");
        ingested += count;
    }

    let index = builder.finish()?;
    tracing::info!(ingested, num_terms = index.num_terms(), "corpus ingested");

    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into());
    let paths = IndexPaths::new(output);
    save_index(&paths, &index, &created_at)?;
    tracing::info!(output, "index build complete");
    Ok(())
}

fn ingest_jsonl(file: &Path, builder: &mut IndexBuilder) -> Result<u64> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    let mut count = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc = serde_json::from_str(&line)?;
        ingest_doc(doc, builder);
        count += 1;
    }
    Ok(count)
}

fn ingest_json(file: &Path, builder: &mut IndexBuilder) -> Result<u64> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let mut count = 0u64;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                ingest_doc(doc, builder);
                count += 1;
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            ingest_doc(doc, builder);
            count += 1;
        }
        _ => {}
    }
    Ok(count)
}

fn ingest_doc(doc: InputDoc, builder: &mut IndexBuilder) {
    let meta = DocMeta {
        external_id: doc.id,
        title: doc.title.clone(),
        url: doc.url,
        source: doc.source,
        label: doc.label,
        caption: doc.caption,
    };
    builder.add_document(meta, &doc.title, &doc.body);
}
