use crate::error::{EngineError, Result};
use crate::index::CorpusIndex;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn index(&self) -> PathBuf {
        self.root.join("index.bin")
    }

    fn meta(&self) -> PathBuf {
        self.root.join("meta.json")
    }
}

/// Persist the whole index plus a human-readable meta file. Statistics are
/// serialized verbatim (f64 bits included), so a reloaded index reproduces
/// bit-identical scores.
pub fn save_index(paths: &IndexPaths, index: &CorpusIndex, created_at: &str) -> Result<()> {
    create_dir_all(&paths.root)?;
    let bytes = bincode::serialize(index)?;
    let mut f = File::create(paths.index())?;
    f.write_all(&bytes)?;

    let meta = MetaFile {
        num_docs: index.num_docs(),
        num_terms: index.num_terms(),
        created_at: created_at.to_string(),
        version: INDEX_VERSION,
    };
    let json = serde_json::to_string_pretty(&meta)?;
    let mut f = File::create(paths.meta())?;
    f.write_all(json.as_bytes())?;
    tracing::info!(root = %paths.root.display(), "index saved");
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut buf = String::new();
    File::open(paths.meta())?.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Load and validate an index. Any mismatch between the meta file and the
/// index body, or an internal consistency failure, is surfaced as an error;
/// an invalid index is never returned.
pub fn load_index(paths: &IndexPaths) -> Result<CorpusIndex> {
    let meta = load_meta(paths)?;
    if meta.version != INDEX_VERSION {
        return Err(EngineError::CorpusInconsistency {
            reason: format!(
                "index version {} not supported (expected {INDEX_VERSION})",
                meta.version
            ),
        });
    }
    let mut buf = Vec::new();
    File::open(paths.index())?.read_to_end(&mut buf)?;
    let index: CorpusIndex = bincode::deserialize(&buf)?;
    if index.num_docs() != meta.num_docs || index.num_terms() != meta.num_terms {
        return Err(EngineError::CorpusInconsistency {
            reason: format!(
                "meta file says {} docs / {} terms, index holds {} / {}",
                meta.num_docs,
                meta.num_terms,
                index.num_docs(),
                index.num_terms()
            ),
        });
    }
    index.validate()?;
    Ok(index)
}
