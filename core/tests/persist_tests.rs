use quarry_core::persist::{load_index, save_index, IndexPaths};
use quarry_core::{
    score_all, Analyzer, DocMeta, EngineError, IndexBuilder, Model, ScoreParams,
};
use quarry_core::query::prepare;
use tempfile::tempdir;

fn build_index() -> quarry_core::CorpusIndex {
    let mut builder = IndexBuilder::new(Analyzer::default());
    builder.add_document(
        DocMeta::new("cran-1", "boundary layer flow"),
        "boundary layer flow",
        "experimental investigation of the aerodynamics of a wing in a slipstream",
    );
    builder.add_document(
        DocMeta::new("cran-2", "heat transfer"),
        "heat transfer",
        "simple shear flow past a flat plate in an incompressible fluid",
    );
    builder.add_document(
        DocMeta::new("cran-3", "supersonic wing"),
        "supersonic wing",
        "the behaviour of a wing at supersonic speeds and high temperatures",
    );
    builder.finish().unwrap()
}

#[test]
fn round_trip_reproduces_bit_identical_scores() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let index = build_index();
    save_index(&paths, &index, "2026-01-01T00:00:00Z").unwrap();
    let reloaded = load_index(&paths).unwrap();

    let params = ScoreParams::default();
    for raw in ["wing slipstream", "heat flow plate", "supersonic"] {
        let before = prepare(&index, raw);
        let after = prepare(&reloaded, raw);
        for model in Model::ALL {
            let a = score_all(&index, &before, model, &params);
            let b = score_all(&reloaded, &after, model, &params);
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(b.iter()) {
                assert_eq!(x.doc_id, y.doc_id);
                assert_eq!(x.score.to_bits(), y.score.to_bits(), "model {model}");
            }
        }
    }
}

#[test]
fn load_from_empty_directory_fails_cleanly() {
    let dir = tempdir().unwrap();
    let err = load_index(&IndexPaths::new(dir.path())).unwrap_err();
    assert!(matches!(err, EngineError::Io(_)));
}

#[test]
fn load_rejects_meta_mismatch() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    save_index(&paths, &build_index(), "2026-01-01T00:00:00Z").unwrap();

    // Overwrite the meta file with a different corpus size.
    let meta_path = dir.path().join("meta.json");
    let text = std::fs::read_to_string(&meta_path).unwrap();
    let tampered = text.replace("\"num_docs\": 3", "\"num_docs\": 4");
    assert_ne!(text, tampered);
    std::fs::write(&meta_path, tampered).unwrap();

    let err = load_index(&paths).unwrap_err();
    assert!(matches!(err, EngineError::CorpusInconsistency { .. }));
}

#[test]
fn load_rejects_unknown_version() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    save_index(&paths, &build_index(), "2026-01-01T00:00:00Z").unwrap();

    let meta_path = dir.path().join("meta.json");
    let text = std::fs::read_to_string(&meta_path).unwrap();
    let tampered = text.replace("\"version\": 1", "\"version\": 99");
    assert_ne!(text, tampered);
    std::fs::write(&meta_path, tampered).unwrap();

    let err = load_index(&paths).unwrap_err();
    assert!(matches!(err, EngineError::CorpusInconsistency { .. }));
}
