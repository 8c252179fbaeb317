#![cfg(unix)]

use std::path::Path;

use bibcomplete::{
    BibliographyLoader, CiteprocConverter, CompletionEngine, Diagnostics,
    Error, Origin, QueryMatcher, ResolverConfig, SearchSource, SourceResolver,
    TexmfLocator, tool::ToolCommand,
};
use serde_json::json;

/// A converter that prints the bibliography file itself, so fixtures are
/// written directly as CSL JSON.
fn cat_converter() -> CiteprocConverter {
    CiteprocConverter::new(
        ToolCommand::new("/bin/sh").arg("-c").arg("cat \"$2\"").arg("sh"),
    )
}

struct NoTexmf;

impl TexmfLocator for NoTexmf {
    fn texmf_home(&self) -> bibcomplete::Result<Option<std::path::PathBuf>> {
        Ok(None)
    }
}

fn engine() -> CompletionEngine<CiteprocConverter, NoTexmf> {
    CompletionEngine::new(
        SourceResolver::new(NoTexmf),
        BibliographyLoader::new(cat_converter()),
        QueryMatcher::default(),
    )
}

fn write_json(path: &Path, value: serde_json::Value) {
    std::fs::write(path, value.to_string()).unwrap();
}

fn paper_config(root: &Path) -> ResolverConfig {
    ResolverConfig {
        sources: vec![SearchSource::SameName],
        bib_extensions: vec!["bib".into()],
        current_document: Some(root.join("paper.md")),
        working_dir: root.to_path_buf(),
        ..ResolverConfig::default()
    }
}

#[test]
fn same_name_bibliography_completes_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::write(root.join("paper.md"), "See [@doe").unwrap();
    write_json(
        &root.join("paper.bib"),
        json!([{
            "id": "doe2020",
            "title": "A Study",
            "author": [{"family": "Doe", "given": "J"}],
        }]),
    );

    let engine = engine();
    let config = paper_config(&root);
    let mut diagnostics = Diagnostics::new();

    let suggestions = engine.complete(&config, &[], "doe", &mut diagnostics);
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].label, "doe2020");
    assert_eq!(suggestions[0].insertion, "doe2020");
    assert_eq!(suggestions[0].detail(), Some("A Study"));
    assert_eq!(suggestions[0].source, root.join("paper.bib"));

    let none = engine.complete(&config, &[], "xyz", &mut diagnostics);
    assert!(none.is_empty());
    assert!(diagnostics.is_empty());

    // Both requests were served by one cache entry.
    assert_eq!(engine.loader().cached(), 1);
}

#[test]
fn edited_bibliography_is_reloaded() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::write(root.join("paper.md"), "").unwrap();
    let bib = root.join("paper.bib");
    write_json(&bib, json!([{"id": "old2019", "title": "Before"}]));
    let file = std::fs::File::options().write(true).open(&bib).unwrap();
    file.set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_000))
        .unwrap();

    let engine = engine();
    let config = paper_config(&root);
    let mut diagnostics = Diagnostics::new();

    let before = engine.complete(&config, &[], "", &mut diagnostics);
    assert_eq!(before[0].label, "old2019");

    write_json(
        &bib,
        json!([{"id": "old2019"}, {"id": "new2021", "title": "After"}]),
    );
    let file = std::fs::File::options().write(true).open(&bib).unwrap();
    file.set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(2_000))
        .unwrap();

    let after = engine.complete(&config, &[], "", &mut diagnostics);
    let keys: Vec<_> = after.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(keys, ["new2021", "old2019"]);
}

#[test]
fn failing_sources_are_reported_not_raised() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::write(root.join("broken.bib"), "@article{").unwrap();
    write_json(&root.join("good.json"), json!([{"id": "good"}]));

    let config = ResolverConfig {
        sources: vec![
            SearchSource::SameName,
            SearchSource::CurrentDir,
            SearchSource::PandocHome,
        ],
        bib_extensions: vec!["bib".into(), "json".into()],
        working_dir: root.clone(),
        ..ResolverConfig::default()
    };
    let mut diagnostics = Diagnostics::new();

    let suggestions = engine().complete(&config, &[], "", &mut diagnostics);
    let keys: Vec<_> = suggestions.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(keys, ["good"]);

    // No active document, no pandoc home, and one unparseable file.
    assert_eq!(diagnostics.len(), 3);
    assert!(matches!(
        diagnostics.entries()[0].error,
        Error::NoActiveDocument
    ));
    assert!(matches!(
        diagnostics.entries()[1].error,
        Error::UnresolvedHome
    ));
    assert!(matches!(
        diagnostics.entries()[2].origin,
        Origin::Load(ref path) if path.ends_with("broken.bib")
    ));
}

#[test]
fn missing_converter_yields_no_suggestions() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::write(root.join("paper.md"), "").unwrap();
    std::fs::write(root.join("paper.bib"), "").unwrap();

    let engine = CompletionEngine::new(
        SourceResolver::new(NoTexmf),
        BibliographyLoader::new(CiteprocConverter::new(ToolCommand::new(
            root.join("no-such-citeproc"),
        ))),
        QueryMatcher::default(),
    );
    let mut diagnostics = Diagnostics::new();

    let suggestions =
        engine.complete(&paper_config(&root), &[], "", &mut diagnostics);
    assert!(suggestions.is_empty());
    assert!(matches!(
        diagnostics.entries()[0].error,
        Error::ToolUnavailable { .. }
    ));
}
