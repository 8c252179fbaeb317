use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;

use crate::{
    converter::{CiteprocConverter, Converter},
    diagnostics::Diagnostics,
    error::Result,
    loader::BibliographyLoader,
    matcher::{Query, QueryMatcher},
    record::BibliographyRecord,
    resolver::{Kpsewhich, ResolverConfig, SourceResolver, TexmfLocator},
};

/// A completion candidate for one record.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub record: Arc<BibliographyRecord>,
    /// Bibliography file the record came from.
    pub source: PathBuf,
    pub label: String,
    pub insertion: String,
    pub sort_key: String,
}

impl Suggestion {
    fn new(record: Arc<BibliographyRecord>, source: &Path) -> Self {
        let key = record.id().to_string();
        Self {
            record,
            source: source.to_path_buf(),
            label: key.clone(),
            insertion: key.clone(),
            sort_key: key,
        }
    }

    /// Title of the record, shown next to the key in completion menus.
    pub fn detail(&self) -> Option<&str> {
        self.record.title()
    }
}

/// Collect suggestions for `query` from every bibliography in `paths`.
///
/// Bibliographies are visited in order and their matches concatenated, then
/// stably sorted by citation key. Keys that appear in several bibliographies
/// are kept once per bibliography.
pub fn suggest<C: Converter>(
    loader: &BibliographyLoader<C>,
    matcher: &QueryMatcher,
    paths: &[PathBuf],
    query: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<Suggestion> {
    let query = Query::parse(query);
    let mut suggestions = Vec::new();

    for path in paths {
        let bibliography = loader.load(path, diagnostics);
        suggestions.extend(
            bibliography
                .records()
                .iter()
                .filter(|record| matcher.matches_query(record, &query))
                .map(|record| Suggestion::new(Arc::clone(record), bibliography.path())),
        );
    }

    suggestions.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
    suggestions
}

/// Resolver, loader and matcher wired together for completion requests.
///
/// The loader's cache lives as long as the engine.
#[derive(Debug)]
pub struct CompletionEngine<C = CiteprocConverter, T = Kpsewhich> {
    resolver: SourceResolver<T>,
    loader: BibliographyLoader<C>,
    matcher: QueryMatcher,
}

impl Default for CompletionEngine {
    fn default() -> Self {
        Self::new(
            SourceResolver::default(),
            BibliographyLoader::default(),
            QueryMatcher::default(),
        )
    }
}

impl<C: Converter, T: TexmfLocator> CompletionEngine<C, T> {
    pub fn new(
        resolver: SourceResolver<T>,
        loader: BibliographyLoader<C>,
        matcher: QueryMatcher,
    ) -> Self {
        Self {
            resolver,
            loader,
            matcher,
        }
    }

    pub fn loader(&self) -> &BibliographyLoader<C> {
        &self.loader
    }

    pub fn resolver(&self) -> &SourceResolver<T> {
        &self.resolver
    }

    /// Suggest citation keys for `query`.
    ///
    /// A non-empty `explicit` list is used as-is; otherwise bibliographies
    /// are resolved from `config`.
    pub fn complete(
        &self,
        config: &ResolverConfig,
        explicit: &[PathBuf],
        query: &str,
        diagnostics: &mut Diagnostics,
    ) -> Vec<Suggestion> {
        let resolved;
        let paths = if explicit.is_empty() {
            resolved = self.resolver.resolve_paths(config, diagnostics);
            resolved.as_slice()
        } else {
            explicit
        };

        tracing::debug!(bibliographies = paths.len(), query, "completing");
        suggest(&self.loader, &self.matcher, paths, query, diagnostics)
    }
}

/// Serialized form of a suggestion handed to the host.
#[derive(Debug, Serialize)]
pub struct SuggestionItem<'a> {
    pub label: &'a str,
    pub insertion: &'a str,
    pub sort_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<&'a str>,
    pub source: &'a Path,
}

impl<'a> From<&'a Suggestion> for SuggestionItem<'a> {
    fn from(s: &'a Suggestion) -> Self {
        Self {
            label: &s.label,
            insertion: &s.insertion,
            sort_key: &s.sort_key,
            detail: s.detail(),
            source: &s.source,
        }
    }
}

/// Render suggestions as a JSON array.
pub fn to_json(suggestions: &[Suggestion]) -> Result<String> {
    let items: Vec<SuggestionItem<'_>> = suggestions.iter().map(Into::into).collect();
    Ok(serde_json::to_string(&items)?)
}

/// Print suggestions as `key<TAB>title` lines.
pub fn format_human(suggestions: &[Suggestion]) {
    for s in suggestions {
        match s.detail() {
            Some(detail) => println!("{}\t{detail}", s.label),
            None => println!("{}", s.label),
        }
    }
}
