//! bibcomplete - bibliography discovery and citation-key completion.
//!
//! bibcomplete finds the bibliography files relevant to a document being
//! edited, converts them to CSL JSON through
//! [pandoc-citeproc](https://github.com/jgm/pandoc-citeproc), caches the
//! parsed records per file, and filters them against the text typed after a
//! citation marker.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use bibcomplete::{CompletionEngine, Diagnostics, ResolverConfig, SearchSource};
//!
//! let engine = CompletionEngine::default();
//! let config = ResolverConfig {
//!     sources: vec![SearchSource::SameName, SearchSource::CurrentDir],
//!     current_document: Some(PathBuf::from("paper.md")),
//!     ..ResolverConfig::default()
//! };
//!
//! let mut diagnostics = Diagnostics::new();
//! for s in engine.complete(&config, &[], "doe 2020", &mut diagnostics) {
//!     println!("{}\t{}", s.label, s.detail().unwrap_or_default());
//! }
//! for d in diagnostics.entries() {
//!     eprintln!("skipped: {d}");
//! }
//! ```

pub mod cli;
pub mod config_db;
pub mod converter;
pub mod data_dir;
pub mod diagnostics;
pub mod error;
pub mod fields;
pub mod loader;
pub mod matcher;
pub mod record;
pub mod resolver;
pub mod settings;
pub mod suggest;
pub mod tool;

pub use config_db::ConfigDb;
pub use converter::{CiteprocConverter, Converter};
pub use data_dir::DataDir;
pub use diagnostics::{Diagnostic, Diagnostics, Origin};
pub use error::{Error, Result};
pub use fields::{SearchableText, extract};
pub use loader::BibliographyLoader;
pub use matcher::QueryMatcher;
pub use record::{Bibliography, BibliographyRecord, FieldKind, FieldValue};
pub use resolver::{ResolverConfig, SearchSource, SourceResolver, TexmfLocator};
pub use settings::Settings;
pub use suggest::{CompletionEngine, Suggestion, suggest};
