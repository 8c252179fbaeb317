use std::{path::PathBuf, time::Duration};

use crate::{
    config_db::ConfigDb,
    converter::{CiteprocConverter, DEFAULT_CONVERTER, DEFAULT_TIMEOUT},
    error::{Error, Result},
    loader::BibliographyLoader,
    matcher::{DEFAULT_MATCH_FIELDS, QueryMatcher},
    record::FieldKind,
    resolver::{
        BIB_EXTENSIONS, DEFAULT_KPSEWHICH, Kpsewhich, ResolverConfig,
        SearchSource, SourceResolver,
    },
    suggest::CompletionEngine,
    tool::ToolCommand,
};

pub const SOURCES: &str = "sources";
pub const BIB_EXTENSIONS_KEY: &str = "bib-extensions";
pub const CONVERTER: &str = "converter";
pub const KPSEWHICH: &str = "kpsewhich";
pub const MATCH_FIELDS: &str = "match-fields";
pub const TIMEOUT: &str = "timeout";

/// Every recognised setting key, in display order.
pub const KEYS: &[&str] = &[
    SOURCES,
    BIB_EXTENSIONS_KEY,
    CONVERTER,
    KPSEWHICH,
    MATCH_FIELDS,
    TIMEOUT,
];

/// Typed view over the `settings` table, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub sources: Vec<SearchSource>,
    pub bib_extensions: Vec<String>,
    pub converter: String,
    pub kpsewhich: String,
    pub match_fields: Vec<String>,
    /// Limit for each external tool invocation.
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: ResolverConfig::default().sources,
            bib_extensions: BIB_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            converter: DEFAULT_CONVERTER.to_string(),
            kpsewhich: DEFAULT_KPSEWHICH.to_string(),
            match_fields: DEFAULT_MATCH_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Settings {
    pub fn load(config_db: &ConfigDb) -> Result<Self> {
        let mut settings = Self::default();
        for key in KEYS {
            if let Some(value) = config_db.get_setting(key)? {
                settings.apply(key, &value)?;
            }
        }
        Ok(settings)
    }

    /// Parse `value` for `key` and store it.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            SOURCES => self.sources = SearchSource::parse_list(value)?,
            BIB_EXTENSIONS_KEY => self.bib_extensions = parse_extensions(value),
            CONVERTER => self.converter = parse_program(key, value)?,
            KPSEWHICH => self.kpsewhich = parse_program(key, value)?,
            MATCH_FIELDS => self.match_fields = parse_fields(value)?,
            TIMEOUT => self.timeout = parse_timeout(value)?,
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    /// Current value of `key`, rendered the way it would be stored.
    pub fn get(&self, key: &str) -> Result<String> {
        Ok(match key {
            SOURCES => self
                .sources
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(","),
            BIB_EXTENSIONS_KEY => self.bib_extensions.join(","),
            CONVERTER => self.converter.clone(),
            KPSEWHICH => self.kpsewhich.clone(),
            MATCH_FIELDS => self.match_fields.join(","),
            TIMEOUT => self.timeout.as_secs().to_string(),
            _ => return Err(unknown_key(key)),
        })
    }

    /// Check that `value` is acceptable for `key` without storing it.
    pub fn validate(key: &str, value: &str) -> Result<()> {
        Self::default().apply(key, value)
    }

    pub fn converter(&self) -> CiteprocConverter {
        CiteprocConverter::new(ToolCommand::new(&self.converter))
            .with_timeout(self.timeout)
    }

    pub fn kpsewhich(&self) -> Kpsewhich {
        Kpsewhich::new(ToolCommand::new(&self.kpsewhich)).with_timeout(self.timeout)
    }

    pub fn matcher(&self) -> Result<QueryMatcher> {
        QueryMatcher::new(&self.match_fields)
    }

    pub fn engine(&self) -> Result<CompletionEngine> {
        Ok(CompletionEngine::new(
            SourceResolver::new(self.kpsewhich()),
            BibliographyLoader::new(self.converter()),
            self.matcher()?,
        ))
    }

    /// Resolver configuration carrying these settings. Host state such as the
    /// active document and working directory is left at its defaults.
    pub fn resolver_config(&self, configured_paths: Vec<PathBuf>) -> ResolverConfig {
        ResolverConfig {
            sources: self.sources.clone(),
            bib_extensions: self.bib_extensions.clone(),
            configured_paths,
            ..ResolverConfig::default()
        }
    }
}

fn unknown_key(key: &str) -> Error {
    Error::NotFound {
        kind: "setting",
        name: key.to_string(),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
}

fn parse_extensions(value: &str) -> Vec<String> {
    split_list(value)
        .map(|ext| ext.trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_fields(value: &str) -> Result<Vec<String>> {
    split_list(value)
        .map(|field| {
            FieldKind::of(field)
                .map(|_| field.to_string())
                .ok_or_else(|| Error::UnknownFieldKind(field.to_string()))
        })
        .collect()
}

fn parse_program(key: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Config(format!("{key} must not be empty")));
    }
    Ok(value.to_string())
}

/// Upper bound for the `timeout` setting, one day.
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

fn parse_timeout(value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if (1..=MAX_TIMEOUT_SECS).contains(&secs) => {
            Ok(Duration::from_secs(secs))
        }
        _ => Err(Error::Config(format!(
            "timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got '{value}'"
        ))),
    }
}
