use std::{
    collections::HashSet,
    ffi::{OsStr, OsString},
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use globset::{Glob, GlobMatcher};

use crate::{
    diagnostics::{Diagnostics, Origin},
    error::{Error, Result},
    tool::ToolCommand,
};

/// Every extension pandoc-citeproc understands. The pandoc-home and
/// texmf-home strategies always search the full set.
pub const BIB_EXTENSIONS: &[&str] = &[
    "bib", "bibtex", "ris", "json", "enl", "wos", "medline", "copac", "xml",
];

pub const DEFAULT_KPSEWHICH: &str = "kpsewhich";

/// A strategy for discovering bibliography files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchSource {
    /// `<document>.<ext>` next to the active document.
    SameName,
    /// `*.<ext>` in the working directory.
    CurrentDir,
    /// `default.<ext>` in the pandoc data directory.
    PandocHome,
    /// `*.<ext>` in the TeX user tree reported by kpsewhich.
    TexmfHome,
    /// Paths listed in configuration.
    Configured,
}

impl SearchSource {
    pub const ALL: [Self; 5] = [
        Self::SameName,
        Self::CurrentDir,
        Self::PandocHome,
        Self::TexmfHome,
        Self::Configured,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SameName => "same-name",
            Self::CurrentDir => "current-dir",
            Self::PandocHome => "pandoc-home",
            Self::TexmfHome => "texmf-home",
            Self::Configured => "configured",
        }
    }

    /// The single-letter tag used in editor configuration.
    pub fn letter(self) -> char {
        match self {
            Self::SameName => 'b',
            Self::CurrentDir => 'c',
            Self::PandocHome => 'l',
            Self::TexmfHome => 't',
            Self::Configured => 'g',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.letter() == letter)
    }

    /// Parse a list of sources separated by commas or whitespace.
    ///
    /// Each item is a long name, a letter, or a run of letters such as `bcg`.
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        let mut sources = Vec::new();
        for item in s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|item| !item.is_empty())
        {
            if let Ok(source) = item.parse() {
                sources.push(source);
            } else if let Some(letters) = item
                .chars()
                .map(Self::from_letter)
                .collect::<Option<Vec<_>>>()
            {
                sources.extend(letters);
            } else {
                return Err(unknown_source(item));
            }
        }
        Ok(sources)
    }
}

fn unknown_source(s: &str) -> Error {
    Error::Config(format!(
        "unknown bibliography source '{s}' (expected one of same-name, \
         current-dir, pandoc-home, texmf-home, configured)"
    ))
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        if let (Some(letter), None) = (chars.next(), chars.next())
            && let Some(source) = Self::from_letter(letter)
        {
            return Ok(source);
        }
        Self::ALL
            .into_iter()
            .find(|source| source.name() == s)
            .ok_or_else(|| unknown_source(s))
    }
}

/// Host state consulted while resolving bibliography sources.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Strategies to run, in priority order.
    pub sources: Vec<SearchSource>,
    /// Extensions accepted by the same-name and current-dir strategies.
    pub bib_extensions: Vec<String>,
    /// Explicit bibliography paths for the configured strategy.
    pub configured_paths: Vec<PathBuf>,
    /// The document being edited, if any.
    pub current_document: Option<PathBuf>,
    /// Directory searched by the current-dir strategy. Relative paths resolve
    /// against it.
    pub working_dir: PathBuf,
    pub home_dir: Option<PathBuf>,
    pub appdata_dir: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SearchSource::SameName,
                SearchSource::CurrentDir,
                SearchSource::Configured,
            ],
            bib_extensions: BIB_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            configured_paths: Vec::new(),
            current_document: None,
            working_dir: PathBuf::from("."),
            home_dir: None,
            appdata_dir: None,
        }
    }
}

/// A discovered bibliography and the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub path: PathBuf,
    pub source: SearchSource,
}

/// Locates the TeX user tree (`TEXMFHOME`).
pub trait TexmfLocator {
    /// The texmf home directory, or `None` when there is none.
    fn texmf_home(&self) -> Result<Option<PathBuf>>;
}

impl<T: TexmfLocator + ?Sized> TexmfLocator for &T {
    fn texmf_home(&self) -> Result<Option<PathBuf>> {
        (**self).texmf_home()
    }
}

/// Asks `kpsewhich -var-value TEXMFHOME`.
#[derive(Debug, Clone)]
pub struct Kpsewhich {
    command: ToolCommand,
    timeout: Duration,
}

impl Default for Kpsewhich {
    fn default() -> Self {
        Self::new(ToolCommand::new(DEFAULT_KPSEWHICH))
    }
}

impl Kpsewhich {
    pub fn new(command: ToolCommand) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl TexmfLocator for Kpsewhich {
    fn texmf_home(&self) -> Result<Option<PathBuf>> {
        let stdout = self.command.run(
            &[OsStr::new("-var-value"), OsStr::new("TEXMFHOME")],
            self.timeout,
        )?;
        let path = String::from_utf8_lossy(&stdout).trim().to_string();
        Ok((!path.is_empty()).then(|| PathBuf::from(path)))
    }
}

/// Runs the discovery strategies of a [`ResolverConfig`].
#[derive(Debug, Clone, Default)]
pub struct SourceResolver<T = Kpsewhich> {
    texmf: T,
}

impl<T: TexmfLocator> SourceResolver<T> {
    pub fn new(texmf: T) -> Self {
        Self { texmf }
    }

    /// Resolve candidate bibliography files.
    ///
    /// Strategy outputs are concatenated in `config.sources` order and
    /// deduplicated, keeping the first occurrence. A strategy that cannot run
    /// contributes nothing and reports why to `diagnostics`.
    pub fn resolve(
        &self,
        config: &ResolverConfig,
        diagnostics: &mut Diagnostics,
    ) -> Vec<ResolvedSource> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for &source in &config.sources {
            let paths = match self.run(source, config) {
                Ok(paths) => paths,
                Err(error) => {
                    diagnostics.report(Origin::Resolve(source), error);
                    continue;
                }
            };
            tracing::trace!(%source, found = paths.len(), "source resolved");

            for path in paths {
                if seen.insert(path.clone()) {
                    resolved.push(ResolvedSource { path, source });
                }
            }
        }

        resolved
    }

    /// Like [`resolve`](Self::resolve), without the strategy attribution.
    pub fn resolve_paths(
        &self,
        config: &ResolverConfig,
        diagnostics: &mut Diagnostics,
    ) -> Vec<PathBuf> {
        self.resolve(config, diagnostics)
            .into_iter()
            .map(|r| r.path)
            .collect()
    }

    fn run(
        &self,
        source: SearchSource,
        config: &ResolverConfig,
    ) -> Result<Vec<PathBuf>> {
        match source {
            SearchSource::SameName => same_name(config),
            SearchSource::CurrentDir => {
                let dir = absolutize(&config.working_dir, &config.working_dir);
                glob_extensions(&dir, config.bib_extensions.as_slice())
            }
            SearchSource::PandocHome => pandoc_home(config),
            SearchSource::TexmfHome => match self.texmf.texmf_home()? {
                Some(dir) if dir.is_dir() => {
                    glob_extensions(&absolutize(&config.working_dir, &dir), BIB_EXTENSIONS)
                }
                _ => Ok(Vec::new()),
            },
            SearchSource::Configured => Ok(configured(config)),
        }
    }
}

fn same_name(config: &ResolverConfig) -> Result<Vec<PathBuf>> {
    let document = config
        .current_document
        .as_deref()
        .filter(|doc| !doc.as_os_str().is_empty())
        .ok_or(Error::NoActiveDocument)?;
    let document = absolutize(&config.working_dir, document);

    Ok(config
        .bib_extensions
        .iter()
        .map(|ext| document.with_extension(ext))
        .filter(|candidate| candidate.exists())
        .map(|candidate| absolutize(&config.working_dir, &candidate))
        .collect())
}

fn pandoc_home(config: &ResolverConfig) -> Result<Vec<PathBuf>> {
    let root = [
        config.home_dir.as_ref().map(|home| home.join(".pandoc")),
        config.appdata_dir.as_ref().map(|appdata| appdata.join("pandoc")),
    ]
    .into_iter()
    .flatten()
    .find(|dir| dir.is_dir())
    .ok_or(Error::UnresolvedHome)?;

    Ok(BIB_EXTENSIONS
        .iter()
        .map(|ext| root.join(format!("default.{ext}")))
        .filter(|candidate| candidate.exists())
        .map(|candidate| absolutize(&config.working_dir, &candidate))
        .collect())
}

fn configured(config: &ResolverConfig) -> Vec<PathBuf> {
    config
        .configured_paths
        .iter()
        .map(|path| {
            let expanded = match (path.strip_prefix("~"), &config.home_dir) {
                (Ok(rest), Some(home)) => home.join(rest),
                _ => path.clone(),
            };
            absolutize(&config.working_dir, &expanded)
        })
        .collect()
}

/// Files in `dir` matching `*.<ext>`, grouped by extension in the given
/// order and sorted by name within each extension.
///
/// Like a shell glob, hidden files are skipped.
fn glob_extensions<S: AsRef<str>>(dir: &Path, extensions: &[S]) -> Result<Vec<PathBuf>> {
    let mut names: Vec<OsString> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name())
        .filter(|name| !name.as_encoded_bytes().starts_with(b"."))
        .collect();
    names.sort();

    let mut paths = Vec::new();
    for ext in extensions {
        let matcher = extension_matcher(ext.as_ref())?;
        paths.extend(
            names
                .iter()
                .filter(|name| matcher.is_match(Path::new(name)))
                .map(|name| dir.join(name)),
        );
    }
    Ok(paths)
}

fn extension_matcher(ext: &str) -> Result<GlobMatcher> {
    Glob::new(&format!("*.{ext}"))
        .map(|glob| glob.compile_matcher())
        .map_err(|e| {
            Error::Config(format!("invalid bibliography extension '{ext}': {e}"))
        })
}

/// Canonicalize `path` (relative to `base`), falling back to a lexically
/// absolute path when it does not exist.
fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    joined
        .canonicalize()
        .or_else(|_| std::path::absolute(&joined))
        .unwrap_or(joined)
}
