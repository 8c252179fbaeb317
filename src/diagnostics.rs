//! Collection of failures that were suppressed instead of propagated.
//!
//! Resolution and loading degrade to "contributes nothing" on error. The
//! error is still recorded here so callers and tests can see why a source
//! or bibliography came back empty.

use std::{fmt, path::PathBuf};

use crate::{error::Error, resolver::SearchSource};

/// Where a suppressed failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A discovery strategy in the source resolver.
    Resolve(SearchSource),
    /// Loading the bibliography at this path.
    Load(PathBuf),
    /// One record of a bibliography was skipped.
    Record { path: PathBuf, index: usize },
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve(source) => write!(f, "source {source}"),
            Self::Load(path) => write!(f, "bibliography {}", path.display()),
            Self::Record { path, index } => {
                write!(f, "record #{index} of {}", path.display())
            }
        }
    }
}

#[derive(Debug)]
pub struct Diagnostic {
    pub origin: Origin,
    pub error: Error,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.error)
    }
}

type Hook = Box<dyn FnMut(&Diagnostic) + Send>;

/// Collects suppressed failures, optionally forwarding each to a hook.
#[derive(Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    hook: Option<Hook>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `hook` for every diagnostic as it is reported.
    pub fn with_hook(
        hook: impl FnMut(&Diagnostic) + Send + 'static,
    ) -> Self {
        Self {
            entries: Vec::new(),
            hook: Some(Box::new(hook)),
        }
    }

    pub fn report(&mut self, origin: Origin, error: Error) {
        let diagnostic = Diagnostic { origin, error };
        tracing::debug!("suppressed: {diagnostic}");
        if let Some(hook) = self.hook.as_mut() {
            hook(&diagnostic);
        }
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Take all collected diagnostics, leaving the collector empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn collects_and_forwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut diagnostics = Diagnostics::with_hook(move |d| {
            sink.lock().unwrap().push(d.to_string());
        });

        diagnostics.report(
            Origin::Resolve(SearchSource::SameName),
            Error::NoActiveDocument,
        );

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["source same-name: no active document"]
        );
    }

    #[test]
    fn drain_empties_collector() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(
            Origin::Load(PathBuf::from("/refs.bib")),
            Error::UnresolvedHome,
        );
        let drained = diagnostics.drain();
        assert_eq!(drained.len(), 1);
        assert!(diagnostics.is_empty());
    }
}
