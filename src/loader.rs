use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

use crate::{
    converter::{CiteprocConverter, Converter},
    diagnostics::{Diagnostics, Origin},
    error::Result,
    record::{Bibliography, BibliographyRecord},
};

struct CacheEntry {
    modified: SystemTime,
    bibliography: Arc<Bibliography>,
}

/// Loads bibliographies through a [`Converter`] and caches them per file.
///
/// A cached bibliography is reused until the file's modification time
/// changes. Failed loads are never cached.
pub struct BibliographyLoader<C = CiteprocConverter> {
    converter: C,
    cache: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl Default for BibliographyLoader {
    fn default() -> Self {
        Self::new(CiteprocConverter::default())
    }
}

impl<C: Converter> BibliographyLoader<C> {
    pub fn new(converter: C) -> Self {
        Self {
            converter,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Load `path`, degrading any failure to an empty bibliography.
    ///
    /// The failure is reported to `diagnostics`.
    pub fn load(
        &self,
        path: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Arc<Bibliography> {
        match self.try_load(path, diagnostics) {
            Ok(bibliography) => bibliography,
            Err(error) => {
                diagnostics.report(Origin::Load(path.to_path_buf()), error);
                Arc::new(Bibliography::empty(path.to_path_buf()))
            }
        }
    }

    /// Load `path`, returning the error instead of an empty bibliography.
    ///
    /// Records without a citation key are skipped and reported to
    /// `diagnostics`; the rest of the file still loads.
    pub fn try_load(
        &self,
        path: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Result<Arc<Bibliography>> {
        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(error) => {
                self.evict(path);
                return Err(error.into());
            }
        };
        let modified = match std::fs::metadata(&canonical)
            .and_then(|metadata| metadata.modified())
        {
            Ok(modified) => modified,
            Err(error) => {
                self.lock().remove(&canonical);
                return Err(error.into());
            }
        };

        if let Some(entry) = self.lock().get(&canonical)
            && entry.modified == modified
        {
            tracing::trace!(path = %canonical.display(), "bibliography cache hit");
            return Ok(Arc::clone(&entry.bibliography));
        }

        tracing::debug!(path = %canonical.display(), "loading bibliography");
        let entries = self.converter.convert(&canonical)?;

        let mut records = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match BibliographyRecord::from_value(entry) {
                Ok(record) => records.push(record),
                Err(error) => diagnostics.report(
                    Origin::Record {
                        path: canonical.clone(),
                        index,
                    },
                    error,
                ),
            }
        }

        let bibliography = Arc::new(Bibliography::new(
            canonical.clone(),
            Some(modified),
            records,
        ));
        self.lock().insert(
            canonical,
            CacheEntry {
                modified,
                bibliography: Arc::clone(&bibliography),
            },
        );
        Ok(bibliography)
    }

    /// Drop the cached bibliography for `path`, if any.
    pub fn invalidate(&self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.lock().remove(&key).is_some()
    }

    /// Drop the entry of a file that can no longer be canonicalized. The
    /// cache key was its absolute path while it existed.
    fn evict(&self, path: &Path) {
        if let Ok(absolute) = std::path::absolute(path) {
            self.lock().remove(&absolute);
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cached bibliographies.
    pub fn cached(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, CacheEntry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> std::fmt::Debug for BibliographyLoader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BibliographyLoader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        time::{Duration, UNIX_EPOCH},
    };

    use serde_json::{Value, json};

    use super::*;
    use crate::error::Error;

    /// Converter that parses the file as JSON and counts invocations.
    #[derive(Default)]
    struct JsonFile {
        calls: Cell<usize>,
    }

    impl Converter for JsonFile {
        fn convert(&self, path: &Path) -> Result<Vec<Value>> {
            self.calls.set(self.calls.get() + 1);
            let bytes = std::fs::read(path)?;
            serde_json::from_slice(&bytes).map_err(|source| {
                Error::MalformedOutput {
                    path: path.to_path_buf(),
                    source,
                }
            })
        }
    }

    fn write_bib(dir: &Path, name: &str, value: Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn loads_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_bib(
            tmp.path(),
            "refs.json",
            json!([{"id": "doe2020", "title": "A Study"}]),
        );
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        let bib = loader.load(&path, &mut diagnostics);
        assert_eq!(bib.len(), 1);
        assert_eq!(bib.records()[0].id(), "doe2020");
        assert_eq!(bib.path(), path.canonicalize().unwrap());
        assert!(bib.modified().is_some());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unchanged_file_hits_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_bib(tmp.path(), "refs.json", json!([{"id": "a"}]));
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        let first = loader.load(&path, &mut diagnostics);
        let second = loader.load(&path, &mut diagnostics);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.converter().calls.get(), 1);
        assert_eq!(loader.cached(), 1);
    }

    #[test]
    fn changed_mtime_forces_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_bib(tmp.path(), "refs.json", json!([{"id": "a"}]));
        set_mtime(&path, 1_000_000);
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        let first = loader.load(&path, &mut diagnostics);
        std::fs::write(&path, json!([{"id": "a"}, {"id": "b"}]).to_string())
            .unwrap();
        set_mtime(&path, 2_000_000);
        let second = loader.load(&path, &mut diagnostics);

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);
        assert_eq!(loader.converter().calls.get(), 2);
    }

    #[test]
    fn equivalent_paths_share_one_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let path = write_bib(tmp.path(), "refs.json", json!([{"id": "a"}]));
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        loader.load(&path, &mut diagnostics);
        loader.load(&sub.join("..").join("refs.json"), &mut diagnostics);

        assert_eq!(loader.converter().calls.get(), 1);
    }

    #[test]
    fn failures_degrade_to_empty_and_are_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("refs.json");
        std::fs::write(&path, "not json").unwrap();
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        let bib = loader.load(&path, &mut diagnostics);
        assert!(bib.is_empty());
        assert_eq!(loader.cached(), 0);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics.entries()[0].error,
            Error::MalformedOutput { .. }
        ));

        let err = loader.try_load(&path, &mut diagnostics).unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }));
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        let bib = loader.load(&tmp.path().join("ghost.bib"), &mut diagnostics);
        assert!(bib.is_empty());
        assert_eq!(loader.converter().calls.get(), 0);
        assert!(matches!(diagnostics.entries()[0].error, Error::Io(_)));
    }

    #[test]
    fn deleted_file_is_evicted() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let path = write_bib(&root, "refs.json", json!([{"id": "a"}]));
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        loader.load(&path, &mut diagnostics);
        assert_eq!(loader.cached(), 1);

        std::fs::remove_file(&path).unwrap();
        let bib = loader.load(&path, &mut diagnostics);
        assert!(bib.is_empty());
        assert_eq!(loader.cached(), 0);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn records_without_id_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_bib(
            tmp.path(),
            "refs.json",
            json!([{"title": "Orphan"}, {"id": "kept"}]),
        );
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        let bib = loader.load(&path, &mut diagnostics);
        assert_eq!(bib.len(), 1);
        assert_eq!(bib.records()[0].id(), "kept");
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics.entries()[0].origin,
            Origin::Record { index: 0, .. }
        ));
    }

    #[test]
    fn invalidate_and_clear_evict() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_bib(tmp.path(), "refs.json", json!([{"id": "a"}]));
        let loader = BibliographyLoader::new(JsonFile::default());
        let mut diagnostics = Diagnostics::new();

        loader.load(&path, &mut diagnostics);
        assert!(loader.invalidate(&path));
        assert!(!loader.invalidate(&path));

        loader.load(&path, &mut diagnostics);
        assert_eq!(loader.converter().calls.get(), 2);
        loader.clear();
        assert_eq!(loader.cached(), 0);
    }
}
