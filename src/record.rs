use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Name of the field holding the citation key.
pub const ID_FIELD: &str = "id";

/// How a CSL variable is shaped and searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Free text, e.g. `title` or `publisher`.
    Plain,
    /// Numeric or numeric-like text, e.g. `volume` or `issue`.
    Number,
    /// A list of structured person names.
    Name,
    /// A structured date or date range.
    Date,
}

impl FieldKind {
    /// Look up the kind of a CSL variable. Returns `None` for names outside
    /// the schema.
    pub fn of(field: &str) -> Option<Self> {
        let kind = match field {
            "abstract"
            | "annote"
            | "archive"
            | "archive_location"
            | "archive-place"
            | "authority"
            | "call-number"
            | "citation-label"
            | "citation-number"
            | "collection-title"
            | "container-title"
            | "container-title-short"
            | "dimensions"
            | "DOI"
            | "doi"
            | "event"
            | "event-place"
            | "first-reference-note-number"
            | "genre"
            | "ISBN"
            | "isbn"
            | "ISSN"
            | "issn"
            | "jurisdiction"
            | "keyword"
            | "locator"
            | "medium"
            | "note"
            | "original-publisher"
            | "original-publisher-place"
            | "original-title"
            | "page"
            | "page-first"
            | "PMCID"
            | "pmcid"
            | "PMID"
            | "pmid"
            | "publisher"
            | "publisher-place"
            | "references"
            | "reviewed-title"
            | "scale"
            | "section"
            | "source"
            | "status"
            | "title"
            | "title-short"
            | "URL"
            | "url"
            | "version"
            | "year-suffix" => Self::Plain,

            "chapter-number"
            | "collection-number"
            | "edition"
            | "issue"
            | "number"
            | "number-of-pages"
            | "number-of-volumes"
            | "volume" => Self::Number,

            "accessed" | "container" | "event-date" | "issued"
            | "original-date" | "submitted" => Self::Date,

            "author"
            | "collection-editor"
            | "composer"
            | "container-author"
            | "director"
            | "editor"
            | "editorial-director"
            | "illustrator"
            | "interviewer"
            | "original-author"
            | "recipient"
            | "reviewed-author"
            | "translator" => Self::Name,

            _ => return None,
        };
        Some(kind)
    }
}

/// One person in a name variable.
///
/// Parts keep the order in which the converter emitted them, so a name
/// written as `{"family": "Doe", "given": "J"}` reads back as `Doe J`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Name {
    parts: Vec<(String, String)>,
}

impl Name {
    pub fn new<K, V>(parts: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            parts: parts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// All `(part, value)` pairs in source order.
    pub fn parts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn part(&self, key: &str) -> Option<&str> {
        self.parts()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    pub fn family(&self) -> Option<&str> {
        self.part("family")
    }

    pub fn given(&self) -> Option<&str> {
        self.part("given")
    }

    pub fn suffix(&self) -> Option<&str> {
        self.part("suffix")
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self {
                parts: map
                    .iter()
                    .filter_map(|(k, v)| match v {
                        Value::String(s) if !s.is_empty() => {
                            Some((k.clone(), s.clone()))
                        }
                        _ => None,
                    })
                    .collect(),
            }),
            Value::String(s) if !s.is_empty() => {
                Some(Self::new([("literal", s.as_str())]))
            }
            _ => None,
        }
    }
}

/// A single point in a CSL date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParts {
    pub year: i32,
    pub month: Option<u8>,
    pub day: Option<u8>,
}

/// A CSL date: one set of date parts, or two for a range.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateValue {
    pub parts: Vec<DateParts>,
    pub literal: Option<String>,
    pub raw: Option<String>,
    pub season: Option<String>,
    pub circa: bool,
}

impl DateValue {
    /// Year of the first date point, if any.
    pub fn year(&self) -> Option<i32> {
        self.parts.first().map(|p| p.year)
    }

    pub fn is_range(&self) -> bool {
        self.parts.len() > 1
    }
}

#[derive(Deserialize)]
struct RawDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<DatePart>>,
    #[serde(default)]
    literal: Option<String>,
    #[serde(default)]
    raw: Option<String>,
    #[serde(default)]
    season: Option<Value>,
    #[serde(default)]
    circa: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatePart {
    Int(i64),
    Text(String),
}

impl DatePart {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl DateParts {
    fn from_raw(raw: &[DatePart]) -> Option<Self> {
        let mut values = raw.iter().map(DatePart::as_i64);
        let year = i32::try_from(values.next()??).ok()?;
        let month = values
            .next()
            .flatten()
            .and_then(|m| u8::try_from(m).ok())
            .filter(|m| (1..=12).contains(m));
        let day = values
            .next()
            .flatten()
            .and_then(|d| u8::try_from(d).ok())
            .filter(|d| (1..=31).contains(d));
        Some(Self { year, month, day })
    }
}

impl DateValue {
    fn from_value(value: Value) -> Option<Self> {
        let raw: RawDate = serde_json::from_value(value).ok()?;
        Some(Self {
            parts: raw
                .date_parts
                .iter()
                .filter_map(|p| DateParts::from_raw(p))
                .collect(),
            literal: raw.literal,
            raw: raw.raw,
            season: raw.season.and_then(|s| scalar_text(&s)),
            circa: raw.circa.is_some_and(|c| match c {
                Value::Bool(b) => b,
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                _ => true,
            }),
        })
    }
}

/// A field value after normalization by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain and number variables.
    Text(String),
    /// Name variables.
    Names(Vec<Name>),
    /// Date variables.
    Date(DateValue),
    /// Fields outside the schema, or schema fields whose shape did not fit
    /// their kind.
    Raw(Value),
}

impl FieldValue {
    fn normalize(kind: Option<FieldKind>, value: Value) -> Self {
        match kind {
            Some(FieldKind::Plain | FieldKind::Number) => {
                match scalar_text(&value) {
                    Some(text) => Self::Text(text),
                    None => Self::Raw(value),
                }
            }
            Some(FieldKind::Name) => match &value {
                Value::Array(items) => {
                    Self::Names(items.iter().filter_map(Name::from_value).collect())
                }
                _ => Self::Raw(value),
            },
            Some(FieldKind::Date) => {
                if value.is_object() {
                    match DateValue::from_value(value.clone()) {
                        Some(date) => Self::Date(date),
                        None => Self::Raw(value),
                    }
                } else {
                    Self::Raw(value)
                }
            }
            None => Self::Raw(value),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A single bibliography entry, keyed by its citation key.
#[derive(Debug, Clone, PartialEq)]
pub struct BibliographyRecord {
    id: String,
    fields: BTreeMap<String, FieldValue>,
}

impl BibliographyRecord {
    /// Build a record from one element of the converter's JSON array.
    ///
    /// Fails with [`Error::MissingId`] when the object has no usable `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::InvalidRecord);
        };

        let mut id = None;
        let mut fields = BTreeMap::new();
        for (name, value) in map {
            if name == ID_FIELD {
                id = scalar_text(&value).filter(|s| !s.trim().is_empty());
                continue;
            }
            let normalized = FieldValue::normalize(FieldKind::of(&name), value);
            fields.insert(name, normalized);
        }

        Ok(Self {
            id: id.ok_or(Error::MissingId)?,
            fields,
        })
    }

    /// The citation key.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// The text of a plain or number field.
    pub fn text(&self, field: &str) -> Option<&str> {
        match self.fields.get(field)? {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.text("title")
    }

    /// The names of a name field; empty when absent.
    pub fn names(&self, field: &str) -> &[Name] {
        match self.fields.get(field) {
            Some(FieldValue::Names(names)) => names,
            _ => &[],
        }
    }

    pub fn date(&self, field: &str) -> Option<&DateValue> {
        match self.fields.get(field)? {
            FieldValue::Date(date) => Some(date),
            _ => None,
        }
    }

    /// Field names present on the record, excluding `id`.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl TryFrom<Value> for BibliographyRecord {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

/// The records loaded from one bibliography file.
#[derive(Debug, Clone)]
pub struct Bibliography {
    path: PathBuf,
    modified: Option<SystemTime>,
    records: Vec<Arc<BibliographyRecord>>,
}

impl Bibliography {
    pub fn new(
        path: PathBuf,
        modified: Option<SystemTime>,
        records: Vec<BibliographyRecord>,
    ) -> Self {
        Self {
            path,
            modified,
            records: records.into_iter().map(Arc::new).collect(),
        }
    }

    /// An empty bibliography standing in for a source that failed to load.
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            modified: None,
            records: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the file when it was loaded.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn records(&self) -> &[Arc<BibliographyRecord>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
