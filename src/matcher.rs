use crate::{
    error::{Error, Result},
    fields::extract_kind,
    record::{BibliographyRecord, FieldKind},
};

/// Fields searched when no match fields are configured.
///
/// The citation key (`id`) is searched in addition to these unless key
/// matching is switched off with [`QueryMatcher::with_key_matching`].
pub const DEFAULT_MATCH_FIELDS: &[&str] = &["title", "author"];

/// A whitespace-tokenized, lowercased query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    tokens: Vec<String>,
}

impl Query {
    pub fn parse(query: &str) -> Self {
        Self {
            tokens: query.split_whitespace().map(str::to_lowercase).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Conjunctive, order-independent substring matching over selected fields.
///
/// A record matches when every query token is a case-insensitive substring
/// of some string extracted from the match fields. By default the match
/// fields are `title` and `author`, and the citation key is searched too.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    fields: Vec<(String, FieldKind)>,
    match_key: bool,
}

impl Default for QueryMatcher {
    fn default() -> Self {
        Self {
            fields: DEFAULT_MATCH_FIELDS
                .iter()
                .filter_map(|f| Some((f.to_string(), FieldKind::of(f)?)))
                .collect(),
            match_key: true,
        }
    }
}

impl QueryMatcher {
    /// Match against `fields`, failing with [`Error::UnknownFieldKind`] for a
    /// field outside the schema.
    pub fn new<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = fields
            .into_iter()
            .map(|field| {
                let field = field.as_ref();
                FieldKind::of(field)
                    .map(|kind| (field.to_string(), kind))
                    .ok_or_else(|| Error::UnknownFieldKind(field.to_string()))
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            fields,
            match_key: true,
        })
    }

    /// Whether the citation key itself is searched.
    pub fn with_key_matching(mut self, enabled: bool) -> Self {
        self.match_key = enabled;
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn matches(&self, record: &BibliographyRecord, query: &str) -> bool {
        self.matches_query(record, &Query::parse(query))
    }

    pub fn matches_query(&self, record: &BibliographyRecord, query: &Query) -> bool {
        if query.is_empty() {
            return true;
        }

        let haystack = self.haystack(record);
        query
            .tokens()
            .iter()
            .all(|token| haystack.iter().any(|text| text.contains(token.as_str())))
    }

    fn haystack(&self, record: &BibliographyRecord) -> Vec<String> {
        let mut haystack: Vec<String> = self
            .fields
            .iter()
            .flat_map(|(name, kind)| extract_kind(record, name, *kind).into_vec())
            .map(|text| text.to_lowercase())
            .collect();
        if self.match_key {
            haystack.push(record.id().to_lowercase());
        }
        haystack
    }
}
