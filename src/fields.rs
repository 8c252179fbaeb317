use crate::{
    error::{Error, Result},
    record::{BibliographyRecord, FieldKind, FieldValue, Name},
};

/// The strings a field contributes to query matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchableText(Vec<String>);

impl SearchableText {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<'a> IntoIterator for &'a SearchableText {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Extract the searchable text of `field` from `record`.
///
/// Fails with [`Error::UnknownFieldKind`] when `field` is not a CSL variable.
/// A known field that is absent yields empty text.
pub fn extract(record: &BibliographyRecord, field: &str) -> Result<SearchableText> {
    let kind = FieldKind::of(field)
        .ok_or_else(|| Error::UnknownFieldKind(field.to_string()))?;
    Ok(extract_kind(record, field, kind))
}

/// Extract with an already resolved kind.
pub fn extract_kind(
    record: &BibliographyRecord,
    field: &str,
    kind: FieldKind,
) -> SearchableText {
    let value = record.get(field);
    match kind {
        FieldKind::Plain => plain(value),
        FieldKind::Number => number(value),
        FieldKind::Name => names(value),
        FieldKind::Date => date(value),
    }
}

fn plain(value: Option<&FieldValue>) -> SearchableText {
    match value {
        Some(FieldValue::Text(text)) => SearchableText(vec![text.clone()]),
        _ => SearchableText::default(),
    }
}

// Same as plain until numbers get range-aware comparison.
fn number(value: Option<&FieldValue>) -> SearchableText {
    plain(value)
}

fn names(value: Option<&FieldValue>) -> SearchableText {
    let Some(FieldValue::Names(names)) = value else {
        return SearchableText::default();
    };
    SearchableText(
        names
            .iter()
            .map(join_name)
            .filter(|joined| !joined.is_empty())
            .collect(),
    )
}

fn join_name(name: &Name) -> String {
    name.parts()
        .map(|(_, part)| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn date(_value: Option<&FieldValue>) -> SearchableText {
    SearchableText::default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> BibliographyRecord {
        BibliographyRecord::from_value(value).unwrap()
    }

    #[test]
    fn plain_field_is_single_string() {
        let r = record(json!({"id": "a", "title": "A Study of Things"}));
        let text = extract(&r, "title").unwrap();
        assert_eq!(text.into_vec(), vec!["A Study of Things"]);
    }

    #[test]
    fn number_field_matches_plain() {
        let r = record(json!({"id": "a", "issue": 7, "volume": "12a"}));
        assert_eq!(extract(&r, "issue").unwrap().into_vec(), vec!["7"]);
        assert_eq!(extract(&r, "volume").unwrap().into_vec(), vec!["12a"]);
    }

    #[test]
    fn names_join_parts_in_source_order() {
        let r = record(json!({
            "id": "a",
            "author": [
                {"family": "Doe", "given": "J"},
                {"given": "Ann", "family": "Roe", "suffix": "Jr."},
                {},
            ],
        }));
        let text = extract(&r, "author").unwrap();
        assert_eq!(text.into_vec(), vec!["Doe J", "Ann Roe Jr."]);
    }

    #[test]
    fn absent_or_empty_names_are_empty() {
        let r = record(json!({"id": "a", "editor": []}));
        assert!(extract(&r, "author").unwrap().is_empty());
        assert!(extract(&r, "editor").unwrap().is_empty());
    }

    #[test]
    fn dates_produce_nothing() {
        let r = record(json!({"id": "a", "issued": {"date-parts": [[2020]]}}));
        assert!(extract(&r, "issued").unwrap().is_empty());
        assert!(extract(&r, "accessed").unwrap().is_empty());
    }

    #[test]
    fn unknown_field_fails() {
        let r = record(json!({"id": "a", "type": "book"}));
        let err = extract(&r, "type").unwrap_err();
        assert!(matches!(err, Error::UnknownFieldKind(ref f) if f == "type"));
    }
}
