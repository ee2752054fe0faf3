use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder used when an upstream record carries no title at all.
pub const UNKNOWN_TITLE: &str = "Unknown Title";
/// Placeholder used when an upstream record carries no author line at all.
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
/// Sentinel year meaning "no date".
pub const NO_DATE: &str = "n.d.";

/// A publication as handed over by an acquisition strategy.
///
/// Every field is optional: `None` means the upstream source did not provide the field, whereas
/// `Some("")` means it did, but empty. [`Publication::normalize`] turns this into concrete values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publication {
    pub title: Option<String>,
    /// Free-text author line, comma-separated.
    pub authors: Option<String>,
    pub year: Option<String>,
    pub venue: Option<String>,
    pub snippet: Option<String>,
    pub citations: Option<u64>,
    pub link: Option<String>,
}

/// A publication with every field resolved to a concrete value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub title: String,
    pub authors: String,
    /// Either a four digit year or [`NO_DATE`].
    pub year: String,
    pub venue: String,
    pub snippet: String,
    pub citations: u64,
    pub link: String,
}

/// Raised when an upstream record field has a shape we cannot turn into text or a count.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("field `{field}` is not text (found {found})")]
    NotText { field: &'static str, found: String },
    #[error("field `{field}` is not a non-negative count (found {found})")]
    NotCount { field: &'static str, found: String },
}

impl Publication {
    pub fn normalize(&self) -> Normalized {
        let venue = self.venue.clone().unwrap_or_default();
        let year = match self.year.as_deref() {
            Some(y) => extract_year(y),
            None => extract_year(&venue),
        };
        Normalized {
            title: self
                .title
                .clone()
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            authors: self
                .authors
                .clone()
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            year,
            venue,
            snippet: self.snippet.clone().unwrap_or_default(),
            citations: self.citations.unwrap_or(0),
            link: self.link.clone().unwrap_or_default(),
        }
    }
}

/// Find the first year between 1900 and 2099 in `text`, or [`NO_DATE`] when there is none.
pub fn extract_year(text: &str) -> String {
    static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
    YEAR_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| NO_DATE.to_string())
}

/// Read an optional text field out of a loosely typed JSON object.
///
/// Missing and `null` members are absent; anything other than a string is a [`RecordError`].
pub fn json_text(
    obj: &serde_json::Value,
    field: &'static str,
) -> Result<Option<String>, RecordError> {
    match obj.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(RecordError::NotText {
            field,
            found: json_kind(other).to_string(),
        }),
    }
}

/// Read an optional non-negative count out of a loosely typed JSON value.
pub fn json_count(
    value: Option<&serde_json::Value>,
    field: &'static str,
) -> Result<Option<u64>, RecordError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| RecordError::NotCount {
            field,
            found: v.to_string(),
        }),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_year_finds_first_match() {
        assert_eq!(extract_year("J Smith - Proceedings 2019, IEEE"), "2019");
        assert_eq!(extract_year("2001 and 2010"), "2001");
        assert_eq!(extract_year("Nature, 1998 - nature.com"), "1998");
    }

    #[test]
    fn extract_year_ignores_out_of_range_and_embedded_digits() {
        assert_eq!(extract_year("Published 1850"), NO_DATE);
        assert_eq!(extract_year("vol 12019 pages"), NO_DATE);
        assert_eq!(extract_year("ISBN 20195"), NO_DATE);
        assert_eq!(extract_year(""), NO_DATE);
    }

    #[test]
    fn extract_year_returns_year_or_sentinel() {
        proptest::proptest!(|(s in "\\PC{0,64}")| {
            let y = extract_year(&s);
            if y != NO_DATE {
                proptest::prop_assert_eq!(y.len(), 4);
                proptest::prop_assert!(y.starts_with("19") || y.starts_with("20"));
                proptest::prop_assert!(s.contains(&y));
            }
        })
    }

    #[test]
    fn normalize_fills_defaults() {
        let n = Publication::default().normalize();
        assert_eq!(n.title, UNKNOWN_TITLE);
        assert_eq!(n.authors, UNKNOWN_AUTHOR);
        assert_eq!(n.year, NO_DATE);
        assert_eq!(n.venue, "");
        assert_eq!(n.snippet, "");
        assert_eq!(n.citations, 0);
        assert_eq!(n.link, "");
    }

    #[test]
    fn normalize_keeps_present_but_empty_values() {
        let p = Publication {
            title: Some(String::new()),
            authors: Some(String::new()),
            ..Default::default()
        };
        let n = p.normalize();
        assert_eq!(n.title, "");
        assert_eq!(n.authors, "");
    }

    #[test]
    fn normalize_derives_year() {
        let explicit = Publication {
            year: Some("2021".into()),
            venue: Some("Conf 1999".into()),
            ..Default::default()
        };
        assert_eq!(explicit.normalize().year, "2021");

        let from_venue = Publication {
            venue: Some("IEEE Transactions, 2015".into()),
            ..Default::default()
        };
        assert_eq!(from_venue.normalize().year, "2015");

        let sentinel = Publication {
            year: Some(NO_DATE.into()),
            venue: Some("Conf 1999".into()),
            ..Default::default()
        };
        assert_eq!(sentinel.normalize().year, NO_DATE);
    }

    #[test]
    fn json_text_distinguishes_absent_and_wrong_type() {
        let v = json!({"title": "A", "link": null, "snippet": 3});
        assert_eq!(json_text(&v, "title"), Ok(Some("A".to_string())));
        assert_eq!(json_text(&v, "link"), Ok(None));
        assert_eq!(json_text(&v, "missing"), Ok(None));
        assert!(matches!(
            json_text(&v, "snippet"),
            Err(RecordError::NotText { field: "snippet", .. })
        ));
    }

    #[test]
    fn json_count_rejects_negative() {
        assert_eq!(json_count(Some(&json!(5)), "total"), Ok(Some(5)));
        assert_eq!(json_count(None, "total"), Ok(None));
        assert!(json_count(Some(&json!(-1)), "total").is_err());
        assert!(json_count(Some(&json!("5")), "total").is_err());
    }
}
