use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::record::Normalized;

/// Venue substrings that mark a conference-style container. Checked before anything else.
const CONFERENCE_MARKERS: &[&str] = &["conference", "proceedings", "symposium", "workshop"];

/// BibTeX entry type of a rendered publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    InProceedings,
    Article,
    Misc,
}

impl EntryKind {
    /// Guess the entry type from the venue line.
    ///
    /// Conference markers win over everything else, so "Workshop on X, Journal of Y" is still
    /// `@inproceedings`. Any other non-empty venue (journals, transactions, letters, unknown
    /// publishers) becomes `@article`.
    pub fn classify(venue: &str) -> Self {
        if venue.is_empty() {
            return EntryKind::Misc;
        }
        let venue = venue.to_lowercase();
        if CONFERENCE_MARKERS.iter().any(|m| venue.contains(m)) {
            EntryKind::InProceedings
        } else {
            EntryKind::Article
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            EntryKind::InProceedings => "inproceedings",
            EntryKind::Article => "article",
            EntryKind::Misc => "misc",
        }
    }

    /// Field name under which the venue is recorded.
    fn container_field(self) -> &'static str {
        match self {
            EntryKind::InProceedings => "booktitle",
            EntryKind::Article | EntryKind::Misc => "journal",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Surname of the first listed author: the last word before the first comma.
pub fn primary_surname(authors: &str) -> &str {
    authors
        .split(',')
        .next()
        .and_then(|first| first.split_whitespace().last())
        .unwrap_or("unknown")
}

/// Build the citation key `<surname><year><first title word>_<index>`.
///
/// The index suffix keeps keys unique within one run even when two records agree on the first
/// three components.
pub fn citation_key(title: &str, year: &str, surname: &str, index: usize) -> String {
    static PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
    static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W").unwrap());

    let title = PUNCT_RE.replace_all(title, "");
    let first_word = title
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_else(|| "unknown".to_string());
    let surname = NON_WORD_RE.replace_all(surname, "").to_lowercase();
    format!("{surname}{year}{first_word}_{index}")
}

/// Remove literal braces, which would otherwise unbalance the `{...}` field delimiters.
fn strip_braces(s: &str) -> String {
    s.replace(['{', '}'], "")
}

/// One rendered BibTeX entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    kind: EntryKind,
    key: String,
    fields: Vec<(&'static str, String)>,
}

impl Entry {
    /// Render `publication`, found at zero-based position `index` of its batch.
    pub fn from_publication(publication: &Normalized, index: usize) -> Self {
        let title = strip_braces(&publication.title);
        let authors = strip_braces(&publication.authors);
        let kind = EntryKind::classify(&publication.venue);
        let key = citation_key(&title, &publication.year, primary_surname(&authors), index);

        let mut fields = vec![
            ("title", title),
            ("author", authors),
            ("year", strip_braces(&publication.year)),
        ];
        if !publication.venue.is_empty() {
            fields.push((kind.container_field(), strip_braces(&publication.venue)));
        }
        if !publication.snippet.is_empty() {
            fields.push(("abstract", strip_braces(&publication.snippet)));
        }
        if publication.citations > 0 {
            fields.push(("note", format!("Cited by {}", publication.citations)));
        }
        if !publication.link.is_empty() {
            fields.push(("url", strip_braces(&publication.link)));
        }

        Entry { kind, key, fields }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@{}{{{},", self.kind, self.key)?;
        for (name, value) in &self.fields {
            writeln!(f, "  {name} = {{{value}}},")?;
        }
        f.write_str("}")
    }
}
