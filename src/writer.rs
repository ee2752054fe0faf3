use std::{fmt, fs, path::Path};

use anyhow::Context;

use crate::bibtex::Entry;

/// Name recorded in the generated file header.
pub const GENERATOR: &str = env!("CARGO_PKG_NAME");

/// A complete bibliography file for one author.
pub struct Bibliography {
    author: String,
    entries: Vec<Entry>,
}

impl Bibliography {
    pub fn new(author: impl Into<String>, entries: Vec<Entry>) -> Self {
        Bibliography {
            author: author.into(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Write the bibliography to `path`, replacing anything already there.
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, self.to_string())
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), entries = self.len(), "bibliography written");
        Ok(())
    }
}

impl fmt::Display for Bibliography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "% BibTeX file generated from Google Scholar")?;
        writeln!(f, "% Author: {}", self.author)?;
        writeln!(f, "% Total entries: {}", self.entries.len())?;
        writeln!(f, "% Generated by: {GENERATOR}")?;
        writeln!(f)?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
