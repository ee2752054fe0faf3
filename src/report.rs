//! Human facing messages printed at the end of a run.

use std::path::Path;

use owo_colors::{OwoColorize, Stream};

pub fn summary(written: usize, rejected: usize) {
    let ok = format!("✓ {written}");
    let failed = format!("✗ {rejected}");
    eprintln!(
        "{} {}",
        ok.if_supports_color(Stream::Stderr, |t| t.green()),
        failed.if_supports_color(Stream::Stderr, |t| t.red()),
    );
}

pub fn written(path: &Path, entries: usize) {
    eprintln!(
        "Wrote {entries} BibTeX entries to {}",
        path.display().if_supports_color(Stream::Stderr, |t| t.bold()),
    );
}

pub fn no_publications() {
    eprintln!(
        "{}",
        "No publications found!".if_supports_color(Stream::Stderr, |t| t.red())
    );
    eprintln!("Troubleshooting tips:");
    eprintln!("  1. Try a different name format (e.g. 'A Le Gear' or 'A. Le Gear')");
    eprintln!("  2. Google Scholar may be blocking requests; try again later");
    eprintln!("  3. Use SerpAPI for reliable results:");
    eprintln!("     - sign up for free at https://serpapi.com/");
    eprintln!("     - set SERPAPI_KEY=<your key> or pass --api-key");
}
