use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    bibtex::Entry,
    cli::{Cli, Command, FetchArgs},
    writer::Bibliography,
};

mod bibtex;
mod cli;
mod record;
mod report;
mod source;
mod writer;

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose, args.quiet);
    match args.command {
        Command::Fetch(fetch) => run_fetch(&fetch),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scholar_bib={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_fetch(args: &FetchArgs) -> anyhow::Result<()> {
    let max_results = args.max_results as usize;
    let source = source::select(
        args.api_key.clone(),
        &args.endpoints(),
        args.pacing(),
        args.timeout,
    );
    tracing::debug!(source = source.name(), max_results, "starting search");

    let progress = source::spinner(max_results);
    let harvest = source.fetch(&args.author, max_results, &progress);
    progress.finish_and_clear();

    if harvest.publications.is_empty() {
        report::summary(0, harvest.rejected);
        report::no_publications();
        return Ok(());
    }
    tracing::info!(
        found = harvest.publications.len(),
        "generating BibTeX entries"
    );

    let entries = harvest
        .publications
        .iter()
        .enumerate()
        .map(|(i, publication)| {
            let entry = Entry::from_publication(&publication.normalize(), i);
            tracing::debug!(key = entry.key(), kind = %entry.kind(), "rendered entry");
            entry
        })
        .collect();
    let bibliography = Bibliography::new(args.author.as_str(), entries);
    bibliography.write_to(&args.output)?;

    report::summary(bibliography.len(), harvest.rejected);
    report::written(&args.output, bibliography.len());
    Ok(())
}
