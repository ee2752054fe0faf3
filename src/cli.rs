use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use url::Url;

use crate::source::{Endpoints, Pacing, SCHOLAR_ENDPOINT, SERPAPI_ENDPOINT};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the publications of an author and write them to a BibTeX file
    Fetch(FetchArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Author name, as shown on Google Scholar
    #[arg(value_name = "AUTHOR")]
    pub author: String,

    /// File to write, replaced if it exists
    #[arg(short, long, default_value = "publications.bib")]
    pub output: PathBuf,

    /// Upper bound on the number of publications to fetch
    #[arg(short = 'n', long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_results: u32,

    /// SerpAPI key; without one, Google Scholar is scraped directly
    #[arg(long, env = "SERPAPI_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, default_value = SERPAPI_ENDPOINT, hide = true)]
    pub serpapi_endpoint: Url,

    #[arg(long, default_value = SCHOLAR_ENDPOINT, hide = true)]
    pub scholar_endpoint: Url,

    /// Seconds to wait before each scraped page
    #[arg(long, default_value = "2", value_parser = parse_seconds)]
    pub delay: Duration,

    /// Extra seconds of delay added per scraped page
    #[arg(long, default_value = "1", value_parser = parse_seconds)]
    pub delay_step: Duration,

    /// Seconds before a single upstream request is abandoned
    #[arg(long, default_value = "30", value_parser = parse_seconds)]
    pub timeout: Duration,
}

impl FetchArgs {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            serpapi: self.serpapi_endpoint.clone(),
            scholar: self.scholar_endpoint.clone(),
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            base: self.delay,
            step: self.delay_step,
        }
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let v: f64 = s.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(v)
        .map_err(|e| format!("expected a non-negative number of seconds, got {s}: {e}"))
}
