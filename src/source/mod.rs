use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

use crate::record::Publication;

pub mod scholar;
pub mod serpapi;

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search";
pub const SCHOLAR_ENDPOINT: &str = "https://scholar.google.com/scholar";

/// Upper bound on back-to-back timeouts before a strategy gives up.
pub(crate) const MAX_CONSECUTIVE_TIMEOUTS: usize = 3;

/// Something that can list the publications of an author.
pub trait Source {
    /// Human readable name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Collect at most `max_results` publications for `author`, in discovery order.
    ///
    /// Failures are logged and end the search early; whatever was collected so far is returned.
    fn fetch(&self, author: &str, max_results: usize, progress: &ProgressBar) -> Harvest;
}

/// Outcome of one acquisition run.
#[derive(Debug, Default)]
pub struct Harvest {
    pub publications: Vec<Publication>,
    /// Upstream records that were dropped because a field had an unusable shape.
    pub rejected: usize,
}

impl Harvest {
    pub(crate) fn truncate(mut self, max_results: usize) -> Self {
        self.publications.truncate(max_results);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,
    #[error("invalid API key")]
    Unauthorized,
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("upstream is asking for a CAPTCHA")]
    Blocked,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(ureq::Error),
    #[error("malformed response: {0}")]
    Parse(String),
}

impl From<ureq::Error> for SourceError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => SourceError::Timeout,
            ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                SourceError::Timeout
            }
            other => SourceError::Network(other),
        }
    }
}

/// Base URLs of the upstream services.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub serpapi: Url,
    pub scholar: Url,
}

#[cfg(test)]
impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            serpapi: Url::parse(SERPAPI_ENDPOINT).unwrap(),
            scholar: Url::parse(SCHOLAR_ENDPOINT).unwrap(),
        }
    }
}

/// Delay policy between scraped pages: `base + step * page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub base: Duration,
    pub step: Duration,
}

impl Pacing {
    #[cfg(test)]
    pub const NONE: Pacing = Pacing {
        base: Duration::ZERO,
        step: Duration::ZERO,
    };

    pub fn delay(&self, page: u32) -> Duration {
        self.base.saturating_add(self.step.saturating_mul(page))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            base: Duration::from_secs(2),
            step: Duration::from_secs(1),
        }
    }
}

/// Pick the API-backed strategy when a key is available, the scraper otherwise.
///
/// `timeout` bounds each individual request of the chosen strategy.
pub fn select(
    api_key: Option<String>,
    endpoints: &Endpoints,
    pacing: Pacing,
    timeout: Duration,
) -> Box<dyn Source> {
    match api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => Box::new(serpapi::SerpApi::new(
            key,
            endpoints.serpapi.clone(),
            timeout,
        )),
        None => {
            tracing::info!(
                "no SerpAPI key provided; falling back to scraping, which may be blocked. \
                 Get a free key at https://serpapi.com/ and set SERPAPI_KEY"
            );
            Box::new(scholar::Scholar::new(
                endpoints.scholar.clone(),
                pacing,
                timeout,
            ))
        }
    }
}

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    let cfg = ureq::Agent::config_builder()
        .timeout_connect(Some(timeout.min(Duration::from_secs(10))))
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(cfg)
}

/// Spinner shown while a strategy walks through result pages.
pub fn spinner(max_results: usize) -> ProgressBar {
    let pb = ProgressBar::new(max_results as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}") {
        pb.set_style(style);
    }
    pb
}

/// Report a newly collected publication.
pub(crate) fn announce(progress: &ProgressBar, count: usize, publication: &Publication) {
    let title: String = publication
        .title
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(55)
        .collect();
    tracing::debug!("[{count}] {title}...");
    progress.set_position(count as u64);
    progress.set_message(title);
}

/// Response body that trickles a byte every 20ms for a second, outlasting short timeouts.
#[cfg(test)]
pub(crate) fn stall(w: &mut dyn std::io::Write) -> std::io::Result<()> {
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(20));
        w.write_all(b" ")?;
    }
    Ok(())
}
