use std::time::Duration;

use indicatif::ProgressBar;
use serde_json::Value;
use url::Url;

use crate::record::{Publication, RecordError, extract_year, json_count, json_text};
use crate::source::{Harvest, MAX_CONSECUTIVE_TIMEOUTS, Source, SourceError, agent, announce};

const PAGE_SIZE: usize = 20;

/// Google Scholar results through the SerpAPI search service.
pub struct SerpApi {
    api_key: String,
    endpoint: Url,
    agent: ureq::Agent,
}

impl SerpApi {
    pub fn new(api_key: String, endpoint: Url, timeout: Duration) -> Self {
        SerpApi {
            api_key,
            endpoint,
            agent: agent(timeout),
        }
    }

    fn request_page(&self, author: &str, start: usize) -> Result<Value, SourceError> {
        let query = format!("author:\"{author}\"");
        let mut res = self
            .agent
            .get(self.endpoint.as_str())
            .query("engine", "google_scholar")
            .query("q", &query)
            .query("api_key", &self.api_key)
            .query("start", start.to_string())
            .query("num", PAGE_SIZE.to_string())
            .call()?;

        match res.status().as_u16() {
            200 => {}
            401 => return Err(SourceError::Unauthorized),
            code => return Err(SourceError::Status(code)),
        }

        let body = res.body_mut().read_to_string()?;
        let data: Value =
            serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))?;
        if let Some(err) = data.get("error") {
            let msg = err
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(SourceError::Api(msg));
        }
        Ok(data)
    }
}

impl Source for SerpApi {
    fn name(&self) -> &'static str {
        "SerpAPI"
    }

    fn fetch(&self, author: &str, max_results: usize, progress: &ProgressBar) -> Harvest {
        tracing::info!(author, "searching Google Scholar via SerpAPI");
        let mut harvest = Harvest::default();
        let mut start = 0;
        let mut timeouts = 0;

        while harvest.publications.len() < max_results {
            let data = match self.request_page(author, start) {
                Ok(data) => {
                    timeouts = 0;
                    data
                }
                Err(SourceError::Timeout) => {
                    timeouts += 1;
                    if timeouts < MAX_CONSECUTIVE_TIMEOUTS {
                        tracing::warn!(start, "request timed out, retrying");
                        continue;
                    }
                    tracing::warn!(start, "request timed out {timeouts} times in a row, giving up");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SerpAPI search stopped");
                    break;
                }
            };

            let results = data
                .get("organic_results")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if results.is_empty() {
                tracing::info!("no more results found");
                break;
            }

            for result in results {
                match parse_result(result) {
                    Ok(publication) => {
                        announce(progress, harvest.publications.len() + 1, &publication);
                        harvest.publications.push(publication);
                    }
                    Err(e) => {
                        harvest.rejected += 1;
                        tracing::warn!(error = %e, "skipping malformed result");
                    }
                }
            }

            start += PAGE_SIZE;
            let total = data
                .pointer("/search_information/total_results")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if start as u64 >= total || start >= max_results {
                break;
            }
        }

        harvest.truncate(max_results)
    }
}

/// Lift one `organic_results` item into a [`Publication`].
fn parse_result(result: &Value) -> Result<Publication, RecordError> {
    let info = result.get("publication_info");
    let summary = match info {
        Some(info) => json_text(info, "summary")?,
        None => None,
    };

    let authors = match info.and_then(|i| i.get("authors")) {
        Some(Value::Array(list)) => list
            .iter()
            .map(|a| a.get("name").and_then(Value::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    // Without structured authors, the summary reads "A Author, B Author - Venue, 2020 - site".
    let authors = if authors.is_empty() {
        summary
            .as_deref()
            .and_then(|s| s.split(" - ").next())
            .unwrap_or_default()
            .to_string()
    } else {
        authors
    };

    Ok(Publication {
        title: json_text(result, "title")?,
        authors: Some(authors),
        year: Some(extract_year(summary.as_deref().unwrap_or_default())),
        venue: summary,
        snippet: json_text(result, "snippet")?,
        citations: json_count(result.pointer("/inline_links/cited_by/total"), "cited_by.total")?,
        link: json_text(result, "link")?,
    })
}
