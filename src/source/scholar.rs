use std::time::Duration;

use indicatif::ProgressBar;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::record::{Publication, extract_year};
use crate::source::{
    Harvest, MAX_CONSECUTIVE_TIMEOUTS, Pacing, Source, SourceError, agent, announce,
};

const PAGE_SIZE: usize = 10;

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("DNT", "1"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Cache-Control", "max-age=0"),
];

/// Best-effort scraping of the Google Scholar result pages.
///
/// Scholar has no public API and blocks automated clients aggressively, so this is paced and
/// stops at the first sign of rate limiting or a CAPTCHA.
pub struct Scholar {
    endpoint: Url,
    pacing: Pacing,
    agent: ureq::Agent,
}

impl Scholar {
    pub fn new(endpoint: Url, pacing: Pacing, timeout: Duration) -> Self {
        Scholar {
            endpoint,
            pacing,
            agent: agent(timeout),
        }
    }

    fn request_page(&self, author: &str, start: usize) -> Result<String, SourceError> {
        let query = format!("author:\"{author}\"");
        let mut req = self
            .agent
            .get(self.endpoint.as_str())
            .query("q", &query)
            .query("start", start.to_string())
            .query("hl", "en");
        for (name, value) in BROWSER_HEADERS {
            req = req.header(*name, *value);
        }
        let mut res = req.call()?;

        match res.status().as_u16() {
            200 => {}
            429 => return Err(SourceError::RateLimited),
            code => return Err(SourceError::Status(code)),
        }

        let body = res.body_mut().read_to_string()?;
        let lower = body.to_lowercase();
        if lower.contains("captcha") || lower.contains("unusual traffic") {
            return Err(SourceError::Blocked);
        }
        Ok(body)
    }
}

impl Source for Scholar {
    fn name(&self) -> &'static str {
        "Google Scholar"
    }

    fn fetch(&self, author: &str, max_results: usize, progress: &ProgressBar) -> Harvest {
        tracing::info!(author, "searching Google Scholar directly");
        tracing::warn!("direct scraping may be blocked; consider using a SerpAPI key");
        let mut harvest = Harvest::default();
        let mut page: u32 = 0;
        let mut timeouts = 0;

        while harvest.publications.len() < max_results {
            let start = page as usize * PAGE_SIZE;
            let delay = self.pacing.delay(page);
            if !delay.is_zero() {
                tracing::debug!(?delay, start, "waiting before next page");
                std::thread::sleep(delay);
            }

            let body = match self.request_page(author, start) {
                Ok(body) => {
                    timeouts = 0;
                    body
                }
                Err(SourceError::Timeout) => {
                    timeouts += 1;
                    if timeouts < MAX_CONSECUTIVE_TIMEOUTS {
                        tracing::warn!(start, "request timed out, skipping page");
                        page += 1;
                        continue;
                    }
                    tracing::warn!(start, "request timed out {timeouts} times in a row, giving up");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Google Scholar search stopped");
                    break;
                }
            };

            let publications = match parse_page(&body) {
                Ok(publications) => publications,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read result page");
                    break;
                }
            };
            if publications.is_empty() {
                if body.contains("did not match any articles") {
                    tracing::info!("no results found for this author");
                }
                break;
            }

            for publication in publications {
                announce(progress, harvest.publications.len() + 1, &publication);
                harvest.publications.push(publication);
            }
            page += 1;
        }

        harvest.truncate(max_results)
    }
}

struct Selectors {
    result: Selector,
    title_link: Selector,
    title: Selector,
    byline: Selector,
    snippet: Selector,
    cited_by: Selector,
}

impl Selectors {
    fn new() -> Result<Self, SourceError> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| SourceError::Parse(format!("selector {css}: {e}")))
        };
        Ok(Selectors {
            result: parse(".gs_r.gs_or.gs_scl")?,
            title_link: parse(".gs_rt a")?,
            title: parse(".gs_rt")?,
            byline: parse(".gs_a")?,
            snippet: parse(".gs_rs")?,
            cited_by: parse(r#"a[href*="cites"]"#)?,
        })
    }
}

/// Extract every result on a Scholar listing page, skipping those without a title.
fn parse_page(html: &str) -> Result<Vec<Publication>, SourceError> {
    let sel = Selectors::new()?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&sel.result)
        .filter_map(|elem| parse_result(&sel, &elem))
        .collect())
}

fn parse_result(sel: &Selectors, elem: &ElementRef) -> Option<Publication> {
    // Drops leading tags such as "[PDF]" or "[HTML]".
    static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[.*?\]\s*").unwrap());
    static CITED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Cited by (\d+)").unwrap());

    let title_elem = elem
        .select(&sel.title_link)
        .next()
        .or_else(|| elem.select(&sel.title).next());
    let title = title_elem.map(text).unwrap_or_default();
    let title = TAG_RE.replace(&title, "").trim().to_string();
    if title.is_empty() {
        return None;
    }

    let link = title_elem
        .filter(|e| e.value().name() == "a")
        .and_then(|e| e.value().attr("href"))
        .unwrap_or_default()
        .to_string();

    // Byline format: "Authors - Venue, Year - Publisher"
    let byline = elem.select(&sel.byline).next().map(text).unwrap_or_default();
    let mut parts = byline.split(" - ");
    let authors = parts.next().unwrap_or_default().trim().to_string();
    let venue = parts.next().unwrap_or_default().trim().to_string();

    let snippet = elem
        .select(&sel.snippet)
        .next()
        .map(text)
        .unwrap_or_default()
        .trim()
        .to_string();

    let citations = elem
        .select(&sel.cited_by)
        .next()
        .map(text)
        .and_then(|t| CITED_RE.captures(&t).and_then(|c| c[1].parse::<u64>().ok()))
        .unwrap_or(0);

    Some(Publication {
        title: Some(title),
        authors: Some(authors),
        year: Some(extract_year(&byline)),
        venue: Some(venue),
        snippet: Some(snippet),
        citations: Some(citations),
        link: Some(link),
    })
}

fn text(elem: ElementRef) -> String {
    elem.text().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::stall;
    use mockito::Matcher;

    const RESULTS_PAGE: &str = r#"<html><body><div id="gs_res_ccl_mid">
<div class="gs_r gs_or gs_scl">
  <div class="gs_ri">
    <h3 class="gs_rt"><span class="gs_ctc">[PDF]</span> <a href="https://example.org/a.pdf">A Study of Things</a></h3>
    <div class="gs_a">J Smith, K Lee - IEEE Conference on X, 2021 - ieeexplore.ieee.org</div>
    <div class="gs_rs">We study things in depth.</div>
    <div class="gs_fl"><a href="/scholar?cites=123&amp;hl=en">Cited by 42</a> <a href="/scholar?related">Related articles</a></div>
  </div>
</div>
<div class="gs_r gs_or gs_scl">
  <div class="gs_ri">
    <h3 class="gs_rt"><span>[CITATION]</span> Untitled Notes on Others</h3>
    <div class="gs_a">A Turing</div>
  </div>
</div>
<div class="gs_r gs_or gs_scl">
  <div class="gs_ri"><h3 class="gs_rt"></h3><div class="gs_a">Nobody - Nowhere, 2000</div></div>
</div>
</div></body></html>"#;

    fn source(server: &mockito::Server) -> Scholar {
        source_with_timeout(server, Duration::from_secs(30))
    }

    fn source_with_timeout(server: &mockito::Server, timeout: Duration) -> Scholar {
        let endpoint = Url::parse(&format!("{}/scholar", server.url())).unwrap();
        Scholar::new(endpoint, Pacing::NONE, timeout)
    }

    fn start_is(start: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "author:\"Jane Smith\"".into()),
            Matcher::UrlEncoded("hl".into(), "en".into()),
            Matcher::UrlEncoded("start".into(), start.into()),
        ])
    }

    #[test]
    fn parse_page_extracts_results() {
        let pubs = parse_page(RESULTS_PAGE).unwrap();
        assert_eq!(pubs.len(), 2, "untitled result should be skipped");

        let first = &pubs[0];
        assert_eq!(first.title.as_deref(), Some("A Study of Things"));
        assert_eq!(first.link.as_deref(), Some("https://example.org/a.pdf"));
        assert_eq!(first.authors.as_deref(), Some("J Smith, K Lee"));
        assert_eq!(first.venue.as_deref(), Some("IEEE Conference on X, 2021"));
        assert_eq!(first.year.as_deref(), Some("2021"));
        assert_eq!(first.snippet.as_deref(), Some("We study things in depth."));
        assert_eq!(first.citations, Some(42));
    }

    #[test]
    fn parse_page_handles_sparse_result() {
        let pubs = parse_page(RESULTS_PAGE).unwrap();
        let second = &pubs[1];
        assert_eq!(second.title.as_deref(), Some("Untitled Notes on Others"));
        assert_eq!(second.link.as_deref(), Some(""));
        assert_eq!(second.authors.as_deref(), Some("A Turing"));
        assert_eq!(second.venue.as_deref(), Some(""));
        assert_eq!(second.year.as_deref(), Some("n.d."));
        assert_eq!(second.citations, Some(0));
    }

    #[test]
    fn parse_page_without_results_is_empty() {
        let pubs = parse_page("<html><body>did not match any articles</body></html>").unwrap();
        assert!(pubs.is_empty());
    }

    #[test]
    fn fetch_reads_pages_until_empty() {
        let mut server = mockito::Server::new();
        let first = server
            .mock("GET", "/scholar")
            .match_query(start_is("0"))
            .with_status(200)
            .with_body(RESULTS_PAGE)
            .create();
        let second = server
            .mock("GET", "/scholar")
            .match_query(start_is("10"))
            .with_status(200)
            .with_body("<html><body>Your search did not match any articles.</body></html>")
            .create();

        let harvest = source(&server).fetch("Jane Smith", 100, &ProgressBar::hidden());
        first.assert();
        second.assert();
        assert_eq!(harvest.publications.len(), 2);
        assert_eq!(harvest.rejected, 0);
    }

    #[test]
    fn fetch_respects_budget() {
        let mut server = mockito::Server::new();
        let first = server
            .mock("GET", "/scholar")
            .match_query(start_is("0"))
            .with_status(200)
            .with_body(RESULTS_PAGE)
            .expect(1)
            .create();

        let harvest = source(&server).fetch("Jane Smith", 1, &ProgressBar::hidden());
        first.assert();
        assert_eq!(harvest.publications.len(), 1);
    }

    #[test]
    fn fetch_stops_on_captcha() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/scholar")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html><body>Our systems have detected unusual traffic</body></html>")
            .expect(1)
            .create();

        let harvest = source(&server).fetch("Jane Smith", 100, &ProgressBar::hidden());
        m.assert();
        assert!(harvest.publications.is_empty());
    }

    #[test]
    fn fetch_stops_when_rate_limited() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/scholar")
            .match_query(Matcher::Any)
            .with_status(429)
            .expect(1)
            .create();

        let harvest = source(&server).fetch("Jane Smith", 100, &ProgressBar::hidden());
        m.assert();
        assert!(harvest.publications.is_empty());
    }

    #[test]
    fn request_page_reports_unexpected_status() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/scholar")
            .match_query(Matcher::Any)
            .with_status(503)
            .create();

        assert!(matches!(
            source(&server).request_page("Jane Smith", 0),
            Err(SourceError::Status(503))
        ));
    }

    #[test]
    fn fetch_keeps_results_collected_before_bad_status() {
        let mut server = mockito::Server::new();
        let first = server
            .mock("GET", "/scholar")
            .match_query(start_is("0"))
            .with_status(200)
            .with_body(RESULTS_PAGE)
            .expect(1)
            .create();
        let failing = server
            .mock("GET", "/scholar")
            .match_query(start_is("10"))
            .with_status(503)
            .expect(1)
            .create();

        let harvest = source(&server).fetch("Jane Smith", 100, &ProgressBar::hidden());
        first.assert();
        failing.assert();
        assert_eq!(harvest.publications.len(), 2);
    }

    #[test]
    fn fetch_skips_page_that_times_out() {
        let mut server = mockito::Server::new();
        let slow = server
            .mock("GET", "/scholar")
            .match_query(start_is("0"))
            .with_status(200)
            .with_chunked_body(stall)
            .expect(1)
            .create();
        let second = server
            .mock("GET", "/scholar")
            .match_query(start_is("10"))
            .with_status(200)
            .with_body(RESULTS_PAGE)
            .expect(1)
            .create();
        let end = server
            .mock("GET", "/scholar")
            .match_query(start_is("20"))
            .with_status(200)
            .with_body("<html><body>Your search did not match any articles.</body></html>")
            .expect(1)
            .create();

        let src = source_with_timeout(&server, Duration::from_millis(200));
        let harvest = src.fetch("Jane Smith", 100, &ProgressBar::hidden());
        slow.assert();
        second.assert();
        end.assert();
        assert_eq!(harvest.publications.len(), 2);
        assert_eq!(
            harvest.publications[0].title.as_deref(),
            Some("A Study of Things")
        );
    }

    #[test]
    fn fetch_gives_up_after_consecutive_timeouts() {
        let mut server = mockito::Server::new();
        let slow: Vec<_> = ["0", "10", "20"]
            .into_iter()
            .map(|start| {
                server
                    .mock("GET", "/scholar")
                    .match_query(start_is(start))
                    .with_status(200)
                    .with_chunked_body(stall)
                    .expect(1)
                    .create()
            })
            .collect();
        let after = server
            .mock("GET", "/scholar")
            .match_query(start_is("30"))
            .expect(0)
            .create();

        let src = source_with_timeout(&server, Duration::from_millis(200));
        let harvest = src.fetch("Jane Smith", 100, &ProgressBar::hidden());
        for m in &slow {
            m.assert();
        }
        after.assert();
        assert!(harvest.publications.is_empty());
        assert_eq!(slow.len(), MAX_CONSECUTIVE_TIMEOUTS);
    }
}
