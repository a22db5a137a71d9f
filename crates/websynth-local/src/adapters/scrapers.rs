//! Direct HTML scrapers for search engines with no JSON API, used as a
//! fallback or opt-in alternative to the meta-search aggregator (spec.md
//! §4.6, `DIRECT_DDG`/`DIRECT_STARTPAGE`).
//!
//! These lean on the fingerprint-mimicking fetcher rather than the standard
//! one, since both engines are aggressive about blocking obvious scraper
//! traffic.

use std::sync::Arc;
use websynth_core::{AdapterParams, CandidateResult, Error, FetchBackend, FetchRequest, Result, SourceAdapter};

/// Unwraps DuckDuckGo's `//duckduckgo.com/l/?uddg=<url-encoded target>&...`
/// click-tracking redirector, returning the real target URL unchanged if the
/// link isn't a redirector link.
pub fn unwrap_uddg_redirect(href: &str) -> String {
    let Some(idx) = href.find("uddg=") else {
        return href.to_string();
    };
    let after = &href[idx + "uddg=".len()..];
    let end = after.find('&').unwrap_or(after.len());
    let encoded = &after[..end];
    urlencoding_decode(encoded).unwrap_or_else(|| href.to_string())
}

fn urlencoding_decode(s: &str) -> Option<String> {
    let mut out = Vec::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
                let byte = u8::from_str_radix(hex, 16).ok()?;
                out.push(byte);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

struct ScraperConfig {
    id: &'static str,
    search_url: fn(&AdapterParams) -> String,
    result_selector: &'static str,
    link_selector: &'static str,
    snippet_selector: &'static str,
    unwrap_redirect: bool,
}

pub struct DirectScraper {
    cfg: ScraperConfig,
    fetcher: Arc<dyn FetchBackend>,
}

impl DirectScraper {
    fn fetch_results(&self, html: &str, limit: usize) -> Vec<CandidateResult> {
        let doc = html_scraper::Html::parse_document(html);
        let Ok(result_sel) = html_scraper::Selector::parse(self.cfg.result_selector) else {
            return Vec::new();
        };
        let Ok(link_sel) = html_scraper::Selector::parse(self.cfg.link_selector) else {
            return Vec::new();
        };
        let Ok(snippet_sel) = html_scraper::Selector::parse(self.cfg.snippet_selector) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for el in doc.select(&result_sel) {
            let Some(link) = el.select(&link_sel).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let url = if self.cfg.unwrap_redirect {
                unwrap_uddg_redirect(href)
            } else {
                href.to_string()
            };
            if url.is_empty() {
                continue;
            }
            let title = link.text().collect::<Vec<_>>().join(" ").trim().to_string();
            let snippet = el
                .select(&snippet_sel)
                .next()
                .map(|s| s.text().collect::<Vec<_>>().join(" ").trim().to_string())
                .unwrap_or_default();
            out.push(CandidateResult {
                title,
                snippet,
                url,
                score: 1.0,
                source_id: self.cfg.id.to_string(),
            });
            if out.len() >= limit {
                break;
            }
        }
        out
    }
}

impl DirectScraper {
    async fn do_fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        let url = (self.cfg.search_url)(params);
        let req = FetchRequest {
            url,
            timeout_ms: Some(15_000),
            max_bytes: Some(4 * 1024 * 1024),
            headers: Default::default(),
            cache: Default::default(),
        };
        let resp = self.fetcher.fetch(&req).await?;
        if resp.status >= 400 {
            return Err(Error::Search(format!(
                "{} returned status {}",
                self.cfg.id, resp.status
            )));
        }
        let html = resp.text_lossy();
        let limit = params.limit.unwrap_or(20);
        Ok(self.fetch_results(&html, limit))
    }
}

#[async_trait::async_trait]
impl SourceAdapter for DirectScraper {
    fn id(&self) -> &'static str {
        self.cfg.id
    }

    async fn fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        crate::retry::retry_adapter(|| self.do_fetch(params)).await
    }
}

fn ddg_search_url(params: &AdapterParams) -> String {
    format!(
        "https://html.duckduckgo.com/html/?q={}",
        urlencoding_encode(&params.query)
    )
}

fn startpage_search_url(params: &AdapterParams) -> String {
    format!(
        "https://www.startpage.com/sp/search?query={}",
        urlencoding_encode(&params.query)
    )
}

fn urlencoding_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

pub struct DuckDuckGoAdapter;

impl DuckDuckGoAdapter {
    pub fn new(fetcher: Arc<dyn FetchBackend>) -> DirectScraper {
        DirectScraper {
            cfg: ScraperConfig {
                id: "duckduckgo",
                search_url: ddg_search_url,
                result_selector: ".result",
                link_selector: ".result__a",
                snippet_selector: ".result__snippet",
                unwrap_redirect: true,
            },
            fetcher,
        }
    }
}

pub struct StartpageAdapter;

impl StartpageAdapter {
    pub fn new(fetcher: Arc<dyn FetchBackend>) -> DirectScraper {
        DirectScraper {
            cfg: ScraperConfig {
                id: "startpage",
                search_url: startpage_search_url,
                result_selector: ".w-gl__result",
                link_selector: "a.w-gl__result-url",
                snippet_selector: ".w-gl__description",
                unwrap_redirect: false,
            },
            fetcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_uddg_redirect() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage&rut=abc";
        assert_eq!(unwrap_uddg_redirect(href), "https://example.com/page");
    }

    #[test]
    fn non_redirect_links_pass_through() {
        let href = "https://example.com/page";
        assert_eq!(unwrap_uddg_redirect(href), href);
    }

    #[tokio::test]
    async fn ddg_scraper_parses_results_and_unwraps_links() {
        struct Stub;
        #[async_trait::async_trait]
        impl FetchBackend for Stub {
            async fn fetch(&self, _req: &FetchRequest) -> Result<websynth_core::FetchResponse> {
                let html = r#"
                <div class="result">
                  <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa">Example A</a>
                  <a class="result__snippet">first snippet</a>
                </div>"#;
                Ok(websynth_core::FetchResponse {
                    url: "stub".to_string(),
                    final_url: "stub".to_string(),
                    status: 200,
                    content_type: None,
                    headers: Default::default(),
                    bytes: html.as_bytes().to_vec(),
                    truncated: false,
                    source: websynth_core::FetchSource::Network,
                    timings_ms: Default::default(),
                })
            }
        }
        let adapter = DuckDuckGoAdapter::new(Arc::new(Stub));
        let results = adapter
            .fetch(&AdapterParams {
                query: "rust async".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/a");
        assert_eq!(results[0].title, "Example A");
    }
}
