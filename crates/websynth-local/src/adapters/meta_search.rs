//! SearXNG meta-search adapter (spec.md §4.6, §6 `SEARX_URL`).
//!
//! Grounded on the teacher's `SearxngSearchProvider` (`*_from_env` env-driven
//! construction, a thin response DTO, one GET per query).

use serde::Deserialize;
use std::sync::Arc;
use websynth_core::{AdapterParams, CandidateResult, Error, FetchBackend, FetchRequest, Result, SourceAdapter};

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    score: Option<f64>,
}

pub struct SearxngAdapter {
    base_url: String,
    fetcher: Arc<dyn FetchBackend>,
    engines: Option<String>,
}

impl SearxngAdapter {
    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn FetchBackend>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetcher,
            engines: None,
        }
    }

    pub fn with_engines(mut self, engines: impl Into<String>) -> Self {
        self.engines = Some(engines.into());
        self
    }

    pub fn from_env(fetcher: Arc<dyn FetchBackend>) -> Result<Self> {
        let base_url = std::env::var("SEARX_URL")
            .map_err(|_| Error::NotConfigured("SEARX_URL is not set".to_string()))?;
        Ok(Self::new(base_url, fetcher))
    }

    fn build_url(&self, params: &AdapterParams) -> Result<String> {
        let mut url = url::Url::parse(&format!("{}/search", self.base_url))
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("q", &params.query);
            qp.append_pair("format", "json");
            if let Some(lang) = &params.language {
                qp.append_pair("language", lang);
            }
            if let Some(tr) = &params.time_range {
                qp.append_pair("time_range", tr);
            }
            if let Some(engines) = &self.engines {
                qp.append_pair("engines", engines);
            }
        }
        Ok(url.to_string())
    }
}

impl SearxngAdapter {
    async fn do_fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        let url = self.build_url(params)?;
        let req = FetchRequest {
            url,
            timeout_ms: Some(15_000),
            max_bytes: Some(2 * 1024 * 1024),
            headers: Default::default(),
            cache: Default::default(),
        };
        let resp = self.fetcher.fetch(&req).await?;
        if resp.status == 404 {
            return Ok(Vec::new());
        }
        if resp.status >= 400 {
            return Err(Error::Search(format!(
                "searxng returned status {}",
                resp.status
            )));
        }
        let body = resp.text_lossy();
        let parsed: SearxngSearchResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Search(format!("searxng response decode failed: {e}")))?;

        let limit = params.limit.unwrap_or(20);
        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(limit)
            .map(|r| CandidateResult {
                title: r.title,
                snippet: r.content,
                url: r.url,
                score: r.score.unwrap_or(1.0),
                source_id: "searxng".to_string(),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SourceAdapter for SearxngAdapter {
    fn id(&self) -> &'static str {
        "searxng"
    }

    async fn fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        crate::retry::retry_adapter(|| self.do_fetch(params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        body: String,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FetchBackend for StubFetcher {
        async fn fetch(&self, _req: &FetchRequest) -> Result<websynth_core::FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(websynth_core::FetchResponse {
                url: "stub".to_string(),
                final_url: "stub".to_string(),
                status: 200,
                content_type: Some("application/json".to_string()),
                headers: Default::default(),
                bytes: self.body.clone().into_bytes(),
                truncated: false,
                source: websynth_core::FetchSource::Network,
                timings_ms: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn parses_results_into_candidates() {
        let stub = Arc::new(StubFetcher {
            body: r#"{"results":[{"title":"A","content":"snippet a","url":"https://a.example","score":2.5}]}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let adapter = SearxngAdapter::new("http://localhost:8080", stub);
        let results = adapter
            .fetch(&AdapterParams {
                query: "golang context".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.example");
        assert_eq!(results[0].score, 2.5);
    }

    #[tokio::test]
    async fn missing_score_defaults_to_one() {
        let stub = Arc::new(StubFetcher {
            body: r#"{"results":[{"title":"A","content":"c","url":"https://a.example"}]}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let adapter = SearxngAdapter::new("http://localhost:8080", stub);
        let results = adapter
            .fetch(&AdapterParams {
                query: "q".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results[0].score, 1.0);
    }
}
