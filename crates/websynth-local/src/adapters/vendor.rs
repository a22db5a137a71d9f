//! Thin vendor-specific adapters (spec.md §4.6's "specialized tool
//! variants"): GitHub code search, HuggingFace model search, a job-board
//! stub, and a YouTube-backed video search.
//!
//! These hit narrow, well-known JSON APIs rather than scraping, so each is a
//! small `SourceAdapter` around one GET plus a DTO -- the same shape as
//! `SearxngAdapter`, just pointed at a different upstream.

use serde::Deserialize;
use std::sync::Arc;
use websynth_core::{AdapterParams, CandidateResult, Error, FetchBackend, FetchRequest, Result, SourceAdapter};

fn auth_header(token: &Option<String>, scheme: &str) -> std::collections::BTreeMap<String, String> {
    let mut h = std::collections::BTreeMap::new();
    if let Some(t) = token {
        if !t.is_empty() {
            h.insert("authorization".to_string(), format!("{scheme} {t}"));
        }
    }
    h
}

pub struct GitHubCodeAdapter {
    fetcher: Arc<dyn FetchBackend>,
    token: Option<String>,
    repos: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubCodeSearchResponse {
    #[serde(default)]
    items: Vec<GitHubCodeItem>,
}

#[derive(Debug, Deserialize)]
struct GitHubCodeItem {
    name: String,
    path: String,
    html_url: String,
    repository: GitHubRepoRef,
}

#[derive(Debug, Deserialize)]
struct GitHubRepoRef {
    full_name: String,
}

impl GitHubCodeAdapter {
    pub fn new(fetcher: Arc<dyn FetchBackend>) -> Self {
        Self {
            fetcher,
            token: std::env::var("GITHUB_TOKEN").ok(),
            repos: std::env::var("GITHUB_SEARCH_REPOS").ok(),
        }
    }
}

impl GitHubCodeAdapter {
    async fn do_fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        let mut q = params.query.clone();
        if let Some(repos) = &self.repos {
            for repo in repos.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                q.push_str(&format!(" repo:{repo}"));
            }
        }
        let url = format!(
            "https://api.github.com/search/code?q={}",
            urlencode(&q)
        );
        let req = FetchRequest {
            url,
            timeout_ms: Some(15_000),
            max_bytes: Some(2 * 1024 * 1024),
            headers: auth_header(&self.token, "Bearer"),
            cache: Default::default(),
        };
        let resp = self.fetcher.fetch(&req).await?;
        if resp.status == 404 || resp.status == 422 {
            return Ok(Vec::new());
        }
        if resp.status >= 400 {
            return Err(Error::Search(format!("github code search returned {}", resp.status)));
        }
        let body = resp.text_lossy();
        let parsed: GitHubCodeSearchResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Search(format!("github code search decode failed: {e}")))?;
        let limit = params.limit.unwrap_or(20);
        Ok(parsed
            .items
            .into_iter()
            .take(limit)
            .map(|it| CandidateResult {
                title: format!("{}/{}", it.repository.full_name, it.path),
                snippet: it.name,
                url: it.html_url,
                score: 1.0,
                source_id: "github_code".to_string(),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SourceAdapter for GitHubCodeAdapter {
    fn id(&self) -> &'static str {
        "github_code"
    }

    async fn fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        crate::retry::retry_adapter(|| self.do_fetch(params)).await
    }
}

pub struct HuggingFaceAdapter {
    fetcher: Arc<dyn FetchBackend>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HuggingFaceModel {
    id: String,
    #[serde(default)]
    pipeline_tag: Option<String>,
    #[serde(default)]
    likes: Option<i64>,
}

impl HuggingFaceAdapter {
    pub fn new(fetcher: Arc<dyn FetchBackend>) -> Self {
        Self {
            fetcher,
            token: std::env::var("HUGGINGFACE_TOKEN").ok(),
        }
    }
}

impl HuggingFaceAdapter {
    async fn do_fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        let limit = params.limit.unwrap_or(20);
        let url = format!(
            "https://huggingface.co/api/models?search={}&limit={}",
            urlencode(&params.query),
            limit
        );
        let req = FetchRequest {
            url,
            timeout_ms: Some(15_000),
            max_bytes: Some(2 * 1024 * 1024),
            headers: auth_header(&self.token, "Bearer"),
            cache: Default::default(),
        };
        let resp = self.fetcher.fetch(&req).await?;
        if resp.status >= 400 {
            return Err(Error::Search(format!("huggingface search returned {}", resp.status)));
        }
        let body = resp.text_lossy();
        let models: Vec<HuggingFaceModel> = serde_json::from_str(&body)
            .map_err(|e| Error::Search(format!("huggingface response decode failed: {e}")))?;
        Ok(models
            .into_iter()
            .take(limit)
            .map(|m| CandidateResult {
                snippet: m.pipeline_tag.unwrap_or_default(),
                url: format!("https://huggingface.co/{}", m.id),
                score: m.likes.unwrap_or(0) as f64,
                title: m.id,
                source_id: "huggingface".to_string(),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SourceAdapter for HuggingFaceAdapter {
    fn id(&self) -> &'static str {
        "huggingface"
    }

    async fn fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        crate::retry::retry_adapter(|| self.do_fetch(params)).await
    }
}

/// Job-board adapter stub: this vendor has no public unauthenticated API, so
/// without a configured endpoint it returns an empty result set rather than
/// erroring, matching the "return empty, not an error" contract for an
/// adapter with nothing to say.
pub struct JobBoardAdapter {
    fetcher: Arc<dyn FetchBackend>,
    endpoint: Option<String>,
}

impl JobBoardAdapter {
    pub fn new(fetcher: Arc<dyn FetchBackend>) -> Self {
        Self {
            fetcher,
            endpoint: std::env::var("JOB_BOARD_API_BASE").ok(),
        }
    }
}

impl JobBoardAdapter {
    async fn do_fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        let Some(base) = &self.endpoint else {
            return Ok(Vec::new());
        };
        let url = format!("{}/jobs?q={}", base.trim_end_matches('/'), urlencode(&params.query));
        let req = FetchRequest {
            url,
            timeout_ms: Some(15_000),
            max_bytes: Some(2 * 1024 * 1024),
            headers: Default::default(),
            cache: Default::default(),
        };
        let resp = self.fetcher.fetch(&req).await?;
        if resp.status >= 400 {
            return Ok(Vec::new());
        }
        let body = resp.text_lossy();
        let parsed: Vec<JobListing> = serde_json::from_str(&body).unwrap_or_default();
        let limit = params.limit.unwrap_or(20);
        Ok(parsed
            .into_iter()
            .take(limit)
            .map(|j| CandidateResult {
                title: j.title,
                snippet: j.company,
                url: j.url,
                score: 1.0,
                source_id: "job_board".to_string(),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SourceAdapter for JobBoardAdapter {
    fn id(&self) -> &'static str {
        "job_board"
    }

    async fn fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        crate::retry::retry_adapter(|| self.do_fetch(params)).await
    }
}

#[derive(Debug, Deserialize, Default)]
struct JobListing {
    #[serde(default)]
    title: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    url: String,
}

pub struct VideoAdapter {
    fetcher: Arc<dyn FetchBackend>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YouTubeSearchResponse {
    #[serde(default)]
    items: Vec<YouTubeItem>,
}

#[derive(Debug, Deserialize)]
struct YouTubeItem {
    id: YouTubeId,
    snippet: YouTubeSnippet,
}

#[derive(Debug, Deserialize)]
struct YouTubeId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YouTubeSnippet {
    title: String,
    description: String,
}

impl VideoAdapter {
    pub fn new(fetcher: Arc<dyn FetchBackend>) -> Self {
        let api_key = std::env::var("YOUTUBE_API_KEY")
            .ok()
            .or_else(|| std::env::var("YOUTUBE_API_KEY_FALLBACK").ok());
        Self { fetcher, api_key }
    }
}

impl VideoAdapter {
    async fn do_fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        let Some(key) = &self.api_key else {
            return Ok(Vec::new());
        };
        let url = format!(
            "https://www.googleapis.com/youtube/v3/search?part=snippet&type=video&q={}&key={}",
            urlencode(&params.query),
            key
        );
        let req = FetchRequest {
            url,
            timeout_ms: Some(15_000),
            max_bytes: Some(2 * 1024 * 1024),
            headers: Default::default(),
            cache: Default::default(),
        };
        let resp = self.fetcher.fetch(&req).await?;
        if resp.status >= 400 {
            return Err(Error::Search(format!("youtube search returned {}", resp.status)));
        }
        let body = resp.text_lossy();
        let parsed: YouTubeSearchResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Search(format!("youtube response decode failed: {e}")))?;
        let limit = params.limit.unwrap_or(20);
        Ok(parsed
            .items
            .into_iter()
            .filter_map(|it| {
                let id = it.id.video_id?;
                Some(CandidateResult {
                    title: it.snippet.title,
                    snippet: it.snippet.description,
                    url: format!("https://www.youtube.com/watch?v={id}"),
                    score: 1.0,
                    source_id: "video".to_string(),
                })
            })
            .take(limit)
            .collect())
    }
}

#[async_trait::async_trait]
impl SourceAdapter for VideoAdapter {
    fn id(&self) -> &'static str {
        "video"
    }

    async fn fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>> {
        crate::retry::retry_adapter(|| self.do_fetch(params)).await
    }
}

fn urlencode(s: &str) -> String {
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
