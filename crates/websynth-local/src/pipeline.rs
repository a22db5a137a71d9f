//! The search pipeline orchestrator (spec.md §4.7): fan-out, merge, filter,
//! dedup, content fetch, LLM synthesis, assemble.

use crate::llm::{self, ChatMessage, OpenAiCompatClient};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use websynth_core::{
    AdapterParams, AnswerRecord, CandidateResult, Depth, Error, Fact, FetchBackend, FetchCachePolicy,
    FetchRequest, Result, SourceAdapter, SourceReference,
};

#[derive(Debug, Clone)]
pub struct SubQuery {
    pub text: String,
    pub engines: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Summary,
    Raw,
}

pub struct PipelineOpts {
    pub queries: Vec<SubQuery>,
    pub language: Option<String>,
    pub time_range: Option<String>,
    pub instruction: Option<String>,
    pub mode: Mode,
    pub depth: Depth,
    pub max_per_domain: usize,
    pub max_fetch_urls: usize,
    pub content_limit: usize,
    pub min_score: f64,
    pub min_keep: usize,
    pub url_rewriter: Option<Arc<dyn Fn(&str) -> Option<String> + Send + Sync>>,
    pub extra_results: Vec<CandidateResult>,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            language: None,
            time_range: None,
            instruction: None,
            mode: Mode::Summary,
            depth: Depth::Default,
            max_per_domain: 2,
            max_fetch_urls: 8,
            content_limit: 4_000,
            min_score: 0.0,
            min_keep: 3,
            url_rewriter: None,
            extra_results: Vec::new(),
        }
    }
}

/// Preformatted rich-card content carries a `"**...**"` marker; the pipeline
/// treats it as authoritative and skips re-fetching that candidate's URL
/// (spec.md §9).
fn is_preformatted(snippet: &str) -> bool {
    snippet.contains("**Source:**") || snippet.contains("**")
}

fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").to_string();
    Some(host)
}

/// Keeps entries scoring at or above `min_score`, but never drops below
/// `min_keep` entries when the raw list has that many -- backfilled from the
/// highest-scoring entries that the threshold excluded (spec.md §4.7 step 7).
fn score_filter(mut results: Vec<CandidateResult>, min_score: f64, min_keep: usize) -> Vec<CandidateResult> {
    if min_score <= 0.0 {
        return results;
    }
    let floor = min_keep.min(results.len());
    let kept_count = results.iter().filter(|r| r.score >= min_score).count();
    if kept_count >= floor {
        results.retain(|r| r.score >= min_score);
        return results;
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(floor);
    results
}

fn url_dedup(results: Vec<CandidateResult>) -> Vec<CandidateResult> {
    let mut seen = std::collections::HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

fn domain_dedup(results: Vec<CandidateResult>, max_per_domain: usize) -> Vec<CandidateResult> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    results
        .into_iter()
        .filter(|r| {
            let host = host_of(&r.url).unwrap_or_default();
            let count = counts.entry(host).or_insert(0);
            if *count >= max_per_domain {
                false
            } else {
                *count += 1;
                true
            }
        })
        .collect()
}

fn depth_scaled(opts: &PipelineOpts) -> (usize, usize) {
    if opts.depth == Depth::Deep {
        let max_per_domain = opts.max_per_domain.max(3);
        let max_fetch_urls = ((opts.max_fetch_urls as f64) * 1.5).round() as usize;
        (max_per_domain, max_fetch_urls)
    } else {
        (opts.max_per_domain, opts.max_fetch_urls)
    }
}

pub struct Pipeline {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    direct_scrapers: Vec<Arc<dyn SourceAdapter>>,
    fetcher: Arc<dyn FetchBackend>,
    llm: Option<Arc<OpenAiCompatClient>>,
}

impl Pipeline {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        direct_scrapers: Vec<Arc<dyn SourceAdapter>>,
        fetcher: Arc<dyn FetchBackend>,
        llm: Option<Arc<OpenAiCompatClient>>,
    ) -> Self {
        Self {
            adapters,
            direct_scrapers,
            fetcher,
            llm,
        }
    }

    async fn call_adapters(
        &self,
        adapters: &[Arc<dyn SourceAdapter>],
        opts: &PipelineOpts,
        cancel: &CancellationToken,
    ) -> (Vec<CandidateResult>, Option<Error>) {
        let mut handles = Vec::new();
        for sub in &opts.queries {
            if sub.text.is_empty() {
                continue;
            }
            for adapter in adapters {
                let adapter = Arc::clone(adapter);
                let params = AdapterParams {
                    query: sub.text.clone(),
                    language: opts.language.clone(),
                    time_range: opts.time_range.clone(),
                    limit: None,
                };
                let cancel = cancel.clone();
                crate::metrics::global().incr("adapter_requests_total");
                handles.push(tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(Error::Cancelled),
                        r = adapter.fetch(&params) => r,
                    }
                }));
            }
        }

        let mut merged = Vec::new();
        let mut last_err = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(results)) => merged.extend(results),
                Ok(Err(e)) => {
                    crate::metrics::global().incr("adapter_failures_total");
                    last_err = Some(e);
                }
                Err(_join_err) => {}
            }
        }
        (merged, last_err)
    }

    async fn fetch_content(
        &self,
        candidates: &[CandidateResult],
        opts: &PipelineOpts,
        cancel: &CancellationToken,
    ) -> HashMap<String, String> {
        let mut handles = Vec::new();
        for c in candidates {
            if is_preformatted(&c.snippet) {
                continue;
            }
            let url = c.url.clone();
            let rewritten = opts
                .url_rewriter
                .as_ref()
                .and_then(|f| f(&url))
                .unwrap_or_else(|| url.clone());
            let fetcher = Arc::clone(&self.fetcher);
            let content_limit = opts.content_limit;
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let fetch_once = |target: String| {
                    let fetcher = Arc::clone(&fetcher);
                    async move {
                        let req = FetchRequest {
                            url: target,
                            timeout_ms: Some(15_000),
                            max_bytes: Some(4 * 1024 * 1024),
                            headers: Default::default(),
                            cache: FetchCachePolicy::default(),
                        };
                        fetcher.fetch(&req).await
                    }
                };

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (url, None),
                    r = fetch_once(rewritten.clone()) => r,
                };

                // spec.md §4.3: raw GitHub content 404s are frequently a
                // stale branch reference (main vs master) -- retry once with
                // the branch swapped before giving up.
                let result = match result {
                    Ok(resp) if resp.status == 404 => {
                        match crate::rewrite::github_raw_branch_swap_candidate(&rewritten) {
                            Some(swapped) => tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return (url, None),
                                r = fetch_once(swapped) => r,
                            },
                            None => Ok(resp),
                        }
                    }
                    other => other,
                };

                match result {
                    Ok(resp) if resp.status < 400 => {
                        let body = resp.text_lossy();
                        let extracted = if looks_raw(&resp.final_url) {
                            crate::extract::extract_raw(&body, content_limit)
                        } else {
                            crate::extract::extract(&body, content_limit)
                        };
                        (url, Some(extracted.text))
                    }
                    _ => (url, None),
                }
            }));
        }

        let mut map = HashMap::new();
        for handle in handles {
            if let Ok((url, Some(text))) = handle.await {
                map.insert(url, text);
            }
        }
        map
    }

    pub async fn run(
        &self,
        query: &str,
        opts: &PipelineOpts,
        cancel: &CancellationToken,
    ) -> Result<AnswerRecord> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        crate::metrics::global().incr("pipeline_runs_total");

        let (mut merged, search_err) = self.call_adapters(&self.adapters, opts, cancel).await;

        if !self.direct_scrapers.is_empty() {
            let (direct, _) = self.call_adapters(&self.direct_scrapers, opts, cancel).await;
            merged.extend(direct);
        }

        merged.extend(opts.extra_results.iter().cloned());

        if merged.is_empty() {
            if let Some(err) = search_err {
                return Err(err);
            }
            crate::metrics::global().incr("pipeline_no_results_total");
            return Ok(AnswerRecord::no_results(query));
        }

        let filtered = score_filter(merged, opts.min_score, opts.min_keep);
        let deduped = url_dedup(filtered);
        let (max_per_domain, max_fetch_urls) = depth_scaled(opts);
        let domain_deduped = domain_dedup(deduped, max_per_domain);
        let capped: Vec<CandidateResult> = domain_deduped.into_iter().take(max_fetch_urls).collect();

        let content_map = if opts.depth == Depth::Fast {
            HashMap::new()
        } else {
            self.fetch_content(&capped, opts, cancel).await
        };

        let sources_block = build_sources_block(&capped, &content_map, opts.content_limit);

        let (answer, facts) = match opts.mode {
            Mode::Raw => (sources_block, Vec::new()),
            Mode::Summary => self.synthesize(query, &sources_block, opts).await?,
        };

        let sources = capped
            .iter()
            .enumerate()
            .map(|(i, c)| SourceReference {
                index: i + 1,
                title: c.title.clone(),
                url: c.url.clone(),
                snippet: Some(c.snippet.clone()),
            })
            .collect();

        Ok(AnswerRecord {
            query: query.to_string(),
            answer,
            facts,
            sources,
        })
    }

    async fn synthesize(
        &self,
        query: &str,
        sources_block: &str,
        opts: &PipelineOpts,
    ) -> Result<(String, Vec<Fact>)> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("no LLM client configured".to_string()))?;

        let deep = opts.depth == Depth::Deep;
        let system = llm::synthesis_system_prompt(deep, opts.instruction.as_deref());
        let user = format!("Query: {query}\n\n{sources_block}");

        crate::metrics::global().incr("llm_requests_total");
        let raw = llm
            .chat_json(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .await
            .map_err(|e| {
                crate::metrics::global().incr("llm_failures_total");
                e
            })?;

        parse_synthesis_output(&raw)
    }
}

fn looks_raw(url: &str) -> bool {
    const RAW_HOSTS: &[&str] = &[
        "raw.githubusercontent.com",
        "gist.githubusercontent.com",
        "pastebin.com/raw",
    ];
    RAW_HOSTS.iter().any(|h| url.contains(h))
}

fn build_sources_block(
    candidates: &[CandidateResult],
    content_map: &HashMap<String, String>,
    content_limit: usize,
) -> String {
    let mut out = String::new();
    for (i, c) in candidates.iter().enumerate() {
        out.push_str(&format!("### [{}] {}\n", i + 1, c.title));
        out.push_str(&format!("Source: {}\n\n", c.url));
        if is_preformatted(&c.snippet) {
            out.push_str(&format!("Content: {}\n\n", c.snippet));
        } else if let Some(text) = content_map.get(&c.url) {
            out.push_str(&format!("Content: {text}\n\n"));
        } else {
            out.push_str(&format!("Snippet: {}\n\n", c.snippet));
        }
    }
    if content_limit > 0 && out.chars().count() > content_limit {
        out.chars().take(content_limit).collect()
    } else {
        out
    }
}

#[derive(Debug, serde::Deserialize)]
struct SynthesisOutput {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    facts: Vec<FactOutput>,
}

#[derive(Debug, serde::Deserialize)]
struct FactOutput {
    point: String,
    #[serde(default)]
    sources: Vec<usize>,
}

fn parse_synthesis_output(raw: &str) -> Result<(String, Vec<Fact>)> {
    let cleaned = llm::strip_code_fence(raw);
    if let Ok(parsed) = serde_json::from_str::<SynthesisOutput>(cleaned) {
        let facts = parsed
            .facts
            .into_iter()
            .map(|f| Fact {
                point: f.point,
                sources: f.sources,
            })
            .collect();
        return Ok((parsed.answer, facts));
    }

    let salvaged = llm::salvage_answer(raw);
    if !salvaged.is_empty() {
        Ok((salvaged, Vec::new()))
    } else {
        Ok((raw.to_string(), Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use websynth_core::FetchResponse;

    fn candidate(title: &str, url: &str, score: f64) -> CandidateResult {
        CandidateResult {
            title: title.to_string(),
            snippet: format!("snippet for {title}"),
            url: url.to_string(),
            score,
            source_id: "test".to_string(),
        }
    }

    #[test]
    fn url_dedup_keeps_first_occurrence() {
        let results = vec![
            candidate("A", "https://a.example", 1.0),
            candidate("A dup", "https://a.example", 0.5),
            candidate("B", "https://b.example", 1.0),
        ];
        let deduped = url_dedup(results);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "A");
    }

    #[test]
    fn domain_dedup_caps_per_host() {
        let results = vec![
            candidate("A1", "https://a.example/1", 1.0),
            candidate("A2", "https://a.example/2", 1.0),
            candidate("A3", "https://a.example/3", 1.0),
            candidate("B1", "https://b.example/1", 1.0),
        ];
        let deduped = domain_dedup(results, 2);
        let a_count = deduped.iter().filter(|r| r.url.contains("a.example")).count();
        assert_eq!(a_count, 2);
        assert_eq!(deduped.len(), 3);
    }

    #[test]
    fn deep_mode_scales_caps() {
        let opts = PipelineOpts {
            depth: Depth::Deep,
            max_per_domain: 2,
            max_fetch_urls: 8,
            ..Default::default()
        };
        let (max_per_domain, max_fetch_urls) = depth_scaled(&opts);
        assert_eq!(max_per_domain, 3);
        assert_eq!(max_fetch_urls, 12);
    }

    #[test]
    fn sources_block_uses_content_or_snippet_exclusively() {
        let candidates = vec![
            candidate("First", "https://a.example", 1.0),
            candidate("Second", "https://b.example", 1.0),
        ];
        let mut content_map = HashMap::new();
        content_map.insert("https://a.example".to_string(), "fetched body text".to_string());
        let block = build_sources_block(&candidates, &content_map, 0);

        let first_block = block.split("### [2]").next().unwrap();
        assert!(first_block.contains("Content: fetched body text"));
        assert!(!first_block.contains("Snippet:"));

        let second_block = &block[block.find("### [2]").unwrap()..];
        assert!(second_block.contains("Snippet: snippet for Second"));
        assert!(!second_block.contains("Content:"));
    }

    #[test]
    fn preformatted_snippet_is_used_as_content() {
        let mut c = candidate("Card", "https://a.example", 1.0);
        c.snippet = "**Source:** a.example | **Field:** value".to_string();
        let block = build_sources_block(&[c], &HashMap::new(), 0);
        assert!(block.contains("Content: **Source:**"));
    }

    #[test]
    fn parse_synthesis_output_handles_well_formed_json() {
        let raw = r#"{"answer":"hello","facts":[{"point":"a fact","sources":[1]}]}"#;
        let (answer, facts) = parse_synthesis_output(raw).unwrap();
        assert_eq!(answer, "hello");
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].sources, vec![1]);
    }

    #[test]
    fn parse_synthesis_output_salvages_malformed_json() {
        let raw = r#"{"answer": "use \"fmt.Println\" for output"#;
        let (answer, facts) = parse_synthesis_output(raw).unwrap();
        assert_eq!(answer, "use \"fmt.Println\" for output");
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn empty_adapter_results_yield_no_results_record() {
        struct EmptyAdapter;
        #[async_trait::async_trait]
        impl SourceAdapter for EmptyAdapter {
            fn id(&self) -> &'static str {
                "empty"
            }
            async fn fetch(&self, _params: &AdapterParams) -> Result<Vec<CandidateResult>> {
                Ok(Vec::new())
            }
        }
        struct DummyFetcher;
        #[async_trait::async_trait]
        impl FetchBackend for DummyFetcher {
            async fn fetch(&self, _req: &FetchRequest) -> Result<FetchResponse> {
                unreachable!("no content fetch expected")
            }
        }

        let pipeline = Pipeline::new(
            vec![Arc::new(EmptyAdapter)],
            Vec::new(),
            Arc::new(DummyFetcher),
            None,
        );
        let opts = PipelineOpts {
            queries: vec![SubQuery {
                text: "golang".to_string(),
                engines: None,
            }],
            ..Default::default()
        };
        let record = pipeline
            .run("golang", &opts, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.answer, "No results found.");
        assert!(record.sources.is_empty());
    }

    #[tokio::test]
    async fn raw_mode_skips_llm_and_returns_bundle() {
        struct OneResultAdapter;
        #[async_trait::async_trait]
        impl SourceAdapter for OneResultAdapter {
            fn id(&self) -> &'static str {
                "one"
            }
            async fn fetch(&self, _params: &AdapterParams) -> Result<Vec<CandidateResult>> {
                Ok(vec![candidate("Hit", "https://a.example", 1.0)])
            }
        }
        struct DummyFetcher;
        #[async_trait::async_trait]
        impl FetchBackend for DummyFetcher {
            async fn fetch(&self, _req: &FetchRequest) -> Result<FetchResponse> {
                unreachable!()
            }
        }

        let pipeline = Pipeline::new(
            vec![Arc::new(OneResultAdapter)],
            Vec::new(),
            Arc::new(DummyFetcher),
            None,
        );
        let opts = PipelineOpts {
            queries: vec![SubQuery {
                text: "golang".to_string(),
                engines: None,
            }],
            mode: Mode::Raw,
            depth: Depth::Fast,
            ..Default::default()
        };
        let record = pipeline
            .run("golang", &opts, &CancellationToken::new())
            .await
            .unwrap();
        assert!(record.answer.contains("### [1] Hit"));
        assert_eq!(record.sources.len(), 1);
        assert_eq!(record.sources[0].index, 1);
    }
}
