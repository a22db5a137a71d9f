use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchCachePolicy {
    /// If true, allow reading from cache.
    pub read: bool,
    /// If true, allow writing to cache.
    pub write: bool,
    /// If set, cached entries older than this are treated as a miss.
    pub ttl_s: Option<u64>,
}

impl Default for FetchCachePolicy {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            ttl_s: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the operation (network + processing).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    /// Optional headers to add (best-effort; adapter may drop unsafe headers).
    pub headers: BTreeMap<String, String>,
    pub cache: FetchCachePolicy,
}

impl FetchRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub source: FetchSource,
    pub timings_ms: BTreeMap<String, u128>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}

/// The `fetch(ctx, url, hint) -> body_bytes | error` contract shared by the
/// standard client and the TLS-fingerprint-mimicking client (spec §4.2).
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

/// How deep the pipeline should go for one query.
///
/// `Fast` skips content fetch entirely and synthesizes from snippets. `Deep`
/// widens the per-domain cap and fetch cap, and selects a richer prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depth {
    Fast,
    Default,
    Deep,
}

impl Default for Depth {
    fn default() -> Self {
        Depth::Default
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerShape {
    General,
    Fact,
    Comparison,
    List,
    HowTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainHint {
    General,
    Docs,
    CodeHostingRepo,
    LibraryDocs,
    WordPress,
    Jobs,
    Freelance,
    RemoteWork,
    Video,
    HuggingFace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub answer_shape: AnswerShape,
    pub domain_hint: DomainHint,
    pub library_id: Option<String>,
}

/// A user query plus the filters that narrow retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub language: Option<String>,
    pub time_range: Option<String>,
    pub depth: Depth,
    pub source_set: Option<String>,
}

/// A pre-synthesis search hit, as returned by one adapter.
///
/// `score` is adapter-local; cross-adapter comparability is not assumed (see
/// [`SourceAdapter`] for the contract adapters must satisfy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub score: f64,
    pub source_id: String,
}

/// Post-extraction plain text (or markdown) for one fetched URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedContent {
    pub url: String,
    pub title: String,
    pub text: String,
    pub truncated: bool,
}

/// A 1-based, contiguous, order-preserving citation slot in an [`AnswerRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub point: String,
    pub sources: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub query: String,
    pub answer: String,
    pub facts: Vec<Fact>,
    pub sources: Vec<SourceReference>,
}

impl AnswerRecord {
    pub fn no_results(query: &str) -> Self {
        Self {
            query: query.to_string(),
            answer: "No results found.".to_string(),
            facts: Vec::new(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_wait_ms: u64,
    pub max_wait_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_wait_ms: 200,
            max_wait_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn initial_wait(&self) -> Duration {
        Duration::from_millis(self.initial_wait_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Adapter-specific parameters for one retrieval call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterParams {
    pub query: String,
    pub language: Option<String>,
    pub time_range: Option<String>,
    pub limit: Option<usize>,
}

/// Every retrieval source (meta-search aggregator, direct scraper, vendor API)
/// implements this contract (spec §4.6):
/// - respect cancellation,
/// - compose with the retry engine for transient failures,
/// - return an empty list (not an error) on upstream "no results",
/// - set `score=1.0` when the adapter has no relevance signal,
/// - hold no state shared across calls.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> &'static str;
    async fn fetch(&self, params: &AdapterParams) -> Result<Vec<CandidateResult>>;
}
