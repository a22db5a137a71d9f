//! Two HTTP client variants sharing the `FetchBackend` contract (spec.md §4.2):
//! a standard client that rotates a `User-Agent` per request, and a
//! best-effort "browser-shaped" client that holds one fixed browser identity
//! so its fingerprint stays consistent across requests.
//!
//! Grounded on `LocalFetcher` (connection pool, redirect policy, timeouts,
//! gzip, header-forwarding safety defaults). True JA3 ClientHello mimicry is
//! out of reach of `reqwest` alone; the fingerprint client only fixes header
//! order and a single `User-Agent`.
//!
//! Both variants always compose with the retry engine (spec.md §4.1/§4.2):
//! network-level failures and transient HTTP statuses (429/5xx) are retried
//! per `RetryPolicy::default()` before `fetch` returns.

use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use websynth_core::{Error, FetchBackend, FetchRequest, FetchResponse, FetchSource, Result, RetryPolicy};

use crate::retry::{retry, status_is_transient, Classify, RetryError, Transience};

/// The two ways a single fetch attempt can fail to produce a final response:
/// a transient status code (worth retrying) or a transport-level error.
enum FetchAttempt {
    TransientStatus(FetchResponse),
    Upstream(Error),
}

struct FetchAttemptClassifier;

impl Classify<FetchAttempt> for FetchAttemptClassifier {
    fn classify(&self, err: &FetchAttempt) -> Transience {
        match err {
            FetchAttempt::TransientStatus(_) => Transience::Transient,
            FetchAttempt::Upstream(Error::InvalidUrl(_)) => Transience::Permanent,
            FetchAttempt::Upstream(_) => Transience::Transient,
        }
    }
}

/// Runs `do_fetch` under the retry engine, folding a transient HTTP status
/// back into `Ok` once retries are exhausted (the caller sees the response,
/// not an error -- status is conveyed via `FetchResponse.status`).
async fn fetch_with_retry<F, Fut>(do_fetch: F) -> Result<FetchResponse>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
{
    let policy = RetryPolicy::default();
    let cancel = CancellationToken::new();

    let outcome = retry(&policy, &cancel, &FetchAttemptClassifier, || {
        let fut = do_fetch();
        async move {
            match fut.await {
                Ok(resp) if status_is_transient(resp.status) => {
                    Err(FetchAttempt::TransientStatus(resp))
                }
                Ok(resp) => Ok(resp),
                Err(e) => Err(FetchAttempt::Upstream(e)),
            }
        }
    })
    .await;

    match outcome {
        Ok(resp) => Ok(resp),
        Err(RetryError::Cancelled) => Err(Error::Cancelled),
        Err(RetryError::Failed(FetchAttempt::Upstream(e))) => Err(e),
        Err(RetryError::Failed(FetchAttempt::TransientStatus(resp))) => Ok(resp),
    }
}

fn allow_unsafe_request_headers() -> bool {
    matches!(
        std::env::var("WEBSYNTH_ALLOW_UNSAFE_HEADERS")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn is_sensitive_request_header(name: &reqwest::header::HeaderName) -> bool {
    matches!(
        name.as_str(),
        "authorization" | "cookie" | "proxy-authorization"
    )
}

fn apply_headers(
    mut rb: reqwest::RequestBuilder,
    headers: &BTreeMap<String, String>,
    order: &[&str],
) -> reqwest::RequestBuilder {
    let allow_unsafe = allow_unsafe_request_headers();
    // Deterministic ordering for the fingerprint client: emit known keys first,
    // in `order`, then everything else in map order.
    let mut remaining: Vec<(&String, &String)> = headers.iter().collect();
    for key in order {
        if let Some(pos) = remaining.iter().position(|(k, _)| k.eq_ignore_ascii_case(key)) {
            let (k, v) = remaining.remove(pos);
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                if allow_unsafe || !is_sensitive_request_header(&name) {
                    rb = rb.header(name, value);
                }
            }
        }
    }
    for (k, v) in remaining {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(k.as_bytes()),
            reqwest::header::HeaderValue::from_str(v),
        ) {
            if allow_unsafe || !is_sensitive_request_header(&name) {
                rb = rb.header(name, value);
            }
        }
    }
    rb
}

async fn stream_body(
    resp: reqwest::Response,
    max_bytes: Option<u64>,
) -> Result<(Vec<u8>, bool)> {
    let max_bytes = max_bytes.unwrap_or(u64::MAX) as usize;
    let mut truncated = false;
    let mut bytes = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
        if bytes.len().saturating_add(chunk.len()) > max_bytes {
            let can_take = max_bytes.saturating_sub(bytes.len());
            bytes.extend_from_slice(&chunk[..can_take]);
            truncated = true;
            break;
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok((bytes, truncated))
}

/// The standard, well-behaved client: one reusable connection pool, bounded
/// idle sockets, total request deadline, redirect depth <= 10, gzip.
#[derive(Debug, Clone)]
pub struct StandardFetcher {
    client: reqwest::Client,
}

impl StandardFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    async fn do_fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        crate::metrics::global().incr("fetch_requests_total");
        let mut timings_ms = BTreeMap::new();
        let t0 = std::time::Instant::now();

        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        let mut headers = req.headers.clone();
        headers
            .entry("user-agent".to_string())
            .or_insert_with(|| random_user_agent().to_string());
        rb = apply_headers(rb, &headers, &[]);
        let resp = rb.send().await.map_err(|e| {
            crate::metrics::global().incr("fetch_failures_total");
            Error::Fetch(e.to_string())
        })?;

        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let mut resp_headers = BTreeMap::new();
        for (k, v) in resp.headers().iter() {
            if let Ok(s) = v.to_str() {
                resp_headers.insert(k.as_str().to_string(), s.to_string());
            }
        }

        let (bytes, truncated) = stream_body(resp, req.max_bytes).await.map_err(|e| {
            crate::metrics::global().incr("fetch_failures_total");
            e
        })?;
        timings_ms.insert("network_fetch".to_string(), t0.elapsed().as_millis());

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            content_type,
            headers: resp_headers,
            bytes,
            truncated,
            source: FetchSource::Network,
            timings_ms,
        })
    }
}

#[async_trait::async_trait]
impl FetchBackend for StandardFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        fetch_with_retry(|| self.do_fetch(req)).await
    }
}

/// Best-effort "browser-shaped" client: fixed header order + a small rotating
/// `User-Agent` pool. NOT a byte-level JA3/ClientHello match -- `reqwest`
/// alone cannot do that. Use only where a standard client is blocked.
#[derive(Debug, Clone)]
pub struct FingerprintFetcher {
    client: reqwest::Client,
}

const HEADER_ORDER: &[&str] = &[
    "accept",
    "accept-language",
    "accept-encoding",
    "referer",
    "cookie",
    "user-agent",
];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS[fastrand::usize(..USER_AGENTS.len())]
}

/// The one browser identity `FingerprintFetcher` presents on every request.
/// Rotating this per-call would defeat the point of a consistent fingerprint.
const FINGERPRINT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

impl FingerprintFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    async fn do_fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        crate::metrics::global().incr("fetch_requests_total");
        let mut timings_ms = BTreeMap::new();
        let t0 = std::time::Instant::now();

        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        let mut headers = req.headers.clone();
        headers
            .entry("accept".to_string())
            .or_insert_with(|| "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string());
        headers
            .entry("accept-language".to_string())
            .or_insert_with(|| "en-US,en;q=0.9".to_string());
        headers
            .entry("accept-encoding".to_string())
            .or_insert_with(|| "gzip, deflate, br".to_string());
        headers
            .entry("user-agent".to_string())
            .or_insert_with(|| FINGERPRINT_USER_AGENT.to_string());

        rb = apply_headers(rb, &headers, HEADER_ORDER);
        let resp = rb.send().await.map_err(|e| {
            crate::metrics::global().incr("fetch_failures_total");
            Error::Fetch(e.to_string())
        })?;

        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let mut resp_headers = BTreeMap::new();
        for (k, v) in resp.headers().iter() {
            if let Ok(s) = v.to_str() {
                resp_headers.insert(k.as_str().to_string(), s.to_string());
            }
        }

        let (bytes, truncated) = stream_body(resp, req.max_bytes).await.map_err(|e| {
            crate::metrics::global().incr("fetch_failures_total");
            e
        })?;
        timings_ms.insert("network_fetch".to_string(), t0.elapsed().as_millis());

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            content_type,
            headers: resp_headers,
            bytes,
            truncated,
            source: FetchSource::Network,
            timings_ms,
        })
    }
}

#[async_trait::async_trait]
impl FetchBackend for FingerprintFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        fetch_with_retry(|| self.do_fetch(req)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;
    use websynth_core::FetchCachePolicy;

    #[tokio::test]
    async fn standard_fetcher_fetches_body() {
        let app = Router::new().route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hello") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fetcher = StandardFetcher::new().unwrap();
        let req = FetchRequest {
            url: format!("http://{}/", addr),
            timeout_ms: Some(2_000),
            max_bytes: Some(1_000_000),
            headers: BTreeMap::new(),
            cache: FetchCachePolicy::default(),
        };
        let resp = fetcher.fetch(&req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text_lossy(), "hello");
        assert_eq!(resp.source, FetchSource::Network);
    }

    #[tokio::test]
    async fn standard_fetcher_drops_sensitive_headers_by_default() {
        std::env::remove_var("WEBSYNTH_ALLOW_UNSAFE_HEADERS");
        let app = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                if headers.contains_key(header::AUTHORIZATION) {
                    return (StatusCode::BAD_REQUEST, "leaked".to_string());
                }
                (StatusCode::OK, "ok".to_string())
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fetcher = StandardFetcher::new().unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer secret".to_string());
        let req = FetchRequest {
            url: format!("http://{}/", addr),
            timeout_ms: Some(2_000),
            max_bytes: Some(1_000_000),
            headers,
            cache: FetchCachePolicy::default(),
        };
        let resp = fetcher.fetch(&req).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn fingerprint_fetcher_sets_default_browser_headers() {
        let app = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                let ua = headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                (StatusCode::OK, format!("ua={ua}"))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fetcher = FingerprintFetcher::new().unwrap();
        let req = FetchRequest {
            url: format!("http://{}/", addr),
            timeout_ms: Some(2_000),
            max_bytes: Some(1_000_000),
            headers: BTreeMap::new(),
            cache: FetchCachePolicy::default(),
        };
        let resp = fetcher.fetch(&req).await.unwrap();
        assert!(resp.text_lossy().contains("Mozilla"));
    }

    #[test]
    fn random_user_agent_is_always_in_the_pool() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }
}
