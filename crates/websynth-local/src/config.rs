//! Process configuration, read once from the environment and passed around
//! explicitly rather than read ad hoc from deep call sites (spec.md §9:
//! avoid implicit global mutable config).

use std::sync::Arc;
use std::time::Duration;
use websynth_core::{Error, FetchBackend, Result};

use crate::adapters::{DuckDuckGoAdapter, GitHubCodeAdapter, HuggingFaceAdapter, JobBoardAdapter, SearxngAdapter, StartpageAdapter, VideoAdapter};
use crate::cache::TieredCache;
use crate::httpfetch::{FingerprintFetcher, StandardFetcher};
use crate::llm::OpenAiCompatClient;

#[cfg(feature = "redis-tier")]
use crate::cache::RedisTier;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub searx_url: Option<String>,
    pub llm_api_base: Option<String>,
    pub llm_api_key: String,
    pub llm_api_key_fallbacks: Vec<String>,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub max_fetch_urls: usize,
    pub max_content_chars: usize,
    pub fetch_timeout: Duration,
    pub github_token: Option<String>,
    pub github_search_repos: Option<String>,
    pub huggingface_token: Option<String>,
    pub youtube_api_key: Option<String>,
    pub youtube_api_key_fallback: Option<String>,
    pub redis_url: Option<String>,
    pub cache_max_entries: usize,
    pub cache_cleanup_interval: Duration,
    pub cache_ttl: Duration,
    pub direct_ddg: bool,
    pub direct_startpage: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let llm_api_key_fallbacks = std::env::var("LLM_API_KEY_FALLBACKS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            searx_url: std::env::var("SEARX_URL").ok(),
            llm_api_base: std::env::var("LLM_API_BASE").ok(),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            llm_api_key_fallbacks,
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_temperature: env_f32("LLM_TEMPERATURE", 0.2),
            llm_max_tokens: env_u64("LLM_MAX_TOKENS", 1024) as u32,
            max_fetch_urls: env_usize("MAX_FETCH_URLS", 8),
            max_content_chars: env_usize("MAX_CONTENT_CHARS", 4_000),
            fetch_timeout: Duration::from_secs(env_u64("FETCH_TIMEOUT", 30)),
            github_token: std::env::var("GITHUB_TOKEN").ok(),
            github_search_repos: std::env::var("GITHUB_SEARCH_REPOS").ok(),
            huggingface_token: std::env::var("HUGGINGFACE_TOKEN").ok(),
            youtube_api_key: std::env::var("YOUTUBE_API_KEY").ok(),
            youtube_api_key_fallback: std::env::var("YOUTUBE_API_KEY_FALLBACK").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
            cache_max_entries: env_usize("CACHE_MAX_ENTRIES", 10_000),
            cache_cleanup_interval: Duration::from_secs(env_u64("CACHE_CLEANUP_INTERVAL", 300)),
            cache_ttl: Duration::from_secs(env_u64("CACHE_TTL", 3_600)),
            direct_ddg: env_bool("DIRECT_DDG", false),
            direct_startpage: env_bool("DIRECT_STARTPAGE", false),
        })
    }
}

/// The set of live, wired-up components a pipeline run needs, built once
/// from [`Config`] and injected explicitly (no ambient globals besides the
/// process-wide metrics registry).
pub struct Services {
    pub config: Config,
    pub standard_fetcher: Arc<dyn FetchBackend>,
    pub fingerprint_fetcher: Arc<dyn FetchBackend>,
    pub cache: Arc<TieredCache>,
    pub llm: Option<Arc<OpenAiCompatClient>>,
    pub adapters: Vec<Arc<dyn websynth_core::SourceAdapter>>,
    /// Direct-scrape engines (spec.md §4.7 step 4), merged into a pipeline
    /// run concurrently with the meta-search adapters rather than as one of
    /// them.
    pub direct_scrapers: Vec<Arc<dyn websynth_core::SourceAdapter>>,
}

impl Services {
    pub async fn build(config: Config) -> Result<Self> {
        let standard_fetcher: Arc<dyn FetchBackend> = Arc::new(StandardFetcher::new()?);
        let fingerprint_fetcher: Arc<dyn FetchBackend> = Arc::new(FingerprintFetcher::new()?);
        let remote_cache = Self::connect_remote_cache(&config).await;
        let cache = Arc::new(TieredCache::new(config.cache_max_entries, config.cache_ttl, remote_cache));
        cache.spawn_sweep(config.cache_cleanup_interval);

        let llm = config
            .llm_api_base
            .as_ref()
            .map(|base| Arc::new(OpenAiCompatClient::new(base.clone(), config.llm_api_key.clone(), config.llm_model.clone())));

        let mut adapters: Vec<Arc<dyn websynth_core::SourceAdapter>> = Vec::new();
        if let Some(searx_url) = &config.searx_url {
            adapters.push(Arc::new(SearxngAdapter::new(searx_url.clone(), Arc::clone(&standard_fetcher))));
        } else if config.direct_ddg || config.direct_startpage {
            // no meta-search configured; direct scrapers below substitute.
        } else {
            return Err(Error::NotConfigured(
                "no search source configured: set SEARX_URL or a DIRECT_* flag".to_string(),
            ));
        }

        let mut direct_scrapers: Vec<Arc<dyn websynth_core::SourceAdapter>> = Vec::new();
        if config.direct_ddg {
            direct_scrapers.push(Arc::new(DuckDuckGoAdapter::new(Arc::clone(&fingerprint_fetcher))));
        }
        if config.direct_startpage {
            direct_scrapers.push(Arc::new(StartpageAdapter::new(Arc::clone(&fingerprint_fetcher))));
        }

        adapters.push(Arc::new(GitHubCodeAdapter::new(Arc::clone(&standard_fetcher))));
        adapters.push(Arc::new(HuggingFaceAdapter::new(Arc::clone(&standard_fetcher))));
        adapters.push(Arc::new(JobBoardAdapter::new(Arc::clone(&standard_fetcher))));
        adapters.push(Arc::new(VideoAdapter::new(Arc::clone(&standard_fetcher))));

        Ok(Self {
            config,
            standard_fetcher,
            fingerprint_fetcher,
            cache,
            llm,
            adapters,
            direct_scrapers,
        })
    }

    #[cfg(feature = "redis-tier")]
    async fn connect_remote_cache(config: &Config) -> Option<Arc<dyn crate::cache::RemoteCacheTier>> {
        let url = config.redis_url.as_ref()?;
        let tier = RedisTier::connect(url, Duration::from_secs(3)).await?;
        Some(Arc::new(tier) as Arc<dyn crate::cache::RemoteCacheTier>)
    }

    #[cfg(not(feature = "redis-tier"))]
    async fn connect_remote_cache(_config: &Config) -> Option<Arc<dyn crate::cache::RemoteCacheTier>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in [
            "MAX_FETCH_URLS",
            "MAX_CONTENT_CHARS",
            "FETCH_TIMEOUT",
            "CACHE_MAX_ENTRIES",
        ] {
            std::env::remove_var(key);
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.max_fetch_urls, 8);
        assert_eq!(cfg.max_content_chars, 4_000);
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(30));
        assert_eq!(cfg.cache_max_entries, 10_000);
    }

    #[test]
    fn parses_fallback_key_list() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("LLM_API_KEY_FALLBACKS", "a, b ,, c");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.llm_api_key_fallbacks, vec!["a", "b", "c"]);
        std::env::remove_var("LLM_API_KEY_FALLBACKS");
    }
}
