//! Flat process-wide counter registry, rendered as newline-delimited
//! `name value` pairs (spec.md §6).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

pub struct Metrics {
    counters: BTreeMap<&'static str, AtomicU64>,
}

pub const COUNTER_NAMES: &[&str] = &[
    "cache_hits_total",
    "cache_misses_total",
    "fetch_requests_total",
    "fetch_failures_total",
    "adapter_requests_total",
    "adapter_failures_total",
    "llm_requests_total",
    "llm_failures_total",
    "pipeline_runs_total",
    "pipeline_no_results_total",
];

impl Metrics {
    fn new() -> Self {
        let mut counters = BTreeMap::new();
        for name in COUNTER_NAMES {
            counters.insert(*name, AtomicU64::new(0));
        }
        Self { counters }
    }

    pub fn incr(&self, name: &str) {
        if let Some(c) = self.counters.get(name) {
            c.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, counter) in &self.counters {
            out.push_str(name);
            out.push(' ');
            out.push_str(&counter.load(Ordering::Relaxed).to_string());
            out.push('\n');
        }
        out
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn global() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
