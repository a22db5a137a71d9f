//! Retrieval sources: a meta-search aggregator, direct scrapers used as a
//! fallback, and thin vendor-specific adapters (spec.md §4.6).

pub mod meta_search;
pub mod scrapers;
pub mod vendor;

pub use meta_search::SearxngAdapter;
pub use scrapers::{DuckDuckGoAdapter, StartpageAdapter};
pub use vendor::{GitHubCodeAdapter, HuggingFaceAdapter, JobBoardAdapter, VideoAdapter};
