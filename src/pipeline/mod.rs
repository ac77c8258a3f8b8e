//! Fetch side of a monitoring cycle: spaced and retried single-value fetches,
//! all-or-nothing aggregation into a [`Sample`](crate::model::Sample), and the
//! novelty check against the last accepted sample.

mod aggregator;
mod fetcher;
mod filter;

pub use aggregator::SampleAggregator;
pub use fetcher::RateLimitedFetcher;
pub use filter::is_novel;
