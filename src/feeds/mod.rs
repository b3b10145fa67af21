//! Feed acquisition: parsing, single-source fetching and the concurrent
//! orchestrator that fills the per-run [`crate::models::Buckets`].

pub mod fetcher;
pub mod orchestrator;
pub mod parser;

pub use fetcher::{FeedFetcher, FeedTransport, FetchConfig, FetchError, HttpTransport};
pub use orchestrator::{Orchestrator, SourceFailure};
