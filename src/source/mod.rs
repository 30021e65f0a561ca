//! External sources of candidate posts.

mod error;
mod reddit;

pub use error::FetchError;
pub use reddit::{DEFAULT_BASE_URL as DEFAULT_REDDIT_URL, RedditClient};

/// A candidate item as fetched, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePost {
    /// Origin label stored on the record, e.g. `r/aviation`.
    pub source: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub author: String,
    pub score: i64,
    pub num_comments: u64,
}

pub trait SourceFetcher {
    /// Fetches up to `limit` candidates from the named source.
    async fn fetch(&self, source: &str, limit: usize) -> Result<Vec<SourcePost>, FetchError>;
}
