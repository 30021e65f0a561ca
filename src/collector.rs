//! Ingestion: pulls candidates from every configured source and stores the
//! usable ones as `pending` records.
//!
//! Sources are fetched one after another with a politeness pause in between.
//! Each fetch gets its own retry budget, and a source that still fails is
//! recorded as an error string without stopping the others.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::record::NewRecord;
use crate::retry::Backoff;
use crate::source::{FetchError, SourceFetcher, SourcePost};
use crate::store::ItemStore;

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub sources: Vec<String>,
    pub fetch_limit: usize,
    pub politeness_delay: Duration,
    pub backoff: Backoff,
}

/// Outcome of one collection run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectReport {
    pub success: bool,
    /// Records actually inserted.
    pub scraped: usize,
    pub inserted_ids: Vec<Uuid>,
    /// One entry per source that could not be fetched.
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollectReport {
    fn failed(error: String, errors: Vec<String>) -> Self {
        Self {
            success: false,
            scraped: 0,
            inserted_ids: Vec::new(),
            errors,
            warning: None,
            message: None,
            error: Some(error),
        }
    }
}

enum SourceOutcome {
    Fetched { source: String, posts: Vec<SourcePost> },
    Failed { source: String, error: String },
}

pub struct Collector<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    settings: CollectorSettings,
}

impl<S: ItemStore, F: SourceFetcher> Collector<S, F> {
    pub fn new(store: Arc<S>, fetcher: Arc<F>, settings: CollectorSettings) -> Self {
        Self {
            store,
            fetcher,
            settings,
        }
    }

    pub async fn collect(&self) -> CollectReport {
        info!(sources = self.settings.sources.len(), "collecting posts");

        let mut outcomes = Vec::with_capacity(self.settings.sources.len());
        for (i, source) in self.settings.sources.iter().enumerate() {
            if i > 0 {
                sleep(self.settings.politeness_delay).await;
            }
            outcomes.push(self.fetch_source(source).await);
        }

        let mut posts = Vec::new();
        let mut errors = Vec::new();
        let mut succeeded = 0;
        for outcome in outcomes {
            match outcome {
                SourceOutcome::Fetched {
                    source,
                    posts: fetched,
                } => {
                    debug!(source = %source, fetched = fetched.len(), "source contributed posts");
                    succeeded += 1;
                    posts.extend(fetched);
                }
                SourceOutcome::Failed { source, error } => {
                    debug!(source = %source, "source contributed an error");
                    errors.push(error);
                }
            }
        }

        if succeeded == 0 && !errors.is_empty() {
            error!(failed = errors.len(), "every source failed");
            return CollectReport::failed("All sources failed to scrape".to_string(), errors);
        }

        let records: Vec<NewRecord> = posts.iter().filter_map(normalize).collect();
        info!(
            fetched = posts.len(),
            kept = records.len(),
            "normalized candidates"
        );

        if records.is_empty() {
            return CollectReport {
                success: true,
                scraped: 0,
                inserted_ids: Vec::new(),
                warning: partial_warning(errors.len(), 0),
                errors,
                message: Some("No posts found".to_string()),
                error: None,
            };
        }

        match self.store.insert(records).await {
            Ok(inserted) => {
                let scraped = inserted.len();
                info!(inserted = scraped, failed_sources = errors.len(), "stored pending records");
                CollectReport {
                    success: true,
                    scraped,
                    inserted_ids: inserted.into_iter().map(|r| r.id).collect(),
                    warning: partial_warning(errors.len(), scraped),
                    errors,
                    message: None,
                    error: None,
                }
            }
            Err(err) => {
                error!(error = %err, "failed to store collected records");
                CollectReport::failed(format!("Failed to insert records: {err}"), errors)
            }
        }
    }

    async fn fetch_source(&self, source: &str) -> SourceOutcome {
        let fetcher = &*self.fetcher;
        let limit = self.settings.fetch_limit;
        let mut attempts = 1;

        let result = self
            .settings
            .backoff
            .run(
                || fetcher.fetch(source, limit),
                |attempt, err: &FetchError| {
                    attempts = attempt + 1;
                    info!(
                        source,
                        attempt,
                        transient = err.is_retryable(),
                        error = %err,
                        "retrying source fetch"
                    );
                },
            )
            .await;

        match result {
            Ok(posts) => {
                info!(source, fetched = posts.len(), "fetched source");
                SourceOutcome::Fetched {
                    source: source.to_string(),
                    posts,
                }
            }
            Err(err) => {
                let error = format!("Failed to fetch {source} after {attempts} attempt(s): {err}");
                warn!(source, %error, "giving up on source");
                SourceOutcome::Failed {
                    source: source.to_string(),
                    error,
                }
            }
        }
    }
}

fn normalize(post: &SourcePost) -> Option<NewRecord> {
    let record = NewRecord::from_post(&post.source, &post.title, &post.body);
    if record.is_none() {
        debug!(
            source = %post.source,
            author = %post.author,
            score = post.score,
            comments = post.num_comments,
            url = %post.url,
            "dropping candidate with too little content"
        );
    }
    record
}

fn partial_warning(failed_sources: usize, scraped: usize) -> Option<String> {
    (failed_sources > 0)
        .then(|| format!("{failed_sources} source(s) failed but {scraped} posts scraped"))
}
