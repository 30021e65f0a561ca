use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::classifier::{AnalyzeMode, BatchClassifier, ClassifyReport};
use crate::collector::{CollectReport, Collector};
use crate::config::PulseConfig;
use crate::error::PulseError;
use crate::health::{self, HealthSnapshot};
use crate::llm::{ChatClient, CompletionSender};
use crate::source::{RedditClient, SourceFetcher};
use crate::store::{ItemStore, JsonStore, StoreError};

/// Stage of a pipeline run, used to report which one failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    Scrape,
    Analyze,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<PipelineStep>,
    pub scrape: CollectReport,
    /// Absent when the run stopped after scraping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyze: Option<ClassifyReport>,
    pub scraped: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub summary: String,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub success: bool,
    pub deleted: usize,
    pub message: String,
}

/// Wires the collector, the classifier and the store together.
///
/// Every collaborator is handed in at construction; nothing here reaches
/// for global state.
pub struct Pipeline<S, F, C> {
    store: Arc<S>,
    collector: Collector<S, F>,
    classifier: BatchClassifier<S, C>,
    settle_delay: Duration,
}

impl Pipeline<JsonStore, RedditClient, ChatClient> {
    /// Builds the production pipeline: a JSON file store, the Reddit listing
    /// client and an OpenAI-compatible chat client.
    pub async fn from_config(config: &PulseConfig) -> Result<Self, PulseError> {
        let store = JsonStore::open(&config.store_path).await?;
        debug!(store = ?store.path(), model = %config.model, "pipeline configured");
        let fetcher = RedditClient::new(&config.reddit_base_url)?;
        let client = ChatClient::new(config.api_key.clone(), &config.api_base_url)?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(fetcher),
            Arc::new(client),
            config,
        ))
    }
}

impl<S: ItemStore, F: SourceFetcher, C: CompletionSender> Pipeline<S, F, C> {
    pub fn new(store: Arc<S>, fetcher: Arc<F>, client: Arc<C>, config: &PulseConfig) -> Self {
        Self {
            collector: Collector::new(store.clone(), fetcher, config.collector_settings()),
            classifier: BatchClassifier::new(store.clone(), client, config.classifier_settings()),
            store,
            settle_delay: config.settle_delay(),
        }
    }

    /// Scrapes, waits for the store to settle, then classifies pending
    /// records. A failed scrape stops the run before classification.
    pub async fn run(&self) -> PipelineReport {
        info!("pipeline run started");
        let scrape = self.scrape().await;
        let mut warnings: Vec<String> = scrape.warning.iter().cloned().collect();

        if !scrape.success {
            let error = format!(
                "Scrape step failed: {}",
                scrape.error.as_deref().unwrap_or("unknown error")
            );
            error!(%error, "pipeline stopped before analysis");
            return PipelineReport {
                success: false,
                failed_step: Some(PipelineStep::Scrape),
                scraped: scrape.scraped,
                analyzed: 0,
                failed: 0,
                summary: summary(scrape.scraped, 0),
                scrape,
                analyze: None,
                warnings,
                error: Some(error),
            };
        }

        info!(delay_ms = self.settle_delay.as_millis() as u64, "waiting for store to settle");
        sleep(self.settle_delay).await;

        let analyze = self.analyze_or_report(AnalyzeMode::Normal).await;
        if analyze.success && analyze.failed > 0 {
            warnings.push(format!("{} record(s) failed analysis", analyze.failed));
        }

        let (failed_step, error) = if analyze.success {
            (None, None)
        } else {
            let error = format!(
                "Analyze step failed: {}",
                analyze.error.as_deref().unwrap_or("unknown error")
            );
            error!(%error, scraped = scrape.scraped, "pipeline analysis failed");
            (Some(PipelineStep::Analyze), Some(error))
        };

        info!(
            scraped = scrape.scraped,
            analyzed = analyze.analyzed,
            failed = analyze.failed,
            "pipeline run finished"
        );
        PipelineReport {
            success: analyze.success,
            failed_step,
            scraped: scrape.scraped,
            analyzed: analyze.analyzed,
            failed: analyze.failed,
            summary: summary(scrape.scraped, analyze.analyzed),
            scrape,
            analyze: Some(analyze),
            warnings,
            error,
        }
    }

    pub async fn scrape(&self) -> CollectReport {
        self.collector.collect().await
    }

    pub async fn analyze(&self, mode: AnalyzeMode) -> Result<ClassifyReport, StoreError> {
        self.classifier.run(mode).await
    }

    /// Same as [`analyze`](Self::analyze), folding a store failure into a
    /// failed report.
    async fn analyze_or_report(&self, mode: AnalyzeMode) -> ClassifyReport {
        match self.analyze(mode).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "classifier could not use the store");
                ClassifyReport {
                    success: false,
                    target: mode.target_status(),
                    analyzed: 0,
                    failed: 0,
                    total: 0,
                    message: None,
                    error: Some(format!("Store error: {err}")),
                }
            }
        }
    }

    /// Removes every record unconditionally.
    pub async fn clear(&self) -> Result<ClearReport, StoreError> {
        let deleted = self.store.delete_all().await?;
        warn!(deleted, "cleared all records");
        Ok(ClearReport {
            success: true,
            deleted,
            message: format!("Deleted {deleted} records"),
        })
    }

    pub async fn health(&self) -> Result<HealthSnapshot, StoreError> {
        health::snapshot(&*self.store).await
    }
}

fn summary(scraped: usize, analyzed: usize) -> String {
    format!("Scraped {scraped} posts, analyzed {analyzed} successfully")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use tokio::time::Instant;

    use crate::health::HealthVerdict;
    use crate::llm::types::ChatResponse;
    use crate::llm::{ChatRequest, LlmError};
    use crate::record::RecordStatus;
    use crate::source::{FetchError, SourcePost};
    use crate::store::RecordFilter;

    struct MockFetcher {
        responses: HashMap<String, Result<Vec<SourcePost>, u16>>,
    }

    impl SourceFetcher for MockFetcher {
        async fn fetch(&self, source: &str, _limit: usize) -> Result<Vec<SourcePost>, FetchError> {
            match self.responses.get(source) {
                Some(Ok(posts)) => Ok(posts.clone()),
                Some(Err(status)) => Err(FetchError::Status { status: *status }),
                None => Ok(Vec::new()),
            }
        }
    }

    /// Answers every batch with `sentiment` for each post in the prompt, or
    /// fails with `status`.
    struct MockClient {
        reply: Result<&'static str, u16>,
        calls: Mutex<usize>,
    }

    impl MockClient {
        fn ok(sentiment: &'static str) -> Self {
            Self {
                reply: Ok(sentiment),
                calls: Mutex::new(0),
            }
        }

        fn err(status: u16) -> Self {
            Self {
                reply: Err(status),
                calls: Mutex::new(0),
            }
        }
    }

    impl CompletionSender for MockClient {
        async fn send_chat(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let sentiment = match self.reply {
                Ok(sentiment) => sentiment,
                Err(status) => {
                    return Err(LlmError::ApiError {
                        status,
                        message: "mock error".into(),
                    });
                }
            };
            let posts = req.messages[1].content.matches("\n---").count();
            let analyses: Vec<serde_json::Value> = (0..posts)
                .map(|_| serde_json::json!({"sentiment": sentiment, "summary": "A post."}))
                .collect();
            let content = serde_json::json!({ "analyses": analyses }).to_string();
            Ok(serde_json::from_value(serde_json::json!({
                "id": "mock",
                "model": "mock",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            }))
            .unwrap())
        }
    }

    fn post(source: &str, title: &str) -> SourcePost {
        SourcePost {
            source: format!("r/{source}"),
            title: title.into(),
            body: String::new(),
            url: String::new(),
            author: "someone".into(),
            score: 1,
            num_comments: 0,
        }
    }

    fn config(sources: &[&str]) -> PulseConfig {
        PulseConfig {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            ..PulseConfig::default()
        }
    }

    fn pipeline(
        responses: Vec<(&str, Result<Vec<SourcePost>, u16>)>,
        client: MockClient,
    ) -> (Pipeline<JsonStore, MockFetcher, MockClient>, Arc<JsonStore>, Arc<MockClient>) {
        let names: Vec<&str> = responses.iter().map(|(name, _)| *name).collect();
        let config = config(&names);
        let fetcher = MockFetcher {
            responses: responses
                .into_iter()
                .map(|(name, r)| (name.to_string(), r))
                .collect(),
        };
        let store = Arc::new(JsonStore::in_memory());
        let client = Arc::new(client);
        let pipeline = Pipeline::new(store.clone(), Arc::new(fetcher), client.clone(), &config);
        (pipeline, store, client)
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_scrapes_then_analyzes() {
        let (pipeline, store, client) = pipeline(
            vec![
                ("aviation", Ok(vec![post("aviation", "Sunset approach into SFO")])),
                ("hoggit", Ok(vec![post("hoggit", "New campaign released today")])),
            ],
            MockClient::ok("positive"),
        );

        let started = Instant::now();
        let report = pipeline.run().await;

        assert!(report.success);
        assert!(report.failed_step.is_none());
        assert_eq!((report.scraped, report.analyzed, report.failed), (2, 2, 0));
        assert_eq!(report.summary, "Scraped 2 posts, analyzed 2 successfully");
        assert!(report.warnings.is_empty());
        assert_eq!(*client.calls.lock().unwrap(), 1);
        // One politeness pause between the two sources plus the settle delay.
        assert_eq!(started.elapsed().as_millis(), 3000);

        let records = store.select(&RecordFilter::all(), None).await.unwrap();
        assert!(records.iter().all(|r| r.status == RecordStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn scrape_failure_skips_analysis() {
        let (pipeline, store, client) = pipeline(
            vec![("aviation", Err(404)), ("hoggit", Err(403))],
            MockClient::ok("neutral"),
        );

        let report = pipeline.run().await;

        assert!(!report.success);
        assert_eq!(report.failed_step, Some(PipelineStep::Scrape));
        assert!(report.analyze.is_none());
        assert_eq!(report.scrape.errors.len(), 2);
        assert!(report
            .error
            .as_deref()
            .unwrap()
            .contains("All sources failed to scrape"));
        assert_eq!(*client.calls.lock().unwrap(), 0);
        assert!(store.select(&RecordFilter::all(), None).await.unwrap().is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed_step"], "scrape");
        assert!(json.get("analyze").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn analysis_failure_keeps_scrape_outcome() {
        let (pipeline, store, _client) = pipeline(
            vec![("aviation", Ok(vec![post("aviation", "Formation flight over the bay")]))],
            MockClient::err(401),
        );

        let report = pipeline.run().await;

        assert!(!report.success);
        assert_eq!(report.failed_step, Some(PipelineStep::Analyze));
        assert!(report.scrape.success);
        assert_eq!(report.scraped, 1);
        assert_eq!(report.failed, 1);
        assert!(report.error.as_deref().unwrap().starts_with("Analyze step failed"));

        let failed = store
            .select(&RecordFilter::with_status(RecordStatus::Failed), None)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_scrape_failure_is_a_warning() {
        let (pipeline, _store, _client) = pipeline(
            vec![
                ("aviation", Ok(vec![post("aviation", "Gear down and locked")])),
                ("hoggit", Err(404)),
            ],
            MockClient::ok("neutral"),
        );

        let report = pipeline.run().await;

        assert!(report.success);
        assert_eq!(
            report.warnings,
            vec!["1 source(s) failed but 1 posts scraped".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_run_reprocesses_failed_records() {
        let (pipeline, store, _client) = pipeline(
            vec![("aviation", Ok(vec![post("aviation", "Tower, request taxi")]))],
            MockClient::err(401),
        );
        pipeline.run().await;

        // Same store, a classifier that now works.
        let config = config(&["aviation"]);
        let healthy = Pipeline::new(
            store.clone(),
            Arc::new(MockFetcher {
                responses: HashMap::new(),
            }),
            Arc::new(MockClient::ok("positive")),
            &config,
        );
        let report = healthy.analyze(AnalyzeMode::Retry).await.unwrap();

        assert_eq!((report.analyzed, report.total), (1, 1));
        let records = store.select(&RecordFilter::all(), None).await.unwrap();
        assert_eq!(records[0].status, RecordStatus::Completed);
        assert!(records[0].error_message.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_and_health() {
        let (pipeline, _store, _client) = pipeline(
            vec![("aviation", Ok(vec![post("aviation", "Blue Angels practice today")]))],
            MockClient::ok("positive"),
        );
        pipeline.run().await;

        let health = pipeline.health().await.unwrap();
        assert_eq!(health.status, HealthVerdict::Healthy);
        assert_eq!(health.counts.completed, 1);

        let cleared = pipeline.clear().await.unwrap();
        assert_eq!(cleared.deleted, 1);
        assert_eq!(cleared.message, "Deleted 1 records");

        let health = pipeline.health().await.unwrap();
        assert_eq!(health.status, HealthVerdict::Idle);
    }
}
