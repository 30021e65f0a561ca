//! Batch classification of stored records.
//!
//! One run selects up to `batch_size` records in the target status, claims
//! them all with a single bulk write, and sends one combined request asking
//! for one result per record in input order. Results are matched back to
//! records by position. Missing or malformed entries fall back to a neutral
//! "Analysis unavailable" result instead of failing the batch.
//!
//! Records stuck in `processing` after a crash between the claim and the
//! reconciliation are not reclaimed automatically.

use std::iter;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::llm::{ChatMessage, ChatRequest, CompletionSender, LlmError, ResponseFormat};
use crate::record::{Analysis, ItemRecord, RecordPatch, RecordStatus};
use crate::retry::Backoff;
use crate::store::{ItemStore, RecordFilter, StoreError};

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model: String,
    pub temperature: f32,
    /// What the posts are about, used to frame the system prompt.
    pub topic: String,
    pub batch_size: usize,
    /// Per-record content cap, in characters.
    pub content_char_cap: usize,
    pub backoff: Backoff,
}

/// Which records a run picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzeMode {
    /// Fresh `pending` records.
    Normal,
    /// Records that previously ended `failed`.
    Retry,
}

impl AnalyzeMode {
    pub fn target_status(self) -> RecordStatus {
        match self {
            AnalyzeMode::Normal => RecordStatus::Pending,
            AnalyzeMode::Retry => RecordStatus::Failed,
        }
    }
}

/// Outcome of one classifier run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifyReport {
    /// False only when the combined call never succeeded.
    pub success: bool,
    pub target: RecordStatus,
    pub analyzed: usize,
    pub failed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassifyReport {
    fn nothing_to_do(target: RecordStatus) -> Self {
        Self {
            success: true,
            target,
            analyzed: 0,
            failed: 0,
            total: 0,
            message: Some(format!("No {target} records to analyze")),
            error: None,
        }
    }
}

pub struct BatchClassifier<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    settings: ClassifierSettings,
}

impl<S: ItemStore, C: CompletionSender> BatchClassifier<S, C> {
    pub fn new(store: Arc<S>, client: Arc<C>, settings: ClassifierSettings) -> Self {
        Self {
            store,
            client,
            settings,
        }
    }

    /// Classifies one batch. Store failures before the claim, or while
    /// recording a whole-batch failure, are returned as errors; everything
    /// else is reported through [`ClassifyReport`].
    pub async fn run(&self, mode: AnalyzeMode) -> Result<ClassifyReport, StoreError> {
        let target = mode.target_status();
        let records = self
            .store
            .select(
                &RecordFilter::with_status(target),
                Some(self.settings.batch_size),
            )
            .await?;

        if records.is_empty() {
            info!(target = %target, "no records to analyze");
            return Ok(ClassifyReport::nothing_to_do(target));
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        self.store.update_many(&ids, RecordPatch::Claim).await?;
        info!(target = %target, batch = ids.len(), "claimed batch");

        let request = self.build_request(&records);
        let client = &*self.client;
        let mut attempts = 1;
        let result = self
            .settings
            .backoff
            .run(
                || client.send_chat(&request),
                |attempt, err: &LlmError| {
                    attempts = attempt + 1;
                    info!(
                        attempt,
                        transient = err.is_retryable(),
                        error = %err,
                        "retrying batch classification"
                    );
                },
            )
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => return self.fail_batch(target, &ids, attempts, &err).await,
        };

        let parsed = parse_analyses(response.text().unwrap_or_default());
        let usable = parsed.iter().filter(|a| a.is_some()).count();
        if usable < records.len() {
            warn!(
                expected = records.len(),
                returned = parsed.len(),
                usable,
                "classifier response short or malformed, using fallbacks"
            );
        }
        let analyses = reconcile(records.len(), parsed);

        let updates = records
            .iter()
            .zip(analyses)
            .map(|(record, analysis)| self.settle(record.id, analysis));
        let settled = join_all(updates).await;

        let analyzed = settled.iter().filter(|ok| **ok).count();
        let failed = settled.len() - analyzed;
        info!(analyzed, failed, total = records.len(), "batch analysis complete");

        Ok(ClassifyReport {
            success: true,
            target,
            analyzed,
            failed,
            total: records.len(),
            message: None,
            error: None,
        })
    }

    fn build_request(&self, records: &[ItemRecord]) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt(&self.settings.topic, records.len())),
                ChatMessage::user(batch_prompt(records, self.settings.content_char_cap)),
            ],
            temperature: Some(self.settings.temperature),
            response_format: Some(ResponseFormat::json_object()),
        }
    }

    async fn fail_batch(
        &self,
        target: RecordStatus,
        ids: &[Uuid],
        attempts: u32,
        err: &LlmError,
    ) -> Result<ClassifyReport, StoreError> {
        let error = format!("Classifier batch analysis failed after {attempts} attempt(s): {err}");
        error!(batch = ids.len(), %error, "marking whole batch failed");

        self.store
            .update_many(
                ids,
                RecordPatch::fail(format!("Batch failed after {attempts} attempt(s): {err}")),
            )
            .await?;

        Ok(ClassifyReport {
            success: false,
            target,
            analyzed: 0,
            failed: ids.len(),
            total: ids.len(),
            message: None,
            error: Some(error),
        })
    }

    /// Completes one record, or fails it on its own if that write is rejected.
    async fn settle(&self, id: Uuid, analysis: Analysis) -> bool {
        let err = match self.store.update_one(id, RecordPatch::complete(analysis)).await {
            Ok(()) => return true,
            Err(err) => err,
        };

        warn!(record = %id, error = %err, "failed to store analysis");
        if let Err(fail_err) = self.store.update_one(id, RecordPatch::fail(err.to_string())).await {
            error!(record = %id, error = %fail_err, "failed to mark record failed");
        }
        false
    }
}

fn system_prompt(topic: &str, count: usize) -> String {
    format!(
        "You are analyzing discussions about {topic}.\n\
         \n\
         I will provide you with {count} posts. For EACH post, analyze sentiment and provide a summary.\n\
         \n\
         SENTIMENT GUIDELINES:\n\
         \n\
         NEGATIVE:\n\
         - Crashes, accidents, deaths, injuries\n\
         - Criticism, complaints, disappointments\n\
         - Moderator actions calling out rule violations\n\
         - Problems, failures, controversies\n\
         - Concerns about safety, costs, delays\n\
         \n\
         POSITIVE:\n\
         - Expressions of enthusiasm, love, appreciation\n\
         - Compliments about the subject or the media shared\n\
         - Successful milestones, achievements\n\
         - Excitement about capabilities or performances\n\
         \n\
         NEUTRAL:\n\
         - Factual reporting without emotion\n\
         - Technical specifications, data\n\
         - Simple announcements or informational posts\n\
         - Questions seeking information\n\
         - Objective descriptions\n\
         \n\
         Return a JSON object whose \"analyses\" array holds exactly {count} objects in the same order as the posts, each containing:\n\
         {{\"sentiment\": \"positive\" | \"negative\" | \"neutral\", \"summary\": \"one-sentence summary\"}}\n\
         \n\
         Example format:\n\
         {{\"analyses\": [{{\"sentiment\": \"positive\", \"summary\": \"...\"}}, {{\"sentiment\": \"neutral\", \"summary\": \"...\"}}]}}"
    )
}

fn batch_prompt(records: &[ItemRecord], char_cap: usize) -> String {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            format!(
                "Post {}:\n{}\n---",
                i + 1,
                truncate_chars(&record.content, char_cap)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnalysisPayload {
    Envelope { analyses: Vec<Value> },
    Bare(Vec<Value>),
}

/// Parses the classifier's reply into one slot per returned entry. Entries
/// that do not match `{sentiment, summary}` become `None`; an unreadable
/// reply yields no entries at all.
fn parse_analyses(text: &str) -> Vec<Option<Analysis>> {
    let entries = match serde_json::from_str::<AnalysisPayload>(text) {
        Ok(AnalysisPayload::Envelope { analyses }) | Ok(AnalysisPayload::Bare(analyses)) => {
            analyses
        }
        Err(err) => {
            warn!(error = %err, "classifier reply is not a readable analyses array");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| match serde_json::from_value::<Analysis>(entry) {
            Ok(analysis) => Some(analysis),
            Err(err) => {
                debug!(position = i, error = %err, "discarding malformed analysis entry");
                None
            }
        })
        .collect()
}

/// Lines results up with the `count` input records by position.
fn reconcile(count: usize, parsed: Vec<Option<Analysis>>) -> Vec<Analysis> {
    parsed
        .into_iter()
        .map(|entry| entry.unwrap_or_else(Analysis::unavailable))
        .chain(iter::repeat_with(Analysis::unavailable))
        .take(count)
        .collect()
}
