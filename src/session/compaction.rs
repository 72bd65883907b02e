//! History compaction decorator.
//!
//! [`CompactingSession`] wraps any [`Session`] and, once enough old items
//! accumulate, replaces them with a single [`Item::Summary`] produced by a
//! [`Summarizer`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{RunLease, Session};
use crate::error::{BatonError, Result};
use crate::model::{ModelBackend, ModelRequest};
use crate::types::{final_text, Item, ModelSettings, SummaryItem};

pub use crate::config::CompactionConfig;

const DEFAULT_SUMMARY_INSTRUCTIONS: &str = "You condense conversation transcripts. \
Write a compact summary of the transcript that keeps every fact, decision and tool \
result needed to continue the conversation. Reply with the summary only.";

/// Condenses old items into summary text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, previous: Option<&SummaryItem>, items: &[Item]) -> Result<String>;
}

/// [`Summarizer`] that asks a model backend for the summary.
pub struct ModelSummarizer {
    backend: Arc<dyn ModelBackend>,
    instructions: String,
    settings: ModelSettings,
}

impl ModelSummarizer {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            instructions: DEFAULT_SUMMARY_INSTRUCTIONS.to_string(),
            settings: ModelSettings::default(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, previous: Option<&SummaryItem>, items: &[Item]) -> Result<String> {
        let mut prompt = String::new();
        if let Some(previous) = previous {
            prompt.push_str("<previous_summary>\n");
            prompt.push_str(&previous.text);
            prompt.push_str("\n</previous_summary>\n\n");
        }
        prompt.push_str("<transcript>\n");
        prompt.push_str(&serialize_items_for_summary(items));
        prompt.push_str("\n</transcript>");

        let request = ModelRequest {
            agent: "summarizer".to_string(),
            instructions: self.instructions.clone(),
            input: vec![Item::user(prompt)],
            tools: Vec::new(),
            settings: self.settings.clone(),
            output_schema: None,
        };
        let response = self.backend.generate(&request).await?;
        match final_text(&response.items) {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(BatonError::Session(
                "summarizer returned no summary text".to_string(),
            )),
        }
    }
}

/// What a compaction pass would do to a history.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionPlan {
    pub previous_summary: Option<SummaryItem>,
    pub to_summarize: Vec<Item>,
    pub kept: Vec<Item>,
}

impl CompactionPlan {
    pub fn summarized_items(&self) -> usize {
        self.previous_summary
            .as_ref()
            .map_or(0, |s| s.summarized_items)
            + self.to_summarize.len()
    }
}

/// Index at which the kept tail starts. Never lands on a tool result.
fn find_cut_index(items: &[Item], keep_recent: usize) -> usize {
    let mut cut_index = items.len().saturating_sub(keep_recent);
    while cut_index < items.len() && matches!(items[cut_index], Item::ToolResult(_)) {
        cut_index += 1;
    }
    cut_index
}

/// Plan a compaction of `items`.
///
/// Returns `None` when nothing should change: fewer than `threshold`
/// candidates, or no candidates at all when `force` is set.
pub fn plan_compaction(
    items: &[Item],
    config: &CompactionConfig,
    force: bool,
) -> Option<CompactionPlan> {
    let cut_index = find_cut_index(items, config.keep_recent);
    let (older, kept) = items.split_at(cut_index);

    let to_summarize: Vec<Item> = older.iter().filter(|i| !i.is_summary()).cloned().collect();
    let needed = if force { 1 } else { config.threshold.max(1) };
    if to_summarize.len() < needed {
        return None;
    }

    let previous_summary = older.iter().rev().find_map(|item| match item {
        Item::Summary(summary) => Some(summary.clone()),
        _ => None,
    });

    Some(CompactionPlan {
        previous_summary,
        to_summarize,
        kept: kept.to_vec(),
    })
}

/// Flatten items into a plain-text transcript for summarization.
pub fn serialize_items_for_summary(items: &[Item]) -> String {
    let mut lines = Vec::new();
    for item in items {
        match item {
            Item::UserMessage(msg) => lines.push(format!("[user] {}", msg.text)),
            Item::AssistantMessage(msg) => match &msg.agent {
                Some(agent) => lines.push(format!("[assistant:{agent}] {}", msg.text)),
                None => lines.push(format!("[assistant] {}", msg.text)),
            },
            Item::ToolCall(call) => lines.push(format!(
                "[assistant.tool_call] {} {}",
                call.name, call.arguments
            )),
            Item::ToolResult(result) => lines.push(format!(
                "[tool] id={} is_error={} result={}",
                result.call_id, result.is_error, result.output
            )),
            Item::Handoff(handoff) => lines.push(format!(
                "[handoff] {} -> {}",
                handoff.from_agent, handoff.to_agent
            )),
            Item::ApprovalRequest(request) => lines.push(format!(
                "[approval_request] id={} tool={}",
                request.call_id, request.tool_name
            )),
            Item::Reasoning(_) => {}
            Item::Summary(summary) => lines.push(format!("[summary] {}", summary.text)),
        }
    }
    lines.join("\n")
}

/// Session decorator that keeps history bounded by summarizing old items.
pub struct CompactingSession<S> {
    inner: S,
    config: CompactionConfig,
    summarizer: Arc<dyn Summarizer>,
    lock: Arc<RwLock<()>>,
    /// Serializes writes to `inner` with the final rewrite of a compaction.
    writes: Mutex<()>,
    deferred: AtomicBool,
}

impl<S: Session> CompactingSession<S> {
    pub fn new(inner: S, config: CompactionConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            inner,
            config,
            summarizer,
            lock: Arc::new(RwLock::new(())),
            writes: Mutex::new(()),
            deferred: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Whether an automatic compaction is waiting for runs to finish.
    pub fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }

    /// Compact now, waiting for in-flight runs to release their leases.
    ///
    /// Returns whether the store was rewritten.
    pub async fn force_compact(&self) -> Result<bool> {
        let _guard = self.lock.write().await;
        let compacted = self.compact_locked(true).await?;
        self.deferred.store(false, Ordering::SeqCst);
        Ok(compacted)
    }

    async fn maybe_compact(&self) -> Result<bool> {
        let Ok(_guard) = self.lock.try_write() else {
            if !self.deferred.swap(true, Ordering::SeqCst) {
                tracing::debug!(
                    session = %self.inner.session_id(),
                    "compaction deferred until active runs finish"
                );
            }
            return Ok(false);
        };
        let compacted = self.compact_locked(false).await?;
        self.deferred.store(false, Ordering::SeqCst);
        Ok(compacted)
    }

    async fn compact_locked(&self, force: bool) -> Result<bool> {
        let items = self.inner.get_items(None).await?;
        let Some(plan) = plan_compaction(&items, &self.config, force) else {
            return Ok(false);
        };

        let text = self
            .summarizer
            .summarize(plan.previous_summary.as_ref(), &plan.to_summarize)
            .await?;
        let summarized_items = plan.summarized_items();
        let prefix_len = items.len() - plan.kept.len();

        // Items may have been appended while the summary was produced.
        let _writes = self.writes.lock().await;
        let current = self.inner.get_items(None).await?;
        if current.len() < prefix_len || current[..prefix_len] != items[..prefix_len] {
            tracing::warn!(
                session = %self.inner.session_id(),
                "history changed during compaction; summary discarded"
            );
            return Ok(false);
        }
        let kept = current.len() - prefix_len;

        let mut replacement = Vec::with_capacity(kept + 1);
        replacement.push(Item::Summary(SummaryItem {
            text,
            summarized_items,
        }));
        replacement.extend(current.into_iter().skip(prefix_len));
        self.inner.replace_items(replacement).await?;

        tracing::info!(
            session = %self.inner.session_id(),
            summarized = plan.to_summarize.len(),
            kept,
            "session compacted"
        );
        Ok(true)
    }
}

#[async_trait]
impl<S: Session> Session for CompactingSession<S> {
    fn session_id(&self) -> &str {
        self.inner.session_id()
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<Item>> {
        self.inner.get_items(limit).await
    }

    async fn add_items(&self, items: Vec<Item>) -> Result<()> {
        {
            let _writes = self.writes.lock().await;
            self.inner.add_items(items).await?;
        }
        self.maybe_compact().await?;
        Ok(())
    }

    async fn pop_item(&self) -> Result<Option<Item>> {
        let _writes = self.writes.lock().await;
        self.inner.pop_item().await
    }

    async fn clear_session(&self) -> Result<()> {
        let _writes = self.writes.lock().await;
        self.inner.clear_session().await
    }

    async fn replace_items(&self, items: Vec<Item>) -> Result<()> {
        let _writes = self.writes.lock().await;
        self.inner.replace_items(items).await
    }

    async fn begin_run(&self) -> Result<RunLease> {
        Ok(RunLease::shared(self.lock.clone().read_owned().await))
    }

    async fn on_run_complete(&self) -> Result<()> {
        self.inner.on_run_complete().await?;
        self.maybe_compact().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(threshold: usize, keep_recent: usize) -> CompactionConfig {
        CompactionConfig {
            threshold,
            keep_recent,
        }
    }

    #[test]
    fn cut_never_starts_kept_range_at_tool_result() {
        let items = vec![
            Item::user("q"),
            Item::tool_call("c1", "lookup", json!({})),
            Item::tool_result("c1", "lookup", json!("r"), false),
            Item::assistant("a"),
        ];

        assert_eq!(find_cut_index(&items, 2), 3);
        let plan = plan_compaction(&items, &config(1, 2), false).unwrap();
        assert_eq!(plan.kept, vec![Item::assistant("a")]);
        assert_eq!(plan.to_summarize.len(), 3);
    }

    #[test]
    fn below_threshold_plans_nothing() {
        let items = vec![Item::user("1"), Item::assistant("2"), Item::user("3")];
        assert!(plan_compaction(&items, &config(5, 1), false).is_none());
        assert!(plan_compaction(&items, &config(5, 1), true).is_some());
    }

    #[test]
    fn previous_summary_is_folded_not_resummarized() {
        let items = vec![
            Item::Summary(SummaryItem {
                text: "earlier".to_string(),
                summarized_items: 4,
            }),
            Item::user("1"),
            Item::assistant("2"),
            Item::user("3"),
        ];

        let plan = plan_compaction(&items, &config(2, 1), false).unwrap();

        assert_eq!(plan.previous_summary.as_ref().unwrap().text, "earlier");
        assert_eq!(plan.to_summarize.len(), 2);
        assert_eq!(plan.summarized_items(), 6);
    }

    #[test]
    fn compacted_history_has_no_candidates() {
        let items = vec![
            Item::Summary(SummaryItem {
                text: "s".to_string(),
                summarized_items: 3,
            }),
            Item::user("kept"),
        ];
        assert!(plan_compaction(&items, &config(1, 1), true).is_none());
    }

    #[test]
    fn transcript_format() {
        let items = vec![
            Item::user("hi"),
            Item::tool_call("c1", "search", json!({"q": "x"})),
            Item::tool_result("c1", "search", json!("ok"), false),
            Item::assistant("done"),
        ];

        let text = serialize_items_for_summary(&items);

        assert_eq!(
            text,
            "[user] hi\n[assistant.tool_call] search {\"q\":\"x\"}\n[tool] id=c1 is_error=false result=\"ok\"\n[assistant] done"
        );
    }
}
