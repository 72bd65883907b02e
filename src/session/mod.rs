//! Conversation storage.
//!
//! A [`Session`] is an ordered, append-only log of [`Item`]s addressed by an
//! opaque id. The run loop loads history from it at the start of a run and
//! commits the run's new items in a single append when the run completes.

pub mod compaction;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::OwnedRwLockReadGuard;

use crate::error::Result;
use crate::types::Item;

pub use compaction::{
    plan_compaction, serialize_items_for_summary, CompactingSession, CompactionPlan,
    ModelSummarizer, Summarizer,
};
pub use file::FileSession;
pub use memory::MemorySession;

/// Held by a run from history load until commit.
///
/// Stores that rewrite history (see [`CompactingSession`]) defer rewrites
/// while any lease is alive.
#[derive(Debug, Default)]
pub struct RunLease {
    _guard: Option<OwnedRwLockReadGuard<()>>,
}

impl RunLease {
    /// A lease that protects nothing.
    pub fn detached() -> Self {
        Self { _guard: None }
    }

    pub fn shared(guard: OwnedRwLockReadGuard<()>) -> Self {
        Self {
            _guard: Some(guard),
        }
    }
}

/// Storage contract for conversation history.
#[async_trait]
pub trait Session: Send + Sync {
    fn session_id(&self) -> &str;

    /// The newest `limit` items (all items when `None`), oldest first.
    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<Item>>;

    /// Append items atomically.
    async fn add_items(&self, items: Vec<Item>) -> Result<()>;

    /// Remove and return the newest item.
    async fn pop_item(&self) -> Result<Option<Item>>;

    async fn clear_session(&self) -> Result<()>;

    /// Replace the whole history. Implementations should make this atomic.
    async fn replace_items(&self, items: Vec<Item>) -> Result<()> {
        self.clear_session().await?;
        self.add_items(items).await
    }

    /// Called when a run loads history.
    async fn begin_run(&self) -> Result<RunLease> {
        Ok(RunLease::detached())
    }

    /// Called after a run committed its items and released its lease.
    async fn on_run_complete(&self) -> Result<()> {
        Ok(())
    }
}

/// The newest `limit` entries of `items`.
pub(crate) fn tail(items: &[Item], limit: Option<usize>) -> Vec<Item> {
    match limit {
        Some(limit) => items[items.len().saturating_sub(limit)..].to_vec(),
        None => items.to_vec(),
    }
}
