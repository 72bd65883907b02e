//! In-memory session store.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{tail, Session};
use crate::error::Result;
use crate::types::Item;

/// Session kept in process memory.
#[derive(Debug)]
pub struct MemorySession {
    id: String,
    items: Mutex<Vec<Item>>,
}

impl MemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: Mutex::new(Vec::new()),
        }
    }

    /// Session pre-populated with `items`.
    pub fn with_items(id: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            id: id.into(),
            items: Mutex::new(items),
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<Item>> {
        Ok(tail(&self.items.lock().await, limit))
    }

    async fn add_items(&self, items: Vec<Item>) -> Result<()> {
        self.items.lock().await.extend(items);
        Ok(())
    }

    async fn pop_item(&self) -> Result<Option<Item>> {
        Ok(self.items.lock().await.pop())
    }

    async fn clear_session(&self) -> Result<()> {
        self.items.lock().await.clear();
        Ok(())
    }

    async fn replace_items(&self, items: Vec<Item>) -> Result<()> {
        *self.items.lock().await = items;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limit_returns_newest_items_in_order() {
        let session = MemorySession::new("s");
        session
            .add_items(vec![Item::user("1"), Item::assistant("2"), Item::user("3")])
            .await
            .unwrap();

        let items = session.get_items(Some(2)).await.unwrap();

        assert_eq!(items, vec![Item::assistant("2"), Item::user("3")]);
    }

    #[tokio::test]
    async fn pop_and_clear() {
        let session = MemorySession::with_items("s", vec![Item::user("a"), Item::user("b")]);

        assert_eq!(session.pop_item().await.unwrap(), Some(Item::user("b")));
        session.clear_session().await.unwrap();
        assert!(session.get_items(None).await.unwrap().is_empty());
        assert_eq!(session.pop_item().await.unwrap(), None);
    }
}
