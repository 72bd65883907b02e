//! JSON-lines file session store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{tail, Session};
use crate::error::{BatonError, Result};
use crate::types::Item;

/// Session persisted as one JSON item per line.
///
/// Appends go to the end of the file; rewrites (pop, replace) write a
/// temporary file and rename it over the original.
#[derive(Debug)]
pub struct FileSession {
    id: String,
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSession {
    /// Session stored in `dir/<id>.jsonl`.
    pub fn new(id: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        let id = id.into();
        let path = dir
            .as_ref()
            .join(format!("{}.jsonl", normalize_file_stem(&id)));
        Self {
            id,
            path,
            lock: Mutex::new(()),
        }
    }

    /// Session stored under `~/.baton/sessions`.
    pub fn in_default_dir(id: impl Into<String>) -> Self {
        Self::new(id, crate::config::default_baton_dir().join("sessions"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<Item>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<Item>(line).map_err(|e| {
                    BatonError::Session(format!(
                        "{}: line {}: {e}",
                        self.path.display(),
                        idx + 1
                    ))
                })
            })
            .collect()
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn rewrite(&self, items: &[Item]) -> Result<()> {
        self.ensure_parent().await?;
        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, encode_lines(items)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn encode_lines(items: &[Item]) -> Result<String> {
    let mut out = String::new();
    for item in items {
        out.push_str(&serde_json::to_string(item)?);
        out.push('\n');
    }
    Ok(out)
}

/// Escape a session id into a file stem.
///
/// ASCII letters, digits and `-` pass through; every other byte (including
/// `_`) becomes `_xx`, so distinct ids never share a file.
fn normalize_file_stem(value: &str) -> String {
    if value.is_empty() {
        return "_".to_string();
    }
    let mut stem = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{byte:02x}"));
        }
    }
    stem
}

#[async_trait]
impl Session for FileSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<Item>> {
        let _guard = self.lock.lock().await;
        Ok(tail(&self.read_all().await?, limit))
    }

    async fn add_items(&self, items: Vec<Item>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        self.ensure_parent().await?;
        let encoded = encode_lines(&items)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(encoded.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn pop_item(&self) -> Result<Option<Item>> {
        let _guard = self.lock.lock().await;
        let mut items = self.read_all().await?;
        let popped = items.pop();
        if popped.is_some() {
            self.rewrite(&items).await?;
        }
        Ok(popped)
    }

    async fn clear_session(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn replace_items(&self, items: Vec<Item>) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.rewrite(&items).await
    }
}
