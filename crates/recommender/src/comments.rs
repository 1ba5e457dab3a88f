//! Per-video comment threads, persisted next to the profile store

use crate::error::{RecommenderError, Result};
use crate::persist;
use crate::types::Pid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub username: String,
    pub text: String,
    pub posted_at: DateTime<Utc>,
}

pub struct CommentStore {
    path: Option<PathBuf>,
    threads: Mutex<BTreeMap<Pid, Vec<Comment>>>,
}

impl CommentStore {
    /// Open the comment file; absent means no comments yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let threads = persist::read_json::<BTreeMap<Pid, Vec<Comment>>>(&path)?.unwrap_or_default();

        tracing::info!(
            "Loaded comments for {} videos from {}",
            threads.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            threads: Mutex::new(threads),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            threads: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn list(&self, pid: Pid) -> Vec<Comment> {
        self.threads
            .lock()
            .await
            .get(&pid)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn post(&self, pid: Pid, username: &str, text: &str) -> Result<Comment> {
        let username = username.trim();
        let text = text.trim();
        if username.is_empty() {
            return Err(RecommenderError::InvalidInput("username must not be empty".into()));
        }
        if text.is_empty() {
            return Err(RecommenderError::InvalidInput("comment text must not be empty".into()));
        }

        let comment = Comment {
            username: username.to_string(),
            text: text.to_string(),
            posted_at: Utc::now(),
        };

        // No await between persisting and publishing
        let mut threads = self.threads.lock().await;
        if let Some(path) = &self.path {
            let mut snapshot = threads.clone();
            snapshot.entry(pid).or_default().push(comment.clone());
            persist::write_json(path, &snapshot)?;
            *threads = snapshot;
        } else {
            threads.entry(pid).or_default().push(comment.clone());
        }

        tracing::debug!("Comment by '{}' on video {}", comment.username, pid);
        Ok(comment)
    }
}
