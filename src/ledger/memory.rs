use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;

use super::store::{Revision, Snapshot, VersionedStore};

#[derive(Debug, Default)]
struct State {
    files: HashMap<String, (String, u64)>,
    next_revision: u64,
    /// Writes from "another process", applied just before our next write.
    interference: Vec<(String, String)>,
    commits: Vec<String>,
}

impl State {
    fn commit(&mut self, path: &str, content: &str, message: &str) -> Revision {
        self.next_revision += 1;
        self.files
            .insert(path.to_string(), (content.to_string(), self.next_revision));
        self.commits.push(message.to_string());
        Revision(self.next_revision.to_string())
    }

    fn apply_interference(&mut self) {
        for (path, content) in std::mem::take(&mut self.interference) {
            self.commit(&path, &content, "concurrent write");
        }
    }
}

/// Process-local [`VersionedStore`] with the same conflict rules as the
/// remote one. Backs `--dry-run` and the pipeline tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(path)
            .map(|(content, _)| content.clone())
    }

    /// Seeds or overwrites `path` unconditionally.
    pub fn put(&self, path: &str, content: &str) -> Revision {
        self.lock().commit(path, content, "seed")
    }

    /// Simulates another writer landing `content` between our next read and
    /// write.
    pub fn interfere_once(&self, path: &str, content: &str) {
        self.lock()
            .interference
            .push((path.to_string(), content.to_string()));
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.lock().commits.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.lock().files.get(path).map(|(content, revision)| Snapshot {
            content: content.clone(),
            revision: Revision(revision.to_string()),
        }))
    }

    async fn create(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<Revision, StoreError> {
        let mut state = self.lock();
        state.apply_interference();
        if state.files.contains_key(path) {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }
        Ok(state.commit(path, content, message))
    }

    async fn update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let mut state = self.lock();
        state.apply_interference();
        let current = state
            .files
            .get(path)
            .map(|(_, revision)| Revision(revision.to_string()));
        if current.as_ref() != Some(expected) {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }
        Ok(state.commit(path, content, message))
    }
}
