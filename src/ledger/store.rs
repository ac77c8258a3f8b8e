use async_trait::async_trait;

use crate::error::StoreError;

/// Opaque content version issued by the store (a blob SHA for GitHub).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision(pub String);

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub content: String,
    pub revision: Revision,
}

/// Remote storage with optimistic concurrency. Writes never succeed against
/// a revision other than the one the caller last read.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// `None` when nothing exists at `path` yet.
    async fn read(&self, path: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Fails with [`StoreError::Conflict`] if `path` already exists.
    async fn create(&self, path: &str, content: &str, message: &str)
        -> Result<Revision, StoreError>;

    /// Fails with [`StoreError::Conflict`] unless the current revision is
    /// still `expected`.
    async fn update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: &Revision,
    ) -> Result<Revision, StoreError>;
}
