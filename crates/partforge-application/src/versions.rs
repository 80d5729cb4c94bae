//! Version ledger service and in-memory repositories.
//!
//! The ledger is append-only: saving, restoring, and recording all create
//! new entries. Restoring version N appends a copy of its script as the
//! newest entry; history is never rewritten.

use std::collections::HashMap;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use partforge_core::geometry::BoundingBox;
use partforge_core::params;
use partforge_core::session::{Session, SessionRepository};
use partforge_core::version::{Version, VersionRepository, VersionSource, VersionStatus};
use partforge_core::{ForgeError, Result};

/// Application-level operations over a [`VersionRepository`].
pub struct VersionService {
    repository: Arc<dyn VersionRepository>,
}

impl VersionService {
    pub fn new(repository: Arc<dyn VersionRepository>) -> Self {
        Self { repository }
    }

    /// Appends a version, snapshotting the script's extracted parameters.
    pub async fn record(
        &self,
        part_id: &str,
        script: &str,
        bounding_box: Option<BoundingBox>,
        status: VersionStatus,
        error_message: Option<String>,
        source: VersionSource,
    ) -> Result<Version> {
        let version = Version::new(
            part_id,
            script,
            params::extract(script),
            bounding_box,
            status,
            error_message,
            source,
        );
        info!(part_id, version = %version.id, ?source, "version recorded");
        Ok(self.repository.save_version(version).await?)
    }

    /// The newest version of a part.
    pub async fn latest(&self, part_id: &str) -> Result<Option<Version>> {
        Ok(self.repository.load_latest(part_id).await?)
    }

    /// The full ledger for a part, oldest first.
    pub async fn history(&self, part_id: &str) -> Result<Vec<Version>> {
        Ok(self.repository.load_versions(part_id).await?)
    }

    /// Restores an earlier version by appending a copy of its script as a
    /// new entry with `source = Restore`. The ledger is never truncated.
    pub async fn restore(&self, part_id: &str, version_id: &str) -> Result<Version> {
        let history = self.repository.load_versions(part_id).await?;
        let target = history
            .into_iter()
            .find(|version| version.id == version_id)
            .ok_or_else(|| ForgeError::not_found("version", version_id))?;

        self.record(
            part_id,
            &target.script,
            target.bounding_box,
            target.status,
            target.error_message.clone(),
            VersionSource::Restore,
        )
        .await
    }
}

/// In-memory ledger keyed by part id. Append order is preserved.
#[derive(Default)]
pub struct InMemoryVersionRepository {
    ledgers: RwLock<HashMap<String, Vec<Version>>>,
}

impl InMemoryVersionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionRepository for InMemoryVersionRepository {
    async fn save_version(&self, version: Version) -> anyhow::Result<Version> {
        let mut ledgers = self.ledgers.write().await;
        ledgers
            .entry(version.part_id.clone())
            .or_default()
            .push(version.clone());
        Ok(version)
    }

    async fn load_latest(&self, part_id: &str) -> anyhow::Result<Option<Version>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.get(part_id).and_then(|l| l.last().cloned()))
    }

    async fn load_versions(&self, part_id: &str) -> anyhow::Result<Vec<Version>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.get(part_id).cloned().unwrap_or_default())
    }
}

/// In-memory session store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn list_all(&self) -> anyhow::Result<Vec<Session>> {
        Ok(self.sessions.read().await.values().cloned().collect())
    }
}
