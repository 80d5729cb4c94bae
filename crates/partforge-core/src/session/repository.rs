//! Session repository trait.
//!
//! Defines the interface for session persistence. Persistence itself is an
//! external collaborator; the pipeline only depends on this contract.

use anyhow::Result;
use async_trait::async_trait;

use super::model::Session;

/// An abstract repository for managing session persistence.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Finds a session by its ID.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Session))`: Session found
    /// - `Ok(None)`: Session not found
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>>;

    /// Saves a session to storage.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Deletes a session from storage.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Lists all stored sessions.
    async fn list_all(&self) -> Result<Vec<Session>>;
}
