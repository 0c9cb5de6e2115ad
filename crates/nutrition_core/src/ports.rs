//! crates/nutrition_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete generative backend, store and clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{BackendReply, GenerationRequest, SharedFoodRecord, UserSettings};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Generative backend error: {0}")]
    Backend(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Runs one generation call with the given credential secret and model.
    async fn generate(
        &self,
        secret: &str,
        model: &str,
        request: &GenerationRequest,
    ) -> PortResult<BackendReply>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns `None` when the user has no settings document yet.
    async fn load_settings(&self, user_id: Uuid) -> PortResult<Option<UserSettings>>;

    async fn save_settings(&self, user_id: Uuid, settings: &UserSettings) -> PortResult<()>;
}

#[async_trait]
pub trait SharedFoodStore: Send + Sync {
    /// Merge-writes a record keyed by its `id`. Calling it twice with the same
    /// record must leave the store unchanged.
    async fn merge_food(&self, record: &SharedFoodRecord) -> PortResult<()>;

    /// Records whose keyword list contains `keyword` exactly.
    async fn find_by_keyword(&self, keyword: &str, limit: usize)
        -> PortResult<Vec<SharedFoodRecord>>;

    /// Records whose lowercase name starts with `prefix`, in lexicographic order.
    async fn find_by_name_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> PortResult<Vec<SharedFoodRecord>>;
}

/// Source of wall-clock time and of suspension for backoff and rate-limit waits.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}
