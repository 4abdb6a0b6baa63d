//! Read capabilities over the external entity stores.
//!
//! The decision engine receives these as injected dependencies; there is
//! no ambient data-store access anywhere in the crate. A fetch returning
//! `None` is a legitimate outcome, not an error — the entity may have been
//! deleted concurrently with the notification being produced.

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{ContentRecord, EntityId, MediaRecord, MemberRecord};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state store error: {0}")]
    Backend(String),
    #[error("state store timeout")]
    Timeout,
}

impl StateError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Read access to content revisions by id.
#[async_trait]
pub trait ContentReader: Send + Sync {
    /// Fetch the newest saved revision, published or not.
    async fn get_current(&self, id: EntityId) -> Result<Option<ContentRecord>, StateError>;

    /// Fetch the currently published revision, if any.
    async fn get_published(&self, id: EntityId) -> Result<Option<ContentRecord>, StateError>;
}

/// Read access to media entities by id.
#[async_trait]
pub trait MediaReader: Send + Sync {
    async fn get_media(&self, id: EntityId) -> Result<Option<MediaRecord>, StateError>;
}

/// Read access to members by id.
#[async_trait]
pub trait MemberReader: Send + Sync {
    async fn get_member(&self, id: EntityId) -> Result<Option<MemberRecord>, StateError>;
}
