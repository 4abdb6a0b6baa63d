//! Index partition registry.
//!
//! Partitions split into two disjoint groups: publication-scoped
//! partitions index only published state (public search), revision-scoped
//! partitions index every saved revision (preview/staging search). The
//! registry is built once at startup and never mutated afterwards, so it
//! is read concurrently without locking.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{EntityId, SearchDocument};

/// Descriptor for one registered index partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPartition {
    pub name: String,
    /// True marks a revision-scoped partition (preview/staging search);
    /// false marks a publication-scoped partition (public search).
    pub supports_unpublished: bool,
    /// Disabled partitions are registered but never written to.
    pub enabled: bool,
}

impl IndexPartition {
    pub fn new(name: impl Into<String>, supports_unpublished: bool) -> Self {
        Self {
            name: name.into(),
            supports_unpublished,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Which partition group an index operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTarget {
    /// Publication-scoped partitions only.
    Published,
    /// Revision-scoped partitions only.
    Revisions,
    /// Every registered partition.
    All,
}

impl IndexTarget {
    /// Whether a partition with the given scope is addressed.
    pub fn matches(self, supports_unpublished: bool) -> bool {
        match self {
            Self::Published => !supports_unpublished,
            Self::Revisions => supports_unpublished,
            Self::All => true,
        }
    }
}

/// Failure writing to one index partition.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("index backend error: {0}")]
    Backend(String),
    #[error("index write timeout")]
    Timeout,
}

impl WriteError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Write access to one external index partition.
///
/// Implementations wrap whatever index backend serves the partition; each
/// call is assumed individually atomic.
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Insert or replace the document for its entity id.
    async fn upsert(&self, document: &SearchDocument) -> Result<(), WriteError>;

    /// Remove every document for the entity id. Removing an absent id is
    /// a no-op, not an error.
    async fn delete(&self, id: EntityId) -> Result<(), WriteError>;

    /// Re-derive the partition's field definitions after a content-type
    /// change (properties may have been added or removed).
    async fn refresh_fields(&self) -> Result<(), WriteError>;
}

/// One partition plus its writer, as held by the registry.
pub struct RegisteredPartition {
    descriptor: IndexPartition,
    writer: Arc<dyn IndexWriter>,
}

impl RegisteredPartition {
    pub fn descriptor(&self) -> &IndexPartition {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn writer(&self) -> &Arc<dyn IndexWriter> {
        &self.writer
    }
}

/// Immutable set of index partitions, registered once at startup.
///
/// Adding or removing a partition requires a restart in this design.
pub struct PartitionRegistry {
    partitions: Vec<RegisteredPartition>,
}

impl PartitionRegistry {
    pub fn new(partitions: Vec<(IndexPartition, Arc<dyn IndexWriter>)>) -> Self {
        Self {
            partitions: partitions
                .into_iter()
                .map(|(descriptor, writer)| RegisteredPartition { descriptor, writer })
                .collect(),
        }
    }

    /// All registered partitions, enabled or not.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPartition> {
        self.partitions.iter()
    }

    /// Enabled partitions addressed by the given target group.
    pub fn matching(&self, target: IndexTarget) -> impl Iterator<Item = &RegisteredPartition> {
        self.partitions.iter().filter(move |p| {
            p.descriptor.enabled && target.matches(p.descriptor.supports_unpublished)
        })
    }

    /// All enabled partitions.
    pub fn enabled(&self) -> impl Iterator<Item = &RegisteredPartition> {
        self.matching(IndexTarget::All)
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled().count()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}
