//! Rintocco
//!
//! The propagation core of a multi-server publishing deployment: when
//! content, media, or member records change on one server, every server
//! in the load-balanced cluster converges its in-memory caches and
//! full-text search partitions from a compact change notification,
//! without re-querying the database on every read.
//!
//! The pipeline on each receiving server:
//!
//! 1. [`NotificationCodec`] decodes the broadcast payload (fail-closed)
//! 2. [`CacheInvalidator`] evicts the local object and render caches
//! 3. [`ReindexDecisionEngine`] computes the index operations
//! 4. [`IndexApplier`] executes them against the registered partitions
//!
//! All collaborators — entity state readers, index partition writers, the
//! local cache stores — are injected; the crate holds no ambient global
//! state, which also makes per-test substitution straightforward.
//!
//! ## Configuration
//!
//! ```toml
//! [invalidation]
//! enable_object_cache = true
//! enable_render_cache = true
//! object_limit = 500
//! # ... see config.rs for all options
//! ```

mod actions;
mod applier;
mod codec;
mod config;
mod dispatch;
mod engine;
mod entities;
mod invalidator;
mod lock;
mod partitions;
mod state;
mod store;

pub use actions::{ActionSet, ChangeActions, ChangeEvent, MediaChange, MediaOperation};
pub use applier::{AppliedStats, FailedWrite, IndexApplier, PartialApplyFailure};
pub use codec::{CodecError, NotificationCodec};
pub use config::InvalidationConfig;
pub use dispatch::{
    Channel, DispatchError, DispatchSummary, MessageShape, Notification, NotificationDispatcher,
    NotificationQueue, ReceivedNotification,
};
pub use engine::{EngineError, IndexOp, IndexOperation, ReindexDecisionEngine};
pub use entities::{
    ContentRecord, ContentTypeRef, DocumentKind, EntityId, ICON_FIELD, MediaRecord, MemberRecord,
    NAME_SORT_FIELD, SearchDocument,
};
pub use invalidator::CacheInvalidator;
pub use partitions::{
    IndexPartition, IndexTarget, IndexWriter, PartitionRegistry, RegisteredPartition, WriteError,
};
pub use state::{ContentReader, MediaReader, MemberReader, StateError};
pub use store::{CachedEntity, ObjectCache, RenderCacheKind, RenderCacheSet};
