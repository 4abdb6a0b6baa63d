//! Notification arrival and dispatch.
//!
//! The receiving side of the cluster broadcast. Arriving notifications
//! are buffered in a FIFO queue and consumed sequentially in arrival
//! order: decode (fail-closed), local cache invalidation first, then the
//! reindex plan per entry with per-entity error isolation. Nothing here
//! propagates back to the originating mutation; failures surface as log
//! records and metrics on the receiving server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::{ActionSet, MediaChange, MediaOperation};
use crate::applier::IndexApplier;
use crate::codec::{CodecError, NotificationCodec};
use crate::config::InvalidationConfig;
use crate::engine::ReindexDecisionEngine;
use crate::entities::EntityId;
use crate::invalidator::CacheInvalidator;
use crate::lock::mutex_lock;

const SOURCE: &str = "dispatch";

const METRIC_DISPATCH_MS: &str = "rintocco_dispatch_ms";
const METRIC_ENTRY_FAILURES_TOTAL: &str = "rintocco_reindex_entry_failures_total";
const METRIC_UNSUPPORTED_TOTAL: &str = "rintocco_unsupported_shape_total";

/// The notification channel a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Content,
    Media,
    Member,
    ContentType,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Media => "media",
            Self::Member => "member",
            Self::ContentType => "content-type",
        }
    }
}

/// The shape a transport message can take.
///
/// Which shapes a channel supports is part of the protocol: the content
/// channel is JSON-batch-only, media and members accept by-id messages,
/// and everything else is declined explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageShape {
    RefreshAll,
    RefreshById(EntityId),
    RefreshByInstance,
    RemoveById(EntityId),
    RemoveByInstance,
    /// A serialized notification batch.
    Payload(Vec<u8>),
}

impl MessageShape {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RefreshAll => "refresh-all",
            Self::RefreshById(_) => "refresh-by-id",
            Self::RefreshByInstance => "refresh-by-instance",
            Self::RemoveById(_) => "remove-by-id",
            Self::RemoveByInstance => "remove-by-instance",
            Self::Payload(_) => "json-payload",
        }
    }
}

/// One broadcast message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: Channel,
    pub shape: MessageShape,
}

impl Notification {
    pub fn content_batch(payload: Vec<u8>) -> Self {
        Self {
            channel: Channel::Content,
            shape: MessageShape::Payload(payload),
        }
    }

    pub fn media_batch(payload: Vec<u8>) -> Self {
        Self {
            channel: Channel::Media,
            shape: MessageShape::Payload(payload),
        }
    }

    pub fn media_refreshed(id: EntityId) -> Self {
        Self {
            channel: Channel::Media,
            shape: MessageShape::RefreshById(id),
        }
    }

    pub fn media_removed(id: EntityId) -> Self {
        Self {
            channel: Channel::Media,
            shape: MessageShape::RemoveById(id),
        }
    }

    pub fn member_refreshed(id: EntityId) -> Self {
        Self {
            channel: Channel::Member,
            shape: MessageShape::RefreshById(id),
        }
    }

    pub fn member_removed(id: EntityId) -> Self {
        Self {
            channel: Channel::Member,
            shape: MessageShape::RemoveById(id),
        }
    }

    pub fn content_type_changed() -> Self {
        Self {
            channel: Channel::ContentType,
            shape: MessageShape::RefreshAll,
        }
    }
}

/// A notification as buffered on this server, with arrival metadata for
/// log correlation.
#[derive(Debug, Clone)]
pub struct ReceivedNotification {
    /// Unique identifier for idempotency and log correlation.
    pub id: Uuid,
    /// Monotonic receive sequence within this process.
    pub seq: u64,
    pub received_at: OffsetDateTime,
    pub notification: Notification,
}

/// In-memory FIFO buffer of received notifications.
///
/// The transport adapter publishes into the queue; the dispatcher drains
/// it sequentially in arrival order. A mutex suffices since contention is
/// expected to be low.
pub struct NotificationQueue {
    queue: Mutex<VecDeque<ReceivedNotification>>,
    seq_counter: AtomicU64,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            seq_counter: AtomicU64::new(0),
        }
    }

    /// Buffer a notification, stamping arrival metadata.
    pub fn publish(&self, notification: Notification) {
        let received = ReceivedNotification {
            id: Uuid::new_v4(),
            seq: self.seq_counter.fetch_add(1, Ordering::SeqCst),
            received_at: OffsetDateTime::now_utc(),
            notification,
        };

        info!(
            notification_id = %received.id,
            seq = received.seq,
            channel = received.notification.channel.as_str(),
            shape = received.notification.shape.kind(),
            "Notification enqueued"
        );

        mutex_lock(&self.queue, SOURCE, "publish").push_back(received);
    }

    /// Drain up to `limit` notifications in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<ReceivedNotification> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a notification could not be dispatched at all.
///
/// Per-entity failures inside a batch are not errors at this level; they
/// are isolated, logged, and counted in the summary.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("notification shape `{shape}` is not supported on the {channel} channel")]
    UnsupportedShape {
        channel: &'static str,
        shape: &'static str,
    },
}

/// Outcome counts for one dispatched notification.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Entries carried by the notification (1 for by-id shapes).
    pub entries: usize,
    /// Partition writes that succeeded.
    pub operations_applied: usize,
    /// Entries whose reindex planning or application failed; the
    /// remaining entries were still processed.
    pub entry_failures: usize,
}

/// Consumes received notifications and drives the full pipeline:
/// cache invalidation, reindex planning, index application.
///
/// Everything is injected; the dispatcher holds no ambient state. The
/// reindex path only runs once [`bind`](Self::bind) has succeeded; cache
/// invalidation runs regardless, since every server must converge its
/// local caches even when it hosts no index partitions.
pub struct NotificationDispatcher {
    config: InvalidationConfig,
    invalidator: CacheInvalidator,
    engine: ReindexDecisionEngine,
    applier: IndexApplier,
    queue: Arc<NotificationQueue>,
    bound: AtomicBool,
}

impl NotificationDispatcher {
    pub fn new(
        config: InvalidationConfig,
        invalidator: CacheInvalidator,
        engine: ReindexDecisionEngine,
        applier: IndexApplier,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            config,
            invalidator,
            engine,
            applier,
            queue,
            bound: AtomicBool::new(false),
        }
    }

    /// Bind the reindex path to notification arrivals.
    ///
    /// Idempotent: a second bind is a no-op and reports `false`. Declines
    /// to bind when no registered partition is enabled.
    pub fn bind(&self) -> bool {
        let enabled = self.applier.registry().enabled_count();
        if enabled == 0 {
            info!("No enabled index partitions; reindex dispatch stays unbound");
            return false;
        }
        if self.bound.swap(true, Ordering::SeqCst) {
            debug!("Reindex dispatch already bound; ignoring duplicate bind");
            return false;
        }
        info!(partitions = enabled, "Reindex dispatch bound");
        true
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    /// Buffer a notification and consume the queue immediately.
    pub async fn receive(&self, notification: Notification) -> bool {
        self.queue.publish(notification);
        self.consume().await
    }

    /// Drain and process pending notifications sequentially in arrival
    /// order. Returns true if anything was processed.
    pub async fn consume(&self) -> bool {
        let received = self.queue.drain(self.config.consume_batch_limit);
        if received.is_empty() {
            return false;
        }
        for item in received {
            self.process(item).await;
        }
        true
    }

    async fn process(&self, received: ReceivedNotification) {
        let started = Instant::now();
        let channel = received.notification.channel;
        let shape = received.notification.shape.kind();

        info!(
            notification_id = %received.id,
            seq = received.seq,
            channel = channel.as_str(),
            shape,
            "Processing notification"
        );

        match self.handle(received.notification).await {
            Ok(summary) => info!(
                notification_id = %received.id,
                entries = summary.entries,
                applied = summary.operations_applied,
                entry_failures = summary.entry_failures,
                "Notification processed"
            ),
            Err(DispatchError::UnsupportedShape { channel, shape }) => {
                counter!(METRIC_UNSUPPORTED_TOTAL, "channel" => channel).increment(1);
                warn!(
                    notification_id = %received.id,
                    channel,
                    shape,
                    "Unsupported notification shape declined"
                );
            }
            Err(error) => warn!(
                notification_id = %received.id,
                %error,
                "Notification rejected before any side effect"
            ),
        }

        histogram!(METRIC_DISPATCH_MS, "channel" => channel.as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);
    }

    /// Dispatch one notification through the pipeline.
    ///
    /// Decode failures and unsupported shapes reject the notification
    /// before any side effect; per-entity failures are isolated.
    pub async fn handle(
        &self,
        notification: Notification,
    ) -> Result<DispatchSummary, DispatchError> {
        match (notification.channel, notification.shape) {
            (Channel::Content, MessageShape::Payload(payload)) => {
                self.content_batch(&payload).await
            }
            (Channel::Content, shape) => Err(Self::unsupported(Channel::Content, &shape)),

            (Channel::Media, MessageShape::Payload(payload)) => self.media_batch(&payload).await,
            (Channel::Media, MessageShape::RefreshById(id)) => {
                // a by-id refresh re-derives from current state, honoring
                // the trash rule
                Ok(self
                    .media_change(MediaChange::new(id, MediaOperation::Saved))
                    .await)
            }
            (Channel::Media, MessageShape::RemoveById(id)) => {
                // a by-id remove is a trash: the item leaves public search
                // but stays visible to preview search
                Ok(self
                    .media_change(MediaChange::new(id, MediaOperation::Trashed))
                    .await)
            }
            (Channel::Media, shape) => Err(Self::unsupported(Channel::Media, &shape)),

            (Channel::Member, MessageShape::RefreshById(id)) => Ok(self.member_refresh(id).await),
            (Channel::Member, MessageShape::RemoveById(id)) => Ok(self.member_remove(id).await),
            (Channel::Member, shape) => Err(Self::unsupported(Channel::Member, &shape)),

            (Channel::ContentType, _) => Ok(self.content_type_changed().await),
        }
    }

    fn unsupported(channel: Channel, shape: &MessageShape) -> DispatchError {
        DispatchError::UnsupportedShape {
            channel: channel.as_str(),
            shape: shape.kind(),
        }
    }

    async fn content_batch(&self, payload: &[u8]) -> Result<DispatchSummary, DispatchError> {
        // fail closed: nothing below runs unless the whole batch decodes
        let batch = NotificationCodec::decode(payload)?;

        // cheap, local work first
        self.invalidator.apply_batch(&batch);

        let mut summary = DispatchSummary {
            entries: batch.len(),
            ..Default::default()
        };
        if !self.is_bound() {
            return Ok(summary);
        }

        for set in &batch {
            self.reindex_content(set, &mut summary).await;
        }
        Ok(summary)
    }

    async fn reindex_content(&self, set: &ActionSet, summary: &mut DispatchSummary) {
        match self.engine.plan_content(set).await {
            Ok(ops) if ops.is_empty() => {}
            Ok(ops) => match self.applier.apply(&ops).await {
                Ok(stats) => summary.operations_applied += stats.total(),
                Err(failure) => {
                    summary.entry_failures += 1;
                    counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                    warn!(
                        entity_id = set.id,
                        %failure,
                        "Index application failed for entry; continuing with batch"
                    );
                }
            },
            Err(error) => {
                summary.entry_failures += 1;
                counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                warn!(
                    entity_id = set.id,
                    %error,
                    "Reindex planning failed for entry; continuing with batch"
                );
            }
        }
    }

    async fn media_batch(&self, payload: &[u8]) -> Result<DispatchSummary, DispatchError> {
        let batch = NotificationCodec::decode_media(payload)?;

        for change in &batch {
            self.invalidator.evict_entity(change.id);
        }

        let mut summary = DispatchSummary {
            entries: batch.len(),
            ..Default::default()
        };
        if !self.is_bound() {
            return Ok(summary);
        }

        for change in &batch {
            let entry = self.reindex_media(change).await;
            summary.operations_applied += entry.operations_applied;
            summary.entry_failures += entry.entry_failures;
        }
        Ok(summary)
    }

    async fn media_change(&self, change: MediaChange) -> DispatchSummary {
        self.invalidator.evict_entity(change.id);

        let mut summary = DispatchSummary {
            entries: 1,
            ..Default::default()
        };
        if self.is_bound() {
            let entry = self.reindex_media(&change).await;
            summary.operations_applied = entry.operations_applied;
            summary.entry_failures = entry.entry_failures;
        }
        summary
    }

    async fn reindex_media(&self, change: &MediaChange) -> DispatchSummary {
        let mut entry = DispatchSummary::default();
        match self.engine.plan_media(change).await {
            Ok(ops) if ops.is_empty() => {}
            Ok(ops) => match self.applier.apply(&ops).await {
                Ok(stats) => entry.operations_applied += stats.total(),
                Err(failure) => {
                    entry.entry_failures += 1;
                    counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                    warn!(entity_id = change.id, %failure, "Media index application failed");
                }
            },
            Err(error) => {
                entry.entry_failures += 1;
                counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                warn!(entity_id = change.id, %error, "Media reindex planning failed");
            }
        }
        entry
    }

    async fn member_refresh(&self, id: EntityId) -> DispatchSummary {
        self.invalidator.evict_entity(id);

        let mut summary = DispatchSummary {
            entries: 1,
            ..Default::default()
        };
        if !self.is_bound() {
            return summary;
        }

        match self.engine.plan_member_refresh(id).await {
            Ok(ops) if ops.is_empty() => {}
            Ok(ops) => match self.applier.apply(&ops).await {
                Ok(stats) => summary.operations_applied = stats.total(),
                Err(failure) => {
                    summary.entry_failures = 1;
                    counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                    warn!(entity_id = id, %failure, "Member index application failed");
                }
            },
            Err(error) => {
                summary.entry_failures = 1;
                counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                warn!(entity_id = id, %error, "Member reindex planning failed");
            }
        }
        summary
    }

    async fn member_remove(&self, id: EntityId) -> DispatchSummary {
        self.invalidator.evict_entity(id);

        let mut summary = DispatchSummary {
            entries: 1,
            ..Default::default()
        };
        if !self.is_bound() {
            return summary;
        }

        match self.engine.plan_member_remove(id).await {
            Ok(ops) => match self.applier.apply(&ops).await {
                Ok(stats) => summary.operations_applied = stats.total(),
                Err(failure) => {
                    summary.entry_failures = 1;
                    counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                    warn!(entity_id = id, %failure, "Member index removal failed");
                }
            },
            Err(error) => {
                summary.entry_failures = 1;
                counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                warn!(entity_id = id, %error, "Member removal planning failed");
            }
        }
        summary
    }

    async fn content_type_changed(&self) -> DispatchSummary {
        let mut summary = DispatchSummary {
            entries: 1,
            ..Default::default()
        };
        if !self.is_bound() {
            return summary;
        }

        // properties may have been added or removed; every enabled
        // partition re-derives its field definitions
        match self.applier.refresh_fields().await {
            Ok(refreshed) => summary.operations_applied = refreshed,
            Err(failure) => {
                summary.entry_failures = 1;
                counter!(METRIC_ENTRY_FAILURES_TOTAL).increment(1);
                warn!(%failure, "Field definition refresh failed on some partitions");
            }
        }
        summary
    }
}
