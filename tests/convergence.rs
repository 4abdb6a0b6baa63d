//! End-to-end convergence tests.
//!
//! Drives the full receiving-side pipeline — decode, local cache
//! invalidation, reindex planning, index application — over in-memory
//! fakes, the way a server processes a broadcast from a peer.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use rintocco::{
    ActionSet, CacheInvalidator, CachedEntity, ChangeActions, ChangeEvent, ContentReader,
    ContentRecord, ContentTypeRef, DispatchError, EntityId, IndexApplier, IndexPartition,
    IndexWriter, InvalidationConfig, MediaReader, MediaRecord, MemberReader, MemberRecord,
    Notification, NotificationCodec, NotificationDispatcher, NotificationQueue, ObjectCache,
    PartitionRegistry, ReindexDecisionEngine, RenderCacheKind, RenderCacheSet, SearchDocument,
    StateError, WriteError,
};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeStores {
    current: Mutex<HashMap<EntityId, ContentRecord>>,
    published: Mutex<HashMap<EntityId, ContentRecord>>,
    media: Mutex<HashMap<EntityId, MediaRecord>>,
    members: Mutex<HashMap<EntityId, MemberRecord>>,
}

#[async_trait]
impl ContentReader for FakeStores {
    async fn get_current(&self, id: EntityId) -> Result<Option<ContentRecord>, StateError> {
        Ok(self.current.lock().expect("current lock").get(&id).cloned())
    }

    async fn get_published(&self, id: EntityId) -> Result<Option<ContentRecord>, StateError> {
        Ok(self
            .published
            .lock()
            .expect("published lock")
            .get(&id)
            .cloned())
    }
}

#[async_trait]
impl MediaReader for FakeStores {
    async fn get_media(&self, id: EntityId) -> Result<Option<MediaRecord>, StateError> {
        Ok(self.media.lock().expect("media lock").get(&id).cloned())
    }
}

#[async_trait]
impl MemberReader for FakeStores {
    async fn get_member(&self, id: EntityId) -> Result<Option<MemberRecord>, StateError> {
        Ok(self.members.lock().expect("members lock").get(&id).cloned())
    }
}

/// An index partition that materializes documents in memory.
#[derive(Default)]
struct FakeIndex {
    documents: Mutex<HashMap<EntityId, SearchDocument>>,
    field_refreshes: Mutex<usize>,
    fail: bool,
}

impl FakeIndex {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn document(&self, id: EntityId) -> Option<SearchDocument> {
        self.documents.lock().expect("documents lock").get(&id).cloned()
    }

    fn contains(&self, id: EntityId) -> bool {
        self.document(id).is_some()
    }

    fn field_refreshes(&self) -> usize {
        *self.field_refreshes.lock().expect("refreshes lock")
    }

    fn snapshot(&self) -> HashMap<EntityId, SearchDocument> {
        self.documents.lock().expect("documents lock").clone()
    }
}

#[async_trait]
impl IndexWriter for FakeIndex {
    async fn upsert(&self, document: &SearchDocument) -> Result<(), WriteError> {
        if self.fail {
            return Err(WriteError::backend("index offline"));
        }
        self.documents
            .lock()
            .expect("documents lock")
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<(), WriteError> {
        if self.fail {
            return Err(WriteError::backend("index offline"));
        }
        self.documents.lock().expect("documents lock").remove(&id);
        Ok(())
    }

    async fn refresh_fields(&self) -> Result<(), WriteError> {
        if self.fail {
            return Err(WriteError::backend("index offline"));
        }
        *self.field_refreshes.lock().expect("refreshes lock") += 1;
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Server {
    dispatcher: NotificationDispatcher,
    stores: Arc<FakeStores>,
    objects: Arc<ObjectCache>,
    renders: Arc<RenderCacheSet>,
    /// Revision-scoped partition (preview search).
    internal: Arc<FakeIndex>,
    /// Publication-scoped partition (public search).
    external: Arc<FakeIndex>,
}

impl Server {
    fn start() -> Self {
        Self::with_partitions(Arc::new(FakeIndex::default()), Arc::new(FakeIndex::default()))
    }

    fn with_partitions(internal: Arc<FakeIndex>, external: Arc<FakeIndex>) -> Self {
        let config = InvalidationConfig::default();
        let stores = Arc::new(FakeStores::default());
        let objects = Arc::new(ObjectCache::new(&config));
        let renders = Arc::new(RenderCacheSet::new(&config));

        let registry = Arc::new(PartitionRegistry::new(vec![
            (IndexPartition::new("internal", true), internal.clone() as _),
            (IndexPartition::new("external", false), external.clone() as _),
        ]));

        let dispatcher = NotificationDispatcher::new(
            config.clone(),
            CacheInvalidator::new(config, objects.clone(), renders.clone()),
            ReindexDecisionEngine::new(stores.clone(), stores.clone(), stores.clone()),
            IndexApplier::new(registry),
            Arc::new(NotificationQueue::new()),
        );
        assert!(dispatcher.bind());

        Self {
            dispatcher,
            stores,
            objects,
            renders,
            internal,
            external,
        }
    }

    fn seed_content(&self, record: ContentRecord, published: Option<ContentRecord>) {
        let id = record.id;
        self.objects.put(CachedEntity::Content(record.clone()));
        self.stores
            .current
            .lock()
            .expect("current lock")
            .insert(id, record);
        if let Some(published) = published {
            self.stores
                .published
                .lock()
                .expect("published lock")
                .insert(id, published);
        }
        self.renders
            .put(RenderCacheKind::PartialView, "header", Bytes::from("<div/>"));
    }

    async fn broadcast_content(&self, batch: &[ActionSet]) -> bool {
        let payload = NotificationCodec::encode(batch).expect("encodable batch");
        self.dispatcher
            .receive(Notification::content_batch(payload))
            .await
    }
}

fn content(id: EntityId, name: &str, published: bool) -> ContentRecord {
    ContentRecord {
        id,
        name: name.to_string(),
        content_type: ContentTypeRef {
            alias: "article".to_string(),
            icon: "icon-article".to_string(),
        },
        published,
        fields: BTreeMap::from([("body".to_string(), "lorem".to_string())]),
    }
}

fn media(id: EntityId, trashed: bool) -> MediaRecord {
    MediaRecord {
        id,
        name: format!("asset-{id}"),
        content_type: ContentTypeRef {
            alias: "image".to_string(),
            icon: "icon-picture".to_string(),
        },
        trashed,
        fields: BTreeMap::new(),
    }
}

// ============================================================================
// Content flows
// ============================================================================

#[tokio::test]
async fn publish_converges_caches_and_both_partition_groups() {
    let server = Server::start();
    server.seed_content(content(42, "Launch note", true), None);

    server
        .broadcast_content(&[ActionSet::for_event(42, ChangeEvent::Publish)])
        .await;

    // local caches were invalidated
    assert!(server.objects.get(42).is_none());
    assert!(server.renders.is_empty());

    // both partition groups carry the document
    assert!(server.internal.contains(42));
    assert!(server.external.contains(42));

    let doc = server.external.document(42).expect("indexed document");
    assert_eq!(doc.fields.get("icon").map(String::as_str), Some("icon-article"));
    assert_eq!(
        doc.fields.get("__nameSort").map(String::as_str),
        Some("launch note")
    );
}

#[tokio::test]
async fn draft_save_reaches_only_preview_search() {
    let server = Server::start();
    server.seed_content(content(42, "Work in progress", false), None);

    server
        .broadcast_content(&[ActionSet::for_event(42, ChangeEvent::Save)])
        .await;

    assert!(server.internal.contains(42));
    assert!(!server.external.contains(42));
}

#[tokio::test]
async fn unpublish_demotes_to_preview_search_only() {
    let server = Server::start();
    let live = content(7, "Was live", true);
    server.seed_content(content(7, "Was live", false), Some(live.clone()));

    // the item starts out in both groups
    server
        .broadcast_content(&[ActionSet::for_event(7, ChangeEvent::Publish)])
        .await;

    server
        .broadcast_content(&[ActionSet::for_event(7, ChangeEvent::Unpublish)])
        .await;

    assert!(server.internal.contains(7));
    assert!(!server.external.contains(7));
}

#[tokio::test]
async fn permanent_delete_purges_every_partition() {
    let server = Server::start();
    server.seed_content(content(9, "Doomed", true), Some(content(9, "Doomed", true)));
    server
        .broadcast_content(&[ActionSet::for_event(9, ChangeEvent::Publish)])
        .await;

    server
        .broadcast_content(&[ActionSet::for_event(9, ChangeEvent::Delete)])
        .await;

    assert!(!server.internal.contains(9));
    assert!(!server.external.contains(9));
    assert!(server.objects.get(9).is_none());
}

#[tokio::test]
async fn reapplying_the_same_notification_is_idempotent() {
    let server = Server::start();
    server.seed_content(content(42, "Stable", true), None);

    let batch = [ActionSet::for_event(42, ChangeEvent::Publish)];
    server.broadcast_content(&batch).await;
    let internal_once = server.internal.snapshot();
    let external_once = server.external.snapshot();

    server.broadcast_content(&batch).await;
    assert_eq!(server.internal.snapshot(), internal_once);
    assert_eq!(server.external.snapshot(), external_once);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn malformed_payload_has_no_side_effects() {
    let server = Server::start();
    server.seed_content(content(1, "Untouched", true), None);

    let processed = server
        .dispatcher
        .receive(Notification::content_batch(b"{not a batch".to_vec()))
        .await;
    assert!(processed); // the notification was consumed, then rejected

    // fail closed: caches and indexes are exactly as seeded
    assert!(server.objects.get(1).is_some());
    assert!(!server.renders.is_empty());
    assert!(!server.internal.contains(1));
}

#[tokio::test]
async fn invalid_combination_is_isolated_from_the_rest_of_the_batch() {
    let server = Server::start();
    server.seed_content(content(2, "Good entry", false), None);

    let batch = [
        // removes newest while keeping published: a producer bug
        ActionSet::new(1, ChangeActions::REMOVE_NEWEST),
        ActionSet::for_event(2, ChangeEvent::Save),
    ];
    server.broadcast_content(&batch).await;

    // the bad entry yielded nothing, the good one was still indexed
    assert!(!server.internal.contains(1));
    assert!(server.internal.contains(2));
}

#[tokio::test]
async fn failing_partition_does_not_block_the_healthy_one() {
    let server =
        Server::with_partitions(Arc::new(FakeIndex::default()), Arc::new(FakeIndex::failing()));
    server.seed_content(content(4, "Resilient", true), None);

    server
        .broadcast_content(&[ActionSet::for_event(4, ChangeEvent::Publish)])
        .await;

    // the revision-scoped write succeeded even though the
    // publication-scoped partition is down
    assert!(server.internal.contains(4));
}

#[tokio::test]
async fn unsupported_content_shapes_are_declined_explicitly() {
    let server = Server::start();

    let err = server
        .dispatcher
        .handle(Notification {
            channel: rintocco::Channel::Content,
            shape: rintocco::MessageShape::RefreshById(5),
        })
        .await;

    assert!(matches!(
        err,
        Err(DispatchError::UnsupportedShape {
            channel: "content",
            ..
        })
    ));
}

// ============================================================================
// Media and members
// ============================================================================

#[tokio::test]
async fn trashed_media_leaves_public_search_but_stays_in_preview() {
    let server = Server::start();
    server
        .stores
        .media
        .lock()
        .expect("media lock")
        .insert(10, media(10, true));
    // the asset was indexed everywhere before being trashed
    server
        .internal
        .upsert(&SearchDocument::from_media(&media(10, false)))
        .await
        .expect("seed internal");
    server
        .external
        .upsert(&SearchDocument::from_media(&media(10, false)))
        .await
        .expect("seed external");

    server.dispatcher.receive(Notification::media_removed(10)).await;

    assert!(server.internal.contains(10));
    assert!(!server.external.contains(10));
}

#[tokio::test]
async fn media_batch_applies_each_operation() {
    let server = Server::start();
    {
        let mut stored = server.stores.media.lock().expect("media lock");
        stored.insert(20, media(20, false));
        stored.insert(21, media(21, false));
    }

    let payload = NotificationCodec::encode_media(&[
        rintocco::MediaChange::new(20, rintocco::MediaOperation::Saved),
        rintocco::MediaChange::new(21, rintocco::MediaOperation::Deleted),
    ])
    .expect("encodable batch");
    server
        .dispatcher
        .receive(Notification::media_batch(payload))
        .await;

    assert!(server.internal.contains(20));
    assert!(server.external.contains(20));
    assert!(!server.internal.contains(21));
}

#[tokio::test]
async fn members_have_no_publication_split() {
    let server = Server::start();
    server.stores.members.lock().expect("members lock").insert(
        5,
        MemberRecord {
            id: 5,
            name: "Ada".to_string(),
            email: Some("ada@example.org".to_string()),
            fields: BTreeMap::new(),
        },
    );

    server
        .dispatcher
        .receive(Notification::member_refreshed(5))
        .await;
    assert!(server.internal.contains(5));
    assert!(server.external.contains(5));

    server
        .dispatcher
        .receive(Notification::member_removed(5))
        .await;
    assert!(!server.internal.contains(5));
    assert!(!server.external.contains(5));
}

#[tokio::test]
async fn content_type_change_refreshes_field_definitions_everywhere() {
    let server = Server::start();

    server
        .dispatcher
        .receive(Notification::content_type_changed())
        .await;

    assert_eq!(server.internal.field_refreshes(), 1);
    assert_eq!(server.external.field_refreshes(), 1);
}

// ============================================================================
// Binding
// ============================================================================

#[tokio::test]
async fn bind_is_idempotent() {
    let server = Server::start(); // start() already bound once
    assert!(server.dispatcher.is_bound());
    assert!(!server.dispatcher.bind());
}

#[tokio::test]
async fn unbound_dispatcher_still_converges_local_caches() {
    let config = InvalidationConfig::default();
    let stores = Arc::new(FakeStores::default());
    let objects = Arc::new(ObjectCache::new(&config));
    let renders = Arc::new(RenderCacheSet::new(&config));
    let internal = Arc::new(FakeIndex::default());

    // every registered partition is disabled, so bind declines
    let registry = Arc::new(PartitionRegistry::new(vec![(
        IndexPartition::new("internal", true).disabled(),
        internal.clone() as _,
    )]));
    let dispatcher = NotificationDispatcher::new(
        config.clone(),
        CacheInvalidator::new(config, objects.clone(), renders.clone()),
        ReindexDecisionEngine::new(stores.clone(), stores.clone(), stores),
        IndexApplier::new(registry),
        Arc::new(NotificationQueue::new()),
    );
    assert!(!dispatcher.bind());

    objects.put(CachedEntity::Content(content(1, "Cached", true)));
    let payload =
        NotificationCodec::encode(&[ActionSet::for_event(1, ChangeEvent::Publish)])
            .expect("encodable batch");
    dispatcher
        .receive(Notification::content_batch(payload))
        .await;

    // cache invalidation ran, the reindex path did not
    assert!(objects.get(1).is_none());
    assert!(!internal.contains(1));
}
