//! Local cache storage.
//!
//! `ObjectCache`: entity records keyed by id, LRU-bounded.
//! `RenderCacheSet`: rendered fragments (partial views, macros,
//! transforms) that become stale whenever any published representation
//! changes.

use std::sync::RwLock;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use crate::config::InvalidationConfig;
use crate::entities::{ContentRecord, EntityId, MediaRecord, MemberRecord};
use crate::lock::{rw_read, rw_write};

const SOURCE: &str = "store";

const METRIC_OBJECT_HIT_TOTAL: &str = "rintocco_object_cache_hit_total";
const METRIC_OBJECT_MISS_TOTAL: &str = "rintocco_object_cache_miss_total";
const METRIC_RENDER_CLEAR_TOTAL: &str = "rintocco_render_cache_clear_total";

/// An entity record held in the object cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedEntity {
    Content(ContentRecord),
    Media(MediaRecord),
    Member(MemberRecord),
}

impl CachedEntity {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Content(record) => record.id,
            Self::Media(record) => record.id,
            Self::Member(record) => record.id,
        }
    }
}

/// In-memory object cache for entity records, keyed by entity id.
pub struct ObjectCache {
    entries: RwLock<LruCache<EntityId, CachedEntity>>,
}

impl ObjectCache {
    pub fn new(config: &InvalidationConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.object_limit_non_zero())),
        }
    }

    pub fn get(&self, id: EntityId) -> Option<CachedEntity> {
        let found = rw_write(&self.entries, SOURCE, "object.get")
            .get(&id)
            .cloned();
        if found.is_some() {
            counter!(METRIC_OBJECT_HIT_TOTAL).increment(1);
        } else {
            counter!(METRIC_OBJECT_MISS_TOTAL).increment(1);
        }
        found
    }

    pub fn put(&self, entity: CachedEntity) {
        rw_write(&self.entries, SOURCE, "object.put").put(entity.id(), entity);
    }

    /// Drop the record for an entity id. Absent ids are a no-op.
    pub fn evict(&self, id: EntityId) {
        rw_write(&self.entries, SOURCE, "object.evict").pop(&id);
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "object.clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "object.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The derived-render caches cleared on any published-state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCacheKind {
    PartialView,
    Macro,
    Transform,
}

/// Rendered-fragment caches, one per kind, each LRU-bounded.
///
/// Fragments are derived from published content in ways the notification
/// cannot attribute to single entities, so invalidation clears all three
/// caches wholesale.
pub struct RenderCacheSet {
    partial_views: RwLock<LruCache<String, Bytes>>,
    macros: RwLock<LruCache<String, Bytes>>,
    transforms: RwLock<LruCache<String, Bytes>>,
}

impl RenderCacheSet {
    pub fn new(config: &InvalidationConfig) -> Self {
        let limit = config.render_fragment_limit_non_zero();
        Self {
            partial_views: RwLock::new(LruCache::new(limit)),
            macros: RwLock::new(LruCache::new(limit)),
            transforms: RwLock::new(LruCache::new(limit)),
        }
    }

    fn cache(&self, kind: RenderCacheKind) -> &RwLock<LruCache<String, Bytes>> {
        match kind {
            RenderCacheKind::PartialView => &self.partial_views,
            RenderCacheKind::Macro => &self.macros,
            RenderCacheKind::Transform => &self.transforms,
        }
    }

    pub fn get(&self, kind: RenderCacheKind, key: &str) -> Option<Bytes> {
        rw_write(self.cache(kind), SOURCE, "render.get")
            .get(key)
            .cloned()
    }

    pub fn put(&self, kind: RenderCacheKind, key: impl Into<String>, fragment: Bytes) {
        rw_write(self.cache(kind), SOURCE, "render.put").put(key.into(), fragment);
    }

    /// Clear every render cache on this server.
    pub fn clear_all(&self) {
        rw_write(&self.partial_views, SOURCE, "render.clear_all").clear();
        rw_write(&self.macros, SOURCE, "render.clear_all").clear();
        rw_write(&self.transforms, SOURCE, "render.clear_all").clear();
        counter!(METRIC_RENDER_CLEAR_TOTAL).increment(1);
    }

    pub fn len(&self, kind: RenderCacheKind) -> usize {
        rw_read(self.cache(kind), SOURCE, "render.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len(RenderCacheKind::PartialView) == 0
            && self.len(RenderCacheKind::Macro) == 0
            && self.len(RenderCacheKind::Transform) == 0
    }
}
