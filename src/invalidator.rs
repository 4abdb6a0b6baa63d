//! Local cache invalidation.
//!
//! Runs before any index work: it is cheap and purely local. Each server
//! clears its own copies upon receiving the broadcast.

use std::sync::Arc;

use tracing::debug;

use crate::actions::ActionSet;
use crate::config::InvalidationConfig;
use crate::entities::EntityId;
use crate::store::{ObjectCache, RenderCacheSet};

/// Evicts local caches affected by a notification batch.
///
/// Two independent checks per action set: published-affecting bits clear
/// every render cache, newest-affecting bits evict the entity's record
/// from the object cache. A single action set may trigger both.
pub struct CacheInvalidator {
    config: InvalidationConfig,
    objects: Arc<ObjectCache>,
    renders: Arc<RenderCacheSet>,
}

impl CacheInvalidator {
    pub fn new(
        config: InvalidationConfig,
        objects: Arc<ObjectCache>,
        renders: Arc<RenderCacheSet>,
    ) -> Self {
        Self {
            config,
            objects,
            renders,
        }
    }

    /// Apply one action set to the local caches.
    pub fn apply(&self, set: &ActionSet) {
        if set.actions.affects_published() && self.config.enable_render_cache {
            self.renders.clear_all();
            debug!(entity_id = set.id, "Cleared render caches");
        }

        if set.actions.affects_newest() && self.config.enable_object_cache {
            self.objects.evict(set.id);
            debug!(entity_id = set.id, "Evicted entity from object cache");
        }
    }

    /// Apply a whole batch in order.
    pub fn apply_batch(&self, batch: &[ActionSet]) {
        for set in batch {
            self.apply(set);
        }
    }

    /// Evict one entity from the object cache (media/member paths, which
    /// carry no action bitmask).
    pub fn evict_entity(&self, id: EntityId) {
        if self.config.enable_object_cache {
            self.objects.evict(id);
        }
    }

    pub fn objects(&self) -> &Arc<ObjectCache> {
        &self.objects
    }

    pub fn renders(&self) -> &Arc<RenderCacheSet> {
        &self.renders
    }
}
