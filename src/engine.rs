//! Reindex decision engine.
//!
//! Computes, from one notification item and the current entity state,
//! the ordered index operations that converge the search partitions. The
//! engine is a pure function of its inputs plus the injected readers; it
//! performs no writes itself.

use std::sync::Arc;

use thiserror::Error;

use crate::actions::{ActionSet, ChangeActions, MediaChange, MediaOperation};
use crate::entities::{EntityId, SearchDocument};
use crate::partitions::IndexTarget;
use crate::state::{ContentReader, MediaReader, MemberReader, StateError};

/// What to do against one partition group.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOp {
    Upsert(SearchDocument),
    Delete,
}

/// One computed index operation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOperation {
    pub entity_id: EntityId,
    pub target: IndexTarget,
    pub op: IndexOp,
}

impl IndexOperation {
    pub fn upsert(target: IndexTarget, document: SearchDocument) -> Self {
        Self {
            entity_id: document.id,
            target,
            op: IndexOp::Upsert(document),
        }
    }

    pub fn delete(entity_id: EntityId, target: IndexTarget) -> Self {
        Self {
            entity_id,
            target,
            op: IndexOp::Delete,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The producer asked to purge the newest representation while keeping
    /// the published one — structurally unreachable from the event mapping,
    /// so it indicates a protocol bug upstream.
    #[error("entity {id}: notification removes the newest representation but keeps the published one")]
    InvalidActionCombination { id: EntityId },
    #[error(transparent)]
    State(#[from] StateError),
}

/// Decides which index partitions to refresh or purge for a notification.
///
/// All collaborators are injected; the engine holds no ambient state.
pub struct ReindexDecisionEngine {
    content: Arc<dyn ContentReader>,
    media: Arc<dyn MediaReader>,
    members: Arc<dyn MemberReader>,
}

impl ReindexDecisionEngine {
    pub fn new(
        content: Arc<dyn ContentReader>,
        media: Arc<dyn MediaReader>,
        members: Arc<dyn MemberReader>,
    ) -> Self {
        Self {
            content,
            media,
            members,
        }
    }

    /// Plan the index operations for one content action set.
    ///
    /// Decision order matters: a permanent delete short-circuits, an
    /// unpublish purges public search and then re-derives the preview
    /// representation from the newest revision, refreshes fetch and
    /// upsert. Absent entities are no-ops. Bulk bits produce no
    /// operations on this path.
    pub async fn plan_content(
        &self,
        set: &ActionSet,
    ) -> Result<Vec<IndexOperation>, EngineError> {
        let actions = set.actions;
        let mut ops = Vec::new();

        if actions.contains(ChangeActions::REMOVE_NEWEST) {
            if !actions.contains(ChangeActions::REMOVE_PUBLISHED) {
                return Err(EngineError::InvalidActionCombination { id: set.id });
            }
            // permanent delete: purge every partition, nothing else applies
            ops.push(IndexOperation::delete(set.id, IndexTarget::All));
            return Ok(ops);
        }

        let unpublishing = actions.contains(ChangeActions::REMOVE_PUBLISHED);
        if unpublishing {
            ops.push(IndexOperation::delete(set.id, IndexTarget::Published));
        }

        // An unpublish demotes the item, it does not leave preview search:
        // re-derive the revision-scoped document from the newest revision.
        let mut current = None;
        if actions.contains(ChangeActions::REFRESH_NEWEST) || unpublishing {
            current = self.content.get_current(set.id).await?;
            if let Some(record) = &current {
                ops.push(IndexOperation::upsert(
                    IndexTarget::Revisions,
                    SearchDocument::from_content(record),
                ));
            }
        }

        if actions.contains(ChangeActions::REFRESH_PUBLISHED) && !unpublishing {
            let published = match current {
                Some(record) if record.published => Some(record),
                _ => self.content.get_published(set.id).await?,
            };
            if let Some(record) = published {
                ops.push(IndexOperation::upsert(
                    IndexTarget::Published,
                    SearchDocument::from_content(&record),
                ));
            }
        }

        Ok(ops)
    }

    /// Plan the index operations for one media change.
    ///
    /// Trashed media leaves public search but stays visible to preview
    /// search; a permanent delete purges every partition.
    pub async fn plan_media(
        &self,
        change: &MediaChange,
    ) -> Result<Vec<IndexOperation>, EngineError> {
        match change.operation {
            MediaOperation::Saved => {
                let Some(media) = self.media.get_media(change.id).await? else {
                    return Ok(Vec::new());
                };
                if media.trashed {
                    Ok(vec![
                        IndexOperation::delete(change.id, IndexTarget::Published),
                        IndexOperation::upsert(
                            IndexTarget::Revisions,
                            SearchDocument::from_media(&media),
                        ),
                    ])
                } else {
                    Ok(vec![IndexOperation::upsert(
                        IndexTarget::All,
                        SearchDocument::from_media(&media),
                    )])
                }
            }
            MediaOperation::Trashed => {
                let mut ops = vec![IndexOperation::delete(change.id, IndexTarget::Published)];
                if let Some(media) = self.media.get_media(change.id).await? {
                    ops.push(IndexOperation::upsert(
                        IndexTarget::Revisions,
                        SearchDocument::from_media(&media),
                    ));
                }
                Ok(ops)
            }
            MediaOperation::Deleted => {
                Ok(vec![IndexOperation::delete(change.id, IndexTarget::All)])
            }
        }
    }

    /// Plan a member refresh: members have no publication split, so the
    /// document goes to every enabled partition.
    pub async fn plan_member_refresh(
        &self,
        id: EntityId,
    ) -> Result<Vec<IndexOperation>, EngineError> {
        let Some(member) = self.members.get_member(id).await? else {
            return Ok(Vec::new());
        };
        Ok(vec![IndexOperation::upsert(
            IndexTarget::All,
            SearchDocument::from_member(&member),
        )])
    }

    /// Plan a member removal (permanent delete).
    pub async fn plan_member_remove(
        &self,
        id: EntityId,
    ) -> Result<Vec<IndexOperation>, EngineError> {
        Ok(vec![IndexOperation::delete(id, IndexTarget::All)])
    }
}
