//! Entity records and search documents.
//!
//! Content has two lifecycle axes — the newest saved revision and the
//! currently published revision — that may reference different data.
//! Media and members carry a single state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier shared by content, media, and member entities.
///
/// Part of the cluster wire contract: notifications address entities by
/// this integer id.
pub type EntityId = i64;

/// Field under which the lowercased display name is indexed, so
/// case-insensitive search works with a whitespace analyzer.
pub const NAME_SORT_FIELD: &str = "__nameSort";

/// Field carrying the content-type icon reference on indexed documents.
pub const ICON_FIELD: &str = "icon";

/// Reference to the content type an entity was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeRef {
    pub alias: String,
    /// Display icon reference, indexed alongside the entity fields.
    pub icon: String,
}

/// One revision of a content entity as read from the data store.
///
/// `published` marks whether this revision is the one currently live.
/// The published revision never leads the newest revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: EntityId,
    pub name: String,
    pub content_type: ContentTypeRef,
    pub published: bool,
    pub fields: BTreeMap<String, String>,
}

/// A media entity. `trashed` plays the structural role that "unpublished"
/// plays for content: trashed media leaves public search but stays visible
/// to preview search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: EntityId,
    pub name: String,
    pub content_type: ContentTypeRef,
    pub trashed: bool,
    pub fields: BTreeMap<String, String>,
}

/// A member entity. Members have no publication split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: EntityId,
    pub name: String,
    pub email: Option<String>,
    pub fields: BTreeMap<String, String>,
}

/// The kind of entity a search document was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Content,
    Media,
    Member,
}

/// Flattened representation handed to index partitions.
///
/// Built by the transform below, never constructed from raw entity data
/// elsewhere: index consumers rely on the derived annotations being
/// present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: EntityId,
    pub kind: DocumentKind,
    pub fields: BTreeMap<String, String>,
}

impl SearchDocument {
    /// Build the indexable document for a content revision.
    ///
    /// Annotates the raw fields with the content-type icon and the
    /// lowercased name sort field.
    pub fn from_content(content: &ContentRecord) -> Self {
        let mut fields = content.fields.clone();
        fields.insert("name".to_string(), content.name.clone());
        fields.insert(ICON_FIELD.to_string(), content.content_type.icon.clone());
        fields.insert(NAME_SORT_FIELD.to_string(), content.name.to_lowercase());
        Self {
            id: content.id,
            kind: DocumentKind::Content,
            fields,
        }
    }

    /// Build the indexable document for a media entity.
    pub fn from_media(media: &MediaRecord) -> Self {
        let mut fields = media.fields.clone();
        fields.insert("name".to_string(), media.name.clone());
        fields.insert(ICON_FIELD.to_string(), media.content_type.icon.clone());
        fields.insert(NAME_SORT_FIELD.to_string(), media.name.to_lowercase());
        Self {
            id: media.id,
            kind: DocumentKind::Media,
            fields,
        }
    }

    /// Build the indexable document for a member.
    ///
    /// Members have no content type, so no icon annotation is added.
    pub fn from_member(member: &MemberRecord) -> Self {
        let mut fields = member.fields.clone();
        fields.insert("name".to_string(), member.name.clone());
        if let Some(email) = &member.email {
            fields.insert("email".to_string(), email.clone());
        }
        fields.insert(NAME_SORT_FIELD.to_string(), member.name.to_lowercase());
        Self {
            id: member.id,
            kind: DocumentKind::Member,
            fields,
        }
    }
}
