use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::images::StoredImage;

/// Identity of the authenticated user a story belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TravelStory {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(rename = "story")]
    #[sqlx(rename = "story")]
    pub narrative: String,
    pub visited_location: String,
    pub visited_date: DateTime<Utc>,
    pub image_url: String,
    pub image_asset_id: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
}

impl TravelStory {
    /// Point the story at a freshly stored image. Returns the asset it used to reference.
    pub fn attach_image(&mut self, image: StoredImage) -> Option<String> {
        self.image_url = image.url;
        self.image_asset_id.replace(image.asset_id)
    }

    /// Fall back to the shared placeholder. Returns the asset it used to reference.
    pub fn detach_image(&mut self, placeholder_url: &str) -> Option<String> {
        self.image_url = placeholder_url.to_string();
        self.image_asset_id.take()
    }

    pub fn apply_fields(&mut self, fields: StoryFields) {
        self.title = fields.title;
        self.narrative = fields.narrative;
        self.visited_location = fields.visited_location;
        self.visited_date = fields.visited_date;
    }
}

/// The caller-editable text and date of a story, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryFields {
    pub title: String,
    pub narrative: String,
    pub visited_location: String,
    pub visited_date: DateTime<Utc>,
}

/// A story that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTravelStory {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub fields: StoryFields,
    pub image_url: String,
    pub image_asset_id: Option<String>,
}

impl NewTravelStory {
    pub fn with_placeholder(owner_id: OwnerId, fields: StoryFields, placeholder_url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            fields,
            image_url: placeholder_url.to_string(),
            image_asset_id: None,
        }
    }

    pub fn with_image(owner_id: OwnerId, fields: StoryFields, image: StoredImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            fields,
            image_url: image.url,
            image_asset_id: Some(image.asset_id),
        }
    }

    /// Materialize the stored record, stamping the creation time.
    pub fn into_story(self, created_at: DateTime<Utc>) -> TravelStory {
        TravelStory {
            id: self.id,
            owner_id: self.owner_id,
            title: self.fields.title,
            narrative: self.fields.narrative,
            visited_location: self.fields.visited_location,
            visited_date: self.fields.visited_date,
            image_url: self.image_url,
            image_asset_id: self.image_asset_id,
            is_favorite: false,
            created_at,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' is not a valid epoch-millisecond timestamp")]
pub struct InvalidTimestamp(pub String);

/// Parse an epoch-millisecond timestamp such as `"1705276800000"`.
///
/// Surrounding whitespace is ignored; anything else that is not an integer
/// inside chrono's representable range is rejected.
pub fn parse_epoch_millis(raw: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| InvalidTimestamp(raw.to_string()))
}
