//! Story lifecycle subsystem: travel-story CRUD over the record store
//!
//! Coordinates the record store with the image host so that a stored story
//! never references an asset that has already been deleted:
//! - uploads happen before the row write, so an upload failure writes nothing
//! - an old asset is released only after the row pointing elsewhere is committed
//! - releases run as post-commit hooks; their failure is logged, never returned
//!
//! Concurrent edits of the same story are not serialized. The last write wins.

use std::sync::Arc;

use travelog_core::models::{parse_epoch_millis, NewTravelStory, StoryFields};
use travelog_core::{ImageStore, ImageUpload, OwnerId, StoryFilter, StoryStore, TravelStory};
use uuid::Uuid;

use crate::error::StoryError;

/// Unvalidated story fields as submitted by the client.
#[derive(Debug, Clone, Default)]
pub struct StoryInput {
    pub title: Option<String>,
    pub story: Option<String>,
    pub visited_location: Option<String>,
    /// Epoch milliseconds, still in textual form.
    pub visited_date: Option<String>,
}

impl StoryInput {
    pub fn validate(self) -> Result<StoryFields, StoryError> {
        let (Some(title), Some(narrative), Some(visited_location), Some(visited_date)) = (
            present(self.title),
            present(self.story),
            present(self.visited_location),
            present(self.visited_date),
        ) else {
            return Err(StoryError::validation("All fields are required"));
        };

        let visited_date = parse_epoch_millis(&visited_date)
            .map_err(|e| StoryError::validation(format!("Invalid visitedDate: {}", e)))?;

        Ok(StoryFields {
            title,
            narrative,
            visited_location,
            visited_date,
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// What an edit does to the story's image.
#[derive(Debug, Clone, Default)]
pub enum ImageChange {
    #[default]
    Keep,
    Replace(ImageUpload),
    /// Fall back to the placeholder image.
    Remove,
}

/// Outcome of a post-commit asset release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    AlreadyGone,
    Failed,
}

/// Deferred release of an image asset. Runs only after the write that
/// stopped referencing the asset has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending release does nothing until run"]
pub struct AssetRelease {
    asset_id: String,
    story_id: Uuid,
}

impl AssetRelease {
    fn new(asset_id: String, story_id: Uuid) -> Self {
        Self { asset_id, story_id }
    }

    /// Best-effort: failures are logged and reported, never propagated.
    pub async fn run(self, images: &dyn ImageStore) -> ReleaseOutcome {
        match images.delete(&self.asset_id).await {
            Ok(true) => {
                tracing::info!(
                    story_id = %self.story_id,
                    asset_id = %self.asset_id,
                    backend = images.name(),
                    "Released image asset"
                );
                ReleaseOutcome::Released
            }
            Ok(false) => {
                tracing::warn!(
                    story_id = %self.story_id,
                    asset_id = %self.asset_id,
                    "Image asset was already gone"
                );
                ReleaseOutcome::AlreadyGone
            }
            Err(e) => {
                tracing::error!(
                    story_id = %self.story_id,
                    asset_id = %self.asset_id,
                    error = %e,
                    "Failed to release image asset, it is now orphaned"
                );
                ReleaseOutcome::Failed
            }
        }
    }
}

/// Result of a committed write plus the cleanup it left behind.
struct Committed<T> {
    value: T,
    after_commit: Option<AssetRelease>,
}

impl<T> Committed<T> {
    async fn finish(self, images: &dyn ImageStore) -> (T, Option<ReleaseOutcome>) {
        let outcome = match self.after_commit {
            Some(release) => Some(release.run(images).await),
            None => None,
        };
        (self.value, outcome)
    }
}

/// Confirmation of a deleted story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedStory {
    pub id: Uuid,
    /// `None` when the story had no releasable asset.
    pub image_release: Option<ReleaseOutcome>,
}

pub struct StoryLifecycle {
    store: Arc<dyn StoryStore>,
    images: Arc<dyn ImageStore>,
    placeholder_url: String,
}

impl StoryLifecycle {
    pub fn new(
        store: Arc<dyn StoryStore>,
        images: Arc<dyn ImageStore>,
        placeholder_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            images,
            placeholder_url: placeholder_url.into(),
        }
    }

    pub fn store(&self) -> &dyn StoryStore {
        self.store.as_ref()
    }

    pub async fn create(
        &self,
        owner: &OwnerId,
        input: StoryInput,
        image: Option<ImageUpload>,
    ) -> Result<TravelStory, StoryError> {
        let fields = input.validate()?;

        let new_story = match image {
            Some(image) => {
                ensure_image(&image)?;
                let stored = self.images.upload(image).await?;
                NewTravelStory::with_image(owner.clone(), fields, stored)
            }
            None => NewTravelStory::with_placeholder(owner.clone(), fields, &self.placeholder_url),
        };

        let story_id = new_story.id;
        let uploaded = new_story.image_asset_id.clone();

        match self.store.insert(new_story).await {
            Ok(story) => {
                tracing::info!(
                    story_id = %story.id,
                    owner = %owner,
                    has_image = story.image_asset_id.is_some(),
                    "Created travel story"
                );
                Ok(story)
            }
            Err(e) => {
                tracing::error!(story_id = %story_id, error = %e, "Failed to insert travel story");
                self.discard_upload(uploaded, story_id).await;
                Err(e.into())
            }
        }
    }

    pub async fn get(&self, owner: &OwnerId, id: Uuid) -> Result<TravelStory, StoryError> {
        self.store
            .find_one(owner, id)
            .await?
            .ok_or(StoryError::NotFound)
    }

    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<TravelStory>, StoryError> {
        Ok(self.store.find_all(owner).await?)
    }

    pub async fn search(&self, owner: &OwnerId, query: &str) -> Result<Vec<TravelStory>, StoryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(StoryError::validation("Query is required!"));
        }

        let filter = StoryFilter::Text(query.to_string());
        Ok(self.store.find_matching(owner, &filter).await?)
    }

    /// Stories visited within `[start, end]`, both given as epoch milliseconds.
    ///
    /// Missing or malformed bounds are a validation error; an inverted range
    /// simply matches nothing.
    pub async fn filter_by_date_range(
        &self,
        owner: &OwnerId,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<TravelStory>, StoryError> {
        let (Some(start), Some(end)) = (start, end) else {
            return Err(StoryError::validation("startDate and endDate are required"));
        };
        let start = parse_epoch_millis(start)
            .map_err(|e| StoryError::validation(format!("Invalid startDate: {}", e)))?;
        let end = parse_epoch_millis(end)
            .map_err(|e| StoryError::validation(format!("Invalid endDate: {}", e)))?;

        if start > end {
            tracing::debug!(%start, %end, "Inverted date range, nothing to match");
            return Ok(Vec::new());
        }

        let filter = StoryFilter::VisitedBetween { start, end };
        Ok(self.store.find_matching(owner, &filter).await?)
    }

    /// Edit a story's text and date, and optionally its image.
    ///
    /// Each write touches only the columns the edit owns: a text-only edit
    /// never rewrites the image reference, so it cannot undo a concurrent
    /// image swap.
    pub async fn update(
        &self,
        owner: &OwnerId,
        id: Uuid,
        input: StoryInput,
        change: ImageChange,
    ) -> Result<TravelStory, StoryError> {
        let fields = input.validate()?;
        let image = match change {
            ImageChange::Keep => {
                let written = self
                    .store
                    .update_details(owner, id, &fields)
                    .await?
                    .ok_or(StoryError::NotFound)?;
                tracing::info!(story_id = %id, owner = %owner, "Updated travel story");
                return Ok(written);
            }
            ImageChange::Replace(image) => {
                ensure_image(&image)?;
                Some(image)
            }
            ImageChange::Remove => None,
        };

        let mut story = self.get(owner, id).await?;
        let old_asset = self.releasable_asset(&story);
        story.apply_fields(fields);

        let uploaded = match image {
            Some(image) => {
                let stored = self.images.upload(image).await?;
                let asset_id = stored.asset_id.clone();
                story.attach_image(stored);
                Some(asset_id)
            }
            None => {
                story.detach_image(&self.placeholder_url);
                None
            }
        };

        let written = match self.store.update(&story).await {
            Ok(Some(written)) => written,
            Ok(None) => {
                self.discard_upload(uploaded, id).await;
                return Err(StoryError::NotFound);
            }
            Err(e) => {
                tracing::error!(story_id = %id, error = %e, "Failed to update travel story");
                self.discard_upload(uploaded, id).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            story_id = %id,
            owner = %owner,
            new_asset = uploaded.is_some(),
            "Updated travel story image"
        );

        let committed = Committed {
            value: written,
            after_commit: old_asset.map(|asset_id| AssetRelease::new(asset_id, id)),
        };
        let (story, _) = committed.finish(self.images.as_ref()).await;
        Ok(story)
    }

    pub async fn delete(&self, owner: &OwnerId, id: Uuid) -> Result<DeletedStory, StoryError> {
        let story = self.get(owner, id).await?;
        let release = self
            .releasable_asset(&story)
            .map(|asset_id| AssetRelease::new(asset_id, id));

        if !self.store.remove(owner, id).await? {
            return Err(StoryError::NotFound);
        }
        tracing::info!(story_id = %id, owner = %owner, "Deleted travel story");

        let committed = Committed {
            value: id,
            after_commit: release,
        };
        let (id, image_release) = committed.finish(self.images.as_ref()).await;
        Ok(DeletedStory { id, image_release })
    }

    pub async fn set_favorite(
        &self,
        owner: &OwnerId,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<TravelStory, StoryError> {
        let written = self
            .store
            .set_favorite(owner, id, is_favorite)
            .await?
            .ok_or(StoryError::NotFound)?;

        tracing::info!(story_id = %id, is_favorite, "Updated favorite flag");
        Ok(written)
    }

    /// The asset a story owns, if any. The shared placeholder is never released.
    fn releasable_asset(&self, story: &TravelStory) -> Option<String> {
        story
            .image_asset_id
            .clone()
            .filter(|_| story.image_url != self.placeholder_url)
    }

    /// Release an asset uploaded for a write that did not commit.
    async fn discard_upload(&self, uploaded: Option<String>, story_id: Uuid) {
        if let Some(asset_id) = uploaded {
            AssetRelease::new(asset_id, story_id)
                .run(self.images.as_ref())
                .await;
        }
    }
}

fn ensure_image(image: &ImageUpload) -> Result<(), StoryError> {
    if image.is_image() {
        Ok(())
    } else {
        Err(StoryError::validation("Only images are allowed"))
    }
}
