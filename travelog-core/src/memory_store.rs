//! In-process story store, for local development and tests.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::TravelogError;
use crate::models::{NewTravelStory, OwnerId, StoryFields, TravelStory};
use crate::store::{StoryFilter, StoryStore};

#[derive(Default)]
struct Inner {
    next_seq: u64,
    // (insertion sequence, story)
    rows: Vec<(u64, TravelStory)>,
}

#[derive(Default)]
pub struct MemoryStoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply `change` to one owned row under the write lock. Identity and
    /// creation time are never touched.
    async fn modify(
        &self,
        owner: &OwnerId,
        id: Uuid,
        change: impl FnOnce(&mut TravelStory),
    ) -> Option<TravelStory> {
        let mut inner = self.inner.write().await;
        let (_, existing) = inner
            .rows
            .iter_mut()
            .find(|(_, s)| s.id == id && &s.owner_id == owner)?;
        change(existing);
        Some(existing.clone())
    }

    fn ordered<'a>(rows: impl Iterator<Item = &'a (u64, TravelStory)>) -> Vec<TravelStory> {
        let mut selected: Vec<&(u64, TravelStory)> = rows.collect();
        selected.sort_by(|(a_seq, a), (b_seq, b)| {
            b.is_favorite
                .cmp(&a.is_favorite)
                .then_with(|| a_seq.cmp(b_seq))
        });
        selected.into_iter().map(|(_, story)| story.clone()).collect()
    }
}

#[async_trait]
impl StoryStore for MemoryStoryStore {
    async fn insert(&self, story: NewTravelStory) -> Result<TravelStory, TravelogError> {
        let mut inner = self.inner.write().await;
        if inner.rows.iter().any(|(_, s)| s.id == story.id) {
            return Err(TravelogError::DuplicateStory(story.id));
        }

        let stored = story.into_story(Utc::now());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.rows.push((seq, stored.clone()));
        Ok(stored)
    }

    async fn find_one(
        &self,
        owner: &OwnerId,
        id: Uuid,
    ) -> Result<Option<TravelStory>, TravelogError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .iter()
            .find(|(_, s)| s.id == id && &s.owner_id == owner)
            .map(|(_, s)| s.clone()))
    }

    async fn find_all(&self, owner: &OwnerId) -> Result<Vec<TravelStory>, TravelogError> {
        let inner = self.inner.read().await;
        Ok(Self::ordered(
            inner.rows.iter().filter(|(_, s)| &s.owner_id == owner),
        ))
    }

    async fn find_matching(
        &self,
        owner: &OwnerId,
        filter: &StoryFilter,
    ) -> Result<Vec<TravelStory>, TravelogError> {
        let inner = self.inner.read().await;
        Ok(Self::ordered(
            inner
                .rows
                .iter()
                .filter(|(_, s)| &s.owner_id == owner && filter.matches(s)),
        ))
    }

    async fn update(&self, story: &TravelStory) -> Result<Option<TravelStory>, TravelogError> {
        Ok(self
            .modify(&story.owner_id, story.id, |existing| {
                existing.title = story.title.clone();
                existing.narrative = story.narrative.clone();
                existing.visited_location = story.visited_location.clone();
                existing.visited_date = story.visited_date;
                existing.image_url = story.image_url.clone();
                existing.image_asset_id = story.image_asset_id.clone();
            })
            .await)
    }

    async fn update_details(
        &self,
        owner: &OwnerId,
        id: Uuid,
        fields: &StoryFields,
    ) -> Result<Option<TravelStory>, TravelogError> {
        Ok(self
            .modify(owner, id, |existing| existing.apply_fields(fields.clone()))
            .await)
    }

    async fn set_favorite(
        &self,
        owner: &OwnerId,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<Option<TravelStory>, TravelogError> {
        Ok(self
            .modify(owner, id, |existing| existing.is_favorite = is_favorite)
            .await)
    }

    async fn remove(&self, owner: &OwnerId, id: Uuid) -> Result<bool, TravelogError> {
        let mut inner = self.inner.write().await;
        let before = inner.rows.len();
        inner
            .rows
            .retain(|(_, s)| !(s.id == id && &s.owner_id == owner));
        Ok(inner.rows.len() < before)
    }

    async fn health(&self) -> Result<String, TravelogError> {
        let count = self.len().await;
        Ok(format!("in-memory store ({} stories)", count))
    }
}
