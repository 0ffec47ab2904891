//! Shared fakes for the server integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;
use travelog_core::models::{NewTravelStory, StoryFields};
use travelog_core::{
    ImageError, ImageStore, ImageUpload, MemoryStoryStore, OwnerId, StoredImage, StoryFilter,
    StoryStore, TravelStory, TravelogError,
};
use travelog_server::subsystems::stories::{StoryInput, StoryLifecycle};
use uuid::Uuid;

pub const PLACEHOLDER_URL: &str = "https://ik.imagekit.io/demo/placeholder.png";

/// Image host double: remembers live assets and every delete call.
#[derive(Default)]
pub struct RecordingImages {
    next_id: AtomicUsize,
    live: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    pub fail_upload: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl RecordingImages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live(&self) -> Vec<String> {
        self.live.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> usize {
        self.next_id.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageStore for RecordingImages {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, ImageError> {
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(ImageError::Api {
                code: 500,
                message: "upload refused".to_string(),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let asset_id = format!("asset_{n}");
        self.live.lock().unwrap().push(asset_id.clone());
        Ok(StoredImage {
            url: format!("https://ik.imagekit.io/demo/{}/{}", asset_id, image.file_name),
            asset_id,
        })
    }

    async fn delete(&self, asset_id: &str) -> Result<bool, ImageError> {
        self.deleted.lock().unwrap().push(asset_id.to_string());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ImageError::Api {
                code: 503,
                message: "delete refused".to_string(),
            });
        }
        let mut live = self.live.lock().unwrap();
        let before = live.len();
        live.retain(|a| a != asset_id);
        Ok(live.len() < before)
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Record store double that can be told to fail writes.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStoryStore,
    pub fail_insert: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn check(flag: &AtomicBool) -> Result<(), TravelogError> {
        if flag.load(Ordering::SeqCst) {
            Err(TravelogError::Other("connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoryStore for FlakyStore {
    async fn insert(&self, story: NewTravelStory) -> Result<TravelStory, TravelogError> {
        Self::check(&self.fail_insert)?;
        self.inner.insert(story).await
    }

    async fn find_one(
        &self,
        owner: &OwnerId,
        id: Uuid,
    ) -> Result<Option<TravelStory>, TravelogError> {
        Self::check(&self.fail_reads)?;
        self.inner.find_one(owner, id).await
    }

    async fn find_all(&self, owner: &OwnerId) -> Result<Vec<TravelStory>, TravelogError> {
        Self::check(&self.fail_reads)?;
        self.inner.find_all(owner).await
    }

    async fn find_matching(
        &self,
        owner: &OwnerId,
        filter: &StoryFilter,
    ) -> Result<Vec<TravelStory>, TravelogError> {
        Self::check(&self.fail_reads)?;
        self.inner.find_matching(owner, filter).await
    }

    async fn update(&self, story: &TravelStory) -> Result<Option<TravelStory>, TravelogError> {
        Self::check(&self.fail_update)?;
        self.inner.update(story).await
    }

    async fn update_details(
        &self,
        owner: &OwnerId,
        id: Uuid,
        fields: &StoryFields,
    ) -> Result<Option<TravelStory>, TravelogError> {
        Self::check(&self.fail_update)?;
        self.inner.update_details(owner, id, fields).await
    }

    async fn set_favorite(
        &self,
        owner: &OwnerId,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<Option<TravelStory>, TravelogError> {
        Self::check(&self.fail_update)?;
        self.inner.set_favorite(owner, id, is_favorite).await
    }

    async fn remove(&self, owner: &OwnerId, id: Uuid) -> Result<bool, TravelogError> {
        self.inner.remove(owner, id).await
    }

    async fn health(&self) -> Result<String, TravelogError> {
        Self::check(&self.fail_reads)?;
        self.inner.health().await
    }
}

/// Which store write `GatedStore` holds back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedWrite {
    Details,
    Favorite,
}

/// Record store that parks the next gated write until released, so a test
/// can commit another operation in between.
#[derive(Default)]
pub struct GatedStore {
    pub inner: MemoryStoryStore,
    gate: Mutex<Option<GatedWrite>>,
    reached: Notify,
    resume: Notify,
}

impl GatedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hold_next(&self, write: GatedWrite) {
        *self.gate.lock().unwrap() = Some(write);
    }

    /// Wait until the held write has been entered.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.resume.notify_one();
    }

    async fn pass(&self, write: GatedWrite) {
        let held = {
            let mut gate = self.gate.lock().unwrap();
            if *gate == Some(write) {
                gate.take();
                true
            } else {
                false
            }
        };
        if held {
            self.reached.notify_one();
            self.resume.notified().await;
        }
    }
}

#[async_trait]
impl StoryStore for GatedStore {
    async fn insert(&self, story: NewTravelStory) -> Result<TravelStory, TravelogError> {
        self.inner.insert(story).await
    }

    async fn find_one(
        &self,
        owner: &OwnerId,
        id: Uuid,
    ) -> Result<Option<TravelStory>, TravelogError> {
        self.inner.find_one(owner, id).await
    }

    async fn find_all(&self, owner: &OwnerId) -> Result<Vec<TravelStory>, TravelogError> {
        self.inner.find_all(owner).await
    }

    async fn find_matching(
        &self,
        owner: &OwnerId,
        filter: &StoryFilter,
    ) -> Result<Vec<TravelStory>, TravelogError> {
        self.inner.find_matching(owner, filter).await
    }

    async fn update(&self, story: &TravelStory) -> Result<Option<TravelStory>, TravelogError> {
        self.inner.update(story).await
    }

    async fn update_details(
        &self,
        owner: &OwnerId,
        id: Uuid,
        fields: &StoryFields,
    ) -> Result<Option<TravelStory>, TravelogError> {
        self.pass(GatedWrite::Details).await;
        self.inner.update_details(owner, id, fields).await
    }

    async fn set_favorite(
        &self,
        owner: &OwnerId,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<Option<TravelStory>, TravelogError> {
        self.pass(GatedWrite::Favorite).await;
        self.inner.set_favorite(owner, id, is_favorite).await
    }

    async fn remove(&self, owner: &OwnerId, id: Uuid) -> Result<bool, TravelogError> {
        self.inner.remove(owner, id).await
    }

    async fn health(&self) -> Result<String, TravelogError> {
        self.inner.health().await
    }
}

pub fn lifecycle(store: Arc<FlakyStore>, images: Arc<RecordingImages>) -> StoryLifecycle {
    StoryLifecycle::new(store, images, PLACEHOLDER_URL)
}

pub fn lifecycle_over(store: Arc<dyn StoryStore>, images: Arc<RecordingImages>) -> StoryLifecycle {
    StoryLifecycle::new(store, images, PLACEHOLDER_URL)
}

pub fn input(title: &str, location: &str, visited_ms: i64) -> StoryInput {
    StoryInput {
        title: Some(title.to_string()),
        story: Some(format!("Notes from {title}")),
        visited_location: Some(location.to_string()),
        visited_date: Some(visited_ms.to_string()),
    }
}

pub fn png(name: &str) -> ImageUpload {
    ImageUpload {
        bytes: Bytes::from_static(b"\x89PNG fake image"),
        file_name: name.to_string(),
        content_type: "image/png".to_string(),
    }
}

/// 2024-01-15T00:00:00Z
pub const JAN_15_2024: i64 = 1_705_276_800_000;
/// 2024-03-01T00:00:00Z
pub const MAR_01_2024: i64 = 1_709_251_200_000;
/// 2024-06-10T00:00:00Z
pub const JUN_10_2024: i64 = 1_717_977_600_000;
