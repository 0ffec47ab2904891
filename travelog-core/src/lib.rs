pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod memory_store;
pub mod models;
pub mod store;

pub use config::TravelogConfig;
pub use error::TravelogError;
pub use images::{ImageError, ImageKitClient, ImageStore, ImageUpload, StoredImage};
pub use memory_store::MemoryStoryStore;
pub use models::{OwnerId, TravelStory};
pub use store::{PgStoryStore, StoryFilter, StoryStore};
