use thiserror::Error;
use uuid::Uuid;

/// Failure inside a record store.
#[derive(Error, Debug)]
pub enum TravelogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Story {0} already exists")]
    DuplicateStory(Uuid),

    #[error("Other error: {0}")]
    Other(String),
}
