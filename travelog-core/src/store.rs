//! Record store for travel stories
//!
//! Every operation takes the owner explicitly; there is no way to read or
//! write a story without naming whose it is. Result sets are ordered
//! favorites first, then by insertion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::TravelogError;
use crate::models::{NewTravelStory, OwnerId, StoryFields, TravelStory};

/// Predicate for `StoryStore::find_matching`.
#[derive(Debug, Clone, PartialEq)]
pub enum StoryFilter {
    /// Case-insensitive literal substring of title, story or visited location.
    Text(String),
    /// Visited date within the inclusive range.
    VisitedBetween {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl StoryFilter {
    pub fn matches(&self, story: &TravelStory) -> bool {
        match self {
            Self::Text(query) => {
                let needle = query.to_lowercase();
                [&story.title, &story.narrative, &story.visited_location]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            Self::VisitedBetween { start, end } => {
                story.visited_date >= *start && story.visited_date <= *end
            }
        }
    }
}

#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn insert(&self, story: NewTravelStory) -> Result<TravelStory, TravelogError>;

    async fn find_one(&self, owner: &OwnerId, id: Uuid)
        -> Result<Option<TravelStory>, TravelogError>;

    async fn find_all(&self, owner: &OwnerId) -> Result<Vec<TravelStory>, TravelogError>;

    async fn find_matching(
        &self,
        owner: &OwnerId,
        filter: &StoryFilter,
    ) -> Result<Vec<TravelStory>, TravelogError>;

    /// Overwrite the text, date and image columns of an existing story.
    /// The favorite flag is left alone.
    /// Returns `None` if the row no longer exists under the story's owner.
    async fn update(&self, story: &TravelStory) -> Result<Option<TravelStory>, TravelogError>;

    /// Overwrite only the text and date columns, leaving the image reference
    /// and favorite flag as currently stored.
    async fn update_details(
        &self,
        owner: &OwnerId,
        id: Uuid,
        fields: &StoryFields,
    ) -> Result<Option<TravelStory>, TravelogError>;

    async fn set_favorite(
        &self,
        owner: &OwnerId,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<Option<TravelStory>, TravelogError>;

    async fn remove(&self, owner: &OwnerId, id: Uuid) -> Result<bool, TravelogError>;

    /// Short description of the backing store for health reporting.
    async fn health(&self) -> Result<String, TravelogError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

const STORY_COLUMNS: &str = "id, owner_id, title, story, visited_location, visited_date, \
     image_url, image_asset_id, is_favorite, created_at";

const ORDER_BY: &str = "ORDER BY is_favorite DESC, seq ASC";

#[derive(Clone)]
pub struct PgStoryStore {
    pool: PgPool,
}

impl PgStoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Escape LIKE metacharacters so the query matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl StoryStore for PgStoryStore {
    async fn insert(&self, story: NewTravelStory) -> Result<TravelStory, TravelogError> {
        let sql = format!(
            r#"
            INSERT INTO travel_stories
                (id, owner_id, title, story, visited_location, visited_date, image_url, image_asset_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {STORY_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, TravelStory>(&sql)
            .bind(story.id)
            .bind(story.owner_id.as_str())
            .bind(&story.fields.title)
            .bind(&story.fields.narrative)
            .bind(&story.fields.visited_location)
            .bind(story.fields.visited_date)
            .bind(&story.image_url)
            .bind(&story.image_asset_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_one(
        &self,
        owner: &OwnerId,
        id: Uuid,
    ) -> Result<Option<TravelStory>, TravelogError> {
        let sql = format!("SELECT {STORY_COLUMNS} FROM travel_stories WHERE owner_id = $1 AND id = $2");

        let row = sqlx::query_as::<_, TravelStory>(&sql)
            .bind(owner.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, owner: &OwnerId) -> Result<Vec<TravelStory>, TravelogError> {
        let sql = format!("SELECT {STORY_COLUMNS} FROM travel_stories WHERE owner_id = $1 {ORDER_BY}");

        let rows = sqlx::query_as::<_, TravelStory>(&sql)
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn find_matching(
        &self,
        owner: &OwnerId,
        filter: &StoryFilter,
    ) -> Result<Vec<TravelStory>, TravelogError> {
        let rows = match filter {
            StoryFilter::Text(query) => {
                let sql = format!(
                    r#"
                    SELECT {STORY_COLUMNS} FROM travel_stories
                    WHERE owner_id = $1
                      AND (title ILIKE $2 ESCAPE '\'
                           OR story ILIKE $2 ESCAPE '\'
                           OR visited_location ILIKE $2 ESCAPE '\')
                    {ORDER_BY}
                    "#
                );
                sqlx::query_as::<_, TravelStory>(&sql)
                    .bind(owner.as_str())
                    .bind(like_pattern(query))
                    .fetch_all(&self.pool)
                    .await?
            }
            StoryFilter::VisitedBetween { start, end } => {
                let sql = format!(
                    r#"
                    SELECT {STORY_COLUMNS} FROM travel_stories
                    WHERE owner_id = $1 AND visited_date >= $2 AND visited_date <= $3
                    {ORDER_BY}
                    "#
                );
                sqlx::query_as::<_, TravelStory>(&sql)
                    .bind(owner.as_str())
                    .bind(start)
                    .bind(end)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows)
    }

    async fn update(&self, story: &TravelStory) -> Result<Option<TravelStory>, TravelogError> {
        let sql = format!(
            r#"
            UPDATE travel_stories
            SET title = $3, story = $4, visited_location = $5, visited_date = $6,
                image_url = $7, image_asset_id = $8
            WHERE owner_id = $1 AND id = $2
            RETURNING {STORY_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, TravelStory>(&sql)
            .bind(story.owner_id.as_str())
            .bind(story.id)
            .bind(&story.title)
            .bind(&story.narrative)
            .bind(&story.visited_location)
            .bind(story.visited_date)
            .bind(&story.image_url)
            .bind(&story.image_asset_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update_details(
        &self,
        owner: &OwnerId,
        id: Uuid,
        fields: &StoryFields,
    ) -> Result<Option<TravelStory>, TravelogError> {
        let sql = format!(
            r#"
            UPDATE travel_stories
            SET title = $3, story = $4, visited_location = $5, visited_date = $6
            WHERE owner_id = $1 AND id = $2
            RETURNING {STORY_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, TravelStory>(&sql)
            .bind(owner.as_str())
            .bind(id)
            .bind(&fields.title)
            .bind(&fields.narrative)
            .bind(&fields.visited_location)
            .bind(fields.visited_date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn set_favorite(
        &self,
        owner: &OwnerId,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<Option<TravelStory>, TravelogError> {
        let sql = format!(
            "UPDATE travel_stories SET is_favorite = $3 WHERE owner_id = $1 AND id = $2 \
             RETURNING {STORY_COLUMNS}"
        );

        let row = sqlx::query_as::<_, TravelStory>(&sql)
            .bind(owner.as_str())
            .bind(id)
            .bind(is_favorite)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn remove(&self, owner: &OwnerId, id: Uuid) -> Result<bool, TravelogError> {
        let result = sqlx::query("DELETE FROM travel_stories WHERE owner_id = $1 AND id = $2")
            .bind(owner.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn health(&self) -> Result<String, TravelogError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }
}
