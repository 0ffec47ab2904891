//! Travelog HTTP REST API
//!
//! Axum-based HTTP server exposing the travel-story lifecycle.
//!
//! Architecture: each endpoint has a thin axum handler that resolves the
//! caller and decodes the request, then delegates to a pure inner function
//! over `StoryLifecycle`. The inner functions are directly testable without
//! axum dispatch machinery.
//!
//! Endpoints:
//! - GET    /health                                       store status
//! - GET    /version                                      server version info
//! - POST   /api/travel-story/add                         create a story
//! - GET    /api/travel-story/get-all                     list stories
//! - GET    /api/travel-story/story/{id}                  fetch one story
//! - PUT    /api/travel-story/edit-story/{id}             edit a story
//! - DELETE /api/travel-story/delete-story/{id}           delete a story
//! - PUT    /api/travel-story/update-is-favourite/{id}    set the favorite flag
//! - GET    /api/travel-story/search?query=               text search
//! - GET    /api/travel-story/filter?startDate=&endDate=  visited-date range

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use travelog_core::{ImageUpload, OwnerId, TravelogConfig};
use uuid::Uuid;

use crate::auth::{AccessGuard, AuthUser};
use crate::error::StoryError;
use crate::subsystems::stories::{ImageChange, StoryInput, StoryLifecycle};

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub stories: StoryLifecycle,
    pub guard: AccessGuard,
    pub config: TravelogConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let body_limit = state.config.http.max_upload_bytes;

    let stories = Router::new()
        .route("/add", post(add_story_handler))
        .route("/get-all", get(list_stories_handler))
        .route("/story/:id", get(get_story_handler))
        .route("/edit-story/:id", put(edit_story_handler))
        .route("/delete-story/:id", delete(delete_story_handler))
        .route("/update-is-favourite/:id", put(favorite_handler))
        .route("/search", get(search_handler))
        .route("/filter", get(filter_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .nest("/api/travel-story", stories)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Travelog HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Error responses
// ============================================================================

impl IntoResponse for StoryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Upstream(e) => tracing::error!(error = %e, "Image service failure"),
            Self::Internal(e) => tracing::error!(error = %e, "Storage failure"),
            _ => tracing::debug!(status = status.as_u16(), error = %self, "Request rejected"),
        }

        let body = serde_json::json!({
            "success": false,
            "statusCode": status.as_u16(),
            "message": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Epoch milliseconds as either a JSON number or a decimal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EpochMillis {
    Number(i64),
    Text(String),
}

impl EpochMillis {
    fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// JSON body for create/edit.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryForm {
    pub title: Option<String>,
    pub story: Option<String>,
    pub visited_location: Option<String>,
    pub visited_date: Option<EpochMillis>,
    #[serde(default)]
    pub remove_image: bool,
}

/// Decoded create/edit request: JSON, or multipart with an optional `image` file.
#[derive(Debug, Default)]
pub struct StoryPayload {
    pub input: StoryInput,
    pub image: Option<ImageUpload>,
    pub remove_image: bool,
}

impl StoryPayload {
    pub fn image_change(self) -> Result<(StoryInput, ImageChange), StoryError> {
        let change = match (self.image, self.remove_image) {
            (Some(_), true) => {
                return Err(StoryError::validation(
                    "Cannot upload a new image and remove the image at once",
                ))
            }
            (Some(image), false) => ImageChange::Replace(image),
            (None, true) => ImageChange::Remove,
            (None, false) => ImageChange::Keep,
        };
        Ok((self.input, change))
    }
}

impl From<StoryForm> for StoryPayload {
    fn from(form: StoryForm) -> Self {
        Self {
            input: StoryInput {
                title: form.title,
                story: form.story,
                visited_location: form.visited_location,
                visited_date: form.visited_date.map(EpochMillis::into_text),
            },
            image: None,
            remove_image: form.remove_image,
        }
    }
}

#[axum::async_trait]
impl<S> FromRequest<S> for StoryPayload
where
    S: Send + Sync,
{
    type Rejection = StoryError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| StoryError::validation(e.body_text()))?;
            read_multipart(multipart).await
        } else {
            let Json(form) = Json::<StoryForm>::from_request(req, state)
                .await
                .map_err(json_rejection)?;
            Ok(form.into())
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<StoryPayload, StoryError> {
    let mut payload = StoryPayload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| StoryError::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" {
            let file_name = field.file_name().unwrap_or("image").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| StoryError::validation(e.body_text()))?;
            // Browsers submit an empty part when no file was chosen.
            if !bytes.is_empty() {
                payload.image = Some(ImageUpload {
                    bytes,
                    file_name,
                    content_type,
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| StoryError::validation(e.body_text()))?;
        match name.as_str() {
            "title" => payload.input.title = Some(value),
            "story" => payload.input.story = Some(value),
            "visitedLocation" => payload.input.visited_location = Some(value),
            "visitedDate" => payload.input.visited_date = Some(value),
            "removeImage" => payload.remove_image = value.trim().eq_ignore_ascii_case("true"),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(payload)
}

fn json_rejection(rejection: JsonRejection) -> StoryError {
    StoryError::validation(rejection.body_text())
}

fn query_params<T>(
    params: std::result::Result<Query<T>, QueryRejection>,
) -> Result<T, StoryError> {
    params
        .map(|Query(params)| params)
        .map_err(|rejection| StoryError::validation(rejection.body_text()))
}

/// An id segment that cannot be decoded names no story either.
fn path_id(id: std::result::Result<Path<String>, PathRejection>) -> Result<String, StoryError> {
    id.map(|Path(id)| id).map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Undecodable story id");
        StoryError::NotFound
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// A malformed id cannot name an existing story.
fn parse_story_id(raw: &str) -> Result<Uuid, StoryError> {
    Uuid::parse_str(raw).map_err(|_| StoryError::NotFound)
}

type ApiResult = std::result::Result<(StatusCode, serde_json::Value), StoryError>;

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: asks the record store to describe itself.
pub async fn health_inner(stories: &StoryLifecycle) -> (StatusCode, serde_json::Value) {
    match stories.store().health().await {
        Ok(store) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": "record store unavailable",
                }),
            )
        }
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "api": "travel-story/1",
    })
}

pub async fn add_story_inner(
    stories: &StoryLifecycle,
    owner: &OwnerId,
    payload: StoryPayload,
) -> ApiResult {
    let story = stories.create(owner, payload.input, payload.image).await?;
    Ok((
        StatusCode::CREATED,
        serde_json::json!({
            "story": story,
            "message": "Your story is added successfully!",
        }),
    ))
}

pub async fn list_stories_inner(stories: &StoryLifecycle, owner: &OwnerId) -> ApiResult {
    let list = stories.list(owner).await?;
    Ok((StatusCode::OK, serde_json::json!({ "stories": list })))
}

pub async fn get_story_inner(stories: &StoryLifecycle, owner: &OwnerId, id: &str) -> ApiResult {
    let story = stories.get(owner, parse_story_id(id)?).await?;
    Ok((StatusCode::OK, serde_json::json!({ "story": story })))
}

pub async fn edit_story_inner(
    stories: &StoryLifecycle,
    owner: &OwnerId,
    id: &str,
    payload: StoryPayload,
) -> ApiResult {
    let id = parse_story_id(id)?;
    let (input, change) = payload.image_change()?;
    let story = stories.update(owner, id, input, change).await?;
    Ok((
        StatusCode::OK,
        serde_json::json!({
            "story": story,
            "message": "Travel story updated successfully!",
        }),
    ))
}

pub async fn delete_story_inner(stories: &StoryLifecycle, owner: &OwnerId, id: &str) -> ApiResult {
    let deleted = stories.delete(owner, parse_story_id(id)?).await?;
    Ok((
        StatusCode::OK,
        serde_json::json!({
            "id": deleted.id,
            "message": "Travel story deleted successfully!",
        }),
    ))
}

pub async fn favorite_inner(
    stories: &StoryLifecycle,
    owner: &OwnerId,
    id: &str,
    req: FavoriteRequest,
) -> ApiResult {
    let id = parse_story_id(id)?;
    let is_favorite = req
        .is_favorite
        .ok_or_else(|| StoryError::validation("isFavorite is required"))?;
    let story = stories.set_favorite(owner, id, is_favorite).await?;
    Ok((
        StatusCode::OK,
        serde_json::json!({
            "story": story,
            "message": "Updated successfully!",
        }),
    ))
}

pub async fn search_inner(
    stories: &StoryLifecycle,
    owner: &OwnerId,
    params: SearchParams,
) -> ApiResult {
    let results = stories
        .search(owner, params.query.as_deref().unwrap_or_default())
        .await?;
    Ok((StatusCode::OK, serde_json::json!({ "stories": results })))
}

pub async fn filter_inner(
    stories: &StoryLifecycle,
    owner: &OwnerId,
    params: FilterParams,
) -> ApiResult {
    let results = stories
        .filter_by_date_range(owner, params.start_date.as_deref(), params.end_date.as_deref())
        .await?;
    Ok((StatusCode::OK, serde_json::json!({ "stories": results })))
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

fn respond(result: ApiResult) -> Response {
    match result {
        Ok((status, body)) => (status, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.stories).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn add_story_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(owner): AuthUser,
    payload: StoryPayload,
) -> Response {
    respond(add_story_inner(&state.stories, &owner, payload).await)
}

pub async fn list_stories_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(owner): AuthUser,
) -> Response {
    respond(list_stories_inner(&state.stories, &owner).await)
}

pub async fn get_story_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(owner): AuthUser,
    id: std::result::Result<Path<String>, PathRejection>,
) -> Response {
    match path_id(id) {
        Ok(id) => respond(get_story_inner(&state.stories, &owner, &id).await),
        Err(e) => e.into_response(),
    }
}

pub async fn edit_story_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(owner): AuthUser,
    id: std::result::Result<Path<String>, PathRejection>,
    payload: StoryPayload,
) -> Response {
    match path_id(id) {
        Ok(id) => respond(edit_story_inner(&state.stories, &owner, &id, payload).await),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_story_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(owner): AuthUser,
    id: std::result::Result<Path<String>, PathRejection>,
) -> Response {
    match path_id(id) {
        Ok(id) => respond(delete_story_inner(&state.stories, &owner, &id).await),
        Err(e) => e.into_response(),
    }
}

pub async fn favorite_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(owner): AuthUser,
    id: std::result::Result<Path<String>, PathRejection>,
    req: std::result::Result<Json<FavoriteRequest>, JsonRejection>,
) -> Response {
    let id = match path_id(id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    match req {
        Ok(Json(req)) => respond(favorite_inner(&state.stories, &owner, &id, req).await),
        Err(rejection) => json_rejection(rejection).into_response(),
    }
}

pub async fn search_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(owner): AuthUser,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> Response {
    match query_params(params) {
        Ok(params) => respond(search_inner(&state.stories, &owner, params).await),
        Err(e) => e.into_response(),
    }
}

pub async fn filter_handler(
    State(state): State<Arc<HttpState>>,
    AuthUser(owner): AuthUser,
    params: std::result::Result<Query<FilterParams>, QueryRejection>,
) -> Response {
    match query_params(params) {
        Ok(params) => respond(filter_inner(&state.stories, &owner, params).await),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
