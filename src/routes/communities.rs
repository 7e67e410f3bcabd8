use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth;
use crate::db::models::{AccountView, Community};
use crate::db::ObjectId;
use crate::error::{AppError, AppResult};
use crate::extractors::{BearerToken, JsonBody, PageParams, QueryParams};
use crate::state::AppState;
use crate::store::{CommunityChanges, NewCommunity};
use crate::validation::{self, Validator};

const MAX_IMAGES: usize = 8;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommunityRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommunityRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, PartialEq)]
pub struct CommunityDraft {
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
}

fn name_rule(value: String) -> Result<String, String> {
    validation::text(value, 3, 64)
}

fn description_rule(value: String) -> Result<String, String> {
    validation::text(value, 0, 1000)
}

fn images_rule(values: Vec<String>) -> Result<Vec<String>, String> {
    validation::references(values, MAX_IMAGES)
}

impl CreateCommunityRequest {
    pub fn validate(self) -> AppResult<CommunityDraft> {
        let mut v = Validator::new();
        let name = v.required("name", self.name, name_rule);
        let description = v.optional("description", self.description, description_rule);
        let images = v.optional("images", self.images, images_rule);
        v.finish()?;

        let Some(name) = name else {
            return Err(AppError::BadRequest("Incomplete community".into()));
        };
        Ok(CommunityDraft {
            name,
            description: description.unwrap_or_default(),
            images: images.unwrap_or_default(),
        })
    }
}

impl UpdateCommunityRequest {
    pub fn validate(self) -> AppResult<CommunityChanges> {
        let mut v = Validator::new();
        let changes = CommunityChanges {
            name: v.optional("name", self.name, name_rule),
            description: v.optional("description", self.description, description_rule),
            images: v.optional("images", self.images, images_rule),
        };
        v.finish()?;

        if changes.is_empty() {
            return Err(AppError::BadRequest(
                "Update contains no recognized fields".into(),
            ));
        }
        Ok(changes)
    }
}

// -- Router --

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/communities", get(list_communities).post(create_community))
        .route(
            "/communities/{id}",
            get(get_community).patch(update_community),
        )
        .route("/communities/{id}/subscribe", post(subscribe))
        .route("/communities/{id}/unsubscribe", post(unsubscribe))
}

// -- Handlers --

async fn list_communities(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
) -> AppResult<Json<Vec<Community>>> {
    let page = params.into_page()?;
    Ok(Json(state.store.list_communities(page).await?))
}

async fn create_community(
    State(state): State<AppState>,
    bearer: BearerToken,
    JsonBody(req): JsonBody<CreateCommunityRequest>,
) -> AppResult<(StatusCode, Json<Community>)> {
    let draft = req.validate()?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let community = state
        .store
        .create_community(NewCommunity {
            owner: user.id.clone(),
            name: draft.name,
            description: draft.description,
            images: draft.images,
        })
        .await?;

    tracing::info!(
        "User {} created community {} ({})",
        user.username,
        community.name,
        community.id
    );
    Ok((StatusCode::CREATED, Json(community)))
}

async fn get_community(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Community>> {
    let id = ObjectId::parse(&id)?;
    let community = state
        .store
        .find_community(&id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(community))
}

async fn update_community(
    State(state): State<AppState>,
    Path(id): Path<String>,
    bearer: BearerToken,
    JsonBody(req): JsonBody<UpdateCommunityRequest>,
) -> AppResult<Json<Community>> {
    let id = ObjectId::parse(&id)?;
    let changes = req.validate()?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let community = state
        .store
        .find_community(&id)
        .await?
        .ok_or(AppError::NotFound)?;
    auth::require_owner(&user, &community.owner)?;

    let updated = state.store.update_community(&id, &changes).await?;
    tracing::info!("Updated community {}", id);
    Ok(Json(updated))
}

async fn subscribe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    bearer: BearerToken,
) -> AppResult<Json<AccountView>> {
    set_subscription(state, id, bearer, true).await
}

async fn unsubscribe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    bearer: BearerToken,
) -> AppResult<Json<AccountView>> {
    set_subscription(state, id, bearer, false).await
}

async fn set_subscription(
    state: AppState,
    id: String,
    bearer: BearerToken,
    subscribed: bool,
) -> AppResult<Json<AccountView>> {
    let id = ObjectId::parse(&id)?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let community = state
        .store
        .find_community(&id)
        .await?
        .ok_or(AppError::NotFound)?;
    let updated = state
        .store
        .set_subscription(&user.id, &community.id, subscribed)
        .await?;

    tracing::debug!(
        "User {} subscription to {} set to {}",
        user.username,
        community.id,
        subscribed
    );
    Ok(Json(AccountView::without_token(&updated)))
}
