use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth;
use crate::db::models::Post;
use crate::db::ObjectId;
use crate::error::{AppError, AppResult};
use crate::extractors::{BearerToken, JsonBody, PageParams, QueryParams, VoteParams};
use crate::policy::{PostUpdate, VoteMode, VoteUpdate};
use crate::state::AppState;
use crate::store::NewPost;
use crate::validation::{self, Validator};

pub(crate) const MAX_ATTACHMENTS: usize = 10;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub attachments: Option<Vec<String>>,
    pub edited: Option<bool>,
    pub up_votes: Option<i64>,
    pub down_votes: Option<i64>,
}

#[derive(Debug, PartialEq)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    pub attachments: Vec<String>,
}

fn title_rule(value: String) -> Result<String, String> {
    validation::text(value, 1, 300)
}

fn body_rule(value: String) -> Result<String, String> {
    validation::text(value, 0, 40_000)
}

pub(crate) fn attachments_rule(values: Vec<String>) -> Result<Vec<String>, String> {
    validation::references(values, MAX_ATTACHMENTS)
}

impl CreatePostRequest {
    pub fn validate(self) -> AppResult<PostDraft> {
        let mut v = Validator::new();
        let title = v.required("title", self.title, title_rule);
        let body = v.optional("body", self.body, body_rule);
        let attachments = v.optional("attachments", self.attachments, attachments_rule);
        v.finish()?;

        let Some(title) = title else {
            return Err(AppError::BadRequest("Incomplete post".into()));
        };
        Ok(PostDraft {
            title,
            body: body.unwrap_or_default(),
            attachments: attachments.unwrap_or_default(),
        })
    }
}

impl UpdatePostRequest {
    pub fn validate(self, mode: VoteMode) -> AppResult<PostUpdate> {
        let mut v = Validator::new();
        let update = PostUpdate {
            title: v.optional("title", self.title, title_rule),
            body: v.optional("body", self.body, body_rule),
            attachments: v.optional("attachments", self.attachments, attachments_rule),
            edited: self.edited,
            votes: VoteUpdate::new(
                v.optional("upVotes", self.up_votes, |n| validation::vote_count(n, mode)),
                v.optional("downVotes", self.down_votes, |n| {
                    validation::vote_count(n, mode)
                }),
                mode,
            ),
        };
        v.finish()?;

        if update.is_empty() {
            return Err(AppError::BadRequest(
                "Update contains no recognized fields".into(),
            ));
        }
        Ok(update)
    }
}

// -- Router --

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{id}", get(get_post).patch(update_post).delete(delete_post))
        .route(
            "/communities/{id}/posts",
            get(list_community_posts).post(create_post),
        )
}

// -- Handlers --

async fn list_posts(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
) -> AppResult<Json<Vec<Post>>> {
    let page = params.into_page()?;
    Ok(Json(state.store.list_posts(page).await?))
}

async fn list_community_posts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(params): QueryParams<PageParams>,
) -> AppResult<Json<Vec<Post>>> {
    let id = ObjectId::parse(&id)?;
    let page = params.into_page()?;

    let community = state
        .store
        .find_community(&id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(
        state.store.list_community_posts(&community.id, page).await?,
    ))
}

/// POST /communities/{id}/posts - any authenticated user may post
async fn create_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    bearer: BearerToken,
    JsonBody(req): JsonBody<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let community_id = ObjectId::parse(&id)?;
    let draft = req.validate()?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let community = state
        .store
        .find_community(&community_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let post = state
        .store
        .create_post(NewPost {
            owner: user.id.clone(),
            community: community.id,
            title: draft.title,
            body: draft.body,
            attachments: draft.attachments,
        })
        .await?;

    tracing::info!(
        "User {} created post {} in community {}",
        user.username,
        post.id,
        post.community
    );
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let id = ObjectId::parse(&id)?;
    let post = state.store.find_post(&id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

/// PATCH /posts/{id}?delta=bool - owner only, votes included
async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(params): QueryParams<VoteParams>,
    bearer: BearerToken,
    JsonBody(req): JsonBody<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let id = ObjectId::parse(&id)?;
    let update = req.validate(params.mode())?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let post = state.store.find_post(&id).await?.ok_or(AppError::NotFound)?;
    auth::require_owner(&user, &post.owner)?;

    let updated = state.store.update_post(&id, &update).await?;
    tracing::debug!("User {} updated post {}", user.username, id);
    Ok(Json(updated))
}

async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    bearer: BearerToken,
) -> AppResult<StatusCode> {
    let id = ObjectId::parse(&id)?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let post = state.store.find_post(&id).await?.ok_or(AppError::NotFound)?;
    auth::require_owner(&user, &post.owner)?;
    state.store.delete_post(&id).await?;

    tracing::info!("Deleted post {}", id);
    Ok(StatusCode::NO_CONTENT)
}
