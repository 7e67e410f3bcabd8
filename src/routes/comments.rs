use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth;
use crate::db::models::Comment;
use crate::db::ObjectId;
use crate::error::{AppError, AppResult};
use crate::extractors::{BearerToken, JsonBody, QueryParams, VoteParams};
use crate::policy::{CommentUpdate, VoteMode, VoteUpdate};
use crate::routes::posts::attachments_rule;
use crate::state::AppState;
use crate::store::NewComment;
use crate::validation::{self, Validator};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub body: Option<String>,
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommentRequest {
    pub body: Option<String>,
    pub attachments: Option<Vec<String>>,
    pub edited: Option<bool>,
    pub up_votes: Option<i64>,
    pub down_votes: Option<i64>,
}

#[derive(Debug, PartialEq)]
pub struct CommentDraft {
    pub body: String,
    pub attachments: Vec<String>,
}

fn body_rule(value: String) -> Result<String, String> {
    validation::text(value, 1, 10_000)
}

impl CreateCommentRequest {
    pub fn validate(self) -> AppResult<CommentDraft> {
        let mut v = Validator::new();
        let body = v.required("body", self.body, body_rule);
        let attachments = v.optional("attachments", self.attachments, attachments_rule);
        v.finish()?;

        let Some(body) = body else {
            return Err(AppError::BadRequest("Incomplete comment".into()));
        };
        Ok(CommentDraft {
            body,
            attachments: attachments.unwrap_or_default(),
        })
    }
}

impl UpdateCommentRequest {
    pub fn validate(self, mode: VoteMode) -> AppResult<CommentUpdate> {
        let mut v = Validator::new();
        let update = CommentUpdate {
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

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/posts/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/posts/comments/{id}",
            get(get_comment).patch(update_comment),
        )
}

/// Comments of a post, oldest first.
async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Comment>>> {
    let id = ObjectId::parse(&id)?;
    let post = state.store.find_post(&id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(state.store.list_comments(&post.id).await?))
}

async fn create_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    bearer: BearerToken,
    JsonBody(req): JsonBody<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let post_id = ObjectId::parse(&id)?;
    let draft = req.validate()?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    // The store re-checks the post inside its transaction; a post deleted in
    // between still comes back as NotFound.
    let comment = state
        .store
        .create_comment(NewComment {
            post: post_id,
            author: user.id.clone(),
            author_name: user.display_name,
            body: draft.body,
            attachments: draft.attachments,
        })
        .await?;

    tracing::info!(
        "User {} commented {} on post {}",
        user.username,
        comment.id,
        comment.post
    );
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Comment>> {
    let id = ObjectId::parse(&id)?;
    let comment = state
        .store
        .find_comment(&id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(comment))
}

async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(params): QueryParams<VoteParams>,
    bearer: BearerToken,
    JsonBody(req): JsonBody<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    let id = ObjectId::parse(&id)?;
    let update = req.validate(params.mode())?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let comment = state
        .store
        .find_comment(&id)
        .await?
        .ok_or(AppError::NotFound)?;
    auth::require_owner(&user, &comment.author)?;

    let updated = state.store.update_comment(&id, &update).await?;
    tracing::debug!("User {} updated comment {}", user.username, id);
    Ok(Json(updated))
}
