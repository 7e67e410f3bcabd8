// Repository traits - every persistence call the handlers make goes through here
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{Comment, Community, Post, User};
use crate::db::ObjectId;
use crate::policy::{CommentUpdate, PostUpdate};

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found")]
    NotFound,

    /// Unique constraint violation; carries the offending field name.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, Some(msg)) = &err {
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                // "UNIQUE constraint failed: users.username"
                let field = msg.rsplit('.').next().unwrap_or("record").to_string();
                return StoreError::Conflict(field);
            }
        }
        StoreError::Sql(err)
    }
}

/// Limit/offset window over a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginSelector {
    Username(String),
    Email(String),
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.display_name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub owner: ObjectId,
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
}

impl CommunityChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.images.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub owner: ObjectId,
    pub community: ObjectId,
    pub title: String,
    pub body: String,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post: ObjectId,
    pub author: ObjectId,
    pub author_name: String,
    pub body: String,
    pub attachments: Vec<String>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_login(&self, login: &LoginSelector)
        -> Result<Option<User>, StoreError>;

    async fn token_in_use(&self, token: &str) -> Result<bool, StoreError>;

    /// Store a freshly minted token, or clear it with `None`.
    async fn set_token(&self, id: &ObjectId, token: Option<&str>) -> Result<(), StoreError>;

    async fn update_user(&self, id: &ObjectId, changes: &UserChanges)
        -> Result<User, StoreError>;

    /// Add or remove a community from the user's subscription set.
    async fn set_subscription(
        &self,
        id: &ObjectId,
        community: &ObjectId,
        subscribed: bool,
    ) -> Result<User, StoreError>;

    async fn delete_user(&self, id: &ObjectId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CommunityRepository: Send + Sync {
    async fn create_community(&self, new: NewCommunity) -> Result<Community, StoreError>;

    async fn find_community(&self, id: &ObjectId) -> Result<Option<Community>, StoreError>;

    async fn list_communities(&self, page: Page) -> Result<Vec<Community>, StoreError>;

    async fn update_community(
        &self,
        id: &ObjectId,
        changes: &CommunityChanges,
    ) -> Result<Community, StoreError>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create_post(&self, new: NewPost) -> Result<Post, StoreError>;

    async fn find_post(&self, id: &ObjectId) -> Result<Option<Post>, StoreError>;

    async fn list_posts(&self, page: Page) -> Result<Vec<Post>, StoreError>;

    async fn list_community_posts(
        &self,
        community: &ObjectId,
        page: Page,
    ) -> Result<Vec<Post>, StoreError>;

    /// Merge `update` into the stored post under a write lock.
    async fn update_post(&self, id: &ObjectId, update: &PostUpdate) -> Result<Post, StoreError>;

    /// Delete a post together with its comments.
    async fn delete_post(&self, id: &ObjectId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Fails with `NotFound` when the parent post does not exist.
    async fn create_comment(&self, new: NewComment) -> Result<Comment, StoreError>;

    async fn find_comment(&self, id: &ObjectId) -> Result<Option<Comment>, StoreError>;

    /// Comments of a post in creation order.
    async fn list_comments(&self, post: &ObjectId) -> Result<Vec<Comment>, StoreError>;

    async fn update_comment(
        &self,
        id: &ObjectId,
        update: &CommentUpdate,
    ) -> Result<Comment, StoreError>;
}

/// Everything the HTTP layer needs from persistence.
pub trait ForumStore:
    UserRepository + CommunityRepository + PostRepository + CommentRepository
{
}

impl<T> ForumStore for T where
    T: UserRepository + CommunityRepository + PostRepository + CommentRepository
{
}

pub type DynStore = Arc<dyn ForumStore>;
