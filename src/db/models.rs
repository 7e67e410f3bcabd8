use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::object_id::ObjectId;

/// Current time as stored in `created_at` / `updated_at` columns.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: ObjectId,
    pub username: String,
    pub display_name: String,
    pub email: String,
    /// bcrypt hash; the salt is part of the hash string.
    pub password_hash: String,
    /// `None` while logged out.
    pub token: Option<String>,
    pub subscriptions: Vec<ObjectId>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: ObjectId,
    pub owner: ObjectId,
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: ObjectId,
    pub owner: ObjectId,
    pub community: ObjectId,
    pub title: String,
    pub body: String,
    pub edited: bool,
    pub up_votes: i64,
    pub down_votes: i64,
    pub attachments: Vec<String>,
    /// Comment ids in creation order.
    pub comments: Vec<ObjectId>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: ObjectId,
    pub post: ObjectId,
    pub author: ObjectId,
    /// Author's display name when the comment was written.
    pub author_name: String,
    pub body: String,
    pub edited: bool,
    pub up_votes: i64,
    pub down_votes: i64,
    pub attachments: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

// -- Public projections --

/// What anyone may see about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: ObjectId,
    pub username: String,
    pub display_name: String,
    pub subscriptions: Vec<ObjectId>,
    pub created_at: String,
}

/// What the account holder sees about themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: ObjectId,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub subscriptions: Vec<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            subscriptions: user.subscriptions.clone(),
            created_at: user.created_at.clone(),
        }
    }
}

impl AccountView {
    /// Projection without the token, for responses that do not issue one.
    pub fn without_token(user: &User) -> Self {
        Self {
            token: None,
            ..Self::with_token(user)
        }
    }

    pub fn with_token(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            subscriptions: user.subscriptions.clone(),
            token: user.token.clone(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}
