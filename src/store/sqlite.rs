use async_trait::async_trait;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;

use super::*;
use crate::db::models::timestamp;
use crate::state::DbPool;

impl ToSql for ObjectId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ObjectId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        ObjectId::parse(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Decode a JSON-encoded list column.
fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

const USER_COLUMNS: &str =
    "id, username, display_name, email, password_hash, token, subscriptions, created_at, updated_at";

const COMMUNITY_COLUMNS: &str = "id, owner_id, name, description, images, created_at, updated_at";

// The last column folds the post's comment ids, in append order, into a JSON array.
const POST_COLUMNS: &str = "p.id, p.owner_id, p.community_id, p.title, p.body, p.edited, \
     p.up_votes, p.down_votes, p.attachments, p.created_at, p.updated_at, \
     (SELECT json_group_array(c.id) FROM \
        (SELECT id FROM comments WHERE post_id = p.id ORDER BY seq) AS c)";

const COMMENT_COLUMNS: &str = "id, post_id, author_id, author_name, body, edited, up_votes, \
     down_votes, attachments, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        token: row.get(5)?,
        subscriptions: json_column(row, 6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn community_from_row(row: &Row<'_>) -> rusqlite::Result<Community> {
    Ok(Community {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        images: json_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        owner: row.get(1)?,
        community: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        edited: row.get(5)?,
        up_votes: row.get(6)?,
        down_votes: row.get(7)?,
        attachments: json_column(row, 8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        comments: json_column(row, 11)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post: row.get(1)?,
        author: row.get(2)?,
        author_name: row.get(3)?,
        body: row.get(4)?,
        edited: row.get(5)?,
        up_votes: row.get(6)?,
        down_votes: row.get(7)?,
        attachments: json_column(row, 8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn load_user(conn: &Connection, id: &ObjectId) -> Result<Option<User>, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id], user_from_row)
        .optional()?)
}

fn load_community(conn: &Connection, id: &ObjectId) -> Result<Option<Community>, StoreError> {
    let sql = format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id], community_from_row)
        .optional()?)
}

fn load_post(conn: &Connection, id: &ObjectId) -> Result<Option<Post>, StoreError> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1");
    Ok(conn
        .query_row(&sql, params![id], post_from_row)
        .optional()?)
}

fn load_comment(conn: &Connection, id: &ObjectId) -> Result<Option<Comment>, StoreError> {
    let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id], comment_from_row)
        .optional()?)
}

/// SQLite-backed implementation of every repository trait.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        let now = timestamp();
        let user = User {
            id: ObjectId::generate(),
            username: new.username,
            display_name: new.display_name,
            email: new.email,
            password_hash: new.password_hash,
            token: None,
            subscriptions: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO users (id, username, display_name, email, password_hash, token, subscriptions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, '[]', ?6, ?7)",
            params![
                user.id,
                user.username,
                user.display_name,
                user.email,
                user.password_hash,
                user.created_at,
                user.updated_at
            ],
        )?;

        Ok(user)
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        load_user(&conn, id)
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE token = ?1");
        Ok(conn
            .query_row(&sql, params![token], user_from_row)
            .optional()?)
    }

    async fn find_user_by_login(
        &self,
        login: &LoginSelector,
    ) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let (column, value) = match login {
            LoginSelector::Username(username) => ("username", username),
            LoginSelector::Email(email) => ("email", email),
        };
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        Ok(conn
            .query_row(&sql, params![value], user_from_row)
            .optional()?)
    }

    async fn token_in_use(&self, token: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let in_use: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE token = ?1",
            params![token],
            |row| row.get(0),
        )?;
        Ok(in_use)
    }

    async fn set_token(&self, id: &ObjectId, token: Option<&str>) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET token = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, token, timestamp()],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_user(
        &self,
        id: &ObjectId,
        changes: &UserChanges,
    ) -> Result<User, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut user = load_user(&tx, id)?.ok_or(StoreError::NotFound)?;
        if let Some(username) = &changes.username {
            user.username = username.clone();
        }
        if let Some(display_name) = &changes.display_name {
            user.display_name = display_name.clone();
        }
        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        if let Some(password_hash) = &changes.password_hash {
            user.password_hash = password_hash.clone();
        }
        user.updated_at = timestamp();

        tx.execute(
            "UPDATE users SET username = ?2, display_name = ?3, email = ?4, password_hash = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                user.username,
                user.display_name,
                user.email,
                user.password_hash,
                user.updated_at
            ],
        )?;
        tx.commit()?;

        Ok(user)
    }

    async fn set_subscription(
        &self,
        id: &ObjectId,
        community: &ObjectId,
        subscribed: bool,
    ) -> Result<User, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut user = load_user(&tx, id)?.ok_or(StoreError::NotFound)?;
        let present = user.subscriptions.contains(community);
        if subscribed && !present {
            user.subscriptions.push(community.clone());
        } else if !subscribed && present {
            user.subscriptions.retain(|c| c != community);
        } else {
            return Ok(user);
        }
        user.updated_at = timestamp();

        tx.execute(
            "UPDATE users SET subscriptions = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, serde_json::to_string(&user.subscriptions)?, user.updated_at],
        )?;
        tx.commit()?;

        Ok(user)
    }

    async fn delete_user(&self, id: &ObjectId) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CommunityRepository for SqliteStore {
    async fn create_community(&self, new: NewCommunity) -> Result<Community, StoreError> {
        let conn = self.pool.get()?;
        let now = timestamp();
        let community = Community {
            id: ObjectId::generate(),
            owner: new.owner,
            name: new.name,
            description: new.description,
            images: new.images,
            created_at: now.clone(),
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO communities (id, owner_id, name, description, images, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                community.id,
                community.owner,
                community.name,
                community.description,
                serde_json::to_string(&community.images)?,
                community.created_at,
                community.updated_at
            ],
        )?;

        Ok(community)
    }

    async fn find_community(&self, id: &ObjectId) -> Result<Option<Community>, StoreError> {
        let conn = self.pool.get()?;
        load_community(&conn, id)
    }

    async fn list_communities(&self, page: Page) -> Result<Vec<Community>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities
             ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let communities = stmt
            .query_map(params![page.limit, page.offset], community_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(communities)
    }

    async fn update_community(
        &self,
        id: &ObjectId,
        changes: &CommunityChanges,
    ) -> Result<Community, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut community = load_community(&tx, id)?.ok_or(StoreError::NotFound)?;
        if let Some(name) = &changes.name {
            community.name = name.clone();
        }
        if let Some(description) = &changes.description {
            community.description = description.clone();
        }
        if let Some(images) = &changes.images {
            community.images = images.clone();
        }
        community.updated_at = timestamp();

        tx.execute(
            "UPDATE communities SET name = ?2, description = ?3, images = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                community.name,
                community.description,
                serde_json::to_string(&community.images)?,
                community.updated_at
            ],
        )?;
        tx.commit()?;

        Ok(community)
    }
}

#[async_trait]
impl PostRepository for SqliteStore {
    async fn create_post(&self, new: NewPost) -> Result<Post, StoreError> {
        let conn = self.pool.get()?;
        let now = timestamp();
        let post = Post {
            id: ObjectId::generate(),
            owner: new.owner,
            community: new.community,
            title: new.title,
            body: new.body,
            edited: false,
            up_votes: 0,
            down_votes: 0,
            attachments: new.attachments,
            comments: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO posts (id, owner_id, community_id, title, body, edited, up_votes, down_votes, attachments, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, ?6, ?7, ?8)",
            params![
                post.id,
                post.owner,
                post.community,
                post.title,
                post.body,
                serde_json::to_string(&post.attachments)?,
                post.created_at,
                post.updated_at
            ],
        )?;

        Ok(post)
    }

    async fn find_post(&self, id: &ObjectId) -> Result<Option<Post>, StoreError> {
        let conn = self.pool.get()?;
        load_post(&conn, id)
    }

    async fn list_posts(&self, page: Page) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p
             ORDER BY p.created_at DESC, p.id DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params![page.limit, page.offset], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn list_community_posts(
        &self,
        community: &ObjectId,
        page: Page,
    ) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE p.community_id = ?1
             ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params![community, page.limit, page.offset], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn update_post(&self, id: &ObjectId, update: &PostUpdate) -> Result<Post, StoreError> {
        let mut conn = self.pool.get()?;
        // IMMEDIATE takes the write lock up front, so concurrent vote deltas
        // on the same post serialize instead of overwriting each other.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut post = load_post(&tx, id)?.ok_or(StoreError::NotFound)?;
        update.apply(&mut post);
        post.updated_at = timestamp();

        tx.execute(
            "UPDATE posts SET title = ?2, body = ?3, edited = ?4, up_votes = ?5, down_votes = ?6,
                attachments = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id,
                post.title,
                post.body,
                post.edited,
                post.up_votes,
                post.down_votes,
                serde_json::to_string(&post.attachments)?,
                post.updated_at
            ],
        )?;
        tx.commit()?;

        Ok(post)
    }

    async fn delete_post(&self, id: &ObjectId) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows = tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        let comments = tx.execute("DELETE FROM comments WHERE post_id = ?1", params![id])?;
        tx.commit()?;

        tracing::debug!("Deleted post {} with {} comments", id, comments);
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for SqliteStore {
    async fn create_comment(&self, new: NewComment) -> Result<Comment, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let post_exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
            params![new.post],
            |row| row.get(0),
        )?;
        if !post_exists {
            return Err(StoreError::NotFound);
        }

        let now = timestamp();
        let comment = Comment {
            id: ObjectId::generate(),
            post: new.post,
            author: new.author,
            author_name: new.author_name,
            body: new.body,
            edited: false,
            up_votes: 0,
            down_votes: 0,
            attachments: new.attachments,
            created_at: now.clone(),
            updated_at: now,
        };

        tx.execute(
            "INSERT INTO comments (id, post_id, author_id, author_name, body, edited, up_votes, down_votes, attachments, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, ?6, ?7, ?8)",
            params![
                comment.id,
                comment.post,
                comment.author,
                comment.author_name,
                comment.body,
                serde_json::to_string(&comment.attachments)?,
                comment.created_at,
                comment.updated_at
            ],
        )?;
        tx.commit()?;

        Ok(comment)
    }

    async fn find_comment(&self, id: &ObjectId) -> Result<Option<Comment>, StoreError> {
        let conn = self.pool.get()?;
        load_comment(&conn, id)
    }

    async fn list_comments(&self, post: &ObjectId) -> Result<Vec<Comment>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = ?1 ORDER BY seq");
        let mut stmt = conn.prepare(&sql)?;
        let comments = stmt
            .query_map(params![post], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn update_comment(
        &self,
        id: &ObjectId,
        update: &CommentUpdate,
    ) -> Result<Comment, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut comment = load_comment(&tx, id)?.ok_or(StoreError::NotFound)?;
        update.apply(&mut comment);
        comment.updated_at = timestamp();

        tx.execute(
            "UPDATE comments SET body = ?2, edited = ?3, up_votes = ?4, down_votes = ?5,
                attachments = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                comment.body,
                comment.edited,
                comment.up_votes,
                comment.down_votes,
                serde_json::to_string(&comment.attachments)?,
                comment.updated_at
            ],
        )?;
        tx.commit()?;

        Ok(comment)
    }
}
