//! How a validated partial update is merged into a stored post or comment.
//!
//! Two rules apply independently:
//!
//! * **edit tracking**: touching a content field marks the resource `edited`
//!   unless the caller states `edited` explicitly. The flag only ever goes from
//!   `false` to `true`.
//! * **votes**: vote fields are either absolute replacements or signed deltas
//!   on the stored count, chosen per request by [`VoteMode`]. Counts never drop
//!   below zero.
//!
//! The merge itself is pure; the store runs it inside a write transaction so
//! that the read of the current counts and the write of the new ones cannot
//! interleave with another update.

use crate::db::models::{Comment, Post};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteMode {
    #[default]
    Absolute,
    Delta,
}

impl VoteMode {
    pub fn from_delta_flag(delta: bool) -> Self {
        if delta {
            VoteMode::Delta
        } else {
            VoteMode::Absolute
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChange {
    Set(i64),
    Adjust(i64),
}

impl VoteChange {
    pub fn new(value: i64, mode: VoteMode) -> Self {
        match mode {
            VoteMode::Absolute => VoteChange::Set(value),
            VoteMode::Delta => VoteChange::Adjust(value),
        }
    }

    pub fn apply(self, current: i64) -> i64 {
        match self {
            VoteChange::Set(value) => value.max(0),
            VoteChange::Adjust(delta) => current.saturating_add(delta).max(0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteUpdate {
    pub up: Option<VoteChange>,
    pub down: Option<VoteChange>,
}

impl VoteUpdate {
    pub fn new(up: Option<i64>, down: Option<i64>, mode: VoteMode) -> Self {
        Self {
            up: up.map(|v| VoteChange::new(v, mode)),
            down: down.map(|v| VoteChange::new(v, mode)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_none() && self.down.is_none()
    }

    pub fn apply(&self, up_votes: &mut i64, down_votes: &mut i64) {
        if let Some(change) = self.up {
            *up_votes = change.apply(*up_votes);
        }
        if let Some(change) = self.down {
            *down_votes = change.apply(*down_votes);
        }
    }
}

/// Resulting `edited` flag. An explicit value wins over the content rule but
/// can never clear a flag that is already set.
pub fn resolve_edited(current: bool, touches_content: bool, explicit: Option<bool>) -> bool {
    current || explicit.unwrap_or(touches_content)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub attachments: Option<Vec<String>>,
    pub edited: Option<bool>,
    pub votes: VoteUpdate,
}

impl PostUpdate {
    pub fn touches_content(&self) -> bool {
        self.title.is_some() || self.body.is_some() || self.attachments.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_content() && self.edited.is_none() && self.votes.is_empty()
    }

    pub fn apply(&self, post: &mut Post) {
        post.edited = resolve_edited(post.edited, self.touches_content(), self.edited);
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(body) = &self.body {
            post.body = body.clone();
        }
        if let Some(attachments) = &self.attachments {
            post.attachments = attachments.clone();
        }
        self.votes.apply(&mut post.up_votes, &mut post.down_votes);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentUpdate {
    pub body: Option<String>,
    pub attachments: Option<Vec<String>>,
    pub edited: Option<bool>,
    pub votes: VoteUpdate,
}

impl CommentUpdate {
    pub fn touches_content(&self) -> bool {
        self.body.is_some() || self.attachments.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_content() && self.edited.is_none() && self.votes.is_empty()
    }

    pub fn apply(&self, comment: &mut Comment) {
        comment.edited = resolve_edited(comment.edited, self.touches_content(), self.edited);
        if let Some(body) = &self.body {
            comment.body = body.clone();
        }
        if let Some(attachments) = &self.attachments {
            comment.attachments = attachments.clone();
        }
        self.votes
            .apply(&mut comment.up_votes, &mut comment.down_votes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::timestamp;
    use crate::db::ObjectId;

    fn post() -> Post {
        Post {
            id: ObjectId::generate(),
            owner: ObjectId::generate(),
            community: ObjectId::generate(),
            title: "Hello".into(),
            body: "World".into(),
            edited: false,
            up_votes: 3,
            down_votes: 1,
            attachments: vec![],
            comments: vec![],
            created_at: timestamp(),
            updated_at: timestamp(),
        }
    }

    fn comment() -> Comment {
        Comment {
            id: ObjectId::generate(),
            post: ObjectId::generate(),
            author: ObjectId::generate(),
            author_name: "Bob".into(),
            body: "first".into(),
            edited: false,
            up_votes: 0,
            down_votes: 0,
            attachments: vec![],
            created_at: timestamp(),
            updated_at: timestamp(),
        }
    }

    #[test]
    fn absolute_votes_replace_and_clamp() {
        assert_eq!(VoteChange::Set(7).apply(3), 7);
        assert_eq!(VoteChange::Set(0).apply(3), 0);
        assert_eq!(VoteChange::Set(-4).apply(3), 0);
    }

    #[test]
    fn delta_votes_add_and_clamp_at_zero() {
        assert_eq!(VoteChange::Adjust(2).apply(3), 5);
        assert_eq!(VoteChange::Adjust(-2).apply(3), 1);
        assert_eq!(VoteChange::Adjust(-10).apply(3), 0);
        assert_eq!(VoteChange::Adjust(i64::MAX).apply(1), i64::MAX);
    }

    #[test]
    fn vote_mode_selects_change_kind() {
        assert_eq!(VoteChange::new(1, VoteMode::Absolute), VoteChange::Set(1));
        assert_eq!(VoteChange::new(1, VoteMode::Delta), VoteChange::Adjust(1));
        assert_eq!(VoteMode::from_delta_flag(true), VoteMode::Delta);
        assert_eq!(VoteMode::from_delta_flag(false), VoteMode::Absolute);
    }

    #[test]
    fn edited_resolution_table() {
        // (current, touches_content, explicit) -> result
        assert!(!resolve_edited(false, false, None));
        assert!(resolve_edited(false, true, None));
        assert!(!resolve_edited(false, true, Some(false)));
        assert!(resolve_edited(false, false, Some(true)));
        assert!(resolve_edited(true, false, None));
        assert!(resolve_edited(true, true, Some(false)));
    }

    #[test]
    fn vote_only_post_update_leaves_edited_alone() {
        let mut p = post();
        let update = PostUpdate {
            votes: VoteUpdate::new(None, Some(1), VoteMode::Absolute),
            ..Default::default()
        };
        update.apply(&mut p);
        assert!(!p.edited);
        assert_eq!(p.down_votes, 1);
        assert_eq!(p.up_votes, 3);
    }

    #[test]
    fn content_post_update_marks_edited() {
        let mut p = post();
        let update = PostUpdate {
            title: Some("New title".into()),
            ..Default::default()
        };
        update.apply(&mut p);
        assert!(p.edited);
        assert_eq!(p.title, "New title");
        assert_eq!(p.body, "World");

        // Stays true on a second edit.
        let update = PostUpdate {
            body: Some("Changed".into()),
            ..Default::default()
        };
        update.apply(&mut p);
        assert!(p.edited);
    }

    #[test]
    fn attachments_count_as_content() {
        let mut p = post();
        PostUpdate {
            attachments: Some(vec!["https://img/1.png".into()]),
            ..Default::default()
        }
        .apply(&mut p);
        assert!(p.edited);
        assert_eq!(p.attachments.len(), 1);
    }

    #[test]
    fn explicit_edited_false_suppresses_the_trigger_on_fresh_posts() {
        let mut p = post();
        PostUpdate {
            title: Some("Typo fix".into()),
            edited: Some(false),
            ..Default::default()
        }
        .apply(&mut p);
        assert!(!p.edited);
        assert_eq!(p.title, "Typo fix");
    }

    #[test]
    fn content_and_votes_combine() {
        let mut p = post();
        PostUpdate {
            body: Some("Rewritten".into()),
            votes: VoteUpdate::new(Some(-1), Some(2), VoteMode::Delta),
            ..Default::default()
        }
        .apply(&mut p);
        assert!(p.edited);
        assert_eq!(p.up_votes, 2);
        assert_eq!(p.down_votes, 3);
    }

    #[test]
    fn empty_updates_are_detected() {
        assert!(PostUpdate::default().is_empty());
        assert!(CommentUpdate::default().is_empty());
        assert!(!PostUpdate {
            edited: Some(true),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn comment_update_follows_the_same_rules() {
        let mut c = comment();
        let votes_only = CommentUpdate {
            votes: VoteUpdate::new(Some(1), None, VoteMode::Delta),
            ..Default::default()
        };
        votes_only.apply(&mut c);
        assert!(!c.edited);
        assert_eq!(c.up_votes, 1);

        let edit = CommentUpdate {
            body: Some("second thoughts".into()),
            ..Default::default()
        };
        edit.apply(&mut c);
        assert!(c.edited);
        assert_eq!(c.body, "second thoughts");
    }
}
