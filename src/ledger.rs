//! Per-meme vote sets and comment list.
//!
//! These are the in-process forms of the aggregates. The DynamoDB adapter
//! applies the same transitions with atomic update expressions; the in-memory
//! store calls these methods directly.

use crate::models::Comment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_COMMENT_CHARS: usize = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Up => "up",
            VoteType::Down => "down",
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid vote type")]
pub struct InvalidVoteType;

impl FromStr for VoteType {
    type Err = InvalidVoteType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteType::Up),
            "down" => Ok(VoteType::Down),
            _ => Err(InvalidVoteType),
        }
    }
}

/// Upvote and downvote sets. A user id is in at most one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteLedger {
    upvotes: BTreeSet<Uuid>,
    downvotes: BTreeSet<Uuid>,
}

impl VoteLedger {
    /// Builds a ledger from stored sets. An id found in both keeps its upvote.
    pub fn from_sets(
        upvotes: impl IntoIterator<Item = Uuid>,
        downvotes: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        let upvotes: BTreeSet<Uuid> = upvotes.into_iter().collect();
        let downvotes = downvotes.into_iter().filter(|id| !upvotes.contains(id)).collect();
        VoteLedger { upvotes, downvotes }
    }

    /// Removes `user_id` from both sets, then inserts into the matching one.
    pub fn cast(&mut self, user_id: Uuid, vote: VoteType) {
        self.upvotes.remove(&user_id);
        self.downvotes.remove(&user_id);
        match vote {
            VoteType::Up => self.upvotes.insert(user_id),
            VoteType::Down => self.downvotes.insert(user_id),
        };
    }

    pub fn vote_of(&self, user_id: Uuid) -> Option<VoteType> {
        if self.upvotes.contains(&user_id) {
            Some(VoteType::Up)
        } else if self.downvotes.contains(&user_id) {
            Some(VoteType::Down)
        } else {
            None
        }
    }

    pub fn upvotes(&self) -> &BTreeSet<Uuid> {
        &self.upvotes
    }

    pub fn downvotes(&self) -> &BTreeSet<Uuid> {
        &self.downvotes
    }

    pub fn upvote_count(&self) -> usize {
        self.upvotes.len()
    }

    pub fn downvote_count(&self) -> usize {
        self.downvotes.len()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommentError {
    #[error("Comment text is required")]
    EmptyText,
    #[error("Comment must be at most 140 characters")]
    TooLong,
    #[error("Comment not found")]
    NotFound(Uuid),
    #[error("Not authorized")]
    NotAuthor,
}

impl Comment {
    /// Trims `text` and checks it is 1 to 140 characters.
    pub fn new(user_id: Uuid, text: &str, now: DateTime<Utc>) -> Result<Self, CommentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommentError::EmptyText);
        }
        if text.chars().count() > MAX_COMMENT_CHARS {
            return Err(CommentError::TooLong);
        }
        Ok(Comment {
            comment_id: Uuid::new_v4(),
            user_id,
            text: text.to_string(),
            created_at: now,
        })
    }
}

/// Comments in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentLog(Vec<Comment>);

impl CommentLog {
    pub fn new(comments: Vec<Comment>) -> Self {
        CommentLog(comments)
    }

    pub fn as_slice(&self) -> &[Comment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn append(&mut self, comment: Comment) {
        self.0.push(comment);
    }

    /// Index of `comment_id` if `requester` may delete it.
    pub fn authorize_removal(&self, comment_id: Uuid, requester: Uuid) -> Result<usize, CommentError> {
        let position = self
            .0
            .iter()
            .position(|c| c.comment_id == comment_id)
            .ok_or(CommentError::NotFound(comment_id))?;
        if self.0[position].user_id != requester {
            return Err(CommentError::NotAuthor);
        }
        Ok(position)
    }

    pub fn remove(&mut self, comment_id: Uuid, requester: Uuid) -> Result<Comment, CommentError> {
        let position = self.authorize_removal(comment_id, requester)?;
        Ok(self.0.remove(position))
    }

    pub fn user_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.0.iter().map(|c| c.user_id)
    }
}

impl From<CommentError> for crate::errors::AppError {
    fn from(err: CommentError) -> Self {
        use crate::errors::AppError;
        match err {
            CommentError::EmptyText | CommentError::TooLong => AppError::InvalidInput(err.to_string()),
            CommentError::NotFound(_) => AppError::NotFound(err.to_string()),
            CommentError::NotAuthor => AppError::Forbidden(err.to_string()),
        }
    }
}
