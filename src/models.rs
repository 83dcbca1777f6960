use crate::editor::EditState;
use crate::ledger::{CommentLog, VoteLedger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

pub use crate::ledger::VoteType;

#[derive(Debug, Clone, PartialEq)]
pub struct Meme {
    pub meme_id: Uuid,
    pub design: EditState,
    pub image_url: Option<String>,
    /// Blob-storage key when the image was uploaded to this service.
    pub image_key: Option<String>,
    pub is_draft: bool,
    pub creator_id: Option<Uuid>,
    pub votes: VoteLedger,
    pub comments: CommentLog,
    pub views: u64,
    pub is_reported: bool,
    pub report: Option<ReportDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meme {
    pub fn new(
        design: EditState,
        image_url: Option<String>,
        image_key: Option<String>,
        is_draft: bool,
        creator_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Meme {
            meme_id: Uuid::new_v4(),
            design,
            image_url,
            image_key,
            is_draft,
            creator_id,
            votes: VoteLedger::default(),
            comments: CommentLog::default(),
            views: 0,
            is_reported: false,
            report: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.creator_id == Some(user_id)
    }

    /// Published memes are public; drafts only to their creator.
    pub fn is_visible_to(&self, viewer: Option<Uuid>) -> bool {
        !self.is_draft || viewer.is_some_and(|id| self.is_owned_by(id))
    }

    /// Eligible for the ranking queries.
    pub fn is_rankable(&self) -> bool {
        !self.is_draft && !self.is_reported
    }

    pub fn has_image(&self) -> bool {
        self.image_url.is_some() || self.image_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub comment_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetails {
    pub reason: String,
    pub reported_by: Uuid,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    /// Always stored trimmed and lowercased.
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
