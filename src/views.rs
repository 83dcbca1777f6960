//! JSON shapes returned by the API and read back by the client.

use crate::{
    domain::UserRepository,
    editor::EditState,
    errors::RepoError,
    ledger::VoteType,
    models::{Meme, Role, User},
    ranking::Page,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.user_id,
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    /// `None` once the author's account is gone.
    pub user: Option<UserSummary>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemeView {
    pub id: Uuid,
    #[serde(flatten)]
    pub design: EditState,
    pub image_url: Option<String>,
    pub is_draft: bool,
    pub user: Option<UserSummary>,
    pub upvotes: usize,
    pub downvotes: usize,
    pub user_vote: Option<VoteType>,
    pub comments: Vec<CommentView>,
    pub views: u64,
    pub is_reported: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemePage {
    pub memes: Vec<MemeView>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_memes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for AccountView {
    fn from(user: &User) -> Self {
        AccountView {
            id: user.user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: AccountView,
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_memes: usize,
    pub total_views: u64,
    pub total_upvotes: usize,
    pub total_downvotes: usize,
    pub total_comments: usize,
}

impl UserStats {
    pub fn from_memes(memes: &[Meme]) -> Self {
        memes.iter().fold(UserStats::default(), |mut stats, meme| {
            stats.total_memes += 1;
            stats.total_views += meme.views;
            stats.total_upvotes += meme.votes.upvote_count();
            stats.total_downvotes += meme.votes.downvote_count();
            stats.total_comments += meme.comments.len();
            stats
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        MessageResponse { message: message.into() }
    }
}

/// Usernames and avatars for the users a set of memes refers to, fetched in
/// one batch.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<Uuid, UserSummary>,
}

impl UserDirectory {
    pub async fn load(repo: &dyn UserRepository, memes: &[Meme]) -> Result<Self, RepoError> {
        let ids: BTreeSet<Uuid> = memes
            .iter()
            .flat_map(|m| m.creator_id.into_iter().chain(m.comments.user_ids()))
            .collect();
        if ids.is_empty() {
            return Ok(UserDirectory::default());
        }
        let ids: Vec<Uuid> = ids.into_iter().collect();
        let users = repo.get_many(&ids).await?;
        Ok(UserDirectory {
            users: users.iter().map(|u| (u.user_id, UserSummary::from(u))).collect(),
        })
    }

    pub fn get(&self, id: Option<Uuid>) -> Option<UserSummary> {
        id.and_then(|id| self.users.get(&id).cloned())
    }

    pub fn meme_view(&self, meme: &Meme, viewer: Option<Uuid>) -> MemeView {
        MemeView {
            id: meme.meme_id,
            design: meme.design.clone(),
            image_url: meme.image_url.clone(),
            is_draft: meme.is_draft,
            user: self.get(meme.creator_id),
            upvotes: meme.votes.upvote_count(),
            downvotes: meme.votes.downvote_count(),
            user_vote: viewer.and_then(|id| meme.votes.vote_of(id)),
            comments: meme
                .comments
                .as_slice()
                .iter()
                .map(|c| CommentView {
                    id: c.comment_id,
                    user: self.get(Some(c.user_id)),
                    text: c.text.clone(),
                    created_at: c.created_at,
                })
                .collect(),
            views: meme.views,
            is_reported: meme.is_reported,
            created_at: meme.created_at,
            updated_at: meme.updated_at,
        }
    }

    pub fn page_view(&self, page: &Page<Meme>, viewer: Option<Uuid>) -> MemePage {
        MemePage {
            memes: page.items.iter().map(|m| self.meme_view(m, viewer)).collect(),
            current_page: page.current_page,
            total_pages: page.total_pages,
            total_memes: page.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Comment;

    #[test]
    fn meme_view_serializes_flat_camel_case() {
        let viewer = Uuid::new_v4();
        let image_url = Some("https://example.com/a.png".to_string());
        let mut meme = Meme::new(EditState::default(), image_url, None, false, None, Utc::now());
        meme.votes.cast(viewer, VoteType::Down);
        meme.comments.append(Comment::new(Uuid::new_v4(), "gone author", Utc::now()).unwrap());

        let json = serde_json::to_value(UserDirectory::default().meme_view(&meme, Some(viewer))).unwrap();
        assert_eq!(json["topTextSize"], 48);
        assert_eq!(json["topTextColor"], "#ffffff");
        assert_eq!(json["imageFilter"], "none");
        assert_eq!(json["downvotes"], 1);
        assert_eq!(json["userVote"], "down");
        assert_eq!(json["user"], serde_json::Value::Null);
        assert_eq!(json["comments"][0]["user"], serde_json::Value::Null);

        let back: MemeView = serde_json::from_value(json).unwrap();
        assert_eq!(back.design, meme.design);
    }

    #[test]
    fn anonymous_viewer_has_no_vote() {
        let mut meme = Meme::new(EditState::default(), None, None, false, None, Utc::now());
        meme.votes.cast(Uuid::new_v4(), VoteType::Up);
        let view = UserDirectory::default().meme_view(&meme, None);
        assert_eq!(view.user_vote, None);
        assert_eq!(view.upvotes, 1);
    }

    #[test]
    fn stats_sum_over_memes() {
        let mut a = Meme::new(EditState::default(), None, None, false, None, Utc::now());
        a.views = 7;
        a.votes.cast(Uuid::new_v4(), VoteType::Up);
        let mut b = a.clone();
        b.views = 3;
        b.comments.append(Comment::new(Uuid::new_v4(), "hi", Utc::now()).unwrap());
        let stats = UserStats::from_memes(&[a, b]);
        assert_eq!(stats, UserStats {
            total_memes: 2,
            total_views: 10,
            total_upvotes: 2,
            total_downvotes: 0,
            total_comments: 1,
        });
    }
}
