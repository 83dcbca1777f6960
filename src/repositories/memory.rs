//! Process-local stores for development and tests. Each store serializes its
//! mutations behind one `RwLock`, which gives the same atomicity the DynamoDB
//! update expressions give.

use super::items::{email_identity, username_identity};
use crate::{
    domain::{MemeRepository, UserRepository},
    errors::RepoError,
    ledger::VoteType,
    models::{Comment, Meme, ReportDetails, User},
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryMemeRepository {
    memes: RwLock<HashMap<Uuid, Meme>>,
}

impl InMemoryMemeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `mutate` to the stored meme and returns the result.
    async fn modify<F>(&self, id: Uuid, mutate: F) -> Result<Meme, RepoError>
    where
        F: FnOnce(&mut Meme) -> Result<(), RepoError>,
    {
        let mut memes = self.memes.write().await;
        let meme = memes
            .get_mut(&id)
            .ok_or(RepoError::NotFound { entity: "Meme", id })?;
        mutate(meme)?;
        Ok(meme.clone())
    }
}

#[async_trait]
impl MemeRepository for InMemoryMemeRepository {
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        let mut memes = self.memes.write().await;
        if memes.contains_key(&meme.meme_id) {
            return Err(RepoError::BackendError(anyhow::anyhow!(
                "Meme {} already exists",
                meme.meme_id
            )));
        }
        memes.insert(meme.meme_id, meme.clone());
        tracing::debug!(meme_id = %meme.meme_id, "Memory: Stored meme");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
        Ok(self.memes.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
        Ok(self.memes.read().await.values().cloned().collect())
    }

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<Meme>, RepoError> {
        Ok(self
            .memes
            .read()
            .await
            .values()
            .filter(|m| m.is_owned_by(creator_id))
            .cloned()
            .collect())
    }

    async fn update_content(&self, meme: &Meme) -> Result<Meme, RepoError> {
        self.modify(meme.meme_id, |stored| {
            stored.design = meme.design.clone();
            stored.image_url = meme.image_url.clone();
            stored.image_key = meme.image_key.clone();
            stored.is_draft = meme.is_draft;
            stored.updated_at = meme.updated_at;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.memes.write().await.remove(&id);
        Ok(())
    }

    async fn cast_vote(&self, id: Uuid, user_id: Uuid, vote: VoteType) -> Result<Meme, RepoError> {
        self.modify(id, |meme| {
            meme.votes.cast(user_id, vote);
            meme.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn add_comment(&self, id: Uuid, comment: &Comment) -> Result<Meme, RepoError> {
        self.modify(id, |meme| {
            meme.comments.append(comment.clone());
            meme.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn remove_comment(&self, id: Uuid, comment_id: Uuid, position: usize) -> Result<Meme, RepoError> {
        self.modify(id, |meme| {
            let slot = meme.comments.as_slice().get(position);
            let Some(comment) = slot.filter(|c| c.comment_id == comment_id) else {
                return Err(RepoError::StaleWrite("Comment list changed, reload and try again".into()));
            };
            let author = comment.user_id;
            meme.comments
                .remove(comment_id, author)
                .map_err(|e| RepoError::StaleWrite(e.to_string()))?;
            meme.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn record_view(&self, id: Uuid) -> Result<u64, RepoError> {
        let meme = self
            .modify(id, |meme| {
                meme.views += 1;
                Ok(())
            })
            .await?;
        Ok(meme.views)
    }

    async fn report(&self, id: Uuid, details: &ReportDetails) -> Result<Meme, RepoError> {
        self.modify(id, |meme| {
            meme.is_reported = true;
            meme.report = Some(details.clone());
            meme.updated_at = details.reported_at;
            Ok(())
        })
        .await
    }
}

#[derive(Debug, Default)]
struct UserTables {
    users: HashMap<Uuid, User>,
    /// Claim key (see `username_identity` / `email_identity`) to owner.
    identities: HashMap<String, Uuid>,
}

impl UserTables {
    fn check_claim(&self, identity: &str, owner: Uuid, field: &'static str) -> Result<(), RepoError> {
        match self.identities.get(identity) {
            Some(existing) if *existing != owner => Err(RepoError::Duplicate(field)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    tables: RwLock<UserTables>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        let username = username_identity(&user.username);
        let email = email_identity(&user.email);
        tables.check_claim(&username, user.user_id, "username")?;
        tables.check_claim(&email, user.user_id, "email")?;
        tables.identities.insert(username, user.user_id);
        tables.identities.insert(email, user.user_id);
        tables.users.insert(user.user_id, user.clone());
        tracing::debug!(user_id = %user.user_id, "Memory: Stored user");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .identities
            .get(&email_identity(email))
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<User>, RepoError> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.users.get(id)).cloned().collect())
    }

    async fn update(&self, previous: &User, updated: &User) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&updated.user_id) {
            return Err(RepoError::NotFound { entity: "User", id: updated.user_id });
        }
        let username = username_identity(&updated.username);
        let email = email_identity(&updated.email);
        tables.check_claim(&username, updated.user_id, "username")?;
        tables.check_claim(&email, updated.user_id, "email")?;

        tables.identities.remove(&username_identity(&previous.username));
        tables.identities.remove(&email_identity(&previous.email));
        tables.identities.insert(username, updated.user_id);
        tables.identities.insert(email, updated.user_id);
        tables.users.insert(updated.user_id, updated.clone());
        Ok(())
    }

    async fn delete(&self, user: &User) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        tables.users.remove(&user.user_id);
        tables.identities.remove(&username_identity(&user.username));
        tables.identities.remove(&email_identity(&user.email));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditState;
    use crate::models::Role;
    use assert_matches::assert_matches;

    fn user(username: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            user_id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            avatar: None,
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn usernames_are_unique_ignoring_case() {
        let repo = InMemoryUserRepository::new();
        repo.create(&user("DogeLord", "doge@example.com")).await.unwrap();
        assert_matches!(
            repo.create(&user("dogelord", "other@example.com")).await,
            Err(RepoError::Duplicate("username"))
        );
        assert_matches!(
            repo.create(&user("someone", "doge@example.com")).await,
            Err(RepoError::Duplicate("email"))
        );
    }

    #[tokio::test]
    async fn update_moves_the_email_claim() {
        let repo = InMemoryUserRepository::new();
        let before = user("pepe", "old@example.com");
        repo.create(&before).await.unwrap();
        let after = User { email: "new@example.com".into(), ..before.clone() };
        repo.update(&before, &after).await.unwrap();

        assert!(repo.get_by_email("old@example.com").await.unwrap().is_none());
        assert_eq!(repo.get_by_email("new@example.com").await.unwrap(), Some(after));
        repo.create(&user("wojak", "old@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn stale_comment_position_is_rejected() {
        let repo = InMemoryMemeRepository::new();
        let author = Uuid::new_v4();
        let meme = Meme::new(EditState::default(), None, None, false, Some(author), Utc::now());
        repo.create(&meme).await.unwrap();
        let first = Comment::new(author, "first", Utc::now()).unwrap();
        let second = Comment::new(author, "second", Utc::now()).unwrap();
        repo.add_comment(meme.meme_id, &first).await.unwrap();
        repo.add_comment(meme.meme_id, &second).await.unwrap();

        assert_matches!(
            repo.remove_comment(meme.meme_id, second.comment_id, 0).await,
            Err(RepoError::StaleWrite(_))
        );
        let after = repo.remove_comment(meme.meme_id, second.comment_id, 1).await.unwrap();
        assert_eq!(after.comments.as_slice(), &[first]);
    }

    #[tokio::test]
    async fn removing_a_comment_from_a_missing_meme_is_not_found() {
        let repo = InMemoryMemeRepository::new();
        let missing = Uuid::new_v4();
        assert_matches!(
            repo.remove_comment(missing, Uuid::new_v4(), 0).await,
            Err(RepoError::NotFound { entity: "Meme", id }) if id == missing
        );
    }

    #[tokio::test]
    async fn views_and_votes_survive_content_updates() {
        let repo = InMemoryMemeRepository::new();
        let voter = Uuid::new_v4();
        let mut meme = Meme::new(EditState::default(), None, None, false, None, Utc::now());
        repo.create(&meme).await.unwrap();
        repo.cast_vote(meme.meme_id, voter, VoteType::Up).await.unwrap();
        assert_eq!(repo.record_view(meme.meme_id).await.unwrap(), 1);

        meme.design.title = "retitled".into();
        let stored = repo.update_content(&meme).await.unwrap();
        assert_eq!(stored.design.title, "retitled");
        assert_eq!(stored.votes.vote_of(voter), Some(VoteType::Up));
        assert_eq!(stored.views, 1);
    }
}
