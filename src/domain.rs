use crate::errors::{RepoError, StorageError};
use crate::ledger::VoteType;
use crate::models::{Comment, Meme, ReportDetails, User};
use async_trait::async_trait;
use uuid::Uuid;

/// Trait defining operations for storing and retrieving memes.
///
/// Mutations that touch the vote sets, the comment list or the view counter
/// are single atomic operations and return the record as stored afterwards.
#[async_trait]
pub trait MemeRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    async fn create(&self, meme: &Meme) -> Result<(), RepoError>;

    /// Returns Ok(None) if the meme is not found.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError>;

    /// Every meme, drafts included. Callers filter and order.
    async fn list_all(&self) -> Result<Vec<Meme>, RepoError>;

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<Meme>, RepoError>;

    /// Writes the design, image, draft flag and `updated_at` of `meme`.
    /// Votes, comments, views and report state are left as stored.
    async fn update_content(&self, meme: &Meme) -> Result<Meme, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    async fn cast_vote(&self, id: Uuid, user_id: Uuid, vote: VoteType) -> Result<Meme, RepoError>;

    async fn add_comment(&self, id: Uuid, comment: &Comment) -> Result<Meme, RepoError>;

    /// Removes the comment at `position`, failing with `StaleWrite` if that
    /// slot no longer holds `comment_id`.
    async fn remove_comment(&self, id: Uuid, comment_id: Uuid, position: usize) -> Result<Meme, RepoError>;

    /// Increments the view counter and returns the new value.
    async fn record_view(&self, id: Uuid) -> Result<u64, RepoError>;

    async fn report(&self, id: Uuid, details: &ReportDetails) -> Result<Meme, RepoError>;
}

/// Accounts, with username and email uniqueness enforced by the store.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Fails with `RepoError::Duplicate` when the username or email is taken.
    async fn create(&self, user: &User) -> Result<(), RepoError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;

    /// Users that exist among `ids`, in no particular order.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<User>, RepoError>;

    /// Replaces `previous` with `updated`, moving uniqueness claims when the
    /// username or email changed.
    async fn update(&self, previous: &User, updated: &User) -> Result<(), RepoError>;

    async fn delete(&self, user: &User) -> Result<(), RepoError>;
}

/// Trait defining operations for storing and retrieving file data (meme images).
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    /// Returns the bytes and the stored content type.
    async fn download(&self, key: &str) -> Result<(Vec<u8>, Option<String>), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
