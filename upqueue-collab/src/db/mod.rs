use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use upqueue_core::MediaKind;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// The requesting user isn't allowed to mutate the resource
    #[error("Not allowed to {action} this {resource}")]
    Forbidden {
        resource: &'static str,
        action: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// The result of casting a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// A new vote was recorded
    Cast,
    /// The voter already had a vote on the item, nothing changed
    AlreadyVoted,
}

/// The result of removing a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnvoteOutcome {
    /// The vote was removed
    Removed,
    /// The voter had no vote on the item, nothing changed
    NotVoted,
}

/// Represents a type that stores upqueue data.
///
/// Every operation is atomic. Implementors must never expose partially applied state.
#[async_trait]
pub trait Database
where
    Self: Send + Sync + 'static,
{
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_handle(&self, handle: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn item_by_id(
        &self,
        item_id: PrimaryKey,
        viewer_id: Option<PrimaryKey>,
    ) -> Result<QueueItemData>;
    /// Lists items in submission order, with votes counted in the same snapshot
    async fn list_items(&self, filter: ItemFilter) -> Result<Vec<QueueItemData>>;
    async fn create_item(&self, new_item: NewQueueItem) -> Result<QueueItemData>;
    /// Deletes an item and its votes, if the requester is the item's creator
    async fn delete_item(&self, item_id: PrimaryKey, requester_id: PrimaryKey) -> Result<()>;

    async fn votes_for_item(&self, item_id: PrimaryKey) -> Result<Vec<VoteData>>;
    async fn cast_vote(&self, item_id: PrimaryKey, voter_id: PrimaryKey) -> Result<VoteOutcome>;
    async fn remove_vote(&self, item_id: PrimaryKey, voter_id: PrimaryKey)
        -> Result<UnvoteOutcome>;
}

#[derive(Debug)]
pub struct NewUser {
    pub handle: String,
    pub provider: Option<String>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQueueItem {
    /// The owner of the queue the item is submitted to
    pub creator_id: PrimaryKey,
    pub url: String,
    pub kind: MediaKind,
    pub canonical_id: String,
    pub title: String,
    pub small_image: String,
    pub large_image: String,
    /// Reject the item with a conflict if the creator already has this link queued
    pub unique: bool,
}

/// Narrows down a listing of queue items
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemFilter {
    /// Only list items in this creator's queue
    pub creator_id: Option<PrimaryKey>,
    /// Flag the items this user has voted for
    pub viewer_id: Option<PrimaryKey>,
}

impl ItemFilter {
    pub fn creator(creator_id: PrimaryKey) -> Self {
        Self {
            creator_id: Some(creator_id),
            viewer_id: None,
        }
    }

    pub fn viewed_by(self, viewer_id: Option<PrimaryKey>) -> Self {
        Self { viewer_id, ..self }
    }
}
