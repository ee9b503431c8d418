use chrono::{DateTime, Utc};
use upqueue_core::{classify, MediaKind, QueueItem, Rankable};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// An upqueue account, identified by its handle
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    /// A unique handle, such as an email address
    pub handle: String,
    /// The identity provider the user first signed in with
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A submission to a creator's queue, along with its current votes
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItemData {
    pub id: PrimaryKey,
    /// The user whose queue this item belongs to
    pub creator_id: PrimaryKey,
    /// The link as it was submitted
    pub url: String,
    pub kind: MediaKind,
    pub canonical_id: String,
    pub title: String,
    pub small_image: String,
    pub large_image: String,
    pub created_at: DateTime<Utc>,
    /// Derived from the votes referencing this item
    pub vote_count: u32,
    /// Whether the viewer of the snapshot voted for this item.
    /// Always false when there's no viewer.
    pub viewer_has_voted: bool,
}

/// A single user's upvote of a queue item
#[derive(Debug, Clone)]
pub struct VoteData {
    pub voter_id: PrimaryKey,
    pub item_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

impl QueueItemData {
    /// The URL a player surface embeds to play this item
    pub fn embed_url(&self) -> String {
        classify(&self.url)
            .map(|link| link.embed_url())
            .unwrap_or_else(|_| self.url.clone())
    }
}

impl Rankable for QueueItemData {
    fn vote_count(&self) -> u32 {
        self.vote_count
    }

    fn submission_order(&self) -> i64 {
        // Keys are assigned in submission order
        self.id as i64
    }
}

impl QueueItem for QueueItemData {
    type Id = PrimaryKey;

    fn item_id(&self) -> PrimaryKey {
        self.id
    }
}
