use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use crate::{
    Database, DatabaseError, ItemFilter, NewQueueItem, NewSession, NewUser, PrimaryKey,
    QueueItemData, Result, SessionData, UnvoteOutcome, UserData, VoteData, VoteOutcome,
};

/// A database kept in process memory.
/// Useful for tests and for running without a postgres instance, nothing survives a restart.
pub struct MemoryDatabase {
    ids: AtomicCell<PrimaryKey>,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<PrimaryKey, UserData>,
    sessions: BTreeMap<String, SessionRecord>,
    items: BTreeMap<PrimaryKey, ItemRecord>,
    /// Keyed by (item, voter), which makes a second vote by the same voter impossible
    votes: BTreeMap<(PrimaryKey, PrimaryKey), DateTime<Utc>>,
}

struct SessionRecord {
    id: PrimaryKey,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

struct ItemRecord {
    id: PrimaryKey,
    item: NewQueueItem,
    created_at: DateTime<Utc>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            ids: AtomicCell::new(1),
            state: Default::default(),
        }
    }

    fn next_id(&self) -> PrimaryKey {
        self.ids.fetch_add(1)
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    fn vote_count(&self, item_id: PrimaryKey) -> u32 {
        self.votes
            .range((item_id, PrimaryKey::MIN)..=(item_id, PrimaryKey::MAX))
            .count() as u32
    }

    fn item_data(&self, record: &ItemRecord, viewer_id: Option<PrimaryKey>) -> QueueItemData {
        let viewer_has_voted = viewer_id
            .map(|viewer| self.votes.contains_key(&(record.id, viewer)))
            .unwrap_or(false);

        QueueItemData {
            id: record.id,
            creator_id: record.item.creator_id,
            url: record.item.url.clone(),
            kind: record.item.kind,
            canonical_id: record.item.canonical_id.clone(),
            title: record.item.title.clone(),
            small_image: record.item.small_image.clone(),
            large_image: record.item.large_image.clone(),
            created_at: record.created_at,
            vote_count: self.vote_count(record.id),
            viewer_has_voted,
        }
    }

    fn session_data(&self, token: &str) -> Result<SessionData> {
        let record = self.sessions.get(token).ok_or(DatabaseError::NotFound {
            resource: "session",
            identifier: "token",
        })?;

        let user = self
            .users
            .get(&record.user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        Ok(SessionData {
            id: record.id,
            token: token.to_string(),
            expires_at: record.expires_at,
            user,
        })
    }

    fn ensure_item(&self, item_id: PrimaryKey) -> Result<&ItemRecord> {
        self.items.get(&item_id).ok_or(DatabaseError::NotFound {
            resource: "queue item",
            identifier: "id",
        })
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state
            .lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn user_by_handle(&self, handle: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .values()
            .find(|u| u.handle == handle)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "handle",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state.users.values().any(|u| u.handle == new_user.handle) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "handle",
                value: new_user.handle,
            });
        }

        let user = UserData {
            id: self.next_id(),
            handle: new_user.handle,
            provider: new_user.provider,
            created_at: Utc::now(),
        };

        state.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        self.state.lock().session_data(token)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();

        if state.sessions.contains_key(&new_session.token) {
            return Err(DatabaseError::Conflict {
                resource: "session",
                field: "token",
                value: new_session.token,
            });
        }

        if !state.users.contains_key(&new_session.user_id) {
            return Err(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            });
        }

        state.sessions.insert(
            new_session.token.clone(),
            SessionRecord {
                id: self.next_id(),
                user_id: new_session.user_id,
                expires_at: new_session.expires_at,
            },
        );

        state.session_data(&new_session.token)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        self.state
            .lock()
            .sessions
            .remove(token)
            .map(|_| ())
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();

        self.state
            .lock()
            .sessions
            .retain(|_, session| session.expires_at > now);

        Ok(())
    }

    async fn item_by_id(
        &self,
        item_id: PrimaryKey,
        viewer_id: Option<PrimaryKey>,
    ) -> Result<QueueItemData> {
        let state = self.state.lock();
        let record = state.ensure_item(item_id)?;

        Ok(state.item_data(record, viewer_id))
    }

    async fn list_items(&self, filter: ItemFilter) -> Result<Vec<QueueItemData>> {
        let state = self.state.lock();

        Ok(state
            .items
            .values()
            .filter(|r| filter.creator_id.map_or(true, |c| r.item.creator_id == c))
            .map(|r| state.item_data(r, filter.viewer_id))
            .collect())
    }

    async fn create_item(&self, new_item: NewQueueItem) -> Result<QueueItemData> {
        let mut state = self.state.lock();

        if !state.users.contains_key(&new_item.creator_id) {
            return Err(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            });
        }

        let queued = new_item.unique
            && state.items.values().any(|r| {
                r.item.creator_id == new_item.creator_id
                    && r.item.kind == new_item.kind
                    && r.item.canonical_id == new_item.canonical_id
            });

        if queued {
            return Err(DatabaseError::Conflict {
                resource: "queue item",
                field: "url",
                value: new_item.url,
            });
        }

        let record = ItemRecord {
            id: self.next_id(),
            item: new_item,
            created_at: Utc::now(),
        };

        let data = state.item_data(&record, None);
        state.items.insert(record.id, record);

        Ok(data)
    }

    async fn delete_item(&self, item_id: PrimaryKey, requester_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        let record = state.ensure_item(item_id)?;

        if record.item.creator_id != requester_id {
            return Err(DatabaseError::Forbidden {
                resource: "queue item",
                action: "delete",
            });
        }

        // Votes go first, like they would with a foreign key
        state.votes.retain(|(item, _), _| *item != item_id);
        state.items.remove(&item_id);

        Ok(())
    }

    async fn votes_for_item(&self, item_id: PrimaryKey) -> Result<Vec<VoteData>> {
        let state = self.state.lock();
        state.ensure_item(item_id)?;

        Ok(state
            .votes
            .range((item_id, PrimaryKey::MIN)..=(item_id, PrimaryKey::MAX))
            .map(|(&(item_id, voter_id), &created_at)| VoteData {
                voter_id,
                item_id,
                created_at,
            })
            .collect())
    }

    async fn cast_vote(&self, item_id: PrimaryKey, voter_id: PrimaryKey) -> Result<VoteOutcome> {
        let mut state = self.state.lock();
        state.ensure_item(item_id)?;

        if !state.users.contains_key(&voter_id) {
            return Err(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            });
        }

        if state.votes.contains_key(&(item_id, voter_id)) {
            return Ok(VoteOutcome::AlreadyVoted);
        }

        state.votes.insert((item_id, voter_id), Utc::now());

        Ok(VoteOutcome::Cast)
    }

    async fn remove_vote(
        &self,
        item_id: PrimaryKey,
        voter_id: PrimaryKey,
    ) -> Result<UnvoteOutcome> {
        let mut state = self.state.lock();

        match state.votes.remove(&(item_id, voter_id)) {
            Some(_) => Ok(UnvoteOutcome::Removed),
            None => Ok(UnvoteOutcome::NotVoted),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use upqueue_core::MediaKind;

    use super::*;

    async fn user(db: &MemoryDatabase, handle: &str) -> UserData {
        db.create_user(NewUser {
            handle: handle.to_string(),
            provider: Some("google".to_string()),
        })
        .await
        .unwrap()
    }

    async fn item(db: &MemoryDatabase, creator_id: PrimaryKey) -> QueueItemData {
        db.create_item(NewQueueItem {
            creator_id,
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            kind: MediaKind::VideoLink,
            canonical_id: "dQw4w9WgXcQ".to_string(),
            title: "YouTube Track".to_string(),
            small_image: "small".to_string(),
            large_image: "large".to_string(),
            unique: false,
        })
        .await
        .unwrap()
    }

    async fn vote_count(db: &MemoryDatabase, item_id: PrimaryKey) -> u32 {
        db.item_by_id(item_id, None).await.unwrap().vote_count
    }

    #[tokio::test]
    async fn test_duplicate_handle_conflicts() {
        let db = MemoryDatabase::new();
        user(&db, "alice@example.com").await;

        let result = db
            .create_user(NewUser {
                handle: "alice@example.com".to_string(),
                provider: None,
            })
            .await;

        assert!(matches!(result, Err(DatabaseError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_item_for_missing_creator() {
        let db = MemoryDatabase::new();
        let result = db
            .create_item(NewQueueItem {
                creator_id: 42,
                url: String::new(),
                kind: MediaKind::VideoLink,
                canonical_id: String::new(),
                title: String::new(),
                small_image: String::new(),
                large_image: String::new(),
                unique: false,
            })
            .await;

        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unique_item_conflicts_per_creator() {
        let db = MemoryDatabase::new();
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        item(&db, alice.id).await;

        let unique = |creator_id| NewQueueItem {
            creator_id,
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            kind: MediaKind::VideoLink,
            canonical_id: "dQw4w9WgXcQ".to_string(),
            title: "YouTube Track".to_string(),
            small_image: String::new(),
            large_image: String::new(),
            unique: true,
        };

        assert!(matches!(
            db.create_item(unique(alice.id)).await,
            Err(DatabaseError::Conflict { .. })
        ));
        db.create_item(unique(bob.id)).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_vote_is_already_voted() {
        let db = MemoryDatabase::new();
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let item = item(&db, alice.id).await;

        assert_eq!(item.vote_count, 0);
        assert_eq!(db.cast_vote(item.id, bob.id).await.unwrap(), VoteOutcome::Cast);
        assert_eq!(
            db.cast_vote(item.id, bob.id).await.unwrap(),
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(vote_count(&db, item.id).await, 1);
    }

    #[tokio::test]
    async fn test_vote_toggle_law() {
        let db = MemoryDatabase::new();
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let item = item(&db, alice.id).await;

        db.cast_vote(item.id, bob.id).await.unwrap();
        assert_eq!(
            db.remove_vote(item.id, bob.id).await.unwrap(),
            UnvoteOutcome::Removed
        );
        assert_eq!(
            db.remove_vote(item.id, bob.id).await.unwrap(),
            UnvoteOutcome::NotVoted
        );
        db.cast_vote(item.id, bob.id).await.unwrap();

        assert_eq!(db.votes_for_item(item.id).await.unwrap().len(), 1);
        assert_eq!(vote_count(&db, item.id).await, 1);
    }

    #[tokio::test]
    async fn test_vote_on_missing_item() {
        let db = MemoryDatabase::new();
        let bob = user(&db, "bob").await;

        assert!(matches!(
            db.cast_vote(1000, bob.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_voters_are_all_counted() {
        let db = Arc::new(MemoryDatabase::new());
        let alice = user(&db, "alice").await;
        let item = item(&db, alice.id).await;

        let mut voters = vec![];
        for i in 0..32 {
            voters.push(user(&db, &format!("voter{}", i)).await.id);
        }

        let item_id = item.id;
        let handles: Vec<_> = voters
            .iter()
            .map(|&voter| {
                let db = db.clone();
                tokio::spawn(async move { db.cast_vote(item_id, voter).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), VoteOutcome::Cast);
        }

        assert_eq!(db.votes_for_item(item_id).await.unwrap().len(), 32);
        assert_eq!(vote_count(&db, item_id).await, 32);
    }

    #[tokio::test]
    async fn test_viewer_flag_in_listing() {
        let db = MemoryDatabase::new();
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let first = item(&db, alice.id).await;
        let second = item(&db, alice.id).await;

        db.cast_vote(second.id, bob.id).await.unwrap();

        let listed = db
            .list_items(ItemFilter::creator(alice.id).viewed_by(Some(bob.id)))
            .await
            .unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert!(!listed[0].viewer_has_voted);
        assert!(listed[1].viewer_has_voted);
        assert_eq!(listed[1].vote_count, 1);

        let anonymous = db.list_items(ItemFilter::creator(alice.id)).await.unwrap();
        assert!(anonymous.iter().all(|i| !i.viewer_has_voted));
    }

    #[tokio::test]
    async fn test_delete_requires_creator_and_removes_votes() {
        let db = MemoryDatabase::new();
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let item = item(&db, alice.id).await;

        db.cast_vote(item.id, bob.id).await.unwrap();

        assert!(matches!(
            db.delete_item(item.id, bob.id).await,
            Err(DatabaseError::Forbidden { .. })
        ));

        db.delete_item(item.id, alice.id).await.unwrap();

        assert!(matches!(
            db.delete_item(item.id, alice.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
        assert!(db.state.lock().votes.is_empty());
        assert!(db
            .list_items(ItemFilter::creator(alice.id))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_sessions_resolve_users_and_expire() {
        let db = MemoryDatabase::new();
        let alice = user(&db, "alice").await;

        db.create_session(NewSession {
            token: "live".to_string(),
            user_id: alice.id,
            expires_at: Utc::now() + chrono::Duration::days(1),
        })
        .await
        .unwrap();

        db.create_session(NewSession {
            token: "stale".to_string(),
            user_id: alice.id,
            expires_at: Utc::now() - chrono::Duration::days(1),
        })
        .await
        .unwrap();

        db.clear_expired_sessions().await.unwrap();

        assert_eq!(db.session_by_token("live").await.unwrap().user.id, alice.id);
        assert!(db.session_by_token("stale").await.is_err());
    }
}
