use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool};

use crate::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, ItemFilter, NewQueueItem,
    NewSession, NewUser, PrimaryKey, QueueItemData, Result, SessionData, UnvoteOutcome, UserData,
    VoteData, VoteOutcome,
};

const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

const ITEM_SELECT: &str = "
    SELECT
        i.*,
        (SELECT COUNT(*) FROM votes v WHERE v.item_id = i.id) AS vote_count,
        EXISTS(
            SELECT 1 FROM votes v WHERE v.item_id = i.id AND v.voter_id = $2::INTEGER
        ) AS viewer_has_voted
    FROM queue_items i";

/// A postgres database implementation for upqueue
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    handle: String,
    provider: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    handle: String,
    provider: Option<String>,
    user_created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ItemRow {
    id: PrimaryKey,
    creator_id: PrimaryKey,
    url: String,
    kind: String,
    canonical_id: String,
    title: String,
    small_image: String,
    large_image: String,
    created_at: DateTime<Utc>,
    vote_count: i64,
    viewer_has_voted: bool,
}

#[derive(FromRow)]
struct VoteRow {
    voter_id: PrimaryKey,
    item_id: PrimaryKey,
    created_at: DateTime<Utc>,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    /// Brings the schema up to date
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))
    }
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            handle: row.handle,
            provider: row.provider,
            created_at: row.created_at,
        }
    }
}

impl From<SessionRow> for SessionData {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                handle: row.handle,
                provider: row.provider,
                created_at: row.user_created_at,
            },
        }
    }
}

impl TryFrom<ItemRow> for QueueItemData {
    type Error = DatabaseError;

    fn try_from(row: ItemRow) -> Result<Self> {
        let kind = row.kind.parse().map_err(|e: String| DatabaseError::Internal(e.into()))?;

        Ok(Self {
            id: row.id,
            creator_id: row.creator_id,
            url: row.url,
            kind,
            canonical_id: row.canonical_id,
            title: row.title,
            small_image: row.small_image,
            large_image: row.large_image,
            created_at: row.created_at,
            vote_count: row.vote_count as u32,
            viewer_has_voted: row.viewer_has_voted,
        })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_handle(&self, handle: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE handle = $1")
            .bind(handle)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "handle"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_handle(&new_user.handle)
            .await
            .conflict_or_ok("user", "handle", &new_user.handle)?;

        query_as::<_, UserRow>(
            "INSERT INTO users (handle, provider) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new_user.handle)
        .bind(&new_user.provider)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| match e.sql_state().as_deref() {
            // Lost a race with another sign-in
            Some(UNIQUE_VIOLATION) => DatabaseError::Conflict {
                resource: "user",
                field: "handle",
                value: new_user.handle.clone(),
            },
            _ => e.any(),
        })
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        query_as::<_, SessionRow>(
            "SELECT
                sessions.*,
                users.handle,
                users.provider,
                users.created_at AS user_created_at
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("session", "token"))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match e.sql_state().as_deref() {
                Some(FOREIGN_KEY_VIOLATION) => DatabaseError::NotFound {
                    resource: "user",
                    identifier: "id",
                },
                Some(UNIQUE_VIOLATION) => DatabaseError::Conflict {
                    resource: "session",
                    field: "token",
                    value: new_session.token.clone(),
                },
                _ => e.any(),
            })?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let result = query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn item_by_id(
        &self,
        item_id: PrimaryKey,
        viewer_id: Option<PrimaryKey>,
    ) -> Result<QueueItemData> {
        let sql = format!("{} WHERE i.id = $1", ITEM_SELECT);

        query_as::<_, ItemRow>(&sql)
            .bind(item_id)
            .bind(viewer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("queue item", "id"))
            .and_then(QueueItemData::try_from)
    }

    async fn list_items(&self, filter: ItemFilter) -> Result<Vec<QueueItemData>> {
        let sql = format!(
            "{} WHERE ($1::INTEGER IS NULL OR i.creator_id = $1) ORDER BY i.id",
            ITEM_SELECT
        );

        // Counts come from the same statement, so they share one snapshot
        let rows = query_as::<_, ItemRow>(&sql)
            .bind(filter.creator_id)
            .bind(filter.viewer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        rows.into_iter().map(QueueItemData::try_from).collect()
    }

    async fn create_item(&self, new_item: NewQueueItem) -> Result<QueueItemData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        if new_item.unique {
            // Held until the transaction ends, so submissions to one queue can't interleave
            query("SELECT pg_advisory_xact_lock($1)")
                .bind(i64::from(new_item.creator_id))
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;

            let queued: bool = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM queue_items
                    WHERE creator_id = $1 AND kind = $2 AND canonical_id = $3
                )",
            )
            .bind(new_item.creator_id)
            .bind(new_item.kind.as_str())
            .bind(&new_item.canonical_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.any())?;

            if queued {
                return Err(DatabaseError::Conflict {
                    resource: "queue item",
                    field: "url",
                    value: new_item.url,
                });
            }
        }

        let id: PrimaryKey = sqlx::query_scalar(
            "INSERT INTO queue_items
                (creator_id, url, kind, canonical_id, title, small_image, large_image)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id",
        )
        .bind(new_item.creator_id)
        .bind(&new_item.url)
        .bind(new_item.kind.as_str())
        .bind(&new_item.canonical_id)
        .bind(&new_item.title)
        .bind(&new_item.small_image)
        .bind(&new_item.large_image)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e.sql_state().as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            },
            _ => e.any(),
        })?;

        tx.commit().await.map_err(|e| e.any())?;

        self.item_by_id(id, None).await
    }

    async fn delete_item(&self, item_id: PrimaryKey, requester_id: PrimaryKey) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let creator_id: PrimaryKey =
            sqlx::query_scalar("SELECT creator_id FROM queue_items WHERE id = $1 FOR UPDATE")
                .bind(item_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| e.not_found_or("queue item", "id"))?;

        if creator_id != requester_id {
            return Err(DatabaseError::Forbidden {
                resource: "queue item",
                action: "delete",
            });
        }

        query("DELETE FROM votes WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        query("DELETE FROM queue_items WHERE id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn votes_for_item(&self, item_id: PrimaryKey) -> Result<Vec<VoteData>> {
        // Ensure item exists
        let _ = self.item_by_id(item_id, None).await?;

        let rows = query_as::<_, VoteRow>("SELECT * FROM votes WHERE item_id = $1")
            .bind(item_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|r| VoteData {
                voter_id: r.voter_id,
                item_id: r.item_id,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn cast_vote(&self, item_id: PrimaryKey, voter_id: PrimaryKey) -> Result<VoteOutcome> {
        let result = query(
            "INSERT INTO votes (voter_id, item_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(voter_id)
        .bind(item_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.sql_state().as_deref() {
            // Either the item or the voter is gone
            Some(FOREIGN_KEY_VIOLATION) => DatabaseError::NotFound {
                resource: "queue item",
                identifier: "id",
            },
            _ => e.any(),
        })?;

        match result.rows_affected() {
            0 => Ok(VoteOutcome::AlreadyVoted),
            _ => Ok(VoteOutcome::Cast),
        }
    }

    async fn remove_vote(
        &self,
        item_id: PrimaryKey,
        voter_id: PrimaryKey,
    ) -> Result<UnvoteOutcome> {
        let result = query("DELETE FROM votes WHERE voter_id = $1 AND item_id = $2")
            .bind(voter_id)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match result.rows_affected() {
            0 => Ok(UnvoteOutcome::NotVoted),
            _ => Ok(UnvoteOutcome::Removed),
        }
    }
}

trait SqlState {
    fn sql_state(&self) -> Option<String>;
}

impl SqlState for SqlxError {
    fn sql_state(&self) -> Option<String> {
        match self {
            SqlxError::Database(e) => e.code().map(|c| c.into_owned()),
            _ => None,
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}

/// These run against a real postgres instance:
/// `UPQUEUE_TEST_DATABASE_URL=postgres://... cargo test -- --ignored`
#[cfg(test)]
mod test {
    use std::sync::Arc;

    use upqueue_core::MediaKind;

    use super::*;
    use crate::util::random_string;

    async fn database() -> Arc<PgDatabase> {
        let url = std::env::var("UPQUEUE_TEST_DATABASE_URL")
            .expect("UPQUEUE_TEST_DATABASE_URL is set");

        let db = PgDatabase::new(&url).await.unwrap();
        db.migrate().await.unwrap();

        Arc::new(db)
    }

    /// Handles are unique per run, so tests can share one database
    async fn user(db: &PgDatabase, name: &str) -> UserData {
        db.create_user(NewUser {
            handle: format!("{}-{}", name, random_string(12)),
            provider: None,
        })
        .await
        .unwrap()
    }

    fn new_item(creator_id: PrimaryKey, unique: bool) -> NewQueueItem {
        NewQueueItem {
            creator_id,
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            kind: MediaKind::VideoLink,
            canonical_id: "dQw4w9WgXcQ".to_string(),
            title: "YouTube Track".to_string(),
            small_image: String::new(),
            large_image: String::new(),
            unique,
        }
    }

    #[tokio::test]
    #[ignore = "needs a postgres database"]
    async fn test_vote_toggle_law() {
        let db = database().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let item = db.create_item(new_item(alice.id, false)).await.unwrap();

        assert_eq!(db.cast_vote(item.id, bob.id).await.unwrap(), VoteOutcome::Cast);
        assert_eq!(
            db.cast_vote(item.id, bob.id).await.unwrap(),
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(
            db.remove_vote(item.id, bob.id).await.unwrap(),
            UnvoteOutcome::Removed
        );
        assert_eq!(
            db.remove_vote(item.id, bob.id).await.unwrap(),
            UnvoteOutcome::NotVoted
        );
        db.cast_vote(item.id, bob.id).await.unwrap();

        let viewed = db.item_by_id(item.id, Some(bob.id)).await.unwrap();
        assert_eq!(viewed.vote_count, 1);
        assert!(viewed.viewer_has_voted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs a postgres database"]
    async fn test_concurrent_votes() {
        let db = database().await;
        let alice = user(&db, "alice").await;
        let item = db.create_item(new_item(alice.id, false)).await.unwrap();
        let item_id = item.id;

        let mut voters = vec![];
        for i in 0..16 {
            voters.push(user(&db, &format!("voter{}", i)).await.id);
        }

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

        // The same voter racing with itself is only counted once
        let repeat = voters[0];
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { db.cast_vote(item_id, repeat).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), VoteOutcome::AlreadyVoted);
        }

        assert_eq!(db.votes_for_item(item_id).await.unwrap().len(), 16);
        assert_eq!(db.item_by_id(item_id, None).await.unwrap().vote_count, 16);
    }

    #[tokio::test]
    #[ignore = "needs a postgres database"]
    async fn test_delete_requires_creator_and_removes_votes() {
        let db = database().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let item = db.create_item(new_item(alice.id, false)).await.unwrap();

        db.cast_vote(item.id, bob.id).await.unwrap();

        assert!(matches!(
            db.delete_item(item.id, bob.id).await,
            Err(DatabaseError::Forbidden { .. })
        ));

        db.delete_item(item.id, alice.id).await.unwrap();

        assert!(matches!(
            db.votes_for_item(item.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
        assert!(matches!(
            db.delete_item(item.id, alice.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    #[ignore = "needs a postgres database"]
    async fn test_item_for_missing_creator() {
        let db = database().await;

        assert!(matches!(
            db.create_item(new_item(PrimaryKey::MAX, false)).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs a postgres database"]
    async fn test_concurrent_unique_items_are_queued_once() {
        let db = database().await;
        let alice = user(&db, "alice").await;
        let creator_id = alice.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { db.create_item(new_item(creator_id, true)).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(DatabaseError::Conflict { .. }) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(
            db.list_items(ItemFilter::creator(creator_id))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
