use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{stream, Stream};
use log::info;
use sha2::{Digest, Sha256};
use thiserror::Error;
use upqueue_core::{
    classify, rank, Backoff, ClassificationError, Config, PlaybackSession, PlaybackState,
    PollConfig, QueueError,
};

use crate::{
    CreatorQueue, Database, DatabaseError, Enrichment, ItemFilter, NewQueueItem, PrimaryKey,
    QueueItemData, UnvoteOutcome, VoteOutcome,
};

pub type CreatorSession = PlaybackSession<CreatorQueue>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The submission was rejected before anything was stored
    #[error("{0}")]
    Validation(String),
    /// The link is already queued for the creator
    #[error("This link is already in the queue")]
    DuplicateUrl,
    #[error(transparent)]
    Db(#[from] DatabaseError),
    #[error(transparent)]
    Playback(#[from] QueueError),
}

impl From<ClassificationError> for StreamError {
    fn from(err: ClassificationError) -> Self {
        StreamError::Validation(err.to_string())
    }
}

/// What the creator's playback surface asks of the session.
/// Advancing names the item the surface is showing, stale requests are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    Sync,
    Finish { item_id: PrimaryKey },
    Skip { item_id: PrimaryKey },
}

/// A ranked view of a queue, tagged with a revision that changes whenever the view does
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub items: Vec<QueueItemData>,
    pub revision: u64,
}

#[derive(Debug, Clone)]
pub struct PlaybackStatus {
    pub state: PlaybackState<QueueItemData>,
    /// Played items, most recent first
    pub history: Vec<QueueItemData>,
}

/// Wires submissions, votes and playback of every creator's stream together.
#[derive(Clone)]
pub struct StreamManager {
    db: Arc<dyn Database>,
    enrichment: Enrichment,
    config: Config,
    sessions: Arc<DashMap<PrimaryKey, Arc<CreatorSession>>>,
}

struct WatchState {
    manager: StreamManager,
    backoff: Backoff,
    last_revision: Option<u64>,
    polled: bool,
}

impl QueueSnapshot {
    pub fn new(items: Vec<QueueItemData>) -> Self {
        // Revisions are handed out as ETags, so they must be the same across builds
        let mut hasher = Sha256::new();

        for item in &items {
            hasher.update(item.id.to_be_bytes());
            hasher.update(item.vote_count.to_be_bytes());
            hasher.update([item.viewer_has_voted as u8]);
        }

        let digest = hasher.finalize();
        let mut revision = [0; 8];
        revision.copy_from_slice(&digest[..8]);

        Self {
            items,
            revision: u64::from_be_bytes(revision),
        }
    }
}

impl StreamManager {
    pub fn new(db: &Arc<dyn Database>, enrichment: Enrichment, config: Config) -> Self {
        Self {
            db: db.clone(),
            enrichment,
            config,
            sessions: Default::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Adds a link to a creator's queue, with zero votes
    pub async fn submit(
        &self,
        submitter_id: PrimaryKey,
        creator_id: PrimaryKey,
        url: &str,
    ) -> Result<QueueItemData, StreamError> {
        let link = classify(url)?;

        // Ensure creator exists
        let _ = self.db.user_by_id(creator_id).await?;

        let metadata = self.enrichment.enrich(&link, url.trim()).await;

        let item = self
            .db
            .create_item(NewQueueItem {
                creator_id,
                url: url.trim().to_string(),
                kind: link.kind(),
                canonical_id: link.canonical_id().to_string(),
                title: metadata.title,
                small_image: metadata.small_image,
                large_image: metadata.large_image,
                unique: !self.config.allow_duplicate_urls,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { .. } => StreamError::DuplicateUrl,
                e => e.into(),
            })?;

        info!(
            "User {} queued {} {} for creator {}",
            submitter_id, item.kind, item.canonical_id, creator_id
        );

        Ok(item)
    }

    /// Lists items in submission order
    pub async fn list(
        &self,
        creator_id: Option<PrimaryKey>,
        viewer_id: Option<PrimaryKey>,
    ) -> Result<Vec<QueueItemData>, StreamError> {
        let filter = ItemFilter {
            creator_id,
            viewer_id,
        };

        Ok(self.db.list_items(filter).await?)
    }

    /// Lists a creator's items in play order
    pub async fn ranked(
        &self,
        creator_id: PrimaryKey,
        viewer_id: Option<PrimaryKey>,
    ) -> Result<Vec<QueueItemData>, StreamError> {
        Ok(rank(self.list(Some(creator_id), viewer_id).await?))
    }

    pub async fn snapshot(
        &self,
        creator_id: PrimaryKey,
        viewer_id: Option<PrimaryKey>,
    ) -> Result<QueueSnapshot, StreamError> {
        Ok(QueueSnapshot::new(self.ranked(creator_id, viewer_id).await?))
    }

    /// Polls a creator's queue, yielding a snapshot whenever it changes.
    /// Polling slows down while nothing changes, and speeds back up on a change.
    pub fn watch(
        &self,
        creator_id: PrimaryKey,
        viewer_id: Option<PrimaryKey>,
        poll: PollConfig,
    ) -> impl Stream<Item = Result<QueueSnapshot, StreamError>> {
        let state = WatchState {
            manager: self.clone(),
            backoff: Backoff::new(poll),
            last_revision: None,
            polled: false,
        };

        stream::unfold(state, move |mut state| async move {
            loop {
                if state.polled {
                    tokio::time::sleep(state.backoff.next_delay()).await;
                }

                state.polled = true;

                match state.manager.snapshot(creator_id, viewer_id).await {
                    Ok(snapshot) if Some(snapshot.revision) == state.last_revision => continue,
                    Ok(snapshot) => {
                        state.backoff.reset();
                        state.last_revision = Some(snapshot.revision);

                        return Some((Ok(snapshot), state));
                    }
                    Err(err) => return Some((Err(err), state)),
                }
            }
        })
    }

    pub async fn vote(
        &self,
        item_id: PrimaryKey,
        voter_id: PrimaryKey,
    ) -> Result<VoteOutcome, StreamError> {
        Ok(self.db.cast_vote(item_id, voter_id).await?)
    }

    pub async fn unvote(
        &self,
        item_id: PrimaryKey,
        voter_id: PrimaryKey,
    ) -> Result<UnvoteOutcome, StreamError> {
        Ok(self.db.remove_vote(item_id, voter_id).await?)
    }

    pub async fn delete(
        &self,
        item_id: PrimaryKey,
        requester_id: PrimaryKey,
    ) -> Result<(), StreamError> {
        self.db.delete_item(item_id, requester_id).await?;
        info!("User {} deleted item {}", requester_id, item_id);

        Ok(())
    }

    /// Returns the playback session of a creator, starting one if needed
    pub fn session(&self, creator_id: PrimaryKey) -> Arc<CreatorSession> {
        let entry = self.sessions.entry(creator_id).or_insert_with(|| {
            let queue = CreatorQueue::new(self.db.clone(), creator_id);
            Arc::new(PlaybackSession::new(queue, self.config.clone()))
        });

        entry.value().clone()
    }

    pub async fn playback(&self, creator_id: PrimaryKey) -> Result<PlaybackStatus, StreamError> {
        // Ensure creator exists
        let _ = self.db.user_by_id(creator_id).await?;
        let session = self.session(creator_id);

        Ok(PlaybackStatus {
            state: session.state(),
            history: session.history(),
        })
    }

    /// Drives a creator's playback session. Only the creator may do this.
    pub async fn control(
        &self,
        creator_id: PrimaryKey,
        requester_id: PrimaryKey,
        action: PlaybackAction,
    ) -> Result<PlaybackStatus, StreamError> {
        if creator_id != requester_id {
            return Err(DatabaseError::Forbidden {
                resource: "stream",
                action: "control playback of",
            }
            .into());
        }

        let session = self.session(creator_id);

        let state = match action {
            PlaybackAction::Sync => session.sync().await?,
            PlaybackAction::Finish { item_id } => session.finish(item_id).await?,
            PlaybackAction::Skip { item_id } => session.skip(item_id).await?,
        };

        Ok(PlaybackStatus {
            state,
            history: session.history(),
        })
    }
}
