use std::collections::{HashSet, VecDeque};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::{Config, Queue, QueueError, QueueItem, RetireOutcome};

type ItemId<Q> = <<Q as Queue>::Item as QueueItem>::Id;

/// The state of a playback session
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState<T> {
    /// Nothing is bound to the playback surface
    Idle,
    /// An item is bound and playing
    Playing { current: T },
    /// The current item is being retired and the next head is being derived
    Advancing { retiring: T },
}

/// Why the session is advancing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    /// The playback surface reported the end of the item
    Finished,
    /// The creator asked to skip the item
    Skipped,
}

/// Coordinates "now playing" for one queue, retiring items as they are consumed.
pub struct PlaybackSession<Q>
where
    Q: Queue,
{
    queue: Q,
    config: Config,
    state: Mutex<PlaybackState<Q::Item>>,
    history: Mutex<VecDeque<Q::Item>>,
    /// Items that were played but could not be retired yet
    unretired: Mutex<HashSet<ItemId<Q>>>,
}

impl<T> PlaybackState<T> {
    /// Returns the item bound to the playback surface, if any
    pub fn item(&self) -> Option<&T> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Playing { current } => Some(current),
            PlaybackState::Advancing { retiring } => Some(retiring),
        }
    }
}

impl<Q> PlaybackSession<Q>
where
    Q: Queue,
{
    pub fn new(queue: Q, config: Config) -> Self {
        Self {
            queue,
            config,
            state: Mutex::new(PlaybackState::Idle),
            history: Default::default(),
            unretired: Default::default(),
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn state(&self) -> PlaybackState<Q::Item> {
        self.state.lock().clone()
    }

    /// Returns the currently playing item, if any
    pub fn current(&self) -> Option<Q::Item> {
        match &*self.state.lock() {
            PlaybackState::Playing { current } => Some(current.clone()),
            _ => None,
        }
    }

    /// Returns the played items, most recent first
    pub fn history(&self) -> Vec<Q::Item> {
        self.history.lock().iter().cloned().collect()
    }

    /// Starts playing the head of the queue if the session is idle.
    pub async fn sync(&self) -> Result<PlaybackState<Q::Item>, QueueError> {
        self.retry_unretired().await;

        let is_idle = matches!(*self.state.lock(), PlaybackState::Idle);

        if !is_idle {
            return Ok(self.state());
        }

        let next = self.next_head().await?;

        let mut state = self.state.lock();

        // Another call may have started playback while the queue was read
        if matches!(*state, PlaybackState::Idle) {
            if let Some(item) = next {
                info!("Now playing {:?}", item.item_id());
                *state = PlaybackState::Playing { current: item };
            }
        }

        Ok(state.clone())
    }

    /// Called when the playback surface reports the end of `expected`.
    pub async fn finish(
        &self,
        expected: ItemId<Q>,
    ) -> Result<PlaybackState<Q::Item>, QueueError> {
        self.advance(AdvanceReason::Finished, expected).await
    }

    /// Called when the creator skips `expected`.
    pub async fn skip(&self, expected: ItemId<Q>) -> Result<PlaybackState<Q::Item>, QueueError> {
        self.advance(AdvanceReason::Skipped, expected).await
    }

    /// Retires `expected` and moves on to the next head of the queue.
    ///
    /// Nothing happens unless `expected` is the item the session is playing or retiring,
    /// so a repeated or late report can't retire an item that hasn't been played.
    pub async fn advance(
        &self,
        reason: AdvanceReason,
        expected: ItemId<Q>,
    ) -> Result<PlaybackState<Q::Item>, QueueError> {
        self.retry_unretired().await;

        let item = match self.begin_advance(expected) {
            Some(item) => item,
            None => {
                debug!("Ignoring {:?} of {:?}, it isn't playing", reason, expected);
                return Ok(self.state());
            }
        };

        info!("Advancing past {:?} ({:?})", item.item_id(), reason);
        self.retire(item.item_id()).await;

        let next = match self.next_head().await {
            Ok(next) => next,
            Err(e) => {
                *self.state.lock() = PlaybackState::Idle;
                return Err(e);
            }
        };

        let mut state = self.state.lock();

        *state = match next {
            Some(item) => {
                info!("Now playing {:?}", item.item_id());
                PlaybackState::Playing { current: item }
            }
            None => {
                info!("Queue is empty, playback is idle");
                PlaybackState::Idle
            }
        };

        Ok(state.clone())
    }

    /// Moves the session into [PlaybackState::Advancing] if `expected` is bound to it,
    /// returning the item to retire.
    fn begin_advance(&self, expected: ItemId<Q>) -> Option<Q::Item> {
        let mut state = self.state.lock();

        let retiring = match &*state {
            PlaybackState::Playing { current } if current.item_id() == expected => current.clone(),
            PlaybackState::Advancing { retiring } if retiring.item_id() == expected => {
                // Concurrent advances both retire the same item, the later one is a no-op
                debug!("Advance requested while already advancing {:?}", expected);
                return Some(retiring.clone());
            }
            _ => return None,
        };

        *state = PlaybackState::Advancing {
            retiring: retiring.clone(),
        };
        drop(state);

        self.remember(retiring.clone());
        Some(retiring)
    }

    /// Reads the ranked queue and returns the first item that may be played.
    async fn next_head(&self) -> Result<Option<Q::Item>, QueueError> {
        let ranked = self.queue.ranked().await?;
        let unretired = self.unretired.lock();

        Ok(ranked
            .into_iter()
            .find(|item| !unretired.contains(&item.item_id())))
    }

    /// Retires an item, retrying a few times. Failure is logged and playback proceeds.
    async fn retire(&self, id: ItemId<Q>) {
        let attempts = self.config.retire_attempts.max(1);

        for attempt in 1..=attempts {
            match self.queue.retire(id).await {
                Ok(RetireOutcome::Retired) => {
                    self.unretired.lock().remove(&id);
                    return;
                }
                Ok(RetireOutcome::AlreadyGone) => {
                    debug!("Item {:?} was already retired", id);
                    self.unretired.lock().remove(&id);
                    return;
                }
                Err(e) => warn!(
                    "Failed to retire item {:?} (attempt {}/{}): {}",
                    id, attempt, attempts, e
                ),
            }
        }

        error!(
            "Giving up on retiring item {:?}, it will be retried on the next advance",
            id
        );
        self.unretired.lock().insert(id);
    }

    async fn retry_unretired(&self) {
        let pending: Vec<_> = self.unretired.lock().iter().copied().collect();

        for id in pending {
            match self.queue.retire(id).await {
                Ok(_) => {
                    info!("Retired previously failed item {:?}", id);
                    self.unretired.lock().remove(&id);
                }
                Err(e) => warn!("Item {:?} is still not retired: {}", id, e),
            }
        }
    }

    fn remember(&self, item: Q::Item) {
        let mut history = self.history.lock();

        history.push_front(item);
        history.truncate(self.config.history_size);
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{rank, Rankable};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        votes: u32,
    }

    impl Rankable for Item {
        fn vote_count(&self) -> u32 {
            self.votes
        }

        fn submission_order(&self) -> i64 {
            self.id as i64
        }
    }

    impl QueueItem for Item {
        type Id = u32;

        fn item_id(&self) -> u32 {
            self.id
        }
    }

    #[derive(Default)]
    struct FakeQueue {
        items: Mutex<Vec<Item>>,
        /// How many upcoming retire calls fail
        failing_retires: AtomicU32,
        failing_reads: AtomicU32,
        retire_calls: AtomicU32,
    }

    impl FakeQueue {
        fn with(items: &[(u32, u32)]) -> Self {
            let queue = Self::default();
            *queue.items.lock() = items
                .iter()
                .map(|&(id, votes)| Item { id, votes })
                .collect();
            queue
        }

        fn ids(&self) -> Vec<u32> {
            self.items.lock().iter().map(|i| i.id).collect()
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl Queue for Arc<FakeQueue> {
        type Item = Item;

        async fn ranked(&self) -> Result<Vec<Item>, QueueError> {
            tokio::task::yield_now().await;

            if take_failure(&self.failing_reads) {
                return Err(QueueError::Store("read failed".into()));
            }

            Ok(rank(self.items.lock().clone()))
        }

        async fn retire(&self, id: u32) -> Result<RetireOutcome, QueueError> {
            tokio::task::yield_now().await;
            self.retire_calls.fetch_add(1, Ordering::SeqCst);

            if take_failure(&self.failing_retires) {
                return Err(QueueError::Store("delete failed".into()));
            }

            let mut items = self.items.lock();
            let before = items.len();
            items.retain(|i| i.id != id);

            if items.len() < before {
                Ok(RetireOutcome::Retired)
            } else {
                Ok(RetireOutcome::AlreadyGone)
            }
        }
    }

    fn session(queue: &Arc<FakeQueue>) -> PlaybackSession<Arc<FakeQueue>> {
        PlaybackSession::new(
            queue.clone(),
            Config {
                history_size: 2,
                ..Default::default()
            },
        )
    }

    fn current_id(state: &PlaybackState<Item>) -> Option<u32> {
        match state {
            PlaybackState::Playing { current } => Some(current.id),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_idle_session_starts_on_head() {
        let queue = Arc::new(FakeQueue::with(&[(1, 0), (2, 3), (3, 3)]));
        let session = session(&queue);

        assert_eq!(session.state(), PlaybackState::Idle);

        let state = session.sync().await.unwrap();
        assert_eq!(current_id(&state), Some(2));

        // Syncing while playing doesn't change the current item
        queue.items.lock().push(Item { id: 4, votes: 10 });
        let state = session.sync().await.unwrap();
        assert_eq!(current_id(&state), Some(2));
    }

    #[tokio::test]
    async fn test_empty_queue_stays_idle() {
        let queue = Arc::new(FakeQueue::default());
        let session = session(&queue);

        assert_eq!(session.sync().await.unwrap(), PlaybackState::Idle);
        assert_eq!(session.finish(1).await.unwrap(), PlaybackState::Idle);
        assert_eq!(queue.retire_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finish_retires_and_advances() {
        let queue = Arc::new(FakeQueue::with(&[(1, 1), (2, 0)]));
        let session = session(&queue);

        session.sync().await.unwrap();
        let state = session.finish(1).await.unwrap();

        assert_eq!(current_id(&state), Some(2));
        assert_eq!(queue.ids(), [2]);
        assert_eq!(session.history(), [Item { id: 1, votes: 1 }]);

        let state = session.skip(2).await.unwrap();

        assert_eq!(state, PlaybackState::Idle);
        assert!(queue.ids().is_empty());
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let queue = Arc::new(FakeQueue::with(&[(1, 0), (2, 0), (3, 0), (4, 0)]));
        let session = session(&queue);

        session.sync().await.unwrap();
        for id in 1..=3 {
            session.skip(id).await.unwrap();
        }

        let history: Vec<_> = session.history().iter().map(|i| i.id).collect();
        assert_eq!(history, [3, 2]);
    }

    #[tokio::test]
    async fn test_transient_retire_failure_is_retried() {
        let queue = Arc::new(FakeQueue::with(&[(1, 0), (2, 0)]));
        let session = session(&queue);

        session.sync().await.unwrap();
        queue.failing_retires.store(1, Ordering::SeqCst);

        let state = session.finish(1).await.unwrap();

        assert_eq!(current_id(&state), Some(2));
        assert_eq!(queue.ids(), [2]);
        assert_eq!(queue.retire_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_retirement_is_not_replayed() {
        let queue = Arc::new(FakeQueue::with(&[(1, 5), (2, 0)]));
        let session = session(&queue);

        session.sync().await.unwrap();
        queue.failing_retires.store(3, Ordering::SeqCst);

        // Playback continues even though item 1 is still stored
        let state = session.finish(1).await.unwrap();
        assert_eq!(current_id(&state), Some(2));
        assert_eq!(queue.ids(), [1, 2]);

        // The next advance retries the pending retirement
        let state = session.finish(2).await.unwrap();
        assert_eq!(state, PlaybackState::Idle);
        assert!(queue.ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_read_leaves_session_idle() {
        let queue = Arc::new(FakeQueue::with(&[(1, 0), (2, 0)]));
        let session = session(&queue);

        session.sync().await.unwrap();
        queue.failing_reads.store(1, Ordering::SeqCst);

        assert!(session.finish(1).await.is_err());
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(queue.ids(), [2]);

        let state = session.sync().await.unwrap();
        assert_eq!(current_id(&state), Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_advances_retire_once() {
        let queue = Arc::new(FakeQueue::with(&[(1, 2), (2, 1), (3, 0)]));
        let session = session(&queue);

        session.sync().await.unwrap();

        let (a, b) = tokio::join!(session.finish(1), session.finish(1));

        assert_eq!(current_id(&a.unwrap()), Some(2));
        assert_eq!(current_id(&b.unwrap()), Some(2));
        assert_eq!(queue.ids(), [2, 3]);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_late_advance_keeps_next_item() {
        let queue = Arc::new(FakeQueue::with(&[(1, 2), (2, 1), (3, 0)]));
        let session = session(&queue);

        session.sync().await.unwrap();
        session.finish(1).await.unwrap();

        // The player reports the end of item 1 a second time
        let state = session.finish(1).await.unwrap();

        assert_eq!(current_id(&state), Some(2));
        assert_eq!(queue.ids(), [2, 3]);
        let history: Vec<_> = session.history().iter().map(|i| i.id).collect();
        assert_eq!(history, [1]);

        let state = session.skip(3).await.unwrap();
        assert_eq!(current_id(&state), Some(2));
        assert_eq!(queue.ids(), [2, 3]);
    }

    #[tokio::test]
    async fn test_advance_while_idle_does_nothing() {
        let queue = Arc::new(FakeQueue::with(&[(1, 0)]));
        let session = session(&queue);

        assert_eq!(session.skip(1).await.unwrap(), PlaybackState::Idle);
        assert_eq!(queue.ids(), [1]);
        assert!(session.history().is_empty());
    }
}
