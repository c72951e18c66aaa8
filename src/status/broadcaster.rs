use super::record::StatusRecord;
use crate::pipeline::RunId;
use futures::stream::{self, Stream};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Default number of terminal records retained for late readers.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Board {
    active: HashMap<RunId, StatusRecord>,
    history: VecDeque<StatusRecord>,
    subscribers: Vec<mpsc::UnboundedSender<StatusRecord>>,
}

/// Holds the latest record of every in-flight run and fans each published
/// record out to all live subscribers.
///
/// Every subscriber owns an unbounded queue that is filled while the board
/// lock is held, so each one sees every record in publish order.
#[derive(Debug)]
pub struct StatusBroadcaster {
    board: Mutex<Board>,
    history_capacity: usize,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl StatusBroadcaster {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            board: Mutex::new(Board::default()),
            history_capacity: history_capacity.max(1),
        }
    }

    /// Upserts the record for its run. Terminal records leave the active
    /// index and move into the bounded history.
    pub fn publish(&self, record: StatusRecord) {
        let mut board = self.board();
        let run_id = record.run_id.clone();

        if record.is_terminal() {
            board.active.remove(&run_id);
            board.history.retain(|existing| existing.run_id != run_id);
            board.history.push_back(record.clone());
            while board.history.len() > self.history_capacity {
                board.history.pop_front();
            }
        } else {
            board.history.retain(|existing| existing.run_id != run_id);
            board.active.insert(run_id, record.clone());
        }

        tracing::trace!(
            run_id = %record.run_id,
            stage = %record.stage,
            progress = record.progress_percent,
            "status published"
        );
        // dropped subscriptions are pruned here
        board
            .subscribers
            .retain(|subscriber| subscriber.send(record.clone()).is_ok());
    }

    /// Receives every record published from now on. History is not replayed.
    pub fn subscribe(&self) -> StatusSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.board().subscribers.push(sender);
        StatusSubscription { receiver }
    }

    /// Point-in-time copy of all active runs.
    pub fn snapshot(&self) -> HashMap<RunId, StatusRecord> {
        self.board().active.clone()
    }

    /// Latest record for `run_id`, active or historical.
    pub fn get(&self, run_id: &RunId) -> Option<StatusRecord> {
        let board = self.board();
        board.active.get(run_id).cloned().or_else(|| {
            board
                .history
                .iter()
                .rev()
                .find(|record| &record.run_id == run_id)
                .cloned()
        })
    }

    pub fn active_runs(&self) -> Vec<RunId> {
        let mut runs: Vec<RunId> = self.board().active.keys().cloned().collect();
        runs.sort();
        runs
    }

    /// Terminal records, oldest first.
    pub fn history(&self) -> Vec<StatusRecord> {
        self.board().history.iter().cloned().collect()
    }

    /// Drops every trace of `run_id`. Returns whether anything was removed.
    pub fn clear(&self, run_id: &RunId) -> bool {
        let mut board = self.board();
        let active = board.active.remove(run_id).is_some();
        let before = board.history.len();
        board.history.retain(|record| &record.run_id != run_id);
        active || board.history.len() != before
    }

    /// Removes active records not updated within `max_age`, returning how
    /// many were dropped.
    pub fn prune_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut board = self.board();
        let before = board.active.len();
        board
            .active
            .retain(|_, record| now.saturating_duration_since(record.updated_at) <= max_age);
        let pruned = before - board.active.len();
        if pruned > 0 {
            tracing::info!(pruned, "dropped stale status records");
        }
        pruned
    }

    /// Subscriptions that are still being held.
    pub fn subscriber_count(&self) -> usize {
        self.board()
            .subscribers
            .iter()
            .filter(|subscriber| !subscriber.is_closed())
            .count()
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Live feed of published records.
#[derive(Debug)]
pub struct StatusSubscription {
    receiver: mpsc::UnboundedReceiver<StatusRecord>,
}

impl StatusSubscription {
    /// Next record, or `None` once the broadcaster is gone and every queued
    /// record has been read.
    pub async fn recv(&mut self) -> Option<StatusRecord> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`Self::recv`].
    pub fn try_recv(&mut self) -> Option<StatusRecord> {
        self.receiver.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = StatusRecord> + Send + Unpin {
        Box::pin(stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|record| (record, subscription))
        }))
    }
}
