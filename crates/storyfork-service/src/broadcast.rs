//! Post-commit fan-out of story snapshots
//!
//! Each story gets its own tokio broadcast channel. Subscribers always receive
//! full trees, never deltas; a subscriber that falls behind skips straight to
//! the newest tree it can still read.

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use storyfork_core::{StoryId, StoryTree, TreeView};
use tokio::sync::broadcast;

/// Receiver of committed snapshots
///
/// Called with the story's write slot held, in commit order. Delivery is
/// best-effort: implementations must not block and cannot fail the commit.
pub trait Broadcaster: Send + Sync + std::fmt::Debug {
    /// Hand a committed tree to viewers of `story`
    fn publish(&self, story: StoryId, snapshot: Arc<StoryTree>);
}

/// Statistics for monitoring broadcast health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub published: u64,
    pub delivered: u64,
    pub active_channels: usize,
}

/// Per-story broadcast channels
#[derive(Debug)]
pub struct ChannelBroadcaster {
    channels: DashMap<StoryId, broadcast::Sender<Arc<StoryTree>>>,
    capacity: usize,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl ChannelBroadcaster {
    /// Create broadcaster buffering `capacity` snapshots per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Raw receiver for one story's snapshots
    pub fn receiver(&self, story: StoryId) -> broadcast::Receiver<Arc<StoryTree>> {
        self.channels
            .entry(story)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of live receivers for a story
    #[must_use]
    pub fn subscriber_count(&self, story: StoryId) -> usize {
        self.channels
            .get(&story)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Snapshot of counters
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            active_channels: self.channels.len(),
        }
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, story: StoryId, snapshot: Arc<StoryTree>) {
        self.published.fetch_add(1, Ordering::Relaxed);

        let sent = self
            .channels
            .get(&story)
            .and_then(|tx| tx.send(snapshot).ok());

        match sent {
            Some(count) => {
                self.delivered.fetch_add(count as u64, Ordering::Relaxed);
            }
            None => {
                // nobody listening; drop the channel unless someone subscribed meanwhile
                self.channels
                    .remove_if(&story, |_, tx| tx.receiver_count() == 0);
            }
        }
    }
}

/// Live view of one story
///
/// Starts at the tree committed when the subscription was opened and moves
/// forward one commit at a time.
#[derive(Debug)]
pub struct Subscription {
    tree: Arc<StoryTree>,
    rx: broadcast::Receiver<Arc<StoryTree>>,
}

impl Subscription {
    /// Open from a receiver and the tree read after subscribing
    #[must_use]
    pub fn new(tree: Arc<StoryTree>, rx: broadcast::Receiver<Arc<StoryTree>>) -> Self {
        Self { tree, rx }
    }

    /// Latest tree seen
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &Arc<StoryTree> {
        &self.tree
    }

    /// Latest view seen
    #[inline]
    #[must_use]
    pub fn current(&self) -> TreeView {
        TreeView::of(&self.tree)
    }

    /// Wait for the next committed view
    ///
    /// Returns `None` once the broadcaster is gone.
    pub async fn next(&mut self) -> Option<TreeView> {
        loop {
            match self.rx.recv().await {
                Ok(tree) => {
                    // already covered by the initial read
                    if tree.version <= self.tree.version {
                        continue;
                    }
                    self.tree = tree;
                    return Some(self.current());
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(story = %self.tree.story_id, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain already-delivered commits without waiting
    pub fn catch_up(&mut self) -> TreeView {
        loop {
            match self.rx.try_recv() {
                Ok(tree) if tree.version > self.tree.version => self.tree = tree,
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return self.current(),
            }
        }
    }

    /// Consume into a stream of views, starting with the current one
    pub fn into_stream(self) -> impl Stream<Item = TreeView> {
        let current = self.current();
        futures::stream::once(async move { current }).chain(futures::stream::unfold(
            self,
            |mut sub| async move { sub.next().await.map(|view| (view, sub)) },
        ))
    }
}
