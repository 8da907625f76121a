//! Per-story write slots
//!
//! One async mutex per story. Tokio's mutex is fair, so writers on a story
//! enter in the order they started waiting. Different stories never contend.
//!
//! An entry lives only while someone holds or awaits it. Holders and waiters
//! are counted; the last one out removes the entry, including a waiter whose
//! future was dropped before it got the lock.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storyfork_core::StoryId;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots = Arc<DashMap<StoryId, Arc<Slot>>>;

#[derive(Debug, Default)]
struct Slot {
    lock: Arc<Mutex<()>>,
    users: AtomicUsize,
}

/// Registration of one holder or waiter on a story's slot
#[derive(Debug)]
struct Tenancy {
    slots: Slots,
    story: StoryId,
    slot: Arc<Slot>,
}

impl Drop for Tenancy {
    fn drop(&mut self) {
        if self.slot.users.fetch_sub(1, Ordering::AcqRel) == 1 {
            // entry() increments under the shard lock, so a new user either
            // bumped the count already or will create a fresh entry
            self.slots
                .remove_if(&self.story, |_, slot| slot.users.load(Ordering::Acquire) == 0);
        }
    }
}

/// Exclusive right to mutate one story
///
/// Dropping it releases the slot.
#[derive(Debug)]
pub struct StorySlot {
    story: StoryId,
    _guard: OwnedMutexGuard<()>,
    _tenancy: Tenancy,
}

impl StorySlot {
    /// Story this slot covers
    #[inline]
    #[must_use]
    pub fn story(&self) -> StoryId {
        self.story
    }
}

/// Table of story slots
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: Slots,
}

impl SlotTable {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self, story: StoryId) -> Tenancy {
        let entry = self.slots.entry(story).or_default();
        entry.users.fetch_add(1, Ordering::AcqRel);
        Tenancy {
            slots: Arc::clone(&self.slots),
            story,
            slot: Arc::clone(entry.value()),
        }
    }

    /// Wait for the story's slot
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the slot
    /// untouched and gives up this caller's place in the queue.
    pub async fn acquire(&self, story: StoryId) -> StorySlot {
        let tenancy = self.enter(story);
        let guard = Arc::clone(&tenancy.slot.lock).lock_owned().await;
        StorySlot {
            story,
            _guard: guard,
            _tenancy: tenancy,
        }
    }

    /// Take the slot only if nobody holds it
    #[must_use]
    pub fn try_acquire(&self, story: StoryId) -> Option<StorySlot> {
        let tenancy = self.enter(story);
        let guard = Arc::clone(&tenancy.slot.lock).try_lock_owned().ok()?;
        Some(StorySlot {
            story,
            _guard: guard,
            _tenancy: tenancy,
        })
    }

    /// Number of stories with a holder or waiter
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no story is held or awaited
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
