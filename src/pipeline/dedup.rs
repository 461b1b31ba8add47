//! Time-bounded set of recently processed entry ids.
//!
//! Advisory only: collapses duplicate submissions from overlapping batch
//! runs within one TTL window. Nothing survives a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::feed::types::EntryId;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct Inner {
    inserted: HashMap<EntryId, Instant>,
    /// Insertion order, oldest first. May hold ids already evicted by TTL.
    order: VecDeque<(EntryId, Instant)>,
}

impl Inner {
    fn evict_expired(&mut self, now: Instant, ttl: Duration) {
        while let Some(&(id, at)) = self.order.front() {
            if now.duration_since(at) < ttl {
                break;
            }
            self.order.pop_front();
            if self.inserted.get(&id) == Some(&at) {
                self.inserted.remove(&id);
            }
        }
    }

    fn evict_oldest(&mut self) {
        while let Some((id, at)) = self.order.pop_front() {
            if self.inserted.get(&id) == Some(&at) {
                self.inserted.remove(&id);
                return;
            }
        }
    }
}

/// Fixed-TTL, fixed-capacity seen-set shared by all workers.
#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl DedupCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Whether `id` was seen within the TTL. Marks it as seen if not.
    pub fn seen(&self, id: EntryId) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.evict_expired(now, self.ttl);

        if inner.inserted.contains_key(&id) {
            return true;
        }
        while inner.inserted.len() >= self.capacity {
            inner.evict_oldest();
        }
        inner.inserted.insert(id, now);
        inner.order.push_back((id, now));
        false
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .inserted
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
