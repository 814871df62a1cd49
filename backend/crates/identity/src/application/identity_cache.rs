//! Identity Cache
//!
//! Bounded least-recently-used map from lookup id to resolved user. Entries
//! are never a source of truth; a miss only costs a store round trip.
//!
//! One mutex guards the index and the recency list together, so concurrent
//! `get`/`put` calls never see a half-updated list or evict twice. Every
//! operation is O(1): a hash index into a slab of doubly-linked slots.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::entity::user::User;
use crate::domain::value_object::lookup_id::LookupId;

const NIL: usize = usize::MAX;

struct Slot {
    key: LookupId,
    user: User,
    prev: usize,
    next: usize,
}

struct Lru {
    capacity: usize,
    index: HashMap<LookupId, usize>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    /// Most recently used
    head: usize,
    /// Least recently used
    tail: usize,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    fn slot(&self, i: usize) -> &Slot {
        match self.slots.get(i).and_then(Option::as_ref) {
            Some(slot) => slot,
            None => unreachable!("index points at a vacant slot"),
        }
    }

    fn slot_mut(&mut self, i: usize) -> &mut Slot {
        match self.slots.get_mut(i).and_then(Option::as_mut) {
            Some(slot) => slot,
            None => unreachable!("index points at a vacant slot"),
        }
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = {
            let s = self.slot(i);
            (s.prev, s.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.slot_mut(prev).next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slot_mut(next).prev = prev;
        }
    }

    fn push_front(&mut self, i: usize) {
        let old_head = self.head;
        {
            let s = self.slot_mut(i);
            s.prev = NIL;
            s.next = old_head;
        }
        if old_head != NIL {
            self.slot_mut(old_head).prev = i;
        }
        self.head = i;
        if self.tail == NIL {
            self.tail = i;
        }
    }

    fn get(&mut self, key: &LookupId) -> Option<User> {
        let i = *self.index.get(key)?;
        if self.head != i {
            self.unlink(i);
            self.push_front(i);
        }
        Some(self.slot(i).user.clone())
    }

    /// Returns the evicted key, if any
    fn put(&mut self, key: LookupId, user: User) -> Option<LookupId> {
        if let Some(&i) = self.index.get(&key) {
            self.slot_mut(i).user = user;
            if self.head != i {
                self.unlink(i);
                self.push_front(i);
            }
            return None;
        }

        let mut evicted = None;
        if self.index.len() >= self.capacity && self.tail != NIL {
            let lru = self.tail;
            self.unlink(lru);
            if let Some(old) = self.slots[lru].take() {
                self.index.remove(&old.key);
                evicted = Some(old.key);
            }
            self.free.push(lru);
        }

        let slot = Slot {
            key: key.clone(),
            user,
            prev: NIL,
            next: NIL,
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                i
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, i);
        self.push_front(i);
        evicted
    }

    fn remove(&mut self, key: &LookupId) -> bool {
        let Some(i) = self.index.remove(key) else {
            return false;
        };
        self.unlink(i);
        self.slots[i] = None;
        self.free.push(i);
        true
    }
}

pub struct IdentityCache {
    inner: Mutex<Lru>,
}

impl IdentityCache {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Lru::new(capacity.max(1))),
        }
    }

    // A panic while holding the lock cannot leave the list inconsistent for
    // readers that only clone values out, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Lru> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hit promotes the entry to most recently used.
    pub fn get(&self, lookup_id: &LookupId) -> Option<User> {
        self.lock().get(lookup_id)
    }

    /// Insert or overwrite. Returns the lookup id evicted to make room.
    pub fn put(&self, lookup_id: LookupId, user: User) -> Option<LookupId> {
        let evicted = self.lock().put(lookup_id, user);
        if let Some(key) = &evicted {
            tracing::debug!(lookup_id = %key, "Identity cache eviction");
        }
        evicted
    }

    /// Drop an entry after its store record changed
    pub fn invalidate(&self, lookup_id: &LookupId) -> bool {
        self.lock().remove(lookup_id)
    }

    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}
