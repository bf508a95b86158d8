//! Ordered listener lists
//!
//! Each observable event kind owns one append-ordered list of callbacks.
//! Registration hands back a handle; removal goes through the handle, so
//! duplicate (callback, data) registrations are fine and each fires on
//! its own.

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl ListenerHandle {
    fn next() -> Self {
        ListenerHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Append-ordered list of callbacks for one event kind.
pub struct ListenerList<C> {
    entries: Vec<(ListenerHandle, C)>,
}

impl<C> Default for ListenerList<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C> ListenerList<C> {
    /// Append a callback; fires for every subsequent matching event until
    /// removed.
    pub fn add(&mut self, callback: C) -> ListenerHandle {
        let handle = ListenerHandle::next();
        self.entries.push((handle, callback));
        handle
    }

    /// Remove by handle. Returns false when the handle is not in this list.
    pub fn remove(&mut self, handle: ListenerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(h, _)| *h != handle);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Clone> ListenerList<C> {
    /// Snapshot of the callbacks in registration order.
    ///
    /// Firing happens against a snapshot so a callback may mutate the
    /// session (including re-registering or disconnecting) without
    /// invalidating the iteration.
    pub fn snapshot(&self) -> Vec<C> {
        self.entries.iter().map(|(_, c)| c.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_and_duplicates() {
        let mut list: ListenerList<u32> = ListenerList::default();
        list.add(1);
        list.add(2);
        list.add(1);
        let fired: Vec<u32> = list.snapshot();
        assert_eq!(fired, vec![1, 2, 1]);
    }

    #[test]
    fn test_remove_by_handle() {
        let mut list: ListenerList<u32> = ListenerList::default();
        let a = list.add(1);
        let b = list.add(2);
        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert_eq!(list.snapshot(), vec![2]);
        assert!(list.remove(b));
        assert!(list.is_empty());
    }
}
