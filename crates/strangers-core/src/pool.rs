//! FIFO waiting pool of connections looking for a partner.

use std::collections::VecDeque;

use crate::id::ConnectionId;

/// Ordered set of waiting connections. A connection appears at most once.
#[derive(Debug, Clone, Default)]
pub struct WaitingPool {
    queue: VecDeque<ConnectionId>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` unless it is already waiting. Returns whether it was added.
    pub fn enqueue(&mut self, id: ConnectionId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.queue.push_back(id);
        true
    }

    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        match self.queue.iter().position(|queued| queued == id) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.queue.iter().any(|queued| queued == id)
    }

    /// Drop every entry for which `keep` returns false. Returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&ConnectionId) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|id| keep(id));
        before - self.queue.len()
    }

    /// Take the oldest pair of waiting connections that `compatible` accepts.
    ///
    /// Candidates are scanned oldest-first, so with no restrictions this is
    /// simply the two front entries.
    pub fn take_pair(
        &mut self,
        compatible: impl Fn(&ConnectionId, &ConnectionId) -> bool,
    ) -> Option<(ConnectionId, ConnectionId)> {
        let len = self.queue.len();
        for i in 0..len {
            for j in (i + 1)..len {
                if compatible(&self.queue[i], &self.queue[j]) {
                    // Remove the later index first so `i` stays valid.
                    let second = self.queue.remove(j)?;
                    let first = self.queue.remove(i)?;
                    return Some((first, second));
                }
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionId> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_of(ids: &[&str]) -> WaitingPool {
        let mut pool = WaitingPool::new();
        for id in ids {
            pool.enqueue(ConnectionId::from(*id));
        }
        pool
    }

    #[test]
    fn enqueue_never_duplicates() {
        let mut pool = WaitingPool::new();
        for id in ["a", "b", "a", "c", "b", "a"] {
            pool.enqueue(id.into());
        }
        let ids: Vec<&str> = pool.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn take_pair_is_fifo() {
        let mut pool = pool_of(&["a", "b", "c", "d"]);
        let pair = pool.take_pair(|a, b| a != b).unwrap();
        assert_eq!(pair, ("a".into(), "b".into()));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn take_pair_skips_incompatible_candidates() {
        let mut pool = pool_of(&["a", "b", "c"]);
        let forbidden = (ConnectionId::from("a"), ConnectionId::from("b"));
        let pair = pool
            .take_pair(|x, y| !((x, y) == (&forbidden.0, &forbidden.1)))
            .unwrap();
        assert_eq!(pair, ("a".into(), "c".into()));
        assert_eq!(pool.iter().collect::<Vec<_>>(), [&ConnectionId::from("b")]);
    }

    #[test]
    fn take_pair_needs_two_entries() {
        let mut pool = pool_of(&["a"]);
        assert!(pool.take_pair(|a, b| a != b).is_none());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn remove_and_retain() {
        let mut pool = pool_of(&["a", "b", "c"]);
        assert!(pool.remove(&"b".into()));
        assert!(!pool.remove(&"b".into()));
        assert_eq!(pool.retain(|id| id.as_str() != "c"), 1);
        assert!(pool.contains(&"a".into()));
        assert_eq!(pool.len(), 1);
    }
}
