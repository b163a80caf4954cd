use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

/// Which tier an entry was admitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTier {
    Incomplete,
    Normal,
}

/// Two-tier dispatch queue of account ids awaiting a session slot.
///
/// `incomplete` holds accounts that crashed mid-quota; they are served
/// strictly before any `normal` entry, and pushes go to the *front* so the
/// most recently crashed account recovers first (last-in-first-served among
/// incompletes). An id lives in at most one tier at a time; duplicate pushes
/// are logged and dropped.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    inner: Mutex<Queues>,
}

#[derive(Debug, Default)]
struct Queues {
    incomplete: VecDeque<String>,
    normal: VecDeque<String>,
}

impl Queues {
    fn contains(&self, id: &str) -> bool {
        self.incomplete.iter().any(|e| e == id) || self.normal.iter().any(|e| e == id)
    }
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queues> {
        // Recover from poisoning; the queues stay structurally valid even if
        // a holder panicked mid-mutation.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a crashed account at the front of the incomplete tier.
    pub fn push_incomplete(&self, id: impl Into<String>) {
        let id = id.into();
        let mut q = self.lock();
        if q.contains(&id) {
            warn!(account = %id, "already queued, dropping duplicate incomplete push");
            return;
        }
        q.incomplete.push_front(id);
    }

    /// Re-admit an incomplete account at the back of its tier (used when a
    /// popped id turned out to still have a live session).
    pub fn requeue_incomplete(&self, id: impl Into<String>) {
        let id = id.into();
        let mut q = self.lock();
        if q.contains(&id) {
            warn!(account = %id, "already queued, dropping duplicate incomplete requeue");
            return;
        }
        q.incomplete.push_back(id);
    }

    /// Admit an account to the back of the normal rotation tier.
    pub fn push_normal(&self, id: impl Into<String>) {
        let id = id.into();
        let mut q = self.lock();
        if q.contains(&id) {
            warn!(account = %id, "already queued, dropping duplicate normal push");
            return;
        }
        q.normal.push_back(id);
    }

    /// Next id to dispatch: incomplete strictly before normal. This ordering
    /// holds for every pop regardless of push history.
    pub fn pop_next(&self) -> Option<(String, QueueTier)> {
        let mut q = self.lock();
        if let Some(id) = q.incomplete.pop_front() {
            return Some((id, QueueTier::Incomplete));
        }
        q.normal.pop_front().map(|id| (id, QueueTier::Normal))
    }

    /// Pop from the incomplete tier only (used while draining).
    pub fn pop_incomplete(&self) -> Option<String> {
        self.lock().incomplete.pop_front()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn incomplete_len(&self) -> usize {
        self.lock().incomplete.len()
    }

    pub fn normal_len(&self) -> usize {
        self.lock().normal.len()
    }

    pub fn is_empty(&self) -> bool {
        let q = self.lock();
        q.incomplete.is_empty() && q.normal.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_always_served_first() {
        let q = DispatchQueue::new();
        q.push_normal("a");
        q.push_normal("b");
        q.push_incomplete("c");
        assert_eq!(q.pop_next(), Some(("c".into(), QueueTier::Incomplete)));
        assert_eq!(q.pop_next(), Some(("a".into(), QueueTier::Normal)));
        // A crash arriving mid-drain still preempts remaining normals.
        q.push_incomplete("d");
        assert_eq!(q.pop_next(), Some(("d".into(), QueueTier::Incomplete)));
        assert_eq!(q.pop_next(), Some(("b".into(), QueueTier::Normal)));
        assert_eq!(q.pop_next(), None);
    }

    #[test]
    fn incomplete_is_last_in_first_served() {
        let q = DispatchQueue::new();
        q.push_incomplete("first-crash");
        q.push_incomplete("second-crash");
        assert_eq!(q.pop_next().unwrap().0, "second-crash");
        assert_eq!(q.pop_next().unwrap().0, "first-crash");
    }

    #[test]
    fn duplicate_pushes_are_dropped() {
        let q = DispatchQueue::new();
        q.push_normal("a");
        q.push_normal("a");
        q.push_incomplete("a");
        assert_eq!(q.normal_len(), 1);
        assert_eq!(q.incomplete_len(), 0);
        assert_eq!(q.pop_next().unwrap().0, "a");
        assert_eq!(q.pop_next(), None);
    }

    #[test]
    fn normal_is_fifo() {
        let q = DispatchQueue::new();
        q.push_normal("a");
        q.push_normal("b");
        q.push_normal("c");
        assert_eq!(q.pop_next().unwrap().0, "a");
        assert_eq!(q.pop_next().unwrap().0, "b");
        assert_eq!(q.pop_next().unwrap().0, "c");
    }

    #[test]
    fn requeue_incomplete_goes_to_back() {
        let q = DispatchQueue::new();
        q.push_incomplete("a");
        q.requeue_incomplete("b");
        assert_eq!(q.pop_next().unwrap().0, "a");
        assert_eq!(q.pop_next().unwrap().0, "b");
    }

    #[test]
    fn pop_incomplete_ignores_normal() {
        let q = DispatchQueue::new();
        q.push_normal("a");
        assert_eq!(q.pop_incomplete(), None);
        q.push_incomplete("b");
        assert_eq!(q.pop_incomplete(), Some("b".into()));
        assert_eq!(q.normal_len(), 1);
    }

    #[test]
    fn contains_spans_both_tiers() {
        let q = DispatchQueue::new();
        q.push_normal("a");
        q.push_incomplete("b");
        assert!(q.contains("a"));
        assert!(q.contains("b"));
        assert!(!q.contains("c"));
    }
}
