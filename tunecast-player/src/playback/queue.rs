//! Playback queue
//!
//! Pending items of one context, consumed front to back. Order is FIFO
//! except for play-next insertion and loop re-insertion at the front.

use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// One pending item
///
/// Items are immutable once enqueued; loop re-insertion creates a copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub id: Uuid,
    /// Resolvable URL of the track
    pub source_reference: String,
    pub title: String,
    /// Queued on its own rather than as part of a collection
    pub is_single_track: bool,
    /// Skip the now-playing announcement when this item starts
    pub suppress_now_playing: bool,
}

impl QueueItem {
    pub fn new(source_reference: impl Into<String>, title: impl Into<String>, is_single_track: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_reference: source_reference.into(),
            title: title.into(),
            is_single_track,
            suppress_now_playing: false,
        }
    }

    /// Copy for loop re-insertion (new id, announcement suppressed)
    pub fn looped(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            suppress_now_playing: true,
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<QueueItem>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, item: QueueItem) {
        self.items.push_back(item);
    }

    /// Play-next
    pub fn enqueue_front(&mut self, item: QueueItem) {
        self.items.push_front(item);
    }

    /// Insert at `index`, clamped to the queue length
    pub fn insert(&mut self, index: usize, item: QueueItem) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    pub fn dequeue(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    /// Put the finished item back in front of everything still queued
    pub fn requeue_for_loop(&mut self, finished: &QueueItem) {
        self.items.push_front(finished.looped());
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    /// Drain, randomize, refill
    pub fn shuffle(&mut self) {
        let mut drained: Vec<QueueItem> = self.items.drain(..).collect();
        drained.shuffle(&mut rand::thread_rng());
        self.items.extend(drained);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the pending item with `id`
    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Up to `n` pending items, front first, without mutating the queue
    pub fn peek(&self, n: usize) -> Vec<QueueItem> {
        self.items.iter().take(n).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn item(name: &str) -> QueueItem {
        QueueItem::new(format!("https://example.org/{}", name), name, true)
    }

    fn titles(queue: &PlaybackQueue) -> Vec<String> {
        queue.peek(usize::MAX).into_iter().map(|i| i.title).collect()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PlaybackQueue::new();
        for name in ["A", "B", "C"] {
            queue.enqueue(item(name));
        }

        let out: Vec<_> = std::iter::from_fn(|| queue.dequeue()).map(|i| i.title).collect();
        assert_eq!(out, vec!["A", "B", "C"]);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_play_next_and_insert() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(item("A"));
        queue.enqueue(item("B"));
        queue.enqueue_front(item("N"));
        queue.insert(1, item("M"));
        queue.insert(99, item("Z"));

        assert_eq!(titles(&queue), vec!["N", "M", "A", "B", "Z"]);
    }

    #[test]
    fn test_position_tracks_dequeues() {
        let mut queue = PlaybackQueue::new();
        let a = item("A");
        let b = item("B");
        queue.enqueue(a.clone());
        queue.enqueue(b.clone());

        assert_eq!(queue.position(b.id), Some(1));
        queue.dequeue();
        assert_eq!(queue.position(b.id), Some(0));
        assert_eq!(queue.position(a.id), None);
    }

    #[test]
    fn test_loop_requeue_goes_first() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(item("Y"));
        queue.enqueue(item("Z"));

        let finished = item("X");
        queue.requeue_for_loop(&finished);

        assert_eq!(titles(&queue), vec!["X", "Y", "Z"]);
        let again = queue.dequeue().unwrap();
        assert!(again.suppress_now_playing);
        assert_ne!(again.id, finished.id);
    }

    #[test]
    fn test_shuffle_preserves_multiset() {
        let mut queue = PlaybackQueue::new();
        let originals: Vec<_> = (0..50).map(|i| item(&i.to_string())).collect();
        for i in &originals {
            queue.enqueue(i.clone());
        }

        queue.shuffle();

        let after: HashSet<Uuid> = queue.peek(100).iter().map(|i| i.id).collect();
        let before: HashSet<Uuid> = originals.iter().map(|i| i.id).collect();
        assert_eq!(queue.len(), 50);
        assert_eq!(after, before);
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(item("A"));
        queue.enqueue(item("B"));

        assert_eq!(queue.peek(1).len(), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
