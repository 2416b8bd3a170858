//! In-memory track queue
//!
//! Plain ordered storage with front/back insertion and sequential or random
//! removal. Not internally synchronised: the player loop is the sole mutator,
//! and external readers go through the shared snapshot lock.

use crate::track::Track;
use rand::Rng;
use std::collections::VecDeque;

/// Ordered sequence of tracks pending playback
#[derive(Debug, Default)]
pub struct TrackQueue {
    entries: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append tracks preserving their order
    pub fn enqueue_back(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.entries.extend(tracks);
    }

    /// Make this track the next sequential dequeue
    pub fn enqueue_front(&mut self, track: Track) {
        self.entries.push_front(track);
    }

    /// Remove and return the next track.
    ///
    /// Sequential mode takes the front; shuffle mode removes a uniformly
    /// random element. Returns `None` on an empty queue.
    pub fn dequeue_next(&mut self, shuffle: bool) -> Option<Track> {
        if self.entries.is_empty() {
            return None;
        }
        if shuffle {
            let index = rand::thread_rng().gen_range(0..self.entries.len());
            self.entries.remove(index)
        } else {
            self.entries.pop_front()
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every entry with a matching uri, preserving survivor order.
    /// Returns how many entries were removed.
    pub fn remove_all_by_uri(&mut self, uri: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|track| track.uri != uri);
        before - self.entries.len()
    }

    /// Read-only copy of the pending tracks in dequeue order
    pub fn snapshot(&self) -> Vec<Track> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn track(uri: &str) -> Track {
        Track::local(uri, uri)
    }

    #[test]
    fn front_insertion_dequeues_first() {
        let mut queue = TrackQueue::new();
        queue.enqueue_back([track("a")]);
        queue.enqueue_front(track("b"));

        assert_eq!(queue.dequeue_next(false).unwrap().uri, "b");
        assert_eq!(queue.dequeue_next(false).unwrap().uri, "a");
        assert!(queue.dequeue_next(false).is_none());
    }

    #[test]
    fn back_insertion_preserves_order() {
        let mut queue = TrackQueue::new();
        queue.enqueue_back([track("a"), track("b"), track("c")]);

        let drained: Vec<String> = std::iter::from_fn(|| queue.dequeue_next(false))
            .map(|t| t.uri)
            .collect();
        assert_eq!(drained, ["a", "b", "c"]);
    }

    #[test]
    fn shuffle_drains_each_element_exactly_once() {
        let mut queue = TrackQueue::new();
        let uris = ["a", "b", "c", "d", "e"];
        queue.enqueue_back(uris.iter().map(|u| track(u)));

        let mut seen = HashSet::new();
        while let Some(t) = queue.dequeue_next(true) {
            assert!(seen.insert(t.uri), "duplicate dequeue");
        }
        assert_eq!(seen.len(), uris.len());
    }

    #[test]
    fn shuffle_reaches_every_first_position() {
        // With three elements and enough trials, every element must show up
        // as the first dequeue at least once.
        let mut firsts = HashSet::new();
        for _ in 0..200 {
            let mut queue = TrackQueue::new();
            queue.enqueue_back([track("a"), track("b"), track("c")]);
            firsts.insert(queue.dequeue_next(true).unwrap().uri);
            if firsts.len() == 3 {
                break;
            }
        }
        assert_eq!(firsts.len(), 3);
    }

    #[test]
    fn remove_all_by_uri_preserves_survivor_order() {
        let mut queue = TrackQueue::new();
        queue.enqueue_back([track("a"), track("x"), track("b"), track("x"), track("c")]);

        assert_eq!(queue.remove_all_by_uri("x"), 2);
        let snapshot: Vec<String> = queue.snapshot().into_iter().map(|t| t.uri).collect();
        assert_eq!(snapshot, ["a", "b", "c"]);
        assert_eq!(queue.remove_all_by_uri("x"), 0);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut queue = TrackQueue::new();
        queue.enqueue_back([track("a"), track("b")]);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }
}
