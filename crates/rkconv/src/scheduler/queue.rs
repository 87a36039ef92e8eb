use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    priority: i32,
    seq: u64,
    job_id: String,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence number.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending job ids ordered by priority, then arrival.
///
/// Cancelled jobs are not removed eagerly; the dispatcher skips ids whose
/// job is no longer pending.
#[derive(Debug, Default)]
pub struct JobQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job and returns its arrival sequence number.
    pub fn push(&mut self, job_id: &str, priority: i32) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            priority,
            seq,
            job_id: job_id.to_string(),
        });
        seq
    }

    pub fn pop(&mut self) -> Option<String> {
        self.heap.pop().map(|entry| entry.job_id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut JobQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = JobQueue::new();
        queue.push("low", 1);
        queue.push("high", 5);
        queue.push("mid", 3);

        assert_eq!(drain(&mut queue), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = JobQueue::new();
        for id in ["a", "b", "c", "d"] {
            queue.push(id, 0);
        }
        queue.push("urgent", 1);

        assert_eq!(drain(&mut queue), vec!["urgent", "a", "b", "c", "d"]);
    }

    #[test]
    fn test_negative_priorities_run_last() {
        let mut queue = JobQueue::new();
        queue.push("background", -10);
        queue.push("normal", 0);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().as_deref(), Some("normal"));
        queue.clear();
        assert!(queue.is_empty());
    }
}
