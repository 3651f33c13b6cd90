//! Admission queue for downloads waiting for a free slot.

use std::collections::VecDeque;

use super::job::DownloadPriority;
use crate::infrastructure::config::ExecutionOrder;

/// Queued resource ids, one lane per priority.
///
/// Higher lanes always drain first. Within a lane, FIFO appends to the back
/// and LIFO to the front; `pop` always takes the front.
#[derive(Debug, Default)]
pub struct JobQueue {
    high: VecDeque<String>,
    normal: VecDeque<String>,
    low: VecDeque<String>,
}

impl JobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lane_mut(&mut self, priority: DownloadPriority) -> &mut VecDeque<String> {
        match priority {
            DownloadPriority::High => &mut self.high,
            DownloadPriority::Normal => &mut self.normal,
            DownloadPriority::Low => &mut self.low,
        }
    }

    /// Enqueues `id`.
    pub fn push(&mut self, id: String, priority: DownloadPriority, order: ExecutionOrder) {
        let lane = self.lane_mut(priority);
        match order {
            ExecutionOrder::Fifo => lane.push_back(id),
            ExecutionOrder::Lifo => lane.push_front(id),
        }
    }

    /// Takes the next id to start.
    pub fn pop(&mut self) -> Option<String> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    /// Removes `id` from the given lane. Returns true if it was queued.
    pub fn remove(&mut self, id: &str, priority: DownloadPriority) -> bool {
        let lane = self.lane_mut(priority);
        if let Some(pos) = lane.iter().position(|queued| queued == id) {
            lane.remove(pos);
            true
        } else {
            false
        }
    }

    /// Moves `id` from lane `from` to lane `to`.
    pub fn promote(
        &mut self,
        id: &str,
        from: DownloadPriority,
        to: DownloadPriority,
        order: ExecutionOrder,
    ) {
        if self.remove(id, from) {
            self.push(id.to_string(), to, order);
        }
    }

    /// Number of queued ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued id.
    pub fn clear(&mut self) {
        self.high.clear();
        self.normal.clear();
        self.low.clear();
    }
}
