//! Outbound message scheduler.
//!
//! Every outbound message is queued first and written to the transport in
//! batches: on a short flush timer while connected, or immediately once the
//! queue reaches the flush threshold. Higher priority goes first, arrival
//! order breaks ties. Messages whose write failed wait in a retry lane that is
//! drained before the priority heap.
//!
//! The scheduler is plain data owned by the connection supervisor task. It
//! never touches the transport itself.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use log::warn;
use serde_json::Value as JsonValue;
use tokio::time::Instant;

use crate::connection::deadline_after;
use crate::error::StoreLinkError;
use crate::models::{ClientMessage, ConnectionOptions, PendingMessage};

/// Priority used by topic control messages and by default sends.
pub const DEFAULT_PRIORITY: i32 = 0;

/// A queued outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub event: String,
    pub payload: JsonValue,
    pub priority: i32,
    /// Failed writes so far.
    pub attempts: u32,
    seq: u64,
}

impl OutboundMessage {
    /// Wire frame for this message.
    pub fn to_client_message(&self) -> ClientMessage {
        ClientMessage::new(self.event.clone(), self.payload.clone())
    }

    fn to_pending(&self) -> PendingMessage {
        PendingMessage {
            event: self.event.clone(),
            payload: self.payload.clone(),
            priority: self.priority,
            attempts: self.attempts,
        }
    }
}

/// Heap entry: higher priority first, then lower sequence number.
#[derive(Debug)]
struct Queued(OutboundMessage);

impl Queued {
    fn key(&self) -> (i32, Reverse<u64>) {
        (self.0.priority, Reverse(self.0.seq))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority queue with a retry lane in front of it.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    heap: BinaryHeap<Queued>,
    retry: VecDeque<OutboundMessage>,
    next_seq: u64,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: impl Into<String>, payload: JsonValue, priority: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued(OutboundMessage {
            event: event.into(),
            payload,
            priority,
            attempts: 0,
            seq,
        }));
    }

    /// Pop up to `max` messages in dispatch order.
    pub fn pop_batch(&mut self, max: usize) -> Vec<OutboundMessage> {
        let mut batch = Vec::with_capacity(max.min(self.len()));
        while batch.len() < max {
            let next = match self.retry.pop_front() {
                Some(msg) => msg,
                None => match self.heap.pop() {
                    Some(Queued(msg)) => msg,
                    None => break,
                },
            };
            batch.push(next);
        }
        batch
    }

    /// Put messages back at the very front, keeping their relative order.
    pub fn requeue_front(&mut self, messages: Vec<OutboundMessage>) {
        for msg in messages.into_iter().rev() {
            self.retry.push_front(msg);
        }
    }

    /// Queue contents in the order they would be dispatched.
    pub fn snapshot(&self) -> Vec<PendingMessage> {
        let mut queued: Vec<&Queued> = self.heap.iter().collect();
        queued.sort_by(|a, b| b.cmp(a));

        self.retry
            .iter()
            .chain(queued.into_iter().map(|q| &q.0))
            .map(OutboundMessage::to_pending)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len() + self.retry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty() && self.retry.is_empty()
    }
}

/// Batching policy plus the queue it applies to.
#[derive(Debug)]
pub struct OutboundScheduler {
    queue: OutboundQueue,
    batch_interval: Duration,
    batch_size: usize,
    flush_threshold: usize,
    max_dispatch_attempts: u32,
    flush_deadline: Option<Instant>,
}

impl OutboundScheduler {
    pub fn new(options: &ConnectionOptions) -> Self {
        Self {
            queue: OutboundQueue::new(),
            batch_interval: Duration::from_millis(options.batch_interval_ms),
            batch_size: options.batch_size.max(1),
            flush_threshold: options.flush_threshold.max(1),
            max_dispatch_attempts: options.max_dispatch_attempts.max(1),
            flush_deadline: None,
        }
    }

    /// Queue a message. Returns `true` when the queue reached the flush
    /// threshold and should be flushed right away.
    pub fn enqueue(&mut self, event: impl Into<String>, payload: JsonValue, priority: i32) -> bool {
        self.queue.push(event, payload, priority);
        self.queue.len() >= self.flush_threshold
    }

    /// Arm the flush timer unless it is already running.
    pub fn arm(&mut self) {
        if self.flush_deadline.is_none() {
            self.flush_deadline = Some(deadline_after(Instant::now(), self.batch_interval));
        }
    }

    pub fn disarm(&mut self) {
        self.flush_deadline = None;
    }

    pub fn flush_deadline(&self) -> Option<Instant> {
        self.flush_deadline
    }

    /// Take the next batch and clear the timer.
    pub fn take_batch(&mut self) -> Vec<OutboundMessage> {
        self.flush_deadline = None;
        self.queue.pop_batch(self.batch_size)
    }

    /// Handle a failed write of `failed`, with `rest` being the part of the
    /// batch that was never attempted.
    ///
    /// Everything goes back to the front of the queue, except `failed` once it
    /// has used up its dispatch attempts. The dropped message is returned.
    pub fn requeue_failed(
        &mut self,
        mut failed: OutboundMessage,
        mut rest: Vec<OutboundMessage>,
        reason: &str,
    ) -> Option<OutboundMessage> {
        failed.attempts += 1;

        let dropped = if failed.attempts >= self.max_dispatch_attempts {
            let err = StoreLinkError::DispatchError(format!(
                "dropping '{}' after {} failed attempt(s): {}",
                failed.event, failed.attempts, reason
            ));
            warn!("[store-link] {}", err);
            Some(failed)
        } else {
            rest.insert(0, failed);
            None
        };

        self.queue.requeue_front(rest);
        dropped
    }

    pub fn snapshot(&self) -> Vec<PendingMessage> {
        self.queue.snapshot()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
