//! Application-level heartbeat and link quality.
//!
//! While connected a `heartbeat` frame carrying the wall-clock send time goes
//! out every `heartbeat_interval`. The server echoes the timestamp in
//! `heartbeat:ack`; latency is measured on the monotonic clock from the send
//! instant. An ack that does not arrive within `heartbeat_timeout`, or before
//! the next heartbeat goes out, turns the latency back into "unknown".

use std::time::Duration;

use tokio::time::Instant;

use super::deadline_after;
use crate::models::ConnectionQuality;
use crate::timeouts::StoreLinkTimeouts;

#[derive(Debug, Clone, Copy)]
struct PendingPing {
    sent_at: Instant,
    timestamp_ms: u64,
    deadline: Option<Instant>,
}

#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    next_ping: Option<Instant>,
    pending: Option<PendingPing>,
    quality: ConnectionQuality,
}

impl HeartbeatMonitor {
    pub(crate) fn new(timeouts: &StoreLinkTimeouts) -> Self {
        Self {
            interval: timeouts.heartbeat_interval,
            timeout: timeouts.heartbeat_timeout,
            next_ping: None,
            pending: None,
            quality: ConnectionQuality::default(),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Begin the cycle for a fresh connection.
    pub(crate) fn start(&mut self) {
        self.pending = None;
        self.quality = ConnectionQuality::default();
        self.next_ping = self.is_enabled().then(|| deadline_after(Instant::now(), self.interval));
    }

    /// Stop the cycle. Quality becomes unknown.
    pub(crate) fn stop(&mut self) {
        self.next_ping = None;
        self.pending = None;
        self.quality.latency_ms = None;
    }

    pub(crate) fn next_ping_deadline(&self) -> Option<Instant> {
        self.next_ping
    }

    pub(crate) fn ack_deadline(&self) -> Option<Instant> {
        self.pending.and_then(|p| p.deadline)
    }

    pub(crate) fn quality(&self) -> ConnectionQuality {
        self.quality
    }

    /// Record a heartbeat that was just written.
    ///
    /// A heartbeat still outstanding at this point went unanswered for a whole
    /// interval, so the latency becomes unknown even if its ack deadline has
    /// not passed yet.
    pub(crate) fn on_ping_sent(&mut self, timestamp_ms: u64) -> ConnectionQuality {
        if self.pending.is_some() {
            self.quality.latency_ms = None;
        }

        let now = Instant::now();
        let deadline = (!StoreLinkTimeouts::is_no_timeout(self.timeout))
            .then(|| deadline_after(now, self.timeout));
        self.pending = Some(PendingPing {
            sent_at: now,
            timestamp_ms,
            deadline,
        });
        self.next_ping = Some(deadline_after(now, self.interval));
        self.quality.last_ping_at_ms = Some(timestamp_ms);
        self.quality
    }

    /// Handle `heartbeat:ack`. Returns the new quality when the ack matched
    /// the outstanding heartbeat; stale or unsolicited acks are ignored.
    pub(crate) fn on_ack(&mut self, echoed_timestamp: Option<u64>) -> Option<ConnectionQuality> {
        let pending = self.pending?;
        if echoed_timestamp.is_some_and(|ts| ts != pending.timestamp_ms) {
            return None;
        }

        self.pending = None;
        self.quality.latency_ms = Some(pending.sent_at.elapsed().as_millis() as u64);
        Some(self.quality)
    }

    /// The outstanding heartbeat was not acknowledged in time.
    pub(crate) fn on_timeout(&mut self) -> ConnectionQuality {
        self.pending = None;
        self.quality.latency_ms = None;
        self.quality
    }
}
