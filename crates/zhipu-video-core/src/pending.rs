//! Pending image requests
//!
//! Tracks the short-lived "send me a picture" invitation issued by the
//! image-to-video command. Each invitation carries its own ticket, deadline
//! and cancellation token, so a timer can only ever expire the request it was
//! started for. Whichever of expiry and consumption takes the write lock first
//! removes the entry; the other path sees it gone and does nothing.
//!
//! Transport-agnostic: generic over the user id type.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// Keeps `Instant + window` far from overflow for any window a caller passes
const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Identity of one invitation, returned by [`PendingImageRequests::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTicket {
    serial: u64,
    deadline: Instant,
}

impl PendingTicket {
    /// Instant at which this invitation expires.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Result of [`PendingImageRequests::try_consume`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// No invitation was outstanding for this user
    NotPending,
    /// The invitation was claimed; the caller owns the image that came with it
    Consumed(PendingTicket),
}

/// Result of [`PendingImageRequests::await_timeout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// The window elapsed and this timer removed the invitation
    Expired,
    /// The invitation was consumed, superseded or cleared before expiry
    Resolved,
}

struct PendingRequest {
    ticket: PendingTicket,
    created_at: Instant,
    cancel: CancellationToken,
}

/// Keyed store of outstanding image invitations, at most one per user.
pub struct PendingImageRequests<Id: Hash + Eq + Clone + Send + Sync + Debug + 'static> {
    requests: RwLock<HashMap<Id, PendingRequest>>,
    next_serial: AtomicU64,
}

impl<Id: Hash + Eq + Clone + Send + Sync + Debug + 'static> Default for PendingImageRequests<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Hash + Eq + Clone + Send + Sync + Debug + 'static> PendingImageRequests<Id> {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Open an invitation for `id` lasting `window`.
    ///
    /// An invitation already outstanding for the same user is replaced and its
    /// timer cancelled.
    pub async fn begin(&self, id: Id, window: Duration) -> PendingTicket {
        let now = Instant::now();
        let ticket = PendingTicket {
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
            deadline: now + window.min(MAX_WINDOW),
        };
        let request = PendingRequest {
            ticket,
            created_at: now,
            cancel: CancellationToken::new(),
        };

        let previous = {
            let mut requests = self.requests.write().await;
            requests.insert(id.clone(), request)
        };

        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(user = ?id, "Superseded pending image request");
        }
        debug!(user = ?id, window_secs = window.as_secs(), "Pending image request opened");
        ticket
    }

    /// Wait until the invitation behind `ticket` expires, then remove it if it
    /// is still outstanding.
    ///
    /// Returns early with [`TimeoutOutcome::Resolved`] as soon as the
    /// invitation is consumed, superseded or cleared.
    pub async fn await_timeout(&self, id: &Id, ticket: PendingTicket) -> TimeoutOutcome {
        let cancel = {
            let requests = self.requests.read().await;
            match requests.get(id) {
                Some(request) if request.ticket == ticket => request.cancel.clone(),
                _ => return TimeoutOutcome::Resolved,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => return TimeoutOutcome::Resolved,
            () = tokio::time::sleep_until(ticket.deadline) => {}
        }

        let mut requests = self.requests.write().await;
        match requests.get(id) {
            Some(request) if request.ticket == ticket => {
                let waited = request.created_at.elapsed();
                requests.remove(id);
                debug!(user = ?id, waited_secs = waited.as_secs(), "Pending image request expired");
                TimeoutOutcome::Expired
            }
            _ => TimeoutOutcome::Resolved,
        }
    }

    /// Claim the invitation for `id`, if any.
    pub async fn try_consume(&self, id: &Id) -> ConsumeOutcome {
        let removed = {
            let mut requests = self.requests.write().await;
            requests.remove(id)
        };

        match removed {
            Some(request) => {
                request.cancel.cancel();
                debug!(user = ?id, "Pending image request consumed");
                ConsumeOutcome::Consumed(request.ticket)
            }
            None => ConsumeOutcome::NotPending,
        }
    }

    /// Withdraw the invitation behind `ticket`.
    ///
    /// A newer invitation for the same user is left alone. Returns whether
    /// anything was removed.
    pub async fn cancel(&self, id: &Id, ticket: PendingTicket) -> bool {
        let removed = {
            let mut requests = self.requests.write().await;
            match requests.get(id) {
                Some(request) if request.ticket == ticket => requests.remove(id),
                _ => None,
            }
        };

        match removed {
            Some(request) => {
                request.cancel.cancel();
                debug!(user = ?id, "Pending image request withdrawn");
                true
            }
            None => false,
        }
    }

    /// Check whether `id` has an outstanding invitation
    pub async fn is_pending(&self, id: &Id) -> bool {
        self.requests.read().await.contains_key(id)
    }

    /// Number of outstanding invitations
    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Check whether no invitation is outstanding
    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }

    /// Drop every invitation and cancel their timers.
    pub async fn clear(&self) {
        let drained: Vec<PendingRequest> = {
            let mut requests = self.requests.write().await;
            requests.drain().map(|(_, request)| request).collect()
        };
        for request in &drained {
            request.cancel.cancel();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "Cleared pending image requests");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_not_pending_without_begin() {
        let tracker = PendingImageRequests::<i64>::new();
        assert_eq!(tracker.try_consume(&1).await, ConsumeOutcome::NotPending);
        assert!(!tracker.is_pending(&1).await);
    }

    #[tokio::test]
    async fn test_consume_once() {
        let tracker = PendingImageRequests::new();
        let ticket = tracker.begin(7_i64, WINDOW).await;

        assert_eq!(tracker.try_consume(&7).await, ConsumeOutcome::Consumed(ticket));
        assert_eq!(tracker.try_consume(&7).await, ConsumeOutcome::NotPending);
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let tracker = PendingImageRequests::new();
        tracker.begin(1_i64, WINDOW).await;

        assert_eq!(tracker.try_consume(&2).await, ConsumeOutcome::NotPending);
        assert!(tracker.is_pending(&1).await);
    }

    #[tokio::test]
    async fn test_cancel_ignores_newer_invitation() {
        let tracker = PendingImageRequests::new();
        let first = tracker.begin(1_i64, WINDOW).await;
        let second = tracker.begin(1_i64, WINDOW).await;

        assert!(!tracker.cancel(&1, first).await);
        assert!(tracker.is_pending(&1).await);

        assert!(tracker.cancel(&1, second).await);
        assert!(!tracker.is_pending(&1).await);
        assert!(!tracker.cancel(&1, second).await);
    }

    #[tokio::test]
    async fn test_huge_window_does_not_overflow() {
        let tracker = PendingImageRequests::new();
        let ticket = tracker.begin(1_i64, Duration::MAX).await;

        assert!(ticket.deadline() > Instant::now());
        assert_eq!(tracker.try_consume(&1).await, ConsumeOutcome::Consumed(ticket));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires_unclaimed_request() {
        let tracker = Arc::new(PendingImageRequests::new());
        let ticket = tracker.begin(1_i64, WINDOW).await;

        let timer = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.await_timeout(&1, ticket).await })
        };

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!tracker.is_pending(&1).await);
        assert_eq!(timer.await.ok(), Some(TimeoutOutcome::Expired));
        assert_eq!(tracker.try_consume(&1).await, ConsumeOutcome::NotPending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_before_deadline_silences_timer() {
        let tracker = Arc::new(PendingImageRequests::new());
        let ticket = tracker.begin(1_i64, WINDOW).await;
        let started = Instant::now();

        let timer = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.await_timeout(&1, ticket).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(tracker.try_consume(&1).await, ConsumeOutcome::Consumed(ticket));

        assert_eq!(timer.await.ok(), Some(TimeoutOutcome::Resolved));
        // The cancelled timer returns without waiting out the window
        assert!(started.elapsed() < WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_begin_supersedes_first() {
        let tracker = Arc::new(PendingImageRequests::new());
        let first = tracker.begin(1_i64, WINDOW).await;

        let first_timer = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.await_timeout(&1, first).await })
        };

        tokio::time::sleep(Duration::from_secs(20)).await;
        let second = tracker.begin(1_i64, WINDOW).await;
        assert_ne!(first, second);
        assert_eq!(tracker.len().await, 1);

        // The first timer must not clear the second invitation
        assert_eq!(first_timer.await.ok(), Some(TimeoutOutcome::Resolved));
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(tracker.is_pending(&1).await);

        assert_eq!(tracker.await_timeout(&1, second).await, TimeoutOutcome::Expired);
        assert!(!tracker.is_pending(&1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ticket_is_resolved_immediately() {
        let tracker = PendingImageRequests::new();
        let first = tracker.begin(1_i64, WINDOW).await;
        tracker.begin(1_i64, WINDOW).await;

        let started = Instant::now();
        assert_eq!(tracker.await_timeout(&1, first).await, TimeoutOutcome::Resolved);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_at_deadline_has_one_winner() {
        let tracker = Arc::new(PendingImageRequests::new());
        let ticket = tracker.begin(1_i64, WINDOW).await;

        let timer = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.await_timeout(&1, ticket).await })
        };

        tokio::time::sleep(WINDOW).await;
        let consumed = tracker.try_consume(&1).await;
        let timed_out = timer.await.ok();

        let consume_won = matches!(consumed, ConsumeOutcome::Consumed(_));
        let timer_won = timed_out == Some(TimeoutOutcome::Expired);
        assert!(consume_won != timer_won);
        assert!(tracker.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_timers() {
        let tracker = Arc::new(PendingImageRequests::new());
        let ticket = tracker.begin(1_i64, WINDOW).await;
        tracker.begin(2_i64, WINDOW).await;

        let timer = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.await_timeout(&1, ticket).await })
        };
        tokio::task::yield_now().await;

        tracker.clear().await;
        assert!(tracker.is_empty().await);
        assert_eq!(timer.await.ok(), Some(TimeoutOutcome::Resolved));
    }
}
