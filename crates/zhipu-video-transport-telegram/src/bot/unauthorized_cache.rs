//! Unauthorized access flood protection
//!
//! Users outside the allow-list get "Access denied" at most once per
//! cooldown, so the bot does not get rate limited answering spam.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cooldown cache for "Access denied" notices.
///
/// An entry lives exactly one cooldown; while it exists the user is not
/// notified again.
#[derive(Clone)]
pub struct UnauthorizedCache {
    notified: Cache<i64, ()>,
    cooldown: Duration,
    silenced_count: Arc<AtomicU64>,
}

impl UnauthorizedCache {
    /// Creates a cache with the given cooldown and capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use zhipu_video_transport_telegram::bot::UnauthorizedCache;
    ///
    /// let cache = UnauthorizedCache::new(1200, 10_000);
    /// assert_eq!(cache.cooldown().as_secs(), 1200);
    /// ```
    #[must_use]
    pub fn new(cooldown_secs: u64, max_capacity: u64) -> Self {
        let cooldown = Duration::from_secs(cooldown_secs);
        let notified = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(cooldown)
            .build();

        Self {
            notified,
            cooldown,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Claims the notice slot for `user_id`.
    ///
    /// Returns `true` for the first attempt in a cooldown window; the caller
    /// should then send the notice. Concurrent attempts get exactly one `true`.
    pub async fn try_claim(&self, user_id: i64) -> bool {
        let entry = self.notified.entry(user_id).or_insert(()).await;
        if entry.is_fresh() {
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        // Only every 100th silenced attempt is logged
        if count.is_multiple_of(100) {
            debug!(
                "⛔️ Silenced {} unauthorized attempts (recent: user {})",
                count, user_id
            );
        }
        false
    }

    /// Gives the slot back after the notice could not be delivered.
    pub async fn release(&self, user_id: i64) {
        self.notified.invalidate(&user_id).await;
    }

    /// Total number of silenced attempts
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }

    /// Configured cooldown
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
