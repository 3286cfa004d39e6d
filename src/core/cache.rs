//! Last-known-rates cache with retry backoff bookkeeping.
//!
//! The cache keeps one "latest" entry and a short history. It never talks to
//! the network and never classifies errors: the service records outcomes and
//! asks whether a new upstream call is allowed yet. All timing is driven by
//! the `now` argument so backoff is deterministic under test.

use crate::core::snapshot::RateSnapshot;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// Timing and retention knobs for [`RateCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a successful fetch is trusted before the next poll refreshes.
    pub ttl: Duration,
    /// Wait after the first consecutive failure; doubles per further failure.
    pub retry_base: Duration,
    /// Upper bound on any failure wait.
    pub retry_ceiling: Duration,
    pub history_limit: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
            retry_base: Duration::seconds(5),
            retry_ceiling: Duration::minutes(5),
            history_limit: 10,
        }
    }
}

impl CachePolicy {
    /// `min(retry_base * 2^(failed_attempts - 1), retry_ceiling)`.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(32);
        let ceiling_ms = self.retry_ceiling.num_milliseconds();
        let wait_ms = self
            .retry_base
            .num_milliseconds()
            .saturating_mul(1_i64 << exponent);
        Duration::milliseconds(wait_ms.min(ceiling_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchOutcome {
    Ok,
    Error,
}

/// One retained fetch outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub snapshot: RateSnapshot,
    pub fetched_at: DateTime<Utc>,
    pub failed_attempts: u32,
    pub next_eligible_at: DateTime<Utc>,
    pub outcome: FetchOutcome,
    pub last_status_code: Option<u16>,
}

/// Read-only view of the cache for logging and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct CacheDiagnostics {
    pub latest: Option<CacheEntry>,
    /// Most recent first.
    pub history: Vec<CacheEntry>,
}

#[derive(Debug, Default)]
pub struct RateCache {
    policy: CachePolicy,
    latest: Option<CacheEntry>,
    history: VecDeque<CacheEntry>,
}

impl RateCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            latest: None,
            history: VecDeque::with_capacity(policy.history_limit),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn latest(&self) -> Option<&CacheEntry> {
        self.latest.as_ref()
    }

    /// True when nothing is cached yet or the latest entry's wait has elapsed.
    pub fn should_fetch(&self, now: DateTime<Utc>) -> bool {
        match &self.latest {
            None => true,
            Some(entry) => now >= entry.next_eligible_at,
        }
    }

    pub fn record_success(&mut self, snapshot: RateSnapshot, now: DateTime<Utc>) {
        let entry = CacheEntry {
            snapshot: snapshot.with_stale(false),
            fetched_at: now,
            failed_attempts: 0,
            next_eligible_at: now + self.policy.ttl,
            outcome: FetchOutcome::Ok,
            last_status_code: None,
        };
        debug!(next_eligible_at = %entry.next_eligible_at, "Cache refreshed");
        self.push(entry);
    }

    /// Records a failed refresh and schedules the next attempt.
    ///
    /// Returns the previously cached values marked stale, or `None` when no
    /// fetch has ever been recorded and there is nothing to fall back to.
    pub fn record_failure(
        &mut self,
        status_code: Option<u16>,
        now: DateTime<Utc>,
    ) -> Option<RateSnapshot> {
        let Some(previous) = self.latest.as_ref() else {
            let entry = CacheEntry {
                snapshot: RateSnapshot::placeholder(now),
                fetched_at: now,
                failed_attempts: 1,
                next_eligible_at: now + self.policy.backoff(1),
                outcome: FetchOutcome::Error,
                last_status_code: status_code,
            };
            debug!(?status_code, next_eligible_at = %entry.next_eligible_at, "First fetch failed with nothing cached");
            self.push(entry);
            return None;
        };

        let failed_attempts = previous.failed_attempts.saturating_add(1);
        let wait = self.policy.backoff(failed_attempts);
        let entry = CacheEntry {
            snapshot: previous.snapshot.clone().with_stale(true),
            fetched_at: now,
            failed_attempts,
            next_eligible_at: now + wait,
            outcome: FetchOutcome::Error,
            last_status_code: status_code,
        };
        debug!(
            ?status_code,
            failed_attempts,
            wait_ms = wait.num_milliseconds(),
            "Fetch failed, backing off"
        );
        let fallback = entry.snapshot.clone();
        self.push(entry);
        Some(fallback)
    }

    /// The latest snapshot, stale if `force_stale` or if it already was.
    pub fn snapshot(&self, force_stale: bool) -> Option<RateSnapshot> {
        self.latest.as_ref().map(|entry| {
            let stale = force_stale || entry.snapshot.stale;
            entry.snapshot.clone().with_stale(stale)
        })
    }

    pub fn diagnostics(&self) -> CacheDiagnostics {
        CacheDiagnostics {
            latest: self.latest.clone(),
            history: self.history.iter().cloned().collect(),
        }
    }

    fn push(&mut self, entry: CacheEntry) {
        self.history.push_front(entry.clone());
        self.history.truncate(self.policy.history_limit);
        self.latest = Some(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::RateQuotes;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    fn snapshot_at(usd: f64, at: DateTime<Utc>) -> RateSnapshot {
        RateSnapshot::fresh(RateQuotes::new(usd, 65_000.0, 60_500.0), at)
    }

    fn wait_of(cache: &RateCache) -> Duration {
        let latest = cache.latest().unwrap();
        latest.next_eligible_at - latest.fetched_at
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = CachePolicy::default();
        assert_eq!(policy.backoff(1), secs(5));
        assert_eq!(policy.backoff(2), secs(10));
        assert_eq!(policy.backoff(3), secs(20));
        assert_eq!(policy.backoff(6), secs(160));
        assert_eq!(policy.backoff(7), secs(300));
        assert_eq!(policy.backoff(200), secs(300));
        assert_eq!(policy.backoff(u32::MAX), secs(300));
    }

    #[test]
    fn test_empty_cache_wants_a_fetch() {
        let cache = RateCache::default();
        assert!(cache.should_fetch(t0()));
        assert!(cache.snapshot(false).is_none());
        assert!(cache.snapshot(true).is_none());
    }

    #[test]
    fn test_first_failure_without_fallback() {
        let mut cache = RateCache::default();

        assert!(cache.record_failure(Some(503), t0()).is_none());
        assert!(!cache.should_fetch(t0() + Duration::milliseconds(4_999)));
        assert!(cache.should_fetch(t0() + Duration::milliseconds(5_000)));

        let latest = cache.latest().unwrap();
        assert_eq!(latest.failed_attempts, 1);
        assert_eq!(latest.outcome, FetchOutcome::Error);
        assert_eq!(latest.last_status_code, Some(503));
        assert!(latest.snapshot.stale);
        assert_eq!(latest.snapshot.usd_to_base, 0.0);
    }

    #[test]
    fn test_failure_after_success_serves_stale_values() {
        let mut cache = RateCache::default();
        cache.record_success(snapshot_at(60_000.0, t0()), t0());

        let fallback = cache.record_failure(Some(429), t0() + secs(10)).unwrap();
        assert_eq!(fallback.usd_to_base, 60_000.0);
        assert!(fallback.stale);
        assert_eq!(cache.latest().unwrap().next_eligible_at, t0() + secs(15));

        // second consecutive failure doubles the wait
        let fallback = cache.record_failure(Some(429), t0() + secs(20)).unwrap();
        assert_eq!(fallback.usd_to_base, 60_000.0);
        assert_eq!(cache.latest().unwrap().next_eligible_at, t0() + secs(30));
        assert_eq!(cache.latest().unwrap().failed_attempts, 2);
    }

    #[test]
    fn test_stale_fallback_preserves_every_value() {
        let mut cache = RateCache::default();
        let original = snapshot_at(60_000.0, t0());
        cache.record_success(original.clone(), t0());

        let fallback = cache.record_failure(None, t0() + secs(1)).unwrap();
        assert_eq!(fallback, original.clone().with_stale(true));

        let fallback = cache.record_failure(None, t0() + secs(60)).unwrap();
        assert_eq!(fallback, original.with_stale(true));
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let mut cache = RateCache::default();
        cache.record_success(snapshot_at(60_000.0, t0()), t0());

        let mut now = t0() + cache.policy().ttl;
        let mut previous_wait = Duration::zero();
        for attempt in 1..=12u32 {
            cache.record_failure(Some(503), now);
            let wait = wait_of(&cache);
            assert!(wait >= previous_wait);
            assert!(wait <= Duration::minutes(5));
            assert_eq!(wait, cache.policy().backoff(attempt));
            previous_wait = wait;
            now = cache.latest().unwrap().next_eligible_at;
        }
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut cache = RateCache::default();
        cache.record_success(snapshot_at(60_000.0, t0()), t0());
        for i in 0..4 {
            cache.record_failure(Some(503), t0() + secs(i));
        }
        assert_eq!(cache.latest().unwrap().failed_attempts, 4);

        cache.record_success(snapshot_at(61_000.0, t0() + secs(100)), t0() + secs(100));
        let latest = cache.latest().unwrap();
        assert_eq!(latest.failed_attempts, 0);
        assert_eq!(latest.outcome, FetchOutcome::Ok);
        assert_eq!(latest.next_eligible_at, t0() + secs(100) + Duration::hours(24));
        assert!(!latest.snapshot.stale);

        cache.record_failure(Some(503), t0() + secs(200));
        assert_eq!(wait_of(&cache), secs(5));
    }

    #[test]
    fn test_success_clears_stale_flag_on_input() {
        let mut cache = RateCache::default();
        cache.record_success(snapshot_at(60_000.0, t0()).with_stale(true), t0());
        assert!(!cache.snapshot(false).unwrap().stale);
    }

    #[test]
    fn test_should_fetch_gating() {
        let mut cache = RateCache::default();
        cache.record_success(snapshot_at(60_000.0, t0()), t0());
        let eligible = cache.latest().unwrap().next_eligible_at;

        assert!(!cache.should_fetch(t0()));
        assert!(!cache.should_fetch(eligible - Duration::milliseconds(1)));
        assert!(cache.should_fetch(eligible));
        assert!(cache.should_fetch(eligible + secs(1)));
    }

    #[test]
    fn test_snapshot_force_stale() {
        let mut cache = RateCache::default();
        cache.record_success(snapshot_at(60_000.0, t0()), t0());

        assert!(!cache.snapshot(false).unwrap().stale);
        assert!(cache.snapshot(true).unwrap().stale);
        // forcing does not mutate the stored entry
        assert!(!cache.latest().unwrap().snapshot.stale);

        cache.record_failure(Some(401), t0() + secs(1));
        assert!(cache.snapshot(false).unwrap().stale);
    }

    #[test]
    fn test_history_is_bounded_and_most_recent_first() {
        let mut cache = RateCache::default();
        for i in 0..15 {
            let at = t0() + secs(i);
            cache.record_success(snapshot_at(60_000.0 + i as f64, at), at);
        }

        let diagnostics = cache.diagnostics();
        assert_eq!(diagnostics.history.len(), 10);
        assert_eq!(diagnostics.history[0].fetched_at, t0() + secs(14));
        assert_eq!(diagnostics.history[9].fetched_at, t0() + secs(5));
        assert!(
            diagnostics
                .history
                .windows(2)
                .all(|pair| pair[0].fetched_at >= pair[1].fetched_at)
        );
        assert_eq!(diagnostics.latest.unwrap(), diagnostics.history[0]);
    }

    #[test]
    fn test_entry_invariants_hold_across_transitions() {
        let mut cache = RateCache::default();
        cache.record_failure(None, t0());
        cache.record_failure(Some(422), t0() + secs(5));
        cache.record_success(snapshot_at(60_000.0, t0() + secs(20)), t0() + secs(20));
        cache.record_failure(Some(429), t0() + secs(30));

        for entry in cache.diagnostics().history {
            assert!(entry.next_eligible_at >= entry.fetched_at);
            if entry.outcome == FetchOutcome::Ok {
                assert_eq!(entry.failed_attempts, 0);
            }
            assert!(entry.snapshot.usd_to_base >= 0.0);
        }
    }
}
