//! Sliding-window attempt limiter
//!
//! Each key holds the timestamps of its attempts inside the window. An attempt
//! made at `ts` counts until `ts + window` and is gone from that second on.
//! The `DashMap` entry guard is held across prune, check and record, so
//! parallel attempts on one key serialize and can never both take the last
//! slot.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

/// Counts attempts per key within a sliding window
pub struct AttemptLimiter {
    attempts: DashMap<String, Vec<u64>>,
    /// Window size in seconds
    window_seconds: u64,
    /// Max attempts per window
    max_attempts: u32,
}

impl AttemptLimiter {
    pub fn new(window_seconds: u64, max_attempts: u32) -> Self {
        Self {
            attempts: DashMap::new(),
            window_seconds,
            max_attempts,
        }
    }

    /// Record an attempt now.
    ///
    /// Returns `Err(retry_after_secs)` when the key is over its limit; a
    /// rejected attempt is not recorded.
    pub fn check_and_record(&self, key: &str) -> Result<(), u64> {
        self.check_and_record_at(key, now_secs())
    }

    /// Same as [`check_and_record`](Self::check_and_record) at an explicit time
    pub fn check_and_record_at(&self, key: &str, now: u64) -> Result<(), u64> {
        let mut entry = self.pruned(key, now);

        if let Some(retry_after) = self.retry_after(&entry, now) {
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Record one attempt under `key` here and under `other_key` in `other`,
    /// or under neither.
    ///
    /// Both entries stay locked until the attempt is accepted or rejected.
    /// When both keys are over their limits the longer wait is returned.
    /// `other` must be a different limiter from `self`.
    pub fn check_and_record_with(
        &self,
        key: &str,
        other: &AttemptLimiter,
        other_key: &str,
    ) -> Result<(), u64> {
        self.check_and_record_with_at(key, other, other_key, now_secs())
    }

    pub fn check_and_record_with_at(
        &self,
        key: &str,
        other: &AttemptLimiter,
        other_key: &str,
        now: u64,
    ) -> Result<(), u64> {
        let mut entry = self.pruned(key, now);
        let mut other_entry = other.pruned(other_key, now);

        match (
            self.retry_after(&entry, now),
            other.retry_after(&other_entry, now),
        ) {
            (None, None) => {
                entry.push(now);
                other_entry.push(now);
                Ok(())
            }
            (a, b) => Err(a.unwrap_or(0).max(b.unwrap_or(0))),
        }
    }

    /// Attempts currently counted against `key`
    pub fn count_at(&self, key: &str, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.window_seconds);
        self.attempts
            .get(key)
            .map(|attempts| attempts.iter().filter(|&&ts| ts > cutoff).count())
            .unwrap_or(0)
    }

    fn pruned(&self, key: &str, now: u64) -> RefMut<'_, String, Vec<u64>> {
        let cutoff = now.saturating_sub(self.window_seconds);
        let mut entry = self.attempts.entry(key.to_string()).or_default();
        entry.retain(|&ts| ts > cutoff);
        entry
    }

    fn retry_after(&self, attempts: &[u64], now: u64) -> Option<u64> {
        if attempts.len() < self.max_attempts as usize {
            return None;
        }
        let oldest = attempts.iter().copied().min().unwrap_or(now);
        Some((oldest + self.window_seconds).saturating_sub(now).max(1))
    }

    /// Drop keys with no attempts left in the window
    pub fn cleanup(&self) {
        self.cleanup_at(now_secs());
    }

    pub fn cleanup_at(&self, now: u64) {
        let cutoff = now.saturating_sub(self.window_seconds);

        self.attempts.retain(|_, attempts| {
            attempts.retain(|&ts| ts > cutoff);
            !attempts.is_empty()
        });
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
