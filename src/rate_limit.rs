//! Fixed-window request limiter keyed by client identity.
//!
//! Each identity owns one window entry. The first request opens a window of
//! `window` length; requests inside it are counted until `max_requests` is
//! reached. Once the window has passed, the next request replaces the entry
//! with a fresh window. Bursts straddling a window boundary can therefore
//! see up to twice `max_requests` admissions in a short span.
//!
//! Entries live in a sharded [`DashMap`]; the entry API holds the shard lock
//! for the whole read-modify-write so two concurrent requests from the same
//! identity can never both pass the last free slot.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(60_000),
            max_requests: 10,
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: u32 },
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    cfg: RateLimitConfig,
    entries: DashMap<String, WindowEntry, ahash::RandomState>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            cfg,
            entries: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.cfg
    }

    /// Check and count one request from `identity` at the current instant.
    pub fn admit(&self, identity: &str) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, identity: &str, now: Instant) -> Admission {
        let max = self.cfg.max_requests;
        match self.entries.entry(identity.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(self.fresh_window(now));
                Admission::Admitted {
                    remaining: max.saturating_sub(1),
                }
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if now > entry.reset_at {
                    *entry = self.fresh_window(now);
                    Admission::Admitted {
                        remaining: max.saturating_sub(1),
                    }
                } else if entry.count < max {
                    entry.count += 1;
                    Admission::Admitted {
                        remaining: max - entry.count,
                    }
                } else {
                    Admission::Rejected {
                        retry_after: entry.reset_at.saturating_duration_since(now),
                    }
                }
            }
        }
    }

    fn fresh_window(&self, now: Instant) -> WindowEntry {
        WindowEntry {
            count: 1,
            reset_at: now + self.cfg.window,
        }
    }

    /// Drop entries whose window has already passed. A later request from the
    /// same identity starts a fresh window either way, so removal is not
    /// observable to clients. Returns the number of entries removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.reset_at);
        before.saturating_sub(self.entries.len())
    }

    /// Number of identities currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Periodically purge expired entries for as long as the runtime lives.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = limiter.purge_expired(Instant::now());
                if purged > 0 {
                    tracing::debug!(purged, tracked = limiter.len(), "swept expired rate limit windows");
                }
            }
        })
    }
}
