//! Rate limiting for the destination API
//!
//! Admission control in front of the push calls. Two independent mechanisms
//! must both let an item through:
//!
//! - **Permit window**: at most `limit_for_period` admissions per fixed
//!   `refresh_period`. The window refills in full at each period boundary.
//!   Acquisition never blocks; a waiting caller re-checks every
//!   `check_interval` until a permit is free.
//! - **Spacing floor**: consecutive admissions are at least
//!   `refresh_period / limit_for_period` apart, truncated to whole
//!   milliseconds.
//!
//! Callers are admitted strictly in arrival order (FIFO); nobody overtakes.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for the admission gate
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Admissions allowed per period (R)
    pub limit_for_period: u32,
    /// Length of one permit window (P)
    pub refresh_period: Duration,
    /// How often a waiting caller re-checks for a free permit
    pub check_interval: Duration,
}

impl RateLimitConfig {
    /// R admissions per period P, re-checked every 10ms
    pub fn new(limit_for_period: u32, refresh_period: Duration) -> Self {
        Self {
            limit_for_period: limit_for_period.max(1),
            refresh_period,
            check_interval: Duration::from_millis(10),
        }
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Minimum distance between two admissions: `P / R` in whole milliseconds
    pub fn spacing(&self) -> Duration {
        let period_ms = self.refresh_period.as_millis() as u64;
        Duration::from_millis(period_ms / u64::from(self.limit_for_period.max(1)))
    }
}

struct PermitWindow {
    started_at: Instant,
    remaining: u32,
}

/// FIFO admission gate enforcing a permit window plus a spacing floor.
pub struct RateLimitGate {
    config: RateLimitConfig,
    window: Mutex<PermitWindow>,
    /// Held for the whole admission of one caller; tokio's mutex is fair, so
    /// waiters are served in the order they arrived. Stores the time of the
    /// previous admission.
    turnstile: tokio::sync::Mutex<Option<Instant>>,
    admitted: AtomicU64,
    throttled: AtomicU64,
    total_wait_ns: AtomicU64,
}

impl RateLimitGate {
    pub fn new(config: RateLimitConfig) -> Self {
        let remaining = config.limit_for_period;
        Self {
            config,
            window: Mutex::new(PermitWindow {
                started_at: Instant::now(),
                remaining,
            }),
            turnstile: tokio::sync::Mutex::new(None),
            admitted: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            total_wait_ns: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until the caller may proceed.
    ///
    /// Returns the time spent waiting.
    pub async fn admit(&self) -> Duration {
        let start = Instant::now();
        let mut last_admission = self.turnstile.lock().await;

        let mut throttled = false;
        while !self.try_acquire() {
            throttled = true;
            tokio::time::sleep(self.config.check_interval).await;
        }

        if let Some(previous) = *last_admission {
            let ready_at = previous + self.config.spacing();
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        let now = Instant::now();
        *last_admission = Some(now);
        drop(last_admission);

        let waited = now.duration_since(start);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        self.total_wait_ns
            .fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
        if throttled {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            debug!("Rate limiter: waited {:?} for a permit", waited);
        }
        waited
    }

    /// Take a permit from the current window without waiting.
    ///
    /// This bypasses the FIFO turnstile and the spacing floor; it is the
    /// non-blocking check `admit` polls.
    pub fn try_acquire(&self) -> bool {
        let mut window = self.window.lock();
        self.refresh(&mut window);
        if window.remaining > 0 {
            window.remaining -= 1;
            true
        } else {
            false
        }
    }

    fn refresh(&self, window: &mut PermitWindow) {
        let period = self.config.refresh_period;
        if period.is_zero() {
            window.remaining = self.config.limit_for_period;
            return;
        }

        let elapsed = window.started_at.elapsed();
        if elapsed >= period {
            let cycles = (elapsed.as_nanos() / period.as_nanos()) as u32;
            window.started_at += period * cycles;
            window.remaining = self.config.limit_for_period;
        }
    }

    /// Permits left in the current window
    pub fn available_permits(&self) -> u32 {
        let mut window = self.window.lock();
        self.refresh(&mut window);
        window.remaining
    }

    /// Get statistics about rate limiting
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            total_wait_ms: self.total_wait_ns.load(Ordering::Relaxed) / 1_000_000,
            available_permits: self.available_permits(),
            limit_for_period: self.config.limit_for_period,
            refresh_period_ms: self.config.refresh_period.as_millis() as u64,
        }
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    /// Items let through so far
    pub admitted: u64,
    /// Items that had to wait for a permit
    pub throttled: u64,
    /// Total time spent waiting in milliseconds
    pub total_wait_ms: u64,
    /// Permits left in the current window
    pub available_permits: u32,
    /// Configured permits per window
    pub limit_for_period: u32,
    /// Configured window length
    pub refresh_period_ms: u64,
}

impl std::fmt::Display for RateLimiterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RateLimiter({}/{}ms, {} admitted, {} throttled, {}ms waited, {} permits left)",
            self.limit_for_period,
            self.refresh_period_ms,
            self.admitted,
            self.throttled,
            self.total_wait_ms,
            self.available_permits
        )
    }
}
