//! # Request Gate
//!
//! Process-wide admission control for upstream calls: a semaphore caps the
//! number of requests in flight and an optional token bucket caps the
//! sustained request rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tracing::debug;

/// Lock-free token bucket. Refill is computed from a fixed start instant so
/// elapsed time is monotonic across callers.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: AtomicU64,
    capacity: u64,
    refill_rate: u64,
    started: Instant,
    last_refill: AtomicU64,
}

impl TokenBucket {
    pub fn new(capacity: u64, refill_rate: u64) -> Self {
        Self {
            tokens: AtomicU64::new(capacity),
            capacity,
            refill_rate,
            started: Instant::now(),
            last_refill: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn refill(&self) {
        let now = self.now_ms();
        let last = self.last_refill.load(Ordering::SeqCst);
        let added = (now.saturating_sub(last) * self.refill_rate) / 1000;
        if added == 0 {
            return;
        }

        if self
            .last_refill
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    Some((current + added).min(self.capacity))
                });
        }
    }

    pub fn try_acquire(&self, cost: u64) -> bool {
        self.refill();
        self.tokens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(cost)
            })
            .is_ok()
    }

    pub fn available(&self) -> u64 {
        self.refill();
        self.tokens.load(Ordering::SeqCst)
    }
}

/// Shared gate every upstream request passes through
#[derive(Debug, Clone)]
pub struct RequestGate {
    permits: Arc<Semaphore>,
    bucket: Option<Arc<TokenBucket>>,
    poll_interval: Duration,
}

impl RequestGate {
    /// `max_in_flight` concurrent requests, optionally limited to
    /// `requests_per_second` (burst of one second's worth)
    pub fn new(max_in_flight: usize, requests_per_second: Option<u32>) -> Self {
        let bucket = requests_per_second.filter(|rps| *rps > 0).map(|rps| {
            let rps = rps as u64;
            Arc::new(TokenBucket::new(rps, rps))
        });
        let poll_interval = requests_per_second
            .filter(|rps| *rps > 0)
            .map(|rps| Duration::from_millis((1000 / rps as u64).max(1)))
            .unwrap_or(Duration::from_millis(10));

        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            bucket,
            poll_interval,
        }
    }

    /// Waits for an in-flight slot and, when rate limited, a token. The slot
    /// is released when the returned permit drops.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        let permit = loop {
            match self.permits.clone().acquire_owned().await {
                Ok(permit) => break permit,
                // The semaphore is never closed; re-arm defensively
                Err(_) => sleep(self.poll_interval).await,
            }
        };

        if let Some(bucket) = &self.bucket {
            while !bucket.try_acquire(1) {
                debug!("Request rate limit reached, waiting {:?}", self.poll_interval);
                sleep(self.poll_interval).await;
            }
        }
        permit
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
