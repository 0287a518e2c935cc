use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration, Instant};

use crate::errors::GatewayError;

/// Client-side throttle for the market-data provider.
///
/// Bounds concurrent requests and spaces request starts at least
/// `60s / requests_per_minute` apart, keeping the free RapidAPI tier from
/// answering 429.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    last_request: Mutex<Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, requests_per_minute: u32) -> Self {
        let min_delay_ms = 60_000 / requests_per_minute.max(1) as u64;
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            last_request: Mutex::new(
                Instant::now()
                    .checked_sub(Duration::from_secs(60))
                    .unwrap_or_else(Instant::now),
            ),
            min_delay: Duration::from_millis(min_delay_ms),
        }
    }

    /// Waits for a concurrency slot and for the spacing delay. The slot is
    /// released when the guard drops.
    pub async fn acquire(&self) -> Result<RateLimitGuard, GatewayError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::Network("rate limiter closed".into()))?;

        let wait_time = {
            let last = self.last_request.lock();
            self.min_delay.checked_sub(last.elapsed())
        };

        if let Some(delay) = wait_time {
            sleep(delay).await;
        }

        *self.last_request.lock() = Instant::now();

        Ok(RateLimitGuard { _permit: permit })
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}
