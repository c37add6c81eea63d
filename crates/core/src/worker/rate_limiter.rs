//! Token bucket limiting how fast the pool starts jobs.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Token bucket over an arbitrary window.
///
/// Tokens are added at a constant rate and consumed when a job starts. The
/// bucket starts full, so a burst of up to `capacity` starts goes through
/// immediately.
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Allow `max` acquisitions per `window`.
    pub fn new(max: u32, window: Duration) -> Self {
        let capacity = f64::from(max.max(1));
        let window_secs = window.as_secs_f64().max(0.001);
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / window_secs,
            last_refill: Instant::now(),
        }
    }

    /// Take a token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(tokens_needed / self.refill_rate))
        }
    }

    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Async wrapper that waits for a token instead of failing.
pub struct StartLimiter {
    bucket: Mutex<TokenBucket>,
}

impl StartLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(max, window)),
        }
    }

    /// Wait until a start is allowed. Cancel-safe.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.bucket.lock().await.try_acquire() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            tokio::time::sleep(wait).await;
        }
    }
}
