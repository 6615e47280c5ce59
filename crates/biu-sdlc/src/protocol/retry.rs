//! Reconnect pacing

/// Default number of calls between reconnect attempts
pub const DEFAULT_RETRY_EVERY: u32 = 3;

/// Permits a reconnect attempt on the 1st, (N+1)th, (2N+1)th... call
#[derive(Debug, Clone)]
pub struct RetryGuard {
    every: u32,
    cycles: u32,
}

impl RetryGuard {
    /// Guard allowing one attempt in every `every` calls
    pub fn new(every: u32) -> Self {
        Self { every, cycles: 0 }
    }

    /// Count one call and report whether it may attempt a reconnect
    pub fn should_retry(&mut self) -> bool {
        if self.every <= 1 {
            return true;
        }
        self.cycles = self.cycles.wrapping_add(1);
        self.cycles % self.every == 1
    }

    /// Next call retries immediately
    pub fn reset(&mut self) {
        self.cycles = 0;
    }
}

impl Default for RetryGuard {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_EVERY)
    }
}
