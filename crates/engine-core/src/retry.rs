use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    /// Upstream asked us to slow down; back off from `throttle_delay`,
    /// or from the hinted delay when it is longer.
    Throttled { retry_after: Option<Duration> },
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal(E),
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) | RetryError::AttemptsExceeded(e) => e,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub throttle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            throttle_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
            throttle_delay: base_delay,
        }
    }

    /// No waiting between attempts; used by tests.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_throttle_delay(mut self, delay: Duration) -> Self {
        self.throttle_delay = delay;
        self
    }

    /// Preset for upstream HTTP calls: 3 retries, 250 ms network backoff,
    /// 1 s throttling backoff, both doubling up to a minute.
    pub fn for_http() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(60),
            throttle_delay: Duration::from_secs(1),
        }
    }

    /// Preset for whole pipeline runs: 1 s doubling up to 5 minutes, 5 attempts.
    pub fn for_runs() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            throttle_delay: Duration::from_secs(1),
        }
    }

    /// Executes the operation with the configured retry policy.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        mut op: F,
        classify: Classifier,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let delay = match classify(&err) {
                        RetryDisposition::Stop => return Err(RetryError::Fatal(err)),
                        RetryDisposition::Retry => self.backoff_delay(self.base_delay, attempt),
                        RetryDisposition::Throttled { retry_after } => {
                            let backoff = self.backoff_delay(self.throttle_delay, attempt);
                            retry_after
                                .map(|hint| hint.min(self.max_delay).max(backoff))
                                .unwrap_or(backoff)
                        }
                    };

                    if attempt + 1 >= self.max_attempts {
                        return Err(RetryError::AttemptsExceeded(err));
                    }

                    debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn backoff_delay(&self, base: Duration, attempt: usize) -> Duration {
        if base.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(16);
        let base_ms = base.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
