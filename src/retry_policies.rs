use reqwest_middleware::Error as MiddlewareError;
use reqwest_retry::{
    RetryDecision, RetryPolicy, Retryable, RetryableStrategy, default_on_request_failure,
};
use std::time::{Duration, SystemTime};

/// Doubles the wait after every failed attempt, never waiting longer than `max_wait`.
///
/// for a max_n_retries of 5, a base_wait of 500ms and a max_wait of 4s
///
/// wait times will be (ms):
///
/// 500, 1000, 2000, 4000, 4000
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CappedExponentialRetry {
    /// Maximum number of allowed retries attempts.
    pub max_n_retries: u32,
    /// Wait before the first retry.
    pub base_wait: Duration,
    /// Upper bound of any single wait.
    pub max_wait: Duration,
}

impl CappedExponentialRetry {
    fn wait_for(&self, n_past_retries: u32) -> Duration {
        let factor = 2u32.checked_pow(n_past_retries).unwrap_or(u32::MAX);
        self.base_wait
            .checked_mul(factor)
            .map_or(self.max_wait, |wait| wait.min(self.max_wait))
    }
}

impl RetryPolicy for CappedExponentialRetry {
    fn should_retry(&self, _request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        if n_past_retries >= self.max_n_retries {
            return RetryDecision::DoNotRetry;
        }
        RetryDecision::Retry {
            execute_after: SystemTime::now() + self.wait_for(n_past_retries),
        }
    }
}

/// Any response outside 2xx is worth another attempt, not only 5xx and 429.
/// Transport errors fall back to the middleware's own classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonSuccessIsTransient;

impl RetryableStrategy for NonSuccessIsTransient {
    fn handle(&self, res: &Result<reqwest::Response, MiddlewareError>) -> Option<Retryable> {
        match res {
            Ok(response) if response.status().is_success() => None,
            Ok(_) => Some(Retryable::Transient),
            Err(error) => default_on_request_failure(error),
        }
    }
}
