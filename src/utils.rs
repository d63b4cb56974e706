pub mod retry {
    use std::future::Future;
    use std::time::Duration;

    use crate::errors::RepositoryError;

    #[derive(Debug, Clone)]
    pub struct RetryPolicy {
        /// Total attempts, the first call included.
        pub count: u32,
        pub delay: Duration,
        pub backoff: f64,
    }

    impl Default for RetryPolicy {
        fn default() -> Self {
            Self {
                count: 5,
                delay: Duration::from_secs(1),
                backoff: 2.0,
            }
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or `policy.count` attempts have been made.
    pub async fn with_retry<T, F, Fut>(
        policy: &RetryPolicy,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let attempts = policy.count.max(1);
        let mut delay = policy.delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "retrying in {:?}",
                        delay
                    );

                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, policy.backoff);
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(operation = operation_name, attempt, error = %err, "giving up");
                    return Err(err);
                }
            }
        }
    }

    /// Scales `delay` by `backoff`, saturating instead of panicking on
    /// negative, non-finite or overflowing results.
    fn next_delay(delay: Duration, backoff: f64) -> Duration {
        let scaled = delay.as_secs_f64() * backoff;

        match Duration::try_from_secs_f64(scaled) {
            Ok(next) => next,
            Err(_) if scaled > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }

}
