use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// The same pause before every retry.
    Fixed(Duration),
    /// `step * attempt`: 5s, 10s, 15s, ... for a 5s step.
    Linear(Duration),
}

impl Backoff {
    /// Pause after the failed `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(d) => d,
            Self::Linear(step) => step.saturating_mul(attempt),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Runs `op` until it succeeds, fails with an error `is_retryable` rejects, or the
/// policy runs out of attempts. `on_retry` sees the failed attempt, the pause that
/// follows and the error, before the pause.
pub async fn retry<T, E, Op, Fut, P, N>(
    policy: &RetryPolicy,
    mut op: Op,
    is_retryable: P,
    mut on_retry: N,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    N: FnMut(u32, Duration, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.backoff.delay(attempt);
                on_retry(attempt, delay, &e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum Failure {
        Locked,
        Broken,
    }

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    #[test]
    fn linear_backoff_grows_with_attempts() {
        let backoff = Backoff::Linear(Duration::from_secs(5));
        assert_eq!(backoff.delay(1), Duration::from_secs(5));
        assert_eq!(backoff.delay(4), Duration::from_secs(20));
        assert_eq!(Backoff::Fixed(Duration::from_secs(2)).delay(9), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let calls = Cell::new(0);
        let mut notices = Vec::new();

        let res = retry(
            &instant(5),
            |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(Failure::Locked)
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |e| *e == Failure::Locked,
            |attempt, _, _| notices.push(attempt),
        )
        .await;

        assert_eq!(res, Ok(3));
        assert_eq!(calls.get(), 3);
        assert_eq!(notices, vec![1, 2]);
    }

    #[tokio::test]
    async fn gives_up_at_the_attempt_cap() {
        let calls = Cell::new(0);
        let res: Result<(), _> = retry(
            &instant(4),
            |_| {
                calls.set(calls.get() + 1);
                async { Err(Failure::Locked) }
            },
            |e| *e == Failure::Locked,
            |_, _, _| {},
        )
        .await;

        assert_eq!(res, Err(Failure::Locked));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let res: Result<(), _> = retry(
            &instant(5),
            |_| {
                calls.set(calls.get() + 1);
                async { Err(Failure::Broken) }
            },
            |e| *e == Failure::Locked,
            |_, _, _| panic!("no retry expected"),
        )
        .await;

        assert_eq!(res, Err(Failure::Broken));
        assert_eq!(calls.get(), 1);
    }
}
