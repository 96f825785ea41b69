use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry budget for a freshness-driven job
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// Drive `attempt` until `is_fresh` reports the data is current, up to
/// the policy's attempt budget
///
/// A run that starts fresh does no work. Every attempt is followed
/// immediately by a freshness check, and a fresh result returns without
/// any further delay; the delay only separates one stale attempt from
/// the next. A failed attempt consumes budget like any other. Returns
/// whether the data ended up fresh.
pub async fn run_until_fresh<E, A, AF, F, FF>(
    name: &str,
    policy: RetryPolicy,
    mut attempt: A,
    is_fresh: F,
) -> bool
where
    A: FnMut() -> AF,
    AF: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
    F: Fn() -> FF,
    FF: Future<Output = bool>,
{
    if is_fresh().await {
        debug!(job = name, "Data is already fresh");
        return true;
    }

    for attempt_no in 1..=policy.max_attempts {
        if let Err(error) = attempt().await {
            warn!(job = name, attempt = attempt_no, %error, "Attempt failed");
        }

        if is_fresh().await {
            debug!(job = name, attempt = attempt_no, "Data is fresh");
            return true;
        }

        if attempt_no < policy.max_attempts {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    warn!(
        job = name,
        attempts = policy.max_attempts,
        "Retry budget exhausted before data became fresh"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            retry_delay: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_immediately_when_already_fresh() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let fresh = run_until_fresh(
            "test",
            policy(30),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), std::io::Error>(()) }
            },
            || async { true },
        )
        .await;

        assert!(fresh);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_the_attempt_makes_data_fresh() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(AtomicBool::new(false));

        let counter = attempts.clone();
        let writer = state.clone();
        let reader = state.clone();

        let started = tokio::time::Instant::now();
        let fresh = run_until_fresh(
            "test",
            policy(30),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let writer = writer.clone();
                async move {
                    writer.store(true, Ordering::SeqCst);
                    Ok::<(), std::io::Error>(())
                }
            },
            move || {
                let reader = reader.clone();
                async move { reader.load(Ordering::SeqCst) }
            },
        )
        .await;

        assert!(fresh);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        // A successful run must not wait out a retry delay on its way out.
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_only_between_attempts_that_leave_data_stale() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(AtomicBool::new(false));

        let counter = attempts.clone();
        let writer = state.clone();
        let reader = state.clone();

        let started = tokio::time::Instant::now();
        let fresh = run_until_fresh(
            "test",
            policy(30),
            move || {
                let attempt_no = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let writer = writer.clone();
                async move {
                    if attempt_no >= 2 {
                        writer.store(true, Ordering::SeqCst);
                    }
                    Ok::<(), std::io::Error>(())
                }
            },
            move || {
                let reader = reader.clone();
                async move { reader.load(Ordering::SeqCst) }
            },
        )
        .await;

        assert!(fresh);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_the_exact_attempt_budget_when_never_fresh() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let fresh = run_until_fresh(
            "test",
            policy(5),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), std::io::Error>(()) }
            },
            || async { false },
        )
        .await;

        assert!(!fresh);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_consume_attempts_like_successes() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let fresh = run_until_fresh(
            "test",
            policy(3),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "unreachable",
                    ))
                }
            },
            || async { false },
        )
        .await;

        assert!(!fresh);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
