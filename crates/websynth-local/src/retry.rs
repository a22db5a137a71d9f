//! Generic "run-and-retry" wrapper with transient-error classification and
//! bounded exponential backoff, cancellable.
//!
//! Grounded in the teacher's general style (plain free functions, no
//! `tower::Service` machinery); cancellation is modeled with
//! `tokio_util::sync::CancellationToken` since the teacher has no long-lived
//! fan-out of its own to borrow from.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use websynth_core::{Error, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transience {
    Transient,
    Permanent,
}

pub trait Classify<E> {
    fn classify(&self, err: &E) -> Transience;
}

/// Classifies based on an HTTP status code, following spec.md §4.1:
/// {429, 500, 502, 503, 504} are transient, everything else permanent.
pub fn status_is_transient(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

#[derive(Debug, Clone, Copy)]
pub struct HttpStatusClassifier;

impl Classify<u16> for HttpStatusClassifier {
    fn classify(&self, status: &u16) -> Transience {
        if status_is_transient(*status) {
            Transience::Transient
        } else {
            Transience::Permanent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    Cancelled,
    Failed(E),
}

/// Classifies a `websynth_core::Error` for adapter- and client-level retry
/// composition: network/search/LLM failures are transient, everything else
/// (bad input, missing config, unsupported operations) is not.
#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier;

impl Classify<Error> for ErrorClassifier {
    fn classify(&self, err: &Error) -> Transience {
        match err {
            Error::Fetch(_) | Error::Search(_) | Error::Llm(_) => Transience::Transient,
            _ => Transience::Permanent,
        }
    }
}

/// Runs `op` until it succeeds, a permanent error is classified, attempts are
/// exhausted, or `cancel` fires.
///
/// Per spec.md §4.1: waits `min(initial_wait * multiplier^attempt, max_wait)`
/// between attempts, honoring cancellation immediately (even mid-wait).
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    classify: &dyn Classify<E>,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if cancel.is_cancelled() {
        return Err(RetryError::Cancelled);
    }

    let mut attempt: u32 = 0;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            r = op() => r,
        };

        match result {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if classify.classify(&e) == Transience::Permanent {
                    return Err(RetryError::Failed(e));
                }
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Failed(e));
                }
                let wait = backoff_wait(policy, attempt);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
}

/// Runs an adapter call under `RetryPolicy::default()` and `ErrorClassifier`,
/// the shared shape every `SourceAdapter::fetch` composes with (spec.md
/// §4.6). A fresh `CancellationToken` is used per call since adapters have no
/// cancellation handle of their own to thread through yet.
pub async fn retry_adapter<T, F, Fut>(op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let policy = RetryPolicy::default();
    let cancel = CancellationToken::new();
    match retry(&policy, &cancel, &ErrorClassifier, op).await {
        Ok(v) => Ok(v),
        Err(RetryError::Cancelled) => Err(Error::Cancelled),
        Err(RetryError::Failed(e)) => Err(e),
    }
}

fn backoff_wait(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = policy.multiplier.powi(attempt as i32 - 1).max(0.0);
    let ms = (policy.initial_wait().as_millis() as f64) * factor;
    let ms = ms.min(policy.max_wait().as_millis() as f64);
    Duration::from_millis(ms.max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use websynth_core::RetryPolicy;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_wait_ms: 1,
            max_wait_ms: 10,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = fast_policy();
        let result = retry(&policy, &cancel, &HttpStatusClassifier, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(503u16)
                } else {
                    Ok::<_, u16>("ok")
                }
            }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = fast_policy();
        let result = retry(&policy, &cancel, &HttpStatusClassifier, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), u16>(404) }
        })
        .await;
        assert_eq!(result, Err(RetryError::Failed(404)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = fast_policy();
        let result = retry(&policy, &cancel, &HttpStatusClassifier, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), u16>(503) }
        })
        .await;
        assert_eq!(result, Err(RetryError::Failed(503)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_without_further_invocations() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = fast_policy();
        let result = retry(&policy, &cancel, &HttpStatusClassifier, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), u16>(503) }
        })
        .await;
        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn error_classifier_marks_network_search_llm_as_transient() {
        assert_eq!(
            ErrorClassifier.classify(&Error::Fetch("reset".to_string())),
            Transience::Transient
        );
        assert_eq!(
            ErrorClassifier.classify(&Error::Search("timeout".to_string())),
            Transience::Transient
        );
        assert_eq!(
            ErrorClassifier.classify(&Error::Llm("timeout".to_string())),
            Transience::Transient
        );
    }

    #[test]
    fn error_classifier_marks_everything_else_as_permanent() {
        assert_eq!(
            ErrorClassifier.classify(&Error::InvalidUrl("bad".to_string())),
            Transience::Permanent
        );
        assert_eq!(
            ErrorClassifier.classify(&Error::NotConfigured("x".to_string())),
            Transience::Permanent
        );
    }
}
