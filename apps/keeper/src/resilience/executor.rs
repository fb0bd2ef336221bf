//! Resilient execution of unreliable async operations.
//!
//! An operation is any closure returning a future of `Result<T, OperationError>`.
//! Each call owns its attempt counter and timers; nothing is shared between
//! concurrent calls apart from the injected clock and connectivity monitor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::resilience::cancel::CancellationToken;
use crate::resilience::clock::Clock;
use crate::resilience::connectivity::ConnectivityMonitor;
use crate::resilience::error::OperationError;
use crate::resilience::policy::{RetryEvent, RetryPolicy};

/// Structured result of a composed execution.
#[derive(Debug)]
pub struct OperationOutcome<T> {
    pub result: Result<T, OperationError>,
    /// Attempts made by the primary operation.
    pub attempts: u32,
    pub elapsed: Duration,
    /// The value (or error) came from the fallback path.
    pub from_fallback: bool,
}

impl<T> OperationOutcome<T> {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.result.as_ref().err()
    }
}

/// Anything carrying an HTTP status code.
pub trait HttpStatus {
    fn status_code(&self) -> u16;
}

impl HttpStatus for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }
}

#[derive(Clone)]
pub struct ResilientExecutor {
    clock: Arc<dyn Clock>,
    connectivity: Option<Arc<ConnectivityMonitor>>,
}

impl ResilientExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            connectivity: None,
        }
    }

    /// Attempts wait for the host to be online before they start.
    pub fn with_connectivity(mut self, monitor: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = Some(monitor);
        self
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or `policy.max_attempts` is reached. Terminal failures are wrapped in
    /// `RetryExhausted`; cancellation is returned as `Cancelled`.
    pub async fn retry_with_backoff<T, F, Fut>(
        &self,
        operation: F,
        policy: &RetryPolicy,
    ) -> Result<T, OperationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.run_attempts(operation, policy).await.0
    }

    /// Races `operation` against a timer. The losing side is dropped.
    pub async fn with_timeout<T, Fut>(
        &self,
        operation: Fut,
        timeout: Duration,
    ) -> Result<T, OperationError>
    where
        Fut: Future<Output = Result<T, OperationError>>,
    {
        tokio::select! {
            biased;
            result = operation => result,
            _ = self.clock.sleep(timeout) => Err(OperationError::Timeout(timeout)),
        }
    }

    /// Runs `operation`; on any failure runs `fallback`.
    pub async fn with_fallback<T, Fut, G, GFut>(
        &self,
        operation: Fut,
        fallback: G,
    ) -> OperationOutcome<T>
    where
        Fut: Future<Output = Result<T, OperationError>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, OperationError>>,
    {
        self.with_fallback_if(operation, fallback, |_| true).await
    }

    /// Runs `operation`; on a failure accepted by `predicate` runs `fallback`
    /// and tags the outcome `from_fallback`.
    pub async fn with_fallback_if<T, Fut, G, GFut, P>(
        &self,
        operation: Fut,
        fallback: G,
        predicate: P,
    ) -> OperationOutcome<T>
    where
        Fut: Future<Output = Result<T, OperationError>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, OperationError>>,
        P: Fn(&OperationError) -> bool,
    {
        let started = Instant::now();
        match operation.await {
            Ok(value) => OperationOutcome {
                result: Ok(value),
                attempts: 1,
                elapsed: started.elapsed(),
                from_fallback: false,
            },
            Err(err) if predicate(&err) => {
                warn!(error = %err, "Operation failed; using fallback");
                OperationOutcome {
                    result: fallback().await,
                    attempts: 1,
                    elapsed: started.elapsed(),
                    from_fallback: true,
                }
            }
            Err(err) => OperationOutcome {
                result: Err(err),
                attempts: 1,
                elapsed: started.elapsed(),
                from_fallback: false,
            },
        }
    }

    /// Retry with backoff; once retries are exhausted, run `fallback` instead
    /// of failing. Cancellation never triggers the fallback.
    pub async fn retry_with_fallback<T, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
        policy: &RetryPolicy,
    ) -> OperationOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, OperationError>>,
    {
        let started = Instant::now();
        let (result, attempts) = self.run_attempts(operation, policy).await;

        match result {
            Err(err) if !err.is_cancelled() => {
                warn!(attempts, error = %err, "Retries exhausted; using fallback");
                let result = self.cancellable(fallback(), policy.cancel.as_ref()).await;
                OperationOutcome {
                    result,
                    attempts,
                    elapsed: started.elapsed(),
                    from_fallback: true,
                }
            }
            result => OperationOutcome {
                result,
                attempts,
                elapsed: started.elapsed(),
                from_fallback: false,
            },
        }
    }

    /// Retries a network call. Non-2xx responses become `Status` errors and
    /// are classified like any other failure. `send` receives a token that is
    /// cancelled when the caller's token fires or when this call settles.
    pub async fn fetch_with_retry<R, F, Fut>(
        &self,
        mut send: F,
        policy: &RetryPolicy,
    ) -> Result<R, OperationError>
    where
        R: HttpStatus,
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<R, OperationError>>,
    {
        let internal = match &policy.cancel {
            Some(external) => external.child_token(),
            None => CancellationToken::new(),
        };
        let scoped = policy.clone().with_cancellation(internal.clone());

        let result = self
            .retry_with_backoff(
                || {
                    let request = send(internal.clone());
                    async move {
                        let response = request.await?;
                        let status = response.status_code();
                        if (200..300).contains(&status) {
                            Ok(response)
                        } else {
                            Err(OperationError::Status {
                                status,
                                message: format!("unexpected HTTP status {status}"),
                            })
                        }
                    }
                },
                &scoped,
            )
            .await;

        // Anything the request left running observes the settled call.
        internal.cancel();
        result
    }

    async fn run_attempts<T, F, Fut>(
        &self,
        mut operation: F,
        policy: &RetryPolicy,
    ) -> (Result<T, OperationError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let max_attempts = policy.attempts();
        let token = policy.cancel.as_ref();
        let mut attempt = 1;

        loop {
            if token.is_some_and(CancellationToken::is_cancelled) {
                return (Err(OperationError::Cancelled), attempt - 1);
            }

            if let Some(monitor) = &self.connectivity {
                if !monitor.is_online() {
                    debug!(attempt, "Offline; waiting for connectivity");
                    if let Err(e) = self.cancellable(monitor.wait_for_online(None), token).await {
                        return (Err(e), attempt - 1);
                    }
                }
            }

            let attempt_result = match policy.timeout {
                Some(limit) => {
                    self.cancellable(self.with_timeout(operation(), limit), token)
                        .await
                }
                None => self.cancellable(operation(), token).await,
            };

            let err = match attempt_result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return (Ok(value), attempt);
                }
                Err(OperationError::Cancelled) => return (Err(OperationError::Cancelled), attempt),
                Err(err) => err,
            };

            if attempt >= max_attempts || !policy.should_retry(&err) {
                warn!(attempt, error = %err, "Operation failed terminally");
                return (
                    Err(OperationError::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    }),
                    attempt,
                );
            }

            let delay = policy.jittered_delay(attempt, &mut rand::rng());
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Operation failed; backing off"
            );
            if let Some(callback) = &policy.on_retry {
                callback(&RetryEvent {
                    attempt,
                    delay,
                    error: err,
                });
            }

            if let Err(e) = self.cancellable(sleep_ok(self.clock.as_ref(), delay), token).await {
                return (Err(e), attempt);
            }
            attempt += 1;
        }
    }

    /// Races `work` against the token; a fired token drops `work`.
    async fn cancellable<T, Fut>(
        &self,
        work: Fut,
        token: Option<&CancellationToken>,
    ) -> Result<T, OperationError>
    where
        Fut: Future<Output = Result<T, OperationError>>,
    {
        match token {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(OperationError::Cancelled),
                result = work => result,
            },
            None => work.await,
        }
    }
}

async fn sleep_ok(clock: &dyn Clock, delay: Duration) -> Result<(), OperationError> {
    clock.sleep(delay).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::{ManualClock, SystemClock};
    use crate::resilience::connectivity::ConnectivityProbe;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn status(code: u16) -> OperationError {
        OperationError::Status {
            status: code,
            message: format!("HTTP {code}"),
        }
    }

    fn manual() -> (Arc<ManualClock>, ResilientExecutor) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (clock.clone(), ResilientExecutor::new(clock))
    }

    /// Fails with `error` for the first `failures` calls, then succeeds.
    fn flaky(
        calls: &AtomicU32,
        failures: u32,
        error: OperationError,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, OperationError>> + '_ {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n <= failures { Err(error.clone()) } else { Ok(n) })
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_does_not_sleep() {
        let (clock, exec) = manual();
        let calls = AtomicU32::new(0);
        let value = exec
            .retry_with_backoff(flaky(&calls, 0, status(500)), &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_retry_until_max_attempts() {
        let (clock, exec) = manual();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default()
            .with_max_attempts(4)
            .with_delays(ms(1000), ms(8000))
            .without_jitter();
        let err = exec
            .retry_with_backoff(flaky(&calls, u32::MAX, status(500)), &policy)
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.attempts(), Some(4));
        assert_eq!(err.root_cause().status(), Some(500));
        assert_eq!(clock.sleeps(), vec![ms(1000), ms(2000), ms(4000)]);
    }

    #[tokio::test]
    async fn test_not_found_fails_on_first_attempt() {
        let (clock, exec) = manual();
        let calls = AtomicU32::new(0);
        let err = exec
            .retry_with_backoff(flaky(&calls, u32::MAX, status(404)), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts(), Some(1));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_is_retried() {
        let (_, exec) = manual();
        let calls = AtomicU32::new(0);
        let value = exec
            .retry_with_backoff(flaky(&calls, 2, status(429)), &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_on_retry_sees_each_failed_attempt() {
        let (_, exec) = manual();
        let calls = AtomicU32::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let policy = {
            let seen = Arc::clone(&seen);
            RetryPolicy::default()
                .with_max_attempts(5)
                .on_retry(move |event| seen.lock().unwrap().push((event.attempt, event.delay)))
        };
        exec.retry_with_backoff(flaky(&calls, 2, OperationError::failed("reset")), &policy)
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[1].0, 2);
        assert!(seen[1].1 >= ms(1500) && seen[1].1 <= ms(2500));
    }

    #[tokio::test]
    async fn test_zero_max_attempts_still_runs_once() {
        let (_, exec) = manual();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_max_attempts(0);
        let _ = exec
            .retry_with_backoff(flaky(&calls, u32::MAX, status(503)), &policy)
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_rejects_slow_operation() {
        let exec = ResilientExecutor::new(Arc::new(SystemClock));
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, OperationError>(1)
        };
        assert_eq!(
            exec.with_timeout(slow, Duration::from_secs(1)).await,
            Err(OperationError::Timeout(Duration::from_secs(1)))
        );
        let fast = async { Ok::<_, OperationError>(2) };
        assert_eq!(exec.with_timeout(fast, Duration::from_secs(1)).await, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_attempt_timeout_is_retried() {
        let exec = ResilientExecutor::new(Arc::new(SystemClock));
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default()
            .with_max_attempts(3)
            .with_timeout(Duration::from_secs(1));
        let value = exec
            .retry_with_backoff(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n == 1 {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        Ok::<_, OperationError>(n)
                    }
                },
                &policy,
            )
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_with_fallback_tags_outcome() {
        let (_, exec) = manual();
        let outcome = exec
            .with_fallback(async { Err::<u32, _>(status(502)) }, || async { Ok(7) })
            .await;
        assert!(outcome.success());
        assert!(outcome.from_fallback);
        assert_eq!(outcome.data(), Some(&7));

        let skipped = exec
            .with_fallback_if(
                async { Err::<u32, _>(status(400)) },
                || async { Ok(7) },
                |e| e.status() != Some(400),
            )
            .await;
        assert!(!skipped.success());
        assert!(!skipped.from_fallback);
        assert_eq!(skipped.error().and_then(OperationError::status), Some(400));
    }

    #[tokio::test]
    async fn test_retry_with_fallback_after_exhaustion() {
        let (_, exec) = manual();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_max_attempts(2);
        let outcome = exec
            .retry_with_fallback(
                flaky(&calls, u32::MAX, status(500)),
                || async { Ok(99) },
                &policy,
            )
            .await;
        assert!(outcome.success());
        assert!(outcome.from_fallback);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.data(), Some(&99));
    }

    #[tokio::test]
    async fn test_retry_with_fallback_primary_success() {
        let (_, exec) = manual();
        let calls = AtomicU32::new(0);
        let outcome = exec
            .retry_with_fallback(
                flaky(&calls, 1, status(503)),
                || async { Ok(99) },
                &RetryPolicy::default(),
            )
            .await;
        assert_eq!(outcome.data(), Some(&2));
        assert!(!outcome.from_fallback);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_settles_promptly() {
        let exec = ResilientExecutor::new(Arc::new(SystemClock));
        let token = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_max_attempts(5)
            .with_delays(Duration::from_secs(60), Duration::from_secs(60))
            .with_cancellation(token.clone());

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            })
        };

        let started = Instant::now();
        let calls = AtomicU32::new(0);
        let outcome = exec
            .retry_with_fallback(
                flaky(&calls, u32::MAX, status(500)),
                || async { Ok(1) },
                &policy,
            )
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome.result, Err(OperationError::Cancelled));
        assert!(!outcome.from_fallback);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_token_prevents_first_attempt() {
        let (_, exec) = manual();
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);
        let result = exec
            .retry_with_backoff(
                flaky(&calls, 0, status(500)),
                &RetryPolicy::default().with_cancellation(token),
            )
            .await;
        assert_eq!(result, Err(OperationError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Debug)]
    struct Reply(u16);

    impl HttpStatus for Reply {
        fn status_code(&self) -> u16 {
            self.0
        }
    }

    #[tokio::test]
    async fn test_fetch_retries_non_success_status() {
        let (_, exec) = manual();
        let codes = Mutex::new(vec![503, 429, 200]);
        let reply = exec
            .fetch_with_retry(
                |_token| {
                    let code = codes.lock().unwrap().remove(0);
                    async move { Ok(Reply(code)) }
                },
                &RetryPolicy::default(),
            )
            .await
            .unwrap();
        assert_eq!(reply.status_code(), 200);
        assert!(codes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_exhaustion_carries_status() {
        let (_, exec) = manual();
        let err = exec
            .fetch_with_retry(
                |_token| async { Ok(Reply(404)) },
                &RetryPolicy::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::RetryExhausted { attempts: 1, .. }));
        assert_eq!(err.root_cause().status(), Some(404));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_external_token_aborts_in_flight_request() {
        let exec = ResilientExecutor::new(Arc::new(SystemClock));
        let external = CancellationToken::new();
        let seen_tokens = Mutex::new(Vec::new());
        let policy = RetryPolicy::default().with_cancellation(external.clone());

        let fetch = exec.fetch_with_retry(
            |token| {
                seen_tokens.lock().unwrap().push(token.clone());
                async move {
                    token.cancelled().await;
                    Ok(Reply(200))
                }
            },
            &policy,
        );
        let abort = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            external.cancel();
        };
        let (result, ()) = tokio::join!(fetch, abort);

        assert_eq!(result.err(), Some(OperationError::Cancelled));
        let tokens = seen_tokens.lock().unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_cancelled());
    }

    #[tokio::test]
    async fn test_fetch_internal_token_is_released_without_touching_caller() {
        let (_, exec) = manual();
        let external = CancellationToken::new();
        let seen = Mutex::new(None);
        exec.fetch_with_retry(
            |token| {
                *seen.lock().unwrap() = Some(token);
                async { Ok(Reply(204)) }
            },
            &RetryPolicy::default().with_cancellation(external.clone()),
        )
        .await
        .unwrap();
        assert!(seen.lock().unwrap().as_ref().unwrap().is_cancelled());
        assert!(!external.is_cancelled());
    }

    struct AlwaysUp;

    #[async_trait]
    impl ConnectivityProbe for AlwaysUp {
        async fn probe(&self, _url: &str) -> Result<(), OperationError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_wait_until_online() {
        let clock = Arc::new(SystemClock);
        let monitor = Arc::new(ConnectivityMonitor::new(false, Arc::new(AlwaysUp), clock.clone()));
        let exec = ResilientExecutor::new(clock).with_connectivity(Arc::clone(&monitor));
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let run = exec.retry_with_backoff(flaky(&calls, 0, status(500)), &policy);
        let reconnect = async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert_eq!(calls.load(Ordering::SeqCst), 0);
            monitor.set_online(true);
        };
        let (result, ()) = tokio::join!(run, reconnect);
        assert_eq!(result, Ok(1));
    }
}
