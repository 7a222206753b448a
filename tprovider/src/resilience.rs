//! Retry/backoff control for transient provider failures.
//!
//! Two failure classes are retried, each with its own budget: rate limiting (HTTP 429) and
//! server errors (HTTP 5xx). Everything else propagates on first failure. Every wait races the
//! caller's cancellation token.

use std::future::Future;
use std::time::Duration;

use futures_util::future::{Either, select};
use futures_util::pin_mut;
use tokio_util::sync::CancellationToken;

use crate::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }

    /// 4 retries starting at 8s.
    pub fn rate_limit() -> Self {
        Self::new(4, Duration::from_secs(8))
    }

    /// 2 retries starting at 5s.
    pub fn server_error() -> Self {
        Self::new(2, Duration::from_secs(5))
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before the `retry`-th retry (1-based).
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let unbounded = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(unbounded.min(self.max_backoff.as_secs_f64()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    RateLimited,
    ServerError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    pub rate_limit: RetryPolicy,
    pub server_error: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            rate_limit: RetryPolicy::rate_limit(),
            server_error: RetryPolicy::server_error(),
        }
    }
}

impl RetryPolicies {
    pub fn disabled() -> Self {
        Self {
            rate_limit: RetryPolicy::disabled(),
            server_error: RetryPolicy::disabled(),
        }
    }

    pub fn classify(error: &ProviderError) -> Option<RetryClass> {
        match error.status_code()? {
            429 => Some(RetryClass::RateLimited),
            500..=599 => Some(RetryClass::ServerError),
            _ => None,
        }
    }

    pub fn policy(&self, class: RetryClass) -> &RetryPolicy {
        match class {
            RetryClass::RateLimited => &self.rate_limit,
            RetryClass::ServerError => &self.server_error,
        }
    }
}

pub trait ProviderOperationHooks: Send + Sync {
    fn on_attempt_start(&self, _provider: &str, _operation: &str, _attempt: u32) {}

    fn on_retry_scheduled(
        &self,
        _provider: &str,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &ProviderError,
    ) {
    }

    fn on_success(&self, _provider: &str, _operation: &str, _attempts: u32) {}

    fn on_failure(&self, _provider: &str, _operation: &str, _attempts: u32, _error: &ProviderError) {}

    fn on_cancelled(&self, _provider: &str, _operation: &str, _attempts: u32) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOperationHooks;

impl ProviderOperationHooks for NoopOperationHooks {}

/// Runs `future` until it completes or `cancel` fires; `None` means cancelled.
pub async fn cancellable<F>(cancel: &CancellationToken, future: F) -> Option<F::Output>
where
    F: Future,
{
    if cancel.is_cancelled() {
        return None;
    }

    let cancelled = cancel.cancelled();
    pin_mut!(future);
    pin_mut!(cancelled);

    match select(future, cancelled).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

pub async fn execute_with_retry<T, Op, OpFuture, Sleep, SleepFuture>(
    provider: &str,
    operation: &str,
    policies: &RetryPolicies,
    hooks: &dyn ProviderOperationHooks,
    cancel: &CancellationToken,
    mut execute: Op,
    mut sleep: Sleep,
) -> Result<T, ProviderError>
where
    Op: FnMut(u32) -> OpFuture,
    OpFuture: Future<Output = Result<T, ProviderError>>,
    Sleep: FnMut(Duration) -> SleepFuture,
    SleepFuture: Future<Output = ()>,
{
    let mut attempt = 1;
    let mut rate_limit_retries = 0;
    let mut server_error_retries = 0;

    loop {
        if cancel.is_cancelled() {
            hooks.on_cancelled(provider, operation, attempt - 1);
            return Err(ProviderError::cancelled());
        }

        hooks.on_attempt_start(provider, operation, attempt);

        let error = match cancellable(cancel, execute(attempt)).await {
            None => {
                hooks.on_cancelled(provider, operation, attempt);
                return Err(ProviderError::cancelled());
            }
            Some(Ok(value)) => {
                hooks.on_success(provider, operation, attempt);
                return Ok(value);
            }
            Some(Err(error)) if error.is_cancelled() => {
                hooks.on_cancelled(provider, operation, attempt);
                return Err(error);
            }
            Some(Err(error)) => error,
        };

        let retry = RetryPolicies::classify(&error).and_then(|class| {
            let used = match class {
                RetryClass::RateLimited => &mut rate_limit_retries,
                RetryClass::ServerError => &mut server_error_retries,
            };
            let policy = policies.policy(class);
            (*used < policy.max_retries).then(|| {
                *used += 1;
                policy.backoff_for_retry(*used)
            })
        });

        let Some(delay) = retry else {
            hooks.on_failure(provider, operation, attempt, &error);
            return Err(error);
        };

        hooks.on_retry_scheduled(provider, operation, attempt, delay, &error);
        if cancellable(cancel, sleep(delay)).await.is_none() {
            hooks.on_cancelled(provider, operation, attempt);
            return Err(ProviderError::cancelled());
        }
        attempt += 1;
    }
}

/// [`execute_with_retry`] with a real timer.
pub async fn with_retry<T, Op, OpFuture>(
    provider: &str,
    operation: &str,
    policies: &RetryPolicies,
    hooks: &dyn ProviderOperationHooks,
    cancel: &CancellationToken,
    execute: Op,
) -> Result<T, ProviderError>
where
    Op: FnMut(u32) -> OpFuture,
    OpFuture: Future<Output = Result<T, ProviderError>>,
{
    execute_with_retry(
        provider,
        operation,
        policies,
        hooks,
        cancel,
        execute,
        futures_timer::Delay::new,
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::ProviderErrorKind;

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl RecordingHooks {
        fn push(&self, event: String) {
            self.events.lock().expect("events lock").push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().expect("events lock").clone()
        }
    }

    impl ProviderOperationHooks for RecordingHooks {
        fn on_attempt_start(&self, provider: &str, operation: &str, attempt: u32) {
            self.push(format!("start:{provider}:{operation}:{attempt}"));
        }

        fn on_retry_scheduled(
            &self,
            provider: &str,
            operation: &str,
            attempt: u32,
            delay: Duration,
            _error: &ProviderError,
        ) {
            self.push(format!(
                "retry:{provider}:{operation}:{attempt}:{}",
                delay.as_millis()
            ));
        }

        fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
            self.push(format!("success:{provider}:{operation}:{attempts}"));
        }

        fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &ProviderError) {
            self.push(format!(
                "failure:{provider}:{operation}:{attempts}:{:?}",
                error.kind
            ));
        }

        fn on_cancelled(&self, provider: &str, operation: &str, attempts: u32) {
            self.push(format!("cancelled:{provider}:{operation}:{attempts}"));
        }
    }

    fn recording_sleep(
        sleeps: &Arc<Mutex<Vec<Duration>>>,
    ) -> impl FnMut(Duration) -> std::future::Ready<()> + use<> {
        let sleeps = Arc::clone(sleeps);
        move |delay| {
            sleeps.lock().expect("sleep lock").push(delay);
            std::future::ready(())
        }
    }

    #[test]
    fn backoff_doubles_from_initial_delay() {
        let policy = RetryPolicy::rate_limit();
        assert_eq!(policy.backoff_for_retry(1), Duration::from_millis(8000));
        assert_eq!(policy.backoff_for_retry(2), Duration::from_millis(16000));
        assert_eq!(policy.backoff_for_retry(3), Duration::from_millis(32000));
        assert_eq!(policy.backoff_for_retry(4), Duration::from_millis(64000));

        let policy = RetryPolicy::server_error();
        assert_eq!(policy.backoff_for_retry(2), Duration::from_millis(10000));
    }

    #[test]
    fn classify_uses_extracted_status() {
        assert_eq!(
            RetryPolicies::classify(&ProviderError::rate_limited("slow down")),
            Some(RetryClass::RateLimited)
        );
        assert_eq!(
            RetryPolicies::classify(&ProviderError::transport("upstream status 502")),
            Some(RetryClass::ServerError)
        );
        assert_eq!(
            RetryPolicies::classify(&ProviderError::from_status(400, "bad")),
            None
        );
        assert_eq!(RetryPolicies::classify(&ProviderError::timeout("slow")), None);
    }

    #[tokio::test]
    async fn rate_limited_calls_back_off_then_succeed() {
        let hooks = RecordingHooks::default();
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let result = execute_with_retry(
            "openai",
            "complete",
            &RetryPolicies::default(),
            &hooks,
            &cancel,
            |attempt| async move {
                if attempt <= 3 {
                    Err(ProviderError::from_status(429, "rate limited"))
                } else {
                    Ok("ok")
                }
            },
            recording_sleep(&sleeps),
        )
        .await;

        assert_eq!(result.expect("fourth attempt should succeed"), "ok");
        assert_eq!(
            *sleeps.lock().expect("sleep lock"),
            vec![
                Duration::from_millis(8000),
                Duration::from_millis(16000),
                Duration::from_millis(32000),
            ]
        );
        assert!(hooks.events().contains(&"success:openai:complete:4".to_string()));
    }

    #[tokio::test]
    async fn server_errors_exhaust_their_own_budget() {
        let hooks = RecordingHooks::default();
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let calls = Arc::new(Mutex::new(0_u32));

        let result = execute_with_retry::<(), _, _, _, _>(
            "anthropic",
            "stream",
            &RetryPolicies::default(),
            &hooks,
            &cancel,
            {
                let calls = Arc::clone(&calls);
                move |_| {
                    *calls.lock().expect("calls lock") += 1;
                    async { Err(ProviderError::from_status(503, "overloaded")) }
                }
            },
            recording_sleep(&sleeps),
        )
        .await;

        let error = result.expect_err("server errors should surface after retries");
        assert_eq!(error.status_code(), Some(503));
        assert_eq!(*calls.lock().expect("calls lock"), 3);
        assert_eq!(
            *sleeps.lock().expect("sleep lock"),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert!(hooks.events().contains(&"failure:anthropic:stream:3:Unavailable".to_string()));
    }

    #[tokio::test]
    async fn other_errors_propagate_immediately() {
        let hooks = RecordingHooks::default();
        let cancel = CancellationToken::new();

        let result = execute_with_retry::<(), _, _, _, _>(
            "openai",
            "complete",
            &RetryPolicies::default(),
            &hooks,
            &cancel,
            |_| async { Err(ProviderError::from_status(401, "bad key")) },
            |_| async {},
        )
        .await;

        let error = result.expect_err("auth error should fail");
        assert_eq!(error.kind, ProviderErrorKind::Authentication);
        assert_eq!(
            hooks.events(),
            vec![
                "start:openai:complete:1".to_string(),
                "failure:openai:complete:1:Authentication".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_during_delay_aborts_without_further_attempts() {
        let hooks = RecordingHooks::default();
        let cancel = CancellationToken::new();
        let calls = Arc::new(Mutex::new(0_u32));

        let result = execute_with_retry::<(), _, _, _, _>(
            "openai",
            "complete",
            &RetryPolicies::default(),
            &hooks,
            &cancel,
            {
                let calls = Arc::clone(&calls);
                move |_| {
                    *calls.lock().expect("calls lock") += 1;
                    async { Err(ProviderError::from_status(429, "rate limited")) }
                }
            },
            {
                let cancel = cancel.clone();
                move |_| {
                    cancel.cancel();
                    futures_util::future::pending::<()>()
                }
            },
        )
        .await;

        let error = result.expect_err("cancelled wait should abort");
        assert!(error.is_cancelled());
        assert_eq!(*calls.lock().expect("calls lock"), 1);
        assert!(hooks.events().contains(&"cancelled:openai:complete:1".to_string()));
    }

    #[tokio::test]
    async fn already_cancelled_token_never_calls_provider() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(Mutex::new(0_u32));

        let result = with_retry(
            "openai",
            "complete",
            &RetryPolicies::default(),
            &NoopOperationHooks,
            &cancel,
            {
                let calls = Arc::clone(&calls);
                move |_| {
                    *calls.lock().expect("calls lock") += 1;
                    async { Ok::<(), ProviderError>(()) }
                }
            },
        )
        .await;

        assert!(result.expect_err("should abort").is_cancelled());
        assert_eq!(*calls.lock().expect("calls lock"), 0);
    }
}
