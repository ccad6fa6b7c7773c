//! Resilient invoker: timeout, retry with backoff, cancellation.
//!
//! Wraps a single backend call made through a [`ProtocolGateway`] and folds
//! the attempt sequence into one [`InvocationResult`].
//!
//! # Lifecycle
//!
//! ```text
//! Idle → Attempting ─┬─ Ok ─────────────────────→ Succeeded
//!                    ├─ permanent error ────────→ PermanentlyFailed
//!                    ├─ transient, budget left ─→ RetryScheduled → Attempting
//!                    ├─ transient, budget spent → RetriesExhausted
//!                    └─ cancel observed ────────→ Cancelled
//! ```
//!
//! Delay before retry `n` (1 for the first retry) is `base * 2^(n-1)`, capped
//! by the policy's maximum. Nothing starts after cancellation is observed;
//! an in-flight call is dropped and its result discarded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::error::{ErrorKind, RouterError};
use crate::gateway::ProtocolGateway;
use crate::prompts;
use crate::query::Query;
use crate::registry::BackendProfile;

/// Per-request invocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Idle,
    Attempting,
    RetryScheduled,
    Succeeded,
    PermanentlyFailed,
    RetriesExhausted,
    Cancelled,
}

impl InvocationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::PermanentlyFailed | Self::RetriesExhausted | Self::Cancelled
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Attempting => write!(f, "attempting"),
            Self::RetryScheduled => write!(f, "retry_scheduled"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::PermanentlyFailed => write!(f, "permanently_failed"),
            Self::RetriesExhausted => write!(f, "retries_exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure { kind: ErrorKind, message: String },
}

/// Record of one try against the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationAttempt {
    /// 1-based.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub latency: Duration,
    pub outcome: AttemptOutcome,
}

/// Terminal result of an invocation.
#[derive(Debug)]
pub struct InvocationResult {
    pub state: InvocationState,
    pub outcome: Result<String, RouterError>,
    pub attempts: Vec<InvocationAttempt>,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Timeout/retry/backoff wrapper around a [`ProtocolGateway`].
#[derive(Clone)]
pub struct ResilientInvoker {
    gateway: Arc<dyn ProtocolGateway>,
    policy: RetryPolicy,
}

impl ResilientInvoker {
    pub fn new(gateway: Arc<dyn ProtocolGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn gateway(&self) -> &Arc<dyn ProtocolGateway> {
        &self.gateway
    }

    /// Invoke without an external cancellation source.
    pub async fn invoke(&self, profile: &BackendProfile, query: &Query) -> InvocationResult {
        self.invoke_with_cancel(profile, query, &CancellationToken::new())
            .await
    }

    /// Invoke, abandoning further work once `cancel` fires.
    pub async fn invoke_with_cancel(
        &self,
        profile: &BackendProfile,
        query: &Query,
        cancel: &CancellationToken,
    ) -> InvocationResult {
        let arguments = call_arguments(profile, query);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts: Vec<InvocationAttempt> = Vec::with_capacity(max_attempts as usize);
        let mut state = InvocationState::Idle;
        let mut attempt_number: u32 = 0;

        loop {
            if attempt_number > 0 {
                let delay = self.policy.backoff_for_retry(attempt_number);
                transition(&mut state, InvocationState::RetryScheduled, attempt_number);
                tracing::debug!(
                    tool = %profile.tool_name,
                    next_attempt = attempt_number + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retry scheduled"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return finish_cancelled(state, attempts);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if cancel.is_cancelled() {
                return finish_cancelled(state, attempts);
            }

            attempt_number += 1;
            transition(&mut state, InvocationState::Attempting, attempt_number);
            let started_at = Utc::now();
            let clock = Instant::now();

            let call = tokio::time::timeout(
                profile.timeout,
                self.gateway
                    .call_tool(&profile.tool_name, arguments.clone(), profile.timeout),
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = call => Some(match res {
                    Ok(Ok(payload)) => Ok(payload),
                    Ok(Err(e)) => Err(RouterError::Protocol(e)),
                    Err(_) => Err(RouterError::Timeout(profile.timeout)),
                }),
            };
            let latency = clock.elapsed();

            let Some(result) = result else {
                attempts.push(InvocationAttempt {
                    attempt_number,
                    started_at,
                    latency,
                    outcome: AttemptOutcome::Failure {
                        kind: ErrorKind::Cancelled,
                        message: "cancelled while in flight".to_string(),
                    },
                });
                return finish_cancelled(state, attempts);
            };

            match result {
                Ok(payload) => {
                    tracing::info!(
                        category = %profile.category,
                        tool = %profile.tool_name,
                        model = %profile.model_id,
                        attempt = attempt_number,
                        outcome = "success",
                        latency_ms = latency.as_millis() as u64,
                        "backend call succeeded"
                    );
                    attempts.push(InvocationAttempt {
                        attempt_number,
                        started_at,
                        latency,
                        outcome: AttemptOutcome::Success,
                    });
                    transition(&mut state, InvocationState::Succeeded, attempt_number);
                    return InvocationResult {
                        state,
                        outcome: Ok(payload),
                        attempts,
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        category = %profile.category,
                        tool = %profile.tool_name,
                        model = %profile.model_id,
                        attempt = attempt_number,
                        outcome = %err.kind(),
                        transient = err.is_transient(),
                        latency_ms = latency.as_millis() as u64,
                        error = %err,
                        "backend call failed"
                    );
                    attempts.push(InvocationAttempt {
                        attempt_number,
                        started_at,
                        latency,
                        outcome: AttemptOutcome::Failure {
                            kind: err.kind(),
                            message: err.to_string(),
                        },
                    });

                    if !err.is_transient() {
                        transition(&mut state, InvocationState::PermanentlyFailed, attempt_number);
                        return InvocationResult {
                            state,
                            outcome: Err(err),
                            attempts,
                        };
                    }

                    if attempt_number >= max_attempts {
                        transition(&mut state, InvocationState::RetriesExhausted, attempt_number);
                        return InvocationResult {
                            state,
                            outcome: Err(RouterError::RetriesExhausted {
                                attempts: attempt_number,
                                last: Box::new(err),
                            }),
                            attempts,
                        };
                    }
                }
            }
        }
    }
}

fn transition(state: &mut InvocationState, next: InvocationState, attempt: u32) {
    tracing::trace!(from = %state, to = %next, attempt, "invocation state");
    *state = next;
}

fn finish_cancelled(
    mut state: InvocationState,
    attempts: Vec<InvocationAttempt>,
) -> InvocationResult {
    let attempt = attempts.len() as u32;
    transition(&mut state, InvocationState::Cancelled, attempt);
    tracing::info!(attempts = attempt, "invocation cancelled by caller");
    InvocationResult {
        state,
        outcome: Err(RouterError::Cancelled),
        attempts,
    }
}

/// Arguments object sent with every attempt for `profile`.
pub fn call_arguments(profile: &BackendProfile, query: &Query) -> serde_json::Value {
    serde_json::json!({
        "model": profile.model_id,
        "max_tokens": profile.max_tokens,
        "temperature": profile.temperature,
        "system_prompt": prompts::system_prompt(profile.category),
        "text": query.text,
        "images": query.image_refs().collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TaskCategory;
    use crate::error::ProtocolError;
    use crate::gateway::ToolDescriptor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed script of results, then succeeds.
    struct ScriptedGateway {
        script: Mutex<Vec<Result<String, ProtocolError>>>,
        calls: Mutex<Vec<Instant>>,
        seen_args: Mutex<Vec<serde_json::Value>>,
    }

    impl ScriptedGateway {
        fn new(mut script: Vec<Result<String, ProtocolError>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
                seen_args: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl ProtocolGateway for ScriptedGateway {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProtocolError> {
            Ok(Vec::new())
        }

        async fn call_tool(
            &self,
            _name: &str,
            arguments: serde_json::Value,
            _timeout: Duration,
        ) -> Result<String, ProtocolError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.seen_args.lock().unwrap().push(arguments);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("fallthrough".to_string()))
        }
    }

    struct SlowGateway {
        delay: Duration,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ProtocolGateway for SlowGateway {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProtocolError> {
            Ok(Vec::new())
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: serde_json::Value,
            _timeout: Duration,
        ) -> Result<String, ProtocolError> {
            *self.calls.lock().unwrap() += 1;
            tokio::time::sleep(self.delay).await;
            Ok("late".to_string())
        }
    }

    fn profile() -> BackendProfile {
        BackendProfile::new(TaskCategory::MathCode, "math-model")
            .with_timeout(Duration::from_secs(10))
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            Duration::from_secs(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_try() {
        let gw = ScriptedGateway::new(vec![Ok("42".into())]);
        let invoker = ResilientInvoker::new(gw.clone(), policy(3));
        let result = invoker.invoke(&profile(), &Query::new("6 * 7")).await;

        assert_eq!(result.state, InvocationState::Succeeded);
        assert_eq!(result.outcome.unwrap(), "42");
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].outcome, AttemptOutcome::Success);
        assert_eq!(gw.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_then_success_with_growing_backoff() {
        let gw = ScriptedGateway::new(vec![
            Err(ProtocolError::connectivity("reset")),
            Err(ProtocolError::rate_limit("429")),
            Ok("done".into()),
        ]);
        let invoker = ResilientInvoker::new(gw.clone(), policy(4));
        let result = invoker.invoke(&profile(), &Query::new("q")).await;

        assert_eq!(result.state, InvocationState::Succeeded);
        assert_eq!(result.attempt_count(), 3);
        let gaps = gw.gaps();
        let policy = invoker.policy();
        assert_eq!(
            gaps,
            vec![policy.backoff_for_retry(1), policy.backoff_for_retry(2)]
        );
        assert_eq!(gaps[0], Duration::from_millis(100));
        assert!(gaps[1] > gaps[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_exhausts_budget() {
        let gw = ScriptedGateway::new(vec![
            Err(ProtocolError::server_fault("502")),
            Err(ProtocolError::server_fault("503")),
            Err(ProtocolError::server_fault("504")),
            Err(ProtocolError::server_fault("never reached")),
        ]);
        let invoker = ResilientInvoker::new(gw.clone(), policy(3));
        let result = invoker.invoke(&profile(), &Query::new("q")).await;

        assert_eq!(result.state, InvocationState::RetriesExhausted);
        assert_eq!(gw.call_count(), 3);
        match result.outcome {
            Err(RouterError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("504"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let gw = ScriptedGateway::new(vec![Err(ProtocolError::auth("bad key"))]);
        let invoker = ResilientInvoker::new(gw.clone(), policy(5));
        let result = invoker.invoke(&profile(), &Query::new("q")).await;

        assert_eq!(result.state, InvocationState::PermanentlyFailed);
        assert_eq!(gw.call_count(), 1);
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::Auth);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_transient_attempt() {
        let gw = Arc::new(SlowGateway {
            delay: Duration::from_secs(60),
            calls: Mutex::new(0),
        });
        let invoker = ResilientInvoker::new(gw.clone(), policy(2));
        let profile = profile().with_timeout(Duration::from_secs(1));
        let result = invoker.invoke(&profile, &Query::new("q")).await;

        assert_eq!(result.state, InvocationState::RetriesExhausted);
        assert_eq!(*gw.calls.lock().unwrap(), 2);
        assert_eq!(
            result.outcome.unwrap_err().root_cause().kind(),
            ErrorKind::Timeout
        );
        for attempt in &result.attempts {
            assert!(matches!(
                attempt.outcome,
                AttemptOutcome::Failure {
                    kind: ErrorKind::Timeout,
                    ..
                }
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_retries() {
        let gw = ScriptedGateway::new(vec![
            Err(ProtocolError::connectivity("down")),
            Ok("too late".into()),
        ]);
        let invoker = ResilientInvoker::new(
            gw.clone(),
            RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(5)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = invoker
            .invoke_with_cancel(&profile(), &Query::new("q"), &cancel)
            .await;

        assert_eq!(result.state, InvocationState::Cancelled);
        assert!(matches!(result.outcome, Err(RouterError::Cancelled)));
        assert_eq!(gw.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_makes_no_attempt() {
        let gw = ScriptedGateway::new(vec![Ok("x".into())]);
        let invoker = ResilientInvoker::new(gw.clone(), policy(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = invoker
            .invoke_with_cancel(&profile(), &Query::new("q"), &cancel)
            .await;

        assert_eq!(result.state, InvocationState::Cancelled);
        assert!(result.attempts.is_empty());
        assert_eq!(gw.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_discards_in_flight_attempt() {
        let gw = Arc::new(SlowGateway {
            delay: Duration::from_secs(5),
            calls: Mutex::new(0),
        });
        let invoker = ResilientInvoker::new(gw.clone(), policy(3));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = invoker
            .invoke_with_cancel(&profile(), &Query::new("q"), &cancel)
            .await;

        assert_eq!(result.state, InvocationState::Cancelled);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(*gw.calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn arguments_carry_profile_and_images() {
        let gw = ScriptedGateway::new(vec![Ok("ok".into())]);
        let invoker = ResilientInvoker::new(gw.clone(), policy(1));
        let profile = BackendProfile::new(TaskCategory::VisionLanguage, "vision-model")
            .with_max_tokens(512);
        let query = Query::new("what is this").with_image("https://x.io/a.png");
        invoker.invoke(&profile, &query).await;

        let args = gw.seen_args.lock().unwrap()[0].clone();
        assert_eq!(args["model"], "vision-model");
        assert_eq!(args["max_tokens"], 512);
        assert_eq!(args["text"], "what is this");
        assert_eq!(args["images"][0], "https://x.io/a.png");
        assert!(args["system_prompt"].as_str().unwrap().contains("image"));
    }

    #[test]
    fn terminal_states() {
        assert!(!InvocationState::Idle.is_terminal());
        assert!(!InvocationState::Attempting.is_terminal());
        assert!(!InvocationState::RetryScheduled.is_terminal());
        assert!(InvocationState::Succeeded.is_terminal());
        assert!(InvocationState::PermanentlyFailed.is_terminal());
        assert!(InvocationState::RetriesExhausted.is_terminal());
        assert!(InvocationState::Cancelled.is_terminal());
    }
}
