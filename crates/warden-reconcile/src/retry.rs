//! Bounded, fixed-delay retry around single platform calls.
//!
//! # Purpose
//! The platform API drops requests intermittently. Every outbound call the
//! reconciler makes goes through [`RetryableCaller`], which re-sends the same
//! request up to `attempts` times with a constant pause in between.
//!
//! # Key invariants
//! - The delay is fixed; there is no exponential growth and no jitter here.
//!   Rate-limit pacing is a separate concern handled by `Pacing`.
//! - Exhaustion returns `RetryExhausted` naming the operation and the number of
//!   attempts made.
//! - `call_once` never retries. Use it only for probes whose repetition would
//!   have side effects.
use crate::errors::{ReconcileError, ReconcileResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use warden_api::{ApiError, ApiRequest, PlatformApi};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Run `op` until it succeeds or `policy.attempts` attempts have failed.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> ReconcileResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => {
                return Err(ReconcileError::RetryExhausted {
                    operation: operation.to_string(),
                    attempts,
                    source: err,
                });
            }
            Err(err) => {
                tracing::warn!(
                    operation,
                    attempt,
                    attempts,
                    error = %err,
                    "platform call failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Clone)]
pub struct RetryableCaller {
    api: Arc<dyn PlatformApi>,
    policy: RetryPolicy,
}

impl RetryableCaller {
    pub fn new(api: Arc<dyn PlatformApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `request` with retries and decode the answer.
    pub async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: ApiRequest,
    ) -> ReconcileResult<T> {
        let value = retry(&self.policy, operation, || self.api.send(&request)).await?;
        decode(operation, value)
    }

    /// Send `request` with retries, discarding the answer.
    pub async fn execute(&self, operation: &str, request: ApiRequest) -> ReconcileResult<()> {
        retry(&self.policy, operation, || self.api.send(&request)).await?;
        Ok(())
    }

    /// Send `request` exactly once.
    pub async fn call_once(&self, operation: &str, request: ApiRequest) -> ReconcileResult<Value> {
        self.api
            .send(&request)
            .await
            .map_err(|source| ReconcileError::Remote {
                operation: operation.to_string(),
                source,
            })
    }
}

pub(crate) fn decode<T: DeserializeOwned>(operation: &str, value: Value) -> ReconcileResult<T> {
    serde_json::from_value(value).map_err(|source| ReconcileError::Decode {
        operation: operation.to_string(),
        source,
    })
}
