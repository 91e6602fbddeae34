//! The rate-limited gateway: the single path from workers to the hosting API.
//!
//! Every request goes through [`Gateway::call`], which
//! 1. reserves a slot from the shared [`RateLimitState`], sleeping until the
//!    reset instant when the budget is spent;
//! 2. sends the request over the [`Transport`];
//! 3. folds the response headers back into the shared state;
//! 4. classifies the outcome and either returns, retries, or gives up.
//!
//! The state mutex is never held across a sleep or a request.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::rate_limit::{self, RateLimitState, Reservation, DEFAULT_RATE_LIMIT_PAUSE};
use crate::retry::RetryPolicy;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

pub struct Gateway<T> {
    transport: T,
    retry: RetryPolicy,
    state: Mutex<RateLimitState>,
}

impl<T: Transport> Gateway<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self::with_rate_limit(transport, retry, RateLimitState::unknown(Instant::now()))
    }

    /// Start from a known budget, for example one restored from a prior call.
    pub fn with_rate_limit(transport: T, retry: RetryPolicy, state: RateLimitState) -> Self {
        Self {
            transport,
            retry,
            state: Mutex::new(state),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Snapshot of the shared budget.
    pub async fn rate_limit(&self) -> RateLimitState {
        *self.state.lock().await
    }

    /// Resolve once the budget is not exhausted. Does not reserve a slot.
    pub async fn wait_for_capacity(&self) {
        loop {
            let wait = {
                let state = self.state.lock().await;
                let now = Instant::now();
                if !state.is_exhausted(now) {
                    return;
                }
                state.reset_at - now
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Send `request`, honouring the shared budget and retrying per class.
    pub async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, GatewayError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.acquire_slot(request.operation).await;

            let err = match self.transport.send(request).await {
                Ok(response) => match self.settle(request.operation, response).await {
                    Ok(response) => return Ok(response),
                    Err(err) => err,
                },
                Err(transport_err) => {
                    self.state.lock().await.record_failure();
                    from_transport(request.operation, transport_err)
                }
            };

            if let GatewayError::Permanent { .. } | GatewayError::InvalidResponse { .. } = err {
                tracing::debug!(operation = request.operation, error = %err, "permanent failure");
                return Err(err);
            }
            if attempt >= self.retry.max_attempts {
                tracing::warn!(
                    operation = request.operation,
                    attempts = attempt,
                    error = %err,
                    "retries exhausted",
                );
                return Err(GatewayError::Exhausted {
                    operation: request.operation,
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            match &err {
                GatewayError::RateLimited { .. } => {
                    // The penalty is already in the shared state; the next
                    // acquire_slot sleeps until it lifts.
                    tracing::info!(
                        operation = request.operation,
                        attempt,
                        "rate limited, waiting for reset",
                    );
                }
                _ => {
                    let delay = self.retry.delay(attempt);
                    tracing::info!(
                        operation = request.operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off",
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn acquire_slot(&self, operation: &'static str) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                match state.reserve(Instant::now()) {
                    Reservation::Go => return,
                    Reservation::Wait(wait) => wait,
                }
            };
            tracing::debug!(operation, wait_ms = wait.as_millis() as u64, "rate budget spent");
            tokio::time::sleep(wait).await;
        }
    }

    /// Fold `response` into the shared state and classify it.
    async fn settle(
        &self,
        operation: &'static str,
        response: ApiResponse,
    ) -> Result<ApiResponse, GatewayError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.observe(&response, now);
        match classify(operation, &response) {
            None => {
                state.record_success();
                Ok(response)
            }
            Some(err) => {
                match &err {
                    GatewayError::RateLimited { retry_after, .. } => {
                        let pause = retry_after.unwrap_or(if state.reset_at > now {
                            Duration::ZERO
                        } else {
                            DEFAULT_RATE_LIMIT_PAUSE
                        });
                        state.penalize(now, pause);
                    }
                    GatewayError::Transient { .. } => state.record_failure(),
                    _ => {}
                }
                Err(err)
            }
        }
    }
}

/// Map a response to an error, or `None` for success.
///
/// 2xx succeeds. 429, and 403 carrying a rate-limit signal, are rate limits.
/// Other 4xx are permanent. 5xx are transient.
pub fn classify(operation: &'static str, response: &ApiResponse) -> Option<GatewayError> {
    let status = response.status;
    match status {
        200..=299 => None,
        429 => Some(rate_limited(operation, response)),
        403 if is_secondary_rate_limit(response) => Some(rate_limited(operation, response)),
        500..=599 => Some(GatewayError::Transient {
            operation,
            status: Some(status),
            message: response.message(),
        }),
        _ => Some(GatewayError::Permanent {
            operation,
            status,
            message: response.message(),
        }),
    }
}

fn is_secondary_rate_limit(response: &ApiResponse) -> bool {
    response.header("retry-after").is_some()
        || response.header("x-ratelimit-remaining") == Some("0")
        || response.message().to_ascii_lowercase().contains("rate limit")
}

fn rate_limited(operation: &'static str, response: &ApiResponse) -> GatewayError {
    GatewayError::RateLimited {
        operation,
        message: response.message(),
        retry_after: rate_limit::retry_after(response),
    }
}

fn from_transport(operation: &'static str, err: TransportError) -> GatewayError {
    GatewayError::Transient {
        operation,
        status: None,
        message: err.to_string(),
    }
}
