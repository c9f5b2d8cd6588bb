use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::GatewayError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body returned by the providers on 4xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// JSON-over-HTTP client shared by every outbound gateway, guarded by a
/// circuit breaker. Only transient failures (timeouts, transport errors,
/// 5xx) count against the breaker; business rejections do not.
#[derive(Clone)]
pub struct HttpGatewayClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpGatewayClient {
    /// Creates a client with a 30s timeout and a breaker opening after 3
    /// consecutive failures.
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT, failure_threshold, reset_timeout_secs)
    }

    pub fn with_timeout(
        base_url: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HttpGatewayClient {
            client,
            base_url,
            timeout,
            circuit_breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let body = self
            .execute(Method::GET, path, None, false)
            .await?
            .unwrap_or_default();
        decode(&body)
    }

    /// Like [`get_json`](Self::get_json) but maps 404 to `None`.
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, GatewayError> {
        match self.execute(Method::GET, path, None, true).await? {
            Some(body) => decode(&body).map(Some),
            None => Ok(None),
        }
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = encode(body)?;
        let body = self
            .execute(Method::POST, path, Some(payload), false)
            .await?
            .unwrap_or_default();
        decode(&body)
    }

    /// POST whose response body is ignored.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), GatewayError> {
        let payload = encode(body)?;
        self.execute(Method::POST, path, Some(payload), false).await?;
        Ok(())
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<serde_json::Value>,
        allow_missing: bool,
    ) -> Result<Option<String>, GatewayError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let client = self.client.clone();
        let timeout = self.timeout;

        let result = self
            .circuit_breaker
            .call_with(GatewayError::is_transient, async move {
                let mut request = client.request(method, &url);
                if let Some(payload) = payload {
                    request = request.json(&payload);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|e| transport_error(e, timeout))?;

                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| transport_error(e, timeout))?;

                if status.is_success() {
                    return Ok(Some(text));
                }
                if status == StatusCode::NOT_FOUND && allow_missing {
                    return Ok(None);
                }
                Err(status_error(status, &text))
            })
            .await;

        match result {
            Ok(body) => Ok(body),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen(self.base_url.clone())),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout(timeout)
    } else {
        GatewayError::Unavailable(error.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> GatewayError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return GatewayError::Unavailable(format!("HTTP {}", status.as_u16()));
    }
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|body| body.code.clone())
        .unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));
    let message = parsed
        .and_then(|body| body.message)
        .unwrap_or_else(|| body.to_string());
    GatewayError::Rejected { code, message }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, GatewayError> {
    serde_json::to_value(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, GatewayError> {
    // empty bodies decode as JSON null so `()` and `Option` responses work
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}
