use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use dealsignal_common::config::HttpSettings;
use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::CancelFlag;

use crate::limiter::RateLimiter;
use crate::retry::RetryPolicy;

/// Outcome class of one HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptClass {
    Ok,
    /// Network failure, 429, or 5xx. Worth another attempt.
    Retryable,
    /// 4xx (other than 429), auth failure, malformed request. Stop now.
    Permanent,
}

pub(crate) fn classify_status(status: StatusCode) -> AttemptClass {
    if status.is_success() {
        AttemptClass::Ok
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AttemptClass::Retryable
    } else {
        AttemptClass::Permanent
    }
}

/// All outbound HTTP for the pipeline: token-bucket limited per
/// `(source_api, endpoint_group)`, retried per policy, cancellable.
#[derive(Clone)]
pub struct RateLimitedClient {
    http: reqwest::Client,
    limiter: std::sync::Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(settings: &HttpSettings, limiter: RateLimiter) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent("dealsignal/0.1")
            .build()
            .map_err(|e| PipelineError::Permanent(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            limiter: std::sync::Arc::new(limiter),
            policy: RetryPolicy::from_settings(settings),
        })
    }

    /// The underlying reqwest client, for building requests to pass to
    /// [`execute`](Self::execute).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Acquire a token, send, retry transient failures per policy.
    ///
    /// The request must be cloneable (no streaming bodies). Returns the
    /// first successful response; classifies everything else into
    /// `Transient` (retries exhausted), `Permanent`, or `Cancelled`.
    pub async fn execute(
        &self,
        source: &str,
        group: &str,
        cancel: &CancelFlag,
        request: RequestBuilder,
    ) -> Result<Response> {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            self.limiter.acquire(source, group, cancel).await?;

            let req = request.try_clone().ok_or_else(|| {
                PipelineError::Permanent("request body is not cloneable for retry".to_string())
            })?;

            let retry_after = match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    match classify_status(status) {
                        AttemptClass::Ok => return Ok(response),
                        AttemptClass::Permanent => {
                            let body = response.text().await.unwrap_or_default();
                            return Err(PipelineError::Permanent(format!(
                                "HTTP {status}: {}",
                                truncate(&body, 300)
                            )));
                        }
                        AttemptClass::Retryable => {
                            let retry_after = parse_retry_after(&response);
                            last_error = format!("HTTP {status}");
                            warn!(source, group, attempt, status = %status, "Retryable HTTP failure");
                            retry_after
                        }
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(source, group, attempt, error = %e, "Request error");
                    None
                }
            };

            if attempt < self.policy.max_attempts {
                let delay = self.policy.next_delay(attempt, retry_after);
                debug!(source, group, attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }
        }

        Err(PipelineError::Transient {
            attempts: self.policy.max_attempts,
            message: last_error,
        })
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        source: &str,
        group: &str,
        cancel: &CancelFlag,
        url: &str,
    ) -> Result<T> {
        let response = self
            .execute(source, group, cancel, self.http.get(url))
            .await?;
        response
            .json()
            .await
            .map_err(|e| PipelineError::Permanent(format!("malformed body from {url}: {e}")))
    }

    /// GET a body as text, returned with its provenance hash.
    pub async fn get_text(
        &self,
        source: &str,
        group: &str,
        cancel: &CancelFlag,
        url: &str,
    ) -> Result<(String, String)> {
        let response = self
            .execute(source, group, cancel, self.http.get(url))
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Permanent(format!("unreadable body from {url}: {e}")))?;
        let hash = dealsignal_common::response_hash(&body);
        Ok((body, hash))
    }

    /// HEAD probe for health checks. Success = any non-5xx answer.
    pub async fn head_ok(&self, source: &str, cancel: &CancelFlag, url: &str) -> Result<bool> {
        match self.execute(source, "ping", cancel, self.http.head(url)).await {
            Ok(_) => Ok(true),
            Err(PipelineError::Permanent(_)) => Ok(true), // server answered; that's alive
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(_) => Ok(false),
        }
    }
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_are_ok() {
        assert_eq!(classify_status(StatusCode::OK), AttemptClass::Ok);
        assert_eq!(classify_status(StatusCode::CREATED), AttemptClass::Ok);
    }

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            AttemptClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            AttemptClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            AttemptClass::Retryable
        );
    }

    #[test]
    fn client_errors_are_permanent() {
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            AttemptClass::Permanent
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            AttemptClass::Permanent
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            AttemptClass::Permanent
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("hé", 10), "hé");
    }
}
