//! HTTP client for the remote analysis service.

use async_trait::async_trait;
use futures_util::StreamExt;
use pulse_common::{Error, RemoteConfig, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// A text completion service used by the remote analyzer.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    fn name(&self) -> &str;

    /// Send one prompt and return the model's text answer.
    ///
    /// Rate limits, quota exhaustion and timeouts must surface as
    /// [`Error::RateLimited`], [`Error::QuotaExceeded`] and [`Error::Timeout`].
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Map a non-success HTTP status to the error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> Error {
    let lowered = body.to_lowercase();
    let mentions_quota = ["quota", "billing", "insufficient"]
        .iter()
        .any(|needle| lowered.contains(needle));

    match status {
        StatusCode::TOO_MANY_REQUESTS if mentions_quota => Error::QuotaExceeded(body.to_string()),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited(body.to_string()),
        StatusCode::PAYMENT_REQUIRED => Error::QuotaExceeded(body.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Error::Timeout,
        _ => Error::External(format!("HTTP {}: {}", status, body)),
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::External(format!("request failed: {e}"))
    }
}

/// Map an in-band `{"error": {...}}` payload to the error taxonomy.
fn classify_error_payload(error: &Value) -> Error {
    let code = error
        .get("code")
        .or_else(|| error.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(code)
        .to_string();

    match code {
        "insufficient_quota" | "billing_hard_limit_reached" => Error::QuotaExceeded(message),
        "rate_limit_exceeded" => Error::RateLimited(message),
        _ => Error::External(message),
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct HttpAnalysisService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    stream: bool,
}

impl HttpAnalysisService {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            stream: config.stream,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn read_message(response: reqwest::Response) -> Result<String> {
        let body: Value = response.json().await.map_err(map_transport_error)?;
        if let Some(error) = body.get("error") {
            return Err(classify_error_payload(error));
        }
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::MalformedResponse("response has no message content".into()))
    }

    /// Accumulate `choices[0].delta.content` from an SSE body until `[DONE]`
    /// or the end of the stream.
    async fn read_stream(response: reqwest::Response) -> Result<String> {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_transport_error)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].to_string();
                buffer = buffer[pos + 2..].to_string();
                if apply_sse_event(&event, &mut content)? {
                    return Ok(content);
                }
            }
        }

        if !buffer.trim().is_empty() {
            apply_sse_event(&buffer, &mut content)?;
        }
        Ok(content)
    }
}

/// Apply one SSE event to the accumulated content. Returns true on `[DONE]`.
fn apply_sse_event(event: &str, content: &mut String) -> Result<bool> {
    for line in event.lines() {
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(true);
        }

        let Ok(value) = serde_json::from_str::<Value>(data) else {
            debug!(data, "Skipping unparseable stream event");
            continue;
        };
        if let Some(error) = value.get("error") {
            return Err(classify_error_payload(error));
        }
        if let Some(delta) = value.pointer("/choices/0/delta/content").and_then(Value::as_str) {
            content.push_str(delta);
        }
    }
    Ok(false)
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": self.stream,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        if self.stream {
            Self::read_stream(response).await
        } else {
            Self::read_message(response).await
        }
    }
}

impl std::fmt::Debug for HttpAnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalysisService")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("stream", &self.stream)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_rate_limited());
        assert!(classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":"insufficient_quota","message":"check your billing"}}"#
        )
        .is_quota_exceeded());
        assert!(classify_status(StatusCode::PAYMENT_REQUIRED, "").is_quota_exceeded());
        assert!(classify_status(StatusCode::GATEWAY_TIMEOUT, "").is_timeout());

        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert!(!err.is_abort());
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_sse_event_accumulates_and_stops() {
        let mut content = String::new();
        let done = apply_sse_event(
            "data: {\"choices\":[{\"delta\":{\"content\":\"[{\\\"index\\\"\"}}]}",
            &mut content,
        )
        .unwrap();
        assert!(!done);
        assert_eq!(content, "[{\"index\"");

        assert!(apply_sse_event("data: [DONE]", &mut content).unwrap());
        assert!(!apply_sse_event(": keep-alive", &mut content).unwrap());
    }

    #[test]
    fn test_sse_error_event() {
        let mut content = String::new();
        let err = apply_sse_event(
            r#"data: {"error":{"code":"rate_limit_exceeded","message":"too fast"}}"#,
            &mut content,
        )
        .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = RemoteConfig {
            base_url: "http://localhost:8080/v1/".into(),
            ..RemoteConfig::default()
        };
        let service = HttpAnalysisService::new(&config).unwrap();
        assert_eq!(service.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
