//! Conversions API dispatcher
//!
//! Sends built conversion events to the Graph API events endpoint:
//! `POST {base_url}/{api_version}/{pixel_id}/events?access_token=...`
//!
//! `send_conversion_events` is the only call that returns an error. The
//! `fire_*` wrappers turn every outcome into a `SignalResult` so a failing
//! platform can never abort event processing.

use crate::infra::config::Config;
use crate::services::conversion::{
    build_audience_event, build_conversion_event, ConversionEventData, LeadEventInput, WireEvent,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

pub const NOT_CONFIGURED: &str = "CAPI not configured";

/// Platform acknowledgement for a batch
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CapiResponse {
    #[serde(default)]
    pub events_received: u64,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub fbtrace_id: String,
}

/// Typed platform failure. `code` is the platform error code, the HTTP status
/// when the platform sent none, or 0 for transport failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (code {code}, fbtrace_id {fbtrace_id:?})")]
pub struct CapiError {
    pub message: String,
    pub code: i64,
    pub fbtrace_id: String,
}

impl CapiError {
    fn transport(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: 0, fbtrace_id: String::new() }
    }
}

/// Outcome of a fire-and-forget dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct SignalResult {
    pub success: bool,
    pub error: Option<String>,
}

impl SignalResult {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }

    pub fn not_configured() -> Self {
        Self::failed(NOT_CONFIGURED)
    }

    pub fn is_not_configured(&self) -> bool {
        !self.success && self.error.as_deref() == Some(NOT_CONFIGURED)
    }
}

#[derive(Serialize)]
struct EventsRequest<'a> {
    data: Vec<WireEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_event_code: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<i64>,
    fbtrace_id: Option<String>,
}

/// Map a non-2xx response body onto `CapiError`, defaulting the code to the
/// HTTP status and the trace id to empty.
fn parse_error_body(status: u16, body: &str) -> CapiError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().and_then(|e| e.error);
    match parsed {
        Some(err) => CapiError {
            message: err.message.unwrap_or_else(|| format!("HTTP {}", status)),
            code: err.code.unwrap_or(i64::from(status)),
            fbtrace_id: err.fbtrace_id.unwrap_or_default(),
        },
        None => CapiError {
            message: format!("HTTP {}", status),
            code: i64::from(status),
            fbtrace_id: String::new(),
        },
    }
}

/// Log dispatch failure (cold path)
#[cold]
fn log_dispatch_failed(event_name: &str, event_id: &str, err: &CapiError) {
    error!(
        event_name = %event_name,
        event_id = %event_id,
        code = %err.code,
        fbtrace_id = %err.fbtrace_id,
        error = %err.message,
        "capi_dispatch_failed"
    );
}

pub struct CapiClient {
    pixel_id: Option<String>,
    access_token: Option<String>,
    test_event_code: Option<String>,
    base_url: String,
    api_version: String,
    // Created once for reuse (connection pooling)
    http_client: Option<reqwest::Client>,
}

impl CapiClient {
    pub fn new(config: &Config) -> Self {
        let http_client = reqwest::Client::builder().timeout(config.capi_timeout()).build().ok();

        Self {
            pixel_id: config.pixel_id().map(str::to_string),
            access_token: config.access_token().map(str::to_string),
            test_event_code: config.test_event_code().map(str::to_string),
            base_url: config.capi_base_url().trim_end_matches('/').to_string(),
            api_version: config.api_version().to_string(),
            http_client,
        }
    }

    /// Pixel id and access token both present
    pub fn is_configured(&self) -> bool {
        self.pixel_id.is_some() && self.access_token.is_some()
    }

    fn events_url(&self, pixel_id: &str) -> String {
        format!("{}/{}/{}/events", self.base_url, self.api_version, pixel_id)
    }

    /// Send a batch of events in one request
    pub async fn send_conversion_events(
        &self,
        pixel_id: &str,
        access_token: &str,
        events: &[ConversionEventData],
        test_event_code: Option<&str>,
    ) -> Result<CapiResponse, CapiError> {
        let Some(ref client) = self.http_client else {
            return Err(CapiError::transport("HTTP client not initialized"));
        };

        let body = EventsRequest {
            data: events.iter().map(ConversionEventData::to_wire).collect(),
            test_event_code,
        };

        let response = client
            .post(self.events_url(pixel_id))
            .query(&[("access_token", access_token)])
            .json(&body)
            .send()
            .await
            .map_err(|e| CapiError::transport(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CapiError::transport(e.to_string()))?;

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &text));
        }

        serde_json::from_str::<CapiResponse>(&text).map_err(|e| CapiError {
            message: format!("invalid response body: {}", e),
            code: i64::from(status.as_u16()),
            fbtrace_id: String::new(),
        })
    }

    /// Build and dispatch a tier/milestone signal; never fails
    pub async fn fire_audience_signal(
        &self,
        event_name: &str,
        data: &LeadEventInput,
        value: f64,
        content_name: Option<&str>,
    ) -> SignalResult {
        if !self.is_configured() {
            debug!(event_name = %event_name, session_id = %data.session_id, "capi_not_configured");
            return SignalResult::not_configured();
        }
        let event = build_audience_event(event_name, data, value, content_name);
        self.dispatch(event).await
    }

    /// Build and dispatch the "Lead" form completion event; never fails
    pub async fn fire_lead_event(&self, data: &LeadEventInput) -> SignalResult {
        if !self.is_configured() {
            debug!(session_id = %data.session_id, "capi_not_configured");
            return SignalResult::not_configured();
        }
        self.dispatch(build_conversion_event(data)).await
    }

    async fn dispatch(&self, event: ConversionEventData) -> SignalResult {
        let (Some(pixel_id), Some(access_token)) = (&self.pixel_id, &self.access_token) else {
            return SignalResult::not_configured();
        };

        let start = Instant::now();
        let result = self
            .send_conversion_events(
                pixel_id,
                access_token,
                std::slice::from_ref(&event),
                self.test_event_code.as_deref(),
            )
            .await;

        match result {
            Ok(response) => {
                info!(
                    event_name = %event.event_name,
                    event_id = %event.event_id,
                    events_received = %response.events_received,
                    fbtrace_id = %response.fbtrace_id,
                    latency_ms = %start.elapsed().as_millis(),
                    "capi_event_sent"
                );
                SignalResult::ok()
            }
            Err(e) => {
                log_dispatch_failed(&event.event_name, &event.event_id, &e);
                SignalResult::failed(e.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LeadTier;

    #[test]
    fn test_parse_error_body_full() {
        let err = parse_error_body(
            400,
            r#"{"error":{"message":"Invalid parameter","code":100,"fbtrace_id":"AbC123"}}"#,
        );
        assert_eq!(err.message, "Invalid parameter");
        assert_eq!(err.code, 100);
        assert_eq!(err.fbtrace_id, "AbC123");
    }

    #[test]
    fn test_parse_error_body_defaults() {
        let err = parse_error_body(403, r#"{"error":{"message":"Forbidden"}}"#);
        assert_eq!(err.code, 403);
        assert_eq!(err.fbtrace_id, "");

        let err = parse_error_body(502, "<html>bad gateway</html>");
        assert_eq!(err.message, "HTTP 502");
        assert_eq!(err.code, 502);
    }

    #[test]
    fn test_error_display() {
        let err = CapiError { message: "boom".to_string(), code: 190, fbtrace_id: "x".to_string() };
        assert_eq!(err.to_string(), "boom (code 190, fbtrace_id \"x\")");
    }

    #[test]
    fn test_request_body_shape() {
        let event = build_conversion_event(&LeadEventInput {
            session_id: "s1".to_string(),
            ..Default::default()
        });
        let body = EventsRequest { data: vec![event.to_wire()], test_event_code: None };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
        assert!(json.get("test_event_code").is_none());

        let body = EventsRequest { data: vec![], test_event_code: Some("TEST123") };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["test_event_code"], "TEST123");
    }

    #[test]
    fn test_events_url() {
        let config = Config::default().with_capi_base_url("http://127.0.0.1:9/");
        let client = CapiClient::new(&config);
        assert_eq!(client.events_url("42"), "http://127.0.0.1:9/v21.0/42/events");
    }

    #[tokio::test]
    async fn test_not_configured_is_silent_noop() {
        // Unroutable base URL: any network attempt would fail differently
        let config = Config::default().with_capi_base_url("http://127.0.0.1:9");
        let client = CapiClient::new(&config);
        assert!(!client.is_configured());

        let input = LeadEventInput { session_id: "s1".to_string(), ..Default::default() };
        let result = client
            .fire_audience_signal(LeadTier::Qualified.capi_event_name(), &input, 0.0, None)
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("CAPI not configured"));
        assert!(result.is_not_configured());

        let result = client.fire_lead_event(&input).await;
        assert!(result.is_not_configured());
    }

    #[tokio::test]
    async fn test_transport_failure_is_caught() {
        let config = Config::default()
            .with_capi_base_url("http://127.0.0.1:9")
            .with_credential_overrides(Some("1".to_string()), Some("t".to_string()));
        let client = CapiClient::new(&config);

        let input = LeadEventInput { session_id: "s1".to_string(), ..Default::default() };
        let result = client.fire_lead_event(&input).await;
        assert!(!result.success);
        assert!(!result.is_not_configured());
        assert!(result.error.is_some());
    }
}
