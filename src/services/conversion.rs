//! Conversions API event construction
//!
//! Maps internal lead data into the platform event schema. Personal fields are
//! hashed via `domain::normalize`; network identifiers pass through unhashed.
//! `fbclid` is accepted as input but never written to the wire payload, only
//! the `fbc`/`fbp` cookies are forwarded.

use crate::domain::normalize::{hash_value, normalize_phone};
use crate::domain::types::TrackingEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Event name for the raw form-completion signal
pub const LEAD_EVENT_NAME: &str = "Lead";

pub const ACTION_SOURCE_WEBSITE: &str = "website";

pub const DEFAULT_CURRENCY: &str = "USD";

/// Structured builder input, usually derived from a `TrackingEvent`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadEventInput {
    pub session_id: String,
    pub event_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source_url: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub external_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub fbp: Option<String>,
    pub fbc: Option<String>,
    pub fbclid: Option<String>,
}

impl From<&TrackingEvent> for LeadEventInput {
    fn from(event: &TrackingEvent) -> Self {
        Self {
            session_id: event.session_id.clone(),
            event_id: event.event_id.clone(),
            timestamp: event.timestamp,
            source_url: event.page_url.clone(),
            email: event.email.clone(),
            phone: event.phone.clone(),
            first_name: event.first_name.clone(),
            last_name: event.last_name.clone(),
            state: event.state.clone(),
            country: event.country.clone(),
            external_id: Some(event.session_id.clone()),
            ip_address: event.ip_address.clone(),
            user_agent: event.user_agent.clone(),
            fbp: event.attribution.fbp.clone(),
            fbc: event.attribution.fbc.clone(),
            fbclid: event.attribution.fbclid.clone(),
        }
    }
}

/// User data after hashing. Hashed fields hold hex SHA-256 digests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionUserData {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub external_id: Option<String>,
    pub client_ip_address: Option<String>,
    pub client_user_agent: Option<String>,
    pub fbp: Option<String>,
    pub fbc: Option<String>,
    pub fbclid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
}

/// A built conversion event, ready to be formatted for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionEventData {
    pub event_name: String,
    pub event_time: i64,
    pub event_id: String,
    pub event_source_url: Option<String>,
    pub action_source: &'static str,
    pub user_data: ConversionUserData,
    pub custom_data: Option<CustomData>,
}

/// Wire shape of `user_data`. Hashed fields are single-element arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WireUserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub em: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph: Option<Vec<String>>,
    #[serde(rename = "fn", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ln: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub st: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
}

/// Wire shape of a single event in the `data` array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireEvent {
    pub event_name: String,
    pub event_time: i64,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_source_url: Option<String>,
    pub action_source: &'static str,
    pub user_data: WireUserData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<CustomData>,
}

#[inline]
fn single(value: &Option<String>) -> Option<Vec<String>> {
    value.as_ref().map(|v| vec![v.clone()])
}

impl ConversionEventData {
    pub fn to_wire(&self) -> WireEvent {
        let user = &self.user_data;
        WireEvent {
            event_name: self.event_name.clone(),
            event_time: self.event_time,
            event_id: self.event_id.clone(),
            event_source_url: self.event_source_url.clone(),
            action_source: self.action_source,
            user_data: WireUserData {
                em: single(&user.email),
                ph: single(&user.phone),
                first_name: single(&user.first_name),
                ln: single(&user.last_name),
                st: single(&user.state),
                country: single(&user.country),
                external_id: single(&user.external_id),
                client_ip_address: user.client_ip_address.clone(),
                client_user_agent: user.client_user_agent.clone(),
                fbp: user.fbp.clone(),
                fbc: user.fbc.clone(),
            },
            custom_data: self.custom_data.clone(),
        }
    }
}

/// Present and non-blank
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn build_user_data(data: &LeadEventInput) -> ConversionUserData {
    ConversionUserData {
        email: present(&data.email).map(hash_value),
        phone: present(&data.phone)
            .map(normalize_phone)
            .filter(|p| !p.is_empty())
            .map(|p| hash_value(&p)),
        first_name: present(&data.first_name).map(hash_value),
        last_name: present(&data.last_name).map(hash_value),
        state: present(&data.state).map(hash_value),
        country: present(&data.country).map(hash_value),
        external_id: present(&data.external_id).map(hash_value),
        client_ip_address: present(&data.ip_address).map(str::to_string),
        client_user_agent: present(&data.user_agent).map(str::to_string),
        fbp: present(&data.fbp).map(str::to_string),
        fbc: present(&data.fbc).map(str::to_string),
        fbclid: present(&data.fbclid).map(str::to_string),
    }
}

/// Build the fixed "Lead" event for a form completion
pub fn build_conversion_event(data: &LeadEventInput) -> ConversionEventData {
    let event_id = match present(&data.event_id) {
        Some(id) => id.to_string(),
        None => format!("lead_{}", data.session_id),
    };

    ConversionEventData {
        event_name: LEAD_EVENT_NAME.to_string(),
        event_time: data.timestamp.timestamp(),
        event_id,
        event_source_url: present(&data.source_url).map(str::to_string),
        action_source: ACTION_SOURCE_WEBSITE,
        user_data: build_user_data(data),
        custom_data: None,
    }
}

/// Build a tier or milestone signal.
///
/// The event id is derived from the event name and the event (or session) id,
/// so repeated attempts for the same signal deduplicate on the platform side.
pub fn build_audience_event(
    event_name: &str,
    data: &LeadEventInput,
    value: f64,
    content_name: Option<&str>,
) -> ConversionEventData {
    let source_id = present(&data.event_id).unwrap_or(data.session_id.as_str());
    let event_id = format!("{}_{}", event_name.to_lowercase(), source_id);

    ConversionEventData {
        event_name: event_name.to_string(),
        event_time: data.timestamp.timestamp(),
        event_id,
        event_source_url: present(&data.source_url).map(str::to_string),
        action_source: ACTION_SOURCE_WEBSITE,
        user_data: build_user_data(data),
        custom_data: Some(CustomData {
            value: Some(value),
            currency: Some(DEFAULT_CURRENCY.to_string()),
            content_name: content_name.map(str::to_string),
        }),
    }
}
