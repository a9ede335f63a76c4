//! Shared types for the signal gateway

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Funnel event kinds emitted by the landing page tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageLand,
    StepComplete,
    FormComplete,
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page_land" => Ok(EventType::PageLand),
            "step_complete" => Ok(EventType::StepComplete),
            "form_complete" => Ok(EventType::FormComplete),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageLand => "page_land",
            EventType::StepComplete => "step_complete",
            EventType::FormComplete => "form_complete",
        }
    }
}

/// Ad attribution parameters captured from the landing URL and cookies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attribution {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
    /// Meta click id from the `fbclid` query parameter
    pub fbclid: Option<String>,
    /// Meta browser id cookie (`_fbp`)
    pub fbp: Option<String>,
    /// Meta click id cookie (`_fbc`)
    pub fbc: Option<String>,
    pub campaign_id: Option<String>,
    pub adset_id: Option<String>,
    pub ad_id: Option<String>,
}

/// A validated tracking event as handed over by the ingestion boundary.
///
/// Personal fields are only present on `form_complete` events; the ingestion
/// boundary drops them elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub session_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    pub event_type: EventType,
    #[serde(default)]
    pub step_number: Option<u32>,
    #[serde(default)]
    pub step_name: Option<String>,
    #[serde(default)]
    pub selected_value: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub screen_resolution: Option<String>,
    #[serde(default)]
    pub viewport: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    /// Event time - accepts RFC 3339 strings or epoch milliseconds
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attribution: Attribution,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl TrackingEvent {
    /// Minimal event for a session, mostly useful as a base for struct update syntax
    pub fn new(session_id: &str, event_type: EventType) -> Self {
        Self {
            session_id: session_id.to_string(),
            event_id: None,
            event_type,
            step_number: None,
            step_name: None,
            selected_value: None,
            device_type: None,
            browser: None,
            os: None,
            screen_resolution: None,
            viewport: None,
            language: None,
            user_agent: None,
            ip_address: None,
            referrer: None,
            page_url: None,
            timestamp: Utc::now(),
            attribution: Attribution::default(),
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            state: None,
            country: None,
        }
    }

    /// Borrow the attributes the bot classifier looks at
    pub fn fingerprint(&self) -> BotFingerprint<'_> {
        BotFingerprint {
            user_agent: self.user_agent.as_deref(),
            ip_address: self.ip_address.as_deref(),
            screen_resolution: self.screen_resolution.as_deref(),
            viewport: self.viewport.as_deref(),
            language: self.language.as_deref(),
            browser: self.browser.as_deref(),
            os: self.os.as_deref(),
        }
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an RFC 3339 string or epoch milliseconds")
        }

        fn visit_str<E>(self, value: &str) -> Result<DateTime<Utc>, E>
        where
            E: de::Error,
        {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| E::custom(format!("invalid timestamp {}: {}", value, e)))
        }

        fn visit_u64<E>(self, value: u64) -> Result<DateTime<Utc>, E>
        where
            E: de::Error,
        {
            let ms = i64::try_from(value).map_err(|_| E::custom("timestamp out of range"))?;
            self.visit_i64(ms)
        }

        fn visit_i64<E>(self, value: i64) -> Result<DateTime<Utc>, E>
        where
            E: de::Error,
        {
            Utc.timestamp_millis_opt(value)
                .single()
                .ok_or_else(|| E::custom("timestamp out of range"))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

/// The slice of an event used for bot classification
#[derive(Debug, Clone, Copy, Default)]
pub struct BotFingerprint<'a> {
    pub user_agent: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub screen_resolution: Option<&'a str>,
    pub viewport: Option<&'a str>,
    pub language: Option<&'a str>,
    pub browser: Option<&'a str>,
    pub os: Option<&'a str>,
}

/// Kind of an operator-managed bot rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    IpPrefix,
    UaPattern,
}

/// Operator-managed bot rule, loaded by the persistence layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomBotRule {
    pub id: String,
    pub rule_type: RuleType,
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_rule_enabled")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_rule_enabled() -> bool {
    true
}

impl CustomBotRule {
    pub fn new(id: &str, rule_type: RuleType, value: &str, label: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            rule_type,
            value: value.to_string(),
            label: label.map(str::to_string),
            enabled: true,
            created_at: Utc::now(),
        }
    }
}

/// Result of bot classification, stored alongside the event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotVerdict {
    pub is_bot: bool,
    pub bot_type: Option<String>,
    pub reasons: Vec<String>,
}

/// Lead value tier, always derived and never taken from user input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTier {
    Qualified,
    Disqualified,
    HighValueCustomer,
    LowValueCustomer,
}

impl LeadTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadTier::Qualified => "qualified",
            LeadTier::Disqualified => "disqualified",
            LeadTier::HighValueCustomer => "high_value_customer",
            LeadTier::LowValueCustomer => "low_value_customer",
        }
    }

    /// Conversions API event name for this tier
    pub fn capi_event_name(&self) -> &'static str {
        match self {
            LeadTier::Qualified => "QualifiedLead",
            LeadTier::Disqualified => "DisqualifiedLead",
            LeadTier::HighValueCustomer => "HighValueCustomer",
            LeadTier::LowValueCustomer => "LowValueCustomer",
        }
    }
}

impl std::fmt::Display for LeadTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Outcome of running one event through the pipeline, written to egress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedEvent {
    /// Inbound event id, or a generated UUIDv7 when the event carried none
    pub event_id: String,
    pub session_id: String,
    pub event_type: EventType,
    pub verdict: BotVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<LeadTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_premium: Option<u64>,
    /// Event names queued for dispatch
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
