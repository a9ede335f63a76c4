//! Domain models - core business types
//!
//! This module contains the canonical data types used throughout the system:
//! - `TrackingEvent` - a funnel event from the landing page tracker
//! - `CustomBotRule` - operator-managed bot rules
//! - `BotVerdict` - outcome of bot classification
//! - `LeadTier` - derived lead value tier
//! - `ProcessedEvent` - per-event pipeline outcome written to egress
//! - `normalize` - hashing and phone canonicalization for outbound user data

pub mod normalize;
pub mod types;

pub use types::{
    new_uuid_v7, Attribution, BotFingerprint, BotVerdict, CustomBotRule, EventType, LeadTier,
    ProcessedEvent, RuleType, TrackingEvent,
};
