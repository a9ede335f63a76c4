//! Lead scoring from free-text budget answers
//!
//! Budget answers come straight from a quiz step ("$50-$100/month", "$200+",
//! "around 75"). Unparseable text is "no signal", never an error.

use crate::domain::types::LeadTier;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

/// Annual premium at or above which a lead is high value
pub const HIGH_VALUE_THRESHOLD: u64 = 1200;

const MONTHS_PER_YEAR: f64 = 12.0;

/// Parsed monthly budget range. `max` is `None` for open-ended "X+" answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetRange {
    pub min: f64,
    pub max: Option<f64>,
}

/// A budget amount: digits with optional thousands commas and decimals
const AMOUNT: &str = r"(\d[\d,]*(?:\.\d+)?)";

static OPEN_ENDED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{AMOUNT}\+")).expect("valid open-ended budget regex"));

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"{AMOUNT}[-\x{{2013}}\x{{2014}}]\$?{AMOUNT}")).expect("valid budget range regex")
});

static SINGLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(AMOUNT).expect("valid budget amount regex"));

/// Keep only the characters that can take part in a budget expression
fn clean(text: &str) -> String {
    text.chars()
        .filter(|&c| c.is_ascii_digit() || matches!(c, '+' | '$' | '.' | ',' | '-' | '\u{2013}' | '\u{2014}'))
        .collect()
}

fn amount(caps: &Captures<'_>, group: usize) -> Option<f64> {
    let digits: String = caps.get(group)?.as_str().chars().filter(|&c| c != ',').collect();
    digits.parse().ok()
}

/// Parse a free-text monthly budget. Tries "X+", then "X-Y", then a single number.
pub fn parse_budget_range(text: &str) -> Option<BudgetRange> {
    let cleaned = clean(text);

    if let Some(caps) = OPEN_ENDED_RE.captures(&cleaned) {
        return Some(BudgetRange { min: amount(&caps, 1)?, max: None });
    }
    if let Some(caps) = RANGE_RE.captures(&cleaned) {
        return Some(BudgetRange { min: amount(&caps, 1)?, max: Some(amount(&caps, 2)?) });
    }
    let caps = SINGLE_RE.captures(&cleaned)?;
    let value = amount(&caps, 1)?;
    Some(BudgetRange { min: value, max: Some(value) })
}

/// Annual premium estimate from a budget answer; 0 when the text has no usable budget.
///
/// Open-ended ranges use their minimum as the midpoint.
pub fn calculate_annual_premium_estimate(text: &str) -> u64 {
    let Some(range) = parse_budget_range(text) else {
        return 0;
    };

    let midpoint = match range.max {
        Some(max) => (range.min + max) / 2.0,
        None => range.min,
    };

    (midpoint * MONTHS_PER_YEAR).round().max(0.0) as u64
}

pub fn classify_customer_tier(annual_premium: u64) -> LeadTier {
    if annual_premium >= HIGH_VALUE_THRESHOLD {
        LeadTier::HighValueCustomer
    } else {
        LeadTier::LowValueCustomer
    }
}

pub fn get_capi_event_name(tier: LeadTier) -> &'static str {
    tier.capi_event_name()
}
