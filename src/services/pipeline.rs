//! Event pipeline - classification, tiering and signal hand-off
//!
//! Per event: classify → (humans only) decide tier → enqueue signals.
//! Dispatch happens on the signal worker; `process` never waits on the
//! network and never fails.

use crate::domain::types::{
    new_uuid_v7, BotVerdict, EventType, LeadTier, ProcessedEvent, TrackingEvent,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::bot_classifier::{BotClassifier, CompiledRules};
use crate::services::conversion::LeadEventInput;
use crate::services::lead_scorer::{calculate_annual_premium_estimate, classify_customer_tier};
use crate::services::signal_worker::{SignalCmd, SignalKind};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Tier decision for a human event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierDecision {
    pub tier: Option<LeadTier>,
    pub annual_premium: Option<u64>,
    pub signals: Vec<SignalKind>,
}

fn audience(tier: LeadTier, value: f64, content_name: Option<&str>) -> SignalKind {
    SignalKind::Audience {
        event_name: tier.capi_event_name().to_string(),
        value,
        content_name: content_name.map(str::to_string),
    }
}

/// Decide tier and signals for an event already judged human
pub fn decide_tier(event: &TrackingEvent, config: &Config) -> TierDecision {
    match event.event_type {
        EventType::PageLand => TierDecision::default(),
        EventType::StepComplete => {
            let is_budget_step = event
                .step_name
                .as_deref()
                .is_some_and(|name| name.trim().eq_ignore_ascii_case(config.budget_step()));
            let Some(answer) = event.selected_value.as_deref().filter(|_| is_budget_step) else {
                return TierDecision::default();
            };

            let premium = calculate_annual_premium_estimate(answer);
            if premium == 0 {
                return TierDecision::default();
            }

            let tier = classify_customer_tier(premium);
            TierDecision {
                tier: Some(tier),
                annual_premium: Some(premium),
                signals: vec![audience(tier, premium as f64, event.step_name.as_deref())],
            }
        }
        EventType::FormComplete => {
            let disqualified =
                event.selected_value.as_deref().is_some_and(|v| config.is_disqualifying(v));
            let tier = if disqualified { LeadTier::Disqualified } else { LeadTier::Qualified };
            TierDecision {
                tier: Some(tier),
                annual_premium: None,
                signals: vec![SignalKind::Lead, audience(tier, 0.0, event.step_name.as_deref())],
            }
        }
    }
}

fn log_bot_detected(event: &TrackingEvent, verdict: &BotVerdict) {
    debug!(
        session_id = %event.session_id,
        bot_type = ?verdict.bot_type,
        reasons = ?verdict.reasons,
        "bot_detected"
    );
}

pub struct SignalPipeline {
    classifier: BotClassifier,
    config: Config,
    metrics: Arc<Metrics>,
    signal_tx: Option<mpsc::Sender<SignalCmd>>,
}

impl SignalPipeline {
    pub fn new(
        classifier: BotClassifier,
        config: Config,
        metrics: Arc<Metrics>,
        signal_tx: Option<mpsc::Sender<SignalCmd>>,
    ) -> Self {
        Self { classifier, config, metrics, signal_tx }
    }

    /// Run one event through the pipeline
    pub fn process(&self, event: &TrackingEvent, custom_rules: &CompiledRules) -> ProcessedEvent {
        let start = Instant::now();
        let event_id = event
            .event_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_uuid_v7);

        let verdict = self.classifier.classify_compiled(&event.fingerprint(), custom_rules);

        let decision = if verdict.is_bot {
            log_bot_detected(event, &verdict);
            self.metrics.record_bot();
            TierDecision::default()
        } else {
            decide_tier(event, &self.config)
        };

        if let Some(tier) = decision.tier {
            self.metrics.record_tier(tier);
            info!(
                session_id = %event.session_id,
                tier = %tier,
                annual_premium = ?decision.annual_premium,
                "lead_tiered"
            );
        }

        let signals: Vec<String> =
            decision.signals.iter().map(|s| s.event_name().to_string()).collect();
        if !decision.signals.is_empty() {
            let input = LeadEventInput::from(event);
            for kind in decision.signals {
                self.enqueue(SignalCmd::new(kind, input.clone()));
            }
        }

        self.metrics.record_event_processed(start.elapsed().as_micros() as u64);

        ProcessedEvent {
            event_id,
            session_id: event.session_id.clone(),
            event_type: event.event_type,
            verdict,
            tier: decision.tier,
            annual_premium: decision.annual_premium,
            signals,
            processed_at: Utc::now(),
        }
    }

    fn enqueue(&self, cmd: SignalCmd) {
        let Some(ref tx) = self.signal_tx else {
            self.metrics.record_signal_skipped();
            return;
        };

        match tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                self.metrics.record_signal_dropped();
                warn!(
                    session_id = %cmd.input.session_id,
                    event_name = %cmd.kind.event_name(),
                    "signal_queue_full"
                );
            }
            Err(TrySendError::Closed(cmd)) => {
                self.metrics.record_signal_dropped();
                warn!(
                    session_id = %cmd.input.session_id,
                    event_name = %cmd.kind.event_name(),
                    "signal_worker_closed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUMAN_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

    fn human(event_type: EventType) -> TrackingEvent {
        TrackingEvent {
            user_agent: Some(HUMAN_UA.to_string()),
            ip_address: Some("203.0.113.7".to_string()),
            screen_resolution: Some("1920x1080".to_string()),
            viewport: Some("1280x720".to_string()),
            language: Some("en-US".to_string()),
            browser: Some("Chrome".to_string()),
            os: Some("Windows".to_string()),
            ..TrackingEvent::new("sess-1", event_type)
        }
    }

    fn budget_step(answer: &str) -> TrackingEvent {
        TrackingEvent {
            step_name: Some("budget".to_string()),
            selected_value: Some(answer.to_string()),
            ..human(EventType::StepComplete)
        }
    }

    #[test]
    fn test_page_land_has_no_tier() {
        let decision = decide_tier(&human(EventType::PageLand), &Config::default());
        assert_eq!(decision, TierDecision::default());
    }

    #[test]
    fn test_budget_step_high_value() {
        let decision = decide_tier(&budget_step("$200+"), &Config::default());
        assert_eq!(decision.tier, Some(LeadTier::HighValueCustomer));
        assert_eq!(decision.annual_premium, Some(2400));
        assert_eq!(
            decision.signals,
            vec![SignalKind::Audience {
                event_name: "HighValueCustomer".to_string(),
                value: 2400.0,
                content_name: Some("budget".to_string()),
            }]
        );
    }

    #[test]
    fn test_budget_step_low_value_and_junk() {
        let decision = decide_tier(&budget_step("$50-$100"), &Config::default());
        assert_eq!(decision.tier, Some(LeadTier::LowValueCustomer));
        assert_eq!(decision.annual_premium, Some(900));

        let decision = decide_tier(&budget_step("not sure"), &Config::default());
        assert_eq!(decision, TierDecision::default());
    }

    #[test]
    fn test_other_step_is_ignored() {
        let event = TrackingEvent { step_name: Some("age".to_string()), ..budget_step("$200+") };
        assert_eq!(decide_tier(&event, &Config::default()), TierDecision::default());
    }

    #[test]
    fn test_form_complete_qualified_and_disqualified() {
        let config = Config::default().with_disqualify_values(&["Just browsing"]);

        let decision = decide_tier(&human(EventType::FormComplete), &config);
        assert_eq!(decision.tier, Some(LeadTier::Qualified));
        assert_eq!(decision.signals.len(), 2);
        assert_eq!(decision.signals[0], SignalKind::Lead);
        assert_eq!(decision.signals[1].event_name(), "QualifiedLead");

        let event = TrackingEvent {
            selected_value: Some("just browsing".to_string()),
            ..human(EventType::FormComplete)
        };
        let decision = decide_tier(&event, &config);
        assert_eq!(decision.tier, Some(LeadTier::Disqualified));
        assert_eq!(decision.signals[1].event_name(), "DisqualifiedLead");
    }

    #[tokio::test]
    async fn test_process_human_enqueues_signals() {
        let metrics = Arc::new(Metrics::new());
        let (tx, mut rx) = mpsc::channel(8);
        let pipeline =
            SignalPipeline::new(BotClassifier::default(), Config::default(), metrics.clone(), Some(tx));

        let processed = pipeline.process(&budget_step("$200+"), &CompiledRules::default());
        assert!(!processed.verdict.is_bot);
        assert_eq!(processed.tier, Some(LeadTier::HighValueCustomer));
        assert_eq!(processed.signals, vec!["HighValueCustomer".to_string()]);

        let cmd = rx.try_recv().unwrap();
        assert_eq!(cmd.input.session_id, "sess-1");
        assert_eq!(cmd.kind.event_name(), "HighValueCustomer");
        assert_eq!(metrics.tier_total(LeadTier::HighValueCustomer), 1);
        assert_eq!(metrics.events_total(), 1);
    }

    #[tokio::test]
    async fn test_process_bot_never_tiers() {
        let metrics = Arc::new(Metrics::new());
        let (tx, mut rx) = mpsc::channel(8);
        let pipeline =
            SignalPipeline::new(BotClassifier::default(), Config::default(), metrics.clone(), Some(tx));

        let event = TrackingEvent {
            user_agent: Some("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)".to_string()),
            ..human(EventType::FormComplete)
        };
        let processed = pipeline.process(&event, &CompiledRules::default());
        assert!(processed.verdict.is_bot);
        assert_eq!(processed.verdict.bot_type.as_deref(), Some("Google Bot"));
        assert!(processed.tier.is_none());
        assert!(processed.signals.is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.bots_total(), 1);
    }

    #[test]
    fn test_process_generates_event_id() {
        let pipeline =
            SignalPipeline::new(BotClassifier::default(), Config::default(), Arc::new(Metrics::new()), None);

        let processed = pipeline.process(&human(EventType::PageLand), &CompiledRules::default());
        assert_eq!(processed.event_id.len(), 36);

        let event = TrackingEvent { event_id: Some("evt-9".to_string()), ..human(EventType::PageLand) };
        assert_eq!(pipeline.process(&event, &CompiledRules::default()).event_id, "evt-9");
    }

    #[test]
    fn test_full_queue_drops_signal() {
        let metrics = Arc::new(Metrics::new());
        let (tx, _rx) = mpsc::channel(1);
        let pipeline =
            SignalPipeline::new(BotClassifier::default(), Config::default(), metrics.clone(), Some(tx));

        // Form completion enqueues two signals into a queue of one
        let processed = pipeline.process(&human(EventType::FormComplete), &CompiledRules::default());
        assert_eq!(processed.signals.len(), 2);
        assert_eq!(metrics.signals_dropped(), 1);
    }
}
