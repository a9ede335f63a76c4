//! Rule-based bot classification for landing page traffic
//!
//! Evaluation order (first match per category, reasons accumulate):
//! 1. Missing user agent
//! 2. Static user agent patterns (crawlers, headless browsers, HTTP clients, ...)
//! 3. Short user agent (< 30 chars) when no static pattern matched
//! 4. Custom `ua_pattern` rules
//! 5. Facebook crawler IP prefixes
//! 6. Custom `ip_prefix` rules
//! 7. Browser fingerprint completeness
//!
//! The first category to fire claims the bot type label. Only custom UA rules
//! override an already claimed label.

use crate::domain::types::{BotFingerprint, BotVerdict, CustomBotRule, RuleType};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::Path;
use tracing::{error, warn};

pub const REASON_MISSING_UA: &str = "missing_ua";
pub const REASON_BOT_UA: &str = "bot_ua";
pub const REASON_SHORT_UA: &str = "short_ua";
pub const REASON_CUSTOM_UA_RULE: &str = "custom_ua_rule";
pub const REASON_FACEBOOK_IP: &str = "facebook_ip";
pub const REASON_CUSTOM_IP_RULE: &str = "custom_ip_rule";
pub const REASON_NO_FINGERPRINT: &str = "no_fingerprint";

const LABEL_MISSING_UA: &str = "Missing User Agent";
const LABEL_SHORT_UA: &str = "Short User Agent";
const LABEL_CUSTOM_UA: &str = "Custom UA Rule";
const LABEL_FACEBOOK_IP: &str = "Facebook Prefetcher";
const LABEL_CUSTOM_IP: &str = "Custom IP Rule";
const LABEL_NO_FINGERPRINT: &str = "No Browser Fingerprint";

/// User agents shorter than this are treated as suspicious
const MIN_UA_LENGTH: usize = 30;

/// Missing fingerprint fields needed to flag an event
const MIN_MISSING_FINGERPRINT_FIELDS: usize = 4;

/// Built-in user agent patterns, most specific first. Generic catch-alls go last.
const DEFAULT_UA_PATTERNS: &[(&str, &str)] = &[
    // Search engines
    (r"googlebot", "Google Bot"),
    (r"adsbot-google", "Google Ads Bot"),
    (r"mediapartners-google", "Google AdSense Bot"),
    (r"google-inspectiontool", "Google Inspection Tool"),
    (r"bingbot", "Bing Bot"),
    (r"bingpreview", "Bing Preview"),
    (r"yandex(bot|images)", "Yandex Bot"),
    (r"baiduspider", "Baidu Spider"),
    (r"duckduckbot", "DuckDuckGo Bot"),
    (r"slurp", "Yahoo Slurp"),
    (r"applebot", "Apple Bot"),
    // Social previews
    (r"facebookexternalhit", "Facebook Crawler"),
    (r"facebot", "Facebook Bot"),
    (r"meta-externalagent", "Meta External Agent"),
    (r"twitterbot", "Twitter Bot"),
    (r"linkedinbot", "LinkedIn Bot"),
    (r"pinterest(bot)?", "Pinterest Bot"),
    (r"whatsapp", "WhatsApp Preview"),
    (r"telegrambot", "Telegram Bot"),
    (r"slackbot", "Slack Bot"),
    (r"discordbot", "Discord Bot"),
    (r"skypeuripreview", "Skype Preview"),
    // Headless and automated browsers
    (r"headlesschrome", "Headless Chrome"),
    (r"phantomjs", "PhantomJS"),
    (r"puppeteer", "Puppeteer"),
    (r"playwright", "Playwright"),
    (r"selenium", "Selenium"),
    (r"webdriver", "WebDriver"),
    (r"electron/", "Electron"),
    // Scripting HTTP clients
    (r"python-requests", "Python Requests"),
    (r"python-urllib", "Python urllib"),
    (r"aiohttp", "Python aiohttp"),
    (r"httpx", "Python httpx"),
    (r"\bcurl/", "cURL"),
    (r"wget", "Wget"),
    (r"axios", "Axios"),
    (r"node-fetch", "Node Fetch"),
    (r"undici", "Node Undici"),
    (r"go-http-client", "Go HTTP Client"),
    (r"okhttp", "OkHttp"),
    (r"java/", "Java HTTP Client"),
    (r"apache-httpclient", "Apache HttpClient"),
    (r"libwww-perl", "Perl LWP"),
    (r"postmanruntime", "Postman"),
    (r"insomnia", "Insomnia"),
    // Scrapers
    (r"scrapy", "Scrapy"),
    (r"httrack", "HTTrack"),
    (r"colly", "Colly"),
    (r"crawler4j", "Crawler4j"),
    // Uptime monitors
    (r"uptimerobot", "UptimeRobot"),
    (r"pingdom", "Pingdom"),
    (r"statuscake", "StatusCake"),
    (r"site24x7", "Site24x7"),
    (r"newrelicpinger", "New Relic Pinger"),
    (r"datadog", "Datadog Synthetics"),
    (r"checkly", "Checkly"),
    (r"better ?uptime", "Better Uptime"),
    // SEO tools and archives
    (r"ahrefsbot", "Ahrefs Bot"),
    (r"semrushbot", "SEMrush Bot"),
    (r"mj12bot", "Majestic Bot"),
    (r"dotbot", "Moz DotBot"),
    (r"rogerbot", "Moz RogerBot"),
    (r"petalbot", "Petal Bot"),
    (r"bytespider", "ByteDance Spider"),
    (r"gptbot", "OpenAI GPTBot"),
    (r"ccbot", "Common Crawl Bot"),
    (r"claudebot", "Anthropic ClaudeBot"),
    (r"archive\.org_bot|ia_archiver", "Internet Archive"),
    (r"screaming frog", "Screaming Frog"),
    // Generic catch-alls
    (r"bot", "Generic Bot"),
    (r"crawler", "Generic Crawler"),
    (r"spider", "Generic Spider"),
];

/// Literal prefixes of Facebook crawler address space (AS32934)
const DEFAULT_FACEBOOK_IP_PREFIXES: &[&str] = &[
    "31.13.",
    "66.220.",
    "69.63.",
    "69.171.",
    "74.119.76.",
    "102.132.",
    "103.4.96.",
    "129.134.",
    "147.75.208.",
    "157.240.",
    "163.70.",
    "173.252.",
    "179.60.",
    "185.60.216.",
    "185.60.217.",
    "185.60.218.",
    "185.60.219.",
    "185.89.218.",
    "185.89.219.",
    "204.15.20.",
    "2620:0:1c",
    "2a03:2880:",
];

static DEFAULT_CLASSIFIER: Lazy<BotClassifier> = Lazy::new(BotClassifier::default);

/// Log a built-in or custom pattern that failed to compile (cold path)
#[cold]
fn log_invalid_pattern(source: &str, pattern: &str, e: &regex::Error) {
    warn!(source = %source, pattern = %pattern, error = %e, "bot_rule_invalid_pattern");
}

/// A compiled, case-insensitive user agent pattern with its bot type label
#[derive(Debug, Clone)]
pub struct UaPattern {
    regex: Regex,
    label: String,
}

impl UaPattern {
    pub fn new(pattern: &str, label: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { regex, label: label.to_string() })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    fn is_match(&self, ua: &str) -> bool {
        self.regex.is_match(ua)
    }
}

/// Accumulates reasons and the claimed bot type label during classification
#[derive(Debug, Default)]
struct VerdictBuilder {
    bot_type: Option<String>,
    reasons: Vec<String>,
}

impl VerdictBuilder {
    fn reason(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    /// Set the label only if no earlier rule claimed it
    fn claim_label(&mut self, label: &str) {
        if self.bot_type.is_none() {
            self.bot_type = Some(label.to_string());
        }
    }

    fn override_label(&mut self, label: &str) {
        self.bot_type = Some(label.to_string());
    }

    fn finish(self) -> BotVerdict {
        BotVerdict { is_bot: !self.reasons.is_empty(), bot_type: self.bot_type, reasons: self.reasons }
    }
}

/// Deterministic bot classifier.
///
/// Holds the static pattern and prefix lists; custom rules are passed per call
/// so a reloaded rule list is observed on the next event.
#[derive(Debug, Clone)]
pub struct BotClassifier {
    ua_patterns: Vec<UaPattern>,
    facebook_ip_prefixes: Vec<String>,
}

impl Default for BotClassifier {
    fn default() -> Self {
        let ua_patterns = DEFAULT_UA_PATTERNS
            .iter()
            .filter_map(|(pattern, label)| match UaPattern::new(pattern, label) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!(pattern = %pattern, error = %e, "builtin_ua_pattern_invalid");
                    None
                }
            })
            .collect();

        Self::new(
            ua_patterns,
            DEFAULT_FACEBOOK_IP_PREFIXES.iter().map(|p| p.to_string()).collect(),
        )
    }
}

impl BotClassifier {
    pub fn new(ua_patterns: Vec<UaPattern>, facebook_ip_prefixes: Vec<String>) -> Self {
        Self { ua_patterns, facebook_ip_prefixes }
    }

    pub fn ua_pattern_count(&self) -> usize {
        self.ua_patterns.len()
    }

    /// Check only the static user agent list. Returns the bot type label of the first match.
    pub fn detect_user_agent(&self, user_agent: &str) -> Option<&str> {
        self.ua_patterns.iter().find(|p| p.is_match(user_agent)).map(|p| p.label())
    }

    /// Classify an event against the static lists and the given custom rules.
    ///
    /// Compiles `custom_rules` on every call; hot paths hold a `CompiledRules`
    /// and use `classify_compiled`.
    pub fn classify(&self, fp: &BotFingerprint<'_>, custom_rules: &[CustomBotRule]) -> BotVerdict {
        self.classify_compiled(fp, &CompiledRules::new(custom_rules))
    }

    pub fn classify_compiled(&self, fp: &BotFingerprint<'_>, custom_rules: &CompiledRules) -> BotVerdict {
        let mut verdict = VerdictBuilder::default();

        let ua = fp.user_agent.map(str::trim).unwrap_or("");
        if ua.is_empty() {
            verdict.reason(REASON_MISSING_UA);
            verdict.claim_label(LABEL_MISSING_UA);
        } else {
            self.check_user_agent(ua, &mut verdict);
            custom_rules.check_user_agent(ua, &mut verdict);
        }

        if let Some(ip) = fp.ip_address.map(str::trim).filter(|ip| !ip.is_empty()) {
            if self.is_facebook_ip(ip) {
                verdict.reason(REASON_FACEBOOK_IP);
                verdict.claim_label(LABEL_FACEBOOK_IP);
            }
            custom_rules.check_ip(ip, &mut verdict);
        }

        let missing = missing_fingerprint_fields(fp);
        if missing.len() >= MIN_MISSING_FINGERPRINT_FIELDS {
            verdict.reason(format!("{}:{}", REASON_NO_FINGERPRINT, missing.join(",")));
            verdict.claim_label(LABEL_NO_FINGERPRINT);
        }

        verdict.finish()
    }

    fn check_user_agent(&self, ua: &str, verdict: &mut VerdictBuilder) {
        if let Some(label) = self.detect_user_agent(ua) {
            verdict.reason(REASON_BOT_UA);
            verdict.claim_label(label);
            return;
        }

        if ua.chars().count() < MIN_UA_LENGTH {
            verdict.reason(REASON_SHORT_UA);
            verdict.claim_label(LABEL_SHORT_UA);
        }
    }

    fn is_facebook_ip(&self, ip: &str) -> bool {
        self.facebook_ip_prefixes.iter().any(|prefix| ip.starts_with(prefix.as_str()))
    }
}

fn enabled_rules(rules: &[CustomBotRule], kind: RuleType) -> impl Iterator<Item = &CustomBotRule> {
    rules.iter().filter(move |r| r.enabled && r.rule_type == kind && !r.value.is_empty())
}

/// Custom rules ready for matching. Build once per rule list; invalid UA
/// patterns are dropped here and logged once.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    ua_patterns: Vec<UaPattern>,
    ip_prefixes: Vec<(String, String)>,
}

impl CompiledRules {
    pub fn new(rules: &[CustomBotRule]) -> Self {
        let ua_patterns = enabled_rules(rules, RuleType::UaPattern)
            .filter_map(|rule| {
                match UaPattern::new(&rule.value, rule.label.as_deref().unwrap_or(LABEL_CUSTOM_UA)) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        log_invalid_pattern(&rule.id, &rule.value, &e);
                        None
                    }
                }
            })
            .collect();

        let ip_prefixes = enabled_rules(rules, RuleType::IpPrefix)
            .map(|rule| {
                let label = rule.label.as_deref().unwrap_or(LABEL_CUSTOM_IP);
                (rule.value.clone(), label.to_string())
            })
            .collect();

        Self { ua_patterns, ip_prefixes }
    }

    pub fn ua_rule_count(&self) -> usize {
        self.ua_patterns.len()
    }

    pub fn ip_rule_count(&self) -> usize {
        self.ip_prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ua_patterns.is_empty() && self.ip_prefixes.is_empty()
    }

    fn check_user_agent(&self, ua: &str, verdict: &mut VerdictBuilder) {
        if let Some(pattern) = self.ua_patterns.iter().find(|p| p.is_match(ua)) {
            verdict.reason(REASON_CUSTOM_UA_RULE);
            verdict.override_label(pattern.label());
        }
    }

    fn check_ip(&self, ip: &str, verdict: &mut VerdictBuilder) {
        if let Some((_, label)) = self.ip_prefixes.iter().find(|(prefix, _)| ip.starts_with(prefix.as_str())) {
            verdict.reason(REASON_CUSTOM_IP_RULE);
            verdict.claim_label(label);
        }
    }
}

fn missing_fingerprint_fields(fp: &BotFingerprint<'_>) -> Vec<&'static str> {
    let fields = [
        ("screen_resolution", fp.screen_resolution),
        ("viewport", fp.viewport),
        ("language", fp.language),
        ("browser", fp.browser),
        ("os", fp.os),
    ];

    fields
        .iter()
        .filter(|(_, value)| value.map(str::trim).map_or(true, str::is_empty))
        .map(|(name, _)| *name)
        .collect()
}

/// Lightweight check for call sites that only have a user agent string
pub fn is_bot_user_agent(user_agent: &str) -> bool {
    DEFAULT_CLASSIFIER.detect_user_agent(user_agent).is_some()
}

/// Shared classifier built from the built-in lists
pub fn default_classifier() -> &'static BotClassifier {
    &DEFAULT_CLASSIFIER
}

/// Load custom rules from a JSON array file
pub fn load_rules_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<CustomBotRule>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file {}", path.display()))?;

    let rules: Vec<CustomBotRule> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse rules file {}", path.display()))?;

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TrackingEvent;
    use crate::domain::EventType;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    /// Builder for browser-like events with a full fingerprint
    fn human_event() -> TrackingEvent {
        TrackingEvent {
            user_agent: Some(CHROME_UA.to_string()),
            ip_address: Some("203.0.113.7".to_string()),
            screen_resolution: Some("1920x1080".to_string()),
            viewport: Some("1280x720".to_string()),
            language: Some("en-US".to_string()),
            browser: Some("Chrome".to_string()),
            os: Some("Windows".to_string()),
            ..TrackingEvent::new("s-1", EventType::PageLand)
        }
    }

    fn classify(event: &TrackingEvent, rules: &[CustomBotRule]) -> BotVerdict {
        BotClassifier::default().classify(&event.fingerprint(), rules)
    }

    #[test]
    fn test_human_browser_is_not_bot() {
        let verdict = classify(&human_event(), &[]);
        assert!(!verdict.is_bot);
        assert!(verdict.bot_type.is_none());
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_missing_and_whitespace_ua() {
        for ua in [None, Some(""), Some("   "), Some("\t\n")] {
            let mut event = human_event();
            event.user_agent = ua.map(str::to_string);
            let verdict = classify(&event, &[]);
            assert!(verdict.is_bot);
            assert_eq!(verdict.bot_type.as_deref(), Some("Missing User Agent"));
            assert_eq!(verdict.reasons, vec![REASON_MISSING_UA]);
        }
    }

    #[test]
    fn test_missing_ua_skips_custom_ua_rules() {
        let mut event = human_event();
        event.user_agent = None;
        let rules = vec![CustomBotRule::new("r1", RuleType::UaPattern, ".*", Some("Anything"))];
        let verdict = classify(&event, &rules);
        assert_eq!(verdict.reasons, vec![REASON_MISSING_UA]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Missing User Agent"));
    }

    #[test]
    fn test_googlebot() {
        let mut event = human_event();
        event.user_agent =
            Some("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)".into());
        let verdict = classify(&event, &[]);
        assert!(verdict.is_bot);
        assert!(verdict.reasons.contains(&REASON_BOT_UA.to_string()));
        assert_eq!(verdict.bot_type.as_deref(), Some("Google Bot"));
    }

    #[test]
    fn test_static_patterns_first_match_wins() {
        let classifier = BotClassifier::default();
        assert_eq!(
            classifier.detect_user_agent("facebookexternalhit/1.1 (+http://www.facebook.com)"),
            Some("Facebook Crawler")
        );
        assert_eq!(
            classifier.detect_user_agent("Mozilla/5.0 HeadlessChrome/119.0.0.0 Safari/537.36"),
            Some("Headless Chrome")
        );
        assert_eq!(classifier.detect_user_agent("python-requests/2.31.0"), Some("Python Requests"));
        assert_eq!(classifier.detect_user_agent("curl/8.4.0"), Some("cURL"));
        assert_eq!(
            classifier.detect_user_agent("Mozilla/5.0 (compatible; SomeNewBot/1.0)"),
            Some("Generic Bot")
        );
        assert_eq!(classifier.detect_user_agent(CHROME_UA), None);
    }

    #[test]
    fn test_short_ua() {
        let mut event = human_event();
        event.user_agent = Some("Mozilla/5.0".to_string());
        let verdict = classify(&event, &[]);
        assert!(verdict.is_bot);
        assert_eq!(verdict.reasons, vec![REASON_SHORT_UA]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Short User Agent"));
    }

    #[test]
    fn test_short_ua_not_added_when_static_pattern_matched() {
        let mut event = human_event();
        event.user_agent = Some("curl/8.4.0".to_string());
        let verdict = classify(&event, &[]);
        assert_eq!(verdict.reasons, vec![REASON_BOT_UA]);
        assert_eq!(verdict.bot_type.as_deref(), Some("cURL"));
    }

    #[test]
    fn test_custom_ua_rule_overrides_label() {
        let mut event = human_event();
        event.user_agent = Some("Mozilla/5.0 (compatible; Googlebot/2.1)".to_string());
        let rules = vec![
            CustomBotRule::new("r1", RuleType::UaPattern, "googlebot/2", Some("Internal Google Check")),
            CustomBotRule::new("r2", RuleType::UaPattern, "compatible", Some("Never Reached")),
        ];
        let verdict = classify(&event, &rules);
        assert_eq!(verdict.reasons, vec![REASON_BOT_UA, REASON_CUSTOM_UA_RULE]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Internal Google Check"));
    }

    #[test]
    fn test_custom_ua_rule_default_label_and_case_insensitive() {
        let mut event = human_event();
        event.user_agent = Some(format!("{} AcmeMonitor/3", CHROME_UA));
        let rules = vec![CustomBotRule::new("r1", RuleType::UaPattern, "acmemonitor", None)];
        let verdict = classify(&event, &rules);
        assert_eq!(verdict.reasons, vec![REASON_CUSTOM_UA_RULE]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Custom UA Rule"));
    }

    #[test]
    fn test_invalid_custom_regex_is_skipped() {
        let mut event = human_event();
        event.user_agent = Some(format!("{} AcmeMonitor/3", CHROME_UA));
        let rules = vec![
            CustomBotRule::new("bad", RuleType::UaPattern, "(unclosed", Some("Broken")),
            CustomBotRule::new("good", RuleType::UaPattern, "acmemonitor", Some("Acme")),
        ];
        let verdict = classify(&event, &rules);
        assert_eq!(verdict.reasons, vec![REASON_CUSTOM_UA_RULE]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_compiled_rules_drop_invalid_once() {
        let rules = vec![
            CustomBotRule::new("bad", RuleType::UaPattern, "(unclosed", Some("Broken")),
            CustomBotRule::new("good", RuleType::UaPattern, "acmemonitor", Some("Acme")),
            CustomBotRule::new("office", RuleType::IpPrefix, "203.0.113.", Some("Office")),
        ];
        let compiled = CompiledRules::new(&rules);
        assert_eq!(compiled.ua_rule_count(), 1);
        assert_eq!(compiled.ip_rule_count(), 1);
        assert!(CompiledRules::new(&[]).is_empty());

        // Reused across events without recompiling
        let classifier = BotClassifier::default();
        let mut monitor = human_event();
        monitor.user_agent = Some(format!("{} AcmeMonitor/3", CHROME_UA));
        let mut visitor = human_event();
        visitor.ip_address = Some("198.51.100.9".to_string());

        let verdict = classifier.classify_compiled(&monitor.fingerprint(), &compiled);
        assert_eq!(verdict.bot_type.as_deref(), Some("Acme"));
        assert_eq!(verdict.reasons, vec![REASON_CUSTOM_UA_RULE, REASON_CUSTOM_IP_RULE]);
        assert!(!classifier.classify_compiled(&visitor.fingerprint(), &compiled).is_bot);
        assert_eq!(
            classifier.classify_compiled(&monitor.fingerprint(), &compiled),
            classifier.classify(&monitor.fingerprint(), &rules)
        );
    }

    #[test]
    fn test_disabled_rules_ignored() {
        let mut event = human_event();
        event.user_agent = Some(format!("{} AcmeMonitor/3", CHROME_UA));
        let mut rule = CustomBotRule::new("r1", RuleType::UaPattern, "acmemonitor", None);
        rule.enabled = false;
        let mut ip_rule = CustomBotRule::new("r2", RuleType::IpPrefix, "203.0.113.", None);
        ip_rule.enabled = false;
        let verdict = classify(&event, &[rule, ip_rule]);
        assert!(!verdict.is_bot);
    }

    #[test]
    fn test_facebook_ip() {
        let mut event = human_event();
        event.ip_address = Some("173.252.90.1".to_string());
        let verdict = classify(&event, &[]);
        assert!(verdict.is_bot);
        assert_eq!(verdict.reasons, vec![REASON_FACEBOOK_IP]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Facebook Prefetcher"));
    }

    #[test]
    fn test_facebook_ipv6() {
        let mut event = human_event();
        event.ip_address = Some("2a03:2880:f12f:83:face:b00c:0:25de".to_string());
        let verdict = classify(&event, &[]);
        assert_eq!(verdict.reasons, vec![REASON_FACEBOOK_IP]);
    }

    #[test]
    fn test_facebook_ip_keeps_ua_label() {
        let mut event = human_event();
        event.user_agent = Some("facebookexternalhit/1.1 (+http://www.facebook.com/externalhit)".into());
        event.ip_address = Some("69.171.249.1".to_string());
        let verdict = classify(&event, &[]);
        assert_eq!(verdict.reasons, vec![REASON_BOT_UA, REASON_FACEBOOK_IP]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Facebook Crawler"));
    }

    #[test]
    fn test_custom_ip_rule_first_match() {
        let mut event = human_event();
        event.ip_address = Some("10.20.30.40".to_string());
        let rules = vec![
            CustomBotRule::new("r1", RuleType::IpPrefix, "10.20.", Some("Office VPN")),
            CustomBotRule::new("r2", RuleType::IpPrefix, "10.", Some("Private Range")),
        ];
        let verdict = classify(&event, &rules);
        assert_eq!(verdict.reasons, vec![REASON_CUSTOM_IP_RULE]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Office VPN"));
    }

    #[test]
    fn test_custom_ip_rule_does_not_override_label() {
        let mut event = human_event();
        event.ip_address = Some("173.252.90.1".to_string());
        let rules = vec![CustomBotRule::new("r1", RuleType::IpPrefix, "173.", Some("Range"))];
        let verdict = classify(&event, &rules);
        assert_eq!(verdict.reasons, vec![REASON_FACEBOOK_IP, REASON_CUSTOM_IP_RULE]);
        assert_eq!(verdict.bot_type.as_deref(), Some("Facebook Prefetcher"));
    }

    #[test]
    fn test_missing_fingerprint() {
        let mut event = human_event();
        event.screen_resolution = None;
        event.viewport = None;
        event.language = Some(" ".to_string());
        event.browser = None;
        let verdict = classify(&event, &[]);
        assert!(verdict.is_bot);
        assert_eq!(
            verdict.reasons,
            vec!["no_fingerprint:screen_resolution,viewport,language,browser".to_string()]
        );
        assert_eq!(verdict.bot_type.as_deref(), Some("No Browser Fingerprint"));
    }

    #[test]
    fn test_three_missing_fingerprint_fields_is_human() {
        let mut event = human_event();
        event.screen_resolution = None;
        event.viewport = None;
        event.language = None;
        let verdict = classify(&event, &[]);
        assert!(!verdict.is_bot);
    }

    #[test]
    fn test_reasons_accumulate_across_categories() {
        let event = TrackingEvent {
            user_agent: Some("Googlebot".to_string()),
            ip_address: Some("66.220.149.20".to_string()),
            ..TrackingEvent::new("s-2", EventType::PageLand)
        };
        let verdict = classify(&event, &[]);
        assert_eq!(verdict.reasons.len(), 3);
        assert_eq!(verdict.reasons[0], REASON_BOT_UA);
        assert_eq!(verdict.reasons[1], REASON_FACEBOOK_IP);
        assert!(verdict.reasons[2].starts_with("no_fingerprint:"));
        assert_eq!(verdict.bot_type.as_deref(), Some("Google Bot"));
    }

    #[test]
    fn test_substituted_lists() {
        let classifier = BotClassifier::new(
            vec![UaPattern::new("acme", "Acme").unwrap()],
            vec!["192.0.2.".to_string()],
        );
        let event = TrackingEvent {
            user_agent: Some(format!("{} Googlebot", CHROME_UA)),
            ip_address: Some("192.0.2.10".to_string()),
            ..human_event()
        };
        let verdict = classifier.classify(&event.fingerprint(), &[]);
        assert_eq!(verdict.reasons, vec![REASON_FACEBOOK_IP]);
        assert_eq!(classifier.ua_pattern_count(), 1);
    }

    #[test]
    fn test_is_bot_user_agent() {
        assert!(is_bot_user_agent("Mozilla/5.0 (compatible; bingbot/2.0)"));
        assert!(is_bot_user_agent("UptimeRobot/2.0"));
        assert!(!is_bot_user_agent(CHROME_UA));
        // Only the static list: short user agents are not flagged here
        assert!(!is_bot_user_agent("Mozilla/5.0"));
    }

    #[test]
    fn test_all_builtin_patterns_compile() {
        assert_eq!(default_classifier().ua_pattern_count(), DEFAULT_UA_PATTERNS.len());
    }
}
