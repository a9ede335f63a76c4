//! Services - business logic
//!
//! This module contains the core event-processing services:
//! - `bot_classifier` - Ordered bot/crawler detection over untrusted event fields
//! - `lead_scorer` - Budget parsing and lead tier scoring
//! - `conversion` - Conversions API event construction (hashed user data)
//! - `pipeline` - Per-event classify → tier → signal hand-off
//! - `signal_worker` - Async dispatch worker for conversion signals

pub mod bot_classifier;
pub mod conversion;
pub mod lead_scorer;
pub mod pipeline;
pub mod signal_worker;

// Re-export commonly used types
pub use bot_classifier::{
    default_classifier, is_bot_user_agent, load_rules_from_file, BotClassifier, CompiledRules,
};
pub use pipeline::SignalPipeline;
pub use signal_worker::{create_signal_worker, SignalCmd, SignalKind, SignalWorker};
