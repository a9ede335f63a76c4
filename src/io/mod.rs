//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `capi` - HTTPS client for the Conversions API
//! - `egress` - Processed event output to file (JSONL format)

pub mod capi;
pub mod egress;

// Re-export commonly used types
pub use capi::{CapiClient, CapiError, CapiResponse, SignalResult};
pub use egress::Egress;
