//! # Repair Scan
//!
//! Reads vehicle registration documents for an auto-repair shop by walking an
//! ordered chain of vision-model providers until one returns usable JSON, and
//! merges the result into repair agreements.

pub mod agreement;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod image_prep;
pub mod localization;
pub mod observability;
pub mod orchestrator;
pub mod providers;
pub mod response_parser;
pub mod scan_config;
pub mod scan_errors;
pub mod server;
pub mod validation;

// Re-export types for easier access
pub use extraction::{ExtractionRequest, ExtractionResult, SuccessPolicy};
pub use orchestrator::{ExtractionOrchestrator, ScanOutcome};
pub use scan_config::{ProviderAttempt, ScanConfig};
pub use scan_errors::{AttemptFailure, FailureKind, ScanError};
