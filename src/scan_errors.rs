//! # Scan Error Types Module
//!
//! This module defines the error taxonomy of the vehicle document scan:
//! fatal invocation errors ([`ScanError`]) and the non-fatal per-attempt
//! records ([`AttemptFailure`]) collected while walking the fallback chain.

use serde::Serialize;

/// Longest slice of a provider response body kept in a failure message
pub const MAX_FAILURE_BODY_CHARS: usize = 500;

/// Why a single provider attempt did not produce a usable result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-2xx status, network exception or timeout
    Transport,
    /// Success status without any usable text
    EmptyResponse,
    /// Text present but no JSON object could be recovered from it
    Parse,
    /// JSON parsed but every field was null and the success policy requires one
    NoUsableFields,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::EmptyResponse => "empty_response",
            FailureKind::Parse => "parse",
            FailureKind::NoUsableFields => "no_usable_fields",
        }
    }
}

/// One failed attempt of the fallback chain
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFailure {
    /// Zero-based position of the attempt in the configured list
    pub attempt_index: usize,
    pub provider_endpoint: String,
    pub model_identifier: String,
    /// HTTP status, when the provider answered at all
    pub http_status: Option<u16>,
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptFailure {
    pub fn new(
        attempt_index: usize,
        attempt: &crate::scan_config::ProviderAttempt,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            attempt_index,
            provider_endpoint: attempt.provider_endpoint.clone(),
            model_identifier: attempt.model_identifier.clone(),
            http_status: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.http_status {
            Some(status) => write!(
                f,
                "#{} {} ({}, HTTP {}): {}",
                self.attempt_index,
                self.model_identifier,
                self.kind.as_str(),
                status,
                self.message
            ),
            None => write!(
                f,
                "#{} {} ({}): {}",
                self.attempt_index,
                self.model_identifier,
                self.kind.as_str(),
                self.message
            ),
        }
    }
}

/// Advisory classification of an exhausted chain, for user-facing messaging only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureHint {
    /// At least one provider answered 429
    RateLimited,
    /// At least one provider answered 404 (model missing or unsupported)
    ModelUnavailable,
    /// Every provider answered but none of them read any data
    EmptyResult,
    Generic,
}

impl FailureHint {
    /// Localization key of the message shown for this hint
    pub fn message_key(&self) -> &'static str {
        match self {
            FailureHint::RateLimited => "scan-rate-limited",
            FailureHint::ModelUnavailable => "scan-model-unavailable",
            FailureHint::EmptyResult => "scan-empty-result",
            FailureHint::Generic => "scan-failed",
        }
    }
}

/// Fatal errors of a scan invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Missing credential or unusable configuration, raised before any attempt
    Configuration(String),
    /// The source image could not be decoded; no provider can help
    ImageDecode(String),
    /// Every configured attempt failed, in attempt order
    AllProvidersExhausted { failures: Vec<AttemptFailure> },
}

impl ScanError {
    /// Per-attempt failures carried by this error (empty for precondition errors)
    pub fn failures(&self) -> &[AttemptFailure] {
        match self {
            ScanError::AllProvidersExhausted { failures } => failures,
            _ => &[],
        }
    }

    /// Advisory hint for the caller's messaging. Never drives control flow.
    pub fn hint(&self) -> FailureHint {
        let failures = self.failures();
        if failures.iter().any(|f| f.http_status == Some(429)) {
            FailureHint::RateLimited
        } else if failures.iter().any(|f| f.http_status == Some(404)) {
            FailureHint::ModelUnavailable
        } else if !failures.is_empty()
            && failures.iter().all(|f| {
                matches!(f.kind, FailureKind::EmptyResponse | FailureKind::NoUsableFields)
            })
        {
            FailureHint::EmptyResult
        } else {
            FailureHint::Generic
        }
    }

    /// Localization key for this error
    pub fn message_key(&self) -> &'static str {
        match self {
            ScanError::Configuration(_) => "scan-config-missing",
            ScanError::ImageDecode(_) => "scan-image-unreadable",
            ScanError::AllProvidersExhausted { .. } => self.hint().message_key(),
        }
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Configuration(msg) => {
                write!(f, "[SCAN_CONFIG] Scan configuration is unusable: {}", msg)
            }
            ScanError::ImageDecode(msg) => {
                write!(f, "[IMAGE_DECODE] Failed to decode source image: {}", msg)
            }
            ScanError::AllProvidersExhausted { failures } => {
                write!(
                    f,
                    "[SCAN_EXHAUSTED] All {} provider attempts failed",
                    failures.len()
                )?;
                for failure in failures {
                    write!(f, "; {}", failure)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ScanError {}

/// Shorten a response body for diagnostics, on a character boundary
pub fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_FAILURE_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut shortened: String = trimmed.chars().take(MAX_FAILURE_BODY_CHARS).collect();
    shortened.push_str("...");
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(status: Option<u16>, kind: FailureKind) -> AttemptFailure {
        AttemptFailure {
            attempt_index: 0,
            provider_endpoint: "https://example.test".to_string(),
            model_identifier: "model-a".to_string(),
            http_status: status,
            kind,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_hint_prefers_rate_limit() {
        let err = ScanError::AllProvidersExhausted {
            failures: vec![
                failure(Some(404), FailureKind::Transport),
                failure(Some(429), FailureKind::Transport),
            ],
        };
        assert_eq!(err.hint(), FailureHint::RateLimited);
        assert_eq!(err.message_key(), "scan-rate-limited");
    }

    #[test]
    fn test_hint_not_found_then_generic() {
        let err = ScanError::AllProvidersExhausted {
            failures: vec![
                failure(None, FailureKind::EmptyResponse),
                failure(Some(404), FailureKind::Transport),
            ],
        };
        assert_eq!(err.hint(), FailureHint::ModelUnavailable);

        let err = ScanError::AllProvidersExhausted {
            failures: vec![failure(Some(500), FailureKind::Transport)],
        };
        assert_eq!(err.hint(), FailureHint::Generic);
    }

    #[test]
    fn test_hint_when_nothing_was_read() {
        let err = ScanError::AllProvidersExhausted {
            failures: vec![
                failure(Some(200), FailureKind::NoUsableFields),
                failure(Some(200), FailureKind::EmptyResponse),
            ],
        };
        assert_eq!(err.hint(), FailureHint::EmptyResult);
        assert_eq!(err.message_key(), "scan-empty-result");

        let err = ScanError::AllProvidersExhausted {
            failures: vec![
                failure(Some(200), FailureKind::NoUsableFields),
                failure(Some(200), FailureKind::Parse),
            ],
        };
        assert_eq!(err.hint(), FailureHint::Generic);
    }

    #[test]
    fn test_precondition_errors_carry_no_failures() {
        let err = ScanError::Configuration("no credential".to_string());
        assert!(err.failures().is_empty());
        assert_eq!(err.message_key(), "scan-config-missing");
        assert!(err.to_string().starts_with("[SCAN_CONFIG]"));
    }

    #[test]
    fn test_exhausted_display_lists_attempts() {
        let err = ScanError::AllProvidersExhausted {
            failures: vec![failure(Some(429), FailureKind::Transport)],
        };
        let text = err.to_string();
        assert!(text.contains("All 1 provider attempts failed"));
        assert!(text.contains("HTTP 429"));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let long = "ت".repeat(MAX_FAILURE_BODY_CHARS + 20);
        let shortened = truncate_body(&long);
        assert!(shortened.ends_with("..."));
        assert_eq!(shortened.chars().count(), MAX_FAILURE_BODY_CHARS + 3);
        assert_eq!(truncate_body("  short  "), "short");
    }
}
