//! # Extraction Orchestrator
//!
//! Walks the configured fallback chain for one vehicle document scan.
//!
//! Every invocation runs the same state machine:
//!
//! ```text
//! Pending -> Dispatching -> ResponseReceived -> Validating -> Succeeded
//!                 ^                                   |
//!                 +------- AttemptFailed <------------+
//!                               |
//!                               v (no attempts left)
//!                           AllFailed
//! ```
//!
//! Attempts run strictly one after another, each at most once, with a fixed
//! delay between them. The orchestrator holds nothing but immutable
//! configuration and the transport, so concurrent scans never interact.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn, Instrument};

use crate::errors::error_logging;
use crate::extraction::{ExtractionRequest, ExtractionResult, SuccessPolicy};
use crate::image_prep::prepare_image;
use crate::observability;
use crate::providers::{adapter_for, HttpResponse, ReqwestTransport, Transport, TransportError};
use crate::response_parser::parse_payload;
use crate::scan_config::{ImagePrepConfig, ProviderAttempt, ScanConfig};
use crate::scan_errors::{truncate_body, AttemptFailure, FailureKind, ScanError};
use crate::validation::field_warnings;

/// Instruction sent with every image, identical for all providers
pub const EXTRACTION_INSTRUCTION: &str = "You are reading a vehicle registration document. \
Extract these fields: vin, brand, model, year, color, plateNumbers, plateLetters, customerName, idNumber. \
Write brand, color and customerName in Arabic script. \
vin is the 17-character chassis number. idNumber is the 10-digit national ID of the owner. year is the 4-digit model year. \
Use null for any field you cannot read. \
Return raw JSON only, a single object with exactly these keys, without markdown or commentary.";

/// Where an invocation currently is in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Pending,
    Dispatching,
    ResponseReceived,
    Validating,
    Succeeded,
    AttemptFailed,
    AllFailed,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Pending => "pending",
            ScanPhase::Dispatching => "dispatching",
            ScanPhase::ResponseReceived => "response_received",
            ScanPhase::Validating => "validating",
            ScanPhase::Succeeded => "succeeded",
            ScanPhase::AttemptFailed => "attempt_failed",
            ScanPhase::AllFailed => "all_failed",
        }
    }
}

/// A successful scan and the failures that preceded it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub result: ExtractionResult,
    /// Zero-based index of the attempt that succeeded
    pub attempt_index: usize,
    pub model_identifier: String,
    /// Failures of every earlier attempt, in order
    pub failures: Vec<AttemptFailure>,
}

/// Sequential multi-provider extraction
pub struct ExtractionOrchestrator {
    config: ScanConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ExtractionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExtractionOrchestrator {
    pub fn new(config: ScanConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Orchestrator talking to real providers over HTTPS
    pub fn with_reqwest(config: ScanConfig) -> Self {
        Self::new(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan already-encoded image bytes
    pub async fn extract(&self, image_bytes: &[u8], mime_type: &str) -> Result<ScanOutcome, ScanError> {
        let request = ExtractionRequest::new(image_bytes, mime_type);
        self.extract_request(&request).await
    }

    /// Prepare a raw photo, then scan it
    pub async fn scan_image(
        &self,
        raw: &[u8],
        prep: &ImagePrepConfig,
    ) -> Result<ScanOutcome, ScanError> {
        // A missing key must win over an unreadable photo
        if let Err(err) = self.check_configuration() {
            error_logging::log_scan_error(&err, "scan_preflight", Some(raw.len()), None, None);
            observability::record_scan_metrics(false, Duration::ZERO, raw.len());
            return Err(err);
        }
        let prepared = prepare_image(raw, prep)?;
        self.extract_request(&prepared.into_request()).await
    }

    pub async fn extract_request(&self, request: &ExtractionRequest) -> Result<ScanOutcome, ScanError> {
        let span = observability::scan_span(self.config.attempts.len(), request.image_bytes.len());
        self.run_chain(request).instrument(span).await
    }

    async fn run_chain(&self, request: &ExtractionRequest) -> Result<ScanOutcome, ScanError> {
        let start_time = Instant::now();
        let mut phase = ScanPhase::Pending;
        debug!(phase = phase.as_str(), "Scan requested");

        let credential = match self.preflight(request) {
            Ok(credential) => credential,
            Err(err) => {
                error_logging::log_scan_error(
                    &err,
                    "scan_preflight",
                    Some(request.image_bytes.len()),
                    None,
                    None,
                );
                observability::record_scan_metrics(false, start_time.elapsed(), request.image_bytes.len());
                return Err(err);
            }
        };

        let timeout = self.config.recovery.attempt_timeout();
        let delay = self.config.recovery.inter_attempt_delay();
        let total = self.config.attempts.len();
        let mut failures: Vec<AttemptFailure> = Vec::with_capacity(total);

        for (index, attempt) in self.config.attempts.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                debug!(delay_ms = delay.as_millis() as u64, "Waiting before next attempt");
                tokio::time::sleep(delay).await;
            }

            let span = observability::attempt_span(index, &attempt.model_identifier);
            let outcome = self
                .run_attempt(index, attempt, credential, request, timeout)
                .instrument(span)
                .await;

            match outcome {
                Ok(result) => {
                    phase = ScanPhase::Succeeded;
                    observability::record_attempt(&attempt.model_identifier, "success");
                    observability::record_scan_metrics(true, start_time.elapsed(), request.image_bytes.len());
                    info!(
                        phase = phase.as_str(),
                        attempt = index,
                        model = %attempt.model_identifier,
                        fields = result.field_count(),
                        prior_failures = failures.len(),
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Vehicle document scan succeeded"
                    );
                    return Ok(ScanOutcome {
                        result,
                        attempt_index: index,
                        model_identifier: attempt.model_identifier.clone(),
                        failures,
                    });
                }
                Err(failure) => {
                    phase = ScanPhase::AttemptFailed;
                    observability::record_attempt(&attempt.model_identifier, failure.kind.as_str());
                    warn!(
                        phase = phase.as_str(),
                        attempt = index,
                        remaining = total - index - 1,
                        "Attempt failed: {}",
                        failure
                    );
                    failures.push(failure);
                }
            }
        }

        phase = ScanPhase::AllFailed;
        let err = ScanError::AllProvidersExhausted { failures };
        let duration = start_time.elapsed();
        debug!(phase = phase.as_str(), "Fallback chain exhausted");
        observability::record_scan_metrics(false, duration, request.image_bytes.len());
        error_logging::log_scan_error(
            &err,
            "scan_fallback_chain",
            Some(request.image_bytes.len()),
            Some(total),
            Some(duration),
        );
        Err(err)
    }

    /// Credential and attempt list; checked before any image work or transport call
    fn check_configuration(&self) -> Result<&str, ScanError> {
        let credential = self.config.credential().ok_or_else(|| {
            ScanError::Configuration("no provider credential configured".to_string())
        })?;
        if self.config.attempts.is_empty() {
            return Err(ScanError::Configuration(
                "no provider attempts configured".to_string(),
            ));
        }
        Ok(credential)
    }

    /// Checks that must pass before the first transport call
    fn preflight(&self, request: &ExtractionRequest) -> Result<&str, ScanError> {
        let credential = self.check_configuration()?;
        if request.image_bytes.is_empty() {
            return Err(ScanError::ImageDecode("image payload is empty".to_string()));
        }
        Ok(credential)
    }

    async fn run_attempt(
        &self,
        index: usize,
        attempt: &ProviderAttempt,
        credential: &str,
        request: &ExtractionRequest,
        timeout: Duration,
    ) -> Result<ExtractionResult, AttemptFailure> {
        debug!(phase = ScanPhase::Dispatching.as_str(), "Dispatching attempt");
        let adapter = adapter_for(attempt.family);
        let http_request = adapter.build_request(attempt, credential, EXTRACTION_INSTRUCTION, request);

        let attempt_start = Instant::now();
        // The attempt bound holds whatever the transport does with `timeout`
        let response = match tokio::time::timeout(timeout, self.transport.post_json(http_request, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
        .map_err(|e| AttemptFailure::new(index, attempt, FailureKind::Transport, e.to_string()))?;

        debug!(
            phase = ScanPhase::ResponseReceived.as_str(),
            status = response.status,
            elapsed_ms = attempt_start.elapsed().as_millis() as u64,
            "Provider answered"
        );

        evaluate_response(index, attempt, &response, self.config.success_policy)
    }
}

/// Classify one provider answer: a result that passes `policy`, or the reason it does not
pub fn evaluate_response(
    index: usize,
    attempt: &ProviderAttempt,
    response: &HttpResponse,
    policy: SuccessPolicy,
) -> Result<ExtractionResult, AttemptFailure> {
    if !response.is_success() {
        return Err(AttemptFailure::new(
            index,
            attempt,
            FailureKind::Transport,
            format!("HTTP {}: {}", response.status, truncate_body(&response.body)),
        )
        .with_status(response.status));
    }

    let text = adapter_for(attempt.family)
        .parse_response_text(&response.body)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            AttemptFailure::new(
                index,
                attempt,
                FailureKind::EmptyResponse,
                "provider returned no text",
            )
            .with_status(response.status)
        })?;

    debug!(phase = ScanPhase::Validating.as_str(), text_len = text.len(), "Parsing model output");

    let parse_failure = |message: String| {
        AttemptFailure::new(index, attempt, FailureKind::Parse, message).with_status(response.status)
    };
    let payload = parse_payload(&text).map_err(|e| parse_failure(e.message))?;
    let result = ExtractionResult::from_value(payload.value).map_err(parse_failure)?;

    if !policy.accepts(&result) {
        return Err(AttemptFailure::new(
            index,
            attempt,
            FailureKind::NoUsableFields,
            format!("every field was null ({} policy)", policy.as_str()),
        )
        .with_status(response.status));
    }

    for warning in field_warnings(&result) {
        debug!(field = warning.field, error = warning.error, "Extracted field has unexpected shape");
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan_config::GEMINI_BASE_URL;

    fn attempt() -> ProviderAttempt {
        ProviderAttempt::inline_content(GEMINI_BASE_URL, "gemini-1.5-flash", None)
    }

    fn gemini_body(text: &str) -> String {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
        .to_string()
    }

    #[test]
    fn test_non_success_status_is_transport_failure() {
        let body = "x".repeat(900);
        let failure = evaluate_response(
            2,
            &attempt(),
            &HttpResponse::new(503, body),
            SuccessPolicy::default(),
        )
        .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Transport);
        assert_eq!(failure.http_status, Some(503));
        assert_eq!(failure.attempt_index, 2);
        assert!(failure.message.chars().count() < 600);
    }

    #[test]
    fn test_blank_text_is_empty_response() {
        let response = HttpResponse::new(200, gemini_body("   \n "));
        let failure =
            evaluate_response(0, &attempt(), &response, SuccessPolicy::default()).unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyResponse);

        let response = HttpResponse::new(200, r#"{"candidates":[]}"#);
        let failure =
            evaluate_response(0, &attempt(), &response, SuccessPolicy::default()).unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyResponse);
    }

    #[test]
    fn test_unparseable_text_is_parse_failure() {
        let response = HttpResponse::new(200, gemini_body("The image is too blurry."));
        let failure =
            evaluate_response(0, &attempt(), &response, SuccessPolicy::default()).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Parse);

        let response = HttpResponse::new(200, gemini_body("[\"vin\"]"));
        let failure =
            evaluate_response(0, &attempt(), &response, SuccessPolicy::default()).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Parse);
    }

    #[test]
    fn test_all_null_payload_depends_on_policy() {
        let response = HttpResponse::new(200, gemini_body(r#"{"vin":null,"brand":null}"#));

        let failure =
            evaluate_response(0, &attempt(), &response, SuccessPolicy::RequireAnyField).unwrap_err();
        assert_eq!(failure.kind, FailureKind::NoUsableFields);

        let result =
            evaluate_response(0, &attempt(), &response, SuccessPolicy::AnyParsedJson).unwrap();
        assert_eq!(result, ExtractionResult::default());
    }

    #[test]
    fn test_fenced_payload_succeeds() {
        let response = HttpResponse::new(
            200,
            gemini_body("```json\n{\"vin\":\"1ABCD23456789EFGH\",\"year\":2021}\n```"),
        );
        let result =
            evaluate_response(0, &attempt(), &response, SuccessPolicy::default()).unwrap();
        assert_eq!(result.vin.as_deref(), Some("1ABCD23456789EFGH"));
        assert_eq!(result.year.as_deref(), Some("2021"));
    }

    #[test]
    fn test_instruction_names_every_field() {
        for (name, _) in ExtractionResult::default().fields() {
            assert!(EXTRACTION_INSTRUCTION.contains(name), "missing {name}");
        }
    }
}
