//! # Scan Configuration Module
//!
//! This module defines configuration structures for the vehicle document scan,
//! including the ordered provider attempt list, recovery settings and image
//! preparation parameters.

use crate::errors::{AppError, AppResult};
use crate::extraction::SuccessPolicy;

// Constants for scan configuration
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v1beta";
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_INTER_ATTEMPT_DELAY_MS: u64 = 500;
pub const MAX_INPUT_BYTES: usize = 15 * 1024 * 1024; // 15MB limit for raw photos

/// Request/response envelope shared by a class of inference APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    /// `models/<model>:generateContent` with inline base64 parts
    InlineContent,
    /// OpenAI-style `chat/completions` with a data-URL image part
    ChatCompletion,
}

/// How the credential is attached to a provider request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// `?key=<credential>` query parameter
    QueryKey,
    /// `Authorization: Bearer <credential>` header
    Bearer,
}

/// One candidate way of asking for extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    /// Base URL of the provider, without trailing slash
    pub provider_endpoint: String,
    pub model_identifier: String,
    /// API version path segment; inline-content providers default to `v1beta`
    pub api_version: Option<String>,
    pub auth_method: AuthMethod,
    pub family: ProviderFamily,
    /// Extra headers sent verbatim (e.g. `HTTP-Referer`, `X-Title`)
    pub attribution_headers: Vec<(String, String)>,
}

impl ProviderAttempt {
    /// Inline-content attempt authenticated with a query key
    pub fn inline_content(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_version: Option<&str>,
    ) -> Self {
        Self {
            provider_endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model_identifier: model.into(),
            api_version: api_version.map(str::to_string),
            auth_method: AuthMethod::QueryKey,
            family: ProviderFamily::InlineContent,
            attribution_headers: Vec::new(),
        }
    }

    /// Chat-completion attempt authenticated with a bearer token
    pub fn chat_completion(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model_identifier: model.into(),
            api_version: None,
            auth_method: AuthMethod::Bearer,
            family: ProviderFamily::ChatCompletion,
            attribution_headers: Vec::new(),
        }
    }

    pub fn with_auth(mut self, auth_method: AuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    /// Add the attribution headers some chat-completion gateways ask for
    pub fn with_attribution(mut self, referer: &str, title: &str) -> Self {
        self.attribution_headers
            .push(("HTTP-Referer".to_string(), referer.to_string()));
        self.attribution_headers
            .push(("X-Title".to_string(), title.to_string()));
        self
    }

    /// API version actually used in the request path
    pub fn effective_api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    /// Validate a single attempt entry
    pub fn validate(&self) -> AppResult<()> {
        if !self.provider_endpoint.starts_with("http://")
            && !self.provider_endpoint.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "provider endpoint must be an http(s) URL, got '{}'",
                self.provider_endpoint
            )));
        }
        if self.model_identifier.trim().is_empty() {
            return Err(AppError::Config(
                "model identifier cannot be empty".to_string(),
            ));
        }
        if let Some(version) = &self.api_version {
            if version.trim().is_empty() || version.contains('/') {
                return Err(AppError::Config(format!(
                    "api version '{}' must be a single path segment",
                    version
                )));
            }
        }
        Ok(())
    }
}

/// Default fallback chain: cheap and fast first, most capable last
pub fn default_attempts() -> Vec<ProviderAttempt> {
    ["gemini-1.5-flash", "gemini-1.5-pro", "gemini-2.0-flash"]
        .iter()
        .map(|model| {
            ProviderAttempt::inline_content(GEMINI_BASE_URL, *model, Some(DEFAULT_API_VERSION))
        })
        .collect()
}

/// Recovery configuration for the fallback chain
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Timeout for a single provider call in seconds
    pub attempt_timeout_secs: u64,
    /// Fixed pause between two attempts in milliseconds (0 disables it)
    pub inter_attempt_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            inter_attempt_delay_ms: DEFAULT_INTER_ATTEMPT_DELAY_MS,
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.attempt_timeout_secs == 0 {
            return Err(AppError::Config(
                "attempt_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.attempt_timeout_secs > 300 {
            return Err(AppError::Config(
                "attempt_timeout_secs cannot be greater than 300 seconds".to_string(),
            ));
        }
        if self.inter_attempt_delay_ms > 10_000 {
            return Err(AppError::Config(format!(
                "inter_attempt_delay_ms ({}) cannot exceed 10000",
                self.inter_attempt_delay_ms
            )));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn inter_attempt_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.inter_attempt_delay_ms)
    }
}

/// Parameters of the resize/re-encode step applied before extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePrepConfig {
    /// Images wider than this are scaled down proportionally
    pub max_width: u32,
    /// JPEG quality as a fraction in (0, 1]
    pub quality: f32,
    /// Raw payloads above this size are rejected before decoding
    pub max_input_bytes: usize,
}

impl ImagePrepConfig {
    /// Document scans keep more detail for small print
    pub fn document() -> Self {
        Self {
            max_width: 1200,
            quality: 0.85,
            max_input_bytes: MAX_INPUT_BYTES,
        }
    }

    /// General photos, sized to stay well under serverless payload limits
    pub fn photo() -> Self {
        Self {
            max_width: 1000,
            quality: 0.7,
            max_input_bytes: MAX_INPUT_BYTES,
        }
    }

    /// Validate image preparation parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.max_width == 0 {
            return Err(AppError::Config(
                "max_width must be greater than 0".to_string(),
            ));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(AppError::Config(format!(
                "quality ({}) must be within (0, 1]",
                self.quality
            )));
        }
        if self.max_input_bytes == 0 {
            return Err(AppError::Config(
                "max_input_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ImagePrepConfig {
    fn default() -> Self {
        Self::photo()
    }
}

/// Configuration handed to the orchestrator at construction; immutable afterwards
#[derive(Clone)]
pub struct ScanConfig {
    /// The single provider secret; absence is reported before any attempt
    pub credential: Option<String>,
    /// Attempts in priority order
    pub attempts: Vec<ProviderAttempt>,
    pub recovery: RecoveryConfig,
    pub success_policy: SuccessPolicy,
    pub image_prep: ImagePrepConfig,
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("attempts", &self.attempts)
            .field("recovery", &self.recovery)
            .field("success_policy", &self.success_policy)
            .field("image_prep", &self.image_prep)
            .finish()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            credential: None,
            attempts: default_attempts(),
            recovery: RecoveryConfig::default(),
            success_policy: SuccessPolicy::default(),
            image_prep: ImagePrepConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<ProviderAttempt>) -> Self {
        self.attempts = attempts;
        self
    }

    /// The credential, if one is configured and non-blank
    pub fn credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Validate scan configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.credential().is_none() {
            return Err(AppError::Config(
                "a provider API key is required (set SCAN_API_KEY)".to_string(),
            ));
        }
        if self.attempts.is_empty() {
            return Err(AppError::Config(
                "at least one provider attempt must be configured".to_string(),
            ));
        }
        for attempt in &self.attempts {
            attempt.validate()?;
        }

        // Validate nested configurations
        self.recovery.validate()?;
        self.image_prep.validate()?;

        Ok(())
    }
}
