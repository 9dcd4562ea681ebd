//! # Unified Application Configuration
//!
//! This module consolidates every setting of the scan service into a single
//! structured configuration object. Values come from environment variables
//! (optionally seeded from a `.env` file by `dotenvy`), are validated once at
//! startup, and are never mutated afterwards.

use crate::errors::{AppError, AppResult};
use crate::extraction::SuccessPolicy;
use crate::scan_config::{
    ImagePrepConfig, ScanConfig, DEFAULT_ATTEMPT_TIMEOUT_SECS, DEFAULT_INTER_ATTEMPT_DELAY_MS,
};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Environment variables consulted for the provider credential, in priority order
pub const CREDENTIAL_VARS: [&str; 3] = ["SCAN_API_KEY", "GEMINI_API_KEY", "VITE_GEMINI_API_KEY"];

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port serving `/api/scan`, `/health/live` and `/metrics`
    pub port: u16,
    /// Allow binding to privileged ports (< 1024)
    pub allow_privileged_ports: bool,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
    /// Run image preparation on uploads before extraction
    pub prepare_images: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            allow_privileged_ports: false,
            max_body_bytes: 25 * 1024 * 1024, // base64 of a 15MB photo plus envelope
            prepare_images: true,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("Server host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }
        if !self.allow_privileged_ports && self.port < 1024 {
            return Err(AppError::Config(format!(
                "Server port {} is privileged. Set ALLOW_PRIVILEGED_PORTS=true or use port >= 1024",
                self.port
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(AppError::Config("Maximum body size cannot be 0".to_string()));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// Level for this crate's events
    pub log_level: String,
    /// `json` or `pretty`
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Pretty output in development or when explicitly requested
    pub fn use_pretty_logs(&self) -> bool {
        self.is_development() || self.log_format.eq_ignore_ascii_case("pretty")
    }

    pub fn validate(&self) -> AppResult<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "LOG_LEVEL must be one of {:?}, got '{}'",
                LEVELS, self.log_level
            )));
        }
        if !matches!(self.log_format.to_lowercase().as_str(), "json" | "pretty") {
            return Err(AppError::Config(format!(
                "LOG_FORMAT must be 'json' or 'pretty', got '{}'",
                self.log_format
            )));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Provider chain, credential and recovery settings
    pub scan: ScanConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Logging configuration
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from a dotenv-style file, ignoring the process environment
    pub fn from_env_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            AppError::Config(format!("Cannot read env file {}: {}", path.display(), e))
        })?;
        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                AppError::Config(format!("Malformed env file {}: {}", path.display(), e))
            })?;
            values.insert(key, value);
        }
        Self::from_lookup(|key| values.get(key).cloned())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Load scan configuration
        config.scan.credential = CREDENTIAL_VARS
            .iter()
            .filter_map(|key| lookup(*key))
            .find(|value| !value.trim().is_empty());

        config.scan.recovery.attempt_timeout_secs = parse_or(
            &lookup,
            "SCAN_ATTEMPT_TIMEOUT_SECS",
            DEFAULT_ATTEMPT_TIMEOUT_SECS,
        )?;
        config.scan.recovery.inter_attempt_delay_ms = parse_or(
            &lookup,
            "SCAN_INTER_ATTEMPT_DELAY_MS",
            DEFAULT_INTER_ATTEMPT_DELAY_MS,
        )?;
        if let Some(policy) = lookup("SCAN_SUCCESS_POLICY") {
            config.scan.success_policy = policy
                .parse::<SuccessPolicy>()
                .map_err(|e| AppError::Config(format!("SCAN_SUCCESS_POLICY: {}", e)))?;
        }
        if let Some(preset) = lookup("SCAN_IMAGE_PRESET") {
            config.scan.image_prep = match preset.trim().to_lowercase().as_str() {
                "document" => ImagePrepConfig::document(),
                "photo" => ImagePrepConfig::photo(),
                other => {
                    return Err(AppError::Config(format!(
                        "SCAN_IMAGE_PRESET must be 'document' or 'photo', got '{}'",
                        other
                    )))
                }
            };
        }

        // Load server configuration
        if let Some(host) = lookup("SCAN_HOST") {
            config.server.host = host;
        }
        config.server.port = parse_or(&lookup, "SCAN_PORT", config.server.port)?;
        config.server.allow_privileged_ports = flag_or(&lookup, "ALLOW_PRIVILEGED_PORTS", false);
        config.server.prepare_images = flag_or(&lookup, "SCAN_PREPARE_IMAGES", true);

        // Load observability configuration
        if let Some(environment) = lookup("ENVIRONMENT") {
            config.observability.environment = environment;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.observability.log_level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.observability.log_format = format;
        }

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.scan.validate()?;
        self.server.validate()?;
        self.observability.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        let models: Vec<&str> = self
            .scan
            .attempts
            .iter()
            .map(|a| a.model_identifier.as_str())
            .collect();
        format!(
            "Configuration: api_key={}, port={}, models=[{}], attempt_timeout_secs={}, inter_attempt_delay_ms={}, success_policy={}, prepare_images={}",
            if self.scan.credential().is_some() { "[REDACTED]" } else { "[MISSING]" },
            self.server.port,
            models.join(", "),
            self.scan.recovery.attempt_timeout_secs,
            self.scan.recovery.inter_attempt_delay_ms,
            self.scan.success_policy.as_str(),
            self.server.prepare_images
        )
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid number", key))),
        None => Ok(default),
    }
}

fn flag_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}
