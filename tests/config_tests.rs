use repair_scan::config::AppConfig;
use repair_scan::extraction::SuccessPolicy;
use std::io::Write;
use tempfile::NamedTempFile;

#[cfg(test)]
mod tests {
    use super::*;

    fn env_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp env file");
        file.write_all(contents.as_bytes())
            .expect("Failed to write temp env file");
        file
    }

    /// Test loading a complete deployment env file
    #[test]
    fn test_env_file_round_trip() {
        let file = env_file(
            "# deployment settings\n\
             VITE_GEMINI_API_KEY=legacy-key\n\
             SCAN_PORT=9100\n\
             SCAN_ATTEMPT_TIMEOUT_SECS=20\n\
             SCAN_INTER_ATTEMPT_DELAY_MS=250\n\
             SCAN_SUCCESS_POLICY=any-parsed-json\n\
             LOG_FORMAT=pretty\n",
        );

        let config = AppConfig::from_env_file(file.path()).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.scan.credential(), Some("legacy-key"));
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.scan.recovery.attempt_timeout_secs, 20);
        assert_eq!(config.scan.recovery.inter_attempt_delay_ms, 250);
        assert_eq!(config.scan.success_policy, SuccessPolicy::AnyParsedJson);
        assert!(config.observability.use_pretty_logs());
        assert!(!config.summary().contains("legacy-key"));
    }

    /// Test that out-of-range values load but fail validation
    #[test]
    fn test_env_file_with_invalid_values() {
        let file = env_file("SCAN_API_KEY=k\nSCAN_ATTEMPT_TIMEOUT_SECS=0\n");
        let config = AppConfig::from_env_file(file.path()).unwrap();
        assert!(config.validate().is_err());

        let file = env_file("SCAN_API_KEY=k\nSCAN_INTER_ATTEMPT_DELAY_MS=soon\n");
        assert!(AppConfig::from_env_file(file.path()).is_err());
    }

    /// Test an env file without any credential
    #[test]
    fn test_env_file_without_credential() {
        let file = env_file("SCAN_PORT=8787\n");
        let config = AppConfig::from_env_file(file.path()).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SCAN_API_KEY"));
    }

    #[test]
    fn test_missing_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::from_env_file(dir.path().join("absent.env"));
        assert!(result.is_err());
    }
}
