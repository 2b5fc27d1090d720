use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - CORS credentials are not combined with a wildcard origin
/// - Queue size is positive
/// - Recommendation thresholds are ordered
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let server = &config.server;
    if server.cors_supports_credentials && server.cors.iter().any(|o| o == "*") {
        return Err(ConfigError::ValidationError(
            "server.cors_supports_credentials requires explicit origins, not \"*\"".to_string(),
        ));
    }
    if let Some(origin) = server
        .cors
        .iter()
        .find(|o| *o != "*" && !(o.starts_with("http://") || o.starts_with("https://")))
    {
        return Err(ConfigError::ValidationError(format!(
            "server.cors origin {:?} must start with http:// or https://",
            origin
        )));
    }

    if config.import.queue_size == 0 {
        return Err(ConfigError::ValidationError(
            "import.queue_size must be at least 1".to_string(),
        ));
    }

    let matching = &config.matching;
    if matching.strong_rec_thresh < 0.0 || matching.medium_rec_thresh > 1.0 {
        return Err(ConfigError::ValidationError(
            "match thresholds must lie within [0, 1]".to_string(),
        ));
    }
    if matching.strong_rec_thresh > matching.medium_rec_thresh {
        return Err(ConfigError::ValidationError(format!(
            "match.strong_rec_thresh ({}) exceeds match.medium_rec_thresh ({})",
            matching.strong_rec_thresh, matching.medium_rec_thresh
        )));
    }

    if config.events.buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "events.buffer_size must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchConfig, ServerConfig};

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                port: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_cors_credentials_with_wildcard_fails() {
        let mut config = Config::default();
        config.server.cors = vec!["*".to_string()];
        assert!(validate_config(&config).is_ok());

        config.server.cors_supports_credentials = true;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("cors_supports_credentials"));
    }

    #[test]
    fn test_validate_cors_origin_needs_scheme() {
        let mut config = Config::default();
        config.server.cors = vec!["example.com".to_string()];
        assert!(validate_config(&config).is_err());

        config.server.cors = vec!["https://example.com".to_string()];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_queue_fails() {
        let mut config = Config::default();
        config.import.queue_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_inverted_thresholds_fail() {
        let config = Config {
            matching: MatchConfig {
                strong_rec_thresh: 0.5,
                medium_rec_thresh: 0.2,
                max_candidates: 5,
            },
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("strong_rec_thresh"));
    }
}
