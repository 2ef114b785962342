use super::{types::AppConfig, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one worker thread
/// - Tool paths are not empty
/// - Known format set is not empty and contains every lossless format
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.batch.threads == 0 {
        return Err(ConfigError::ValidationError(
            "batch.threads cannot be 0".to_string(),
        ));
    }

    if config.converter.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffmpeg_path cannot be empty".to_string(),
        ));
    }

    if config.converter.qaac_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.qaac_path cannot be empty".to_string(),
        ));
    }

    if config.formats.known.is_empty() {
        return Err(ConfigError::ValidationError(
            "formats.known cannot be empty".to_string(),
        ));
    }

    if let Some(ext) = config
        .formats
        .lossless
        .iter()
        .find(|ext| !config.formats.known.contains(*ext))
    {
        return Err(ConfigError::ValidationError(format!(
            "formats.lossless entry '{}' is not in formats.known",
            ext
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_threads_fails() {
        let mut config = AppConfig::default();
        config.batch.threads = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_empty_ffmpeg_path_fails() {
        let mut config = AppConfig::default();
        config.converter.ffmpeg_path = PathBuf::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_lossless_outside_known_fails() {
        let mut config = AppConfig::default();
        config.formats.lossless.insert("dsf".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("dsf"));
    }
}
