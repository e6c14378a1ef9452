use crate::config::error::ConfigError;
use crate::config::error::Result;
use crate::config::loader::LedgerConfig;
use url::Url;

/// Validate a fully merged configuration.
///
/// All problems are collected and reported together in a single
/// [`ConfigError::ValidationError`].
pub fn validate(config: &LedgerConfig) -> Result<()> {
    let mut errors = Vec::new();

    match Url::parse(&config.server.origin) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(format!(
            "server.origin must use http or https, got '{}'",
            url.scheme()
        )),
        Err(e) => errors.push(format!("server.origin is not a valid URL: {e}")),
    }

    for (key, value) in [
        ("server.channel_path", &config.server.channel_path),
        ("server.entries_path", &config.server.entries_path),
        ("server.sync_path", &config.server.sync_path),
    ] {
        if !value.starts_with('/') {
            errors.push(format!("{key} must start with '/', got '{value}'"));
        }
    }

    for (key, value) in [
        ("sync.reconnect_delay_ms", config.sync.reconnect_delay_ms),
        ("sync.reconcile_interval_ms", config.sync.reconcile_interval_ms),
        ("sync.request_timeout_ms", config.sync.request_timeout_ms),
    ] {
        if value == 0 {
            errors.push(format!("{key} must be greater than zero"));
        }
    }
    if config.sync.ping_interval_ms == Some(0) {
        errors.push("sync.ping_interval_ms must be greater than zero when set".to_string());
    }

    if !is_cache_name(&config.cache.version) {
        errors.push(format!(
            "cache.version '{}' may only contain ASCII letters, digits, '.', '_' and '-'",
            config.cache.version
        ));
    }
    for resource in &config.cache.precache {
        if !resource.starts_with('/') {
            errors.push(format!(
                "cache.precache entry '{resource}' must be an absolute path"
            ));
        }
    }
    if config.cache.passthrough.iter().any(String::is_empty) {
        errors.push("cache.passthrough entries must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

/// Cache names double as directory names on disk.
pub fn is_cache_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&LedgerConfig::default()).is_ok());
    }

    #[test]
    fn relative_paths_are_rejected() {
        let mut config = LedgerConfig::default();
        config.server.channel_path = "ws".to_string();
        config.cache.precache.push("index.html".to_string());

        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("server.channel_path"), "got: {err}");
        assert!(err.contains("index.html"), "got: {err}");
    }

    #[test]
    fn cache_names_are_restricted() {
        assert!(is_cache_name("ledger-v1.0.0"));
        assert!(!is_cache_name(""));
        assert!(!is_cache_name(".."));
        assert!(!is_cache_name("a/b"));

        let mut config = LedgerConfig::default();
        config.cache.version = "../escape".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_ping_interval_is_rejected() {
        let mut config = LedgerConfig::default();
        config.sync.ping_interval_ms = Some(0);
        assert!(validate(&config).is_err());
    }
}
