use std::path::Path;

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Load a config file, optionally deep-merge an overlay, and validate.
///
/// Merge order is `Config::default() <- path <- overlay`.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] when either file is missing. Parse
/// errors name the offending file.
pub fn load_config(path: &Path, overlay: Option<&Path>) -> Result<Config, ConfigError> {
    let content = read_existing(path)?;
    let mut config =
        merge_configs(&Config::default(), &content).map_err(|e| e.in_file(path))?;
    tracing::debug!(path = %path.display(), "loaded config");

    if let Some(overlay) = overlay {
        let overlay_content = read_existing(overlay)?;
        config = merge_configs(&config, &overlay_content).map_err(|e| e.in_file(overlay))?;
        tracing::debug!(path = %overlay.display(), "applied config overlay");
    }

    check(&config)?;
    Ok(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// Useful for tests or one-off parsing without file I/O.
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::parse("string", e))?;
    check(&config)?;
    Ok(config)
}

fn read_existing(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Validate and surface the first violation; the rest are logged.
fn check(config: &Config) -> Result<(), ConfigError> {
    let mut errors = match validate(config) {
        Ok(()) => return Ok(()),
        Err(errors) => errors.into_iter(),
    };
    let first = errors.next().unwrap_or_else(|| ConfigError::Invalid {
        field: "config".to_string(),
        message: "validation failed".to_string(),
    });
    for other in errors {
        tracing::warn!(error = %other, "additional config violation");
    }
    Err(first)
}
