use crate::config::{Config, SessionMode};
use crate::error::ConfigError;

/// Deepest variable nesting a session may request.
const MAX_VARIABLE_DEPTH: usize = 64;

fn violation(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        message: message.into(),
    }
}

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.connection.host.trim().is_empty() {
        errors.push(violation("connection.host", "must not be empty"));
    }
    if config.connection.port == 0 {
        errors.push(violation("connection.port", "must not be 0"));
    }

    for (field, secs) in [
        ("timeouts.response_secs", config.timeouts.response_secs),
        ("timeouts.event_secs", config.timeouts.event_secs),
        ("timeouts.stop_secs", config.timeouts.stop_secs),
    ] {
        if secs == 0 {
            errors.push(violation(field, "must be at least 1"));
        }
    }

    let session = &config.session;
    if session.max_variable_depth == 0 || session.max_variable_depth > MAX_VARIABLE_DEPTH {
        errors.push(violation(
            "session.max_variable_depth",
            format!(
                "must be 1\u{2013}{MAX_VARIABLE_DEPTH}, got {}",
                session.max_variable_depth
            ),
        ));
    }

    if session.mode == SessionMode::Launch
        && session.program.as_deref().map_or(true, |p| p.trim().is_empty())
    {
        errors.push(violation("session.program", "required in launch mode"));
    }

    for (i, entry) in session.breakpoints.iter().enumerate() {
        if entry.path.as_os_str().is_empty() {
            errors.push(violation(
                format!("session.breakpoints[{i}].path"),
                "must not be empty",
            ));
        }
        if let Some(line) = entry.lines.iter().find(|l| **l < 1) {
            errors.push(violation(
                format!("session.breakpoints[{i}].lines"),
                format!("lines are 1-based, got {line}"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
