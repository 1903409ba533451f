use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file at {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed TOML, or a value of the wrong type. `origin` names the
    /// file or fragment the text came from.
    #[error("malformed config in {origin}: {message}")]
    Parse { origin: String, message: String },

    /// A value that parsed but is out of range. `field` is the dotted path,
    /// e.g. `session.breakpoints[0].lines`.
    #[error("invalid {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn parse(origin: impl Into<String>, err: impl ToString) -> Self {
        ConfigError::Parse {
            origin: origin.into(),
            message: err.to_string(),
        }
    }

    /// Attribute a parse failure to the file it was read from.
    pub(crate) fn in_file(self, path: &Path) -> Self {
        match self {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                origin: path.display().to_string(),
                message,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_file() {
        let err = ConfigError::NotFound(PathBuf::from("/tmp/dapdrive.toml"));
        assert_eq!(err.to_string(), "no config file at /tmp/dapdrive.toml");

        let err = ConfigError::Read {
            path: PathBuf::from("/tmp/dapdrive.toml"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "no access"),
        };
        assert_eq!(err.to_string(), "cannot read /tmp/dapdrive.toml: no access");
    }

    #[test]
    fn parse_errors_are_reattributed_to_their_file() {
        let err = ConfigError::parse("overlay", "expected `=`").in_file(Path::new("local.toml"));
        assert_eq!(err.to_string(), "malformed config in local.toml: expected `=`");

        let err = ConfigError::Invalid {
            field: "connection.port".into(),
            message: "must not be 0".into(),
        }
        .in_file(Path::new("local.toml"));
        assert_eq!(err.to_string(), "invalid connection.port: must not be 0");
    }
}
