pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod paths;
pub mod validate;

pub use config::{
    BreakpointEntry, Config, ConnectionConfig, LogConfig, LogLevel, SessionConfig, SessionMode,
    TimeoutConfig,
};
pub use error::ConfigError;
pub use load::{load_config, load_from_str};
pub use merge::merge_configs;
pub use paths::{config_candidates, resolve_config_path, user_config_dir};
pub use validate::validate;
