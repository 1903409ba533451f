use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose; includes every frame sent and received.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

/// How the debuggee is brought under the adapter's control.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Start the program with a `launch` request.
    #[default]
    Launch,
    /// Connect to a running program with an `attach` request.
    Attach,
}

/// Where the debug adapter listens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4711
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Deadlines for blocking waits, in whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Wait for the response to a request.
    #[serde(default = "default_response_secs")]
    pub response_secs: u64,
    /// Wait for a general event such as `initialized`.
    #[serde(default = "default_event_secs")]
    pub event_secs: u64,
    /// Wait for a breakpoint to be hit after resuming.
    #[serde(default = "default_stop_secs")]
    pub stop_secs: u64,
}

fn default_response_secs() -> u64 {
    5
}
fn default_event_secs() -> u64 {
    5
}
fn default_stop_secs() -> u64 {
    10
}

impl TimeoutConfig {
    pub fn response(&self) -> Duration {
        Duration::from_secs(self.response_secs)
    }

    pub fn event(&self) -> Duration {
        Duration::from_secs(self.event_secs)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            response_secs: default_response_secs(),
            event_secs: default_event_secs(),
            stop_secs: default_stop_secs(),
        }
    }
}

/// Breakpoints for one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointEntry {
    /// Source path as the adapter knows it.
    pub path: PathBuf,
    /// 1-based line numbers.
    #[serde(default)]
    pub lines: Vec<i64>,
    /// Condition applied to every line of this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Hit-count expression, e.g. `">= 3"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    /// Turns the entry into log points; `{expr}` is interpolated by the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

/// The scripted debugging session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Value of `adapterID` in the `initialize` request.
    #[serde(default = "default_adapter_id")]
    pub adapter_id: String,
    #[serde(default)]
    pub mode: SessionMode,
    /// Program to launch. Required in launch mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub stop_on_entry: bool,
    /// Process to attach to, for adapters that need one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i64>,
    /// Thread resumed by `continue` when a stop does not name one.
    #[serde(default = "default_thread_id")]
    pub thread_id: i64,
    /// Upper bound on continue/stop rounds.
    #[serde(default = "default_max_stops")]
    pub max_stops: usize,
    /// Inspect threads, frames and variables at each stop.
    #[serde(default = "default_true")]
    pub inspect: bool,
    /// Levels of nested variables fetched per scope (1–64).
    #[serde(default = "default_max_variable_depth")]
    pub max_variable_depth: usize,
    #[serde(default)]
    pub exception_filters: Vec<String>,
    /// Expressions evaluated in the top frame at each stop.
    #[serde(default)]
    pub watch: Vec<String>,
    /// Ask the adapter to kill the debuggee on disconnect.
    #[serde(default = "default_true")]
    pub terminate_debuggee: bool,
    /// Extra adapter-specific fields merged into `launch`/`attach`.
    #[serde(default)]
    pub launch_args: toml::Table,
    #[serde(default)]
    pub breakpoints: Vec<BreakpointEntry>,
}

fn default_adapter_id() -> String {
    "gno".to_string()
}
fn default_thread_id() -> i64 {
    1
}
fn default_max_stops() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_max_variable_depth() -> usize {
    4
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            adapter_id: default_adapter_id(),
            mode: SessionMode::Launch,
            program: None,
            args: Vec::new(),
            cwd: None,
            stop_on_entry: false,
            process_id: None,
            thread_id: default_thread_id(),
            max_stops: default_max_stops(),
            inspect: true,
            max_variable_depth: default_max_variable_depth(),
            exception_filters: Vec::new(),
            watch: Vec::new(),
            terminate_debuggee: true,
            launch_args: toml::Table::new(),
            breakpoints: Vec::new(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level, overridden by `RUST_LOG`.
    #[serde(default)]
    pub level: LogLevel,
    /// Log to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Top-level dapdrive configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.connection.host, "127.0.0.1");
        assert_eq!(cfg.connection.port, 4711);
        assert_eq!(cfg.timeouts.response(), Duration::from_secs(5));
        assert_eq!(cfg.timeouts.event(), Duration::from_secs(5));
        assert_eq!(cfg.timeouts.stop(), Duration::from_secs(10));
        assert_eq!(cfg.session.adapter_id, "gno");
        assert_eq!(cfg.session.mode, SessionMode::Launch);
        assert!(cfg.session.program.is_none());
        assert_eq!(cfg.session.thread_id, 1);
        assert_eq!(cfg.session.max_stops, 1);
        assert!(cfg.session.inspect);
        assert_eq!(cfg.session.max_variable_depth, 4);
        assert!(cfg.session.terminate_debuggee);
        assert!(cfg.session.launch_args.is_empty());
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let mut launch_args = toml::Table::new();
        launch_args.insert("trace".into(), toml::Value::Boolean(true));
        let cfg = Config {
            connection: ConnectionConfig {
                host: "localhost".into(),
                port: 2345,
            },
            timeouts: TimeoutConfig {
                response_secs: 1,
                event_secs: 2,
                stop_secs: 3,
            },
            session: SessionConfig {
                mode: SessionMode::Attach,
                process_id: Some(42),
                watch: vec!["x".into()],
                launch_args,
                breakpoints: vec![BreakpointEntry {
                    path: PathBuf::from("main.gno"),
                    lines: vec![6, 15],
                    condition: Some("i > 2".into()),
                    hit_condition: None,
                    log_message: None,
                }],
                ..SessionConfig::default()
            },
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/dapdrive.log")),
            },
        };

        let toml_str = toml::to_string(&cfg).expect("serialize");
        let deserialized: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn parse_from_toml_string() {
        let input = r#"
[connection]
port = 9000

[session]
mode = "launch"
program = "main.gno"
watch = ["x", "y"]
launch_args = { mode = "debug" }

[[session.breakpoints]]
path = "main.gno"
lines = [6, 15]

[log]
level = "trace"
"#;
        let cfg: Config = toml::from_str(input).expect("parse");
        assert_eq!(cfg.connection.port, 9000);
        assert_eq!(cfg.connection.host, "127.0.0.1");
        assert_eq!(cfg.session.program.as_deref(), Some("main.gno"));
        assert_eq!(cfg.session.watch, vec!["x", "y"]);
        assert_eq!(
            cfg.session.launch_args.get("mode").and_then(|v| v.as_str()),
            Some("debug")
        );
        assert_eq!(cfg.session.breakpoints[0].lines, vec![6, 15]);
        assert_eq!(cfg.log.level, LogLevel::Trace);
        assert_eq!(cfg.timeouts, TimeoutConfig::default());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[session]\nmode = \"replay\"\n");
        assert!(result.is_err());
    }
}
