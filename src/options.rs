//! Translation from file configuration to driver settings.

use anyhow::{Context, Result};
use dapdrive_config::{Config, SessionConfig, SessionMode, TimeoutConfig};
use dapdrive_dap::{
    AttachRequestArguments, Breakpoint, LaunchRequestArguments, ScriptOptions, Target, Timeouts,
};

pub fn timeouts(config: &TimeoutConfig) -> Timeouts {
    Timeouts {
        response: config.response(),
        event: config.event(),
        stop: config.stop(),
    }
}

/// Build the script for the `[session]` section.
pub fn script_options(config: &Config) -> Result<ScriptOptions> {
    let session = &config.session;
    Ok(ScriptOptions {
        adapter_id: session.adapter_id.clone(),
        target: target(session)?,
        exception_filters: session.exception_filters.clone(),
        breakpoints: breakpoints(session),
        thread_id: session.thread_id,
        max_stops: session.max_stops,
        inspect: session.inspect,
        max_variable_depth: session.max_variable_depth,
        watch: session.watch.clone(),
        terminate_debuggee: session.terminate_debuggee,
    })
}

fn target(session: &SessionConfig) -> Result<Target> {
    let additional = match serde_json::to_value(&session.launch_args)
        .context("session.launch_args cannot be sent as JSON")?
    {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    Ok(match session.mode {
        SessionMode::Launch => Target::Launch(LaunchRequestArguments {
            no_debug: None,
            mode: None,
            program: session.program.clone(),
            args: (!session.args.is_empty()).then(|| session.args.clone()),
            cwd: session.cwd.clone(),
            stop_on_entry: Some(session.stop_on_entry),
            additional,
        }),
        SessionMode::Attach => Target::Attach(AttachRequestArguments {
            mode: None,
            process_id: session.process_id,
            additional,
        }),
    })
}

fn breakpoints(session: &SessionConfig) -> Vec<Breakpoint> {
    session
        .breakpoints
        .iter()
        .flat_map(|entry| {
            entry.lines.iter().map(move |&line| {
                let mut bp = Breakpoint::new(&entry.path, line);
                if let Some(condition) = &entry.condition {
                    bp = bp.with_condition(condition.clone());
                }
                if let Some(hits) = &entry.hit_condition {
                    bp = bp.with_hit_condition(hits.clone());
                }
                if let Some(message) = &entry.log_message {
                    bp = bp.with_log_message(message.clone());
                }
                bp
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapdrive_config::load_from_str;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn launch_options_from_config() {
        let config = load_from_str(
            r#"
[timeouts]
stop_secs = 30

[session]
program = "main.gno"
args = ["-v"]
stop_on_entry = true
watch = ["x"]
launch_args = { mode = "exec", trace = true }

[[session.breakpoints]]
path = "main.gno"
lines = [6, 15]
condition = "i > 1"
"#,
        )
        .unwrap();

        let t = timeouts(&config.timeouts);
        assert_eq!(t.stop, Duration::from_secs(30));
        assert_eq!(t.response, Duration::from_secs(5));

        let opts = script_options(&config).unwrap();
        assert_eq!(opts.adapter_id, "gno");
        assert_eq!(opts.watch, vec!["x"]);
        assert_eq!(opts.breakpoints.len(), 2);
        assert_eq!(opts.breakpoints[1].line, 15);
        assert_eq!(opts.breakpoints[1].path, PathBuf::from("main.gno"));
        assert_eq!(opts.breakpoints[0].condition.as_deref(), Some("i > 1"));

        let Target::Launch(args) = opts.target else {
            panic!("expected launch target");
        };
        let wire = serde_json::to_value(&args).unwrap();
        assert_eq!(wire["program"], "main.gno");
        assert_eq!(wire["args"], serde_json::json!(["-v"]));
        assert_eq!(wire["stopOnEntry"], true);
        assert_eq!(wire["mode"], "exec");
        assert_eq!(wire["trace"], true);
    }

    #[test]
    fn log_point_entries_carry_hit_condition() {
        let config = load_from_str(
            r#"
[session]
program = "main.gno"

[[session.breakpoints]]
path = "loop.gno"
lines = [3]
hit_condition = ">= 2"
log_message = "i = {i}"
"#,
        )
        .unwrap();
        let opts = script_options(&config).unwrap();
        let bp = &opts.breakpoints[0];
        assert_eq!(bp.hit_condition.as_deref(), Some(">= 2"));
        assert_eq!(bp.log_message.as_deref(), Some("i = {i}"));
        assert!(bp.condition.is_none());
    }

    #[test]
    fn attach_options_from_config() {
        let config =
            load_from_str("[session]\nmode = \"attach\"\nprocess_id = 77\n").unwrap();
        let opts = script_options(&config).unwrap();
        match opts.target {
            Target::Attach(args) => assert_eq!(args.process_id, Some(77)),
            other => panic!("unexpected target: {other:?}"),
        }
        assert!(opts.breakpoints.is_empty());
    }
}
