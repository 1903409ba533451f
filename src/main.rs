use std::env;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use dapdrive_config::{load_config, resolve_config_path, Config};
use dapdrive_dap::{SessionDriver, SessionReport, SessionScript, StepOutcome};

mod logging;
mod options;

/// Environment variable naming an optional overlay config file.
const OVERLAY_ENV: &str = "DAPDRIVE_OVERLAY";

async fn drive(config: &Config) -> Result<SessionReport> {
    let script = SessionScript::new(options::script_options(config)?);
    let timeouts = options::timeouts(&config.timeouts);
    let conn = &config.connection;

    let mut driver = SessionDriver::connect(&conn.host, conn.port, timeouts)
        .await
        .with_context(|| format!("failed to reach debug adapter at {}:{}", conn.host, conn.port))?;
    info!(host = %conn.host, port = conn.port, "connected");

    Ok(script.run(&mut driver).await)
}

fn render_report(report: &SessionReport) -> String {
    let mut out = String::new();
    for step in &report.steps {
        let _ = match &step.outcome {
            StepOutcome::Succeeded(detail) if detail.is_empty() => {
                writeln!(out, "ok      {}", step.name)
            }
            StepOutcome::Succeeded(detail) => writeln!(out, "ok      {}: {detail}", step.name),
            StepOutcome::Failed(message) => writeln!(out, "FAILED  {}: {message}", step.name),
        };
    }
    for (i, inspection) in report.inspections.iter().enumerate() {
        let _ = writeln!(out, "\nstop {} ({})", i + 1, inspection.stop.stop_reason());
        for frame in &inspection.frames {
            let file = frame
                .source
                .as_ref()
                .and_then(|s| s.path.as_deref().or(s.name.as_deref()))
                .unwrap_or("?");
            let _ = writeln!(out, "  #{} {} {}:{}", frame.id, frame.name, file, frame.line);
        }
        for scope in &inspection.scopes {
            let _ = writeln!(out, "  [{}]", scope.scope.name);
            for node in &scope.variables {
                node.render(2, &mut out);
            }
        }
        for watch in &inspection.watches {
            let _ = writeln!(out, "  watch {} = {}", watch.expression, watch.value);
        }
    }
    let mut program_output = report
        .output
        .iter()
        .filter(|o| o.category.as_deref() != Some("telemetry"))
        .peekable();
    if program_output.peek().is_some() {
        out.push_str("\noutput:\n");
        for chunk in program_output {
            out.push_str(&chunk.output);
            if !chunk.output.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}

fn run() -> Result<()> {
    let explicit = env::args_os().nth(1).map(PathBuf::from);
    let cwd = env::current_dir().context("cannot determine working directory")?;
    let config_path = resolve_config_path(explicit.as_deref(), &cwd);
    let overlay = env::var_os(OVERLAY_ENV).map(PathBuf::from);

    let config = load_config(&config_path, overlay.as_deref())
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    logging::init_logging(&config.log)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    let report = runtime.block_on(drive(&config))?;

    print!("{}", render_report(&report));
    if let Some(fatal) = &report.fatal {
        bail!("session aborted: {fatal}");
    }
    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} step(s) failed");
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("dapdrive: {:#}", e);
        std::process::exit(1);
    }
}
