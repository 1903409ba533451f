//! A fixed debugging scenario run against one adapter.
//!
//! The script performs the standard DAP handshake, installs breakpoints,
//! resumes the debuggee a bounded number of times and inspects it at each
//! stop. Every step is recorded; the connection is always disconnected and
//! closed at the end.
use std::path::PathBuf;

use crate::breakpoint::{Breakpoint, BreakpointManager};
use crate::driver::{RunOutcome, SessionDriver};
use crate::error::DapError;
use crate::protocol::{
    AttachRequestArguments, InitializeRequestArguments, LaunchRequestArguments, OutputEventBody,
    Scope, StackFrame, StoppedEventBody, Thread,
};
use crate::variables::VariableNode;

/// Frames fetched per stop.
const STACK_LEVELS: i64 = 20;

/// How the debuggee is started.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Launch(LaunchRequestArguments),
    Attach(AttachRequestArguments),
}

/// Everything the script needs to know about one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOptions {
    pub adapter_id: String,
    pub target: Target,
    /// Exception filters to enable; empty skips `setExceptionBreakpoints`.
    pub exception_filters: Vec<String>,
    pub breakpoints: Vec<Breakpoint>,
    /// Thread used for `continue` when a stop does not name one.
    pub thread_id: i64,
    /// Upper bound on continue/stop rounds.
    pub max_stops: usize,
    /// Fetch threads, frames, scopes and variables at each stop.
    pub inspect: bool,
    pub max_variable_depth: usize,
    /// Expressions evaluated in the top frame at each stop.
    pub watch: Vec<String>,
    pub terminate_debuggee: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            adapter_id: "gno".into(),
            target: Target::Launch(LaunchRequestArguments::default()),
            exception_filters: Vec::new(),
            breakpoints: Vec::new(),
            thread_id: 1,
            max_stops: 1,
            inspect: true,
            max_variable_depth: 4,
            watch: Vec::new(),
            terminate_debuggee: true,
        }
    }
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step succeeded; the text summarises what came back.
    Succeeded(String),
    /// The step failed; the text is the error.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, StepOutcome::Succeeded(_))
    }
}

/// Variables of one scope of the top frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeVariables {
    pub scope: Scope,
    pub variables: Vec<VariableNode>,
}

/// A watch expression and what it evaluated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchValue {
    pub expression: String,
    pub value: String,
}

/// What was observed at one stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub stop: StoppedEventBody,
    pub threads: Vec<Thread>,
    pub frames: Vec<StackFrame>,
    pub scopes: Vec<ScopeVariables>,
    pub watches: Vec<WatchValue>,
}

/// Full record of a script run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub steps: Vec<StepReport>,
    pub inspections: Vec<Inspection>,
    /// The error that cut the run short, if any.
    pub fatal: Option<String>,
    /// Program output reported by the adapter, in arrival order.
    pub output: Vec<OutputEventBody>,
}

impl SessionReport {
    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| !s.succeeded())
    }

    /// Whether every step succeeded and nothing aborted the run.
    pub fn is_clean(&self) -> bool {
        self.fatal.is_none() && self.failures().next().is_none()
    }

    fn succeed(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        let name = name.into();
        let detail = detail.into();
        tracing::info!(step = %name, %detail, "step succeeded");
        self.steps.push(StepReport {
            name,
            outcome: StepOutcome::Succeeded(detail),
        });
    }

    fn fail(&mut self, name: impl Into<String>, message: impl Into<String>) {
        let name = name.into();
        let message = message.into();
        tracing::warn!(step = %name, error = %message, "step failed");
        self.steps.push(StepReport {
            name,
            outcome: StepOutcome::Failed(message),
        });
    }

    /// Record `result` under `name`.
    ///
    /// Recoverable errors are recorded and turned into `Ok(None)`; other
    /// errors are recorded and returned.
    fn record<T>(
        &mut self,
        name: &str,
        result: Result<T, DapError>,
        detail: impl FnOnce(&T) -> String,
    ) -> Result<Option<T>, DapError> {
        match result {
            Ok(value) => {
                self.succeed(name, detail(&value));
                Ok(Some(value))
            }
            Err(e) => {
                self.fail(name, e.to_string());
                if e.is_recoverable() {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }
}

/// Runs [`ScriptOptions`] against a connected driver.
#[derive(Debug, Clone)]
pub struct SessionScript {
    options: ScriptOptions,
}

impl SessionScript {
    pub fn new(options: ScriptOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    /// Run the scenario, then disconnect and close whatever happened.
    pub async fn run(&self, driver: &mut SessionDriver) -> SessionReport {
        let mut report = SessionReport::default();
        if let Err(e) = self.drive(driver, &mut report).await {
            tracing::error!(error = %e, "session aborted");
            report.fatal = Some(e.to_string());
        }
        self.cleanup(driver, &mut report).await;
        report
    }

    async fn drive(
        &self,
        driver: &mut SessionDriver,
        report: &mut SessionReport,
    ) -> Result<(), DapError> {
        let opts = &self.options;

        let init_args = InitializeRequestArguments::for_adapter(opts.adapter_id.clone());
        let result = driver.initialize(&init_args).await;
        report.record("initialize", result, |_| {
            format!("capabilities: {}", driver.capabilities())
        })?;

        match &opts.target {
            Target::Launch(args) => {
                let result = driver.launch(args).await;
                report.record("launch", result, |_| {
                    args.program.clone().unwrap_or_default()
                })?;
            }
            Target::Attach(args) => {
                let result = driver.attach(args).await;
                report.record("attach", result, |_| String::new())?;
            }
        }

        let result = driver.wait_for_event("initialized").await;
        report.record("initialized", result, |_| String::new())?;

        if !opts.exception_filters.is_empty() {
            let result = driver
                .set_exception_breakpoints(opts.exception_filters.clone())
                .await;
            report.record("setExceptionBreakpoints", result, |_| {
                opts.exception_filters.join(",")
            })?;
        }

        let mut wanted = BreakpointManager::new();
        for bp in &opts.breakpoints {
            wanted.add(bp.clone());
        }
        let files: Vec<PathBuf> = wanted.files().map(|p| p.to_path_buf()).collect();
        for path in files {
            let bps = wanted.get_for_file(&path).to_vec();
            let result = driver.set_breakpoints(&path, bps).await;
            let name = format!("setBreakpoints {}", path.display());
            report.record(&name, result, |answers| {
                let verified = answers.iter().filter(|a| a.verified).count();
                format!("{verified}/{} verified", answers.len())
            })?;
        }

        let result = driver.configuration_done().await;
        report.record("configurationDone", result, |_| String::new())?;

        for round in 0..opts.max_stops {
            let thread_id = opts.thread_id;
            let result = driver.continue_thread(thread_id).await;
            report.record("continue", result, |_| format!("thread {thread_id}"))?;

            match driver.wait_for_stop_or_exit().await {
                Ok(RunOutcome::Stopped(stop)) => {
                    report.succeed(
                        "stopped",
                        format!("reason {} (round {})", stop.stop_reason(), round + 1),
                    );
                    if opts.inspect {
                        let inspection = self.inspect(driver, report, stop).await?;
                        report.inspections.push(inspection);
                    }
                }
                Ok(RunOutcome::Terminated(body)) => {
                    let detail = if body.restart.is_some() {
                        "debuggee terminated (adapter asked for a restart)"
                    } else {
                        "debuggee terminated"
                    };
                    report.succeed("stopped", detail);
                    break;
                }
                Ok(RunOutcome::Exited(code)) => {
                    report.succeed("stopped", format!("debuggee exited with code {code}"));
                    break;
                }
                Err(DapError::Timeout { .. }) => {
                    report.fail("stopped", "breakpoint did not trigger");
                    break;
                }
                Err(e) => {
                    report.record::<()>("stopped", Err(e), |_| String::new())?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Walk threads, the top frame's scopes and the watch list at a stop.
    async fn inspect(
        &self,
        driver: &SessionDriver,
        report: &mut SessionReport,
        stop: StoppedEventBody,
    ) -> Result<Inspection, DapError> {
        let opts = &self.options;
        let thread_id = stop.thread_id.unwrap_or(opts.thread_id);
        let mut inspection = Inspection {
            stop,
            threads: Vec::new(),
            frames: Vec::new(),
            scopes: Vec::new(),
            watches: Vec::new(),
        };

        let result = driver.threads().await;
        if let Some(threads) =
            report.record("threads", result, |t| format!("{} thread(s)", t.len()))?
        {
            inspection.threads = threads;
        }

        let result = driver.stack_trace(thread_id, 0, STACK_LEVELS).await;
        let trace = report.record("stackTrace", result, |t| match t.stack_frames.first() {
            Some(top) => format!("{} at line {}", top.name, top.line),
            None => "no frames".into(),
        })?;
        let Some(trace) = trace else {
            return Ok(inspection);
        };
        inspection.frames = trace.stack_frames;
        let Some(frame_id) = inspection.frames.first().map(|f| f.id) else {
            return Ok(inspection);
        };

        let result = driver.scopes(frame_id).await;
        if let Some(scopes) =
            report.record("scopes", result, |s| format!("{} scope(s)", s.len()))?
        {
            for scope in scopes {
                if scope.expensive == Some(true) {
                    tracing::debug!(scope = %scope.name, "skipping expensive scope");
                    continue;
                }
                let name = format!("variables {}", scope.name);
                let result = driver
                    .expand_variables(scope.variables_reference, opts.max_variable_depth)
                    .await;
                let variables = report.record(&name, result, |vars| {
                    let nodes: usize = vars.iter().map(VariableNode::size).sum();
                    format!("{nodes} node(s)")
                })?;
                if let Some(variables) = variables {
                    inspection.scopes.push(ScopeVariables { scope, variables });
                }
            }
        }

        for expression in &opts.watch {
            let result = driver
                .evaluate(expression, Some(frame_id), Some("watch"))
                .await;
            let name = format!("evaluate {expression}");
            if let Some(value) = report.record(&name, result, |v| v.result.clone())? {
                inspection.watches.push(WatchValue {
                    expression: expression.clone(),
                    value: value.result,
                });
            }
        }
        Ok(inspection)
    }

    async fn cleanup(&self, driver: &mut SessionDriver, report: &mut SessionReport) {
        if driver.is_connected().await {
            let result = driver.disconnect(self.options.terminate_debuggee).await;
            // Nothing left to abort; failures are only recorded here.
            let _ = report.record("disconnect", result, |_| String::new());
        }
        report.output.extend(driver.drain_output().await);
        driver.close().await;
    }
}
