//! DAP protocol message types.
//!
//! Implements the Debug Adapter Protocol message structures with
//! serde Serialize/Deserialize support.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Base protocol messages
// ---------------------------------------------------------------------------

/// Any message on the wire, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    /// A request (client to adapter, or a reverse request).
    Request(Request),
    /// A response to an earlier request.
    Response(Response),
    /// An unsolicited event.
    Event(Event),
}

impl ProtocolMessage {
    /// Classify a decoded JSON document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// A DAP request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number.
    pub seq: i64,
    /// The command to execute.
    pub command: String,
    /// Command arguments (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl Request {
    /// Wrap this request for the wire, adding `"type": "request"`.
    pub fn into_message(self) -> ProtocolMessage {
        ProtocolMessage::Request(self)
    }
}

/// A DAP response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number (adapters may omit it).
    #[serde(default)]
    pub seq: i64,
    /// Sequence number of the corresponding request.
    pub request_seq: i64,
    /// Whether the request was successful.
    pub success: bool,
    /// The command this response is for.
    pub command: String,
    /// Error message if `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response body (command-specific).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl Response {
    /// Deserialize the body into a typed structure.
    ///
    /// A missing body is treated as JSON `null`; parse into an `Option` when
    /// the adapter may leave it out.
    pub fn parse_body<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone().unwrap_or(serde_json::Value::Null))
    }

    /// The adapter's error text, falling back to a generic message.
    pub fn error_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "adapter reported failure".into())
    }
}

/// A DAP event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number (adapters may omit it).
    #[serde(default)]
    pub seq: i64,
    /// The event name, e.g. `stopped`.
    pub event: String,
    /// Event body (event-specific).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl Event {
    /// Deserialize the body into a typed structure.
    pub fn parse_body<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone().unwrap_or(serde_json::Value::Null))
    }
}

// ---------------------------------------------------------------------------
// Initialize / launch / attach
// ---------------------------------------------------------------------------

/// Arguments for the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestArguments {
    /// ID of the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Human-readable name of the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// ID of the debug adapter.
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    /// Client locale (e.g. "en-US").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Whether lines are 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_start_at1: Option<bool>,
    /// Whether columns are 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_start_at1: Option<bool>,
    /// Path format: "path" or "uri".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_format: Option<String>,
    /// Whether the client supports variable type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_variable_type: Option<bool>,
    /// Whether the client supports the `runInTerminal` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_run_in_terminal_request: Option<bool>,
}

impl InitializeRequestArguments {
    /// Arguments this driver sends for the given adapter.
    pub fn for_adapter(adapter_id: impl Into<String>) -> Self {
        Self {
            client_id: Some("dapdrive".into()),
            client_name: Some("dapdrive".into()),
            adapter_id: adapter_id.into(),
            locale: Some("en-us".into()),
            lines_start_at1: Some(true),
            columns_start_at1: Some(true),
            path_format: Some("path".into()),
            supports_variable_type: Some(true),
            supports_run_in_terminal_request: Some(false),
        }
    }
}

/// Capabilities returned by the debug adapter in the `initialize` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// The adapter supports the `configurationDone` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_configuration_done_request: Option<bool>,
    /// The adapter supports conditional breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_conditional_breakpoints: Option<bool>,
    /// The adapter supports hit conditional breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_hit_conditional_breakpoints: Option<bool>,
    /// The adapter supports log points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_log_points: Option<bool>,
    /// The adapter supports function breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_function_breakpoints: Option<bool>,
    /// The adapter supports stepping backwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_step_back: Option<bool>,
    /// The adapter supports setting variable values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_set_variable: Option<bool>,
    /// The adapter supports the `terminate` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_terminate_request: Option<bool>,
    /// Exception filters the adapter offers for `setExceptionBreakpoints`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_breakpoint_filters: Option<Vec<ExceptionBreakpointsFilter>>,
}

/// An exception filter offered by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionBreakpointsFilter {
    /// Identifier passed back in `setExceptionBreakpoints`.
    pub filter: String,
    /// Display label.
    pub label: String,
    /// Whether the filter is on by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

/// Arguments for the `launch` request.
///
/// Adapter-specific keys that have no typed field go into `additional`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequestArguments {
    /// Run without debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_debug: Option<bool>,
    /// Adapter-defined launch mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Program to launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Command-line arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Working directory for the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Stop at the entry point of the program.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_on_entry: Option<bool>,
    /// Extra adapter-specific arguments.
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// Arguments for the `attach` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequestArguments {
    /// Adapter-defined attach mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Process ID to attach to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i64>,
    /// Extra adapter-specific arguments.
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Breakpoints
// ---------------------------------------------------------------------------

/// Arguments for the `setBreakpoints` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    /// The source to set breakpoints for.
    pub source: Source,
    /// Breakpoints to set (replaces all previous ones).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
}

/// Response body for `setBreakpoints`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    /// Information about the breakpoints, in request order.
    pub breakpoints: Vec<BreakpointResponse>,
}

/// A breakpoint as returned by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResponse {
    /// Unique identifier for the breakpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Whether the breakpoint has been verified.
    pub verified: bool,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Actual source location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Actual line of the breakpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

/// A source breakpoint (client-side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    /// The source line of the breakpoint.
    pub line: i64,
    /// Optional column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    /// Condition expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Hit condition expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    /// Log message (logpoint).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

impl SourceBreakpoint {
    /// A plain breakpoint on `line`.
    pub fn at_line(line: i64) -> Self {
        Self {
            line,
            column: None,
            condition: None,
            hit_condition: None,
            log_message: None,
        }
    }
}

/// Arguments for the `setExceptionBreakpoints` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExceptionBreakpointsArguments {
    /// Enabled exception filter ids.
    pub filters: Vec<String>,
}

// ---------------------------------------------------------------------------
// Step / flow-control arguments
// ---------------------------------------------------------------------------

/// Arguments for the `continue` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueArguments {
    /// The thread to continue.
    pub thread_id: i64,
    /// Whether to continue just this thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_thread: Option<bool>,
}

/// Arguments for the `next` (step over) request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextArguments {
    /// The thread to step.
    pub thread_id: i64,
    /// Stepping granularity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

/// Arguments for the `stepIn` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInArguments {
    /// The thread to step.
    pub thread_id: i64,
    /// Target to step into (if multiple).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<i64>,
    /// Stepping granularity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

/// Arguments for the `stepOut` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutArguments {
    /// The thread to step.
    pub thread_id: i64,
    /// Stepping granularity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

/// Arguments for the `pause` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseArguments {
    /// The thread to pause.
    pub thread_id: i64,
}

// ---------------------------------------------------------------------------
// Runtime types
// ---------------------------------------------------------------------------

/// A thread in the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Unique identifier of the thread.
    pub id: i64,
    /// Human-readable name of the thread.
    pub name: String,
}

/// Response body for `threads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadsResponseBody {
    /// All threads.
    pub threads: Vec<Thread>,
}

/// Arguments for the `stackTrace` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    /// Thread whose stack to retrieve.
    pub thread_id: i64,
    /// Index of the first frame to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    /// Maximum number of frames; 0 or absent means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
}

/// A stack frame in the call stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Unique identifier for the stack frame.
    pub id: i64,
    /// Name of the frame (function name).
    pub name: String,
    /// Source location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Line within the source.
    pub line: i64,
    /// Column within the source.
    pub column: i64,
}

/// Response body for `stackTrace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    /// Frames, innermost first.
    pub stack_frames: Vec<StackFrame>,
    /// Total frames available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<i64>,
}

/// A source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Short name of the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// File system path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Source reference (for sources without a file path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
}

/// Arguments for the `scopes` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    /// Frame whose scopes to retrieve.
    pub frame_id: i64,
}

/// A scope (container for variables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Name of the scope (e.g. "Locals", "Globals").
    pub name: String,
    /// Variables reference for this scope.
    pub variables_reference: i64,
    /// Whether the scope is expensive to resolve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expensive: Option<bool>,
}

/// Response body for `scopes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopesResponseBody {
    /// Scopes of the frame.
    pub scopes: Vec<Scope>,
}

/// Arguments for the `variables` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    /// Handle to expand.
    pub variables_reference: i64,
    /// "indexed" or "named" to restrict the children returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// First child index for paging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    /// Number of children for paging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
}

/// A variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Name of the variable.
    pub name: String,
    /// Value of the variable as a string.
    pub value: String,
    /// Type of the variable.
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<String>,
    /// If > 0, the variable has children accessed via this reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_reference: Option<i64>,
}

impl Variable {
    /// The child handle, or `None` for a leaf value.
    pub fn child_reference(&self) -> Option<i64> {
        self.variables_reference.filter(|r| *r != 0)
    }
}

/// Response body for `variables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariablesResponseBody {
    /// Children of the handle.
    pub variables: Vec<Variable>,
}

// ---------------------------------------------------------------------------
// Evaluate
// ---------------------------------------------------------------------------

/// Arguments for the `evaluate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    /// The expression to evaluate.
    pub expression: String,
    /// Stack frame in whose context to evaluate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    /// Context: "watch", "repl", "hover", "clipboard".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Response body for `evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    /// The result string.
    pub result: String,
    /// Type of the result.
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
    /// If > 0, the result has children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_reference: Option<i64>,
}

// ---------------------------------------------------------------------------
// Terminate / disconnect
// ---------------------------------------------------------------------------

/// Arguments for the `terminate` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateArguments {
    /// Whether a restart follows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
}

/// Arguments for the `disconnect` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    /// Whether to restart the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    /// Whether to terminate the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate_debuggee: Option<bool>,
    /// Whether to suspend the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend_debuggee: Option<bool>,
}

// ---------------------------------------------------------------------------
// Event bodies
// ---------------------------------------------------------------------------

/// Reason why the debuggee stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A step request completed.
    Step,
    /// A breakpoint was hit.
    Breakpoint,
    /// An exception occurred.
    Exception,
    /// A pause request was fulfilled.
    Pause,
    /// An entry point was reached.
    Entry,
    /// A goto request completed.
    Goto,
    /// A function breakpoint was hit.
    FunctionBreakpoint,
    /// A data breakpoint was hit.
    DataBreakpoint,
    /// Any reason this client does not know about.
    Other(String),
}

impl StopReason {
    /// Map the wire string onto a known reason.
    pub fn parse(reason: &str) -> Self {
        match reason {
            "step" => StopReason::Step,
            "breakpoint" => StopReason::Breakpoint,
            "exception" => StopReason::Exception,
            "pause" => StopReason::Pause,
            "entry" => StopReason::Entry,
            "goto" => StopReason::Goto,
            "function breakpoint" => StopReason::FunctionBreakpoint,
            "data breakpoint" => StopReason::DataBreakpoint,
            other => StopReason::Other(other.to_string()),
        }
    }

    /// Whether the stop was caused by a user breakpoint of any kind.
    pub fn is_breakpoint(&self) -> bool {
        matches!(
            self,
            StopReason::Breakpoint | StopReason::FunctionBreakpoint | StopReason::DataBreakpoint
        )
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Exception => "exception",
            StopReason::Pause => "pause",
            StopReason::Entry => "entry",
            StopReason::Goto => "goto",
            StopReason::FunctionBreakpoint => "function breakpoint",
            StopReason::DataBreakpoint => "data breakpoint",
            StopReason::Other(reason) => reason,
        };
        f.write_str(text)
    }
}

/// Body of the `stopped` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    /// The reason for the stop, as sent by the adapter.
    pub reason: String,
    /// Description of the stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Thread that stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    /// Whether all threads are stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_stopped: Option<bool>,
    /// Breakpoints that triggered the stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_breakpoint_ids: Option<Vec<i64>>,
}

impl StoppedEventBody {
    /// The typed stop reason.
    pub fn stop_reason(&self) -> StopReason {
        StopReason::parse(&self.reason)
    }
}

/// Body of the `output` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    /// Output category: "console", "stdout", "stderr", "telemetry".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The output text.
    pub output: String,
}

/// Body of the `exited` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    /// The exit code of the debuggee.
    pub exit_code: i64,
}

/// Body of the `terminated` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatedEventBody {
    /// Restart data; if present, a restart is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
