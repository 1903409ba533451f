//! Foreground driver for one debug session.
//!
//! Owns the outgoing side of the connection and the session state machine.
//! Incoming traffic is read by the background receiver and handed over
//! through the shared [`MessageRouter`].
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::breakpoint::{Breakpoint, BreakpointManager};
use crate::capabilities::DapCapabilities;
use crate::codec::encode_message;
use crate::error::DapError;
use crate::protocol::{
    AttachRequestArguments, BreakpointResponse, Capabilities, ContinueArguments,
    DisconnectArguments, EvaluateArguments, EvaluateResponseBody, Event, ExitedEventBody,
    InitializeRequestArguments, LaunchRequestArguments, NextArguments, OutputEventBody,
    PauseArguments, Request, Response, Scope, ScopesArguments, ScopesResponseBody,
    SetBreakpointsArguments, SetBreakpointsResponseBody, SetExceptionBreakpointsArguments,
    StackTraceArguments, StackTraceResponseBody, StepInArguments, StepOutArguments,
    StoppedEventBody, TerminateArguments, TerminatedEventBody, Thread, ThreadsResponseBody,
    Variable, VariablesArguments, VariablesResponseBody,
};
use crate::receiver::{spawn_receiver, spawn_writer};
use crate::router::MessageRouter;
use crate::seq::SequenceAllocator;
use crate::session::{DapSession, SessionState};

/// Default wait for a response (seconds).
const RESPONSE_TIMEOUT_SECS: u64 = 5;
/// Default wait for a general event (seconds).
const EVENT_TIMEOUT_SECS: u64 = 5;
/// Default wait for the debuggee to stop (seconds).
const STOP_TIMEOUT_SECS: u64 = 10;

/// Deadlines for the driver's blocking waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Wait for the response to a request.
    pub response: Duration,
    /// Wait for a general event such as `initialized`.
    pub event: Duration,
    /// Wait for a `stopped` event after resuming.
    pub stop: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            response: Duration::from_secs(RESPONSE_TIMEOUT_SECS),
            event: Duration::from_secs(EVENT_TIMEOUT_SECS),
            stop: Duration::from_secs(STOP_TIMEOUT_SECS),
        }
    }
}

/// How a wait for the debuggee to halt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The debuggee stopped and can be inspected.
    Stopped(StoppedEventBody),
    /// The adapter reported the session as terminated.
    Terminated(TerminatedEventBody),
    /// The debuggee exited with this code.
    Exited(i64),
}

/// A connected DAP client session.
pub struct SessionDriver {
    session: DapSession,
    seq: SequenceAllocator,
    router: Arc<MessageRouter>,
    timeouts: Timeouts,
    breakpoints: BreakpointManager,
    writer_tx: Option<mpsc::Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
}

impl SessionDriver {
    fn new(timeouts: Timeouts) -> Self {
        Self {
            session: DapSession::new(),
            seq: SequenceAllocator::new(),
            router: Arc::new(MessageRouter::new()),
            timeouts,
            breakpoints: BreakpointManager::new(),
            writer_tx: None,
            writer: None,
            receiver: None,
        }
    }

    /// Dial a debug adapter listening on `host:port`.
    pub async fn connect(host: &str, port: u16, timeouts: Timeouts) -> Result<Self, DapError> {
        let mut driver = Self::new(timeouts);
        driver.session.transition(SessionState::Connecting)?;
        tracing::info!(host, port, "connecting to debug adapter");
        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                driver.session.closed();
                return Err(DapError::Connect(e));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not disable Nagle");
        }
        driver.bind_stream(stream)?;
        Ok(driver)
    }

    /// Drive a session over an already established byte stream.
    pub fn from_stream<S>(stream: S, timeouts: Timeouts) -> Result<Self, DapError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut driver = Self::new(timeouts);
        driver.session.transition(SessionState::Connecting)?;
        driver.bind_stream(stream)?;
        Ok(driver)
    }

    fn bind_stream<S>(&mut self, stream: S) -> Result<(), DapError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer_tx, writer) = spawn_writer(write_half, Arc::clone(&self.router));
        let receiver = spawn_receiver(read_half, Arc::clone(&self.router));
        self.writer_tx = Some(writer_tx);
        self.writer = Some(writer);
        self.receiver = Some(receiver);
        self.session.transition(SessionState::Initializing)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Capabilities from the last successful `initialize`.
    pub fn capabilities(&self) -> &DapCapabilities {
        self.session.capabilities()
    }

    /// Breakpoints sent so far, with the adapter's verification results.
    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    /// Wait limits this driver was built with.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// The router shared with the receiver task.
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Whether the connection can still carry traffic.
    pub async fn is_connected(&self) -> bool {
        self.writer_tx.is_some() && !self.router.is_closed().await
    }

    // -----------------------------------------------------------------
    // Raw request plumbing
    // -----------------------------------------------------------------

    /// Send a request without waiting for its response.
    ///
    /// Returns the request's `seq`, which the response will echo back as
    /// `request_seq`.
    pub async fn send_request(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<i64, DapError> {
        let state = self.session.state();
        let closing_handshake = state == SessionState::Disconnecting && command == "disconnect";
        if !state.accepts_requests() && !closing_handshake {
            tracing::debug!(command, ?state, "refusing request on a closed session");
            return Err(DapError::ConnectionClosed);
        }
        let writer_tx = self.writer_tx.as_ref().ok_or(DapError::ConnectionClosed)?;

        let seq = self.seq.next();
        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        let frame = encode_message(&request.into_message())?;
        tracing::debug!(seq, command, bytes = frame.len(), "sending request");
        writer_tx
            .send(frame)
            .await
            .map_err(|_| DapError::ConnectionClosed)?;
        Ok(seq)
    }

    /// Send a request and wait for the raw response, successful or not.
    pub async fn request(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<Response, DapError> {
        let seq = self.send_request(command, arguments).await?;
        self.router
            .wait_for_response(seq, self.timeouts.response)
            .await
    }

    /// Wait for the next event called `name` using the event timeout.
    pub async fn wait_for_event(&self, name: &str) -> Result<Event, DapError> {
        self.router.wait_for_event(name, self.timeouts.event).await
    }

    /// Wait for a `stopped` event using the stop timeout.
    pub async fn wait_for_stopped(&mut self) -> Result<StoppedEventBody, DapError> {
        let event = self
            .router
            .wait_for_event("stopped", self.timeouts.stop)
            .await?;
        let body = parse_event::<StoppedEventBody>(&event)?;
        self.note_stopped(&body);
        Ok(body)
    }

    /// Wait until the debuggee stops, terminates or exits.
    ///
    /// When several of these events are already buffered, `terminated` wins
    /// over `exited`, which wins over `stopped`; the others stay buffered.
    /// A timeout is reported against the `stopped` event.
    pub async fn wait_for_stop_or_exit(&mut self) -> Result<RunOutcome, DapError> {
        let event = self
            .router
            .wait_for_any_event(&["terminated", "exited", "stopped"], self.timeouts.stop)
            .await
            .map_err(|e| match e {
                DapError::Timeout { .. } => DapError::Timeout {
                    waiting_for: "event 'stopped'".into(),
                },
                other => other,
            })?;
        match event.event.as_str() {
            "terminated" => {
                let body: Option<TerminatedEventBody> = parse_event(&event)?;
                Ok(RunOutcome::Terminated(body.unwrap_or_default()))
            }
            "exited" => {
                let body: ExitedEventBody = parse_event(&event)?;
                Ok(RunOutcome::Exited(body.exit_code))
            }
            _ => {
                let body: StoppedEventBody = parse_event(&event)?;
                self.note_stopped(&body);
                Ok(RunOutcome::Stopped(body))
            }
        }
    }

    /// Take the program output buffered so far without waiting.
    ///
    /// Output events nobody waited for accumulate in the router; this
    /// empties that buffer.
    pub async fn drain_output(&self) -> Vec<OutputEventBody> {
        let mut output = Vec::new();
        for event in self.router.drain_events("output").await {
            match parse_event::<OutputEventBody>(&event) {
                Ok(body) => output.push(body),
                Err(e) => tracing::warn!(error = %e, "dropping malformed output event"),
            }
        }
        output
    }

    fn note_stopped(&mut self, body: &StoppedEventBody) {
        tracing::info!(
            reason = %body.reason,
            thread_id = body.thread_id,
            "debuggee stopped"
        );
        if let Err(e) = self.session.handle_stopped() {
            tracing::warn!(error = %e, "stopped event outside a running session");
        }
    }

    /// Send `command`, require `success`, and return the response.
    async fn execute<A: Serialize>(&self, command: &str, args: &A) -> Result<Response, DapError> {
        let arguments = serde_json::to_value(args).map_err(|e| DapError::Encoding(e.to_string()))?;
        let resp = self.request(command, Some(arguments)).await?;
        if !resp.success {
            let message = resp.error_message();
            tracing::warn!(command, message = %message, "request failed");
            return Err(DapError::RequestFailed {
                command: command.to_string(),
                message,
            });
        }
        Ok(resp)
    }

    /// Like [`execute`](Self::execute), then decode the body as `T`.
    async fn call<A: Serialize, T: DeserializeOwned>(
        &self,
        command: &str,
        args: &A,
    ) -> Result<T, DapError> {
        let resp = self.execute(command, args).await?;
        resp.parse_body()
            .map_err(|e| DapError::InvalidResponse(format!("{command}: {e}")))
    }

    // -----------------------------------------------------------------
    // Typed requests
    // -----------------------------------------------------------------

    /// Perform the `initialize` handshake and record the capabilities.
    pub async fn initialize(
        &mut self,
        args: &InitializeRequestArguments,
    ) -> Result<Capabilities, DapError> {
        let caps: Option<Capabilities> = self.call("initialize", args).await?;
        let caps = caps.unwrap_or_default();
        self.session.set_capabilities(&caps);
        Ok(caps)
    }

    /// Start the debuggee.
    pub async fn launch(&mut self, args: &LaunchRequestArguments) -> Result<(), DapError> {
        self.session.transition(SessionState::Configuring)?;
        self.execute("launch", args).await.map(drop)
    }

    /// Attach to a running debuggee.
    pub async fn attach(&mut self, args: &AttachRequestArguments) -> Result<(), DapError> {
        self.session.transition(SessionState::Configuring)?;
        self.execute("attach", args).await.map(drop)
    }

    /// Replace the breakpoints of `path` and send them to the adapter.
    ///
    /// Returns the adapter's per-breakpoint answer, in line order.
    pub async fn set_breakpoints(
        &mut self,
        path: &Path,
        breakpoints: Vec<Breakpoint>,
    ) -> Result<Vec<BreakpointResponse>, DapError> {
        self.breakpoints.replace_file(path, breakpoints);
        let args = SetBreakpointsArguments {
            source: BreakpointManager::source_for(path),
            breakpoints: Some(self.breakpoints.source_breakpoints(path)),
        };
        let body: SetBreakpointsResponseBody = self.call("setBreakpoints", &args).await?;
        self.breakpoints.apply_response(path, &body.breakpoints);
        Ok(body.breakpoints)
    }

    /// Replace the active exception filters. An empty list turns them all off.
    pub async fn set_exception_breakpoints(&self, filters: Vec<String>) -> Result<(), DapError> {
        let args = SetExceptionBreakpointsArguments { filters };
        self.execute("setExceptionBreakpoints", &args)
            .await
            .map(drop)
    }

    /// Finish configuration; the debuggee starts running.
    pub async fn configuration_done(&mut self) -> Result<(), DapError> {
        self.session.transition(SessionState::Running)?;
        self.execute("configurationDone", &serde_json::json!({}))
            .await
            .map(drop)
    }

    /// Resume `thread_id`.
    pub async fn continue_thread(&mut self, thread_id: i64) -> Result<(), DapError> {
        self.session.resume()?;
        let args = ContinueArguments {
            thread_id,
            single_thread: None,
        };
        self.execute("continue", &args).await.map(drop)
    }

    /// Step over one statement.
    pub async fn next(&mut self, thread_id: i64) -> Result<(), DapError> {
        self.session.resume()?;
        let args = NextArguments {
            thread_id,
            granularity: None,
        };
        self.execute("next", &args).await.map(drop)
    }

    /// Step into the call on the current line of `thread_id`.
    pub async fn step_in(&mut self, thread_id: i64) -> Result<(), DapError> {
        self.session.resume()?;
        let args = StepInArguments {
            thread_id,
            target_id: None,
            granularity: None,
        };
        self.execute("stepIn", &args).await.map(drop)
    }

    /// Run `thread_id` until the current function returns.
    pub async fn step_out(&mut self, thread_id: i64) -> Result<(), DapError> {
        self.session.resume()?;
        let args = StepOutArguments {
            thread_id,
            granularity: None,
        };
        self.execute("stepOut", &args).await.map(drop)
    }

    /// Ask the adapter to suspend `thread_id`. The stop arrives as an event.
    pub async fn pause(&self, thread_id: i64) -> Result<(), DapError> {
        self.execute("pause", &PauseArguments { thread_id })
            .await
            .map(drop)
    }

    /// List the debuggee's threads.
    pub async fn threads(&self) -> Result<Vec<Thread>, DapError> {
        let body: ThreadsResponseBody = self.call("threads", &serde_json::json!({})).await?;
        Ok(body.threads)
    }

    /// Fetch up to `levels` frames of `thread_id` starting at `start_frame`.
    ///
    /// `levels == 0` asks for every frame.
    pub async fn stack_trace(
        &self,
        thread_id: i64,
        start_frame: i64,
        levels: i64,
    ) -> Result<StackTraceResponseBody, DapError> {
        let args = StackTraceArguments {
            thread_id,
            start_frame: Some(start_frame),
            levels: Some(levels),
        };
        self.call("stackTrace", &args).await
    }

    /// Scopes (locals, globals and so on) visible in `frame_id`.
    pub async fn scopes(&self, frame_id: i64) -> Result<Vec<Scope>, DapError> {
        let body: ScopesResponseBody = self.call("scopes", &ScopesArguments { frame_id }).await?;
        Ok(body.scopes)
    }

    /// Fetch every child of `variables_reference`.
    pub async fn variables(&self, variables_reference: i64) -> Result<Vec<Variable>, DapError> {
        self.variables_page(&VariablesArguments {
            variables_reference,
            filter: None,
            start: None,
            count: None,
        })
        .await
    }

    /// Fetch children with an explicit filter or paging window.
    pub async fn variables_page(
        &self,
        args: &VariablesArguments,
    ) -> Result<Vec<Variable>, DapError> {
        let body: VariablesResponseBody = self.call("variables", args).await?;
        Ok(body.variables)
    }

    /// Evaluate `expression`, optionally in the scope of `frame_id`.
    pub async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<i64>,
        context: Option<&str>,
    ) -> Result<EvaluateResponseBody, DapError> {
        let args = EvaluateArguments {
            expression: expression.to_string(),
            frame_id,
            context: context.map(str::to_string),
        };
        self.call("evaluate", &args).await
    }

    /// Ask the debuggee to terminate itself.
    pub async fn terminate(&self) -> Result<(), DapError> {
        self.execute("terminate", &TerminateArguments::default())
            .await
            .map(drop)
    }

    /// End the session. The connection stays open until [`close`](Self::close).
    pub async fn disconnect(&mut self, terminate_debuggee: bool) -> Result<(), DapError> {
        self.session.begin_disconnect()?;
        let args = DisconnectArguments {
            terminate_debuggee: Some(terminate_debuggee),
            ..Default::default()
        };
        self.execute("disconnect", &args).await.map(drop)
    }

    /// Tear the connection down. Safe to call more than once.
    ///
    /// Queued frames are flushed before the write half shuts down. Events
    /// already received stay readable through the router.
    pub async fn close(&mut self) {
        // Dropping the only sender lets the writer drain and exit.
        self.writer_tx.take();
        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(self.timeouts.response, &mut writer)
                .await
                .is_err()
            {
                tracing::warn!("writer did not drain in time; aborting");
                writer.abort();
            }
        }
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
        self.router.close("session closed").await;
        self.session.closed();
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

fn parse_event<T: DeserializeOwned>(event: &Event) -> Result<T, DapError> {
    event
        .parse_body()
        .map_err(|e| DapError::InvalidResponse(format!("{} event: {e}", event.event)))
}
