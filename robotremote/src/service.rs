//! RemoteService: transport-agnostic remote library serving.
//!
//! This service owns:
//! - The keyword registry, including the reserved stop keyword
//! - Server lifecycle state (phase, stop permission, bound address)
//! - Shutdown coordination for the transport
//!
//! Transports parse requests into [`RemoteCall`]s and hand them to
//! [`RemoteService::dispatch`], which serializes them through a single gate.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::capture::CaptureMode;
use crate::engine::{self, RunError};
use crate::introspect;
use crate::invocation::KeywordResult;
use crate::library::{Keyword, Library, Signature};
use crate::registry::{KeywordRegistry, STOP_REMOTE_SERVER};
use crate::value::{Value, WireValue};

/// Prefix of every lifecycle announcement.
pub const SERVICE_NAME: &str = "Robot Framework remote server";

/// Server lifecycle phase. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Created,
    Running,
    Stopped,
}

/// Lifecycle state shared by the service, the stop keyword and signal
/// handlers.
pub struct ServerState {
    phase: Mutex<Phase>,
    allow_stop: AtomicBool,
    address: OnceLock<SocketAddr>,
    exit_code: OnceLock<i32>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ServerState {
    pub fn new(allow_stop: bool) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            phase: Mutex::new(Phase::Created),
            allow_stop: AtomicBool::new(allow_stop),
            address: OnceLock::new(),
            exit_code: OnceLock::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    pub fn allow_stop(&self) -> bool {
        self.allow_stop.load(Ordering::SeqCst)
    }

    pub fn set_allow_stop(&self, allow_stop: bool) {
        self.allow_stop.store(allow_stop, Ordering::SeqCst);
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.address.get().copied()
    }

    fn address_label(&self) -> String {
        self.address()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "<unbound>".to_string())
    }

    /// Record the bound address and enter RUNNING.
    pub fn mark_running(&self, address: SocketAddr) {
        let _ = self.address.set(address);
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == Phase::Created {
            *phase = Phase::Running;
        }
    }

    /// Stop serving if allowed. Returns `true` either way.
    pub fn stop(&self) -> bool {
        let address = self.address_label();
        if self.allow_stop() {
            announce(&format!("{SERVICE_NAME} at {address} stopping"));
            self.set_phase(Phase::Stopped);
            self.trigger_shutdown();
        } else {
            let line = format!("*WARN* {SERVICE_NAME} at {address} does not allow stopping");
            println!("{line}");
            tracing::warn!("{line}");
        }
        true
    }

    /// Stop regardless of the configured permission (signal handlers).
    pub fn force_stop(&self) {
        self.set_allow_stop(true);
        self.stop();
    }

    /// Shut down after a fatal keyword failure; the process should exit with
    /// `code` once the transport has drained.
    pub fn terminate(&self, code: i32) {
        let _ = self.exit_code.set(code);
        self.set_phase(Phase::Stopped);
        self.trigger_shutdown();
    }

    /// Exit status requested by a fatal keyword failure, if any.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.get().copied()
    }

    fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Receiver that flips to `true` once the server should stop.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Lifecycle lines go to stdout, where a launching process reads them, and
/// to the log.
fn announce(line: &str) {
    println!("{line}");
    tracing::info!("{line}");
}

/// A parsed remote request.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    GetKeywordNames,
    RunKeyword {
        name: String,
        args: Vec<WireValue>,
        kwargs: IndexMap<String, WireValue>,
    },
    GetKeywordArguments {
        name: String,
    },
    GetKeywordDocumentation {
        name: String,
    },
    StopRemoteServer,
}

impl RemoteCall {
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetKeywordNames => "get_keyword_names",
            Self::RunKeyword { .. } => "run_keyword",
            Self::GetKeywordArguments { .. } => "get_keyword_arguments",
            Self::GetKeywordDocumentation { .. } => "get_keyword_documentation",
            Self::StopRemoteServer => STOP_REMOTE_SERVER,
        }
    }
}

/// Reply to a [`RemoteCall`], serialized as the bare JSON result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallReply {
    Names(Vec<String>),
    Result(KeywordResult),
    Text(String),
    Ack(bool),
}

/// Remote library service.
pub struct RemoteService {
    registry: KeywordRegistry,
    state: Arc<ServerState>,
    /// Also capture what keywords write to the process stdout.
    capture_stdout: AtomicBool,
    /// Held for the whole of every dispatched call.
    gate: Mutex<()>,
}

impl RemoteService {
    pub fn new(library: Arc<dyn Library>) -> Self {
        let state = Arc::new(ServerState::default());
        let control_state = Arc::clone(&state);
        let control = Keyword::new(STOP_REMOTE_SERVER, Signature::method(), move |_, _| {
            Ok(Value::Bool(control_state.stop()))
        });
        Self {
            registry: KeywordRegistry::new(library, control),
            state,
            capture_stdout: AtomicBool::new(true),
            gate: Mutex::new(()),
        }
    }

    pub fn with_allow_stop(self, allow_stop: bool) -> Self {
        self.state.set_allow_stop(allow_stop);
        self
    }

    pub fn with_capture_stdout(self, capture_stdout: bool) -> Self {
        self.set_capture_stdout(capture_stdout);
        self
    }

    pub fn set_capture_stdout(&self, capture_stdout: bool) {
        self.capture_stdout.store(capture_stdout, Ordering::SeqCst);
    }

    pub fn capture_mode(&self) -> CaptureMode {
        if self.capture_stdout.load(Ordering::SeqCst) {
            CaptureMode::ProcessStdout
        } else {
            CaptureMode::Console
        }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn registry(&self) -> &KeywordRegistry {
        &self.registry
    }

    pub fn get_keyword_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Run a keyword. A fatal failure stops the server before returning.
    pub fn run_keyword(
        &self,
        name: &str,
        args: Vec<WireValue>,
        kwargs: IndexMap<String, WireValue>,
    ) -> Result<KeywordResult, RunError> {
        let result =
            engine::run_keyword(&self.registry, self.capture_mode(), name, args, kwargs);
        if let Err(RunError::Fatal { exit_code, .. }) = &result {
            self.state.terminate(*exit_code);
        }
        result
    }

    pub fn get_keyword_arguments(&self, name: &str) -> Vec<String> {
        introspect::keyword_arguments(&self.registry, name)
    }

    pub fn get_keyword_documentation(&self, name: &str) -> String {
        introspect::keyword_documentation(&self.registry, name)
    }

    pub fn stop_remote_server(&self) -> bool {
        self.state.stop()
    }

    /// Write the port file, enter RUNNING and print the startup line. A port
    /// file that cannot be written leaves the server in CREATED.
    pub fn announce_start(&self, address: SocketAddr, port_file: Option<&Path>) -> io::Result<()> {
        if let Some(path) = port_file {
            std::fs::write(path, address.port().to_string())?;
            tracing::debug!(path = %path.display(), port = address.port(), "Wrote port file");
        }
        self.state.mark_running(address);
        announce(&format!("{SERVICE_NAME} starting at {address}."));
        Ok(())
    }

    /// Handle one remote call. Calls are serialized; this blocks while
    /// another call is in flight. Once the server is STOPPED every call is
    /// rejected, including ones that were queued behind the stop.
    pub fn dispatch(&self, call: RemoteCall) -> Result<CallReply, RunError> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state.phase() == Phase::Stopped {
            tracing::warn!(method = call.method(), "Rejecting call on stopped server");
            return Err(RunError::Stopped);
        }
        tracing::debug!(method = call.method(), "Dispatching remote call");

        Ok(match call {
            RemoteCall::GetKeywordNames => CallReply::Names(self.get_keyword_names()),
            RemoteCall::RunKeyword { name, args, kwargs } => {
                CallReply::Result(self.run_keyword(&name, args, kwargs)?)
            }
            RemoteCall::GetKeywordArguments { name } => {
                CallReply::Names(self.get_keyword_arguments(&name))
            }
            RemoteCall::GetKeywordDocumentation { name } => {
                CallReply::Text(self.get_keyword_documentation(&name))
            }
            RemoteCall::StopRemoteServer => CallReply::Ack(self.stop_remote_server()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::KeywordError;
    use crate::library::KeywordSet;

    fn library() -> Arc<KeywordSet> {
        Arc::new(
            KeywordSet::new()
                .with_doc("Overview.")
                .with_keyword(Keyword::new(
                    "greet",
                    Signature::method().optional("name", "world"),
                    |args, console| {
                        console.println(&format!("Hello, {}!", args.text("name")?));
                        Ok(Value::None)
                    },
                ))
                .with_keyword(Keyword::new(STOP_REMOTE_SERVER, Signature::new(), |_, _| {
                    Ok(Value::from("shadowed"))
                }))
                .with_keyword(Keyword::new("quit", Signature::new(), |_, _| {
                    Err(KeywordError::exit(2))
                })),
        )
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:8270".parse().unwrap()
    }

    fn run_call(name: &str) -> RemoteCall {
        RemoteCall::RunKeyword {
            name: name.into(),
            args: vec![],
            kwargs: IndexMap::new(),
        }
    }

    /// Console-only so output assertions are not mixed with harness lines.
    fn running(allow_stop: bool) -> RemoteService {
        let service = RemoteService::new(library())
            .with_allow_stop(allow_stop)
            .with_capture_stdout(false);
        service.state().mark_running(addr());
        service
    }

    #[test]
    fn phase_starts_created() {
        let service = RemoteService::new(library());
        assert_eq!(service.state().phase(), Phase::Created);
        assert!(service.state().allow_stop());
        assert_eq!(service.state().address(), None);
    }

    #[test]
    fn names_include_stop_exactly_once() {
        let names = running(true).get_keyword_names();
        assert_eq!(names, ["greet", "quit", STOP_REMOTE_SERVER]);
    }

    #[test]
    fn stop_when_allowed() {
        let service = running(true);
        let rx = service.state().shutdown_rx();
        assert!(service.stop_remote_server());
        assert_eq!(service.state().phase(), Phase::Stopped);
        assert!(*rx.borrow());
    }

    #[test]
    fn stop_when_disallowed_keeps_running() {
        let service = running(false);
        let rx = service.state().shutdown_rx();
        assert!(service.stop_remote_server());
        assert_eq!(service.state().phase(), Phase::Running);
        assert!(!*rx.borrow());
    }

    #[test]
    fn force_stop_overrides_permission() {
        let service = running(false);
        service.state().force_stop();
        assert!(service.state().allow_stop());
        assert_eq!(service.state().phase(), Phase::Stopped);
    }

    #[test]
    fn stop_keyword_runs_control_not_library_member() {
        let service = running(true);
        let result = service
            .run_keyword(STOP_REMOTE_SERVER, vec![], IndexMap::new())
            .unwrap();
        assert_eq!(result.return_value, WireValue::Bool(true));
        assert_eq!(service.state().phase(), Phase::Stopped);
    }

    #[test]
    fn fatal_failure_terminates() {
        let service = running(false);
        let err = service.run_keyword("quit", vec![], IndexMap::new()).unwrap_err();
        assert!(matches!(err, RunError::Fatal { exit_code: 2, .. }));
        assert_eq!(service.state().exit_code(), Some(2));
        assert_eq!(service.state().phase(), Phase::Stopped);
        assert!(*service.state().shutdown_rx().borrow());
    }

    #[test]
    fn dispatch_routes_every_call() {
        let service = running(true);
        assert_eq!(
            service
                .dispatch(RemoteCall::GetKeywordArguments {
                    name: "greet".into()
                })
                .unwrap(),
            CallReply::Names(vec!["name=world".into()])
        );
        assert_eq!(
            service
                .dispatch(RemoteCall::GetKeywordDocumentation {
                    name: "__intro__".into()
                })
                .unwrap(),
            CallReply::Text("Overview.".into())
        );

        let reply = service
            .dispatch(RemoteCall::RunKeyword {
                name: "greet".into(),
                args: vec![WireValue::from("robot")],
                kwargs: IndexMap::new(),
            })
            .unwrap();
        let CallReply::Result(result) = reply else {
            panic!("expected a keyword result");
        };
        assert_eq!(result.output, WireValue::from("Hello, robot!\n"));

        assert_eq!(
            service.dispatch(RemoteCall::StopRemoteServer).unwrap(),
            CallReply::Ack(true)
        );
    }

    #[test]
    fn stopped_server_rejects_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let library = KeywordSet::new().with_keyword(Keyword::new(
            "count",
            Signature::new(),
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::None)
            },
        ));
        let service = RemoteService::new(Arc::new(library));
        service.state().mark_running(addr());

        assert!(service.dispatch(run_call("count")).is_ok());
        assert_eq!(
            service.dispatch(RemoteCall::StopRemoteServer).unwrap(),
            CallReply::Ack(true)
        );

        let err = service.dispatch(run_call("count")).unwrap_err();
        assert!(matches!(err, RunError::Stopped));
        assert!(matches!(
            service.dispatch(RemoteCall::GetKeywordNames),
            Err(RunError::Stopped)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stdout_capture_is_on_by_default() {
        let service = RemoteService::new(library());
        assert_eq!(service.capture_mode(), CaptureMode::ProcessStdout);
        let service = service.with_capture_stdout(false);
        assert_eq!(service.capture_mode(), CaptureMode::Console);
    }

    #[cfg(unix)]
    #[test]
    fn keyword_stdout_lands_in_output() {
        use std::io::Write;

        // `println!` is diverted by the test harness, so write to the real
        // stdout handle the way library code and child processes would.
        let library = KeywordSet::new().with_keyword(Keyword::new(
            "shout",
            Signature::new(),
            |_, _| {
                let mut stdout = io::stdout();
                stdout.write_all(b"printed to stdout\n")?;
                stdout.flush()?;
                Ok(Value::from(1))
            },
        ));
        let service = RemoteService::new(Arc::new(library));

        let result = service.run_keyword("shout", vec![], IndexMap::new()).unwrap();
        assert_eq!(result.return_value, WireValue::Int(1));
        let output = match &result.output {
            WireValue::Str(text) => text.clone(),
            WireValue::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => panic!("unexpected output {other:?}"),
        };
        assert!(output.contains("printed to stdout\n"), "{output:?}");
    }

    #[test]
    fn replies_serialize_as_bare_results() {
        let names = serde_json::to_value(CallReply::Names(vec!["a".into()])).unwrap();
        assert_eq!(names, serde_json::json!(["a"]));
        let ack = serde_json::to_value(CallReply::Ack(true)).unwrap();
        assert_eq!(ack, serde_json::json!(true));
    }

    #[test]
    fn announce_start_writes_port_file() {
        let dir = tempfile::tempdir().unwrap();
        let port_file = dir.path().join("port.txt");
        let service = RemoteService::new(library());

        service
            .announce_start(addr(), Some(port_file.as_path()))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&port_file).unwrap(), "8270");
        assert_eq!(service.state().phase(), Phase::Running);
        assert_eq!(service.state().address(), Some(addr()));
    }

    #[test]
    fn stopped_server_does_not_restart() {
        let service = running(true);
        service.stop_remote_server();
        service.state().mark_running(addr());
        assert_eq!(service.state().phase(), Phase::Stopped);
    }
}
