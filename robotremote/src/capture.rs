//! Output capture for keyword invocations.
//!
//! There is a single process-wide capture slot. [`OutputCapture::begin`]
//! blocks until the slot is free and holds it until the capture is finished
//! or dropped, so two capture scopes can never overlap. Keywords write to the
//! [`Console`] borrowed from the active capture.
//!
//! With [`CaptureMode::ProcessStdout`] fd 1 is also pointed at a pipe for the
//! duration of the scope, so anything the keyword writes to the process
//! stdout (`std::io::stdout()`, C libraries, child processes inheriting fd 1)
//! ends up in the output too. Console writes then go through the same stream
//! and keep their order relative to raw stdout writes.
//!
//! ## Safety contracts
//!
//! The `unsafe` blocks below borrow or adopt fd 1, which the OS opens at
//! process startup. Adopted descriptors are forgotten after `dup2` so fd 1 is
//! never closed here.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(unix)]
use std::os::fd::{BorrowedFd, FromRawFd, OwnedFd};
#[cfg(unix)]
use std::io::Read;
#[cfg(unix)]
use std::sync::mpsc::{self, RecvTimeoutError};
#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
use nix::unistd::{dup, dup2, pipe};

static CAPTURE_SLOT: Mutex<()> = Mutex::new(());

#[cfg(unix)]
const STDOUT_FD: i32 = 1;

/// How long the pipe may stay quiet after fd 1 is restored before the
/// remaining writers are abandoned.
#[cfg(unix)]
const DRAIN_IDLE_TIMEOUT: Duration = Duration::from_millis(250);

/// What a capture scope collects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureMode {
    /// Only what the keyword writes to its [`Console`].
    #[default]
    Console,
    /// The console plus everything written to the process stdout.
    ProcessStdout,
}

/// Exclusive capture of everything a keyword writes while it runs.
pub(crate) struct OutputCapture {
    buffer: Vec<u8>,
    #[cfg(unix)]
    redirect: Option<StdoutRedirect>,
    // Declared last: the redirect is undone before the slot is released.
    _slot: MutexGuard<'static, ()>,
}

impl OutputCapture {
    pub(crate) fn begin(mode: CaptureMode) -> Self {
        // A panic while capturing is caught inside the scope, so poisoning
        // only means an earlier capture was torn down; the slot is still free.
        let slot = CAPTURE_SLOT.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::trace!(?mode, "Output capture started");

        #[cfg(unix)]
        let redirect = match mode {
            CaptureMode::Console => None,
            CaptureMode::ProcessStdout => match StdoutRedirect::begin() {
                Ok(redirect) => Some(redirect),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to redirect stdout, capturing console only");
                    None
                }
            },
        };
        #[cfg(not(unix))]
        {
            if mode == CaptureMode::ProcessStdout {
                tracing::debug!("Stdout redirection is not supported here, capturing console only");
            }
        }

        Self {
            buffer: Vec::new(),
            #[cfg(unix)]
            redirect,
            _slot: slot,
        }
    }

    #[cfg(unix)]
    fn redirected(&self) -> bool {
        self.redirect.is_some()
    }

    #[cfg(not(unix))]
    fn redirected(&self) -> bool {
        false
    }

    pub(crate) fn console(&mut self) -> Console<'_> {
        let sink = if self.redirected() {
            Sink::Stdout
        } else {
            Sink::Buffer(&mut self.buffer)
        };
        Console { sink }
    }

    /// End the capture, release the slot and return what was written.
    pub(crate) fn finish(mut self) -> Vec<u8> {
        #[allow(unused_mut)]
        let mut output = std::mem::take(&mut self.buffer);
        #[cfg(unix)]
        {
            if let Some(mut redirect) = self.redirect.take() {
                output.extend(redirect.restore());
            }
        }
        tracing::trace!(captured_bytes = output.len(), "Output capture finished");
        output
    }
}

/// fd 1 pointed at a pipe, drained by a reader thread until restored.
#[cfg(unix)]
struct StdoutRedirect {
    saved: Option<OwnedFd>,
    chunks: mpsc::Receiver<Vec<u8>>,
}

#[cfg(unix)]
impl StdoutRedirect {
    fn begin() -> io::Result<Self> {
        // Anything buffered so far belongs to whoever wrote it before us.
        io::stdout().flush()?;

        let (read, write) = pipe().map_err(|e| io::Error::other(format!("pipe failed: {e}")))?;

        // Started before fd 1 moves: if the redirect fails, dropping `write`
        // hands the reader EOF and it exits on its own.
        let (tx, chunks) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdout-capture".to_string())
            .spawn(move || {
                let mut file = std::fs::File::from(read);
                let mut chunk = [0u8; 4096];
                loop {
                    match file.read(&mut chunk) {
                        Ok(0) => break,
                        // Keeps draining after the capture gave up so late
                        // writers never block on a full pipe.
                        Ok(n) => {
                            let _ = tx.send(chunk[..n].to_vec());
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
            })?;

        let saved = unsafe {
            let fd = BorrowedFd::borrow_raw(STDOUT_FD);
            dup(fd)
        }
        .map_err(|e| io::Error::other(format!("dup(1) failed: {e}")))?;

        point_stdout_at(&write)?;
        // fd 1 is now the only write end we hold; restoring it closes the pipe.
        drop(write);

        Ok(Self {
            saved: Some(saved),
            chunks,
        })
    }

    /// Put the original fd 1 back and collect what went through the pipe.
    fn restore(&mut self) -> Vec<u8> {
        let _ = io::stdout().flush();

        if let Some(saved) = self.saved.take()
            && let Err(e) = point_stdout_at(&saved)
        {
            tracing::error!(error = %e, "Failed to restore stdout");
        }

        let mut captured = Vec::new();
        loop {
            match self.chunks.recv_timeout(DRAIN_IDLE_TIMEOUT) {
                Ok(chunk) => captured.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    // A child process spawned by the keyword still holds the pipe.
                    tracing::warn!("Stdout pipe still open after the keyword returned");
                    break;
                }
            }
        }
        captured
    }
}

#[cfg(unix)]
impl Drop for StdoutRedirect {
    fn drop(&mut self) {
        if self.saved.is_some() {
            self.restore();
        }
    }
}

#[cfg(unix)]
fn point_stdout_at(fd: &OwnedFd) -> io::Result<()> {
    let mut target = unsafe { OwnedFd::from_raw_fd(STDOUT_FD) };
    let result =
        dup2(fd, &mut target).map_err(|e| io::Error::other(format!("dup2 stdout failed: {e}")));
    std::mem::forget(target);
    result
}

/// Robot Framework log level markers understood in keyword output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Html,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Html => "HTML",
            Self::Warn => "WARN",
        }
    }

    /// Parse a level name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "HTML" => Some(Self::Html),
            "WARN" => Some(Self::Warn),
            _ => None,
        }
    }
}

enum Sink<'a> {
    Buffer(&'a mut Vec<u8>),
    Stdout,
}

/// The console a keyword writes to while it runs.
pub struct Console<'a> {
    sink: Sink<'a>,
}

impl Console<'_> {
    pub fn print(&mut self, text: &str) {
        let _ = self.write_all(text.as_bytes());
    }

    pub fn println(&mut self, text: &str) {
        self.print(text);
        self.print("\n");
    }

    /// Write `*LEVEL* message` on its own line.
    pub fn log(&mut self, level: LogLevel, message: &str) {
        self.println(&format!("*{}* {message}", level.as_str()));
    }

    pub fn info(&mut self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn debug(&mut self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn trace(&mut self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    pub fn html(&mut self, message: &str) {
        self.log(LogLevel::Html, message);
    }
}

impl Write for Console<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Buffer(buffer) => {
                buffer.extend_from_slice(buf);
                Ok(buf.len())
            }
            Sink::Stdout => io::stdout().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Buffer(_) => Ok(()),
            Sink::Stdout => io::stdout().flush(),
        }
    }
}
