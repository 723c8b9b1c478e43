//! Keyword failures.
//!
//! A keyword reports failure by returning a [`KeywordError`]. The error kind
//! decides how the failure is rendered (see [`KeywordError::render_message`])
//! and whether it terminates the server instead of becoming a FAIL result.

use std::any::Any;
use std::fmt;
use std::panic::Location;

/// Failure kind carried by a [`KeywordError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// `AssertionError`: a verification failed.
    Assertion,
    /// `RuntimeError`: generic runtime failure.
    Runtime,
    /// `Exception`: catch-all failure.
    Exception,
    /// The keyword panicked.
    Panic,
    /// `TypeError`: the arguments did not match the signature.
    Type,
    /// `AttributeError`: no keyword with the requested name.
    Lookup,
    /// Any other failure kind, by name.
    Named(String),
    /// `SystemExit`: the keyword asked the process to exit.
    Exit(i32),
    /// `KeyboardInterrupt`.
    Interrupt,
}

impl ErrorKind {
    pub fn name(&self) -> &str {
        match self {
            Self::Assertion => "AssertionError",
            Self::Runtime => "RuntimeError",
            Self::Exception => "Exception",
            Self::Panic => "Panic",
            Self::Type => "TypeError",
            Self::Lookup => "AttributeError",
            Self::Named(name) => name,
            Self::Exit(_) => "SystemExit",
            Self::Interrupt => "KeyboardInterrupt",
        }
    }

    /// Generic kinds carry a pre-formatted message and are rendered without
    /// the kind prefix. Matching is exact: a `Named` kind is never generic.
    pub fn is_generic(&self) -> bool {
        matches!(
            self,
            Self::Assertion | Self::Runtime | Self::Exception | Self::Panic
        )
    }

    /// Fatal kinds are never turned into a result.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Exit(_) | Self::Interrupt)
    }

    /// Process exit status requested by a fatal kind.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit(code) => Some(*code),
            Self::Interrupt => Some(130),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One traceback entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    /// Function name, when known. The keyword name is used otherwise.
    pub function: Option<String>,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: u32, function: Option<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function,
        }
    }

    /// Frame for the caller of the current function.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self::new(location.file(), location.line(), None)
    }

    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

/// Failure raised by a keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordError {
    kind: ErrorKind,
    message: String,
    /// Outermost first.
    frames: Vec<Frame>,
}

impl KeywordError {
    /// Create an error, recording the call site as its innermost frame.
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: vec![Frame::caller()],
        }
    }

    /// Create an error without any frames.
    pub fn untraced(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    #[track_caller]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion, message)
    }

    #[track_caller]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    #[track_caller]
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exception, message)
    }

    /// Failure of a custom kind, rendered as `Kind: message`.
    #[track_caller]
    pub fn named(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Named(kind.into()), message)
    }

    /// Ask the server process to exit with `code`.
    #[track_caller]
    pub fn exit(code: i32) -> Self {
        Self::new(ErrorKind::Exit(code), code.to_string())
    }

    #[track_caller]
    pub fn interrupt() -> Self {
        Self::new(ErrorKind::Interrupt, "")
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::untraced(ErrorKind::Type, message)
    }

    pub(crate) fn not_found(name: &str) -> Self {
        Self::untraced(
            ErrorKind::Lookup,
            format!("No keyword with name '{name}' found."),
        )
    }

    /// Convert a panic payload caught around a keyword call.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::new()
        };
        Self::untraced(ErrorKind::Panic, message)
    }

    /// Record an outer frame, e.g. the helper that propagated this error.
    #[track_caller]
    pub fn traced(mut self) -> Self {
        self.frames.insert(0, Frame::caller());
        self
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.insert(0, frame);
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Message as reported to the remote caller.
    ///
    /// Empty message: the kind name. Generic kind: the bare message.
    /// Otherwise `Kind: message`.
    pub fn render_message(&self) -> String {
        if self.message.is_empty() {
            return self.kind.name().to_string();
        }
        if self.kind.is_generic() {
            return self.message.clone();
        }
        format!("{}: {}", self.kind, self.message)
    }
}

impl fmt::Display for KeywordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_message())
    }
}

impl std::error::Error for KeywordError {}

impl From<std::io::Error> for KeywordError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => "FileNotFoundError",
            std::io::ErrorKind::PermissionDenied => "PermissionError",
            _ => "OSError",
        };
        Self::named(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_kinds_render_bare() {
        assert_eq!(KeywordError::runtime("boom").render_message(), "boom");
        assert_eq!(KeywordError::assertion("x != y").render_message(), "x != y");
        assert_eq!(KeywordError::exception("oops").render_message(), "oops");
    }

    #[test]
    fn custom_kinds_are_prefixed() {
        let err = KeywordError::named("ValueError", "bad");
        assert_eq!(err.render_message(), "ValueError: bad");
        assert_eq!(err.to_string(), "ValueError: bad");
    }

    #[test]
    fn named_generic_lookalike_is_still_prefixed() {
        let err = KeywordError::named("RuntimeError", "custom class");
        assert_eq!(err.render_message(), "RuntimeError: custom class");
    }

    #[test]
    fn empty_message_renders_kind() {
        assert_eq!(KeywordError::runtime("").render_message(), "RuntimeError");
        assert_eq!(
            KeywordError::named("CustomError", "").render_message(),
            "CustomError"
        );
    }

    #[test]
    fn records_call_site() {
        let line = line!() + 1;
        let err = KeywordError::runtime("here");
        assert_eq!(err.frames().len(), 1);
        assert_eq!(err.frames()[0].line, line);
        assert!(err.frames()[0].file.ends_with("error.rs"));
    }

    #[test]
    fn traced_prepends_outer_frame() {
        let err = KeywordError::runtime("inner").traced();
        assert_eq!(err.frames().len(), 2);
        assert_eq!(err.frames()[0].line, err.frames()[1].line);
    }

    #[test]
    fn fatal_kinds_and_exit_codes() {
        assert!(ErrorKind::Exit(3).is_fatal());
        assert_eq!(ErrorKind::Exit(3).exit_code(), Some(3));
        assert_eq!(ErrorKind::Interrupt.exit_code(), Some(130));
        assert!(!ErrorKind::Runtime.is_fatal());
        assert_eq!(ErrorKind::Runtime.exit_code(), None);
    }

    #[test]
    fn panic_payloads() {
        let err = KeywordError::from_panic(Box::new("static msg"));
        assert_eq!(err.render_message(), "static msg");

        let err = KeywordError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.render_message(), "owned");

        let err = KeywordError::from_panic(Box::new(42));
        assert_eq!(err.render_message(), "Panic");
    }

    #[test]
    fn io_errors_map_to_named_kinds() {
        let err: KeywordError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err.render_message(), "FileNotFoundError: missing");
    }
}
