//! Keyword invocation: argument decoding, output capture, failure translation.

use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;

use crate::arguments::Arguments;
use crate::capture::{CaptureMode, Console, OutputCapture};
use crate::codec::{self, EncodingError};
use crate::error::{ErrorKind, Frame, KeywordError};
use crate::invocation::KeywordResult;
use crate::registry::KeywordRegistry;
use crate::value::{Value, WireValue};

/// Failures that do not become a result record.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("keyword '{keyword}' raised {kind}, terminating")]
    Fatal {
        keyword: String,
        kind: ErrorKind,
        exit_code: i32,
    },

    #[error("remote server is stopped, call rejected")]
    Stopped,
}

/// Run `name` with wire arguments and build its result record.
///
/// Capture is always finished before this returns, including for fatal
/// failures and encoding errors.
pub fn run_keyword(
    registry: &KeywordRegistry,
    capture_mode: CaptureMode,
    name: &str,
    args: Vec<WireValue>,
    kwargs: IndexMap<String, WireValue>,
) -> Result<KeywordResult, RunError> {
    let (args, kwargs) = codec::decode_arguments(args, kwargs);

    let mut capture = OutputCapture::begin(capture_mode);
    let outcome = call_keyword(registry, name, args, kwargs, &mut capture.console());
    let output = codec::binary_safe_bytes(&capture.finish());

    match outcome {
        Ok(value) => {
            let return_value = codec::encode_return(&value)?;
            tracing::debug!(keyword = name, "Keyword passed");
            Ok(KeywordResult::passed(return_value).with_output(output))
        }
        Err(error) if error.kind().is_fatal() => {
            let exit_code = error.kind().exit_code().unwrap_or(1);
            tracing::error!(keyword = name, kind = %error.kind(), exit_code, "Keyword requested termination");
            Err(RunError::Fatal {
                keyword: name.to_string(),
                kind: error.kind().clone(),
                exit_code,
            })
        }
        Err(error) => {
            let message = codec::binary_safe_text(&error.render_message())?;
            let traceback = format_traceback(name, error.frames());
            tracing::debug!(keyword = name, error = %error, "Keyword failed");
            Ok(KeywordResult::failed(message, traceback).with_output(output))
        }
    }
}

fn call_keyword(
    registry: &KeywordRegistry,
    name: &str,
    args: Vec<Value>,
    kwargs: IndexMap<String, Value>,
    console: &mut Console<'_>,
) -> Result<Value, KeywordError> {
    let keyword = registry
        .resolve(name)
        .ok_or_else(|| KeywordError::not_found(name))?;
    let arguments = Arguments::bind(keyword.name(), keyword.signature(), args, kwargs)?;

    panic::catch_unwind(AssertUnwindSafe(|| keyword.call(&arguments, console)))
        .unwrap_or_else(|payload| Err(KeywordError::from_panic(payload)))
}

/// "Most recent call last" trace built from the frames the error recorded.
///
/// Frames come from `#[track_caller]` and `with_frame` in keyword code, so the
/// engine never appears in them. Each entry is the `File "..", line N, in fn`
/// header only: the source text is not available at runtime, so there is no
/// code line under it.
fn format_traceback(keyword: &str, frames: &[Frame]) -> String {
    let mut trace = String::from("Traceback (most recent call last):\n");
    for frame in frames {
        let function = frame.function.as_deref().unwrap_or(keyword);
        let _ = writeln!(
            trace,
            "  File \"{}\", line {}, in {}",
            frame.file, frame.line, function
        );
    }
    trace
}
