//! robotremote: serve Rust keyword libraries to Robot Framework over the
//! remote library interface.

mod arguments;
mod capture;
mod codec;
mod engine;
mod error;
mod introspect;
mod invocation;
mod library;
mod registry;
mod value;

pub mod demo;
pub mod service;
pub mod transport;

pub use arguments::Arguments;
pub use capture::{CaptureMode, Console, LogLevel};
pub use codec::{EncodingError, decode_argument, encode_return};
pub use engine::{RunError, run_keyword};
pub use error::{ErrorKind, Frame, KeywordError};
pub use introspect::{INIT_DOC, INTRO_DOC, argument_specs};
pub use invocation::{KeywordResult, KeywordStatus};
pub use library::{Keyword, KeywordSet, Library, Member, Param, Signature};
pub use registry::{KeywordRegistry, STOP_REMOTE_SERVER};
pub use service::{CallReply, Phase, RemoteCall, RemoteService, ServerState};
pub use value::{BINARY_TAG, Value, WireError, WireValue};
