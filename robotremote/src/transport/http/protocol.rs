//! JSON-RPC 2.0 envelope and remote call decoding.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::EncodingError;
use crate::engine::RunError;
use crate::service::{CallReply, RemoteCall};
use crate::value::WireValue;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const ENCODING_ERROR: i32 = -32000;
pub const SERVER_TERMINATING: i32 = -32001;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CallReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: CallReply) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: &RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code: error.code(),
                message: error.to_string(),
            }),
            id,
        }
    }
}

/// Request-level failures reported as JSON-RPC errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("{0}")]
    Terminating(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::Encoding(_) => ENCODING_ERROR,
            Self::Terminating(_) => SERVER_TERMINATING,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }
}

impl From<RunError> for RpcError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Encoding(e) => Self::Encoding(e),
            other @ (RunError::Fatal { .. } | RunError::Stopped) => {
                Self::Terminating(other.to_string())
            }
        }
    }
}

/// Decode a request body into its id and the call it asks for.
///
/// The id is returned even when the call is invalid so the error response
/// can still be correlated.
pub fn parse_request(body: &[u8]) -> (Value, Result<RemoteCall, RpcError>) {
    let raw: Value = match serde_json::from_slice(body) {
        Ok(raw) => raw,
        Err(e) => return (Value::Null, Err(RpcError::Parse(e.to_string()))),
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => return (id, Err(RpcError::InvalidRequest(e.to_string()))),
    };
    if let Some(version) = request.jsonrpc.as_deref()
        && version != "2.0"
    {
        let err = RpcError::InvalidRequest(format!("unsupported jsonrpc version '{version}'"));
        return (id, Err(err));
    }

    (id, parse_call(&request.method, request.params))
}

/// Positional (XML-RPC style) or named parameters.
enum Params {
    Positional(Vec<Value>),
    Named(serde_json::Map<String, Value>),
}

impl Params {
    fn new(params: Option<Value>) -> Result<Self, RpcError> {
        match params {
            None | Some(Value::Null) => Ok(Self::Positional(Vec::new())),
            Some(Value::Array(items)) => Ok(Self::Positional(items)),
            Some(Value::Object(map)) => Ok(Self::Named(map)),
            Some(_) => Err(RpcError::InvalidParams(
                "params must be an array or an object".to_string(),
            )),
        }
    }

    /// Parameter at `index` or named `name`; JSON null counts as absent.
    fn take(&mut self, index: usize, name: &str) -> Option<Value> {
        let value = match self {
            Self::Positional(items) => items.get_mut(index).map(Value::take),
            Self::Named(map) => map.remove(name),
        };
        value.filter(|v| !v.is_null())
    }

    fn name(&mut self) -> Result<String, RpcError> {
        match self.take(0, "name") {
            Some(Value::String(name)) => Ok(name),
            Some(other) => Err(RpcError::InvalidParams(format!(
                "keyword name must be a string, got {other}"
            ))),
            None => Err(RpcError::InvalidParams("missing keyword name".to_string())),
        }
    }

    fn decode<T>(&mut self, index: usize, name: &str) -> Result<T, RpcError>
    where
        T: Default + serde::de::DeserializeOwned,
    {
        match self.take(index, name) {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| RpcError::InvalidParams(format!("invalid '{name}': {e}"))),
            None => Ok(T::default()),
        }
    }
}

/// Map a method name and its parameters to a [`RemoteCall`].
pub fn parse_call(method: &str, params: Option<Value>) -> Result<RemoteCall, RpcError> {
    let mut params = Params::new(params)?;
    match method {
        "get_keyword_names" => Ok(RemoteCall::GetKeywordNames),
        "run_keyword" => {
            let name = params.name()?;
            let args: Vec<WireValue> = params.decode(1, "args")?;
            let kwargs: IndexMap<String, WireValue> = params.decode(2, "kwargs")?;
            Ok(RemoteCall::RunKeyword { name, args, kwargs })
        }
        "get_keyword_arguments" => Ok(RemoteCall::GetKeywordArguments {
            name: params.name()?,
        }),
        "get_keyword_documentation" => Ok(RemoteCall::GetKeywordDocumentation {
            name: params.name()?,
        }),
        "stop_remote_server" => Ok(RemoteCall::StopRemoteServer),
        other => Err(RpcError::MethodNotFound(other.to_string())),
    }
}
