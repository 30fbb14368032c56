//! JSON-RPC 2.0 framing for the MCP channel.
//!
//! Incoming lines are either requests (they carry an `id` and get exactly one
//! reply) or notifications (no `id`, no reply). Every reply the server sends
//! is an [`OutgoingMessage`]: a success response or an error response.
//!
//! Request IDs are strings or integers. A `null` ID is rejected as an invalid
//! request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this server speaks.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported during initialisation.
pub const SERVER_NAME: &str = "autocad-mcp";

const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric ID.
    Number(i64),
    /// String ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A request from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol marker, always `"2.0"`.
    pub jsonrpc: String,
    /// Request identifier, echoed in the reply.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Deserialises `params` into `T`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-params error naming `what` if the params are absent
    /// or do not match `T`.
    pub fn params_as<T: serde::de::DeserializeOwned>(&self, what: &str) -> Result<T, JsonRpcError> {
        let Some(params) = self.params.clone() else {
            return Err(JsonRpcError::invalid_params(
                self.id.clone(),
                format!("Missing {what} params"),
            ));
        };
        serde_json::from_value(params).map_err(|e| {
            JsonRpcError::invalid_params(self.id.clone(), format!("Invalid {what} params: {e}"))
        })
    }
}

/// A notification from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol marker, always `"2.0"`.
    pub jsonrpc: String,
    /// Notification name.
    pub method: String,
    /// Notification parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A successful reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// ID of the request being answered.
    pub id: RequestId,
    /// Method result.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a success reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// Standard JSON-RPC error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The line was not valid JSON.
    ParseError,
    /// The JSON was not a valid request.
    InvalidRequest,
    /// The method is unknown.
    MethodNotFound,
    /// The method parameters are malformed.
    InvalidParams,
    /// The server failed while handling the request.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Returns the standard message for the code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code.
    pub code: i32,
    /// Short description.
    pub message: String,
    /// Extra detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates error data with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }
}

impl From<ErrorCode> for JsonRpcErrorData {
    fn from(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }
}

/// An error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// ID of the failed request, when it could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates an error reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }

    /// The line could not be parsed as JSON.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, ErrorCode::ParseError.into())
    }

    /// The message is not a valid request.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, ErrorCode::InvalidRequest.into())
    }

    /// The request is valid but not allowed in the current state.
    #[must_use]
    pub fn rejected(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// The method is unknown.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// The method parameters are malformed.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Handling the request failed inside the server.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// A reply written to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    /// Success reply.
    Response(JsonRpcResponse),
    /// Error reply.
    Error(JsonRpcError),
}

impl OutgoingMessage {
    /// Returns the result of a success reply.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Response(response) => Some(&response.result),
            Self::Error(_) => None,
        }
    }

    /// Returns the error of an error reply.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Self::Response(_) => None,
            Self::Error(error) => Some(&error.error),
        }
    }
}

impl From<Result<JsonRpcResponse, JsonRpcError>> for OutgoingMessage {
    fn from(result: Result<JsonRpcResponse, JsonRpcError>) -> Self {
        match result {
            Ok(response) => Self::Response(response),
            Err(error) => Self::Error(error),
        }
    }
}

impl From<JsonRpcError> for OutgoingMessage {
    fn from(error: JsonRpcError) -> Self {
        Self::Error(error)
    }
}

/// A parsed line from the client.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a reply.
    Request(JsonRpcRequest),
    /// A notification.
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }

    /// Returns the request ID, if this is a request.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) => None,
        }
    }
}

/// Parses one line from the client.
///
/// # Errors
///
/// Returns a parse error for malformed JSON and an invalid-request error for
/// JSON that is not a JSON-RPC 2.0 request or notification.
pub fn parse_message(line: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(line).map_err(|_| JsonRpcError::parse_error())?;
    let Some(object) = value.as_object() else {
        return Err(JsonRpcError::parse_error());
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(JsonRpcError::invalid_request(None));
    }

    if !object.contains_key("id") {
        return serde_json::from_value(value)
            .map(IncomingMessage::Notification)
            .map_err(|_| JsonRpcError::invalid_request(None));
    }

    let request: JsonRpcRequest =
        serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
    if request.method.is_empty() {
        return Err(JsonRpcError::invalid_request(Some(request.id)));
    }
    Ok(IncomingMessage::Request(request))
}
