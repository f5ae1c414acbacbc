//! Newline-delimited JSON-RPC envelopes spoken between the curator and its
//! worker process. One envelope per line in both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod tools;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

pub const TOOL_GET_ALL_TITLES: &str = "get_all_titles";
pub const TOOL_GET_ABSTRACTS: &str = "get_abstracts_for_papers";

pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INVALID_PARAMS: i64 = -32602;
pub const CODE_TOOL_FAILED: i64 = -32000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: JsonValue,
}

impl RequestEnvelope {
    pub fn new(id: u64, method: impl Into<String>, params: JsonValue) -> Self {
        Self { jsonrpc: jsonrpc_version(), id: Some(id), method: method.into(), params }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl ResponseEnvelope {
    pub fn ok(id: Option<u64>, result: JsonValue) -> Self {
        Self { jsonrpc: jsonrpc_version(), id, result: Some(result), error: None }
    }

    pub fn err(id: Option<u64>, code: i64, message: impl Into<String>) -> Self {
        Self { jsonrpc: jsonrpc_version(), id, result: None, error: Some(RpcError { code, message: message.into() }) }
    }

    /// `error` wins over `result`; a response carrying neither is an error too.
    pub fn into_outcome(self) -> Result<JsonValue, RpcError> {
        match (self.error, self.result) {
            (Some(e), _) => Err(e),
            (None, Some(v)) => Ok(v),
            (None, None) => Err(RpcError { code: 0, message: "response carried neither result nor error".into() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("tool result has no text content")]
    Empty,
    #[error("tool result text is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ToolCallResult {
    /// Wraps a structured result as the single text item of a tool reply.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let text = serde_json::to_string(value)?;
        Ok(Self { content: vec![ToolContent { kind: "text".into(), text }] })
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find(|c| c.kind == "text").map(|c| c.text.as_str())
    }

    /// Parses the embedded JSON document of the first text item.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, ContentError> {
        let text = self.first_text().ok_or(ContentError::Empty)?;
        Ok(serde_json::from_str(text)?)
    }
}

fn jsonrpc_version() -> String { JSONRPC_VERSION.to_string() }
