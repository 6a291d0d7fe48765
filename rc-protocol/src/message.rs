//! Wire envelope and response decoding.
//!
//! Outbound wire format (one text frame per command):
//! ```text
//! {"command": "<name>", "options": { ... }}
//! ```
//!
//! Inbound frames may be text or binary. Both are parsed as JSON, and the
//! decoded value must be an object to become a `Response`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// A single command sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    command: String,
    #[serde(default)]
    options: Map<String, Value>,
}

impl Command {
    /// Create a command with no options.
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_options(command, Map::new())
    }

    /// Create a command with the given options.
    pub fn with_options(command: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            command: command.into(),
            options,
        }
    }

    /// Command name.
    pub fn name(&self) -> &str {
        &self.command
    }

    /// Command options.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Serialize to the text form sent over the wire.
    ///
    /// # Errors
    ///
    /// Returns error if the command name is empty.
    pub fn to_wire(&self) -> Result<String, ProtocolError> {
        if self.command.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Decoded response to a command.
///
/// Holds the fields of the JSON object the server replied with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Response(Map<String, Value>);

impl Response {
    /// Decode a response from an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ProtocolError::NotAnObject(kind_of(&other))),
        }
    }

    /// Decode a response from a text frame.
    pub fn from_wire(text: &str) -> Result<Self, ProtocolError> {
        Self::from_value(parse_text(text)?)
    }

    /// Look up a single field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// All fields of the response.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the response and return its fields.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

/// Parse a text frame into a JSON value.
pub fn parse_text(text: &str) -> Result<Value, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
}

/// Parse a binary frame into a JSON value.
///
/// The bytes must be UTF-8 encoded JSON.
pub fn parse_bytes(bytes: &[u8]) -> Result<Value, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    parse_text(text)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
