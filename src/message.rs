//! Message envelopes exchanged with monitoring drivers
//!
//! Every unit of driver communication, in either direction, is a [`Message`]:
//! a type tag, the id of the object it refers to and an opaque text payload.
//! How the payload is read depends only on the type:
//!
//! | Type            | Direction      | Payload                         |
//! |-----------------|----------------|---------------------------------|
//! | `HOST_STATE`    | driver → core  | bare host state name            |
//! | `SYSTEM_HOST`   | driver → core  | attribute document              |
//! | `STATE_VM`      | driver → core  | attribute document of VM states |
//! | `START_MONITOR` | core → driver  | `"1"` / `"0"` (update remotes)  |
//! | `STOP_MONITOR`  | core → driver  | document with `NAME`, `IM_MAD`  |
//! | `UPDATE_HOST`   | core → driver  | host document                   |
//! | `DEL_HOST`      | core → driver  | empty                           |
//! | `HOST_LIST`     | core → driver  | full pool document              |
//!
//! ## Line codec
//!
//! Process drivers speak one message per line: `TYPE OID PAYLOAD`, where
//! `PAYLOAD` is a JSON string literal so multi-line documents stay on one line.

use std::fmt;
use std::str::FromStr;

use crate::error::{ImError, ImResult};

/// Object id used by messages that are not addressed to a single host
pub const NO_OID: i32 = -1;

/// Type tag of a driver message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Undefined,
    HostState,
    SystemHost,
    VmState,
    StopMonitor,
    StartMonitor,
    UpdateHost,
    DelHost,
    HostList,
}

impl MessageType {
    pub const ALL: [MessageType; 9] = [
        MessageType::Undefined,
        MessageType::HostState,
        MessageType::SystemHost,
        MessageType::VmState,
        MessageType::StopMonitor,
        MessageType::StartMonitor,
        MessageType::UpdateHost,
        MessageType::DelHost,
        MessageType::HostList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Undefined => "UNDEFINED",
            MessageType::HostState => "HOST_STATE",
            MessageType::SystemHost => "SYSTEM_HOST",
            MessageType::VmState => "STATE_VM",
            MessageType::StopMonitor => "STOP_MONITOR",
            MessageType::StartMonitor => "START_MONITOR",
            MessageType::UpdateHost => "UPDATE_HOST",
            MessageType::DelHost => "DEL_HOST",
            MessageType::HostList => "HOST_LIST",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = std::convert::Infallible;

    /// Unknown tags map to `Undefined` so they reach the undefined handler
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .unwrap_or(MessageType::Undefined))
    }
}

/// A single driver message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,

    /// Target object id, meaningful only for per-host types
    pub oid: i32,

    pub payload: String,
}

impl Message {
    pub fn new(message_type: MessageType, oid: i32, payload: impl Into<String>) -> Self {
        Self {
            message_type,
            oid,
            payload: payload.into(),
        }
    }

    /// Encode the message as a single protocol line (without newline)
    pub fn to_line(&self) -> String {
        let payload = serde_json::Value::String(self.payload.clone());
        format!("{} {} {}", self.message_type, self.oid, payload)
    }

    /// Decode a protocol line
    ///
    /// An unknown type tag is not an error; the message is decoded as
    /// `Undefined` and keeps its payload. A missing payload decodes as empty.
    pub fn from_line(line: &str) -> ImResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(3, ' ');

        let tag = parts
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ImError::Decode("empty message line".to_string()))?;

        let oid = match parts.next() {
            Some(oid) => oid
                .parse::<i32>()
                .map_err(|e| ImError::Decode(format!("invalid object id '{oid}': {e}")))?,
            None => NO_OID,
        };

        let payload = match parts.next().map(str::trim) {
            Some(raw) if !raw.is_empty() => serde_json::from_str::<String>(raw)
                .map_err(|e| ImError::Decode(format!("invalid payload: {e}")))?,
            _ => String::new(),
        };

        let message_type = tag.parse().unwrap_or(MessageType::Undefined);

        Ok(Self {
            message_type,
            oid,
            payload,
        })
    }
}
