//! Packets exchanged with the appliance.
//!
//! Defines the JSON wire format carried in every text frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HomeConnectError, Result};

/// Packet action verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Read a resource
    Get,
    /// Change a resource
    Set,
    /// Create or replace a resource
    Put,
    /// Unsolicited event
    Notify,
    /// Reply to a request
    Response,
}

impl Action {
    /// Wire name of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Put => "PUT",
            Self::Notify => "NOTIFY",
            Self::Response => "RESPONSE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = HomeConnectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "SET" => Ok(Self::Set),
            "PUT" => Ok(Self::Put),
            "NOTIFY" => Ok(Self::Notify),
            "RESPONSE" => Ok(Self::Response),
            _ => Err(HomeConnectError::InvalidRequest(format!(
                "Unknown action: {s}"
            ))),
        }
    }
}

/// Protocol packet envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Session ID assigned by the appliance
    #[serde(rename = "sID")]
    pub session_id: u32,
    /// Sender-local message sequence number
    #[serde(rename = "msgID")]
    pub message_id: i64,
    /// Outcome code, only on responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Addressed resource, e.g. `/ci/services`
    pub resource: String,
    /// Resource version
    pub version: u8,
    /// Action verb
    pub action: Action,
    /// Resource-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
}

impl Packet {
    /// Create a packet without code or payload
    pub fn new(
        session_id: u32,
        message_id: i64,
        action: Action,
        resource: impl Into<String>,
        version: u8,
    ) -> Self {
        Self {
            session_id,
            message_id,
            code: None,
            resource: resource.into(),
            version,
            action,
            data: None,
        }
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a status code
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// First payload element, if any
    pub fn first_data(&self) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.first())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sID={}, mID={}, req='{} {}/v{}'",
            self.session_id, self.message_id, self.action, self.resource, self.version
        )?;

        if let Some(data) = &self.data {
            let joined = data
                .iter()
                .map(|value| value.to_string())
                .collect::<Vec<_>>()
                .join(",");
            write!(f, ", data='{joined}'")?;
        }

        if let Some(code) = self.code {
            write!(f, ", code={code}")?;
        }

        Ok(())
    }
}
