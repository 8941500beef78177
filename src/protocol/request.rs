//! Outgoing requests before session and message ids are stamped.

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::packet::{Action, Packet};
use crate::error::{HomeConnectError, Result};

lazy_static! {
    /// `ACTION /service/path/vVERSION`, e.g. `GET /ci/wifiSetting/v3`
    static ref REQUEST_TEXT: Regex = Regex::new(
        r"^\s*(?P<action>\w+?) /(?P<service>\w+?)/(?P<path>\w+?)/v(?P<version>\d+)\s*$"
    )
    .expect("request pattern is valid");
}

/// A request to be sent on the current session
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Action verb
    pub action: Action,
    /// Addressed resource
    pub resource: String,
    /// Resource version
    pub version: u8,
    /// Optional payload
    pub data: Option<Vec<Value>>,
}

impl Request {
    /// Create a request without payload
    pub fn new(action: Action, resource: impl Into<String>, version: u8) -> Self {
        Self {
            action,
            resource: resource.into(),
            version,
            data: None,
        }
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Stamp session and message ids to produce the wire packet
    pub fn into_packet(self, session_id: u32, message_id: i64) -> Packet {
        Packet {
            session_id,
            message_id,
            code: None,
            resource: self.resource,
            version: self.version,
            action: self.action,
            data: self.data,
        }
    }
}

impl FromStr for Request {
    type Err = HomeConnectError;

    fn from_str(s: &str) -> Result<Self> {
        let captures = REQUEST_TEXT.captures(s).ok_or_else(|| {
            HomeConnectError::InvalidRequest(format!(
                "Expected 'ACTION /service/path/vVERSION', got '{s}'"
            ))
        })?;

        let action = captures["action"].parse()?;
        let version = captures["version"].parse::<u8>().map_err(|e| {
            HomeConnectError::InvalidRequest(format!(
                "Version '{}' out of range: {e}",
                &captures["version"]
            ))
        })?;
        let resource = format!("/{}/{}", &captures["service"], &captures["path"]);

        Ok(Self::new(action, resource, version))
    }
}
