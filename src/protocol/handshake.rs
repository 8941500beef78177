//! Session bootstrap state machine.
//!
//! The appliance drives the bootstrap: it pushes `/ei/initialValues`, the
//! client answers and asks for `/ci/services`, and once the catalog arrives the
//! client announces itself and becomes ready. The machine performs no I/O; each
//! inbound packet yields a [`HandshakeStep`] describing what to send next.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::catalog::ServiceCatalog;
use super::packet::{Action, Packet};
use super::request::Request;
use super::{
    RESOURCE_DEVICE_READY, RESOURCE_INITIAL_VALUES, RESOURCE_IZ_INFO,
    RESOURCE_REGISTERED_DEVICES, RESOURCE_SERVICES,
};
use crate::error::{HomeConnectError, Result};

/// Handshake state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the appliance to push `/ei/initialValues`
    AwaitingInitialValues,
    /// `/ci/services` requested, waiting for the catalog
    AwaitingServiceCatalog,
    /// Bootstrap complete
    Ready,
    /// A packet could not be decoded or broke the session rules
    Failed,
    /// Peer closed before ready
    Closed,
}

impl HandshakeState {
    /// Check if the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Closed)
    }
}

/// Identity the client reports in its `/ei/initialValues` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Device type, `Application` for a controlling client
    pub device_type: String,
    /// Human-readable client name
    pub device_name: String,
    /// Stable client id
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            device_type: "Application".to_string(),
            device_name: "homeconnect".to_string(),
            device_id: "deadbeef".to_string(),
        }
    }
}

/// Client packets sent during the bootstrap
const HANDSHAKE_MESSAGES: i64 = 5;

/// `/ei/initialValues` payload element
#[derive(Debug, Deserialize)]
struct InitialValues {
    #[serde(rename = "edMsgID")]
    ed_msg_id: i64,
}

/// Actions produced by one inbound packet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandshakeStep {
    /// Reset the client message counter to this value before sending
    pub seed_message_id: Option<i64>,
    /// Requests to send, in order, on the current session
    pub requests: Vec<Request>,
    /// The session is ready once `requests` are sent
    pub ready: bool,
}

impl HandshakeStep {
    /// Check if the packet was ignored
    pub fn is_empty(&self) -> bool {
        self.seed_message_id.is_none() && self.requests.is_empty() && !self.ready
    }
}

/// Client side of the session bootstrap
#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    identity: DeviceIdentity,
    session_id: Option<u32>,
    catalog: Option<ServiceCatalog>,
}

impl Handshake {
    /// Create a handshake that reports `identity` to the appliance
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            state: HandshakeState::AwaitingInitialValues,
            identity,
            session_id: None,
            catalog: None,
        }
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Check if the bootstrap completed
    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    /// Session ID learned from `/ei/initialValues`
    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Catalog learned from `/ci/services`
    pub fn catalog(&self) -> Option<&ServiceCatalog> {
        self.catalog.as_ref()
    }

    /// Process an inbound packet.
    ///
    /// Packets for resources other than the one the current state expects are
    /// ignored and yield an empty step. A decode failure moves the machine to
    /// [`HandshakeState::Failed`].
    pub fn process(&mut self, packet: &Packet) -> Result<HandshakeStep> {
        let result = match (self.state, packet.resource.as_str()) {
            (HandshakeState::AwaitingInitialValues, RESOURCE_INITIAL_VALUES) => {
                self.process_initial_values(packet)
            },
            (HandshakeState::AwaitingServiceCatalog, RESOURCE_SERVICES) => {
                self.process_services(packet)
            },
            (state, resource) => {
                tracing::debug!(?state, resource, "Ignoring packet during handshake");
                Ok(HandshakeStep::default())
            },
        };

        if result.is_err() {
            self.state = HandshakeState::Failed;
        }
        result
    }

    /// Record that the peer closed the channel
    pub fn close(&mut self) {
        if self.state != HandshakeState::Ready {
            self.state = HandshakeState::Closed;
        }
    }

    /// Record a fatal channel error; a finished handshake stays finished
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = HandshakeState::Failed;
        }
    }

    fn process_initial_values(&mut self, packet: &Packet) -> Result<HandshakeStep> {
        let element = packet.first_data().ok_or_else(|| {
            HomeConnectError::Decode("/ei/initialValues carries no data".to_string())
        })?;
        let initial = InitialValues::deserialize(element).map_err(|e| {
            HomeConnectError::Decode(format!("/ei/initialValues missing edMsgID: {e}"))
        })?;

        if initial.ed_msg_id > i64::MAX - HANDSHAKE_MESSAGES {
            return Err(HomeConnectError::Decode(format!(
                "/ei/initialValues edMsgID {} leaves no room for client message IDs",
                initial.ed_msg_id
            )));
        }

        let identity = serde_json::to_value(&self.identity)?;

        self.session_id = Some(packet.session_id);
        self.state = HandshakeState::AwaitingServiceCatalog;

        Ok(HandshakeStep {
            seed_message_id: Some(initial.ed_msg_id),
            requests: vec![
                Request::new(Action::Response, RESOURCE_INITIAL_VALUES, packet.version)
                    .with_data(vec![identity]),
                // No catalog yet, the bootstrap resource is always version 1
                Request::new(Action::Get, RESOURCE_SERVICES, 1),
            ],
            ready: false,
        })
    }

    fn process_services(&mut self, packet: &Packet) -> Result<HandshakeStep> {
        if self.session_id != Some(packet.session_id) {
            return Err(HomeConnectError::ProtocolViolation(format!(
                "Session ID changed from {:?} to {}",
                self.session_id, packet.session_id
            )));
        }

        let catalog = ServiceCatalog::from_data(packet.data.as_deref())?;

        // Build every request before committing so a missing service sends nothing
        let requests = vec![
            Request::new(
                Action::Notify,
                RESOURCE_DEVICE_READY,
                catalog.version("ei")?,
            ),
            Request::new(Action::Get, RESOURCE_IZ_INFO, catalog.version("iz")?),
            Request::new(
                Action::Get,
                RESOURCE_REGISTERED_DEVICES,
                catalog.version("ci")?,
            ),
        ];

        tracing::debug!(services = catalog.len(), "Service catalog received");
        self.catalog = Some(catalog);
        self.state = HandshakeState::Ready;

        Ok(HandshakeStep {
            seed_message_id: None,
            requests,
            ready: true,
        })
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new(DeviceIdentity::default())
    }
}

/// Build the inbound `/ei/initialValues` push, mostly for fakes and tests
pub fn initial_values_packet(session_id: u32, message_id: i64, ed_msg_id: i64) -> Packet {
    Packet::new(
        session_id,
        message_id,
        Action::Notify,
        RESOURCE_INITIAL_VALUES,
        2,
    )
    .with_data(vec![serde_json::json!({ "edMsgID": ed_msg_id })])
}

/// Build a `/ci/services` response from `(service, version)` pairs
pub fn services_packet(session_id: u32, message_id: i64, services: &[(&str, u8)]) -> Packet {
    let data: Vec<Value> = services
        .iter()
        .map(|(service, version)| serde_json::json!({ "service": service, "version": version }))
        .collect();

    Packet::new(session_id, message_id, Action::Response, RESOURCE_SERVICES, 1).with_data(data)
}
