//! Home Connect packet protocol and session bootstrap.
//!
//! # Protocol Overview
//!
//! After the WebSocket upgrade every text frame carries one JSON [`Packet`].
//! The appliance starts the session; the client only speaks after it has
//! learned the session ID and its message counter seed.
//!
//! ## Message Flow
//!
//! ```text
//! Client                                   Appliance
//!    |                                         |
//!    |<------ NOTIFY /ei/initialValues --------|  sID + edMsgID
//!    |------- RESPONSE /ei/initialValues ----->|  device identity
//!    |------- GET /ci/services v1 ------------>|
//!    |<------ RESPONSE /ci/services -----------|  service catalog
//!    |------- NOTIFY /ei/deviceReady --------->|  version from catalog
//!    |------- GET /iz/info ------------------->|
//!    |------- GET /ci/registeredDevices ------>|
//!    |                                         |
//!    |======= application requests ===========>|  session ready
//!    |<====== responses / notifications =======|
//! ```
//!
//! ## State Machine
//!
//! | State                    | Expects              | Next                     |
//! |--------------------------|----------------------|--------------------------|
//! | `AwaitingInitialValues`  | `/ei/initialValues`  | `AwaitingServiceCatalog` |
//! | `AwaitingServiceCatalog` | `/ci/services`       | `Ready`                  |
//! | `Ready`                  | anything             | (terminal)               |
//! | `Failed`                 |                      | (terminal)               |
//! | `Closed`                 |                      | (terminal)               |
//!
//! ## Message IDs
//!
//! The `edMsgID` in `/ei/initialValues` seeds the client counter. Every client
//! packet takes the next value, handshake and application traffic alike, so
//! IDs never repeat within a session. Responses carry a fresh ID of their own
//! rather than echoing the request.

mod catalog;
mod handshake;
mod packet;
mod request;
mod session;

pub use catalog::ServiceCatalog;
pub use handshake::{
    initial_values_packet, services_packet, DeviceIdentity, Handshake, HandshakeState,
    HandshakeStep,
};
pub use packet::{Action, Packet};
pub use request::Request;
pub use session::{ready_channel, ReadyHandle, ReadySignal, Session};

/// Pushed by the appliance to open the session
pub const RESOURCE_INITIAL_VALUES: &str = "/ei/initialValues";

/// Service catalog
pub const RESOURCE_SERVICES: &str = "/ci/services";

/// Client readiness announcement
pub const RESOURCE_DEVICE_READY: &str = "/ei/deviceReady";

/// Appliance information
pub const RESOURCE_IZ_INFO: &str = "/iz/info";

/// Devices paired with the appliance
pub const RESOURCE_REGISTERED_DEVICES: &str = "/ci/registeredDevices";

/// Default wait for the session to become ready (seconds)
pub const READY_TIMEOUT_SECS: u64 = 30;
