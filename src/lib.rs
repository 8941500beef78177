//! # Home Connect - Local Appliance Protocol Client
//!
//! Client for the local protocol spoken by Home Connect appliances: TLS 1.2
//! with a pre-shared key, a WebSocket upgrade, and JSON packets exchanged over
//! text frames.
//!
//! ## Protocol Overview
//!
//! The appliance drives the session bootstrap. It pushes its initial values,
//! which carry the session ID and the seed for client message IDs. The client
//! answers with its identity, fetches the service catalog, announces itself,
//! and from then on may send application requests.
//!
//! ### Architecture
//!
//! ```text
//! Client                                        Appliance
//!    |                                              |
//!    |======= TLS 1.2 PSK (no encrypt-then-MAC) ====|
//!    |------- GET /homeconnect (Upgrade) ---------->|
//!    |<------ 101 Switching Protocols --------------|
//!    |                                              |
//!    |<------ NOTIFY /ei/initialValues (sID, ed) ---|
//!    |------- RESPONSE /ei/initialValues  [ed+1] -->|
//!    |------- GET /ci/services            [ed+2] -->|
//!    |<------ RESPONSE /ci/services (catalog) ------|
//!    |------- NOTIFY /ei/deviceReady      [ed+3] -->|
//!    |------- GET /iz/info                [ed+4] -->|
//!    |------- GET /ci/registeredDevices   [ed+5] -->|
//!    |                                              |
//!    |<====== application traffic =================>|
//! ```
//!
//! ### State Machine
//!
//! ```text
//!                       /ei/initialValues                     /ci/services
//!   [AwaitingInitialValues] ──────────────> [AwaitingServiceCatalog] ──────────> [Ready]
//!         │                                          │
//!         │ peer close                               │ peer close
//!         v                                          │
//!     [Closed] <─────────────────────────────────────┘
//!
//!   decode failure, protocol violation or channel error
//!   while awaiting ──> [Failed]
//!
//!   [Ready] stays ready; a later peer close ends the connection only.
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use homeconnect::{connect, Action, Config};
//!
//! let config = Config::from_file("config.toml")?.with_env();
//! let connection = connect(&config).await?;
//! let dispatcher = connection.ready(config.client.ready_timeout()).await?;
//!
//! let id = dispatcher.submit(Action::Get, "/ro/allMandatoryValues", 1, None).await?;
//! println!("sent as message {id}");
//! ```
//!
//! ## Modules
//!
//! - [`client`]: Connection, receive loop and request dispatcher
//! - [`protocol`]: Packets, requests, handshake state machine and ready handle
//! - [`transport`]: TLS-PSK connector, WebSocket upgrade and packet channel
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use client::{connect, Connection, Dispatcher};
pub use config::Config;
pub use error::{HomeConnectError, Result};
pub use protocol::{
    Action, DeviceIdentity, Handshake, HandshakeState, Packet, ReadyHandle, Request,
    ServiceCatalog, Session,
};
pub use transport::{PskConnector, PskCredentials, PskTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
