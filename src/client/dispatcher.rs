//! Application request dispatcher.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::protocol::{Action, Request, ServiceCatalog, Session};
use crate::transport::PacketSender;

/// Sends application requests on a ready session.
///
/// Cheap to clone; every clone shares the channel's message counter, so
/// concurrent submits get unique, strictly increasing IDs.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sender: PacketSender,
    session: Session,
    catalog: Arc<ServiceCatalog>,
}

impl Dispatcher {
    pub(crate) fn new(sender: PacketSender, session: Session, catalog: Arc<ServiceCatalog>) -> Self {
        Self {
            sender,
            session,
            catalog,
        }
    }

    /// Session this dispatcher sends on
    pub fn session(&self) -> Session {
        self.session
    }

    /// Session ID stamped on every packet
    pub fn session_id(&self) -> u32 {
        self.session.session_id
    }

    /// Catalog learned during the handshake
    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Send a request and return the message ID it was stamped with
    pub async fn submit(
        &self,
        action: Action,
        resource: impl Into<String>,
        version: u8,
        data: Option<Vec<Value>>,
    ) -> Result<i64> {
        let mut request = Request::new(action, resource, version);
        request.data = data;
        self.submit_request(request).await
    }

    /// Send a request with the version taken from the service catalog
    pub async fn submit_for_service(
        &self,
        action: Action,
        resource: impl Into<String>,
        data: Option<Vec<Value>>,
    ) -> Result<i64> {
        let resource = resource.into();
        let version = self.catalog.version_for(&resource)?;
        self.submit(action, resource, version, data).await
    }

    /// Send a pre-built request
    pub async fn submit_request(&self, request: Request) -> Result<i64> {
        self.sender
            .send_request(self.session.session_id, request)
            .await
    }

    /// Next message ID the session would allocate
    pub async fn next_message_id(&self) -> i64 {
        self.sender.next_message_id().await
    }
}
