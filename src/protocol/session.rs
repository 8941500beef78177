//! Ready-session handle.
//!
//! The handshake publishes a [`Session`] exactly once. Any number of tasks can
//! wait for it through a [`ReadyHandle`]; each sees either the session or the
//! failure that ended the handshake. Dropping the [`ReadySignal`] without
//! publishing (receive loop exited, task aborted) fails every waiter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::catalog::ServiceCatalog;
use crate::error::{HomeConnectError, Result};

/// Snapshot of a session that completed its handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Session ID assigned by the appliance
    pub session_id: u32,
    /// Next free client message ID at the moment the session became ready
    pub next_message_id: i64,
}

/// Publication state of the ready slot
#[derive(Debug, Clone)]
enum ReadyState {
    Pending,
    Ready(Session, Arc<ServiceCatalog>),
    Failed(HomeConnectError),
}

/// Create a connected producer/consumer pair
pub fn ready_channel() -> (ReadySignal, ReadyHandle) {
    let (tx, rx) = watch::channel(ReadyState::Pending);
    (ReadySignal { tx }, ReadyHandle { rx })
}

/// Producer side, consumed on publication
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<ReadyState>,
}

impl ReadySignal {
    /// Publish the ready session with the catalog learned during the handshake
    pub fn publish(self, session: Session, catalog: ServiceCatalog) {
        tracing::info!(
            session_id = session.session_id,
            next_message_id = session.next_message_id,
            services = catalog.len(),
            "Session ready"
        );
        self.tx
            .send_replace(ReadyState::Ready(session, Arc::new(catalog)));
    }

    /// Resolve every waiter with a failure
    pub fn fail(self, error: HomeConnectError) {
        tracing::warn!("Session failed before ready: {}", error);
        self.tx.send_replace(ReadyState::Failed(error));
    }
}

/// Consumer side, freely cloneable
#[derive(Debug, Clone)]
pub struct ReadyHandle {
    rx: watch::Receiver<ReadyState>,
}

impl ReadyHandle {
    /// Current outcome without waiting, `None` while pending
    pub fn try_get(&self) -> Option<Result<Session>> {
        match &*self.rx.borrow() {
            ReadyState::Pending => None,
            ReadyState::Ready(session, _) => Some(Ok(*session)),
            ReadyState::Failed(error) => Some(Err(error.clone())),
        }
    }

    /// Service catalog, once the session is ready
    pub fn catalog(&self) -> Option<Arc<ServiceCatalog>> {
        match &*self.rx.borrow() {
            ReadyState::Ready(_, catalog) => Some(Arc::clone(catalog)),
            _ => None,
        }
    }

    /// Wait for the handshake outcome, bounded by `timeout`
    pub async fn wait(&self, timeout: Duration) -> Result<Session> {
        let mut rx = self.rx.clone();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| !matches!(state, ReadyState::Pending)),
        )
        .await
        .map_err(|_| HomeConnectError::Timeout(timeout))?;

        match waited {
            Ok(state) => match &*state {
                ReadyState::Ready(session, _) => Ok(*session),
                ReadyState::Failed(error) => Err(error.clone()),
                ReadyState::Pending => unreachable!("wait_for returned a pending state"),
            },
            // Producer dropped while still pending
            Err(_) => Err(HomeConnectError::Channel(
                "Receive loop ended before the session became ready".to_string(),
            )),
        }
    }
}
