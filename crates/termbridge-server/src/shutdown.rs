//! Coordinated shutdown: drain every session, then close the listener.

use crate::session::registry::SessionRegistry;
use crate::transport::websocket::WsListener;
use std::sync::Arc;
use tracing::info;

/// Tears the bridge down in order: no new connections, then every
/// registered shell is killed, then the listener confirms closure.
pub struct ShutdownCoordinator {
    registry: Arc<SessionRegistry>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Best-effort ordered drain. Clients observe an abrupt disconnect;
    /// there is no in-band negotiation.
    pub async fn drain(&self, listener: WsListener) {
        listener.stop_accepting();
        let signaled = self.registry.terminate_all().await;
        info!(sessions = signaled, "all sessions signaled, closing listener");
        listener.close().await;
        info!("shutdown complete");
    }
}
