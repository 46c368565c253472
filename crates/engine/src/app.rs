//! Application state and composition.

use std::sync::Arc;

use crate::config::TransportConfig;
use crate::infrastructure::ports::IdentityPort;
use crate::session::Hub;

/// Main application state.
///
/// Passed to HTTP/WebSocket handlers via Axum state.
pub struct App {
    pub hub: Arc<Hub>,
    pub identity: Arc<dyn IdentityPort>,
    pub transport: TransportConfig,
}

impl App {
    pub fn new(hub: Arc<Hub>, identity: Arc<dyn IdentityPort>, transport: TransportConfig) -> Self {
        Self {
            hub,
            identity,
            transport,
        }
    }
}
