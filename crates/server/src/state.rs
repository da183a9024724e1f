//! Shared server runtime state.

use {
    std::sync::atomic::{AtomicUsize, Ordering},
    crate::{config::ServerConfig, events::EventSink, registry::EndpointRegistry},
};

/// State shared by every connection task of one server instance, wrapped in
/// `Arc` by the lifecycle manager.
///
/// The registry is the one shared resource the protocol cares about; it is
/// merged before any listener binds and never written afterwards, so reads
/// need no lock.
pub struct ServerState {
    pub config: ServerConfig,
    /// The effective routing table (process-wide ∪ instance, instance wins).
    pub registry: EndpointRegistry,
    pub events: EventSink,
    /// Port the primary listener actually bound (differs from `config.port`
    /// when that was 0). This is what discovery probes are told.
    pub primary_port: u16,
    /// Live connection count across both listeners, for the health endpoint.
    connections: AtomicUsize,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        registry: EndpointRegistry,
        events: EventSink,
        primary_port: u16,
    ) -> Self {
        Self {
            config,
            registry,
            events,
            primary_port,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_counter_tracks_open_close() {
        let state = ServerState::new(
            ServerConfig::default(),
            EndpointRegistry::new(),
            EventSink::disabled(),
            1010,
        );
        assert_eq!(state.connection_count(), 0);
        state.connection_opened();
        state.connection_opened();
        state.connection_closed();
        assert_eq!(state.connection_count(), 1);
    }
}
