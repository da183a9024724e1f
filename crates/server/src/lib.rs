//! tether-server: the host-side IPC server.
//!
//! Lets an external client process invoke named endpoints on a long-running
//! host application over a persistent WebSocket, guarded by a shared secret.
//!
//! Lifecycle:
//! 1. Build a [`ServerConfig`] (code or TOML)
//! 2. Register endpoints — process-wide via [`route`], per-instance via
//!    [`Server::route`]; bind a handler's owning context with
//!    [`context_handler`]
//! 3. [`Server::start`] merges the routing table, binds the primary and
//!    discovery listeners, and emits [`ServerEvent::Ready`]
//! 4. Requests flow: authenticate → route → invoke → respond, strictly in
//!    order per connection
//! 5. [`Server::destroy`] releases both listeners
//!
//! Wire shapes live in `tether-protocol`; the host observes failures through
//! the fire-and-forget event channel.

pub mod auth;
pub mod config;
mod discovery;
pub mod events;
pub mod registry;
pub mod server;
pub mod state;
mod ws;

pub use {
    config::ServerConfig,
    events::{EventSink, ServerEvent},
    registry::{EndpointRegistry, HandlerFn, HandlerResult, context_handler, handler, route},
    server::Server,
    tether_protocol::{RequestView, codes},
};
