//! Lifecycle manager: binds and runs the two listeners, performs teardown.

use {
    std::{net::SocketAddr, sync::Arc},
    anyhow::Context,
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::get,
    },
    tokio::{net::TcpListener, sync::mpsc, task::JoinHandle},
    tracing::{debug, info, warn},
    crate::{
        config::ServerConfig,
        discovery,
        events::{EventSink, ServerEvent},
        registry::{EndpointRegistry, HandlerFn},
        state::ServerState,
        ws,
    },
};

// ── Listener handle ──────────────────────────────────────────────────────────

/// One running listener: its bound address and the serve task driving it.
struct ListenerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop accepting. In-flight connection tasks are not cancelled here;
    /// they end with their sockets.
    fn stop(self, name: &str) {
        self.task.abort();
        debug!(addr = %self.addr, "{name} listener stopped");
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

/// The IPC server. Owned by the host application; endpoints are registered
/// before [`Server::start`], which freezes the routing table for the
/// instance's lifetime.
pub struct Server {
    config: ServerConfig,
    registry: EndpointRegistry,
    events: EventSink,
    primary: Option<ListenerHandle>,
    discovery: Option<ListenerHandle>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: EndpointRegistry::new(),
            events: EventSink::disabled(),
            primary: None,
            discovery: None,
        }
    }

    /// Subscribe the host to [`ServerEvent`]s (ready, per-request failures).
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    /// Register an endpoint on this instance. Instance registrations win over
    /// process-wide [`crate::route`] entries with the same name. Calls after
    /// [`Server::start`] are inert: the effective table is frozen at startup.
    pub fn route(&mut self, name: impl Into<String>, handler: HandlerFn) {
        self.registry.register(name, handler);
    }

    /// Merge the routing table and bring up both listeners.
    ///
    /// The merge runs here, synchronously, before any listener binds — there
    /// is exactly one writer and no connection can race it. Returns the
    /// primary listener's bound address (useful when `port` was 0).
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if self.primary.is_some() {
            anyhow::bail!("server already started");
        }

        let mut registry = std::mem::take(&mut self.registry);
        registry.absorb_routes();

        let primary_listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| {
                format!("bind primary listener {}:{}", self.config.host, self.config.port)
            })?;
        let primary_addr = primary_listener.local_addr()?;

        let state = Arc::new(ServerState::new(
            self.config.clone(),
            registry,
            self.events.clone(),
            primary_addr.port(),
        ));

        self.primary = Some(spawn_listener(
            primary_listener,
            build_primary_app(Arc::clone(&state)),
            "primary",
        ));

        if self.config.enable_discovery {
            let listener =
                match TcpListener::bind((self.config.host.as_str(), self.config.discovery_port))
                    .await
                {
                    Ok(l) => l,
                    Err(e) => {
                        // Don't leave a half-started server behind.
                        if let Some(h) = self.primary.take() {
                            h.stop("primary");
                        }
                        return Err(e).with_context(|| {
                            format!(
                                "bind discovery listener {}:{}",
                                self.config.host, self.config.discovery_port
                            )
                        });
                    },
                };
            self.discovery = Some(spawn_listener(
                listener,
                build_discovery_app(Arc::clone(&state)),
                "discovery",
            ));
        }

        info!(
            primary = %primary_addr,
            discovery = ?self.discovery.as_ref().map(|h| h.addr),
            endpoints = state.registry.len(),
            "tether server ready"
        );
        self.events.emit(ServerEvent::Ready);
        Ok(primary_addr)
    }

    /// Tear down: primary transport first, then discovery, each independently.
    pub fn destroy(&mut self) {
        if let Some(h) = self.primary.take() {
            h.stop("primary");
        }
        if let Some(h) = self.discovery.take() {
            h.stop("discovery");
        }
    }

    pub fn primary_addr(&self) -> Option<SocketAddr> {
        self.primary.as_ref().map(|h| h.addr)
    }

    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery.as_ref().map(|h| h.addr)
    }
}

fn spawn_listener(listener: TcpListener, app: Router, name: &'static str) -> ListenerHandle {
    let addr = listener
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            warn!(error = %e, "{name} listener terminated");
        }
    });
    ListenerHandle { addr, task }
}

// ── Routers ──────────────────────────────────────────────────────────────────

/// Build the primary router (exposed for tests).
pub fn build_primary_app(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(primary_ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Build the discovery router (exposed for tests).
pub fn build_discovery_app(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(discovery_ws_handler))
        .with_state(state)
}

async fn primary_ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_connection(socket, state, addr))
}

async fn discovery_ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| discovery::handle_probe(socket, state, addr))
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.connection_count(),
        "endpoints": state.registry.names(),
    }))
}
