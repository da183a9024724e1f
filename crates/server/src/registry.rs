//! Endpoint registry: name → handler routing table.
//!
//! Two registration sources feed one effective table:
//!
//! 1. the process-wide table, via the free [`route`] function — usable from
//!    anywhere before a server instance exists;
//! 2. the instance table, via `Server::route`.
//!
//! At startup the process-wide table is drained into the instance table
//! (instance entries win on collision) exactly once, before any listener
//! binds. The merged table is read-only for the server's lifetime, so
//! connection tasks share it without locking.
//!
//! A handler that logically belongs to some owning object gets that object
//! bound at registration time via [`context_handler`]; invocation never looks
//! anything up.

use {
    std::{
        collections::HashMap,
        future::Future,
        pin::Pin,
        sync::{Arc, Mutex, MutexGuard, PoisonError},
    },
    once_cell::sync::Lazy,
    tether_protocol::RequestView,
};

// ── Handler types ────────────────────────────────────────────────────────────

/// What a handler produces: a JSON payload on success, any error on failure.
/// Failures become `{error, code: 500}` responses.
pub type HandlerResult = anyhow::Result<serde_json::Value>;

/// A boxed async endpoint handler.
pub type HandlerFn =
    Box<dyn Fn(RequestView) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync>;

/// Wrap a plain async fn into a [`HandlerFn`].
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(RequestView) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Box::new(move |req| Box::pin(f(req)))
}

/// Wrap an async fn together with its owning context. The context is captured
/// here, at registration time, and passed as the leading argument on every
/// invocation.
pub fn context_handler<C, F, Fut>(context: Arc<C>, f: F) -> HandlerFn
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, RequestView) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Box::new(move |req| {
        let context = Arc::clone(&context);
        Box::pin(f(context, req))
    })
}

// ── Process-wide table ───────────────────────────────────────────────────────

static ROUTES: Lazy<Mutex<HashMap<String, HandlerFn>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn routes() -> MutexGuard<'static, HashMap<String, HandlerFn>> {
    ROUTES.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Register an endpoint in the process-wide table, before any server exists.
/// Later registrations under the same name overwrite earlier ones.
pub fn route(name: impl Into<String>, handler: HandlerFn) {
    routes().insert(name.into(), handler);
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// The name → handler table. Mutable while registering, frozen once the
/// server starts.
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, HandlerFn>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an endpoint.
    pub fn register(&mut self, name: impl Into<String>, handler: HandlerFn) {
        self.endpoints.insert(name.into(), handler);
    }

    /// Resolve a handler by endpoint name.
    pub fn resolve(&self, name: &str) -> Option<&HandlerFn> {
        self.endpoints.get(name)
    }

    /// Drain the process-wide table into this registry. Existing (instance)
    /// entries win on collision. The drained table is left empty, so calling
    /// this again is a no-op and a later server instance cannot inherit
    /// routes meant for this one.
    pub fn absorb_routes(&mut self) {
        for (name, handler) in routes().drain() {
            self.endpoints.entry(name).or_insert(handler);
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Sorted endpoint names, for logging and the health endpoint.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.endpoints.keys().cloned().collect();
        names.sort();
        names
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn view() -> RequestView {
        RequestView::new("test", json!({}), serde_json::Map::new())
    }

    fn tagged(tag: &'static str) -> HandlerFn {
        handler(move |_req| async move { Ok(json!({ "tag": tag })) })
    }

    async fn invoke(reg: &EndpointRegistry, name: &str) -> serde_json::Value {
        (reg.resolve(name).unwrap())(view()).await.unwrap()
    }

    #[tokio::test]
    async fn instance_wins_on_collision() {
        // Unique name: the process-wide table is shared across tests.
        route("collide.check", tagged("global"));

        let mut reg = EndpointRegistry::new();
        reg.register("collide.check", tagged("instance"));
        reg.absorb_routes();

        assert_eq!(invoke(&reg, "collide.check").await["tag"], json!("instance"));
    }

    #[tokio::test]
    async fn absorb_moves_global_routes_once() {
        route("absorb.check", tagged("global"));

        let mut first = EndpointRegistry::new();
        first.absorb_routes();
        assert!(first.resolve("absorb.check").is_some());

        // Re-merging is a no-op, and a second registry sees nothing.
        first.absorb_routes();
        let mut second = EndpointRegistry::new();
        second.absorb_routes();
        assert!(second.resolve("absorb.check").is_none());

        assert_eq!(invoke(&first, "absorb.check").await["tag"], json!("global"));
    }

    #[tokio::test]
    async fn register_overwrites() {
        let mut reg = EndpointRegistry::new();
        reg.register("ep", tagged("old"));
        reg.register("ep", tagged("new"));
        assert_eq!(reg.len(), 1);
        assert_eq!(invoke(&reg, "ep").await["tag"], json!("new"));
    }

    #[tokio::test]
    async fn context_is_bound_at_registration() {
        struct Counter(std::sync::atomic::AtomicU32);
        let ctx = Arc::new(Counter(std::sync::atomic::AtomicU32::new(0)));

        let mut reg = EndpointRegistry::new();
        reg.register(
            "count",
            context_handler(Arc::clone(&ctx), |ctx: Arc<Counter>, _req| async move {
                let n = ctx.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(json!({ "seen": n }))
            }),
        );

        assert_eq!(invoke(&reg, "count").await["seen"], json!(0));
        assert_eq!(invoke(&reg, "count").await["seen"], json!(1));
        assert_eq!(ctx.0.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = EndpointRegistry::new();
        reg.register("b", tagged("b"));
        reg.register("a", tagged("a"));
        assert_eq!(reg.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
