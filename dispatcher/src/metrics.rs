//! Progress counters and their HTTP endpoint.

use crate::outcome::Class;
use axum::{routing::get, serve, Extension, Router};
use prometheus_client::{encoding::text::encode, metrics::counter::Counter, registry::Registry};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::error;

/// Counters describing the progress of a dispatch.
#[derive(Clone, Default)]
pub struct Metrics {
    pub batches: Counter,
    pub phones: Counter,
    pub completed: Counter,
    pub delivered: Counter,
    pub rejected: Counter,
    pub transport: Counter,
    pub unparsed: Counter,
}

impl Metrics {
    /// Create a new set of counters registered with `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "batches",
            "Batches submitted to the worker pool",
            metrics.batches.clone(),
        );
        registry.register(
            "phones",
            "Phones submitted to the worker pool",
            metrics.phones.clone(),
        );
        registry.register("completed", "Jobs completed", metrics.completed.clone());
        registry.register(
            "delivered",
            "Phones accepted by the gateway",
            metrics.delivered.clone(),
        );
        registry.register(
            "rejected",
            "Phones refused by the gateway",
            metrics.rejected.clone(),
        );
        registry.register(
            "transport",
            "Phones whose request failed in transport",
            metrics.transport.clone(),
        );
        registry.register(
            "unparsed",
            "Phones whose response could not be decoded",
            metrics.unparsed.clone(),
        );
        metrics
    }

    /// Count one outcome of `class`.
    pub fn outcome(&self, class: Class) {
        match class {
            Class::Delivered => self.delivered.inc(),
            Class::Rejected => self.rejected.inc(),
            Class::Transport => self.transport.inc(),
            Class::Unparsed => self.unparsed.inc(),
        };
    }
}

/// Encode all metrics in `registry` in the OpenMetrics text format.
pub fn render(registry: &Registry) -> String {
    let mut buffer = String::new();
    if let Err(err) = encode(&mut buffer, registry) {
        error!(?err, "failed to encode metrics");
    }
    buffer
}

/// Serve `registry` at `/metrics` until the task is dropped.
pub async fn listen(addr: SocketAddr, registry: Arc<Registry>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let app = Router::new()
        .route(
            "/metrics",
            get(|Extension(registry): Extension<Arc<Registry>>| async move { render(&registry) }),
        )
        .layer(Extension(registry));
    serve(listener, app.into_make_service()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        metrics.batches.inc();
        metrics.phones.inc_by(10);
        metrics.outcome(Class::Delivered);
        metrics.outcome(Class::Transport);
        metrics.outcome(Class::Transport);

        let rendered = render(&registry);
        assert!(rendered.contains("batches_total 1"));
        assert!(rendered.contains("phones_total 10"));
        assert!(rendered.contains("delivered_total 1"));
        assert!(rendered.contains("transport_total 2"));
        assert!(rendered.contains("rejected_total 0"));
    }
}
