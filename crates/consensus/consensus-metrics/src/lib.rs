//! Prometheus metrics registry and HTTP exporter shared by the task engine and scan state
//! machine.
//!
//! The shape follows the Mysten-Labs-lineage `consensus-metrics` crates this workspace is forked
//! from: a small struct of counters/gauges registered against a [`Registry`], plus a standalone
//! axum server exposing them at `/metrics`.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
pub use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use tap::Tap;
use tokio::task::JoinHandle;

mod task_engine;
pub use task_engine::TaskEngineMetrics;

mod scan;
pub use scan::ScanMetrics;

/// Starts a background HTTP server exposing `registry` in Prometheus text format at `/metrics`.
pub fn start_prometheus_server(addr: SocketAddr, registry: Registry) -> JoinHandle<()> {
    let app = Router::new().route("/metrics", get(move || render(registry.clone())));

    tokio::spawn(async move {
        tracing::info!(target: "metrics", %addr, "starting prometheus exporter");
        if let Err(error) =
            axum::Server::bind(&addr).serve(app.into_make_service()).await
        {
            tracing::error!(target: "metrics", %error, "metrics server exited");
        }
    })
}

async fn render(registry: Registry) -> String {
    use prometheus::{Encoder, TextEncoder};

    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .tap(|result| {
            if let Err(error) = result {
                tracing::warn!(target: "metrics", %error, "failed to encode metrics");
            }
        })
        .ok();
    String::from_utf8(buffer).unwrap_or_default()
}

/// A RAII gauge increment: the wrapped gauge is incremented on creation and decremented once the
/// guard is dropped, even if the scope unwinds from a panic (only relevant to instrumented test
/// code since the engine itself catches task panics before they can unwind past a worker frame).
pub struct InFlightGuard(scopeguard::ScopeGuard<IntGauge, fn(IntGauge)>);

impl InFlightGuard {
    pub fn new(gauge: IntGauge) -> Self {
        gauge.inc();
        Self(scopeguard::guard(gauge, |gauge| gauge.dec()))
    }
}

static GLOBAL_REGISTRY: OnceCell<Mutex<Registry>> = OnceCell::new();

/// The process-wide default registry, used when a caller has no more specific registry at hand
/// (e.g. the demo binary's top-level wiring).
pub fn global_registry() -> Registry {
    GLOBAL_REGISTRY.get_or_init(|| Mutex::new(Registry::new())).lock().clone()
}
