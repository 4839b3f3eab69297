use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use cdp_adapter::metrics as cdp_metrics;
use lazy_static::lazy_static;
use network_tap::metrics as tap_metrics;
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{core::Collector, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info};

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();

lazy_static! {
    static ref UI_RECORDS_TOTAL: IntCounter = IntCounter::new(
        "flowtap_ui_records_total",
        "UI records appended to the flow"
    )
    .unwrap();
    static ref TARGET_LOSSES_TOTAL: IntCounter = IntCounter::new(
        "flowtap_target_losses_total",
        "Recordings stopped because the attached target went away"
    )
    .unwrap();
    static ref CONTROL_MESSAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("flowtap_control_messages_total", "Control messages handled"),
        &["action", "outcome"]
    )
    .unwrap();
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        cdp_metrics::register_metrics(registry);
        tap_metrics::register_metrics(registry);
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(UI_RECORDS_TOTAL.clone()),
            Box::new(TARGET_LOSSES_TOTAL.clone()),
            Box::new(CONTROL_MESSAGES_TOTAL.clone()),
        ];
        for collector in collectors {
            if let Err(err) = registry.register(collector) {
                error!(?err, "failed to register recorder metric");
            }
        }
    });
}

pub fn record_ui_record() {
    UI_RECORDS_TOTAL.inc();
}

pub fn record_target_loss() {
    TARGET_LOSSES_TOTAL.inc();
}

pub fn record_control(action: &str, ok: bool) {
    CONTROL_MESSAGES_TOTAL
        .with_label_values(&[action, if ok { "ok" } else { "error" }])
        .inc();
}

pub fn spawn_metrics_server(port: u16) -> Option<JoinHandle<()>> {
    if port == 0 {
        return None;
    }

    register_metrics();
    let registry = Arc::new(global_registry().clone());
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target: "flowtap::server", %addr, "metrics server listening");
    Some(tokio::spawn(async move {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(err) = axum::serve(listener, app.into_make_service()).await {
                    error!(target: "flowtap::server", ?err, "metrics server exited with error");
                }
            }
            Err(err) => {
                error!(target: "flowtap::server", ?err, "failed to bind metrics listener");
            }
        }
    }))
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    render(&registry)
}

pub(crate) fn render(registry: &Registry) -> Response {
    let encoder = TextEncoder::new();
    let format_type = encoder.format_type().to_string();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&registry.gather(), &mut buffer) {
        error!(?err, "failed to encode prometheus metrics");
        return encode_error();
    }

    match (String::from_utf8(buffer), HeaderValue::from_str(&format_type)) {
        (Ok(body), Ok(value)) => ([(axum::http::header::CONTENT_TYPE, value)], body).into_response(),
        (Err(err), _) => {
            error!(?err, "failed to convert prometheus metrics to utf8");
            encode_error()
        }
        (_, Err(err)) => {
            error!(?err, "failed to build content-type header");
            encode_error()
        }
    }
}

fn encode_error() -> Response {
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        "metric encode error",
    )
        .into_response()
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_recorder_and_crate_metrics() {
        register_metrics();
        register_metrics();
        record_ui_record();
        record_control("GET_STATE", true);
        let names: Vec<String> = global_registry()
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.iter().any(|name| name == "flowtap_ui_records_total"));
        assert!(names
            .iter()
            .any(|name| name == "flowtap_control_messages_total"));
    }
}
