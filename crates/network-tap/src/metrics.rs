use lazy_static::lazy_static;
use prometheus::{IntCounter, Registry};
use tracing::error;

lazy_static! {
    static ref RECORDS_FINALIZED: IntCounter = IntCounter::new(
        "flowtap_network_records_total",
        "Network records appended to the flow"
    )
    .unwrap();
    static ref RECORDS_DISCARDED: IntCounter = IntCounter::new(
        "flowtap_network_records_discarded_total",
        "Finalizations dropped because their flow was reset"
    )
    .unwrap();
    static ref REQUESTS_IGNORED: IntCounter = IntCounter::new(
        "flowtap_network_requests_ignored_total",
        "Requests dropped by the static asset policy"
    )
    .unwrap();
    static ref BODY_FETCH_FAILURES: IntCounter = IntCounter::new(
        "flowtap_body_fetch_failures_total",
        "Response body fetches that failed"
    )
    .unwrap();
}

pub fn register_metrics(registry: &Registry) {
    for counter in [
        &*RECORDS_FINALIZED,
        &*RECORDS_DISCARDED,
        &*REQUESTS_IGNORED,
        &*BODY_FETCH_FAILURES,
    ] {
        if let Err(err) = registry.register(Box::new(counter.clone())) {
            if !matches!(err, prometheus::Error::AlreadyReg) {
                error!(target: "network-tap", ?err, "failed to register metric");
            }
        }
    }
}

pub(crate) fn record_finalized() {
    RECORDS_FINALIZED.inc();
}

pub(crate) fn record_discarded() {
    RECORDS_DISCARDED.inc();
}

pub(crate) fn record_ignored() {
    REQUESTS_IGNORED.inc();
}

pub(crate) fn record_body_failure() {
    BODY_FETCH_FAILURES.inc();
}
