//! Minimal `/metrics` endpoint: a handful of process counters in
//! Prometheus text exposition format, not a full exporter.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::{response::IntoResponse, routing::get, Router};

#[derive(Default)]
pub struct Counters {
    pub renewals_issued: AtomicU64,
    pub renewals_failed: AtomicU64,
    pub ocsp_requests: AtomicU64,
    pub crl_rebuilds: AtomicU64,
}

pub fn router(counters: std::sync::Arc<Counters>) -> Router {
    Router::new().route("/metrics", get(move || render(counters.clone())))
}

async fn render(counters: std::sync::Arc<Counters>) -> impl IntoResponse {
    let body = format!(
        "# TYPE casper_pki_renewals_issued counter\n\
         casper_pki_renewals_issued {}\n\
         # TYPE casper_pki_renewals_failed counter\n\
         casper_pki_renewals_failed {}\n\
         # TYPE casper_pki_ocsp_requests counter\n\
         casper_pki_ocsp_requests {}\n\
         # TYPE casper_pki_crl_rebuilds counter\n\
         casper_pki_crl_rebuilds {}\n",
        counters.renewals_issued.load(Ordering::Relaxed),
        counters.renewals_failed.load(Ordering::Relaxed),
        counters.ocsp_requests.load(Ordering::Relaxed),
        counters.crl_rebuilds.load(Ordering::Relaxed),
    );
    ([("content-type", "text/plain; version=0.0.4")], body)
}
