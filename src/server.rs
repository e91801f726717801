//! Wires the two independently-bound listeners: `main` carries the
//! authenticated renewal route, `pki` carries the per-issuer
//! OCSP/CRL/issuing-cert routes. Both run out of one process alongside
//! the CRL publisher and expiry sweeper, coordinated by a single
//! `broadcast` shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    error_handling::HandleErrorLayer,
    extract::State,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower::{BoxError, ServiceBuilder};

use crate::auth::require_signature;
use crate::config::AppConfig;
use crate::crl::{self, CrlPublisher};
use crate::db::Repo;
use crate::error::AppError;
use crate::issuer::IssuerStore;
use crate::metrics::{self, Counters};
use crate::renewal;
use crate::state::AppState;
use crate::sweeper;

pub struct Server {
    config: AppConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: AppConfig, repo: Repo, issuers: IssuerStore) -> Self {
        let crl_cache = crl::new_cache();
        let state = AppState::new(repo, issuers, crl_cache, &config);
        Self { config, state }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        let crl_publisher = CrlPublisher::new(self.state.clone(), Duration::from_secs(self.config.crl.interval_secs));
        tokio::spawn(crl_publisher.run(shutdown_tx.subscribe()));

        tokio::spawn(sweeper::run(
            self.state.repo().clone(),
            Duration::from_secs(self.config.sweeper.interval_secs),
            shutdown_tx.subscribe(),
        ));

        let main_router = build_main_router(self.state.clone(), &self.config);
        let pki_router = build_pki_router(self.state.clone());

        let main_listener = tokio::net::TcpListener::bind(&self.config.servers.main.bind).await?;
        let pki_listener = tokio::net::TcpListener::bind(&self.config.servers.pki.bind).await?;

        tracing::info!(bind = %self.config.servers.main.bind, "main server listening");
        tracing::info!(bind = %self.config.servers.pki.bind, "pki server listening");

        let mut main_shutdown = shutdown_tx.subscribe();
        let mut pki_shutdown = shutdown_tx.subscribe();

        let main_task = tokio::spawn(async move {
            axum::serve(main_listener, main_router)
                .with_graceful_shutdown(async move {
                    let _ = main_shutdown.recv().await;
                })
                .await
        });
        let pki_task = tokio::spawn(async move {
            axum::serve(pki_listener, pki_router)
                .with_graceful_shutdown(async move {
                    let _ = pki_shutdown.recv().await;
                })
                .await
        });

        if let Some(bind) = self.config.metrics.bind.clone() {
            let counters = Arc::new(Counters::default());
            let metrics_listener = tokio::net::TcpListener::bind(&bind).await?;
            tokio::spawn(async move {
                let _ = axum::serve(metrics_listener, metrics::router(counters)).await;
            });
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown signal received, draining in-flight requests");
        let _ = shutdown_tx.send(());

        let _ = tokio::time::timeout(Duration::from_secs(10), async {
            let _ = main_task.await;
            let _ = pki_task.await;
        })
        .await;

        Ok(())
    }
}

fn build_main_router(state: AppState, config: &AppConfig) -> Router {
    // Outermost first: load-shed has to see requests before concurrency-limit
    // does, or capacity overflow just queues on the limiter's semaphore
    // instead of shedding. HandleErrorLayer turns the shed's `BoxError`
    // into the 429 the throttle contract promises.
    let throttle = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_overload))
        .load_shed()
        .concurrency_limit(config.throttle.max_inflight);

    Router::new()
        .route("/api/renewal/v1", post(renewal::handle))
        .layer(middleware::from_fn_with_state(state.clone(), require_signature))
        .layer(throttle)
        .with_state(state)
}

async fn handle_overload(_err: BoxError) -> AppError {
    AppError::Throttled
}

fn build_pki_router(state: AppState) -> Router {
    let mut router = Router::new();

    for issuer in state.issuers().list() {
        for ocsp_url in &issuer.ocsp_server_urls {
            if let Some(path) = path_of(ocsp_url) {
                let state = state.clone();
                let issuer = issuer.clone();
                router = router.route(
                    &path,
                    post(move |body: Bytes| {
                        let state = state.clone();
                        let issuer = issuer.clone();
                        async move { ocsp_handler(state, issuer, body).await }
                    }),
                );
            }
        }

        for crl_url in &issuer.crl_distribution_point_urls {
            if let Some(path) = path_of(crl_url) {
                let key = issuer.issuer_key_hash.clone();
                router = router.route(&path, get(move |State(state): State<AppState>| crl::serve_crl_for(state, key.clone())));
            }
        }

        for cert_url in &issuer.issuing_certificate_urls {
            if let Some(path) = path_of(cert_url) {
                let der = issuer.cert_der.clone();
                router = router.route(&path, get(move || crl::serve_issuing_cert_for(der.clone())));
            }
        }
    }

    router.with_state(state)
}

async fn ocsp_handler(state: AppState, issuer: Arc<crate::issuer::Issuer>, body: Bytes) -> Response {
    let der = crate::ocsp::respond(state.repo(), &issuer, &body).await;
    ([("content-type", "application/ocsp-response")], der).into_response()
}

fn path_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().map(|u| u.path().to_string())
}
