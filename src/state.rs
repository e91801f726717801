//! Shared application state handed to every axum handler via `State`.

use std::sync::Arc;

use crate::config::{AppConfig, ThrottleConfig};
use crate::crl::CrlCache;
use crate::db::Repo;
use crate::issuer::IssuerStore;

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    pub repo: Repo,
    pub issuers: IssuerStore,
    pub crl_cache: CrlCache,
    pub throttle: ThrottleConfig,
}

impl AppState {
    pub fn new(repo: Repo, issuers: IssuerStore, crl_cache: CrlCache, config: &AppConfig) -> Self {
        Self(Arc::new(Inner {
            repo,
            issuers,
            crl_cache,
            throttle: config.throttle.clone(),
        }))
    }

    pub fn repo(&self) -> &Repo {
        &self.0.repo
    }

    pub fn issuers(&self) -> &IssuerStore {
        &self.0.issuers
    }

    pub fn crl_cache(&self) -> &CrlCache {
        &self.0.crl_cache
    }

    pub fn throttle(&self) -> &ThrottleConfig {
        &self.0.throttle
    }
}
