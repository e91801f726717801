//! CRL Publisher: a 6h ticker (fires once at startup) that rebuilds each
//! issuer's CRL from `select_cert_revoked` and republishes it into a
//! process-local cache, plus the HTTP handlers serving that cache and the
//! issuing-certificate DER.
//!
//! The cache is a sharded `DashMap` keyed by issuer so rebuilds never
//! block concurrent reads.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use rcgen::{CertificateRevocationListParams, RevokedCertParams, SerialNumber};
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::broadcast;

use crate::db::models::RevokedEntry;
use crate::state::AppState;

/// Keyed by `hex(issuer_key_hash)`, holding the issuer's current CRL DER.
pub type CrlCache = Arc<DashMap<String, Vec<u8>>>;

pub fn new_cache() -> CrlCache {
    Arc::new(DashMap::new())
}

pub const CRL_CACHE_CONTROL: &str = "max-age=21600,s-maxage=14400,public,no-transform,must-revalidate";
pub const CERT_CACHE_CONTROL: &str = "max-age=86400,s-maxage=14400,public,no-transform,must-revalidate";

pub struct CrlPublisher {
    state: AppState,
    interval: std::time::Duration,
    counters: HashMap<String, AtomicU64>,
}

impl CrlPublisher {
    pub fn new(state: AppState, interval: std::time::Duration) -> Self {
        let seed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let counters = state
            .issuers()
            .list()
            .iter()
            .map(|issuer| (issuer.issuer_key_hash.clone(), AtomicU64::new(seed)))
            .collect();
        Self { state, interval, counters }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.publish_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("crl publisher shutting down");
                    break;
                }
            }
        }
    }

    async fn publish_all(&self) {
        for issuer in self.state.issuers().list() {
            if let Err(err) = self.publish_one(issuer).await {
                tracing::error!(issuer_key_hash = %issuer.issuer_key_hash, error = %err, "crl rebuild failed, retrying next tick");
            }
        }
    }

    async fn publish_one(&self, issuer: &crate::issuer::Issuer) -> anyhow::Result<()> {
        let revoked = self.state.repo().select_cert_revoked(&issuer.issuer_key_hash).await?;
        let crl_number = self
            .counters
            .get(&issuer.issuer_key_hash)
            .map(|c| c.fetch_add(1, Ordering::SeqCst))
            .unwrap_or(0);

        let der = build_crl_der(issuer, &revoked, crl_number)?;
        self.state.crl_cache().insert(issuer.issuer_key_hash.clone(), der);
        Ok(())
    }
}

fn build_crl_der(
    issuer: &crate::issuer::Issuer,
    revoked: &[RevokedEntry],
    crl_number: u64,
) -> anyhow::Result<Vec<u8>> {
    let now = OffsetDateTime::now_utc();
    let interval = TimeDuration::hours(6) + TimeDuration::minutes(10);

    let revoked_certs = revoked
        .iter()
        .map(|entry| RevokedCertParams {
            serial_number: SerialNumber::from_slice(&entry.serial_number.to_be_bytes()),
            revocation_time: chrono_to_offset(entry.updated_at),
            reason_code: Some(reason_from_i32(entry.revoked_reason)),
            invalidity_date: None,
        })
        .collect();

    let params = CertificateRevocationListParams {
        this_update: now,
        next_update: now + interval,
        crl_number: SerialNumber::from_slice(&crl_number.to_be_bytes()),
        issuing_distribution_point: None,
        revoked_certs,
        alg: issuer.signer().get_key_pair().algorithm(),
        key_identifier_method: rcgen::KeyIdMethod::Sha256,
    };

    let crl = rcgen::CertificateRevocationList::from_params(params)
        .map_err(|e| anyhow::anyhow!("building crl: {e}"))?;
    crl.serialize_der_with_signer(issuer.signer())
        .map_err(|e| anyhow::anyhow!("signing crl: {e}"))
}

fn reason_from_i32(code: i32) -> rcgen::RevocationReason {
    use crate::db::models::RevocationReason as Reason;
    match Reason::from_i32(code) {
        Reason::KeyCompromise => rcgen::RevocationReason::KeyCompromise,
        Reason::CaCompromise => rcgen::RevocationReason::CaCompromise,
        Reason::AffiliationChanged => rcgen::RevocationReason::AffiliationChanged,
        Reason::Superseded => rcgen::RevocationReason::Superseded,
        Reason::CessationOfOperation => rcgen::RevocationReason::CessationOfOperation,
        Reason::CertificateHold => rcgen::RevocationReason::CertificateHold,
        Reason::RemoveFromCrl => rcgen::RevocationReason::RemoveFromCrl,
        Reason::PrivilegeWithdrawn => rcgen::RevocationReason::PrivilegeWithdrawn,
        Reason::AaCompromise => rcgen::RevocationReason::AaCompromise,
        Reason::Unspecified => rcgen::RevocationReason::Unspecified,
    }
}

fn chrono_to_offset(dt: chrono::DateTime<chrono::Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_from_i32_maps_known_codes() {
        assert!(matches!(reason_from_i32(4), rcgen::RevocationReason::Superseded));
        assert!(matches!(reason_from_i32(1), rcgen::RevocationReason::KeyCompromise));
    }

    #[test]
    fn reason_from_i32_defaults_unknown_codes_to_unspecified() {
        assert!(matches!(reason_from_i32(99), rcgen::RevocationReason::Unspecified));
        assert!(matches!(reason_from_i32(0), rcgen::RevocationReason::Unspecified));
    }
}

/// Bound per-URL at router-build time, one closure per configured
/// `crl_distribution_point_urls` entry.
pub async fn serve_crl_for(state: AppState, issuer_key_hash: String) -> Response {
    match state.crl_cache().get(&issuer_key_hash) {
        Some(der) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/pkix-crl"), (header::CACHE_CONTROL, CRL_CACHE_CONTROL)],
            der.clone(),
        )
            .into_response(),
        None => {
            tracing::error!(issuer_key_hash = %issuer_key_hash, "crl cache miss");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Bound per-URL at router-build time for each `issuing_certificate_urls`
/// entry; the DER is static for the process lifetime so it's captured by
/// value rather than looked up per request.
pub async fn serve_issuing_cert_for(cert_der: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/pkix-cert"), (header::CACHE_CONTROL, CERT_CACHE_CONTROL)],
        cert_der,
    )
        .into_response()
}
