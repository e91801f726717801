//! Renewal Handler: orchestrates auth → CSR parse/validate → dedupe or
//! supersede → sign → respond.

use axum::{extract::State, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::auth::Principal;
use crate::db::models::NonRevokedCert;
use crate::error::AppError;
use crate::signing;
use crate::state::AppState;

const SUPERSEDED: i32 = 4;
const DUPLICATE_FRESHNESS_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Deserialize)]
pub struct RenewalRequest {
    #[serde(default)]
    pub force: bool,
    pub csr: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
pub enum RenewalResponse {
    #[serde(rename = "issued")]
    Issued { ca: String, cert: String },
    #[serde(rename = "actual")]
    Actual,
    #[serde(rename = "fail")]
    Fail,
}

pub async fn handle(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<RenewalRequest>,
) -> Result<Json<RenewalResponse>, AppError> {
    let names = parse_and_validate_csr(&request.csr)?;
    let level2 = shared_level2_parent(&names)?;

    let issuer = state
        .issuers()
        .get(&level2)
        .ok_or_else(|| AppError::invalid_with("not found CA for domain", "domain", level2.clone()))?;

    if !principal.authorized_domains.iter().any(|d| d == &level2) {
        return Err(AppError::Forbidden);
    }

    let existing = state.repo().select_cert_non_revoked_by_domains(&names).await?;

    if let Some(response) = apply_duplicate_policy(&existing, principal.owner_id, request.force) {
        if let DuplicateOutcome::Supersede(serials) = response {
            state
                .repo()
                .update_certs_as_revoked(principal.owner_id, &serials, SUPERSEDED)
                .await?;
        } else {
            return Ok(Json(response.into_response()));
        }
    }

    let signed = signing::issue(state.repo(), &issuer, principal.owner_id, &request.csr, &names).await?;

    Ok(Json(RenewalResponse::Issued { ca: signed.ca_pem, cert: signed.cert_pem }))
}

enum DuplicateOutcome {
    Fail,
    Actual,
    Supersede(Vec<i64>),
}

impl DuplicateOutcome {
    fn into_response(self) -> RenewalResponse {
        match self {
            DuplicateOutcome::Fail => RenewalResponse::Fail,
            DuplicateOutcome::Actual => RenewalResponse::Actual,
            DuplicateOutcome::Supersede(_) => unreachable!("supersede is handled before responding"),
        }
    }
}

/// Returns `None` when the caller should proceed straight to signing (no
/// pre-existing cert covers these names); `Some` otherwise, in which case
/// a `Supersede` outcome still needs its revocation UPDATE applied by the
/// caller before issuing.
fn apply_duplicate_policy(existing: &[NonRevokedCert], owner_id: i64, force: bool) -> Option<DuplicateOutcome> {
    if existing.is_empty() {
        return None;
    }
    if existing.iter().any(|c| c.owner != owner_id) {
        return Some(DuplicateOutcome::Fail);
    }

    let freshness_floor = Utc::now() - Duration::days(DUPLICATE_FRESHNESS_WINDOW_DAYS);
    if !force && existing.iter().all(|c| c.valid_until > freshness_floor) {
        return Some(DuplicateOutcome::Actual);
    }

    Some(DuplicateOutcome::Supersede(existing.iter().map(|c| c.serial_number).collect()))
}

fn parse_and_validate_csr(csr_pem: &str) -> Result<Vec<String>, AppError> {
    let (_, pem) =
        x509_parser::pem::parse_x509_pem(csr_pem.as_bytes()).map_err(|_| AppError::invalid("csr is not valid PEM"))?;
    let (_, csr) = x509_parser::certification_request::X509CertificationRequest::from_der(&pem.contents)
        .map_err(|_| AppError::invalid("csr does not decode"))?;

    csr.verify_signature().map_err(|_| AppError::invalid("csr signature does not verify"))?;

    let san_ext = csr.requested_extensions().and_then(|mut exts| {
        exts.find_map(|ext| match ext {
            x509_parser::extensions::ParsedExtension::SubjectAlternativeName(san) => Some(san),
            _ => None,
        })
    });

    let mut dns_names = Vec::new();
    let mut has_ip = false;
    if let Some(san) = san_ext {
        for name in &san.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                GeneralName::IPAddress(_) => has_ip = true,
                _ => {}
            }
        }
    }

    if has_ip {
        return Err(AppError::invalid("csr must not request IP address SANs"));
    }
    if dns_names.is_empty() {
        return Err(AppError::invalid("csr must request at least one DNS name"));
    }
    for name in &dns_names {
        if !is_valid_dns_name(name) {
            return Err(AppError::invalid_with("csr contains an invalid DNS name", "name", name.clone()));
        }
    }

    Ok(dns_names)
}

fn is_valid_dns_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

fn level2_parent(name: &str) -> Option<String> {
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    Some(labels[labels.len() - 2..].join("."))
}

fn shared_level2_parent(names: &[String]) -> Result<String, AppError> {
    let first = level2_parent(&names[0]).ok_or_else(|| AppError::invalid("dns name has no level-2 parent"))?;
    for name in &names[1..] {
        let parent = level2_parent(name).ok_or_else(|| AppError::invalid("dns name has no level-2 parent"))?;
        if parent != first {
            return Err(AppError::invalid("issuing certificates for different level 2 domains is prohibited"));
        }
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level2_parent_strips_subdomains() {
        assert_eq!(level2_parent("a.b.example.com").as_deref(), Some("example.com"));
        assert_eq!(level2_parent("example.com").as_deref(), Some("example.com"));
        assert_eq!(level2_parent("com"), None);
    }

    #[test]
    fn dns_name_validation_rejects_bad_labels() {
        assert!(is_valid_dns_name("a.example.com"));
        assert!(!is_valid_dns_name("-a.example.com"));
        assert!(!is_valid_dns_name(""));
        assert!(!is_valid_dns_name("a..example.com"));
    }

    #[test]
    fn duplicate_policy_fails_on_foreign_owner() {
        let existing = vec![NonRevokedCert { serial_number: 1, owner: 99, valid_until: Utc::now() }];
        assert!(matches!(apply_duplicate_policy(&existing, 7, false), Some(DuplicateOutcome::Fail)));
    }

    #[test]
    fn duplicate_policy_returns_actual_when_fresh_and_not_forced() {
        let existing =
            vec![NonRevokedCert { serial_number: 1, owner: 7, valid_until: Utc::now() + Duration::days(30) }];
        assert!(matches!(apply_duplicate_policy(&existing, 7, false), Some(DuplicateOutcome::Actual)));
    }

    #[test]
    fn duplicate_policy_supersedes_when_forced() {
        let existing =
            vec![NonRevokedCert { serial_number: 1, owner: 7, valid_until: Utc::now() + Duration::days(30) }];
        assert!(matches!(apply_duplicate_policy(&existing, 7, true), Some(DuplicateOutcome::Supersede(_))));
    }

    #[test]
    fn duplicate_policy_allows_fresh_issue_when_none_exists() {
        assert!(apply_duplicate_policy(&[], 7, false).is_none());
    }
}
