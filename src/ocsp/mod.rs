//! OCSP Responder: one responder per issuer, mapping a decoded
//! `OCSPRequest` to a signed `OCSPResponse` via `select_cert_by_serial`.
//! Built on the RustCrypto `x509-ocsp`/`der` types for encoding and
//! decoding; the raw signature over `tbsResponseData` goes through
//! `Issuer::sign_raw` since certificate-signing crates generally have no
//! OCSP-signing entry point of their own.

use chrono::Utc;
use der::{
    asn1::{BitString, GeneralizedTime, OctetString},
    Decode, Encode,
};
use x509_cert::ext::pkix::CrlReason;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspGeneralizedTime, OcspRequest, OcspResponse, OcspResponseStatus,
    ResponderId, ResponseBytes, ResponseData, RevokedInfo, SingleResponse, Version,
};

use crate::db::Repo;
use crate::hash::{digest_by_oid, sha1_digest};
use crate::issuer::Issuer;

const OID_PKIX_OCSP_BASIC: &str = "1.3.6.1.5.5.7.48.1.1";

pub async fn respond(repo: &Repo, issuer: &Issuer, request_der: &[u8]) -> Vec<u8> {
    match handle(repo, issuer, request_der).await {
        Ok(der) => der,
        Err(err) => {
            tracing::error!(error = %err, "ocsp internal error");
            encode_error_status(OcspResponseStatus::InternalError)
        }
    }
}

async fn handle(repo: &Repo, issuer: &Issuer, request_der: &[u8]) -> anyhow::Result<Vec<u8>> {
    let request = OcspRequest::from_der(request_der).map_err(|e| anyhow::anyhow!("decoding ocsp request: {e}"))?;
    let cert_id = request
        .tbs_request
        .request_list
        .first()
        .map(|r| r.req_cert.clone())
        .ok_or_else(|| anyhow::anyhow!("ocsp request carries no entries"))?;

    let serial = serial_from_cert_id(&cert_id);
    let rows = repo.select_cert_by_serial(serial).await?;

    let status = match rows.into_iter().next() {
        None => SingleStatus::Unknown,
        Some(cert) if !hashes_match(issuer, &cert_id, &cert.issuer_key_hash, &cert.issuer_name_hash) => {
            SingleStatus::Unknown
        }
        Some(cert) if cert.revoked => SingleStatus::Revoked { at: cert.updated_at, reason: cert.revoked_reason },
        Some(_) => SingleStatus::Good,
    };

    build_response(issuer, cert_id, status)
}

enum SingleStatus {
    Good,
    Revoked { at: chrono::DateTime<Utc>, reason: i32 },
    Unknown,
}

/// First checks the stored cert row's own canonical (SHA-1) issuer hashes
/// against this responder's — a cert issued by a different issuer than
/// the one fielding this request resolves to `Unknown` right here.
/// Then recomputes both issuer hashes under whatever algorithm the
/// request's `CertID.hashAlgorithm` names and compares those too, since a
/// client is free to ask with SHA-256/384/512 instead of SHA-1.
fn hashes_match(issuer: &Issuer, cert_id: &CertId, stored_issuer_key_hash: &str, stored_issuer_name_hash: &str) -> bool {
    if stored_issuer_key_hash != issuer.issuer_key_hash || stored_issuer_name_hash != issuer.issuer_name_hash {
        return false;
    }

    let oid = cert_id.hash_algorithm.oid.to_string();
    let (Some(name_digest), Some(key_digest)) =
        (digest_by_oid(&oid, &issuer.subject_raw), digest_by_oid(&oid, &issuer.spki_raw))
    else {
        return false;
    };

    cert_id.issuer_name_hash.as_bytes() == name_digest.as_slice()
        && cert_id.issuer_key_hash.as_bytes() == key_digest.as_slice()
}

fn serial_from_cert_id(cert_id: &CertId) -> i64 {
    let bytes = cert_id.serial_number.as_bytes();
    let mut buf = [0u8; 8];
    let start = bytes.len().saturating_sub(8);
    let dest_start = 8 - (bytes.len() - start);
    buf[dest_start..].copy_from_slice(&bytes[start..]);
    i64::from_be_bytes(buf)
}

fn build_response(issuer: &Issuer, cert_id: CertId, status: SingleStatus) -> anyhow::Result<Vec<u8>> {
    let cert_status = match status {
        SingleStatus::Good => CertStatus::Good,
        SingleStatus::Revoked { at, reason } => CertStatus::Revoked(RevokedInfo {
            revocation_time: to_generalized(at)?,
            revocation_reason: Some(crl_reason(reason)),
        }),
        SingleStatus::Unknown => CertStatus::Unknown,
    };

    let now = Utc::now();
    let single = SingleResponse {
        cert_id,
        cert_status,
        this_update: to_generalized(now)?,
        next_update: Some(to_generalized(now + chrono::Duration::minutes(59))?),
        single_extensions: None,
    };

    // RFC 6960 §4.2.1: KeyHash is the raw 20-byte SHA-1 of the issuer's
    // public key (the SPKI `BIT STRING` contents), not an ASCII hex string
    // and not a hash over the whole certificate.
    let responder_id = ResponderId::ByKey(OctetString::new(sha1_digest(&issuer.spki_raw))?);

    let tbs = ResponseData {
        version: Version::V1,
        responder_id,
        produced_at: to_generalized(now)?,
        responses: vec![single],
        response_extensions: None,
    };

    let mut tbs_der = Vec::new();
    tbs.encode_to_vec(&mut tbs_der)?;
    let signature = issuer.sign_raw(&tbs_der)?;

    let basic = BasicOcspResponse {
        tbs_response_data: tbs,
        signature_algorithm: der::Decode::from_der(&issuer.signature_algorithm_identifier_der())?,
        signature: BitString::from_bytes(&signature)?,
        certs: None,
    };

    let mut basic_der = Vec::new();
    basic.encode_to_vec(&mut basic_der)?;

    let response = OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: der::asn1::ObjectIdentifier::new(OID_PKIX_OCSP_BASIC)?,
            response: OctetString::new(basic_der)?,
        }),
    };

    let mut out = Vec::new();
    response.encode_to_vec(&mut out)?;
    Ok(out)
}

fn crl_reason(code: i32) -> CrlReason {
    use crate::db::models::RevocationReason as Reason;
    match Reason::from_i32(code) {
        Reason::KeyCompromise => CrlReason::KeyCompromise,
        Reason::CaCompromise => CrlReason::CaCompromise,
        Reason::AffiliationChanged => CrlReason::AffiliationChanged,
        Reason::Superseded => CrlReason::Superseded,
        Reason::CessationOfOperation => CrlReason::CessationOfOperation,
        Reason::CertificateHold => CrlReason::CertificateHold,
        Reason::RemoveFromCrl => CrlReason::RemoveFromCRL,
        Reason::PrivilegeWithdrawn => CrlReason::PrivilegeWithdrawn,
        Reason::AaCompromise => CrlReason::AaCompromise,
        Reason::Unspecified => CrlReason::Unspecified,
    }
}

fn to_generalized(dt: chrono::DateTime<Utc>) -> anyhow::Result<OcspGeneralizedTime> {
    let date_time = der::DateTime::new(
        dt.format("%Y").to_string().parse().unwrap_or(1970),
        dt.format("%m").to_string().parse().unwrap_or(1),
        dt.format("%d").to_string().parse().unwrap_or(1),
        dt.format("%H").to_string().parse().unwrap_or(0),
        dt.format("%M").to_string().parse().unwrap_or(0),
        dt.format("%S").to_string().parse().unwrap_or(0),
    )
    .map_err(|e| anyhow::anyhow!("building ocsp timestamp: {e}"))?;
    Ok(OcspGeneralizedTime(GeneralizedTime::from_date_time(date_time)))
}

fn encode_error_status(status: OcspResponseStatus) -> Vec<u8> {
    let response = OcspResponse { response_status: status, response_bytes: None };
    let mut out = Vec::new();
    let _ = response.encode_to_vec(&mut out);
    out
}
