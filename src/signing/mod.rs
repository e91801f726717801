//! Signing Engine: turns a validated CSR plus a resolved `Issuer` into a
//! persisted, signed leaf certificate, using an insert-revoked / sign /
//! flip-to-non-revoked sequence so a crash mid-signing never leaves a
//! usable certificate with no corresponding database row.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rcgen::{CertificateSigningRequest, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose};

use crate::db::Repo;
use crate::error::AppError;
use crate::hash::fingerprint_sha256;
use crate::issuer::Issuer;

pub struct SignedLeaf {
    pub serial_number: i64,
    pub ca_pem: String,
    pub cert_pem: String,
}

/// Allocates a serial, writes the placeholder row, signs, and flips the
/// row to `revoked = false`. On any failure after the placeholder insert,
/// the row is left `revoked = true` (I1 stays true across the failure).
pub async fn issue(
    repo: &Repo,
    issuer: &Issuer,
    owner_id: i64,
    csr_pem: &str,
    domains: &[String],
) -> Result<SignedLeaf, AppError> {
    let serial_number = allocate_serial();

    let cert_id = repo.create_cert(serial_number, owner_id).await?;
    repo.create_bulk_cert_domain(cert_id, domains).await?;

    let not_before = Utc::now();
    let not_after = not_before + Duration::days(issuer.default_expire_days as i64);

    let cert_der = build_and_sign(issuer, csr_pem, serial_number, not_before, not_after)
        .map_err(AppError::internal)?;

    let subject = cert_subject_string(&cert_der).map_err(AppError::internal)?;
    let fingerprint = fingerprint_sha256(&cert_der);
    let cert_pem = pem_encode_cert(&cert_der);

    repo.update_cert_by_serial(
        serial_number,
        &subject,
        &fingerprint,
        &issuer.issuer_key_hash,
        &issuer.issuer_name_hash,
        not_before,
        not_after,
    )
    .await?;

    Ok(SignedLeaf { serial_number, ca_pem: issuer.cert_pem.clone(), cert_pem })
}

/// Random 63-bit positive integer; uniqueness is enforced by the
/// `cert_info.serial_number` unique constraint.
fn allocate_serial() -> i64 {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    i64::from_be_bytes(bytes) & i64::MAX
}

fn build_and_sign(
    issuer: &Issuer,
    csr_pem: &str,
    serial_number: i64,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> anyhow::Result<Vec<u8>> {
    let csr = CertificateSigningRequest::from_pem(csr_pem)
        .map_err(|e| anyhow::anyhow!("re-parsing validated csr: {e}"))?;

    let mut params = csr.params;
    params.serial_number = Some(rcgen::SerialNumber::from_slice(&serial_number.to_be_bytes()));
    params.not_before = to_offset(not_before);
    params.not_after = to_offset(not_after);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
    params.extended_key_usages =
        vec![ExtendedKeyUsagePurpose::ServerAuth, ExtendedKeyUsagePurpose::ClientAuth];
    params.custom_extensions = issuer.extra_extensions().map_err(|e| anyhow::anyhow!("encoding extensions: {e}"))?;

    let cert = rcgen::Certificate::from_params(params).map_err(|e| anyhow::anyhow!("building leaf params: {e}"))?;
    cert.serialize_der_with_signer(issuer.signer())
        .map_err(|e| anyhow::anyhow!("signing leaf: {e}"))
}

fn to_offset(dt: DateTime<Utc>) -> time::OffsetDateTime {
    time::OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
}

fn cert_subject_string(der: &[u8]) -> anyhow::Result<String> {
    let (_, parsed) =
        x509_parser::parse_x509_certificate(der).map_err(|e| anyhow::anyhow!("re-parsing signed leaf: {e}"))?;
    Ok(parsed.subject().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_serials_are_always_positive() {
        for _ in 0..100 {
            assert!(allocate_serial() >= 0);
        }
    }

    #[test]
    fn allocated_serials_are_not_trivially_constant() {
        let a = allocate_serial();
        let b = allocate_serial();
        assert_ne!(a, b);
    }
}

fn pem_encode_cert(der: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let encoded = STANDARD.encode(der);
    let mut writer = String::new();
    writer.push_str("-----BEGIN CERTIFICATE-----\n");
    for line in encoded.as_bytes().chunks(64) {
        writer.push_str(std::str::from_utf8(line).expect("base64 output is ascii"));
        writer.push('\n');
    }
    writer.push_str("-----END CERTIFICATE-----\n");
    writer
}
