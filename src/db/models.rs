//! Row types for `auth`, `cert_info`, `cert_domain`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Auth {
    pub id: i64,
    pub token_id: Uuid,
    pub token_key: String,
    pub domains: Vec<String>,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cert {
    pub id: i64,
    pub serial_number: i64,
    pub owner: i64,
    pub subject: String,
    pub fingerprint: String,
    pub issuer_key_hash: String,
    pub issuer_name_hash: String,
    pub revoked: bool,
    pub revoked_reason: i32,
    pub created_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// RFC 5280 CRLReason; only `Unspecified` and `Superseded` are produced by
/// this service today, but the full table is kept for OCSP/CRL encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CaCompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    RemoveFromCrl = 8,
    PrivilegeWithdrawn = 9,
    AaCompromise = 10,
}

impl RevocationReason {
    /// Maps a `cert_info.revoked_reason` column value to its reason,
    /// defaulting anything unrecognized to `Unspecified`.
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => Self::KeyCompromise,
            2 => Self::CaCompromise,
            3 => Self::AffiliationChanged,
            4 => Self::Superseded,
            5 => Self::CessationOfOperation,
            6 => Self::CertificateHold,
            8 => Self::RemoveFromCrl,
            9 => Self::PrivilegeWithdrawn,
            10 => Self::AaCompromise,
            _ => Self::Unspecified,
        }
    }
}

/// A non-revoked cert row eligible for the duplicate-policy decision, with
/// the domains it covers collapsed out of the cert×cert_domain join.
#[derive(Debug, Clone)]
pub struct NonRevokedCert {
    pub serial_number: i64,
    pub owner: i64,
    pub valid_until: DateTime<Utc>,
}

/// A revoked-but-not-yet-expired row, as consumed by the CRL builder.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RevokedEntry {
    pub serial_number: i64,
    pub revoked_reason: i32,
    pub updated_at: DateTime<Utc>,
}
