//! Typed queries against `auth`, `cert_info`, `cert_domain`.
//!
//! `select_cert_revoked` bounds its result to `valid_until >= now()` so
//! the CRL never carries an entry for a certificate that has already
//! naturally expired. Runtime-checked `sqlx::query_as` is used instead of
//! the `query_as!` macro family since there is no live database to check
//! queries against while building this crate.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{Auth, Cert, NonRevokedCert, RevokedEntry};
use super::Pools;

#[derive(Clone)]
pub struct Repo {
    pools: Pools,
}

impl Repo {
    pub fn new(pools: Pools) -> Self {
        Self { pools }
    }

    pub async fn select_auth_by_token_id(&self, token_id: Uuid) -> Result<Vec<Auth>, sqlx::Error> {
        sqlx::query_as::<_, Auth>(
            "SELECT id, token_id, token_key, domains, locked, created_at, updated_at \
             FROM auth WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_all(&self.pools.replica)
        .await
    }

    pub async fn select_cert_by_serial(&self, serial: i64) -> Result<Vec<Cert>, sqlx::Error> {
        sqlx::query_as::<_, Cert>(
            "SELECT id, serial_number, owner, subject, fingerprint, issuer_key_hash, \
             issuer_name_hash, revoked, revoked_reason, created_at, valid_until, updated_at \
             FROM cert_info WHERE serial_number = $1",
        )
        .bind(serial)
        .fetch_all(&self.pools.replica)
        .await
    }

    pub async fn select_cert_non_revoked_by_domains(
        &self,
        domains: &[String],
    ) -> Result<Vec<NonRevokedCert>, sqlx::Error> {
        let rows: Vec<(i64, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT DISTINCT c.serial_number, c.owner, c.valid_until \
             FROM cert_info c JOIN cert_domain d ON d.cert_id = c.id \
             WHERE c.revoked = false AND d.domain = ANY($1)",
        )
        .bind(domains)
        .fetch_all(&self.pools.replica)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(serial_number, owner, valid_until)| NonRevokedCert { serial_number, owner, valid_until })
            .collect())
    }

    /// Inserts the placeholder row (`revoked = true`) that the signing
    /// transaction later flips via `update_cert_by_serial`. Returns the
    /// row's surrogate `id`, needed to insert `cert_domain` rows.
    pub async fn create_cert(&self, serial_number: i64, owner: i64) -> Result<i64, sqlx::Error> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO cert_info \
             (serial_number, owner, subject, fingerprint, issuer_key_hash, issuer_name_hash, \
              revoked, revoked_reason, created_at, valid_until, updated_at) \
             VALUES ($1, $2, '', '', '', '', true, 0, now(), now(), now()) \
             RETURNING id",
        )
        .bind(serial_number)
        .bind(owner)
        .fetch_one(&self.pools.master)
        .await?;
        Ok(id)
    }

    pub async fn create_bulk_cert_domain(&self, cert_id: i64, domains: &[String]) -> Result<(), sqlx::Error> {
        if domains.is_empty() {
            return Ok(());
        }
        let mut tx = self.pools.master.begin().await?;
        for domain in domains {
            sqlx::query("INSERT INTO cert_domain (cert_id, domain) VALUES ($1, $2)")
                .bind(cert_id)
                .bind(domain)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_cert_by_serial(
        &self,
        serial_number: i64,
        subject: &str,
        fingerprint: &str,
        issuer_key_hash: &str,
        issuer_name_hash: &str,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE cert_info SET revoked = false, subject = $2, fingerprint = $3, \
             issuer_key_hash = $4, issuer_name_hash = $5, created_at = $6, valid_until = $7, \
             updated_at = now() WHERE serial_number = $1",
        )
        .bind(serial_number)
        .bind(subject)
        .bind(fingerprint)
        .bind(issuer_key_hash)
        .bind(issuer_name_hash)
        .bind(not_before)
        .bind(not_after)
        .execute(&self.pools.master)
        .await?;
        Ok(())
    }

    pub async fn update_certs_as_revoked(
        &self,
        owner: i64,
        serials: &[i64],
        reason: i32,
    ) -> Result<u64, sqlx::Error> {
        if serials.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE cert_info SET revoked = true, revoked_reason = $3, updated_at = now() \
             WHERE revoked = false AND owner = $1 AND serial_number = ANY($2)",
        )
        .bind(owner)
        .bind(serials)
        .bind(reason)
        .execute(&self.pools.master)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_cert_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cert_info WHERE valid_until < now()")
            .execute(&self.pools.master)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn select_cert_revoked(&self, issuer_key_hash: &str) -> Result<Vec<RevokedEntry>, sqlx::Error> {
        sqlx::query_as::<_, RevokedEntry>(
            "SELECT serial_number, revoked_reason, updated_at FROM cert_info \
             WHERE issuer_key_hash = $1 AND revoked = true AND valid_until >= now()",
        )
        .bind(issuer_key_hash)
        .fetch_all(&self.pools.replica)
        .await
    }
}
