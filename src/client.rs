//! `PkiClient`: signs and sends renewal requests against the PKI
//! service's `/api/renewal/v1` endpoint.

use ring::hmac;
use serde::{Deserialize, Serialize};

const PATH_RENEWAL_V1: &str = "/api/renewal/v1";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub auth_id: String,
    pub auth_key: String,
    pub algorithm: HmacAlgorithm,
}

#[derive(Debug, Clone, Copy)]
pub enum HmacAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl HmacAlgorithm {
    fn header_name(self) -> &'static str {
        match self {
            HmacAlgorithm::Sha1 => "hmac-sha1",
            HmacAlgorithm::Sha256 => "hmac-sha256",
            HmacAlgorithm::Sha512 => "hmac-sha512",
        }
    }

    fn ring_algorithm(self) -> hmac::Algorithm {
        match self {
            HmacAlgorithm::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            HmacAlgorithm::Sha256 => hmac::HMAC_SHA256,
            HmacAlgorithm::Sha512 => hmac::HMAC_SHA512,
        }
    }
}

#[derive(Debug, Serialize)]
struct RenewalRequest {
    force: bool,
    csr: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status")]
pub enum RenewalOutcome {
    #[serde(rename = "issued")]
    Issued { ca: String, cert: String },
    #[serde(rename = "actual")]
    Actual,
    #[serde(rename = "fail")]
    Fail,
}

pub struct PkiClient {
    config: ClientConfig,
    http: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("building request body: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}

impl PkiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    pub async fn renew(&self, force: bool, csr_pem: &str) -> Result<RenewalOutcome, ClientError> {
        let body = serde_json::to_vec(&RenewalRequest { force, csr: csr_pem.to_string() })?;
        let signature = self.sign(&body);

        let response = self
            .http
            .post(format!("{}{}", self.config.address, PATH_RENEWAL_V1))
            .header("X-Signature", signature)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::UnexpectedStatus(response.status()));
        }

        Ok(response.json::<RenewalOutcome>().await?)
    }

    fn sign(&self, body: &[u8]) -> String {
        let key = hmac::Key::new(self.config.algorithm.ring_algorithm(), self.config.auth_key.as_bytes());
        let tag = hmac::sign(&key, body);
        format!(
            "id={},alg={},sig={}",
            self.config.auth_id,
            self.config.algorithm.header_name(),
            hex::encode(tag.as_ref())
        )
    }
}
