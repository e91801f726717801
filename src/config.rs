//! YAML configuration for the PKI service.

use serde::Deserialize;
use std::{fs, path::Path};

fn default_max_inflight() -> usize {
    100
}

fn default_crl_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_sweeper_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_ocsp_refresh_secs() -> u64 {
    59 * 60
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuerConfig {
    #[serde(default)]
    pub root_ca_chain: Vec<String>,
    pub issuing_ca_cert: String,
    pub issuing_ca_key: String,
    pub domains: Vec<String>,
    pub default_expire_days: u32,
    /// One of `rsa-sha256|rsa-sha384|rsa-sha512|ecdsa-sha256|ecdsa-sha384`;
    /// inferred from the key type when absent.
    #[serde(default)]
    pub signature_algorithm: Option<String>,
    #[serde(default)]
    pub issuing_certificate_urls: Vec<String>,
    #[serde(default)]
    pub ocsp_server_urls: Vec<String>,
    #[serde(default)]
    pub crl_distribution_point_urls: Vec<String>,
    #[serde(default)]
    pub certificate_policies_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub master_dsn: String,
    pub replica_dsn: String,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

fn default_pool_size() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerBind {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServersConfig {
    pub main: ServerBind,
    pub pki: ServerBind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_inflight: default_max_inflight(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrlConfig {
    #[serde(default = "default_crl_interval_secs")]
    pub interval_secs: u64,
}

impl Default for CrlConfig {
    fn default() -> Self {
        Self { interval_secs: default_crl_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweeper_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: default_sweeper_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcspConfig {
    #[serde(default = "default_ocsp_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for OcspConfig {
    fn default() -> Self {
        Self { refresh_secs: default_ocsp_refresh_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { bind: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub certs: Vec<IssuerConfig>,
    pub db: DbConfig,
    pub servers: ServersConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub crl: CrlConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub ocsp: OcspConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.as_ref().display()))?;
        let cfg: AppConfig = serde_yaml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.as_ref().display()))?;
        Ok(cfg)
    }
}
