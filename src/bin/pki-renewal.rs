//! Generates a local key and CSR for the given domains, requests a
//! renewal from a running PKI service, and writes the resulting chain,
//! certificate, and key to disk.

use std::path::PathBuf;

use casper_pki::client::{ClientConfig, HmacAlgorithm, PkiClient, RenewalOutcome};
use clap::{Parser, ValueEnum};
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, SanType};

#[derive(Parser)]
#[command(name = "pki-renewal")]
#[command(about = "Request certificate renewal from a casper-pki server")]
struct Args {
    /// Force renewal even if a valid certificate already exists
    #[arg(long)]
    force: bool,

    /// Comma-separated domains to request a certificate for
    #[arg(long)]
    domains: String,

    /// casper-pki server address, e.g. https://pki.internal:8443
    #[arg(long)]
    address: String,

    /// Authentication token ID
    #[arg(long = "auth-id")]
    auth_id: String,

    /// Authentication HMAC key
    #[arg(long = "auth-key")]
    auth_key: String,

    /// HMAC signing algorithm
    #[arg(long, value_enum, default_value = "hmac-sha256")]
    alg: Algorithm,

    /// Signature algorithm for the generated key/CSR
    #[arg(long, value_enum, default_value = "ecdsa256")]
    key_alg: KeyAlgorithm,

    /// Output directory for the issued files
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    #[value(name = "hmac-sha1")]
    Sha1,
    #[value(name = "hmac-sha256")]
    Sha256,
    #[value(name = "hmac-sha512")]
    Sha512,
}

impl From<Algorithm> for HmacAlgorithm {
    fn from(value: Algorithm) -> Self {
        match value {
            Algorithm::Sha1 => HmacAlgorithm::Sha1,
            Algorithm::Sha256 => HmacAlgorithm::Sha256,
            Algorithm::Sha512 => HmacAlgorithm::Sha512,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyAlgorithm {
    Rsa256,
    Ecdsa256,
    Ecdsa384,
}

impl KeyAlgorithm {
    fn rcgen_alg(self) -> &'static rcgen::SignatureAlgorithm {
        match self {
            KeyAlgorithm::Rsa256 => &rcgen::PKCS_RSA_SHA256,
            KeyAlgorithm::Ecdsa256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            KeyAlgorithm::Ecdsa384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let domains: Vec<String> = args.domains.split(',').map(|d| d.trim().to_lowercase()).collect();
    if domains.is_empty() || domains.iter().any(|d| d.is_empty()) {
        anyhow::bail!("no valid domains supplied");
    }

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, domains[0].as_str());

    let mut params = CertificateParams::new(domains.clone());
    params.alg = args.key_alg.rcgen_alg();
    params.distinguished_name = dn;
    params.subject_alt_names = domains.iter().cloned().map(SanType::DnsName).collect();

    let csr_cert = Certificate::from_params(params)?;
    let csr_pem = csr_cert.serialize_request_pem()?;
    let key_pem = csr_cert.serialize_private_key_pem();

    let client = PkiClient::new(ClientConfig {
        address: args.address,
        auth_id: args.auth_id,
        auth_key: args.auth_key,
        algorithm: args.alg.into(),
    });

    let outcome = client.renew(args.force, &csr_pem).await?;

    match outcome {
        RenewalOutcome::Actual => {
            tracing::info!("certificate for the domain is already valid");
        }
        RenewalOutcome::Fail => {
            tracing::error!("not possible to issue a certificate for this domain");
            std::process::exit(1);
        }
        RenewalOutcome::Issued { ca, cert } => {
            std::fs::create_dir_all(&args.output)?;
            let stem = domains[0].replace('.', "_");

            let chain_path = args.output.join(format!("{stem}.chain.crt"));
            let cert_path = args.output.join(format!("{stem}.crt"));
            let key_path = args.output.join(format!("{stem}.key"));

            std::fs::write(&chain_path, ca)?;
            std::fs::write(&cert_path, cert)?;
            std::fs::write(&key_path, key_pem)?;

            tracing::info!(
                chain = %chain_path.display(),
                cert = %cert_path.display(),
                key = %key_path.display(),
                "certificate issued"
            );
        }
    }

    Ok(())
}
