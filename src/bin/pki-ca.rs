//! Generates a root CA, or an intermediate CA signed by an existing
//! one, and writes `<cn>.crt`/`<cn>.key` into the output directory.

use std::path::PathBuf;

use casper_pki::issuer::extensions;
use clap::{Parser, ValueEnum};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose,
    SanType,
};

#[derive(Parser)]
#[command(name = "pki-ca")]
#[command(about = "Generate a root or intermediate certificate authority")]
struct Args {
    /// Common Name
    #[arg(long, default_value = "Root CA L0")]
    cn: String,

    /// Organization Name
    #[arg(long, default_value = "Default Organization")]
    org: String,

    /// Country Name (2-letter code)
    #[arg(long, default_value = "")]
    country: String,

    /// OCSP Server URL
    #[arg(long, default_value = "")]
    ocsp: String,

    /// Certificate Policies URL
    #[arg(long, default_value = "")]
    cps: String,

    /// Issuing Certificate URL
    #[arg(long, default_value = "")]
    icu: String,

    /// CRL Distribution Point URL
    #[arg(long, default_value = "")]
    crl: String,

    /// Signature algorithm
    #[arg(long, value_enum, default_value = "ecdsa256")]
    alg: Algorithm,

    /// Validity period, in days
    #[arg(long, default_value_t = 10 * 365)]
    deadline: i64,

    /// Output directory for the generated cert/key
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Existing CA certificate to sign with, for an intermediate CA
    #[arg(long = "ca-cert")]
    ca_cert: Option<PathBuf>,

    /// Existing CA key to sign with, for an intermediate CA
    #[arg(long = "ca-key")]
    ca_key: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    Rsa256,
    Rsa384,
    Rsa512,
    Ecdsa256,
    Ecdsa384,
}

impl Algorithm {
    fn rcgen_alg(self) -> &'static rcgen::SignatureAlgorithm {
        match self {
            Algorithm::Rsa256 | Algorithm::Rsa384 | Algorithm::Rsa512 => &rcgen::PKCS_RSA_SHA256,
            Algorithm::Ecdsa256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            Algorithm::Ecdsa384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, args.cn.trim());
    if !args.org.trim().is_empty() {
        dn.push(DnType::OrganizationName, args.org.trim());
    }
    if !args.country.trim().is_empty() {
        dn.push(DnType::CountryName, args.country.trim());
    }

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;
    params.alg = args.alg.rcgen_alg();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params.not_before = time::OffsetDateTime::now_utc();
    params.not_after = params.not_before + time::Duration::days(args.deadline);

    if !args.ocsp.is_empty() || !args.icu.is_empty() {
        let ocsp = non_empty(&args.ocsp);
        let icu = non_empty(&args.icu);
        let der = extensions::authority_info_access(&ocsp, &icu)?;
        params.custom_extensions.push(rcgen::CustomExtension::from_oid_content(&[1, 3, 6, 1, 5, 5, 7, 1, 1], der));
    }
    if !args.crl.is_empty() {
        let der = extensions::crl_distribution_points(&non_empty(&args.crl))?;
        params.custom_extensions.push(rcgen::CustomExtension::from_oid_content(&[2, 5, 29, 31], der));
    }
    if !args.cps.is_empty() {
        let der = extensions::certificate_policies(&non_empty(&args.cps))?;
        params.custom_extensions.push(rcgen::CustomExtension::from_oid_content(&[2, 5, 29, 32], der));
    }
    if !args.cn.is_empty() {
        params.subject_alt_names = vec![SanType::DnsName(args.cn.clone())];
    }

    let cert = Certificate::from_params(params)?;

    let (cert_der, key_pair) = match (&args.ca_cert, &args.ca_key) {
        (Some(ca_cert_path), Some(ca_key_path)) => {
            let parent_cert_pem = std::fs::read_to_string(ca_cert_path)?;
            let parent_key_pem = std::fs::read_to_string(ca_key_path)?;
            let parent_key = KeyPair::from_pem(&parent_key_pem)?;
            let parent_params = CertificateParams::from_ca_cert_pem(&parent_cert_pem, parent_key)?;
            let parent = Certificate::from_params(parent_params)?;
            (cert.serialize_der_with_signer(&parent)?, cert.get_key_pair().clone())
        }
        (None, None) => (cert.serialize_der()?, cert.get_key_pair().clone()),
        _ => anyhow::bail!("--ca-cert and --ca-key must be supplied together"),
    };

    std::fs::create_dir_all(&args.output)?;
    let file_stem = args.cn.to_lowercase().replace(' ', "_");

    let cert_path = args.output.join(format!("{file_stem}.crt"));
    let key_path = args.output.join(format!("{file_stem}.key"));

    std::fs::write(&cert_path, pem_encode("CERTIFICATE", &cert_der))?;
    std::fs::write(&key_path, key_pair.serialize_pem())?;

    tracing::info!(cert = %cert_path.display(), key = %key_path.display(), "ca generated");
    Ok(())
}

fn non_empty(value: &str) -> Vec<String> {
    if value.is_empty() {
        Vec::new()
    } else {
        vec![value.to_string()]
    }
}

fn pem_encode(label: &str, der: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let encoded = STANDARD.encode(der);
    let mut out = format!("-----BEGIN {label}-----\n");
    for line in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(line).expect("base64 output is ascii"));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}
