//! Issuer Store: the set of issuing CAs this instance is configured to
//! sign with, keyed by the leaf domain(s) each one is authorized for.
//! Built once at startup and held read-only for the process lifetime,
//! since issuer configuration only changes on redeploy.

pub mod extensions;
mod sigalg;

use std::{collections::HashMap, fs, sync::Arc};

use rcgen::{Certificate, CertificateParams, KeyPair};
use x509_parser::prelude::*;

use crate::config::IssuerConfig;
use crate::hash::{canonical_issuer_hash, hex_ski};
use sigalg::SigningKey;

pub use sigalg::SigAlg;

#[derive(Debug, thiserror::Error)]
pub enum IssuerLoadError {
    #[error("reading {path}: {source}")]
    ReadFile { path: String, #[source] source: std::io::Error },

    #[error("parsing issuing cert for domains {domains:?}: {source}")]
    ParseCert { domains: String, #[source] source: anyhow::Error },

    #[error("issuing cert for domains {domains:?} has no SubjectKeyIdentifier extension")]
    MissingSki { domains: String },

    #[error("root chain entry {index} for domains {domains:?} is not a CA certificate")]
    RootNotCa { domains: String, index: usize },

    #[error("building rcgen issuer for domains {domains:?}: {source}")]
    Rcgen { domains: String, #[source] source: rcgen::Error },

    #[error("no domains are configured across any issuer")]
    Empty,

    #[error("duplicate domain {domain} claimed by more than one issuer")]
    DuplicateDomain { domain: String },
}

/// A loaded issuing CA: key material ready to sign, plus the metadata
/// every signed leaf needs to carry (AIA/CRL DP/policy URLs, the
/// issuer-key-hash and issuer-name-hash OCSP responders compare against).
pub struct Issuer {
    pub domains: Vec<String>,
    pub default_expire_days: u32,
    pub issuing_certificate_urls: Vec<String>,
    pub ocsp_server_urls: Vec<String>,
    pub crl_distribution_point_urls: Vec<String>,
    pub certificate_policies_urls: Vec<String>,

    pub cert_der: Vec<u8>,
    pub cert_pem: String,
    signer: Certificate,
    signing_key: SigningKey,
    pub issuer_key_hash: String,
    pub issuer_name_hash: String,
    /// Raw SPKI bytes and raw subject DN DER `issuer_key_hash`/
    /// `issuer_name_hash` above are canonical (fixed SHA-1) digests of;
    /// OCSP responses need to recompute both under whatever hash
    /// algorithm a given request specifies, so the pre-digest bytes are
    /// kept around too.
    pub spki_raw: Vec<u8>,
    pub subject_raw: Vec<u8>,
    /// Root chain certs, indexed by hex(SubjectKeyIdentifier), for
    /// `lookup_chain` — the CA-Issuers AIA endpoint and CRL verification
    /// both need to hand back a specific root by SKI.
    chain_by_ski: HashMap<String, Vec<u8>>,
}

impl Issuer {
    pub fn signer(&self) -> &Certificate {
        &self.signer
    }

    pub fn lookup_chain(&self, ski_hex: &str) -> Option<&[u8]> {
        self.chain_by_ski.get(ski_hex).map(|v| v.as_slice())
    }

    /// Raw signature over `msg`, used by the OCSP responder which builds
    /// its own ASN.1 and can't go through rcgen's certificate/CRL signing
    /// paths.
    pub fn sign_raw(&self, msg: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.signing_key.sign(msg)
    }

    pub fn signature_algorithm_identifier_der(&self) -> Vec<u8> {
        self.signing_key.alg.algorithm_identifier_der()
    }

    pub fn extra_extensions(&self) -> Result<Vec<rcgen::CustomExtension>, der::Error> {
        let mut out = Vec::new();
        if !self.crl_distribution_point_urls.is_empty() {
            let der = extensions::crl_distribution_points(&self.crl_distribution_point_urls)?;
            out.push(rcgen::CustomExtension::from_oid_content(&[2, 5, 29, 31], der));
        }
        if !self.ocsp_server_urls.is_empty() || !self.issuing_certificate_urls.is_empty() {
            let der = extensions::authority_info_access(&self.ocsp_server_urls, &self.issuing_certificate_urls)?;
            out.push(rcgen::CustomExtension::from_oid_content(&[1, 3, 6, 1, 5, 5, 7, 1, 1], der));
        }
        if !self.certificate_policies_urls.is_empty() {
            let der = extensions::certificate_policies(&self.certificate_policies_urls)?;
            out.push(rcgen::CustomExtension::from_oid_content(&[2, 5, 29, 32], der));
        }
        Ok(out)
    }
}

#[derive(Clone)]
pub struct IssuerStore {
    by_domain: HashMap<String, Arc<Issuer>>,
    all: Vec<Arc<Issuer>>,
}

impl IssuerStore {
    pub fn load(configs: &[IssuerConfig]) -> Result<Self, IssuerLoadError> {
        if configs.is_empty() || configs.iter().all(|c| c.domains.is_empty()) {
            return Err(IssuerLoadError::Empty);
        }

        let mut by_domain = HashMap::new();
        let mut all = Vec::new();

        for cfg in configs {
            let domains_label = cfg.domains.join(",");
            let issuer = load_one(cfg, &domains_label)?;
            let issuer = Arc::new(issuer);

            for domain in &issuer.domains {
                if by_domain.insert(domain.clone(), Arc::clone(&issuer)).is_some() {
                    return Err(IssuerLoadError::DuplicateDomain { domain: domain.clone() });
                }
            }
            all.push(issuer);
        }

        Ok(Self { by_domain, all })
    }

    pub fn get(&self, domain: &str) -> Option<Arc<Issuer>> {
        self.by_domain.get(domain).cloned()
    }

    pub fn list(&self) -> &[Arc<Issuer>] {
        &self.all
    }
}

fn load_one(cfg: &IssuerConfig, domains_label: &str) -> Result<Issuer, IssuerLoadError> {
    let read = |path: &str| -> Result<String, IssuerLoadError> {
        fs::read_to_string(path).map_err(|e| IssuerLoadError::ReadFile { path: path.into(), source: e })
    };

    let cert_pem = read(&cfg.issuing_ca_cert)?;
    let key_pem = read(&cfg.issuing_ca_key)?;

    let sig_alg = sigalg::SigAlg::resolve(cfg.signature_algorithm.as_deref(), &key_pem);
    let signing_key = SigningKey::from_pkcs8_pem(&key_pem, sig_alg)
        .map_err(|e| IssuerLoadError::ParseCert { domains: domains_label.into(), source: e })?;

    let key_pair = KeyPair::from_pem(&key_pem)
        .map_err(|e| IssuerLoadError::Rcgen { domains: domains_label.into(), source: e })?;
    let params = CertificateParams::from_ca_cert_pem(&cert_pem, key_pair)
        .map_err(|e| IssuerLoadError::Rcgen { domains: domains_label.into(), source: e })?;
    let signer = Certificate::from_params(params)
        .map_err(|e| IssuerLoadError::Rcgen { domains: domains_label.into(), source: e })?;
    let cert_der = signer
        .serialize_der()
        .map_err(|e| IssuerLoadError::Rcgen { domains: domains_label.into(), source: e })?;

    let (_, parsed) = X509Certificate::from_der(&cert_der).map_err(|e| IssuerLoadError::ParseCert {
        domains: domains_label.into(),
        source: anyhow::anyhow!("{e}"),
    })?;

    let spki_raw = parsed.public_key().raw.to_vec();
    let subject_raw = parsed.subject().as_raw().to_vec();
    let issuer_key_hash = canonical_issuer_hash(&spki_raw);
    let issuer_name_hash = canonical_issuer_hash(&subject_raw);

    let mut chain_by_ski = HashMap::new();
    for (index, path) in cfg.root_ca_chain.iter().enumerate() {
        let root_pem = read(path)?;
        let (_, root_pem_block) = parse_x509_pem(root_pem.as_bytes()).map_err(|e| IssuerLoadError::ParseCert {
            domains: domains_label.into(),
            source: anyhow::anyhow!("{e}"),
        })?;
        let (_, root) = X509Certificate::from_der(&root_pem_block.contents).map_err(|e| IssuerLoadError::ParseCert {
            domains: domains_label.into(),
            source: anyhow::anyhow!("{e}"),
        })?;
        if !root.is_ca() {
            return Err(IssuerLoadError::RootNotCa { domains: domains_label.into(), index });
        }
        let ski = root
            .get_extension_unique(&oid_registry::OID_X509_EXT_SUBJECT_KEY_IDENTIFIER)
            .ok()
            .flatten()
            .ok_or_else(|| IssuerLoadError::MissingSki { domains: domains_label.into() })?;
        chain_by_ski.insert(hex_ski(ski.value), root_pem_block.contents.clone());
    }

    Ok(Issuer {
        domains: cfg.domains.clone(),
        default_expire_days: cfg.default_expire_days,
        issuing_certificate_urls: cfg.issuing_certificate_urls.clone(),
        ocsp_server_urls: cfg.ocsp_server_urls.clone(),
        crl_distribution_point_urls: cfg.crl_distribution_point_urls.clone(),
        certificate_policies_urls: cfg.certificate_policies_urls.clone(),
        cert_der,
        cert_pem,
        signer,
        signing_key,
        issuer_key_hash,
        issuer_name_hash,
        spki_raw,
        subject_raw,
        chain_by_ski,
    })
}
