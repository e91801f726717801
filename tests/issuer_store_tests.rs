//! Integration tests for loading an `IssuerStore` from on-disk PEM
//! bundles, the way `pki-server` does at startup.

use casper_pki::config::IssuerConfig;
use casper_pki::issuer::IssuerStore;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyUsagePurpose};
use tempfile::tempdir;

fn self_signed_ca(common_name: &str) -> (String, String) {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    let cert = Certificate::from_params(params).expect("building self-signed ca params");
    let cert_pem = cert.serialize_pem().expect("serializing ca cert");
    let key_pem = cert.serialize_private_key_pem();
    (cert_pem, key_pem)
}

fn write_bundle(dir: &std::path::Path, name: &str, cert_pem: &str, key_pem: &str) -> (String, String) {
    let cert_path = dir.join(format!("{name}.crt"));
    let key_path = dir.join(format!("{name}.key"));
    std::fs::write(&cert_path, cert_pem).unwrap();
    std::fs::write(&key_path, key_pem).unwrap();
    (cert_path.to_string_lossy().into_owned(), key_path.to_string_lossy().into_owned())
}

fn base_config(issuing_ca_cert: String, issuing_ca_key: String, domains: Vec<String>) -> IssuerConfig {
    IssuerConfig {
        root_ca_chain: Vec::new(),
        issuing_ca_cert,
        issuing_ca_key,
        domains,
        default_expire_days: 90,
        signature_algorithm: None,
        issuing_certificate_urls: vec!["http://ca.example.com/ca.crt".into()],
        ocsp_server_urls: vec!["http://ca.example.com/ocsp".into()],
        crl_distribution_point_urls: vec!["http://ca.example.com/crl".into()],
        certificate_policies_urls: vec![],
    }
}

#[test]
fn loads_single_issuer_and_indexes_by_domain() {
    let dir = tempdir().unwrap();
    let (cert_pem, key_pem) = self_signed_ca("Example Issuing CA");
    let (cert_path, key_path) = write_bundle(dir.path(), "issuer", &cert_pem, &key_pem);

    let config = base_config(cert_path, key_path, vec!["example.com".into()]);
    let store = IssuerStore::load(&[config]).expect("loading issuer store");

    assert!(store.get("example.com").is_some());
    assert!(store.get("other.com").is_none());
    assert_eq!(store.list().len(), 1);
}

#[test]
fn rejects_duplicate_domain_across_issuers() {
    let dir = tempdir().unwrap();
    let (cert_pem_a, key_pem_a) = self_signed_ca("Issuer A");
    let (cert_pem_b, key_pem_b) = self_signed_ca("Issuer B");
    let (cert_path_a, key_path_a) = write_bundle(dir.path(), "a", &cert_pem_a, &key_pem_a);
    let (cert_path_b, key_path_b) = write_bundle(dir.path(), "b", &cert_pem_b, &key_pem_b);

    let configs = vec![
        base_config(cert_path_a, key_path_a, vec!["shared.com".into()]),
        base_config(cert_path_b, key_path_b, vec!["shared.com".into()]),
    ];

    let err = IssuerStore::load(&configs).unwrap_err();
    assert!(matches!(err, casper_pki::issuer::IssuerLoadError::DuplicateDomain { .. }));
}

#[test]
fn rejects_empty_configuration() {
    let err = IssuerStore::load(&[]).unwrap_err();
    assert!(matches!(err, casper_pki::issuer::IssuerLoadError::Empty));
}
