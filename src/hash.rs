//! Canonical hashing helpers for certificate fingerprints and the
//! OCSP/CRL issuer-key/issuer-name hashes.
//!
//! The issuer-key and issuer-name hashes are fixed to SHA-1 for
//! interoperability with deployed OCSP/CRL consumers (RFC 6960 §4.2.1);
//! the certificate fingerprint uses SHA-256. OCSP requests can name any
//! of SHA-1/256/384/512 for their own `CertID.hashAlgorithm`, hence
//! `digest_by_oid`.

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// hex(SHA-256(DER(cert))).
pub fn fingerprint_sha256(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hex::encode(hasher.finalize())
}

/// Raw SHA-1 digest (20 bytes), for callers that need the bytes rather
/// than the hex string (e.g. an OCSP `ResponderId::ByKey`).
pub fn sha1_digest(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().to_vec()
}

/// hex(SHA-1(bytes)) — the fixed canonical hash for issuer-key-hash and
/// issuer-name-hash computations.
pub fn canonical_issuer_hash(bytes: &[u8]) -> String {
    hex::encode(sha1_digest(bytes))
}

/// Digests `bytes` under the hash algorithm named by `oid` (dotted
/// string form), covering the SHA-1/256/384/512 OIDs an OCSP `CertID`
/// can carry. `None` for anything else.
pub fn digest_by_oid(oid: &str, bytes: &[u8]) -> Option<Vec<u8>> {
    match oid {
        "1.3.14.3.2.26" => Some(sha1_digest(bytes)),
        "2.16.840.1.101.3.4.2.1" => {
            let mut h = Sha256::new();
            h.update(bytes);
            Some(h.finalize().to_vec())
        }
        "2.16.840.1.101.3.4.2.2" => {
            let mut h = Sha384::new();
            h.update(bytes);
            Some(h.finalize().to_vec())
        }
        "2.16.840.1.101.3.4.2.3" => {
            let mut h = Sha512::new();
            h.update(bytes);
            Some(h.finalize().to_vec())
        }
        _ => None,
    }
}

/// hex(SubjectKeyId) used to index a root chain for lookup.
pub fn hex_ski(ski: &[u8]) -> String {
    hex::encode(ski)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_sensitive_to_input() {
        let a = fingerprint_sha256(b"certificate-a");
        let b = fingerprint_sha256(b"certificate-a");
        let c = fingerprint_sha256(b"certificate-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn canonical_issuer_hash_is_sha1_length() {
        let hash = canonical_issuer_hash(b"issuer-public-key");
        assert_eq!(hash.len(), 40);
    }

    #[test]
    fn digest_by_oid_dispatches_known_algorithms_and_rejects_unknown() {
        assert_eq!(digest_by_oid("1.3.14.3.2.26", b"x").unwrap().len(), 20);
        assert_eq!(digest_by_oid("2.16.840.1.101.3.4.2.1", b"x").unwrap().len(), 32);
        assert_eq!(digest_by_oid("2.16.840.1.101.3.4.2.2", b"x").unwrap().len(), 48);
        assert_eq!(digest_by_oid("2.16.840.1.101.3.4.2.3", b"x").unwrap().len(), 64);
        assert!(digest_by_oid("1.2.3.4", b"x").is_none());
    }
}
