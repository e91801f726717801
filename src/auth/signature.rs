//! Decodes the `X-Signature` header and verifies the keyed MAC over the
//! raw request body.
//!
//! Header shape:
//! `X-Signature: id=<token_id-uuid>,alg=<hmac-sha1|hmac-sha256|hmac-sha512>,sig=<hex(mac)>`.
//! `ring::hmac` does the actual verification; it runs the comparison in
//! constant time so there's no separate constant-time-compare step here.

use ring::hmac;
use uuid::Uuid;

pub struct ParsedSignature {
    pub token_id: Uuid,
    pub algorithm: hmac::Algorithm,
    pub mac: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing X-Signature header")]
    Missing,
    #[error("malformed X-Signature header")]
    Malformed,
    #[error("unsupported alg {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid token id")]
    InvalidTokenId,
    #[error("invalid hex in sig field")]
    InvalidHex,
}

pub fn parse(header_value: &str) -> Result<ParsedSignature, SignatureError> {
    let mut id: Option<&str> = None;
    let mut alg: Option<&str> = None;
    let mut sig: Option<&str> = None;

    for field in header_value.split(',') {
        let (key, value) = field.split_once('=').ok_or(SignatureError::Malformed)?;
        match key.trim() {
            "id" => id = Some(value.trim()),
            "alg" => alg = Some(value.trim()),
            "sig" => sig = Some(value.trim()),
            _ => {}
        }
    }

    let id = id.ok_or(SignatureError::Malformed)?;
    let alg = alg.ok_or(SignatureError::Malformed)?;
    let sig = sig.ok_or(SignatureError::Malformed)?;

    let token_id = Uuid::parse_str(id).map_err(|_| SignatureError::InvalidTokenId)?;
    let algorithm = match alg {
        "hmac-sha1" => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
        "hmac-sha256" => hmac::HMAC_SHA256,
        "hmac-sha512" => hmac::HMAC_SHA512,
        other => return Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
    };
    let mac = hex::decode(sig).map_err(|_| SignatureError::InvalidHex)?;

    Ok(ParsedSignature { token_id, algorithm, mac })
}

pub fn verify(algorithm: hmac::Algorithm, key: &[u8], body: &[u8], mac: &[u8]) -> bool {
    let key = hmac::Key::new(algorithm, key);
    hmac::verify(&key, body, mac).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_header() {
        let id = Uuid::new_v4();
        let header = format!("id={id},alg=hmac-sha256,sig=deadbeef");
        let parsed = parse(&header).unwrap();
        assert_eq!(parsed.token_id, id);
        assert_eq!(parsed.mac, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let id = Uuid::new_v4();
        let header = format!("id={id},alg=hmac-md5,sig=ab");
        assert!(matches!(parse(&header), Err(SignatureError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn round_trips_hmac_sha256() {
        let key_bytes = b"s3cr";
        let body = b"{\"force\":false}";
        let key = hmac::Key::new(hmac::HMAC_SHA256, key_bytes);
        let tag = hmac::sign(&key, body);
        assert!(verify(hmac::HMAC_SHA256, key_bytes, body, tag.as_ref()));
        assert!(!verify(hmac::HMAC_SHA256, key_bytes, b"tampered", tag.as_ref()));
    }
}
