//! DER encoders for the PKIX extensions rcgen has no first-class support
//! for (Authority Information Access, CRL Distribution Points,
//! Certificate Policies). Built with the `der` crate's low-level ASN.1
//! primitives and handed to `rcgen::CustomExtension::from_oid_content`.

use der::{
    asn1::{Ia5String, ObjectIdentifier},
    Encode,
};

const OID_CRL_DISTRIBUTION_POINTS: &str = "2.5.29.31";
const OID_AUTHORITY_INFO_ACCESS: &str = "1.3.6.1.5.5.7.1.1";
const OID_CERTIFICATE_POLICIES: &str = "2.5.29.32";
const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_AD_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";
const OID_ANY_POLICY: &str = "2.5.29.32.0";

/// GeneralName ::= CHOICE { ... uniformResourceIdentifier [6] IA5String ... }
/// encoded directly as an implicit-tagged IA5String, context tag [6].
fn uri_general_name(uri: &str) -> der::Result<Vec<u8>> {
    let ia5 = Ia5String::new(uri)?;
    let mut content = Vec::new();
    ia5.encode_to_vec(&mut content)?;
    // Re-tag the IA5String's content octets as [6] IMPLICIT.
    let inner = ia5.as_bytes();
    let mut out = Vec::with_capacity(inner.len() + 4);
    out.push(0x86); // context-specific, primitive, tag 6
    encode_len(&mut out, inner.len());
    out.extend_from_slice(inner);
    Ok(out)
}

fn encode_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        let significant = &bytes[first_nonzero..];
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(significant);
    }
}

fn wrap(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    encode_len(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

/// CRLDistributionPoints ::= SEQUENCE SIZE (1..MAX) OF DistributionPoint
/// DistributionPoint ::= SEQUENCE { distributionPoint [0] DistributionPointName }
/// DistributionPointName ::= CHOICE { fullName [0] GeneralNames }
pub fn crl_distribution_points(urls: &[String]) -> der::Result<Vec<u8>> {
    let mut points = Vec::new();
    for url in urls {
        let name = uri_general_name(url)?;
        let full_name = wrap(0xA0, &name); // [0] GeneralNames
        let dp_name = wrap(0xA0, &full_name); // [0] DistributionPointName
        points.push(wrap(0x30, &dp_name)); // SEQUENCE DistributionPoint
    }
    let body: Vec<u8> = points.concat();
    Ok(wrap(0x30, &body))
}

/// AuthorityInfoAccessSyntax ::= SEQUENCE SIZE (1..MAX) OF AccessDescription
/// AccessDescription ::= SEQUENCE { accessMethod OBJECT IDENTIFIER, accessLocation GeneralName }
pub fn authority_info_access(ocsp_urls: &[String], ca_issuer_urls: &[String]) -> der::Result<Vec<u8>> {
    let mut descriptions = Vec::new();
    for url in ocsp_urls {
        descriptions.push(access_description(OID_AD_OCSP, url)?);
    }
    for url in ca_issuer_urls {
        descriptions.push(access_description(OID_AD_CA_ISSUERS, url)?);
    }
    let body: Vec<u8> = descriptions.concat();
    Ok(wrap(0x30, &body))
}

fn access_description(method_oid: &str, uri: &str) -> der::Result<Vec<u8>> {
    let oid = ObjectIdentifier::new(method_oid)?;
    let mut oid_bytes = Vec::new();
    oid.encode_to_vec(&mut oid_bytes)?;
    let name = uri_general_name(uri)?;
    let mut content = oid_bytes;
    content.extend_from_slice(&name);
    Ok(wrap(0x30, &content))
}

/// CertificatePolicies ::= SEQUENCE SIZE (1..MAX) OF PolicyInformation
/// PolicyInformation ::= SEQUENCE { policyIdentifier CertPolicyId,
///   policyQualifiers SEQUENCE OF PolicyQualifierInfo OPTIONAL }
/// PolicyQualifierInfo ::= SEQUENCE { policyQualifierId OID, qualifier CPSuri }
pub fn certificate_policies(urls: &[String]) -> der::Result<Vec<u8>> {
    const OID_CPS: &str = "1.3.6.1.5.5.7.2.1";
    let mut policy_oid_bytes = Vec::new();
    ObjectIdentifier::new(OID_ANY_POLICY)?.encode_to_vec(&mut policy_oid_bytes)?;

    let mut qualifiers = Vec::new();
    for url in urls {
        let mut cps_oid = Vec::new();
        ObjectIdentifier::new(OID_CPS)?.encode_to_vec(&mut cps_oid)?;
        let cps_uri = Ia5String::new(url)?;
        let mut cps_uri_der = Vec::new();
        cps_uri.encode_to_vec(&mut cps_uri_der)?;
        let mut qualifier_info = cps_oid;
        qualifier_info.extend_from_slice(&cps_uri_der);
        qualifiers.push(wrap(0x30, &qualifier_info));
    }

    let mut policy_info = policy_oid_bytes;
    if !qualifiers.is_empty() {
        let qualifiers_body: Vec<u8> = qualifiers.concat();
        policy_info.extend_from_slice(&wrap(0x30, &qualifiers_body));
    }

    let policy_information = wrap(0x30, &policy_info);
    Ok(wrap(0x30, &policy_information))
}

pub const EXT_OID_CRL_DISTRIBUTION_POINTS: &str = OID_CRL_DISTRIBUTION_POINTS;
pub const EXT_OID_AUTHORITY_INFO_ACCESS: &str = OID_AUTHORITY_INFO_ACCESS;
pub const EXT_OID_CERTIFICATE_POLICIES: &str = OID_CERTIFICATE_POLICIES;
