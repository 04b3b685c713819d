//! Decoding of issued artifacts.
//!
//! An issued artifact is the content of the secret named by a certificate's
//! `secret_name`: a PEM chain under `tls.crt` (leaf first), a PEM private key
//! under `tls.key` and an optional PEM CA bundle under `ca.crt`.
//!
//! Decoding never fails. Every problem is recorded in
//! [`IssuedArtifact::problems`] so that the `artifact-well-formed` validator
//! can report it, while validators needing a missing part report their own
//! failure.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use certconform_core::types::{
    CA_CERT_KEY, KeyAlgorithm, KeyUsage, Secret, TLS_CERT_KEY, TLS_KEY_KEY,
};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::oid_registry::{
    OID_KEY_TYPE_EC_PUBLIC_KEY, OID_PKCS1_RSAENCRYPTION, OID_SIG_ED25519,
};
use x509_parser::pem::Pem;

const OID_COMMON_NAME: &str = "2.5.4.3";
const OID_ORGANIZATION: &str = "2.5.4.10";

/// Short attribute names used when comparing subjects.
const SUBJECT_ATTRIBUTE_NAMES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.5", "SERIALNUMBER"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "STREET"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("2.5.4.17", "POSTALCODE"),
];

/// Owned view of one parsed X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCertificate {
    /// DER encoding, kept for signature checks.
    pub der: Vec<u8>,
    /// Human readable subject.
    pub subject: String,
    /// Subject attributes as `(short name, value)` in encoding order.
    pub subject_attributes: Vec<(String, String)>,
    pub issuer: String,
    pub common_name: Option<String>,
    pub organizations: Vec<String>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub email_addresses: Vec<String>,
    pub uris: Vec<String>,
    /// Unix seconds.
    pub not_before: i64,
    /// Unix seconds.
    pub not_after: i64,
    pub is_ca: bool,
    pub key_usages: Vec<KeyUsage>,
    /// Algorithm of the subject public key, if recognised.
    pub key_algorithm: Option<KeyAlgorithm>,
    /// Raw subject public key bits.
    pub public_key: Vec<u8>,
}

impl DecodedCertificate {
    fn from_x509(der: &[u8], cert: &X509Certificate<'_>) -> Result<Self, String> {
        let subject_attributes: Vec<(String, String)> = cert
            .subject()
            .iter_attributes()
            .map(|attr| {
                let oid = attr.attr_type().to_id_string();
                let name = SUBJECT_ATTRIBUTE_NAMES
                    .iter()
                    .find(|(id, _)| *id == oid)
                    .map(|(_, short)| (*short).to_owned())
                    .unwrap_or(oid);
                let value = attr.as_str().unwrap_or_default().to_owned();
                (name, value)
            })
            .collect();

        let attribute_values = |oid: &str| -> Vec<String> {
            cert.subject()
                .iter_attributes()
                .filter(|attr| attr.attr_type().to_id_string() == oid)
                .filter_map(|attr| attr.as_str().ok().map(str::to_owned))
                .collect()
        };

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        let mut email_addresses = Vec::new();
        let mut uris = Vec::new();
        let san = cert
            .subject_alternative_name()
            .map_err(|e| format!("invalid subjectAltName extension: {e}"))?;
        if let Some(san) = san {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push((*dns).to_owned()),
                    GeneralName::RFC822Name(email) => email_addresses.push((*email).to_owned()),
                    GeneralName::URI(uri) => uris.push((*uri).to_owned()),
                    GeneralName::IPAddress(bytes) => ip_addresses.push(ip_from_bytes(bytes)?),
                    _ => {}
                }
            }
        }

        let is_ca = cert
            .basic_constraints()
            .map_err(|e| format!("invalid basicConstraints extension: {e}"))?
            .is_some_and(|bc| bc.value.ca);

        let mut key_usages = Vec::new();
        if let Some(ku) = cert
            .key_usage()
            .map_err(|e| format!("invalid keyUsage extension: {e}"))?
        {
            let ku = ku.value;
            for (set, usage) in [
                (ku.digital_signature(), KeyUsage::DigitalSignature),
                (ku.key_encipherment(), KeyUsage::KeyEncipherment),
                (ku.key_agreement(), KeyUsage::KeyAgreement),
                (ku.key_cert_sign(), KeyUsage::CertSign),
                (ku.crl_sign(), KeyUsage::CrlSign),
            ] {
                if set {
                    key_usages.push(usage);
                }
            }
        }
        if let Some(eku) = cert
            .extended_key_usage()
            .map_err(|e| format!("invalid extendedKeyUsage extension: {e}"))?
        {
            if eku.value.server_auth {
                key_usages.push(KeyUsage::ServerAuth);
            }
            if eku.value.client_auth {
                key_usages.push(KeyUsage::ClientAuth);
            }
        }

        let spki = cert.public_key();
        let key_oid = &spki.algorithm.algorithm;
        let key_algorithm = if *key_oid == OID_PKCS1_RSAENCRYPTION {
            Some(KeyAlgorithm::Rsa)
        } else if *key_oid == OID_KEY_TYPE_EC_PUBLIC_KEY {
            Some(KeyAlgorithm::Ecdsa)
        } else if *key_oid == OID_SIG_ED25519 {
            Some(KeyAlgorithm::Ed25519)
        } else {
            None
        };

        Ok(Self {
            der: der.to_vec(),
            subject: cert.subject().to_string(),
            subject_attributes,
            issuer: cert.issuer().to_string(),
            common_name: attribute_values(OID_COMMON_NAME).into_iter().next(),
            organizations: attribute_values(OID_ORGANIZATION),
            dns_names,
            ip_addresses,
            email_addresses,
            uris,
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            is_ca,
            key_usages,
            key_algorithm,
            public_key: spki.subject_public_key.data.to_vec(),
        })
    }

    /// Re-parses the stored DER encoding.
    pub fn parse(&self) -> Result<X509Certificate<'_>, String> {
        x509_parser::parse_x509_certificate(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| e.to_string())
    }

    /// Validity period in seconds.
    pub fn validity_secs(&self) -> i64 {
        self.not_after - self.not_before
    }
}

/// Private key decoded from `tls.key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPrivateKey {
    /// Raw PEM bytes as stored in the secret.
    pub pem: Vec<u8>,
    /// Raw public key bits derived from the private key.
    pub public_key: Vec<u8>,
}

/// The decoded content of an issuance secret.
#[derive(Debug, Clone, Default)]
pub struct IssuedArtifact {
    /// Certificate chain from `tls.crt`, leaf first.
    pub chain: Vec<DecodedCertificate>,
    pub private_key: Option<DecodedPrivateKey>,
    /// CA bundle from `ca.crt`.
    pub ca: Vec<DecodedCertificate>,
    /// Decoding problems, in the order they were found.
    pub problems: Vec<String>,
}

impl IssuedArtifact {
    /// Decodes an issuance secret, recording rather than raising problems.
    pub fn decode(secret: &Secret) -> Self {
        let mut artifact = Self::default();

        match secret.payload(TLS_CERT_KEY) {
            Some(bytes) => {
                artifact.chain = decode_certificates(TLS_CERT_KEY, bytes, &mut artifact.problems);
                if artifact.chain.is_empty() {
                    artifact
                        .problems
                        .push(format!("{TLS_CERT_KEY} contains no certificate"));
                }
            }
            None => artifact
                .problems
                .push(format!("{TLS_CERT_KEY} is missing or empty")),
        }

        match secret.payload(TLS_KEY_KEY) {
            Some(bytes) => match decode_private_key(bytes) {
                Ok(key) => artifact.private_key = Some(key),
                Err(reason) => artifact
                    .problems
                    .push(format!("{TLS_KEY_KEY} is not a usable private key: {reason}")),
            },
            None => artifact
                .problems
                .push(format!("{TLS_KEY_KEY} is missing or empty")),
        }

        if let Some(bytes) = secret.payload(CA_CERT_KEY) {
            artifact.ca = decode_certificates(CA_CERT_KEY, bytes, &mut artifact.problems);
        }

        artifact
    }

    /// The leaf certificate, if one was decoded.
    pub fn leaf(&self) -> Option<&DecodedCertificate> {
        self.chain.first()
    }

    pub fn is_well_formed(&self) -> bool {
        self.problems.is_empty()
    }
}

fn decode_certificates(
    field: &str,
    bytes: &[u8],
    problems: &mut Vec<String>,
) -> Vec<DecodedCertificate> {
    let mut certs = Vec::new();
    for (idx, pem) in Pem::iter_from_buffer(bytes).enumerate() {
        let pem = match pem {
            Ok(pem) => pem,
            Err(e) => {
                problems.push(format!("{field}: PEM block {idx} is malformed: {e}"));
                break;
            }
        };
        if pem.label != "CERTIFICATE" {
            problems.push(format!(
                "{field}: PEM block {idx} has label '{}', expected CERTIFICATE",
                pem.label
            ));
            continue;
        }
        let decoded = pem
            .parse_x509()
            .map_err(|e| e.to_string())
            .and_then(|cert| DecodedCertificate::from_x509(&pem.contents, &cert));
        match decoded {
            Ok(cert) => certs.push(cert),
            Err(reason) => problems.push(format!("{field}: certificate {idx}: {reason}")),
        }
    }
    certs
}

fn decode_private_key(bytes: &[u8]) -> Result<DecodedPrivateKey, String> {
    let pem = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    let key_pair = rcgen::KeyPair::from_pem(pem).map_err(|e| e.to_string())?;
    Ok(DecodedPrivateKey {
        pem: bytes.to_vec(),
        public_key: key_pair.public_key_raw().to_vec(),
    })
}

fn ip_from_bytes(bytes: &[u8]) -> Result<IpAddr, String> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::V4(Ipv4Addr::from(octets)));
    }
    if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        return Ok(IpAddr::V6(Ipv6Addr::from(octets)));
    }
    Err(format!("IP address SAN has invalid length {}", bytes.len()))
}
