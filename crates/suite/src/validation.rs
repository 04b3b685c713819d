//! Validators and the validation composer.
//!
//! A [`Validator`] is a named pure check run against the finalized
//! certificate resource and its decoded artifact. [`compose`] maps the set of
//! capabilities a backend declared unsupported to the ordered list of
//! validators that apply to it. [`run_validators`] runs all of them and
//! collects every failure.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use certconform_core::capability::{Capability, CapabilitySet};
use certconform_core::metrics as m;
use certconform_core::types::{Certificate, ConditionKind, ConditionStatus, KeyUsage};

use crate::artifact::{DecodedCertificate, IssuedArtifact};
use crate::error::{ValidationError, ValidationFailures};

/// Validity applied by backends when the request does not name one.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Accepted difference between requested and issued validity.
pub const DURATION_TOLERANCE: Duration = Duration::from_secs(60);

/// Signature of a validator check.
pub type CheckFn = fn(&Certificate, &IssuedArtifact) -> Result<(), ValidationError>;

/// A named, stateless assertion.
#[derive(Clone, Copy)]
pub struct Validator {
    pub name: &'static str,
    pub check: CheckFn,
}

impl Validator {
    pub const fn new(name: &'static str, check: CheckFn) -> Self {
        Self { name, check }
    }

    pub fn run(
        &self,
        certificate: &Certificate,
        artifact: &IssuedArtifact,
    ) -> Result<(), ValidationError> {
        (self.check)(certificate, artifact)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.name).finish()
    }
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Validator {}

// --- baseline ---

pub const ARTIFACT_WELL_FORMED: Validator =
    Validator::new("artifact-well-formed", artifact_well_formed);
pub const COMMON_NAME_MATCHES: Validator =
    Validator::new("common-name-matches", common_name_matches);
pub const DNS_NAMES_MATCH: Validator = Validator::new("dns-names-match", dns_names_match);
pub const ORGANIZATION_MATCHES: Validator =
    Validator::new("organization-matches", organization_matches);
pub const EXPIRY_MATCHES_STATUS: Validator =
    Validator::new("expiry-matches-status", expiry_matches_status);
pub const READY_CONDITION_CURRENT: Validator =
    Validator::new("ready-condition-current", ready_condition_current);
pub const PRIVATE_KEY_MATCHES: Validator =
    Validator::new("private-key-matches", private_key_matches);
pub const BASIC_CONSTRAINTS_MATCH: Validator =
    Validator::new("basic-constraints-match", basic_constraints_match);

// --- capability gated ---

pub const URIS_MATCH: Validator = Validator::new("uris-match", uris_match);
pub const EMAILS_MATCH: Validator = Validator::new("emails-match", emails_match);
pub const IP_ADDRESSES_MATCH: Validator = Validator::new("ip-addresses-match", ip_addresses_match);
pub const DURATION_MATCHES: Validator = Validator::new("duration-matches", duration_matches);
pub const TRUST_CHAIN_VALID: Validator = Validator::new("trust-chain-valid", trust_chain_valid);
pub const ROOT_CA_VALID: Validator = Validator::new("root-ca-valid", root_ca_valid);

// --- scenario specific ---

pub const LITERAL_SUBJECT_MATCHES: Validator =
    Validator::new("literal-subject-matches", literal_subject_matches);
pub const KEY_USAGES_MATCH: Validator = Validator::new("key-usages-match", key_usages_match);
pub const IS_CA: Validator = Validator::new("is-ca", is_ca);

/// Validators applied to every issued artifact, in order.
pub const BASELINE: [Validator; 8] = [
    ARTIFACT_WELL_FORMED,
    COMMON_NAME_MATCHES,
    DNS_NAMES_MATCH,
    ORGANIZATION_MATCHES,
    EXPIRY_MATCHES_STATUS,
    READY_CONDITION_CURRENT,
    PRIVATE_KEY_MATCHES,
    BASIC_CONSTRAINTS_MATCH,
];

/// Validators dropped when their capability is declared unsupported.
const GATED: [(Capability, Validator); 4] = [
    (Capability::UriSans, URIS_MATCH),
    (Capability::EmailSans, EMAILS_MATCH),
    (Capability::IpAddresses, IP_ADDRESSES_MATCH),
    (Capability::Duration, DURATION_MATCHES),
];

/// Returns the ordered validators applicable to a backend lacking `unsupported`.
///
/// `root-ca-valid` is only reachable through `trust-chain-valid`: a backend
/// that does not store its CA gets neither check, whatever it says about the
/// root.
pub fn compose(unsupported: &CapabilitySet) -> Vec<Validator> {
    let mut validators = BASELINE.to_vec();
    for (capability, validator) in GATED {
        if !unsupported.contains(capability) {
            validators.push(validator);
        }
    }
    if !unsupported.contains(Capability::SaveCaToSecret) {
        validators.push(TRUST_CHAIN_VALID);
        if !unsupported.contains(Capability::SaveRootCaToSecret) {
            validators.push(ROOT_CA_VALID);
        }
    }
    validators
}

/// Runs every validator and collects all failures.
pub fn run_validators(
    validators: &[Validator],
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationFailures> {
    let failures: Vec<ValidationError> = validators
        .iter()
        .filter_map(|validator| validator.run(certificate, artifact).err())
        .collect();

    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        metrics::counter!(m::VALIDATION_FAILURES_TOTAL, m::LABEL_VALIDATOR => failure.validator)
            .increment(1);
    }
    Err(ValidationFailures(failures))
}

fn leaf<'a>(
    validator: &'static str,
    artifact: &'a IssuedArtifact,
) -> Result<&'a DecodedCertificate, ValidationError> {
    artifact
        .leaf()
        .ok_or_else(|| ValidationError::new(validator, "a decodable leaf certificate", "none"))
}

fn sorted<T: Ord + Clone>(items: &[T]) -> Vec<T> {
    items
        .iter()
        .cloned()
        .collect::<BTreeSet<T>>()
        .into_iter()
        .collect()
}

fn compare_sets<T: Ord + Clone + fmt::Debug>(
    validator: &'static str,
    expected: &[T],
    actual: &[T],
) -> Result<(), ValidationError> {
    let expected = sorted(expected);
    let actual = sorted(actual);
    if expected == actual {
        Ok(())
    } else {
        Err(ValidationError::new(
            validator,
            format!("{expected:?}"),
            format!("{actual:?}"),
        ))
    }
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("@{secs}"))
}

fn artifact_well_formed(_: &Certificate, artifact: &IssuedArtifact) -> Result<(), ValidationError> {
    if artifact.is_well_formed() {
        Ok(())
    } else {
        Err(ValidationError::new(
            "artifact-well-formed",
            "decodable tls.crt and tls.key",
            artifact.problems.join("; "),
        ))
    }
}

fn common_name_matches(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "common-name-matches";
    // literal subjects are checked as a whole by literal-subject-matches
    if certificate.spec.literal_subject.is_some() {
        return Ok(());
    }
    let Some(expected) = &certificate.spec.common_name else {
        return Ok(());
    };
    let leaf = leaf(NAME, artifact)?;
    if leaf.common_name.as_deref() == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new(
            NAME,
            expected.clone(),
            format!("{:?}", leaf.common_name),
        ))
    }
}

fn dns_names_match(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "dns-names-match";
    let leaf = leaf(NAME, artifact)?;
    compare_sets(NAME, &certificate.spec.dns_names, &leaf.dns_names)
}

fn organization_matches(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "organization-matches";
    if certificate.spec.literal_subject.is_some() {
        return Ok(());
    }
    let leaf = leaf(NAME, artifact)?;
    compare_sets(NAME, &certificate.spec.organizations, &leaf.organizations)
}

fn expiry_matches_status(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "expiry-matches-status";
    let leaf = leaf(NAME, artifact)?;
    let status = &certificate.status;
    if status.not_after != Some(leaf.not_after) {
        return Err(ValidationError::new(
            NAME,
            format!("status notAfter {}", format_timestamp(leaf.not_after)),
            status
                .not_after
                .map_or_else(|| "none".to_owned(), format_timestamp),
        ));
    }
    if let Some(not_before) = status.not_before {
        if not_before != leaf.not_before {
            return Err(ValidationError::new(
                NAME,
                format!("status notBefore {}", format_timestamp(leaf.not_before)),
                format_timestamp(not_before),
            ));
        }
    }
    Ok(())
}

fn ready_condition_current(
    certificate: &Certificate,
    _: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "ready-condition-current";
    let generation = certificate.metadata.generation;
    match certificate.condition(ConditionKind::Ready) {
        Some(c) if c.status == ConditionStatus::True && c.observed_generation == generation => {
            Ok(())
        }
        Some(c) => Err(ValidationError::new(
            NAME,
            format!("Ready=True at generation {generation}"),
            format!("Ready={:?} at generation {}", c.status, c.observed_generation),
        )),
        None => Err(ValidationError::new(
            NAME,
            format!("Ready=True at generation {generation}"),
            "no Ready condition",
        )),
    }
}

fn private_key_matches(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "private-key-matches";
    let leaf = leaf(NAME, artifact)?;
    let Some(key) = &artifact.private_key else {
        return Err(ValidationError::new(NAME, "a decodable private key", "none"));
    };
    if key.public_key != leaf.public_key {
        return Err(ValidationError::new(
            NAME,
            "private key matching the certificate public key",
            "a different key",
        ));
    }
    let requested = certificate.spec.private_key.algorithm;
    if leaf.key_algorithm != Some(requested) {
        return Err(ValidationError::new(
            NAME,
            format!("{requested} key"),
            leaf.key_algorithm
                .map_or_else(|| "unrecognised key algorithm".to_owned(), |a| format!("{a} key")),
        ));
    }
    Ok(())
}

fn basic_constraints_match(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "basic-constraints-match";
    let leaf = leaf(NAME, artifact)?;
    if leaf.is_ca == certificate.spec.is_ca {
        Ok(())
    } else {
        Err(ValidationError::new(
            NAME,
            format!("CA={}", certificate.spec.is_ca),
            format!("CA={}", leaf.is_ca),
        ))
    }
}

fn uris_match(certificate: &Certificate, artifact: &IssuedArtifact) -> Result<(), ValidationError> {
    const NAME: &str = "uris-match";
    let leaf = leaf(NAME, artifact)?;
    compare_sets(NAME, &certificate.spec.uris, &leaf.uris)
}

fn emails_match(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "emails-match";
    let leaf = leaf(NAME, artifact)?;
    compare_sets(
        NAME,
        &certificate.spec.email_addresses,
        &leaf.email_addresses,
    )
}

fn ip_addresses_match(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "ip-addresses-match";
    let leaf = leaf(NAME, artifact)?;
    let mut expected = Vec::with_capacity(certificate.spec.ip_addresses.len());
    for raw in &certificate.spec.ip_addresses {
        let ip: IpAddr = raw.parse().map_err(|_| {
            ValidationError::new(NAME, "requested IP addresses to be valid", raw.clone())
        })?;
        expected.push(ip);
    }
    compare_sets(NAME, &expected, &leaf.ip_addresses)
}

fn duration_matches(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "duration-matches";
    let leaf = leaf(NAME, artifact)?;
    let expected = certificate.spec.duration.unwrap_or(DEFAULT_DURATION);
    let expected_secs = i64::try_from(expected.as_secs()).unwrap_or(i64::MAX);
    let actual_secs = leaf.validity_secs();
    let tolerance = DURATION_TOLERANCE.as_secs() as i64;
    if (actual_secs - expected_secs).abs() <= tolerance {
        Ok(())
    } else {
        Err(ValidationError::new(
            NAME,
            format!("{expected_secs}s (±{tolerance}s)"),
            format!("{actual_secs}s"),
        ))
    }
}

fn verify_issued_by(
    child: &DecodedCertificate,
    issuer: &DecodedCertificate,
) -> Result<(), String> {
    let child_cert = child.parse()?;
    let issuer_cert = issuer.parse()?;
    child_cert
        .verify_signature(Some(issuer_cert.public_key()))
        .map_err(|e| e.to_string())
}

fn trust_chain_valid(_: &Certificate, artifact: &IssuedArtifact) -> Result<(), ValidationError> {
    const NAME: &str = "trust-chain-valid";
    leaf(NAME, artifact)?;
    let Some(ca) = artifact.ca.first() else {
        return Err(ValidationError::new(NAME, "a CA certificate in ca.crt", "none"));
    };

    for pair in artifact.chain.windows(2) {
        verify_issued_by(&pair[0], &pair[1]).map_err(|reason| {
            ValidationError::new(
                NAME,
                format!("'{}' signed by '{}'", pair[0].subject, pair[1].subject),
                reason,
            )
        })?;
    }
    if let Some(last) = artifact.chain.last() {
        verify_issued_by(last, ca).map_err(|reason| {
            ValidationError::new(
                NAME,
                format!("'{}' signed by ca.crt '{}'", last.subject, ca.subject),
                reason,
            )
        })?;
    }
    Ok(())
}

fn root_ca_valid(_: &Certificate, artifact: &IssuedArtifact) -> Result<(), ValidationError> {
    const NAME: &str = "root-ca-valid";
    let Some(root) = artifact.ca.last() else {
        return Err(ValidationError::new(NAME, "a root CA in ca.crt", "none"));
    };
    if !root.is_ca {
        return Err(ValidationError::new(
            NAME,
            "ca.crt root marked as CA",
            format!("'{}' without CA basic constraint", root.subject),
        ));
    }
    let cert = root
        .parse()
        .map_err(|reason| ValidationError::new(NAME, "a parseable root", reason))?;
    cert.verify_signature(None).map_err(|e| {
        ValidationError::new(
            NAME,
            format!("'{}' to be self-signed", root.subject),
            e.to_string(),
        )
    })
}

/// Splits an RFC 4514 style subject into `(attribute, value)` pairs.
fn parse_literal_subject(subject: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    let mut parts = Vec::new();
    for ch in subject.chars() {
        match ch {
            _ if escaped => {
                current.push(ch);
                escaped = false;
            }
            '\\' => escaped = true,
            ',' | '+' => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);

    for part in parts {
        if let Some((attr, value)) = part.split_once('=') {
            pairs.push((attr.trim().to_ascii_uppercase(), value.trim().to_owned()));
        }
    }
    pairs
}

fn literal_subject_matches(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "literal-subject-matches";
    let Some(literal) = &certificate.spec.literal_subject else {
        return Ok(());
    };
    let leaf = leaf(NAME, artifact)?;
    compare_sets(
        NAME,
        &parse_literal_subject(literal),
        &leaf.subject_attributes,
    )
}

fn key_usages_match(
    certificate: &Certificate,
    artifact: &IssuedArtifact,
) -> Result<(), ValidationError> {
    const NAME: &str = "key-usages-match";
    let leaf = leaf(NAME, artifact)?;
    compare_sets(NAME, &certificate.spec.usages, &leaf.key_usages)
}

fn is_ca(_: &Certificate, artifact: &IssuedArtifact) -> Result<(), ValidationError> {
    const NAME: &str = "is-ca";
    let leaf = leaf(NAME, artifact)?;
    if leaf.is_ca && leaf.key_usages.contains(&KeyUsage::CertSign) {
        Ok(())
    } else {
        Err(ValidationError::new(
            NAME,
            "CA=true with cert sign usage",
            format!("CA={} usages={:?}", leaf.is_ca, leaf.key_usages),
        ))
    }
}
