//! 시나리오 카탈로그와 gating
//!
//! 발급 시나리오는 정적 테이블([`SCENARIOS`])로 정의됩니다. 각 시나리오는
//! 필요한 capability, 순서대로 적용되는 리소스 mutator, 추가 validator,
//! 타임아웃 등급을 가집니다. 수작업 생명주기 절차([`LifecycleProcedure`])도
//! 같은 gate와 같은 등록 경로를 거칩니다.
//!
//! mutator는 순수 함수이며, 케이스마다 달라지는 입력은 [`BuildContext`]뿐입니다.

use std::fmt;
use std::time::Duration;

use certconform_core::capability::{Capability, CapabilitySet};
use certconform_core::types::{
    Certificate, CertificateSpec, CertificateStatus, KeyAlgorithm, KeyUsage, ObjectMeta,
    PrivateKeySpec, TargetRef,
};
use serde::Serialize;

use crate::lifecycle::LifecycleProcedure;
use crate::validation::{IS_CA, KEY_USAGES_MATCH, LITERAL_SUBJECT_MATCHES, Validator};

/// 생성되는 리소스 이름의 접두어
pub const CASE_NAME_PREFIX: &str = "conformance";

/// DNS 레이블 최대 길이
const MAX_LABEL_LEN: usize = 63;

/// 케이스 하나를 만들 때 필요한 입력
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub namespace: String,
    pub domain_suffix: String,
    /// 케이스 실행마다 새로 생성된 고유 접미사
    pub suffix: String,
}

impl BuildContext {
    /// 리소스 이름 (`conformance-<suffix>`)
    pub fn resource_name(&self) -> String {
        format!("{CASE_NAME_PREFIX}-{}", self.suffix)
    }

    /// 기본 호스트 이름 (`<suffix>.<domain>`)
    pub fn host(&self) -> String {
        format!("{}.{}", self.suffix, self.domain_suffix)
    }
}

/// 리소스 mutator: 템플릿에 시나리오별 변경을 적용합니다.
pub type Mutator = fn(Certificate, &BuildContext) -> Certificate;

/// 타임아웃 등급
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutClass {
    /// 발급 한 번
    Standard,
    /// 검증 라운드가 두 번 필요한 시나리오
    Extended,
}

/// 테이블 기반 발급 시나리오
#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    required: &'static [Capability],
    pub mutators: &'static [Mutator],
    pub extra_validators: &'static [Validator],
    pub timeout: TimeoutClass,
}

impl Scenario {
    /// 이 시나리오가 필요로 하는 capability
    pub fn required(&self) -> CapabilitySet {
        CapabilitySet::new(self.required.iter().copied())
    }

    /// 템플릿에 mutator를 순서대로 적용하고 issuer 참조를 주입합니다.
    pub fn build(&self, ctx: &BuildContext, target: &TargetRef) -> Certificate {
        build_certificate(ctx, target, self.mutators)
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("extra_validators", &self.extra_validators)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// namespace 범위 템플릿 + mutator + issuer 참조
pub(crate) fn build_certificate(
    ctx: &BuildContext,
    target: &TargetRef,
    mutators: &[Mutator],
) -> Certificate {
    let name = ctx.resource_name();
    let template = Certificate {
        metadata: ObjectMeta::new(ctx.namespace.clone(), name.clone()),
        spec: CertificateSpec {
            secret_name: format!("{name}-tls"),
            common_name: None,
            organizations: Vec::new(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            email_addresses: Vec::new(),
            uris: Vec::new(),
            literal_subject: None,
            private_key: PrivateKeySpec::default(),
            duration: None,
            usages: Vec::new(),
            is_ca: false,
            issuer_ref: target.clone(),
        },
        status: CertificateStatus::default(),
    };
    let mut cert = mutators
        .iter()
        .fold(template, |cert, mutate| mutate(cert, ctx));
    cert.spec.issuer_ref = target.clone();
    cert
}

// ─── mutator ───────────────────────────────────────────────────────

pub(crate) fn with_dns_name(mut cert: Certificate, ctx: &BuildContext) -> Certificate {
    cert.spec.dns_names.push(ctx.host());
    cert
}

fn with_three_dns_names(mut cert: Certificate, ctx: &BuildContext) -> Certificate {
    let host = ctx.host();
    cert.spec.dns_names.extend([
        host.clone(),
        format!("www.{host}"),
        format!("api.{host}"),
    ]);
    cert
}

fn with_ecdsa_key(mut cert: Certificate, _: &BuildContext) -> Certificate {
    cert.spec.private_key.algorithm = KeyAlgorithm::Ecdsa;
    cert.spec.private_key.size = Some(256);
    cert
}

fn with_ed25519_key(mut cert: Certificate, _: &BuildContext) -> Certificate {
    cert.spec.private_key.algorithm = KeyAlgorithm::Ed25519;
    cert.spec.private_key.size = None;
    cert
}

fn with_distinct_common_name(mut cert: Certificate, ctx: &BuildContext) -> Certificate {
    cert.spec.common_name = Some(format!("cn-{}", ctx.host()));
    cert
}

fn with_organization(mut cert: Certificate, _: &BuildContext) -> Certificate {
    cert.spec.organizations.push("certconform".to_owned());
    cert
}

fn with_loopback_ip(mut cert: Certificate, _: &BuildContext) -> Certificate {
    cert.spec.ip_addresses.push("127.0.0.1".to_owned());
    cert
}

fn with_email(mut cert: Certificate, ctx: &BuildContext) -> Certificate {
    cert.spec
        .email_addresses
        .push(format!("{}@{}", ctx.suffix, ctx.domain_suffix));
    cert
}

fn with_spiffe_uri(mut cert: Certificate, ctx: &BuildContext) -> Certificate {
    cert.spec.uris.push(format!(
        "spiffe://{}/ns/{}/sa/{}",
        ctx.domain_suffix, ctx.namespace, ctx.suffix
    ));
    cert
}

fn with_literal_subject(mut cert: Certificate, ctx: &BuildContext) -> Certificate {
    cert.spec.common_name = None;
    cert.spec.literal_subject = Some(format!(
        "CN={},OU=conformance,O=certconform,C=US",
        ctx.host()
    ));
    cert
}

fn with_wildcard(mut cert: Certificate, ctx: &BuildContext) -> Certificate {
    cert.spec.dns_names.push(format!("*.{}", ctx.host()));
    cert
}

fn with_two_hour_duration(mut cert: Certificate, _: &BuildContext) -> Certificate {
    cert.spec.duration = Some(Duration::from_secs(2 * 60 * 60));
    cert
}

fn with_explicit_usages(mut cert: Certificate, _: &BuildContext) -> Certificate {
    cert.spec.usages = vec![
        KeyUsage::DigitalSignature,
        KeyUsage::KeyEncipherment,
        KeyUsage::ServerAuth,
        KeyUsage::ClientAuth,
    ];
    cert
}

fn as_ca(mut cert: Certificate, _: &BuildContext) -> Certificate {
    cert.spec.is_ca = true;
    cert
}

fn with_long_label(mut cert: Certificate, ctx: &BuildContext) -> Certificate {
    let mut label: String = ctx.suffix.chars().take(MAX_LABEL_LEN).collect();
    while label.len() < MAX_LABEL_LEN {
        label.push('a');
    }
    cert.spec
        .dns_names
        .push(format!("{label}.{}", ctx.domain_suffix));
    cert
}

// ─── 시나리오 테이블 ────────────────────────────────────────────────

/// 발급 시나리오 전체 (선언 순서 = 등록 순서)
pub static SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "single-dns-name",
        description: "one DNS name",
        required: &[],
        mutators: &[with_dns_name],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "multiple-dns-names",
        description: "three DNS names",
        required: &[],
        mutators: &[with_three_dns_names],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "ecdsa-key",
        description: "ECDSA P-256 private key",
        required: &[Capability::Ecdsa],
        mutators: &[with_dns_name, with_ecdsa_key],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "ed25519-key",
        description: "Ed25519 private key",
        required: &[Capability::Ed25519],
        mutators: &[with_dns_name, with_ed25519_key],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "common-name-and-dns-name",
        description: "distinct common name and DNS name",
        required: &[Capability::CommonName],
        mutators: &[with_dns_name, with_distinct_common_name],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "organization-subject",
        description: "common name and organization in the subject",
        required: &[Capability::CommonName],
        mutators: &[with_dns_name, with_distinct_common_name, with_organization],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "ip-address",
        description: "DNS name and loopback IP address",
        required: &[Capability::IpAddresses],
        mutators: &[with_dns_name, with_loopback_ip],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "email-address",
        description: "DNS name and email address",
        required: &[Capability::EmailSans],
        mutators: &[with_dns_name, with_email],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "uri-identifier",
        description: "DNS name and spiffe URI",
        required: &[Capability::UriSans],
        mutators: &[with_dns_name, with_spiffe_uri],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "literal-subject",
        description: "literal subject string without common name",
        required: &[Capability::LiteralSubject],
        mutators: &[with_dns_name, with_literal_subject],
        extra_validators: &[LITERAL_SUBJECT_MATCHES],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "wildcard-dns-name",
        description: "wildcard DNS name",
        required: &[Capability::Wildcards],
        mutators: &[with_wildcard],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "wildcard-and-apex",
        description: "wildcard DNS name and its apex",
        required: &[Capability::Wildcards],
        mutators: &[with_wildcard, with_dns_name],
        extra_validators: &[],
        timeout: TimeoutClass::Extended,
    },
    Scenario {
        name: "custom-duration",
        description: "two hour validity",
        required: &[Capability::Duration],
        mutators: &[with_dns_name, with_two_hour_duration],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "key-usages",
        description: "explicit key usages",
        required: &[Capability::KeyUsages],
        mutators: &[with_dns_name, with_explicit_usages],
        extra_validators: &[KEY_USAGES_MATCH],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "ca-certificate",
        description: "CA certificate",
        required: &[Capability::IssueCa],
        mutators: &[with_dns_name, as_ca],
        extra_validators: &[IS_CA],
        timeout: TimeoutClass::Standard,
    },
    Scenario {
        name: "long-domain-name",
        description: "63 character leftmost DNS label",
        required: &[Capability::LongDomain],
        mutators: &[with_long_label],
        extra_validators: &[],
        timeout: TimeoutClass::Standard,
    },
];

/// 이름으로 시나리오를 찾습니다.
pub fn scenario(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

// ─── gating ────────────────────────────────────────────────────────

/// gating 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Register,
    /// 건너뜀 (에러 아님). 차단한 capability를 함께 보고합니다.
    Skip { blocked_by: CapabilitySet },
}

/// `required ∩ unsupported = ∅`일 때만 등록합니다.
pub fn gate(required: &CapabilitySet, unsupported: &CapabilitySet) -> Gate {
    if required.is_disjoint(unsupported) {
        Gate::Register
    } else {
        Gate::Skip {
            blocked_by: required.intersection(unsupported),
        }
    }
}

/// 카탈로그 항목: 테이블 시나리오 또는 생명주기 절차
#[derive(Debug, Clone, Copy)]
pub enum CaseDefinition {
    Issuance(&'static Scenario),
    Lifecycle(LifecycleProcedure),
}

impl CaseDefinition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Issuance(s) => s.name,
            Self::Lifecycle(p) => p.name(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Issuance(s) => s.description,
            Self::Lifecycle(p) => p.description(),
        }
    }

    pub fn required(&self) -> CapabilitySet {
        match self {
            Self::Issuance(s) => s.required(),
            Self::Lifecycle(p) => p.required(),
        }
    }

    pub fn timeout(&self) -> TimeoutClass {
        match self {
            Self::Issuance(s) => s.timeout,
            Self::Lifecycle(_) => TimeoutClass::Standard,
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }
}

/// 카탈로그 전체 (테이블 시나리오 다음에 생명주기 절차)
pub fn entries() -> Vec<CaseDefinition> {
    SCENARIOS
        .iter()
        .map(CaseDefinition::Issuance)
        .chain(LifecycleProcedure::ALL.into_iter().map(CaseDefinition::Lifecycle))
        .collect()
}
