//! Capability 모델 — 백엔드가 지원하지 않을 수 있는 선택적 동작
//!
//! [`Capability`]는 발급 백엔드의 선택적 기능 하나를 나타내고,
//! [`CapabilitySet`]은 그 집합입니다. 집합은 추가만 가능하며 줄어들지 않습니다.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 발급 백엔드의 선택적 기능
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// 요청한 유효 기간을 그대로 적용
    Duration,
    /// 와일드카드 DNS 이름 발급
    Wildcards,
    /// CA 인증서 발급
    IssueCa,
    /// key usage / extended key usage 지정
    KeyUsages,
    /// literal subject 문자열 지원
    LiteralSubject,
    /// 재발급 시 기존 개인키 재사용
    ReusePrivateKey,
    /// URI SAN
    UriSans,
    /// 이메일 SAN
    EmailSans,
    /// IP 주소 SAN
    IpAddresses,
    /// subject common name
    CommonName,
    /// ECDSA 키
    Ecdsa,
    /// Ed25519 키
    Ed25519,
    /// 발급 결과물에 CA 체인 저장
    SaveCaToSecret,
    /// 발급 결과물에 루트 CA 저장
    SaveRootCaToSecret,
    /// 63자 레이블을 포함한 긴 도메인 이름
    LongDomain,
}

impl Capability {
    /// 알려진 모든 capability (선언 순서)
    pub const ALL: [Capability; 15] = [
        Capability::Duration,
        Capability::Wildcards,
        Capability::IssueCa,
        Capability::KeyUsages,
        Capability::LiteralSubject,
        Capability::ReusePrivateKey,
        Capability::UriSans,
        Capability::EmailSans,
        Capability::IpAddresses,
        Capability::CommonName,
        Capability::Ecdsa,
        Capability::Ed25519,
        Capability::SaveCaToSecret,
        Capability::SaveRootCaToSecret,
        Capability::LongDomain,
    ];

    /// 설정 파일과 출력에서 사용하는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::Wildcards => "wildcards",
            Self::IssueCa => "issue-ca",
            Self::KeyUsages => "key-usages",
            Self::LiteralSubject => "literal-subject",
            Self::ReusePrivateKey => "reuse-private-key",
            Self::UriSans => "uri-sans",
            Self::EmailSans => "email-sans",
            Self::IpAddresses => "ip-addresses",
            Self::CommonName => "common-name",
            Self::Ecdsa => "ecdsa",
            Self::Ed25519 => "ed25519",
            Self::SaveCaToSecret => "save-ca-to-secret",
            Self::SaveRootCaToSecret => "save-root-ca-to-secret",
            Self::LongDomain => "long-domain",
        }
    }

    /// 사람이 읽을 수 있는 설명
    pub fn description(&self) -> &'static str {
        match self {
            Self::Duration => "honours the requested certificate duration",
            Self::Wildcards => "issues wildcard DNS names",
            Self::IssueCa => "issues certificates marked as CA",
            Self::KeyUsages => "honours requested key usages",
            Self::LiteralSubject => "accepts a literal subject string",
            Self::ReusePrivateKey => "reuses the private key on re-issuance",
            Self::UriSans => "issues URI subject alternative names",
            Self::EmailSans => "issues email subject alternative names",
            Self::IpAddresses => "issues IP address subject alternative names",
            Self::CommonName => "sets the subject common name",
            Self::Ecdsa => "signs ECDSA public keys",
            Self::Ed25519 => "signs Ed25519 public keys",
            Self::SaveCaToSecret => "stores the issuing CA next to the certificate",
            Self::SaveRootCaToSecret => "stores the root CA next to the certificate",
            Self::LongDomain => "issues DNS names with 63-character labels",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "capability".to_owned(),
                reason: format!("unknown capability '{s}'"),
            })
    }
}

/// Capability 집합
///
/// 멤버십 검사와 추가만 지원합니다. 한 번 추가된 capability는 제거할 수 없습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    inner: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// 초기 목록으로 집합을 생성합니다.
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            inner: capabilities.into_iter().collect(),
        }
    }

    /// 빈 집합을 생성합니다.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.inner.contains(&capability)
    }

    /// capability를 추가합니다. 이미 있으면 아무 일도 하지 않습니다.
    pub fn add(&mut self, capability: Capability) {
        self.inner.insert(capability);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// 정렬된 순서로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.inner.iter().copied()
    }

    /// 공통 원소가 없는지 확인합니다.
    pub fn is_disjoint(&self, other: &CapabilitySet) -> bool {
        self.inner.is_disjoint(&other.inner)
    }

    /// 두 집합의 교집합을 반환합니다.
    pub fn intersection(&self, other: &CapabilitySet) -> CapabilitySet {
        Self {
            inner: self.inner.intersection(&other.inner).copied().collect(),
        }
    }

    /// `self`의 모든 원소가 `other`에 포함되는지 확인합니다.
    pub fn is_subset(&self, other: &CapabilitySet) -> bool {
        self.inner.is_subset(&other.inner)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.inner.iter().map(|c| c.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
