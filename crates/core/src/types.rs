//! 리소스 모델 — 발급 요청 리소스와 결과물(secret)의 타입 정의
//!
//! 백엔드에 독립적인 타입 모델입니다. 지원하는 리소스 종류는
//! [`ResourceKind`]로 고정되어 있고, [`Resource`]는 그 위의 tagged variant입니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// 발급 결과 secret의 인증서 필드
pub const TLS_CERT_KEY: &str = "tls.crt";
/// 발급 결과 secret의 개인키 필드
pub const TLS_KEY_KEY: &str = "tls.key";
/// 발급 결과 secret의 CA 필드
pub const CA_CERT_KEY: &str = "ca.crt";

/// 리소스 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    /// spec이 바뀔 때마다 서버가 증가시키는 세대 번호
    #[serde(default)]
    pub generation: i64,
    /// 낙관적 동시성 제어용 버전
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// 테스트 대상 백엔드 참조 (group/kind/name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub group: String,
    pub kind: String,
    pub name: String,
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.kind, self.group, self.name)
    }
}

/// 개인키 알고리즘
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    #[default]
    Rsa,
    Ecdsa,
    Ed25519,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => f.write_str("RSA"),
            Self::Ecdsa => f.write_str("ECDSA"),
            Self::Ed25519 => f.write_str("Ed25519"),
        }
    }
}

/// 재발급 시 개인키 교체 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationPolicy {
    /// 기존 개인키를 재사용
    #[default]
    Never,
    /// 매 발급마다 새 키 생성
    Always,
}

/// 개인키 요청 사양
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKeySpec {
    #[serde(default)]
    pub algorithm: KeyAlgorithm,
    /// 키 크기 (RSA 비트 수, ECDSA 곡선 크기). 없으면 백엔드 기본값.
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub rotation_policy: RotationPolicy,
}

/// 요청 가능한 key usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyUsage {
    DigitalSignature,
    KeyEncipherment,
    KeyAgreement,
    CertSign,
    CrlSign,
    ServerAuth,
    ClientAuth,
}

impl KeyUsage {
    /// extended key usage인지 여부
    pub fn is_extended(&self) -> bool {
        matches!(self, Self::ServerAuth | Self::ClientAuth)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DigitalSignature => "digital signature",
            Self::KeyEncipherment => "key encipherment",
            Self::KeyAgreement => "key agreement",
            Self::CertSign => "cert sign",
            Self::CrlSign => "crl sign",
            Self::ServerAuth => "server auth",
            Self::ClientAuth => "client auth",
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 인증서 발급 요청 사양
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSpec {
    /// 결과물을 저장할 secret 이름
    pub secret_name: String,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub email_addresses: Vec<String>,
    #[serde(default)]
    pub uris: Vec<String>,
    /// RFC 4514 형식의 literal subject (예: `CN=foo,O=bar`)
    #[serde(default)]
    pub literal_subject: Option<String>,
    #[serde(default)]
    pub private_key: PrivateKeySpec,
    #[serde(default)]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub usages: Vec<KeyUsage>,
    #[serde(default)]
    pub is_ca: bool,
    pub issuer_ref: TargetRef,
}

/// 상태 condition 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    Ready,
    Issuing,
}

/// condition 상태값
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    /// True/False로 결정되었는지 (Unknown이 아닌지)
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// 리소스 상태 condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// 이 condition이 반영한 spec 세대
    pub observed_generation: i64,
}

/// 인증서 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// 발급된 인증서의 notBefore (unix 초)
    #[serde(default)]
    pub not_before: Option<i64>,
    /// 발급된 인증서의 notAfter (unix 초)
    #[serde(default)]
    pub not_after: Option<i64>,
    #[serde(default)]
    pub revision: Option<u32>,
}

/// 인증서 발급 요청 리소스
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub metadata: ObjectMeta,
    pub spec: CertificateSpec,
    #[serde(default)]
    pub status: CertificateStatus,
}

impl Certificate {
    /// 종류가 일치하는 condition을 찾습니다.
    pub fn condition(&self, kind: ConditionKind) -> Option<&Condition> {
        self.status.conditions.iter().find(|c| c.kind == kind)
    }

    /// condition을 추가하거나 같은 종류를 교체합니다.
    pub fn set_condition(&mut self, condition: Condition) {
        self.status.conditions.retain(|c| c.kind != condition.kind);
        self.status.conditions.push(condition);
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(
            ResourceKind::Certificate,
            &self.metadata.namespace,
            &self.metadata.name,
        )
    }

    /// 로그와 에러 메시지에 쓰는 조건 요약
    pub fn summary(&self) -> String {
        let conditions: Vec<String> = self
            .status
            .conditions
            .iter()
            .map(|c| {
                format!(
                    "{:?}={:?}(gen {}, {})",
                    c.kind, c.status, c.observed_generation, c.reason
                )
            })
            .collect();
        format!(
            "generation={} conditions=[{}]",
            self.metadata.generation,
            conditions.join(", ")
        )
    }
}

/// 발급 결과물이 저장되는 key-value secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    /// 필드 값을 반환합니다. 비어 있으면 `None`.
    pub fn payload(&self, key: &str) -> Option<&[u8]> {
        self.data
            .get(key)
            .map(Vec::as_slice)
            .filter(|bytes| !bytes.is_empty())
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(
            ResourceKind::Secret,
            &self.metadata.namespace,
            &self.metadata.name,
        )
    }
}

/// 지원하는 리소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Certificate,
    Secret,
}

impl ResourceKind {
    pub fn group(&self) -> &'static str {
        match self {
            Self::Certificate => "cert-manager.io",
            Self::Secret => "",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Certificate => "Certificate",
            Self::Secret => "Secret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// namespace 범위 리소스 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// 지원 리소스 종류 위의 tagged variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Certificate(Certificate),
    Secret(Secret),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Certificate(_) => ResourceKind::Certificate,
            Self::Secret(_) => ResourceKind::Secret,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Certificate(c) => &c.metadata,
            Self::Secret(s) => &s.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Certificate(c) => &mut c.metadata,
            Self::Secret(s) => &mut s.metadata,
        }
    }

    pub fn key(&self) -> ResourceKey {
        let meta = self.metadata();
        ResourceKey::new(self.kind(), &meta.namespace, &meta.name)
    }

    pub fn into_certificate(self) -> Result<Certificate, ClientError> {
        match self {
            Self::Certificate(c) => Ok(c),
            other => Err(ClientError::UnexpectedKind {
                expected: ResourceKind::Certificate.to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }

    pub fn into_secret(self) -> Result<Secret, ClientError> {
        match self {
            Self::Secret(s) => Ok(s),
            other => Err(ClientError::UnexpectedKind {
                expected: ResourceKind::Secret.to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }
}
