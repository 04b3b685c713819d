//! 테스트용 인메모리 발급 백엔드
//!
//! `FakeIssuer`는 rcgen으로 실제 X.509 인증서를 발급합니다. 루트 CA는
//! ECDSA P-256 자체 서명이며, 요청이 생성되거나 spec이 바뀌거나 secret의
//! `tls.crt`가 비워지면 즉시 재발급합니다. `Behaviour`로 결함 있는 백엔드를
//! 흉내낼 수 있습니다.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use certconform_core::capability::{Capability, CapabilitySet};
use certconform_core::client::{AccessRequest, AccessReviewer, ResourceClient, Verb};
use certconform_core::config::TimingConfig;
use certconform_core::error::ClientError;
use certconform_core::types::{
    CA_CERT_KEY, Certificate, CertificateSpec, Condition, ConditionKind, ConditionStatus,
    KeyAlgorithm, KeyUsage, ObjectMeta, Resource, ResourceKey, ResourceKind, RotationPolicy,
    Secret, TLS_CERT_KEY, TLS_KEY_KEY, TargetRef,
};
use certconform_suite::{Registration, Suite, SuiteSpec};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose, SanType,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;

const RSA_KEYS: [&str; 2] = [
    include_str!("../fixtures/rsa-a.pem"),
    include_str!("../fixtures/rsa-b.pem"),
];

const DEFAULT_VALIDITY: Duration = Duration::from_secs(90 * 24 * 60 * 60);

pub const NAMESPACE: &str = "conformance";

/// 결함 주입 설정
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// Ready를 결정하지 않음
    pub never_ready: bool,
    /// 요청한 duration을 무시하고 이 유효 기간으로 발급
    pub fixed_validity: Option<Duration>,
    /// 인증서 갱신 시 주입할 충돌 횟수 (경쟁 writer 흉내)
    pub injected_conflicts: u32,
    /// 읽기 시 주입할 일시적 전송 에러 횟수
    pub transient_reads: u32,
    /// secret에 `ca.crt`를 저장하지 않음
    pub omit_ca: bool,
    /// 모든 생성 요청을 거부
    pub reject_creates: bool,
    /// rotation policy와 무관하게 매번 새 키 사용
    pub always_rotate: bool,
}

struct Authority {
    key: KeyPair,
    cert: rcgen::Certificate,
}

#[derive(Default)]
struct State {
    objects: HashMap<ResourceKey, Resource>,
    /// 인증서별 마지막 개인키 (알고리즘, PEM)
    keys: HashMap<String, (KeyAlgorithm, String)>,
    next_version: u64,
    rsa_turn: usize,
    conflicts_left: u32,
    transient_left: u32,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

pub struct FakeIssuer {
    behaviour: Behaviour,
    authority: Authority,
    state: Mutex<State>,
}

impl FakeIssuer {
    pub fn new() -> Self {
        Self::with_behaviour(Behaviour::default())
    }

    pub fn with_behaviour(behaviour: Behaviour) -> Self {
        let key = KeyPair::generate().expect("CA key");
        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, "certconform fake root");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let cert = params.self_signed(&key).expect("CA certificate");

        let state = State {
            conflicts_left: behaviour.injected_conflicts,
            transient_left: behaviour.transient_reads,
            ..State::default()
        };
        Self {
            behaviour,
            authority: Authority { key, cert },
            state: Mutex::new(state),
        }
    }

    pub async fn certificate(&self, name: &str) -> Option<Certificate> {
        let key = ResourceKey::new(ResourceKind::Certificate, NAMESPACE, name);
        let state = self.state.lock().await;
        state
            .objects
            .get(&key)
            .cloned()
            .and_then(|r| r.into_certificate().ok())
    }

    pub async fn certificate_count(&self) -> usize {
        let state = self.state.lock().await;
        state
            .objects
            .values()
            .filter(|r| matches!(r, Resource::Certificate(_)))
            .count()
    }

    fn generate_key(
        &self,
        state: &mut State,
        algorithm: KeyAlgorithm,
        size: Option<u32>,
    ) -> Result<String, ClientError> {
        let rejected = |e: rcgen::Error| ClientError::Rejected(e.to_string());
        match algorithm {
            KeyAlgorithm::Rsa => {
                let pem = RSA_KEYS[state.rsa_turn % RSA_KEYS.len()];
                state.rsa_turn += 1;
                Ok(pem.to_owned())
            }
            KeyAlgorithm::Ecdsa => {
                let alg = match size {
                    Some(384) => &rcgen::PKCS_ECDSA_P384_SHA384,
                    _ => &rcgen::PKCS_ECDSA_P256_SHA256,
                };
                Ok(KeyPair::generate_for(alg).map_err(rejected)?.serialize_pem())
            }
            KeyAlgorithm::Ed25519 => Ok(KeyPair::generate_for(&rcgen::PKCS_ED25519)
                .map_err(rejected)?
                .serialize_pem()),
        }
    }

    /// 요청을 처리합니다: 발급하거나 (never_ready면) 보류합니다.
    fn reconcile(&self, state: &mut State, cert: &mut Certificate) {
        let generation = cert.metadata.generation;
        if self.behaviour.never_ready {
            cert.set_condition(condition(
                ConditionKind::Ready,
                ConditionStatus::Unknown,
                "Pending",
                generation,
            ));
            return;
        }
        match self.issue(state, cert) {
            Ok(()) => cert.set_condition(condition(
                ConditionKind::Ready,
                ConditionStatus::True,
                "Issued",
                generation,
            )),
            Err(err) => {
                let mut failed =
                    condition(ConditionKind::Ready, ConditionStatus::False, "Failed", generation);
                failed.message = err.to_string();
                cert.set_condition(failed);
            }
        }
    }

    fn issue(&self, state: &mut State, cert: &mut Certificate) -> Result<(), ClientError> {
        let rejected = |e: rcgen::Error| ClientError::Rejected(e.to_string());
        let id = format!("{}/{}", cert.metadata.namespace, cert.metadata.name);
        let requested = &cert.spec.private_key;
        let reuse =
            !self.behaviour.always_rotate && requested.rotation_policy == RotationPolicy::Never;
        let (algorithm, size) = (requested.algorithm, requested.size);
        let previous = state
            .keys
            .get(&id)
            .filter(|(previous, _)| reuse && *previous == algorithm)
            .map(|(_, pem)| pem.clone());
        let key_pem = match previous {
            Some(pem) => pem,
            None => self.generate_key(state, algorithm, size)?,
        };
        state.keys.insert(id, (algorithm, key_pem.clone()));
        let key = KeyPair::from_pem(&key_pem).map_err(rejected)?;

        let validity = self
            .behaviour
            .fixed_validity
            .or(cert.spec.duration)
            .unwrap_or(DEFAULT_VALIDITY);
        let not_before = OffsetDateTime::now_utc().unix_timestamp();
        let not_after = not_before + validity.as_secs() as i64;

        let mut params = leaf_params(&cert.spec)?;
        params.not_before = OffsetDateTime::from_unix_timestamp(not_before)
            .map_err(|e| ClientError::Rejected(e.to_string()))?;
        params.not_after = OffsetDateTime::from_unix_timestamp(not_after)
            .map_err(|e| ClientError::Rejected(e.to_string()))?;
        let leaf = params
            .signed_by(&key, &self.authority.cert, &self.authority.key)
            .map_err(rejected)?;

        let secret_key = ResourceKey::new(
            ResourceKind::Secret,
            &cert.metadata.namespace,
            &cert.spec.secret_name,
        );
        let mut secret = match state.objects.get(&secret_key) {
            Some(Resource::Secret(existing)) => existing.clone(),
            _ => Secret {
                metadata: ObjectMeta {
                    generation: 1,
                    ..ObjectMeta::new(cert.metadata.namespace.clone(), cert.spec.secret_name.clone())
                },
                data: Default::default(),
            },
        };
        secret.metadata.resource_version = state.bump();
        secret
            .data
            .insert(TLS_CERT_KEY.to_owned(), leaf.pem().into_bytes());
        secret
            .data
            .insert(TLS_KEY_KEY.to_owned(), key_pem.into_bytes());
        if self.behaviour.omit_ca {
            secret.data.remove(CA_CERT_KEY);
        } else {
            secret
                .data
                .insert(CA_CERT_KEY.to_owned(), self.authority.cert.pem().into_bytes());
        }
        state.objects.insert(secret_key, Resource::Secret(secret));

        cert.status.not_before = Some(not_before);
        cert.status.not_after = Some(not_after);
        cert.status.revision = Some(cert.status.revision.unwrap_or(0) + 1);
        Ok(())
    }
}

fn condition(
    kind: ConditionKind,
    status: ConditionStatus,
    reason: &str,
    observed_generation: i64,
) -> Condition {
    Condition {
        kind,
        status,
        reason: reason.to_owned(),
        message: String::new(),
        observed_generation,
    }
}

fn leaf_params(spec: &CertificateSpec) -> Result<CertificateParams, ClientError> {
    let rejected = |reason: String| ClientError::Rejected(reason);
    let mut params =
        CertificateParams::new(spec.dns_names.clone()).map_err(|e| rejected(e.to_string()))?;

    params.distinguished_name = DistinguishedName::new();
    if let Some(literal) = &spec.literal_subject {
        for part in literal.split(',') {
            let (attr, value) = part
                .split_once('=')
                .ok_or_else(|| rejected(format!("malformed subject part '{part}'")))?;
            let dn_type = match attr.trim() {
                "CN" => DnType::CommonName,
                "O" => DnType::OrganizationName,
                "OU" => DnType::OrganizationalUnitName,
                "C" => DnType::CountryName,
                "L" => DnType::LocalityName,
                "ST" => DnType::StateOrProvinceName,
                other => return Err(rejected(format!("unsupported subject attribute '{other}'"))),
            };
            params.distinguished_name.push(dn_type, value.trim());
        }
    } else {
        if let Some(cn) = &spec.common_name {
            params.distinguished_name.push(DnType::CommonName, cn.as_str());
        }
        for org in &spec.organizations {
            params
                .distinguished_name
                .push(DnType::OrganizationName, org.as_str());
        }
    }

    for ip in &spec.ip_addresses {
        let ip = ip
            .parse()
            .map_err(|_| rejected(format!("invalid IP address '{ip}'")))?;
        params.subject_alt_names.push(SanType::IpAddress(ip));
    }
    for email in &spec.email_addresses {
        let email = email.clone().try_into().map_err(|e: rcgen::Error| rejected(e.to_string()))?;
        params.subject_alt_names.push(SanType::Rfc822Name(email));
    }
    for uri in &spec.uris {
        let uri = uri.clone().try_into().map_err(|e: rcgen::Error| rejected(e.to_string()))?;
        params.subject_alt_names.push(SanType::URI(uri));
    }

    for usage in &spec.usages {
        match usage {
            KeyUsage::DigitalSignature => params.key_usages.push(KeyUsagePurpose::DigitalSignature),
            KeyUsage::KeyEncipherment => params.key_usages.push(KeyUsagePurpose::KeyEncipherment),
            KeyUsage::KeyAgreement => params.key_usages.push(KeyUsagePurpose::KeyAgreement),
            KeyUsage::CertSign => params.key_usages.push(KeyUsagePurpose::KeyCertSign),
            KeyUsage::CrlSign => params.key_usages.push(KeyUsagePurpose::CrlSign),
            KeyUsage::ServerAuth => params
                .extended_key_usages
                .push(ExtendedKeyUsagePurpose::ServerAuth),
            KeyUsage::ClientAuth => params
                .extended_key_usages
                .push(ExtendedKeyUsagePurpose::ClientAuth),
        }
    }
    if spec.is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        if !params.key_usages.contains(&KeyUsagePurpose::KeyCertSign) {
            params.key_usages.push(KeyUsagePurpose::KeyCertSign);
        }
    }
    Ok(params)
}

fn not_found(key: &ResourceKey) -> ClientError {
    ClientError::NotFound {
        kind: key.kind.to_string(),
        name: key.name.clone(),
    }
}

fn conflict(key: &ResourceKey) -> ClientError {
    ClientError::Conflict {
        kind: key.kind.to_string(),
        name: key.name.clone(),
        reason: "the object has been modified".to_owned(),
    }
}

impl ResourceClient for FakeIssuer {
    async fn create(&self, resource: Resource) -> Result<Resource, ClientError> {
        if self.behaviour.reject_creates {
            return Err(ClientError::Rejected("issuer refuses new requests".to_owned()));
        }
        let mut state = self.state.lock().await;
        let key = resource.key();
        if state.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists {
                kind: key.kind.to_string(),
                name: key.name,
            });
        }

        let mut resource = resource;
        let version = state.bump();
        let meta = resource.metadata_mut();
        meta.generation = 1;
        meta.resource_version = version;
        if let Resource::Certificate(cert) = &mut resource {
            self.reconcile(&mut state, cert);
        }
        state.objects.insert(key, resource.clone());
        Ok(resource)
    }

    async fn get(&self, key: &ResourceKey) -> Result<Resource, ClientError> {
        let mut state = self.state.lock().await;
        if state.transient_left > 0 {
            state.transient_left -= 1;
            return Err(ClientError::Transport("connection reset by peer".to_owned()));
        }
        state.objects.get(key).cloned().ok_or_else(|| not_found(key))
    }

    async fn update(&self, resource: Resource) -> Result<Resource, ClientError> {
        let mut state = self.state.lock().await;
        let key = resource.key();
        let stored = state.objects.get(&key).cloned().ok_or_else(|| not_found(&key))?;

        if matches!(resource, Resource::Certificate(_)) && state.conflicts_left > 0 {
            // 경쟁 writer가 먼저 갱신한 것처럼 버전을 올림
            state.conflicts_left -= 1;
            let version = state.bump();
            if let Some(current) = state.objects.get_mut(&key) {
                current.metadata_mut().resource_version = version;
            }
            return Err(conflict(&key));
        }
        if resource.metadata().resource_version != stored.metadata().resource_version {
            return Err(conflict(&key));
        }

        let mut resource = resource;
        let version = state.bump();
        resource.metadata_mut().resource_version = version;
        resource.metadata_mut().generation = stored.metadata().generation;

        match resource {
            Resource::Certificate(mut cert) => {
                let old = stored.into_certificate()?;
                cert.status = old.status;
                if cert.spec != old.spec {
                    cert.metadata.generation += 1;
                    self.reconcile(&mut state, &mut cert);
                }
                let resource = Resource::Certificate(cert);
                state.objects.insert(key, resource.clone());
                Ok(resource)
            }
            Resource::Secret(secret) => {
                stored.into_secret()?;
                let cleared = secret.payload(TLS_CERT_KEY).is_none();
                let secret_name = secret.metadata.name.clone();
                state.objects.insert(key.clone(), Resource::Secret(secret));
                if cleared {
                    let owner = state.objects.values().find_map(|r| match r {
                        Resource::Certificate(c)
                            if c.metadata.namespace == key.namespace
                                && c.spec.secret_name == secret_name =>
                        {
                            Some(c.clone())
                        }
                        _ => None,
                    });
                    if let Some(mut owner) = owner {
                        self.reconcile(&mut state, &mut owner);
                        state
                            .objects
                            .insert(owner.key(), Resource::Certificate(owner));
                    }
                }
                state.objects.get(&key).cloned().ok_or_else(|| not_found(&key))
            }
        }
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.objects.remove(key).map(|_| ()).ok_or_else(|| not_found(key))
    }
}

/// 클라이언트 호출 단계의 장애
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// get이 응답하지 않음
    HangingReads,
    /// create가 응답하지 않음
    HangingCreates,
    /// create 도중 클라이언트가 panic
    PanickingCreates,
}

/// `FakeIssuer` 앞단에서 지정한 호출을 멈추거나 panic시키는 클라이언트
pub struct FaultyBackend {
    inner: FakeIssuer,
    fault: Fault,
}

impl FaultyBackend {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: FakeIssuer::new(),
            fault,
        }
    }
}

impl ResourceClient for FaultyBackend {
    async fn create(&self, resource: Resource) -> Result<Resource, ClientError> {
        match self.fault {
            Fault::HangingCreates => std::future::pending().await,
            Fault::PanickingCreates => panic!("backend client crashed"),
            Fault::HangingReads => self.inner.create(resource).await,
        }
    }

    async fn get(&self, key: &ResourceKey) -> Result<Resource, ClientError> {
        if self.fault == Fault::HangingReads {
            return std::future::pending().await;
        }
        self.inner.get(key).await
    }

    async fn update(&self, resource: Resource) -> Result<Resource, ClientError> {
        self.inner.update(resource).await
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), ClientError> {
        self.inner.delete(key).await
    }
}

/// 집계 role 규칙을 따르는 권한 검토기
#[derive(Default)]
pub struct RoleBindings {
    /// `view` role에 쓰기 권한을 잘못 부여함
    pub view_can_write: bool,
    calls: AtomicU32,
}

impl RoleBindings {
    pub fn with_view_writes() -> Self {
        Self {
            view_can_write: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl AccessReviewer for RoleBindings {
    async fn review(&self, request: &AccessRequest) -> Result<bool, ClientError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let read = Verb::READ.contains(&request.verb);
        Ok(match request.role.as_str() {
            "view" => read || self.view_can_write,
            "edit" | "admin" => true,
            _ => false,
        })
    }
}

pub fn target() -> TargetRef {
    TargetRef {
        group: "cert-manager.io".to_owned(),
        kind: "ClusterIssuer".to_owned(),
        name: "fake-ca".to_owned(),
    }
}

/// 짧은 타임아웃 (표준 10초, 확장 20초, 폴링 100ms)
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        issuance_timeout_secs: 10,
        extended_timeout_secs: 20,
        poll_interval_ms: 100,
        ..TimingConfig::default()
    }
}

pub fn suite_spec(unsupported: impl IntoIterator<Item = Capability>) -> SuiteSpec {
    SuiteSpec {
        display_name: Some("fake-ca".to_owned()),
        target: Some(target()),
        namespace: Some(NAMESPACE.to_owned()),
        domain_suffix: None,
        unsupported: CapabilitySet::new(unsupported),
        timing: Some(fast_timing()),
    }
}

/// complete + define
pub fn register(unsupported: impl IntoIterator<Item = Capability>) -> Registration {
    let mut suite = Suite::new(suite_spec(unsupported));
    suite.complete().expect("complete");
    suite.define().expect("define")
}
