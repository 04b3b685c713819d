//! 생명주기 절차 — 테이블로 표현할 수 없는 다단계 시나리오
//!
//! 발급 후 결과물 삭제에 따른 재발급, 개인키 재사용, 실행 중 spec 갱신을
//! 검증합니다. 테이블 시나리오와 같은 gate, 같은 등록 경로를 거칩니다.

use certconform_core::capability::{Capability, CapabilitySet};
use certconform_core::client::{ResourceClient, ResourceClientExt};
use certconform_core::types::{RotationPolicy, TLS_CERT_KEY, TLS_KEY_KEY};
use serde::Serialize;
use tracing::info;

use crate::case::CaseRunner;
use crate::catalog::with_dns_name;
use crate::error::{ConformanceError, ValidationError, ValidationFailures};
use crate::retry::retry_on_conflict;

/// 수작업 생명주기 절차
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleProcedure {
    /// 발급 → secret의 `tls.crt` 삭제 → 재발급 대기 → 검증
    ReissueAfterArtifactCleared,
    /// 위와 같되 rotation policy `Never`: 재발급 후에도 개인키가 같아야 함
    ReissueReusesPrivateKey,
    /// 발급 → DNS 이름 추가 (충돌 재시도) → 새 세대에서 Ready → 검증
    UpdateAddsDnsName,
}

impl LifecycleProcedure {
    pub const ALL: [LifecycleProcedure; 3] = [
        Self::ReissueAfterArtifactCleared,
        Self::ReissueReusesPrivateKey,
        Self::UpdateAddsDnsName,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReissueAfterArtifactCleared => "reissue-after-artifact-cleared",
            Self::ReissueReusesPrivateKey => "reissue-reuses-private-key",
            Self::UpdateAddsDnsName => "update-adds-dns-name",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ReissueAfterArtifactCleared => "reissue after the issued certificate is cleared",
            Self::ReissueReusesPrivateKey => "reissue keeps the private key with rotation Never",
            Self::UpdateAddsDnsName => "live update adding a DNS name",
        }
    }

    pub fn required(&self) -> CapabilitySet {
        match self {
            Self::ReissueReusesPrivateKey => CapabilitySet::new([Capability::ReusePrivateKey]),
            Self::ReissueAfterArtifactCleared | Self::UpdateAddsDnsName => CapabilitySet::empty(),
        }
    }

    pub(crate) async fn run<C: ResourceClient>(
        &self,
        runner: &CaseRunner<C>,
    ) -> Result<(), ConformanceError> {
        match self {
            Self::ReissueAfterArtifactCleared => reissue(runner, RotationPolicy::Always).await,
            Self::ReissueReusesPrivateKey => reissue(runner, RotationPolicy::Never).await,
            Self::UpdateAddsDnsName => update_adds_dns_name(runner).await,
        }
    }
}

async fn reissue<C: ResourceClient>(
    runner: &CaseRunner<C>,
    rotation: RotationPolicy,
) -> Result<(), ConformanceError> {
    let timeout = runner.standard_timeout();
    let client = runner.client();

    let mut certificate = runner.build(&[with_dns_name]);
    certificate.spec.private_key.rotation_policy = rotation;
    let issued = runner.issue(certificate, timeout).await?;
    let original = runner.validate(&issued, &[]).await?;

    let namespace = issued.metadata.namespace.clone();
    let secret_name = issued.spec.secret_name.clone();
    let secret_target = format!("Secret {namespace}/{secret_name}");
    info!(secret = %secret_target, "clearing issued certificate");
    retry_on_conflict(
        runner.budget(),
        &secret_target,
        runner.cancel(),
        || client.get_secret(&namespace, &secret_name),
        |mut secret| {
            secret.data.insert(TLS_CERT_KEY.to_owned(), Vec::new());
            secret
        },
        |secret| client.update_secret(secret),
    )
    .await?;

    runner.fetch_secret(&issued).await?;
    let settled = runner
        .await_settled(&issued, issued.metadata.generation, timeout)
        .await?;
    let reissued = runner.validate(&settled, &[]).await?;

    let key_changed = original.payload(TLS_KEY_KEY) != reissued.payload(TLS_KEY_KEY);
    if rotation == RotationPolicy::Never && key_changed {
        return Err(ConformanceError::Validation(ValidationFailures(vec![
            ValidationError::new(
                "private-key-reused",
                "tls.key unchanged after reissue",
                "a different private key",
            ),
        ])));
    }
    Ok(())
}

async fn update_adds_dns_name<C: ResourceClient>(
    runner: &CaseRunner<C>,
) -> Result<(), ConformanceError> {
    let timeout = runner.standard_timeout();
    let client = runner.client();

    let issued = runner.issue(runner.build(&[with_dns_name]), timeout).await?;
    runner.validate(&issued, &[]).await?;

    let namespace = issued.metadata.namespace.clone();
    let name = issued.metadata.name.clone();
    let target = issued.key().to_string();
    let extra_name = format!("extra.{}", runner.context().host());
    info!(certificate = %target, dns_name = %extra_name, "adding DNS name");
    let updated = retry_on_conflict(
        runner.budget(),
        &target,
        runner.cancel(),
        || client.get_certificate(&namespace, &name),
        |mut certificate| {
            if !certificate.spec.dns_names.contains(&extra_name) {
                certificate.spec.dns_names.push(extra_name.clone());
            }
            certificate
        },
        |certificate| client.update_certificate(certificate),
    )
    .await?;

    let settled = runner
        .await_settled(&updated, updated.metadata.generation, timeout)
        .await?;
    runner.validate(&settled, &[]).await?;
    Ok(())
}
