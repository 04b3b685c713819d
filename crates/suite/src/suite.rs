//! Suite 오케스트레이션
//!
//! [`Suite`]는 부분적으로 채워진 [`SuiteSpec`]을 받아 기본값을 채우고
//! ([`Suite::complete`]), 카탈로그 항목을 gating하여 등록한 뒤
//! ([`Suite::define`]), 등록된 케이스를 서로 독립된 tokio task로 실행합니다
//! ([`Suite::run`]).
//!
//! # 상태 전이
//!
//! ```text
//! Uninitialized ──complete()──▶ Completed ──define()──▶ Defined
//!                                  ▲  │
//!                                  └──┘ complete() (멱등)
//! ```
//!
//! complete 이후 설정은 `Arc<SuiteConfig>`로 고정되며 모든 케이스가
//! 읽기 전용으로 공유합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use certconform_core::capability::CapabilitySet;
use certconform_core::client::ResourceClient;
use certconform_core::config::{BackendConfig, TimingConfig};
use certconform_core::error::ConfigError;
use certconform_core::metrics as m;
use certconform_core::types::TargetRef;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::case::{CaseRunner, run_issuance};
use crate::catalog::{self, BuildContext, CaseDefinition, Gate, TimeoutClass};
use crate::error::{CaseFailure, ConformanceError};
use crate::namer::Namer;

/// 생성되는 DNS 이름의 기본 도메인
pub const DEFAULT_DOMAIN_SUFFIX: &str = "example.com";

/// 부분적으로 채워진 suite 설정
#[derive(Debug, Clone, Default)]
pub struct SuiteSpec {
    /// 없으면 target 이름을 사용
    pub display_name: Option<String>,
    /// 필수
    pub target: Option<TargetRef>,
    /// 필수
    pub namespace: Option<String>,
    /// 없으면 [`DEFAULT_DOMAIN_SUFFIX`]
    pub domain_suffix: Option<String>,
    pub unsupported: CapabilitySet,
    /// 없으면 `TimingConfig::default()`
    pub timing: Option<TimingConfig>,
}

impl SuiteSpec {
    /// 설정 파일의 백엔드 항목을 suite 입력으로 변환합니다.
    pub fn from_backend(backend: &BackendConfig, timing: &TimingConfig) -> Self {
        Self {
            display_name: Some(backend.name.clone()),
            target: Some(backend.target.clone()),
            namespace: Some(backend.namespace.clone()),
            domain_suffix: backend.domain_suffix.clone(),
            unsupported: backend.unsupported.clone(),
            timing: Some(timing.clone()),
        }
    }
}

/// complete 이후 고정된 suite 설정
#[derive(Debug, Clone, Serialize)]
pub struct SuiteConfig {
    pub display_name: String,
    pub target: TargetRef,
    pub namespace: String,
    pub domain_suffix: String,
    pub unsupported: CapabilitySet,
    pub timing: TimingConfig,
}

impl SuiteConfig {
    /// 타임아웃 등급을 실제 시간으로 변환합니다.
    pub fn timeout(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Standard => self.timing.issuance_timeout(),
            TimeoutClass::Extended => self.timing.extended_timeout(),
        }
    }
}

/// suite 상태
#[derive(Debug, Clone)]
enum SuiteState {
    Uninitialized,
    Completed(Arc<SuiteConfig>),
    Defined(Arc<SuiteConfig>),
}

/// 적합성 suite
#[derive(Debug)]
pub struct Suite {
    spec: SuiteSpec,
    state: SuiteState,
}

impl Suite {
    pub fn new(spec: SuiteSpec) -> Self {
        Self {
            spec,
            state: SuiteState::Uninitialized,
        }
    }

    /// 현재 상태 이름
    pub fn state(&self) -> &'static str {
        match self.state {
            SuiteState::Uninitialized => "uninitialized",
            SuiteState::Completed(_) => "completed",
            SuiteState::Defined(_) => "defined",
        }
    }

    /// 고정된 설정 (complete 이후에만 존재)
    pub fn config(&self) -> Option<&Arc<SuiteConfig>> {
        match &self.state {
            SuiteState::Uninitialized => None,
            SuiteState::Completed(config) | SuiteState::Defined(config) => Some(config),
        }
    }

    /// 기본값을 채우고 설정을 고정합니다.
    ///
    /// 멱등: 두 번째 이후 호출은 처음 고정된 설정을 그대로 반환합니다.
    ///
    /// # Errors
    ///
    /// namespace 또는 target이 없거나 타이밍 값이 범위를 벗어나면
    /// `ConformanceError::Configuration`을 반환합니다.
    pub fn complete(&mut self) -> Result<Arc<SuiteConfig>, ConformanceError> {
        if let Some(config) = self.config() {
            return Ok(Arc::clone(config));
        }

        let namespace = self
            .spec
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| ConformanceError::configuration("namespace", "must be set"))?;
        let target = self
            .spec
            .target
            .clone()
            .ok_or_else(|| ConformanceError::configuration("target", "must be set"))?;
        let timing = self.spec.timing.clone().unwrap_or_default();
        timing.validate().map_err(|err| match err {
            ConfigError::InvalidValue { field, reason } => {
                ConformanceError::Configuration { field, reason }
            }
            other => ConformanceError::configuration("timing", other.to_string()),
        })?;

        let config = Arc::new(SuiteConfig {
            display_name: self
                .spec
                .display_name
                .clone()
                .unwrap_or_else(|| target.name.clone()),
            domain_suffix: self
                .spec
                .domain_suffix
                .clone()
                .unwrap_or_else(|| DEFAULT_DOMAIN_SUFFIX.to_owned()),
            unsupported: self.spec.unsupported.clone(),
            target,
            namespace,
            timing,
        });

        info!(
            suite = %config.display_name,
            target = %config.target,
            namespace = %config.namespace,
            unsupported = %config.unsupported,
            "suite completed"
        );
        self.state = SuiteState::Completed(Arc::clone(&config));
        Ok(config)
    }

    /// gating을 거쳐 카탈로그 항목을 한 번씩 등록합니다.
    ///
    /// # Errors
    ///
    /// complete 전이거나 이미 define된 경우 `ConformanceError::Configuration`.
    pub fn define(&mut self) -> Result<Registration, ConformanceError> {
        let config = match &self.state {
            SuiteState::Uninitialized => {
                return Err(ConformanceError::configuration(
                    "suite",
                    "define() called before complete()",
                ));
            }
            SuiteState::Defined(_) => {
                return Err(ConformanceError::configuration(
                    "suite",
                    "define() called more than once",
                ));
            }
            SuiteState::Completed(config) => Arc::clone(config),
        };

        let mut cases = Vec::new();
        let mut skipped = Vec::new();
        for definition in catalog::entries() {
            let required = definition.required();
            match catalog::gate(&required, &config.unsupported) {
                Gate::Register => cases.push(RegisteredCase {
                    definition,
                    permitted_by: required,
                    config: Arc::clone(&config),
                }),
                Gate::Skip { blocked_by } => {
                    metrics::counter!(m::SUITE_CASES_SKIPPED_TOTAL, m::LABEL_SCENARIO => definition.name())
                        .increment(1);
                    debug!(
                        suite = %config.display_name,
                        scenario = definition.name(),
                        blocked_by = %blocked_by,
                        "scenario skipped"
                    );
                    skipped.push(SkippedEntry {
                        name: definition.name(),
                        description: definition.description(),
                        blocked_by,
                    });
                }
            }
        }

        info!(
            suite = %config.display_name,
            registered = cases.len(),
            skipped = skipped.len(),
            "suite defined"
        );
        self.state = SuiteState::Defined(Arc::clone(&config));
        Ok(Registration {
            config,
            cases,
            skipped,
        })
    }

    /// 등록된 케이스를 동시에 실행하고 결과를 집계합니다.
    ///
    /// 동시 실행 수는 `timing.max_concurrent_cases`로 제한됩니다.
    /// 한 케이스의 실패는 다른 케이스를 중단시키지 않습니다.
    pub async fn run<C: ResourceClient>(
        registration: Registration,
        client: Arc<C>,
        namer: Arc<dyn Namer>,
        cancel: CancellationToken,
    ) -> SuiteReport {
        let Registration {
            config,
            cases,
            skipped,
        } = registration;
        let semaphore = Arc::new(Semaphore::new(config.timing.max_concurrent_cases.max(1)));
        let mut tasks = JoinSet::new();
        // task id -> (케이스, case id, 시작 시각)
        let mut in_flight: HashMap<Id, (RegisteredCase, String, Instant)> = HashMap::new();

        for case in cases {
            let suffix = namer.unique_suffix();
            let case_id = case.case_id(&suffix);
            let task_case = case.clone();
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            let semaphore = Arc::clone(&semaphore);
            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                task_case.run_as(client, suffix, cancel).await
            });
            in_flight.insert(handle.id(), (case, case_id, Instant::now()));
        }

        let mut report = SuiteReport {
            display_name: config.display_name.clone(),
            passed: Vec::new(),
            failed: Vec::new(),
            skipped,
        };
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(passed))) => {
                    in_flight.remove(&id);
                    report.passed.push(passed);
                }
                Ok((id, Err(failed))) => {
                    in_flight.remove(&id);
                    report.failed.push(failed);
                }
                Err(err) => {
                    let id = err.id();
                    let reason = abort_reason(err);
                    match in_flight.remove(&id) {
                        Some((case, case_id, started)) => {
                            report.failed.push(case.aborted(case_id, reason, started.elapsed()));
                        }
                        None => {
                            error!(suite = %config.display_name, reason = %reason, "untracked case task ended abnormally");
                        }
                    }
                }
            }
        }
        report.passed.sort_by(|a, b| a.scenario.cmp(b.scenario));
        report
            .failed
            .sort_by(|a, b| a.failure.scenario.cmp(&b.failure.scenario));

        info!(
            suite = %report.display_name,
            passed = report.passed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "suite finished"
        );
        report
    }
}

/// 실패한 task의 panic 메시지 또는 중단 사유
fn abort_reason(err: JoinError) -> String {
    if !err.is_panic() {
        return "cancelled before completion".to_owned();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    format!("panicked: {message}")
}

/// define 결과
#[derive(Debug)]
pub struct Registration {
    pub config: Arc<SuiteConfig>,
    pub cases: Vec<RegisteredCase>,
    pub skipped: Vec<SkippedEntry>,
}

impl Registration {
    pub fn case_names(&self) -> Vec<&'static str> {
        self.cases.iter().map(|c| c.definition.name()).collect()
    }

    pub fn skipped_names(&self) -> Vec<&'static str> {
        self.skipped.iter().map(|s| s.name).collect()
    }

    pub fn case(&self, name: &str) -> Option<&RegisteredCase> {
        self.cases.iter().find(|c| c.definition.name() == name)
    }
}

/// gating으로 건너뛴 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub blocked_by: CapabilitySet,
}

/// 등록된 케이스 하나
#[derive(Debug, Clone)]
pub struct RegisteredCase {
    pub definition: CaseDefinition,
    /// 실행을 허용한 required capability
    pub permitted_by: CapabilitySet,
    config: Arc<SuiteConfig>,
}

impl RegisteredCase {
    pub fn name(&self) -> &'static str {
        self.definition.name()
    }

    /// 케이스를 한 번 실행합니다. 실행마다 새 고유 이름을 사용합니다.
    pub async fn run<C: ResourceClient>(
        &self,
        client: Arc<C>,
        namer: &dyn Namer,
        cancel: CancellationToken,
    ) -> Result<PassedCase, FailedCase> {
        self.run_as(client, namer.unique_suffix(), cancel).await
    }

    /// `suffix`로 만든 이름을 case id로 사용합니다.
    fn case_id(&self, suffix: &str) -> String {
        BuildContext {
            namespace: self.config.namespace.clone(),
            domain_suffix: self.config.domain_suffix.clone(),
            suffix: suffix.to_owned(),
        }
        .resource_name()
    }

    /// 실행 task가 결과 없이 끝난 케이스의 실패 기록
    fn aborted(&self, case_id: String, reason: String, elapsed: Duration) -> FailedCase {
        let scenario = self.definition.name();
        metrics::counter!(m::SUITE_CASES_TOTAL, m::LABEL_RESULT => "fail").increment(1);
        warn!(scenario, case_id = %case_id, reason = %reason, "case task ended abnormally");
        FailedCase {
            failure: CaseFailure {
                scenario: scenario.to_owned(),
                case_id,
                permitted_by: self.permitted_by.clone(),
                error: ConformanceError::Aborted { reason },
            },
            elapsed,
        }
    }

    async fn run_as<C: ResourceClient>(
        &self,
        client: Arc<C>,
        suffix: String,
        cancel: CancellationToken,
    ) -> Result<PassedCase, FailedCase> {
        let scenario = self.definition.name();
        let runner = CaseRunner::new(Arc::clone(&self.config), client, suffix, cancel);
        let case_id = runner.case_id();
        let started = Instant::now();
        info!(suite = %self.config.display_name, scenario, case_id = %case_id, "case started");

        let result = match self.definition {
            CaseDefinition::Issuance(s) => run_issuance(&runner, s).await,
            CaseDefinition::Lifecycle(p) => p.run(&runner).await,
        };

        let elapsed = started.elapsed();
        metrics::histogram!(m::SUITE_CASE_DURATION_SECONDS, m::LABEL_SCENARIO => scenario)
            .record(elapsed.as_secs_f64());

        match result {
            Ok(()) => {
                metrics::counter!(m::SUITE_CASES_TOTAL, m::LABEL_RESULT => "pass").increment(1);
                info!(scenario, case_id = %case_id, elapsed_ms = elapsed.as_millis() as u64, "case passed");
                Ok(PassedCase {
                    scenario,
                    case_id,
                    elapsed,
                })
            }
            Err(error) => {
                metrics::counter!(m::SUITE_CASES_TOTAL, m::LABEL_RESULT => "fail").increment(1);
                warn!(
                    scenario,
                    case_id = %case_id,
                    kind = error.kind_name(),
                    error = %error,
                    "case failed"
                );
                Err(FailedCase {
                    failure: CaseFailure {
                        scenario: scenario.to_owned(),
                        case_id,
                        permitted_by: self.permitted_by.clone(),
                        error,
                    },
                    elapsed,
                })
            }
        }
    }
}

/// 통과한 케이스
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassedCase {
    pub scenario: &'static str,
    pub case_id: String,
    pub elapsed: Duration,
}

/// 실패한 케이스
#[derive(Debug)]
pub struct FailedCase {
    pub failure: CaseFailure,
    pub elapsed: Duration,
}

/// suite 실행 결과
#[derive(Debug)]
pub struct SuiteReport {
    pub display_name: String,
    pub passed: Vec<PassedCase>,
    pub failed: Vec<FailedCase>,
    pub skipped: Vec<SkippedEntry>,
}

impl SuiteReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure(&self, scenario: &str) -> Option<&CaseFailure> {
        self.failed
            .iter()
            .map(|f| &f.failure)
            .find(|f| f.scenario == scenario)
    }

    pub fn passed_names(&self) -> Vec<&'static str> {
        self.passed.iter().map(|p| p.scenario).collect()
    }
}
