//! 적합성 엔진 에러 타입
//!
//! [`ConformanceError`]는 케이스 하나의 실행 중 발생하는 모든 실패를 표현합니다.
//! 에러는 소속 케이스 범위에 머무르며, 한 케이스의 실패가 다른 케이스를 중단시키지 않습니다.
//! `From<ConformanceError> for CertconformError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use std::fmt;
use std::time::Duration;

use certconform_core::capability::CapabilitySet;
use certconform_core::error::{CertconformError, ClientError};

/// 적합성 케이스 실패 분류
#[derive(Debug, thiserror::Error)]
pub enum ConformanceError {
    /// suite 필수 필드 누락 또는 잘못된 생명주기 호출 (재시도하지 않음)
    #[error("configuration error: {field}: {reason}")]
    Configuration {
        /// 문제가 된 필드
        field: String,
        /// 사유
        reason: String,
    },

    /// 백엔드가 생성 요청을 거부함 (계약 위반, 재시도하지 않음)
    #[error("creating {target} failed: {source}")]
    Creation {
        target: String,
        #[source]
        source: ClientError,
    },

    /// 제한 시간 내에 조건이 충족되지 않음
    #[error("timed out after {elapsed:?} waiting for {target}; last observed: {last_observed}")]
    Timeout {
        target: String,
        elapsed: Duration,
        /// 마지막으로 관찰한 상태 요약
        last_observed: String,
    },

    /// 관찰 대상 읽기가 지속적으로 실패함
    #[error("fetching {target} failed: {source}")]
    Fetch {
        target: String,
        #[source]
        source: ClientError,
    },

    /// 실행 범위 토큰이 취소됨
    #[error("cancelled while working on {target}")]
    Cancelled { target: String },

    /// 충돌 재시도 예산 초과
    #[error("update of {target} still conflicting after {attempts} attempts")]
    Conflict { target: String, attempts: u32 },

    /// 충돌이 아닌 이유로 갱신 실패
    #[error("updating {target} failed: {source}")]
    Update {
        target: String,
        #[source]
        source: ClientError,
    },

    /// 사후 조건 검증 실패
    #[error("{0}")]
    Validation(ValidationFailures),

    /// 케이스 task가 panic했거나 완료 전에 중단됨
    #[error("case task ended abnormally: {reason}")]
    Aborted { reason: String },

    /// 권한 매트릭스 불일치
    #[error(
        "authorization mismatch for role '{role}' {verb} {resource}: expected allowed={expected}, got allowed={actual}"
    )]
    Authorization {
        role: String,
        verb: String,
        resource: String,
        expected: bool,
        actual: bool,
    },
}

impl ConformanceError {
    pub(crate) fn configuration(field: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    /// 메트릭/리포트용 고정 분류명
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Creation { .. } => "creation",
            Self::Timeout { .. } => "timeout",
            Self::Fetch { .. } => "fetch",
            Self::Cancelled { .. } => "cancelled",
            Self::Conflict { .. } => "conflict",
            Self::Update { .. } => "update",
            Self::Validation(_) => "validation",
            Self::Aborted { .. } => "aborted",
            Self::Authorization { .. } => "authorization",
        }
    }
}

/// 단일 검증 실패: 기대값과 실제값을 함께 보관합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{validator}: expected {expected}, got {actual}")]
pub struct ValidationError {
    /// 실패한 validator 이름
    pub validator: &'static str,
    pub expected: String,
    pub actual: String,
}

impl ValidationError {
    pub fn new(
        validator: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            validator,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// 한 케이스에서 수집된 모든 검증 실패
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailures(pub Vec<ValidationError>);

impl ValidationFailures {
    /// 실패한 validator 이름 목록
    pub fn validators(&self) -> Vec<&'static str> {
        self.0.iter().map(|e| e.validator).collect()
    }
}

impl fmt::Display for ValidationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation failure(s): ", self.0.len())?;
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// 케이스 실패와 그 맥락
///
/// 사용자에게 보이는 실패는 항상 시나리오, 실행을 허용한 gating,
/// 구체적인 실패 원인을 함께 보여줍니다.
#[derive(Debug, thiserror::Error)]
#[error(
    "scenario '{scenario}' (case {case_id}, required capabilities {permitted_by} all supported): {error}"
)]
pub struct CaseFailure {
    pub scenario: String,
    /// 케이스 실행마다 생성된 고유 이름
    pub case_id: String,
    /// 이 케이스의 실행을 허용한 required capability 집합
    pub permitted_by: CapabilitySet,
    #[source]
    pub error: ConformanceError,
}

impl From<ConformanceError> for CertconformError {
    fn from(err: ConformanceError) -> Self {
        CertconformError::Conformance(err.to_string())
    }
}

impl From<CaseFailure> for CertconformError {
    fn from(err: CaseFailure) -> Self {
        CertconformError::Conformance(err.to_string())
    }
}
