//! 에러 타입 — 도메인별 에러 정의

/// certconform 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CertconformError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 리소스 클라이언트 에러
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// 적합성 검증 실패 (suite 크레이트에서 변환됨)
    #[error("conformance error: {0}")]
    Conformance(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 리소스 클라이언트 에러
///
/// 테스트 대상 백엔드와 통신하는 CRUD 클라이언트가 반환합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// 리소스가 존재하지 않음
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// 낙관적 동시성 충돌 (resource version 불일치)
    #[error("conflict updating {kind} '{name}': {reason}")]
    Conflict {
        kind: String,
        name: String,
        reason: String,
    },

    /// 동일한 이름의 리소스가 이미 존재함
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    /// 백엔드가 요청을 거부함
    #[error("request rejected: {0}")]
    Rejected(String),

    /// 전송 계층 에러 (일시적일 수 있음)
    #[error("transport error: {0}")]
    Transport(String),

    /// 기대한 것과 다른 종류의 리소스가 반환됨
    #[error("expected {expected}, got {actual}")]
    UnexpectedKind { expected: String, actual: String },
}

impl ClientError {
    /// 재시도하면 성공할 수 있는 읽기 에러인지 판단합니다.
    ///
    /// 최종 일관성 때문에 방금 생성된 리소스가 잠시 보이지 않을 수 있으므로
    /// `NotFound`도 일시적 에러로 취급합니다.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotFound { .. })
    }

    /// 낙관적 동시성 충돌인지 확인합니다.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
