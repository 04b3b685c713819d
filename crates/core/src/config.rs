//! 설정 관리 — certconform.toml 파싱 및 런타임 설정
//!
//! [`ConformanceConfig`]는 로깅, 타이밍, 인증 대상 백엔드 목록을 담는
//! 최상위 구조체입니다. suite는 플래그를 직접 파싱하지 않고,
//! 여기서 해석된 값만 받습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CERTCONFORM_TIMING_POLL_INTERVAL_MS=250` 형식)
//! 3. 설정 파일 (`certconform.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), certconform_core::error::CertconformError> {
//! use certconform_core::config::ConformanceConfig;
//!
//! let config = ConformanceConfig::load("certconform.toml").await?;
//! let config = ConformanceConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capability::CapabilitySet;
use crate::error::{CertconformError, ConfigError};
use crate::types::TargetRef;

/// 설정 상한값 상수
const MAX_TIMEOUT_SECS: u64 = 24 * 3600;
const MAX_POLL_INTERVAL_MS: u64 = 10_000;
const MAX_CONFLICT_ATTEMPTS: u32 = 50;
const MAX_TRANSIENT_FAILURES: u32 = 20;
const MAX_CONCURRENT_CASES: usize = 256;

/// certconform 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConformanceConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 대기/재시도 타이밍 설정
    #[serde(default)]
    pub timing: TimingConfig,
    /// 인증할 백엔드 목록
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl ConformanceConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CertconformError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CertconformError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CertconformError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CertconformError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CertconformError> {
        toml::from_str(toml_str).map_err(|e| {
            CertconformError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CERTCONFORM_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "CERTCONFORM_GENERAL_LOG_LEVEL");
        override_string(
            &mut self.general.log_format,
            "CERTCONFORM_GENERAL_LOG_FORMAT",
        );

        override_u64(
            &mut self.timing.issuance_timeout_secs,
            "CERTCONFORM_TIMING_ISSUANCE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.timing.extended_timeout_secs,
            "CERTCONFORM_TIMING_EXTENDED_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.timing.poll_interval_ms,
            "CERTCONFORM_TIMING_POLL_INTERVAL_MS",
        );
        override_u32(
            &mut self.timing.max_transient_failures,
            "CERTCONFORM_TIMING_MAX_TRANSIENT_FAILURES",
        );
        override_u32(
            &mut self.timing.conflict_max_attempts,
            "CERTCONFORM_TIMING_CONFLICT_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.timing.conflict_backoff_ms,
            "CERTCONFORM_TIMING_CONFLICT_BACKOFF_MS",
        );
        override_usize(
            &mut self.timing.max_concurrent_cases,
            "CERTCONFORM_TIMING_MAX_CONCURRENT_CASES",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CertconformError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        self.timing.validate()?;

        let mut seen = std::collections::HashSet::new();
        for (idx, backend) in self.backends.iter().enumerate() {
            backend.validate(idx)?;
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("backends[{idx}].name"),
                    reason: format!("duplicate backend name '{}'", backend.name),
                }
                .into());
            }
        }

        Ok(())
    }

    /// 이름으로 백엔드 설정을 찾습니다.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> String {
    "pretty".to_owned()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// 대기/재시도 타이밍 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// 단일 발급 대기 타임아웃 (초)
    pub issuance_timeout_secs: u64,
    /// 두 번의 검증 라운드가 필요한 시나리오의 타임아웃 (초)
    pub extended_timeout_secs: u64,
    /// 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 연속 허용되는 일시적 읽기 실패 횟수
    pub max_transient_failures: u32,
    /// 충돌 재시도 최대 시도 횟수
    pub conflict_max_attempts: u32,
    /// 충돌 재시도 간격 (밀리초)
    pub conflict_backoff_ms: u64,
    /// 동시에 실행하는 케이스 최대 수
    pub max_concurrent_cases: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            issuance_timeout_secs: 8 * 60,
            extended_timeout_secs: 16 * 60,
            poll_interval_ms: 500,
            max_transient_failures: 3,
            conflict_max_attempts: 5,
            conflict_backoff_ms: 10,
            max_concurrent_cases: 8,
        }
    }
}

impl TimingConfig {
    pub fn issuance_timeout(&self) -> Duration {
        Duration::from_secs(self.issuance_timeout_secs)
    }

    pub fn extended_timeout(&self) -> Duration {
        Duration::from_secs(self.extended_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn conflict_backoff(&self) -> Duration {
        Duration::from_millis(self.conflict_backoff_ms)
    }

    /// 타이밍 값의 범위를 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuance_timeout_secs == 0 || self.issuance_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "timing.issuance_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TIMEOUT_SECS}"),
            });
        }

        if self.extended_timeout_secs < self.issuance_timeout_secs
            || self.extended_timeout_secs > MAX_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "timing.extended_timeout_secs".to_owned(),
                reason: format!("must be issuance_timeout_secs-{MAX_TIMEOUT_SECS}"),
            });
        }

        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                field: "timing.poll_interval_ms".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_MS}"),
            });
        }

        if self.max_transient_failures > MAX_TRANSIENT_FAILURES {
            return Err(ConfigError::InvalidValue {
                field: "timing.max_transient_failures".to_owned(),
                reason: format!("must be 0-{MAX_TRANSIENT_FAILURES}"),
            });
        }

        if self.conflict_max_attempts == 0 || self.conflict_max_attempts > MAX_CONFLICT_ATTEMPTS {
            return Err(ConfigError::InvalidValue {
                field: "timing.conflict_max_attempts".to_owned(),
                reason: format!("must be 1-{MAX_CONFLICT_ATTEMPTS}"),
            });
        }

        if self.max_concurrent_cases == 0 || self.max_concurrent_cases > MAX_CONCURRENT_CASES {
            return Err(ConfigError::InvalidValue {
                field: "timing.max_concurrent_cases".to_owned(),
                reason: format!("must be 1-{MAX_CONCURRENT_CASES}"),
            });
        }

        Ok(())
    }
}

/// 인증 대상 백엔드 하나의 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// suite 표시 이름
    pub name: String,
    /// 요청 리소스를 생성할 namespace
    pub namespace: String,
    /// 생성되는 DNS 이름의 접미사 (없으면 suite 기본값)
    #[serde(default)]
    pub domain_suffix: Option<String>,
    /// 테스트 대상 백엔드 참조
    pub target: TargetRef,
    /// 지원하지 않는다고 선언한 capability
    #[serde(default)]
    pub unsupported: CapabilitySet,
}

impl BackendConfig {
    fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("backends[{idx}].name"),
                reason: "name must not be empty".to_owned(),
            });
        }
        if self.target.name.is_empty() || self.target.kind.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("backends[{idx}].target"),
                reason: "target kind and name must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(v) => *target = v,
            Err(_) => {
                warn!(env_key, value = %val, "invalid u32 value in environment variable, keeping original");
            }
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(v) => *target = v,
            Err(_) => {
                warn!(env_key, value = %val, "invalid u64 value in environment variable, keeping original");
            }
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(v) => *target = v,
            Err(_) => {
                warn!(env_key, value = %val, "invalid usize value in environment variable, keeping original");
            }
        }
    }
}
