#![doc = include_str!("../README.md")]

pub mod artifact;
mod case;
pub mod catalog;
pub mod error;
pub mod lifecycle;
pub mod namer;
pub mod rbac;
pub mod retry;
pub mod suite;
pub mod validation;
pub mod waiter;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CaseFailure, ConformanceError, ValidationError, ValidationFailures};

// 오케스트레이션
pub use suite::{
    FailedCase, PassedCase, Registration, RegisteredCase, SkippedEntry, Suite, SuiteConfig,
    SuiteReport, SuiteSpec,
};

// 카탈로그와 gating
pub use catalog::{BuildContext, CaseDefinition, Gate, Scenario, TimeoutClass, gate};
pub use lifecycle::LifecycleProcedure;

// 검증
pub use artifact::IssuedArtifact;
pub use validation::{Validator, compose, run_validators};

// 대기/재시도
pub use namer::{Namer, RandomNamer, SequenceNamer};
pub use retry::{ConflictBudget, retry_on_conflict};
pub use waiter::Waiter;

// 권한 매트릭스
pub use rbac::{AccessExpectation, AuthorizationCase, AuthorizationMatrix, AuthorizationReport};
