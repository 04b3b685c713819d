#![doc = include_str!("../README.md")]

pub mod capability;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CertconformError, ClientError, ConfigError};

// 설정
pub use config::{BackendConfig, ConformanceConfig, GeneralConfig, TimingConfig};

// capability
pub use capability::{Capability, CapabilitySet};

// 협력자 trait
pub use client::{AccessRequest, AccessReviewer, ResourceClient, ResourceClientExt, Verb};

// 도메인 타입
pub use types::{
    Certificate, CertificateSpec, CertificateStatus, Condition, ConditionKind, ConditionStatus,
    KeyAlgorithm, KeyUsage, ObjectMeta, PrivateKeySpec, Resource, ResourceKey, ResourceKind,
    RotationPolicy, Secret, TargetRef,
};
