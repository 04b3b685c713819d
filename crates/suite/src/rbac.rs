//! 권한 매트릭스 하위 suite
//!
//! 기본 집계 role(`view`, `edit`, `admin`)이 인증서 관련 리소스에 대해
//! 기대한 권한을 갖는지 [`AccessReviewer`]로 확인합니다.
//! probe는 부작용이 없어야 하며, 각 기대값이 독립된 케이스로 등록됩니다.

use std::collections::HashMap;

use certconform_core::client::{AccessRequest, AccessReviewer, Verb};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ConformanceError;

/// 집계 role
pub const ROLES: [&str; 3] = ["view", "edit", "admin"];

/// 검사 대상 리소스 (복수형)
pub const RESOURCES: [&str; 3] = ["certificates", "certificaterequests", "issuers"];

/// 단일 기대값: 이 요청이 허용되어야 하는가?
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessExpectation {
    pub request: AccessRequest,
    pub allowed: bool,
}

impl AccessExpectation {
    /// 케이스 이름 (`view-create-issuers`)
    pub fn name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.request.role, self.request.verb, self.request.resource
        )
    }

    /// probe 한 번으로 기대값을 확인합니다.
    pub async fn check<R: AccessReviewer>(&self, reviewer: &R) -> Result<(), ConformanceError> {
        let actual = reviewer
            .review(&self.request)
            .await
            .map_err(|source| ConformanceError::Fetch {
                target: format!("access review '{}'", self.request),
                source,
            })?;
        if actual == self.allowed {
            Ok(())
        } else {
            Err(ConformanceError::Authorization {
                role: self.request.role.clone(),
                verb: self.request.verb.to_string(),
                resource: self.request.resource.clone(),
                expected: self.allowed,
                actual,
            })
        }
    }
}

/// role × verb × resource 기대값 테이블
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationMatrix {
    pub namespace: String,
    expectations: Vec<AccessExpectation>,
}

impl AuthorizationMatrix {
    /// 기본 집계 role 기대값을 생성합니다.
    ///
    /// 읽기 verb는 세 role 모두 허용, 쓰기 verb는 `view`만 거부됩니다.
    pub fn aggregated_roles(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let mut expectations = Vec::with_capacity(ROLES.len() * RESOURCES.len() * 8);
        for role in ROLES {
            for resource in RESOURCES {
                for verb in Verb::READ.into_iter().chain(Verb::WRITE) {
                    let allowed = Verb::READ.contains(&verb) || role != "view";
                    expectations.push(AccessExpectation {
                        request: AccessRequest {
                            role: role.to_owned(),
                            verb,
                            resource: resource.to_owned(),
                            namespace: namespace.clone(),
                        },
                        allowed,
                    });
                }
            }
        }
        Self {
            namespace,
            expectations,
        }
    }

    /// 기대값 하나를 추가합니다. 같은 role/verb/resource에 대한 기존 행은
    /// 덮어쓰지 않으며, 모순되면 [`define`](Self::define)이 거부합니다.
    pub fn expect(mut self, expectation: AccessExpectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    pub fn expectations(&self) -> &[AccessExpectation] {
        &self.expectations
    }

    /// 기대값마다 케이스 하나를 등록합니다.
    ///
    /// 동일한 기대값은 한 번만 등록됩니다. 같은 요청에 서로 다른 허용 여부를
    /// 기대하거나 다른 namespace를 겨냥한 행은 설정 에러입니다.
    pub fn define(&self) -> Result<Vec<AuthorizationCase>, ConformanceError> {
        let mut registered: HashMap<String, bool> = HashMap::new();
        let mut cases = Vec::with_capacity(self.expectations.len());
        for expectation in &self.expectations {
            let name = expectation.name();
            if expectation.request.namespace != self.namespace {
                return Err(ConformanceError::configuration(
                    "authorization.namespace",
                    format!(
                        "case '{name}' targets namespace '{}' instead of '{}'",
                        expectation.request.namespace, self.namespace
                    ),
                ));
            }
            match registered.get(&name) {
                Some(&allowed) if allowed == expectation.allowed => continue,
                Some(_) => {
                    return Err(ConformanceError::configuration(
                        "authorization.expectations",
                        format!("case '{name}' is expected both allowed and denied"),
                    ));
                }
                None => {}
            }
            registered.insert(name.clone(), expectation.allowed);
            cases.push(AuthorizationCase {
                name,
                expectation: expectation.clone(),
            });
        }
        Ok(cases)
    }

    /// 등록된 모든 케이스를 probe하고 불일치를 모읍니다. 한 probe의 실패가
    /// 나머지를 중단시키지 않습니다.
    pub async fn run<R: AccessReviewer>(
        &self,
        reviewer: &R,
    ) -> Result<AuthorizationReport, ConformanceError> {
        let cases = self.define()?;
        let mut report = AuthorizationReport::default();
        for case in cases {
            match case.run(reviewer).await {
                Ok(()) => report.passed.push(case.name),
                Err(err) => {
                    warn!(case = %case.name, error = %err, "authorization expectation not met");
                    report.failed.push((case.name, err));
                }
            }
        }
        info!(
            namespace = %self.namespace,
            passed = report.passed.len(),
            failed = report.failed.len(),
            "authorization matrix finished"
        );
        Ok(report)
    }
}

/// 등록된 권한 케이스
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationCase {
    pub name: String,
    pub expectation: AccessExpectation,
}

impl AuthorizationCase {
    pub async fn run<R: AccessReviewer>(&self, reviewer: &R) -> Result<(), ConformanceError> {
        self.expectation.check(reviewer).await
    }
}

/// 권한 매트릭스 실행 결과
#[derive(Debug, Default)]
pub struct AuthorizationReport {
    pub passed: Vec<String>,
    pub failed: Vec<(String, ConformanceError)>,
}

impl AuthorizationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
