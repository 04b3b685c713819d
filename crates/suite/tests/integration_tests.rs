//! 적합성 suite 통합 테스트
//!
//! rcgen 기반 인메모리 발급 백엔드(`support::FakeIssuer`)를 대상으로
//! complete → define → run 전체 흐름을 검증합니다.

mod support;

use std::sync::Arc;
use std::time::Duration;

use certconform_core::capability::Capability;
use certconform_core::client::ResourceClient;
use certconform_suite::{
    ConformanceError, Namer, RandomNamer, SequenceNamer, Suite, SuiteReport,
};
use tokio_util::sync::CancellationToken;

use support::{Behaviour, FakeIssuer, Fault, FaultyBackend, register};

async fn run_all(unsupported: Vec<Capability>, behaviour: Behaviour) -> SuiteReport {
    let registration = register(unsupported);
    let client = Arc::new(FakeIssuer::with_behaviour(behaviour));
    Suite::run(
        registration,
        client,
        Arc::new(RandomNamer),
        CancellationToken::new(),
    )
    .await
}

/// 단일 케이스를 실행하고 결과를 반환합니다.
async fn run_one<C: ResourceClient>(
    name: &str,
    unsupported: Vec<Capability>,
    client: Arc<C>,
    namer: &dyn Namer,
    cancel: CancellationToken,
) -> Result<(), ConformanceError> {
    let registration = register(unsupported);
    let case = registration
        .case(name)
        .unwrap_or_else(|| panic!("case '{name}' should be registered"));
    case.run(client, namer, cancel)
        .await
        .map(|_| ())
        .map_err(|failed| failed.failure.error)
}

fn failed_validators(err: &ConformanceError) -> Vec<&'static str> {
    match err {
        ConformanceError::Validation(failures) => failures.validators(),
        other => panic!("expected validation failure, got {other}"),
    }
}

// --- 전체 실행 ---

#[tokio::test]
async fn fully_capable_backend_passes_every_case() {
    let report = run_all(Vec::new(), Behaviour::default()).await;

    for failed in &report.failed {
        eprintln!("{}: {}", failed.failure.scenario, failed.failure.error);
    }
    assert!(report.is_success());
    assert_eq!(report.passed.len(), 19);
    assert!(report.skipped.is_empty());
    assert_eq!(report.display_name, "fake-ca");
}

#[tokio::test]
async fn unsupported_capabilities_skip_cases_and_validators() {
    let report = run_all(
        vec![Capability::Ed25519, Capability::Wildcards, Capability::ReusePrivateKey],
        Behaviour::default(),
    )
    .await;

    assert!(report.is_success());
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.name).collect();
    assert!(skipped.contains(&"ed25519-key"));
    assert!(skipped.contains(&"wildcard-dns-name"));
    assert!(skipped.contains(&"wildcard-and-apex"));
    assert!(skipped.contains(&"reissue-reuses-private-key"));
    assert_eq!(report.passed.len() + report.skipped.len(), 19);
    assert!(!report.passed_names().contains(&"ed25519-key"));
}

#[tokio::test]
async fn failing_case_does_not_abort_the_others() {
    // 30일짜리 인증서만 발급하는 백엔드: duration 검사가 모든 케이스에서 실패
    let behaviour = Behaviour {
        fixed_validity: Some(Duration::from_secs(30 * 24 * 60 * 60)),
        ..Behaviour::default()
    };
    let report = run_all(Vec::new(), behaviour).await;

    assert!(!report.is_success());
    assert_eq!(report.passed.len() + report.failed.len(), 19);
    let failure = report
        .failure("single-dns-name")
        .expect("single-dns-name should fail");
    assert_eq!(failed_validators(&failure.error), vec!["duration-matches"]);
    assert!(failure.permitted_by.is_empty());
}

// --- capability gating ---

#[tokio::test]
async fn duration_unsupported_ignores_backend_validity() {
    let behaviour = Behaviour {
        fixed_validity: Some(Duration::from_secs(30 * 24 * 60 * 60)),
        ..Behaviour::default()
    };
    let client = Arc::new(FakeIssuer::with_behaviour(behaviour));
    let namer = SequenceNamer::new("foo");

    let registration = register([Capability::Duration]);
    assert!(registration.skipped_names().contains(&"custom-duration"));

    run_one(
        "single-dns-name",
        vec![Capability::Duration],
        Arc::clone(&client),
        &namer,
        CancellationToken::new(),
    )
    .await
    .expect("duration must not be checked");

    let submitted = client
        .certificate("conformance-foo")
        .await
        .expect("request stored under the namer suffix");
    assert_eq!(submitted.spec.dns_names, vec!["foo.example.com".to_owned()]);
    assert_eq!(submitted.spec.secret_name, "conformance-foo-tls");
}

#[tokio::test]
async fn missing_ca_fails_trust_chain_unless_declared() {
    let behaviour = Behaviour {
        omit_ca: true,
        ..Behaviour::default()
    };

    let err = run_one(
        "single-dns-name",
        Vec::new(),
        Arc::new(FakeIssuer::with_behaviour(behaviour.clone())),
        &RandomNamer,
        CancellationToken::new(),
    )
    .await
    .expect_err("ca.crt is expected");
    let validators = failed_validators(&err);
    assert!(validators.contains(&"trust-chain-valid"));
    assert!(!validators.contains(&"root-ca-valid"));

    run_one(
        "single-dns-name",
        vec![Capability::SaveCaToSecret],
        Arc::new(FakeIssuer::with_behaviour(behaviour)),
        &RandomNamer,
        CancellationToken::new(),
    )
    .await
    .expect("trust chain is not checked when the CA is not stored");
}

// --- 대기 ---

#[tokio::test(start_paused = true)]
async fn never_ready_backend_times_out_after_standard_timeout() {
    let client = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        never_ready: true,
        ..Behaviour::default()
    }));

    let err = run_one("single-dns-name", Vec::new(), client, &RandomNamer, CancellationToken::new())
        .await
        .expect_err("should time out");

    match err {
        ConformanceError::Timeout {
            elapsed,
            last_observed,
            ..
        } => {
            assert!(elapsed >= Duration::from_secs(10));
            assert!(elapsed < Duration::from_secs(10) + Duration::from_millis(100));
            assert!(last_observed.contains("Ready=Unknown"));
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn wildcard_and_apex_uses_extended_timeout() {
    let client = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        never_ready: true,
        ..Behaviour::default()
    }));

    let err = run_one("wildcard-and-apex", Vec::new(), client, &RandomNamer, CancellationToken::new())
        .await
        .expect_err("should time out");

    match err {
        ConformanceError::Timeout { elapsed, .. } => {
            assert!(elapsed >= Duration::from_secs(20));
            assert!(elapsed < Duration::from_secs(21));
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn hung_read_is_bounded_by_case_timeout() {
    let client = Arc::new(FaultyBackend::new(Fault::HangingReads));

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        run_one("single-dns-name", Vec::new(), client, &RandomNamer, CancellationToken::new()),
    )
    .await
    .expect("case must finish within its own timeout");

    match outcome.expect_err("should time out") {
        ConformanceError::Timeout { elapsed, .. } => {
            assert!(elapsed >= Duration::from_secs(10));
            assert!(elapsed < Duration::from_secs(10) + Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn hung_create_is_bounded_by_case_timeout() {
    let client = Arc::new(FaultyBackend::new(Fault::HangingCreates));

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        run_one("single-dns-name", Vec::new(), client, &RandomNamer, CancellationToken::new()),
    )
    .await
    .expect("case must finish within its own timeout");

    match outcome.expect_err("should time out") {
        ConformanceError::Timeout {
            elapsed,
            last_observed,
            ..
        } => {
            assert!(elapsed >= Duration::from_secs(10));
            assert!(elapsed < Duration::from_secs(10) + Duration::from_millis(100));
            assert_eq!(last_observed, "create request still pending");
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test]
async fn transient_read_failures_within_budget_are_tolerated() {
    let client = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        transient_reads: 2,
        ..Behaviour::default()
    }));

    run_one("ecdsa-key", Vec::new(), client, &RandomNamer, CancellationToken::new())
        .await
        .expect("two transient failures are below the limit of three");
}

#[tokio::test]
async fn persistent_read_failures_fail_with_fetch() {
    let client = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        transient_reads: 10,
        ..Behaviour::default()
    }));

    let err = run_one("ecdsa-key", Vec::new(), client, &RandomNamer, CancellationToken::new())
        .await
        .expect_err("fourth consecutive failure exceeds the limit");
    assert!(matches!(err, ConformanceError::Fetch { .. }), "{err}");
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_a_waiting_case() {
    let client = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        never_ready: true,
        ..Behaviour::default()
    }));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = run_one("single-dns-name", Vec::new(), client, &RandomNamer, cancel)
        .await
        .expect_err("should be cancelled");
    assert!(matches!(err, ConformanceError::Cancelled { .. }), "{err}");
}

// --- 생성 거부 ---

#[tokio::test]
async fn rejected_creation_is_reported_as_creation_error() {
    let client = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        reject_creates: true,
        ..Behaviour::default()
    }));

    let err = run_one("single-dns-name", Vec::new(), Arc::clone(&client), &RandomNamer, CancellationToken::new())
        .await
        .expect_err("creation is refused");
    assert!(matches!(err, ConformanceError::Creation { .. }), "{err}");
    assert!(err.to_string().contains("refuses"));
    assert_eq!(client.certificate_count().await, 0);
}

// --- 생명주기 ---

#[tokio::test]
async fn update_succeeds_when_conflicts_fit_the_budget() {
    let client = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        injected_conflicts: 4,
        ..Behaviour::default()
    }));
    let namer = SequenceNamer::new("upd");

    run_one("update-adds-dns-name", Vec::new(), Arc::clone(&client), &namer, CancellationToken::new())
        .await
        .expect("four conflicts leave a fifth attempt");

    let updated = client.certificate("conformance-upd").await.expect("stored");
    assert_eq!(updated.metadata.generation, 2);
    assert!(
        updated
            .spec
            .dns_names
            .contains(&"extra.upd.example.com".to_owned())
    );
}

#[tokio::test]
async fn update_fails_when_conflicts_exhaust_the_budget() {
    let client = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        injected_conflicts: 5,
        ..Behaviour::default()
    }));

    let err = run_one("update-adds-dns-name", Vec::new(), client, &RandomNamer, CancellationToken::new())
        .await
        .expect_err("every attempt conflicts");
    match err {
        ConformanceError::Conflict { attempts, .. } => assert_eq!(attempts, 5),
        other => panic!("expected conflict, got {other}"),
    }
}

#[tokio::test]
async fn reissue_after_clearing_artifact_revalidates() {
    let client = Arc::new(FakeIssuer::new());
    let namer = SequenceNamer::new("re");

    run_one("reissue-after-artifact-cleared", Vec::new(), Arc::clone(&client), &namer, CancellationToken::new())
        .await
        .expect("reissue should pass");

    let cert = client.certificate("conformance-re").await.expect("stored");
    assert_eq!(cert.status.revision, Some(2));
}

#[tokio::test]
async fn key_reuse_is_verified_across_reissue() {
    run_one(
        "reissue-reuses-private-key",
        Vec::new(),
        Arc::new(FakeIssuer::new()),
        &RandomNamer,
        CancellationToken::new(),
    )
    .await
    .expect("key must be kept");

    let rotating = Arc::new(FakeIssuer::with_behaviour(Behaviour {
        always_rotate: true,
        ..Behaviour::default()
    }));
    let err = run_one("reissue-reuses-private-key", Vec::new(), rotating, &RandomNamer, CancellationToken::new())
        .await
        .expect_err("rotating backend breaks the Never policy");
    assert_eq!(failed_validators(&err), vec!["private-key-reused"]);
}

// --- 비정상 종료 ---

#[tokio::test]
async fn panicking_case_is_reported_as_failed() {
    let report = Suite::run(
        register(Vec::new()),
        Arc::new(FaultyBackend::new(Fault::PanickingCreates)),
        Arc::new(SequenceNamer::new("crash")),
        CancellationToken::new(),
    )
    .await;

    assert!(!report.is_success());
    assert!(report.passed.is_empty());
    assert_eq!(report.failed.len(), 19);

    let failure = report
        .failure("single-dns-name")
        .expect("single-dns-name should be reported");
    assert!(failure.case_id.starts_with("conformance-crash"));
    match &failure.error {
        ConformanceError::Aborted { reason } => {
            assert!(reason.contains("backend client crashed"), "{reason}");
        }
        other => panic!("expected aborted, got {other}"),
    }
}
