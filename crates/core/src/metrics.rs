//! 메트릭 상수 및 설명 등록
//!
//! 적합성 실행 중 기록하는 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! suite 크레이트는 이 상수로 `metrics::counter!()`, `metrics::histogram!()`을 호출합니다.
//! exporter 설치는 이 저장소의 범위가 아니며, 레코더가 없으면 기록은 무시됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `certconform_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (pass, fail)
pub const LABEL_RESULT: &str = "result";

/// 시나리오 이름 레이블 키
pub const LABEL_SCENARIO: &str = "scenario";

/// validator 이름 레이블 키
pub const LABEL_VALIDATOR: &str = "validator";

/// 대기 대상 레이블 키 (certificate, secret)
pub const LABEL_WAIT_TARGET: &str = "target";

// ─── Suite 메트릭 ──────────────────────────────────────────────────

/// 실행된 케이스 수 (counter, label: result)
pub const SUITE_CASES_TOTAL: &str = "certconform_suite_cases_total";

/// gating으로 등록되지 않은 시나리오 수 (counter)
pub const SUITE_CASES_SKIPPED_TOTAL: &str = "certconform_suite_cases_skipped_total";

/// 케이스 실행 시간 (histogram, 초)
pub const SUITE_CASE_DURATION_SECONDS: &str = "certconform_suite_case_duration_seconds";

/// validator 실패 수 (counter, label: validator)
pub const VALIDATION_FAILURES_TOTAL: &str = "certconform_validation_failures_total";

// ─── Waiter 메트릭 ─────────────────────────────────────────────────

/// 폴링 요청 수 (counter, label: target)
pub const WAITER_POLLS_TOTAL: &str = "certconform_waiter_polls_total";

/// 조건 충족까지 걸린 시간 (histogram, 초, label: target)
pub const WAITER_WAIT_DURATION_SECONDS: &str = "certconform_waiter_wait_duration_seconds";

/// 충돌로 인한 재시도 수 (counter)
pub const CONFLICT_RETRIES_TOTAL: &str = "certconform_conflict_retries_total";

/// 모든 메트릭 이름 목록
pub const ALL_METRIC_NAMES: [&str; 7] = [
    SUITE_CASES_TOTAL,
    SUITE_CASES_SKIPPED_TOTAL,
    SUITE_CASE_DURATION_SECONDS,
    VALIDATION_FAILURES_TOTAL,
    WAITER_POLLS_TOTAL,
    WAITER_WAIT_DURATION_SECONDS,
    CONFLICT_RETRIES_TOTAL,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        SUITE_CASES_TOTAL,
        "Conformance cases executed, labelled by result"
    );
    describe_counter!(
        SUITE_CASES_SKIPPED_TOTAL,
        "Catalog entries not registered because a required capability is unsupported"
    );
    describe_histogram!(
        SUITE_CASE_DURATION_SECONDS,
        "Wall-clock duration of a conformance case in seconds"
    );
    describe_counter!(
        VALIDATION_FAILURES_TOTAL,
        "Failed post-condition assertions, labelled by validator"
    );
    describe_counter!(WAITER_POLLS_TOTAL, "Observation polls issued by the waiter");
    describe_histogram!(
        WAITER_WAIT_DURATION_SECONDS,
        "Time until a waited-for predicate held, in seconds"
    );
    describe_counter!(
        CONFLICT_RETRIES_TOTAL,
        "Update attempts retried after an optimistic-concurrency conflict"
    );
}
