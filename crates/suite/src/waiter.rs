//! Polling primitives for eventually consistent backend state.
//!
//! [`Waiter`] repeatedly reads an object until a predicate holds, the
//! deadline passes or the run-scoped [`CancellationToken`] fires. It sleeps
//! `poll_interval` between reads, clamped so that the final read happens at
//! the deadline.

use std::future::Future;
use std::time::Duration;

use certconform_core::client::{ResourceClient, ResourceClientExt};
use certconform_core::config::TimingConfig;
use certconform_core::error::ClientError;
use certconform_core::metrics as m;
use certconform_core::types::{Certificate, ConditionKind, ConditionStatus, ResourceKind, Secret};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ConformanceError;

/// Objects a waiter can describe in timeout errors and label metrics with.
pub trait Observed {
    /// Metric label for this kind of object.
    const KIND: &'static str;

    /// Short description of the observed state.
    fn observed(&self) -> String;
}

impl Observed for Certificate {
    const KIND: &'static str = "certificate";

    fn observed(&self) -> String {
        self.summary()
    }
}

impl Observed for Secret {
    const KIND: &'static str = "secret";

    fn observed(&self) -> String {
        let fields: Vec<String> = self
            .data
            .iter()
            .map(|(key, value)| format!("{key}({} bytes)", value.len()))
            .collect();
        format!("fields=[{}]", fields.join(", "))
    }
}

/// Issuance predicate: the backend has reached a decision for `generation`.
///
/// Ready must be present with status True or False, observed at exactly the
/// submitted generation, and issuance must not be in progress.
pub fn issuance_settled(certificate: &Certificate, generation: i64) -> bool {
    if certificate.metadata.generation < generation {
        return false;
    }
    let issuing = certificate
        .condition(ConditionKind::Issuing)
        .is_some_and(|c| c.status == ConditionStatus::True);
    if issuing {
        return false;
    }
    certificate
        .condition(ConditionKind::Ready)
        .is_some_and(|c| c.status.is_decided() && c.observed_generation == generation)
}

/// Bounded, cancellable poll loop.
#[derive(Debug, Clone)]
pub struct Waiter {
    poll_interval: Duration,
    max_transient_failures: u32,
    cancel: CancellationToken,
}

impl Waiter {
    pub fn new(
        poll_interval: Duration,
        max_transient_failures: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            poll_interval,
            max_transient_failures,
            cancel,
        }
    }

    pub fn from_timing(timing: &TimingConfig, cancel: CancellationToken) -> Self {
        Self::new(
            timing.poll_interval(),
            timing.max_transient_failures,
            cancel,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Polls `fetch` until `predicate` holds and returns the first object
    /// that satisfied it.
    ///
    /// Transient read errors are tolerated up to `max_transient_failures`
    /// in a row; any other read error fails immediately.
    pub async fn wait_until<T, F, Fut, P>(
        &self,
        target: &str,
        mut fetch: F,
        predicate: P,
        timeout: Duration,
    ) -> Result<T, ConformanceError>
    where
        T: Observed,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
        P: Fn(&T) -> bool,
    {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut consecutive_failures = 0u32;
        let mut last_observed = "nothing observed yet".to_owned();

        loop {
            metrics::counter!(m::WAITER_POLLS_TOTAL, m::LABEL_WAIT_TARGET => T::KIND).increment(1);

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(target)),
                read = tokio::time::timeout_at(deadline, fetch()) => match read {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(target_object = target, "read still pending at deadline");
                        return Err(ConformanceError::Timeout {
                            target: target.to_owned(),
                            elapsed: started.elapsed(),
                            last_observed,
                        });
                    }
                },
            };

            match result {
                Ok(object) => {
                    consecutive_failures = 0;
                    if predicate(&object) {
                        let elapsed = started.elapsed();
                        metrics::histogram!(m::WAITER_WAIT_DURATION_SECONDS, m::LABEL_WAIT_TARGET => T::KIND)
                            .record(elapsed.as_secs_f64());
                        debug!(target_object = target, elapsed_ms = elapsed.as_millis() as u64, "condition met");
                        return Ok(object);
                    }
                    last_observed = object.observed();
                    debug!(target_object = target, observed = %last_observed, "condition not met yet");
                }
                Err(err) if err.is_transient() => {
                    consecutive_failures += 1;
                    if consecutive_failures > self.max_transient_failures {
                        return Err(ConformanceError::Fetch {
                            target: target.to_owned(),
                            source: err,
                        });
                    }
                    warn!(
                        target_object = target,
                        attempt = consecutive_failures,
                        max = self.max_transient_failures,
                        error = %err,
                        "transient read failure, polling again"
                    );
                    last_observed = format!("read error: {err}");
                }
                Err(err) => {
                    return Err(ConformanceError::Fetch {
                        target: target.to_owned(),
                        source: err,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ConformanceError::Timeout {
                    target: target.to_owned(),
                    elapsed: now - started,
                    last_observed,
                });
            }
            let pause = self.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(target)),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Waits until the certificate settles at `generation`.
    pub async fn wait_for_certificate<C: ResourceClient>(
        &self,
        client: &C,
        namespace: &str,
        name: &str,
        generation: i64,
        timeout: Duration,
    ) -> Result<Certificate, ConformanceError> {
        let target = format!("{} {namespace}/{name}", ResourceKind::Certificate);
        self.wait_until(
            &target,
            || client.get_certificate(namespace, name),
            |cert| issuance_settled(cert, generation),
            timeout,
        )
        .await
    }

    /// Waits until the secret carries a non-empty value under `key`.
    pub async fn wait_for_secret_payload<C: ResourceClient>(
        &self,
        client: &C,
        namespace: &str,
        name: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<Secret, ConformanceError> {
        let target = format!("{} {namespace}/{name} field {key}", ResourceKind::Secret);
        self.wait_until(
            &target,
            || client.get_secret(namespace, name),
            |secret| secret.payload(key).is_some(),
            timeout,
        )
        .await
    }

    fn cancelled(&self, target: &str) -> ConformanceError {
        ConformanceError::Cancelled {
            target: target.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use certconform_core::types::{
        CertificateSpec, CertificateStatus, Condition, ObjectMeta, PrivateKeySpec, TargetRef,
    };

    fn certificate(generation: i64, ready: Option<(ConditionStatus, i64)>) -> Certificate {
        let mut cert = Certificate {
            metadata: ObjectMeta {
                generation,
                ..ObjectMeta::new("ns", "c1")
            },
            spec: CertificateSpec {
                secret_name: "c1-tls".to_owned(),
                common_name: None,
                organizations: Vec::new(),
                dns_names: vec!["a.example.com".to_owned()],
                ip_addresses: Vec::new(),
                email_addresses: Vec::new(),
                uris: Vec::new(),
                literal_subject: None,
                private_key: PrivateKeySpec::default(),
                duration: None,
                usages: Vec::new(),
                is_ca: false,
                issuer_ref: TargetRef {
                    group: "cert-manager.io".to_owned(),
                    kind: "Issuer".to_owned(),
                    name: "ca".to_owned(),
                },
            },
            status: CertificateStatus::default(),
        };
        if let Some((status, observed_generation)) = ready {
            cert.set_condition(Condition {
                kind: ConditionKind::Ready,
                status,
                reason: String::new(),
                message: String::new(),
                observed_generation,
            });
        }
        cert
    }

    /// Replays a fixed script of read results, repeating the last one.
    struct Script {
        steps: Mutex<VecDeque<Result<Certificate, ClientError>>>,
        calls: Mutex<u32>,
    }

    impl Script {
        fn new(steps: Vec<Result<Certificate, ClientError>>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(0),
            }
        }

        async fn next(&self) -> Result<Certificate, ClientError> {
            *self.calls.lock().unwrap() += 1;
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                steps.front().cloned().unwrap()
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    fn transport() -> ClientError {
        ClientError::Transport("connection reset".to_owned())
    }

    fn waiter() -> Waiter {
        Waiter::new(Duration::from_millis(500), 3, CancellationToken::new())
    }

    #[test]
    fn settled_requires_exact_generation_and_no_issuing() {
        assert!(!issuance_settled(&certificate(2, None), 2));
        assert!(!issuance_settled(
            &certificate(2, Some((ConditionStatus::Unknown, 2))),
            2
        ));
        assert!(!issuance_settled(
            &certificate(2, Some((ConditionStatus::True, 1))),
            2
        ));
        assert!(issuance_settled(
            &certificate(2, Some((ConditionStatus::True, 2))),
            2
        ));
        assert!(issuance_settled(
            &certificate(2, Some((ConditionStatus::False, 2))),
            2
        ));
        // stale read of an older generation never satisfies the predicate
        assert!(!issuance_settled(
            &certificate(1, Some((ConditionStatus::True, 2))),
            2
        ));

        let mut issuing = certificate(2, Some((ConditionStatus::True, 2)));
        issuing.set_condition(Condition {
            kind: ConditionKind::Issuing,
            status: ConditionStatus::True,
            reason: String::new(),
            message: String::new(),
            observed_generation: 2,
        });
        assert!(!issuance_settled(&issuing, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_object_satisfying_predicate() {
        let script = Script::new(vec![
            Ok(certificate(1, None)),
            Ok(certificate(1, Some((ConditionStatus::Unknown, 1)))),
            Ok(certificate(1, Some((ConditionStatus::True, 1)))),
        ]);
        let cert = waiter()
            .wait_until(
                "Certificate ns/c1",
                || script.next(),
                |c| issuance_settled(c, 1),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(script.calls(), 3);
        assert!(issuance_settled(&cert, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_one_poll_interval() {
        let script = Script::new(vec![Ok(certificate(1, None))]);
        let started = Instant::now();
        let err = waiter()
            .wait_until(
                "Certificate ns/c1",
                || script.next(),
                |c| issuance_settled(c, 1),
                Duration::from_secs(10),
            )
            .await
            .unwrap_err();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed <= Duration::from_secs(10) + Duration::from_millis(500));
        match err {
            ConformanceError::Timeout { last_observed, .. } => {
                assert!(last_observed.contains("generation=1"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tolerates_transient_failures_up_to_limit() {
        let script = Script::new(vec![
            Err(transport()),
            Err(transport()),
            Err(transport()),
            Ok(certificate(1, Some((ConditionStatus::True, 1)))),
        ]);
        let result = waiter()
            .wait_until(
                "Certificate ns/c1",
                || script.next(),
                |c| issuance_settled(c, 1),
                Duration::from_secs(60),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_transient_failures_is_fetch_error() {
        let script = Script::new(vec![Err(transport())]);
        let err = waiter()
            .wait_until(
                "Certificate ns/c1",
                || script.next(),
                |c| issuance_settled(c, 1),
                Duration::from_secs(60),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConformanceError::Fetch { .. }));
        assert_eq!(script.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failure_is_immediate() {
        let script = Script::new(vec![Err(ClientError::Rejected("forbidden".to_owned()))]);
        let err = waiter()
            .wait_until(
                "Certificate ns/c1",
                || script.next(),
                |c| issuance_settled(c, 1),
                Duration::from_secs(60),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConformanceError::Fetch { .. }));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_distinct_from_timeout() {
        let script = Script::new(vec![Ok(certificate(1, None))]);
        let cancel = CancellationToken::new();
        let waiter = Waiter::new(Duration::from_millis(500), 3, cancel.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            cancel.cancel();
        });
        let err = waiter
            .wait_until(
                "Certificate ns/c1",
                || script.next(),
                |c| issuance_settled(c, 1),
                Duration::from_secs(60),
            )
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, ConformanceError::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_read_times_out_at_deadline() {
        let started = Instant::now();
        let err = waiter()
            .wait_until(
                "Certificate ns/c1",
                std::future::pending::<Result<Certificate, ClientError>>,
                |c| issuance_settled(c, 1),
                Duration::from_secs(10),
            )
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10) + Duration::from_millis(500));
        match err {
            ConformanceError::Timeout {
                elapsed,
                last_observed,
                ..
            } => {
                assert!(elapsed >= Duration::from_secs(10));
                assert_eq!(last_observed, "nothing observed yet");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn read_hanging_after_progress_keeps_last_observation() {
        let calls = Mutex::new(0u32);
        let fetch = || {
            let first = {
                let mut calls = calls.lock().unwrap();
                *calls += 1;
                *calls == 1
            };
            async move {
                if first {
                    Ok(certificate(1, None))
                } else {
                    std::future::pending::<Result<Certificate, ClientError>>().await
                }
            }
        };
        let err = waiter()
            .wait_until(
                "Certificate ns/c1",
                fetch,
                |c| issuance_settled(c, 1),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        match err {
            ConformanceError::Timeout { last_observed, .. } => {
                assert!(last_observed.contains("generation=1"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn secret_observation_lists_field_sizes() {
        let mut secret = Secret {
            metadata: ObjectMeta::new("ns", "s"),
            data: Default::default(),
        };
        secret.data.insert("tls.crt".to_owned(), vec![0; 3]);
        assert_eq!(secret.observed(), "fields=[tls.crt(3 bytes)]");
    }
}
