//! Execution of a single registered case.
//!
//! [`CaseRunner`] owns everything one case needs: the frozen suite
//! configuration, the shared client, a waiter and conflict budget bound to
//! the run-scoped cancellation token, and the [`BuildContext`] carrying the
//! case's unique suffix. Table scenarios and lifecycle procedures are both
//! written against it.

use std::sync::Arc;
use std::time::Duration;

use certconform_core::client::{ResourceClient, ResourceClientExt};
use certconform_core::types::{Certificate, Secret, TLS_CERT_KEY};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::artifact::IssuedArtifact;
use crate::catalog::{BuildContext, Mutator, Scenario, build_certificate};
use crate::error::ConformanceError;
use crate::retry::ConflictBudget;
use crate::suite::SuiteConfig;
use crate::validation::{Validator, compose, run_validators};
use crate::waiter::Waiter;

pub(crate) struct CaseRunner<C> {
    config: Arc<SuiteConfig>,
    client: Arc<C>,
    waiter: Waiter,
    budget: ConflictBudget,
    cancel: CancellationToken,
    context: BuildContext,
}

impl<C: ResourceClient> CaseRunner<C> {
    pub(crate) fn new(
        config: Arc<SuiteConfig>,
        client: Arc<C>,
        suffix: String,
        cancel: CancellationToken,
    ) -> Self {
        let waiter = Waiter::from_timing(&config.timing, cancel.clone());
        let budget = ConflictBudget::from_timing(&config.timing);
        let context = BuildContext {
            namespace: config.namespace.clone(),
            domain_suffix: config.domain_suffix.clone(),
            suffix,
        };
        Self {
            config,
            client,
            waiter,
            budget,
            cancel,
            context,
        }
    }

    pub(crate) fn case_id(&self) -> String {
        self.context.resource_name()
    }

    pub(crate) fn context(&self) -> &BuildContext {
        &self.context
    }

    pub(crate) fn client(&self) -> &C {
        &self.client
    }

    pub(crate) fn budget(&self) -> ConflictBudget {
        self.budget
    }

    pub(crate) fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn standard_timeout(&self) -> Duration {
        self.config.timing.issuance_timeout()
    }

    pub(crate) fn build(&self, mutators: &[Mutator]) -> Certificate {
        build_certificate(&self.context, &self.config.target, mutators)
    }

    /// Submits a request. Any backend error here is fatal for the case, and
    /// a create call still pending after `timeout` fails with `Timeout`.
    pub(crate) async fn submit(
        &self,
        certificate: Certificate,
        timeout: Duration,
    ) -> Result<Certificate, ConformanceError> {
        let target = certificate.key().to_string();
        let started = Instant::now();
        let created = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ConformanceError::Cancelled { target }),
            created = tokio::time::timeout(timeout, self.client.create_certificate(certificate)) => {
                match created {
                    Ok(created) => created,
                    Err(_) => {
                        return Err(ConformanceError::Timeout {
                            target,
                            elapsed: started.elapsed(),
                            last_observed: "create request still pending".to_owned(),
                        });
                    }
                }
            }
        };
        let created = created.map_err(|source| ConformanceError::Creation {
            target: target.clone(),
            source,
        })?;
        debug!(
            certificate = %target,
            generation = created.metadata.generation,
            "request submitted"
        );
        Ok(created)
    }

    /// Waits until `certificate` settles at `generation`.
    pub(crate) async fn await_settled(
        &self,
        certificate: &Certificate,
        generation: i64,
        timeout: Duration,
    ) -> Result<Certificate, ConformanceError> {
        self.waiter
            .wait_for_certificate(
                self.client.as_ref(),
                &certificate.metadata.namespace,
                &certificate.metadata.name,
                generation,
                timeout,
            )
            .await
    }

    /// Submits a request and waits for the backend's decision. Creation and
    /// waiting share one `timeout`.
    pub(crate) async fn issue(
        &self,
        certificate: Certificate,
        timeout: Duration,
    ) -> Result<Certificate, ConformanceError> {
        let started = Instant::now();
        let created = self.submit(certificate, timeout).await?;
        let generation = created.metadata.generation;
        let remaining = timeout.saturating_sub(started.elapsed());
        self.await_settled(&created, generation, remaining).await
    }

    /// Waits until the certificate's secret carries a non-empty `tls.crt`.
    pub(crate) async fn fetch_secret(
        &self,
        certificate: &Certificate,
    ) -> Result<Secret, ConformanceError> {
        self.waiter
            .wait_for_secret_payload(
                self.client.as_ref(),
                &certificate.metadata.namespace,
                &certificate.spec.secret_name,
                TLS_CERT_KEY,
                self.standard_timeout(),
            )
            .await
    }

    /// Runs `extra` followed by the composed validators against the issued
    /// artifact and returns the secret it was decoded from.
    pub(crate) async fn validate(
        &self,
        certificate: &Certificate,
        extra: &[Validator],
    ) -> Result<Secret, ConformanceError> {
        let secret = self.fetch_secret(certificate).await?;
        let artifact = IssuedArtifact::decode(&secret);
        let validators: Vec<Validator> = extra
            .iter()
            .copied()
            .chain(compose(&self.config.unsupported))
            .collect();
        debug!(
            certificate = %certificate.key(),
            validators = validators.len(),
            "validating issued artifact"
        );
        run_validators(&validators, certificate, &artifact).map_err(ConformanceError::Validation)?;
        Ok(secret)
    }
}

/// Runs one table scenario end to end.
pub(crate) async fn run_issuance<C: ResourceClient>(
    runner: &CaseRunner<C>,
    scenario: &Scenario,
) -> Result<(), ConformanceError> {
    let timeout = runner.config.timeout(scenario.timeout);
    let certificate = runner.build(scenario.mutators);
    info!(
        scenario = scenario.name,
        certificate = %certificate.key(),
        timeout_secs = timeout.as_secs(),
        "issuing"
    );
    let settled = runner.issue(certificate, timeout).await?;
    runner.validate(&settled, scenario.extra_validators).await?;
    Ok(())
}
