use crate::deployment::{
    DeploymentRecord, DeploymentRole, DeploymentStatusProvider, ProviderError, find_deployment_id,
};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_MAX_ITERATIONS: u32 = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Number of polls before giving up.
    pub max_iterations: u32,
    /// Wait after every poll that finds the old deployment still running.
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    InProgress,
    Succeeded,
    Failed,
    TimedOut,
}

impl PollOutcome {
    /// Process exit code reported for a finished verification, `None` while still in progress.
    pub fn exit_code(&self) -> Option<u8> {
        match self {
            PollOutcome::Succeeded => Some(0),
            PollOutcome::Failed => Some(1),
            PollOutcome::TimedOut => Some(2),
            PollOutcome::InProgress => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub outcome: PollOutcome,
    /// Number of polls performed, not counting the initial snapshot.
    pub iterations: u32,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid verification input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("verification cancelled")]
    Cancelled,
}

/// Decides a single poll.
///
/// The redeployment is finished once no old deployment remains. It succeeded only if the
/// new deployment seen now is the one captured at start; two missing ids count as a mismatch.
pub fn evaluate(
    current_old: Option<&str>,
    initial_new: Option<&str>,
    current_new: Option<&str>,
) -> PollOutcome {
    if current_old.is_some() {
        return PollOutcome::InProgress;
    }

    match (initial_new, current_new) {
        (Some(initial), Some(current)) if initial == current => PollOutcome::Succeeded,
        _ => PollOutcome::Failed,
    }
}

/// Upper bound of time spent waiting over `iterations` polls.
fn total_wait(poll_interval: Duration, iterations: u32) -> Duration {
    poll_interval.saturating_mul(iterations)
}

pub struct RedeploymentVerifier<P> {
    provider: P,
    config: VerifierConfig,
    cancel: CancellationToken,
}

impl<P: DeploymentStatusProvider> RedeploymentVerifier<P> {
    pub fn new(provider: P, config: VerifierConfig) -> Self {
        Self {
            provider,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn verify(&self, cluster: &str, service: &str) -> Result<Verification, VerifyError> {
        if cluster.is_empty() || service.is_empty() {
            return Err(VerifyError::InvalidInput(
                "cluster and service names must not be empty".to_string(),
            ));
        }
        if self.config.max_iterations == 0 {
            return Err(VerifyError::InvalidInput(
                "wait time must be at least one iteration".to_string(),
            ));
        }

        let records = self.fetch(cluster, service).await?;
        let initial_old = find_deployment_id(&records, DeploymentRole::Old);
        let initial_new = find_deployment_id(&records, DeploymentRole::New);

        info!(
            "Verifying redeployment of service {} in cluster {}: old deployment {}, new deployment {}",
            service,
            cluster,
            initial_old.as_deref().unwrap_or("<none>"),
            initial_new.as_deref().unwrap_or("<none>")
        );
        if initial_new.is_none() {
            warn!(
                "Service {} has no {} deployment, the redeployment cannot succeed",
                service,
                DeploymentRole::New
            );
        }

        let max = self.config.max_iterations;
        for iteration in 1..=max {
            info!("Iteration {} out of {}", iteration, max);

            let records = self.fetch(cluster, service).await?;
            let current_old = find_deployment_id(&records, DeploymentRole::Old);
            let current_new = find_deployment_id(&records, DeploymentRole::New);

            match evaluate(
                current_old.as_deref(),
                initial_new.as_deref(),
                current_new.as_deref(),
            ) {
                PollOutcome::InProgress => {
                    info!(
                        "New deployment in progress - old deployment ID: {}",
                        current_old.as_deref().unwrap_or_default()
                    );
                    self.wait().await?;
                }
                PollOutcome::Succeeded => {
                    info!("Deployment {} successful", current_new.unwrap_or_default());
                    return Ok(Verification {
                        outcome: PollOutcome::Succeeded,
                        iterations: iteration,
                    });
                }
                outcome => {
                    warn!(
                        "Re-deployment failed, expected primary deployment {} but found {}. Please check the service events log",
                        initial_new.as_deref().unwrap_or("<none>"),
                        current_new.as_deref().unwrap_or("<none>")
                    );
                    return Ok(Verification {
                        outcome,
                        iterations: iteration,
                    });
                }
            }
        }

        warn!(
            "Deployment still in progress after {} iterations ({:?}). Please check the service events log",
            max,
            total_wait(self.config.poll_interval, max)
        );
        Ok(Verification {
            outcome: PollOutcome::TimedOut,
            iterations: max,
        })
    }

    /// Provider calls carry no timeout of their own, so a hung query only ends on cancellation.
    async fn fetch(&self, cluster: &str, service: &str) -> Result<Vec<DeploymentRecord>, VerifyError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VerifyError::Cancelled),
            records = self.provider.fetch_deployments(cluster, service) => Ok(records?),
        }
    }

    async fn wait(&self) -> Result<(), VerifyError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VerifyError::Cancelled),
            _ = tokio::time::sleep(self.config.poll_interval) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Replays a fixed list of snapshots, repeating the last one. `None` simulates a provider failure.
    struct ScriptedProvider {
        snapshots: Mutex<Vec<Option<Vec<DeploymentRecord>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(snapshots: Vec<Option<Vec<DeploymentRecord>>>) -> Arc<Self> {
            Arc::new(Self {
                snapshots: Mutex::new(snapshots),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeploymentStatusProvider for ScriptedProvider {
        async fn fetch_deployments(
            &self,
            _cluster: &str,
            _service: &str,
        ) -> Result<Vec<DeploymentRecord>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let snapshots = self.snapshots.lock().unwrap();
            let snapshot = snapshots.get(call).or(snapshots.last()).cloned().flatten();
            snapshot.ok_or_else(|| ProviderError::Query("access denied".to_string()))
        }
    }

    fn rolling(old: &str, new: &str) -> Option<Vec<DeploymentRecord>> {
        Some(vec![
            DeploymentRecord::new(&format!("ecs-svc/{}", old), "ACTIVE"),
            DeploymentRecord::new(&format!("ecs-svc/{}", new), "PRIMARY"),
        ])
    }

    fn settled(new: &str) -> Option<Vec<DeploymentRecord>> {
        Some(vec![DeploymentRecord::new(
            &format!("ecs-svc/{}", new),
            "PRIMARY",
        )])
    }

    fn verifier(
        provider: &Arc<ScriptedProvider>,
        max_iterations: u32,
    ) -> RedeploymentVerifier<Arc<ScriptedProvider>> {
        RedeploymentVerifier::new(
            provider.clone(),
            VerifierConfig {
                max_iterations,
                poll_interval: Duration::from_secs(20),
            },
        )
    }

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate(Some("old"), Some("new"), Some("new")), PollOutcome::InProgress);
        assert_eq!(evaluate(None, Some("new"), Some("new")), PollOutcome::Succeeded);
        assert_eq!(evaluate(None, Some("new"), Some("other")), PollOutcome::Failed);
        assert_eq!(evaluate(None, Some("new"), None), PollOutcome::Failed);
        assert_eq!(evaluate(None, None, Some("new")), PollOutcome::Failed);
        assert_eq!(evaluate(None, None, None), PollOutcome::Failed);
    }

    #[test]
    fn test_evaluate_is_stable_for_identical_snapshots() {
        let first = evaluate(None, Some("abc"), Some("abc"));
        for _ in 0..10 {
            assert_eq!(evaluate(None, Some("abc"), Some("abc")), first);
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PollOutcome::Succeeded.exit_code(), Some(0));
        assert_eq!(PollOutcome::Failed.exit_code(), Some(1));
        assert_eq!(PollOutcome::TimedOut.exit_code(), Some(2));
        assert_eq!(PollOutcome::InProgress.exit_code(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_first_poll() {
        for max_iterations in [1, 5, 30] {
            let provider = ScriptedProvider::new(vec![rolling("old", "new"), settled("new")]);
            let start = Instant::now();

            let result = verifier(&provider, max_iterations)
                .verify("prod", "web")
                .await
                .unwrap();

            assert_eq!(result.outcome, PollOutcome::Succeeded);
            assert_eq!(result.iterations, 1);
            assert_eq!(provider.calls(), 2);
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_after_first_poll_when_primary_changed() {
        for max_iterations in [1, 5, 30] {
            let provider = ScriptedProvider::new(vec![rolling("old", "new"), settled("other")]);

            let result = verifier(&provider, max_iterations)
                .verify("prod", "web")
                .await
                .unwrap();

            assert_eq!(result.outcome, PollOutcome::Failed);
            assert_eq!(result.outcome.exit_code(), Some(1));
            assert_eq!(result.iterations, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_poll() {
        let provider = ScriptedProvider::new(vec![
            rolling("old", "new"),
            rolling("old", "new"),
            rolling("old", "new"),
            settled("new"),
        ]);
        let start = Instant::now();

        let result = verifier(&provider, 3).verify("prod", "web").await.unwrap();

        assert_eq!(result.outcome, PollOutcome::Succeeded);
        assert_eq!(result.iterations, 3);
        assert_eq!(provider.calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_old_deployment_remains() {
        let provider = ScriptedProvider::new(vec![rolling("old", "new")]);
        let start = Instant::now();

        let result = verifier(&provider, 2).verify("prod", "web").await.unwrap();

        assert_eq!(result.outcome, PollOutcome::TimedOut);
        assert_eq!(result.outcome.exit_code(), Some(2));
        assert_eq!(result.iterations, 2);
        assert_eq!(provider.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_when_no_primary_before_and_after() {
        let provider = ScriptedProvider::new(vec![Some(vec![])]);

        let result = verifier(&provider, 3).verify("prod", "web").await.unwrap();

        assert_eq!(result.outcome, PollOutcome::Failed);
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_snapshots_give_identical_outcomes() {
        for _ in 0..3 {
            let provider = ScriptedProvider::new(vec![settled("new")]);
            let result = verifier(&provider, 4).verify("prod", "web").await.unwrap();
            assert_eq!(result.outcome, PollOutcome::Succeeded);
            assert_eq!(result.iterations, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_aborts_run() {
        let provider = ScriptedProvider::new(vec![rolling("old", "new"), rolling("old", "new"), None]);

        let err = verifier(&provider, 5)
            .verify("prod", "web")
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::Provider(ProviderError::Query(_))));
        assert_eq!(provider.calls(), 3);
    }

    /// Never answers, like a provider call stuck on the network.
    struct StalledProvider;

    #[async_trait]
    impl DeploymentStatusProvider for StalledProvider {
        async fn fetch_deployments(
            &self,
            _cluster: &str,
            _service: &str,
        ) -> Result<Vec<DeploymentRecord>, ProviderError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_total_wait_saturates() {
        assert_eq!(total_wait(Duration::from_secs(20), 3), Duration::from_secs(60));
        assert_eq!(total_wait(Duration::from_secs(u64::MAX), 30), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_query() {
        let provider = ScriptedProvider::new(vec![rolling("old", "new")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = verifier(&provider, 5)
            .with_cancellation(cancel)
            .verify("prod", "web")
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_wait() {
        let provider = ScriptedProvider::new(vec![rolling("old", "new")]);
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                cancel.cancel();
            }
        });
        let start = Instant::now();

        let err = verifier(&provider, 5)
            .with_cancellation(cancel)
            .verify("prod", "web")
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::Cancelled));
        assert_eq!(provider.calls(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_stalled_query() {
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            }
        });
        let verifier = RedeploymentVerifier::new(
            StalledProvider,
            VerifierConfig {
                max_iterations: 3,
                poll_interval: Duration::from_secs(20),
            },
        )
        .with_cancellation(cancel);

        let result = tokio::time::timeout(Duration::from_secs(60), verifier.verify("prod", "web"))
            .await
            .expect("cancellation should end a stalled query");

        assert!(matches!(result, Err(VerifyError::Cancelled)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_input() {
        let provider = ScriptedProvider::new(vec![settled("new")]);

        let err = verifier(&provider, 3).verify("", "web").await.unwrap_err();
        assert!(matches!(err, VerifyError::InvalidInput(_)));

        let err = verifier(&provider, 0).verify("prod", "web").await.unwrap_err();
        assert!(matches!(err, VerifyError::InvalidInput(_)));

        assert_eq!(provider.calls(), 0);
    }
}
