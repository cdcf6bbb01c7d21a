use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

static OLD_DEPLOYMENT_STATUS: &str = "ACTIVE";
static NEW_DEPLOYMENT_STATUS: &str = "PRIMARY";

/// Role a deployment plays during a rolling redeployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentRole {
    /// Currently running deployment that is being replaced (`ACTIVE`).
    Old,
    /// Replacement deployment that becomes the primary one (`PRIMARY`).
    New,
}

impl DeploymentRole {
    pub fn status(&self) -> &'static str {
        match self {
            DeploymentRole::Old => OLD_DEPLOYMENT_STATUS,
            DeploymentRole::New => NEW_DEPLOYMENT_STATUS,
        }
    }

    pub fn from_status(status: &str) -> Option<Self> {
        if status == OLD_DEPLOYMENT_STATUS {
            Some(DeploymentRole::Old)
        } else if status == NEW_DEPLOYMENT_STATUS {
            Some(DeploymentRole::New)
        } else {
            None
        }
    }
}

impl fmt::Display for DeploymentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status())
    }
}

/// Snapshot of one deployment of a service, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub id: String,
    pub status: String,
}

impl DeploymentRecord {
    /// Builds a record from the provider's full identifier, keeping only its last path segment
    /// (`ecs-svc/1234567890` becomes `1234567890`).
    pub fn new(full_id: &str, status: impl Into<String>) -> Self {
        let id = full_id.rsplit('/').next().unwrap_or(full_id).to_string();
        Self {
            id,
            status: status.into(),
        }
    }

    pub fn role(&self) -> Option<DeploymentRole> {
        DeploymentRole::from_status(&self.status)
    }
}

/// Returns the id of the first deployment holding `role`, if any.
pub fn find_deployment_id(records: &[DeploymentRecord], role: DeploymentRole) -> Option<String> {
    records
        .iter()
        .find(|record| record.role() == Some(role))
        .map(|record| record.id.clone())
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("deployment status query failed: {0}")]
    Query(String),

    #[error("service {service} not found in cluster {cluster}: {reason}")]
    ServiceNotFound {
        cluster: String,
        service: String,
        reason: String,
    },
}

/// Source of truth for the deployments of a service. Results are never cached by callers.
#[async_trait]
pub trait DeploymentStatusProvider: Send + Sync {
    async fn fetch_deployments(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<DeploymentRecord>, ProviderError>;
}

#[async_trait]
impl<T: DeploymentStatusProvider + ?Sized> DeploymentStatusProvider for Arc<T> {
    async fn fetch_deployments(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<DeploymentRecord>, ProviderError> {
        (**self).fetch_deployments(cluster, service).await
    }
}
