use crate::deployment::{DeploymentRecord, DeploymentStatusProvider, ProviderError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecs::Client;
use aws_sdk_ecs::config::Region;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::operation::describe_services::DescribeServicesOutput;
use aws_sdk_ecs::types::Service;
use tracing::{debug, info};

pub async fn create_client(region: &str) -> Client {
    info!("Initializing ECS client for region {}", region);
    let shared_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    Client::new(&shared_config)
}

/// Reads service deployments through the ECS `DescribeServices` API.
#[derive(Clone)]
pub struct EcsStatusProvider {
    client: Client,
}

impl EcsStatusProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeploymentStatusProvider for EcsStatusProvider {
    async fn fetch_deployments(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<DeploymentRecord>, ProviderError> {
        let output = self
            .client
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|err| ProviderError::Query(DisplayErrorContext(&err).to_string()))?;

        let records = service_deployments(&output, cluster, service)?;
        debug!("Service {} has deployments {:?}", service, records);
        Ok(records)
    }
}

/// Deployments of the single service a `DescribeServices` call asked for.
fn service_deployments(
    output: &DescribeServicesOutput,
    cluster: &str,
    service: &str,
) -> Result<Vec<DeploymentRecord>, ProviderError> {
    if let Some(failure) = output.failures().first() {
        return Err(ProviderError::ServiceNotFound {
            cluster: cluster.to_string(),
            service: service.to_string(),
            reason: failure.reason().unwrap_or("unknown failure").to_string(),
        });
    }

    let described = output
        .services()
        .first()
        .ok_or_else(|| ProviderError::ServiceNotFound {
            cluster: cluster.to_string(),
            service: service.to_string(),
            reason: "no service in DescribeServices response".to_string(),
        })?;

    Ok(deployment_records(described))
}

fn deployment_records(service: &Service) -> Vec<DeploymentRecord> {
    service
        .deployments()
        .iter()
        .filter_map(|deployment| match (deployment.id(), deployment.status()) {
            (Some(id), Some(status)) => Some(DeploymentRecord::new(id, status)),
            _ => {
                debug!("Ignoring deployment without id or status: {:?}", deployment);
                None
            }
        })
        .collect()
}
