use crate::credentials::RegistryCredentials;
use crate::sync::RegistryCatalog;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecr::Client;
use aws_sdk_ecr::config::Region;
use aws_sdk_ecr::error::DisplayErrorContext;
use tracing::info;

/// ECR registry of one AWS region.
#[derive(Clone)]
pub struct EcrRegistry {
    region: String,
    client: Client,
}

impl EcrRegistry {
    pub async fn connect(region: &str) -> Self {
        info!("Initializing ECR client for region {}", region);
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            region: region.to_string(),
            client: Client::new(&shared_config),
        }
    }
}

#[async_trait]
impl RegistryCatalog for EcrRegistry {
    fn region(&self) -> &str {
        &self.region
    }

    async fn credentials(&self) -> Result<RegistryCredentials> {
        let output = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|err| anyhow::anyhow!("{}", DisplayErrorContext(&err)))
            .with_context(|| {
                format!("Failed to get ECR authorization token in {}", self.region)
            })?;

        let data = output
            .authorization_data()
            .first()
            .with_context(|| format!("No ECR authorization data returned in {}", self.region))?;
        let token = data
            .authorization_token()
            .context("ECR authorization data has no token")?;
        let endpoint = data
            .proxy_endpoint()
            .context("ECR authorization data has no proxy endpoint")?;

        RegistryCredentials::from_authorization_token(token, endpoint)
            .with_context(|| format!("Invalid ECR authorization token in {}", self.region))
    }

    async fn repository_names(&self) -> Result<Vec<String>> {
        let mut repositories = self
            .client
            .describe_repositories()
            .into_paginator()
            .items()
            .send();

        let mut names = Vec::new();
        while let Some(repository) = repositories.next().await {
            let repository = repository
                .map_err(|err| anyhow::anyhow!("{}", DisplayErrorContext(&err)))
                .with_context(|| format!("Failed to list ECR repositories in {}", self.region))?;
            if let Some(name) = repository.repository_name() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}
