//! Copies tagged images from the registry of one region into the registry of another.
//!
//! Repository names are read from the destination registry and assumed to exist under the same
//! name in the source registry. Image transfer itself is left to a container runtime CLI.

use crate::config::RepositoryFilter;
use crate::container_runtime::RuntimeError;
use crate::credentials::RegistryCredentials;
use crate::image_reference::ImageReference;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

/// A regional registry that can hand out login credentials and list its repositories.
#[async_trait]
pub trait RegistryCatalog: Send + Sync {
    fn region(&self) -> &str;
    async fn credentials(&self) -> Result<RegistryCredentials>;
    async fn repository_names(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn login(&self, credentials: &RegistryCredentials) -> Result<(), RuntimeError>;
    async fn pull(&self, image: &ImageReference) -> Result<(), RuntimeError>;
    async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<(), RuntimeError>;
    async fn push(&self, image: &ImageReference) -> Result<(), RuntimeError>;
}

#[async_trait]
pub trait DigestLookup: Send + Sync {
    /// Manifest digest of `image`, `None` when the tag does not exist.
    async fn manifest_digest(
        &self,
        image: &ImageReference,
        credentials: &RegistryCredentials,
    ) -> Result<Option<String>>;
}

pub struct SyncOptions {
    pub tags: Vec<String>,
    pub filter: RepositoryFilter,
    pub skip_up_to_date: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub copied: usize,
    pub skipped: usize,
}

pub struct RegistrySync<C, R, D> {
    source: C,
    destination: C,
    runtime: R,
    digests: D,
    options: SyncOptions,
}

impl<C, R, D> RegistrySync<C, R, D>
where
    C: RegistryCatalog,
    R: ContainerRuntime,
    D: DigestLookup,
{
    pub fn new(source: C, destination: C, runtime: R, digests: D, options: SyncOptions) -> Self {
        Self {
            source,
            destination,
            runtime,
            digests,
            options,
        }
    }

    pub async fn run(&self) -> Result<SyncSummary> {
        let destination = self.login(&self.destination).await?;

        let repositories: Vec<String> = self
            .destination
            .repository_names()
            .await?
            .into_iter()
            .filter(|repository| self.options.filter.matches(repository))
            .collect();
        info!(
            "'{}' region ECR repository list: {:?}",
            self.destination.region(),
            repositories
        );

        let source = self.login(&self.source).await?;

        let mut summary = SyncSummary::default();
        for repository in &repositories {
            for tag in &self.options.tags {
                let source_image = ImageReference::new(&source.registry, repository, tag)
                    .with_context(|| format!("Invalid image {}:{}", repository, tag))?;
                let destination_image = source_image.with_registry(&destination.registry);

                if self.options.skip_up_to_date
                    && self
                        .is_up_to_date(&source_image, &source, &destination_image, &destination)
                        .await
                {
                    info!("Skipping {}, already up to date", destination_image);
                    summary.skipped += 1;
                    continue;
                }

                if self.options.dry_run {
                    info!("Would copy {} to {}", source_image, destination_image);
                } else {
                    self.copy(&source_image, &destination_image).await?;
                }
                summary.copied += 1;
            }
        }

        info!(
            "Registry sync finished: {} images copied, {} up to date",
            summary.copied, summary.skipped
        );
        Ok(summary)
    }

    async fn login(&self, catalog: &C) -> Result<RegistryCredentials> {
        let credentials = catalog.credentials().await?;
        if self.options.dry_run {
            info!(
                "Dry run, skipping login to '{}' registry {}",
                catalog.region(),
                credentials.registry
            );
            return Ok(credentials);
        }

        self.runtime.login(&credentials).await.with_context(|| {
            format!(
                "Login to '{}' registry {} has failed",
                catalog.region(),
                credentials.registry
            )
        })?;
        info!(
            "Login to '{}' registry {} has been successful",
            catalog.region(),
            credentials.registry
        );
        Ok(credentials)
    }

    async fn is_up_to_date(
        &self,
        source: &ImageReference,
        source_credentials: &RegistryCredentials,
        destination: &ImageReference,
        destination_credentials: &RegistryCredentials,
    ) -> bool {
        let source_digest = self.digests.manifest_digest(source, source_credentials).await;
        let destination_digest = self
            .digests
            .manifest_digest(destination, destination_credentials)
            .await;

        match (source_digest, destination_digest) {
            (Ok(Some(source_digest)), Ok(Some(destination_digest))) => {
                source_digest == destination_digest
            }
            (Ok(_), Ok(_)) => false,
            (Err(e), _) | (_, Err(e)) => {
                warn!(
                    "Could not compare digests of {} and {}, copying anyway: {:#}",
                    source, destination, e
                );
                false
            }
        }
    }

    async fn copy(&self, source: &ImageReference, destination: &ImageReference) -> Result<()> {
        info!("Pulling '{}'", source);
        self.runtime
            .pull(source)
            .await
            .with_context(|| format!("Failed to pull {}", source))?;

        info!("Retagging '{}' image to '{}'", source, destination);
        self.runtime
            .tag(source, destination)
            .await
            .with_context(|| format!("Failed to tag {} as {}", source, destination))?;

        info!("Pushing '{}'", destination);
        self.runtime
            .push(destination)
            .await
            .with_context(|| format!("Failed to push {}", destination))?;
        Ok(())
    }
}
