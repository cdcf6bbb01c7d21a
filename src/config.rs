use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::Deserialize;
use std::{env, fs, path::Path};
use tracing::info;

pub const DEFAULT_SOURCE_REGION: &str = "eu-west-1";
pub const DEFAULT_DESTINATION_REGION: &str = "eu-west-2";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_source_region")]
    pub source_region: String,
    #[serde(default = "default_destination_region")]
    pub destination_region: String,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub repositories: RepositoryFilterConfig,
    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,
    #[serde(default = "default_skip_up_to_date")]
    pub skip_up_to_date: bool,
}

/// Glob patterns applied to destination repository names. An empty include list matches everything.
#[derive(Debug, Default, Deserialize)]
pub struct RepositoryFilterConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_source_region() -> String {
    DEFAULT_SOURCE_REGION.to_string()
}

fn default_destination_region() -> String {
    DEFAULT_DESTINATION_REGION.to_string()
}

fn default_tags() -> Vec<String> {
    vec!["production".to_string(), "master".to_string()]
}

fn default_container_runtime() -> String {
    "docker".to_string()
}

fn default_skip_up_to_date() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_region: default_source_region(),
            destination_region: default_destination_region(),
            tags: default_tags(),
            repositories: RepositoryFilterConfig::default(),
            container_runtime: default_container_runtime(),
            skip_up_to_date: default_skip_up_to_date(),
        }
    }
}

impl SyncConfig {
    /// Command line regions take precedence over the file. Call `validate` afterwards.
    pub fn override_regions(&mut self, source: Option<String>, destination: Option<String>) {
        if let Some(region) = source {
            self.source_region = region;
        }
        if let Some(region) = destination {
            self.destination_region = region;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_region == self.destination_region {
            anyhow::bail!(
                "Source and destination region are both {}",
                self.source_region
            );
        }
        if self.tags.is_empty() {
            anyhow::bail!("At least one tag must be configured");
        }
        if self.container_runtime.trim().is_empty() {
            anyhow::bail!("Container runtime must not be empty");
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    info!("Loading config from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let expanded = expand_env_vars(&yaml_str)?;

    let config = serde_yaml_ng::from_str(&expanded)
        .context("Failed to parse YAML config after environment variable expansion")?;

    Ok(config)
}

/// Replaces `${VAR}` placeholders with environment variables values.
/// Returns an error naming every missing variable.
fn expand_env_vars(input: &str) -> Result<String> {
    let re =
        Regex::new(r"\$\{([^}]+)}").context("Invalid regex pattern for env var substitution")?;

    let mut missing = Vec::new();
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        env::var(var_name).unwrap_or_else(|_| {
            missing.push(var_name.to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable: {}", missing.join(", "));
    }

    Ok(result.into_owned())
}

#[derive(Debug)]
pub struct RepositoryFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl RepositoryFilter {
    pub fn new(config: &RepositoryFilterConfig) -> Result<Self> {
        let include = if config.include.is_empty() {
            None
        } else {
            Some(build_glob_set(&config.include)?)
        };

        Ok(Self {
            include,
            exclude: build_glob_set(&config.exclude)?,
        })
    }

    pub fn matches(&self, repository: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .is_none_or(|include| include.is_match(repository));
        included && !self.exclude.is_match(repository)
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern)
                .with_context(|| format!("Invalid repository pattern {}", pattern))?,
        );
    }
    builder.build().context("Failed to build repository pattern set")
}
