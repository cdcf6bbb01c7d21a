use crate::credentials::RegistryCredentials;
use crate::image_reference::ImageReference;
use crate::sync::ContainerRuntime;
use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Docker-compatible container CLI (`docker`, `podman`, `nerdctl`).
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<(), RuntimeError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Running {}", command);

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|source| RuntimeError::Spawn {
                    command: command.clone(),
                    source,
                })?;
            // closing stdin lets --password-stdin return
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn login(&self, credentials: &RegistryCredentials) -> Result<(), RuntimeError> {
        self.run(
            &[
                "login",
                "--username",
                credentials.username.as_str(),
                "--password-stdin",
                credentials.registry.as_str(),
            ],
            Some(credentials.password.expose_secret()),
        )
        .await
    }

    async fn pull(&self, image: &ImageReference) -> Result<(), RuntimeError> {
        self.run(&["pull", image.to_string().as_str()], None).await
    }

    async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<(), RuntimeError> {
        let (source, target) = (source.to_string(), target.to_string());
        self.run(&["tag", source.as_str(), target.as_str()], None)
            .await
    }

    async fn push(&self, image: &ImageReference) -> Result<(), RuntimeError> {
        self.run(&["push", image.to_string().as_str()], None).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn image() -> ImageReference {
        ImageReference::new("registry.example", "web", "master").unwrap()
    }

    #[tokio::test]
    async fn test_successful_command() {
        let runtime = DockerCli::new("true");
        runtime.pull(&image()).await.expect("`true` should succeed");
    }

    #[tokio::test]
    async fn test_failed_command_reports_status() {
        let runtime = DockerCli::new("false");
        let err = runtime.push(&image()).await.unwrap_err();

        match err {
            RuntimeError::Failed { command, .. } => {
                assert_eq!(command, "false push registry.example/web:master")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runtime = DockerCli::new("definitely-not-a-container-runtime");
        let err = runtime.pull(&image()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }
}
