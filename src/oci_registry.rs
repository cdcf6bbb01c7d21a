use crate::credentials::RegistryCredentials;
use crate::image_reference::ImageReference;
use crate::sync::DigestLookup;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap};
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

static MANIFEST_MEDIA_TYPES: &str = "application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json";
static DIGEST_HEADER: &str = "Docker-Content-Digest";

pub fn create_client() -> Result<Client> {
    info!("Initializing OCI Registry HTTP client");
    // System certificates are loaded automatically with rustls-tls-native-roots
    Client::builder()
        .build()
        .context("Failed to build HTTP client")
}

/// Returns the manifest digest `image_reference` currently points to, or `None` if the
/// registry does not know the tag.
///
/// `basic_token` is the base64 `username:password` pair ECR hands out, sent as is.
pub async fn fetch_manifest_digest(
    client: &Client,
    image_reference: &ImageReference,
    basic_token: &str,
) -> Result<Option<String>> {
    let url = image_reference.manifest_url();
    debug!("Fetching manifest digest from URL {}", url);

    let response = client
        .get(&url)
        .header(ACCEPT, MANIFEST_MEDIA_TYPES)
        .header(AUTHORIZATION, format!("Basic {}", basic_token))
        .send()
        .await
        .context("Failed to send request to fetch manifest")?;

    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        anyhow::bail!(
            "Registry {} returned error status {} while fetching manifest of {}",
            image_reference.registry,
            response.status(),
            image_reference
        );
    }

    digest_from_headers(response.headers()).map(Some)
}

#[async_trait]
impl DigestLookup for Client {
    async fn manifest_digest(
        &self,
        image: &ImageReference,
        credentials: &RegistryCredentials,
    ) -> Result<Option<String>> {
        fetch_manifest_digest(self, image, credentials.token.expose_secret()).await
    }
}

fn digest_from_headers(headers: &HeaderMap) -> Result<String> {
    Ok(headers
        .get(DIGEST_HEADER)
        .context("Response does not contain HTTP header Docker-Content-Digest")?
        .to_str()
        .context("Received invalid UTF-8 content in Docker-Content-Digest header")?
        .to_owned())
}
