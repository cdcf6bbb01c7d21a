use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use thiserror::Error;

/// Wrapper for secret strings (registry passwords, authorization tokens) that prints
/// "<REDACTED, length {length of the secret}>" for Debug/Display
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        SecretString(s.into())
    }

    /// Access the raw secret if explicitly needed
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<REDACTED, length {}>", self.0.len())
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("authorization token is not valid base64")]
    InvalidEncoding,
    #[error("authorization token is not in username:password form")]
    MalformedToken,
    #[error("registry endpoint is empty")]
    MissingEndpoint,
}

/// Login material for one registry, decoded from an ECR authorization token.
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    /// Registry host without URL scheme, e.g. `123456789012.dkr.ecr.eu-west-1.amazonaws.com`
    pub registry: String,
    pub username: String,
    pub password: SecretString,
    /// The original base64 `username:password` token, usable as an HTTP Basic credential
    pub token: SecretString,
}

impl RegistryCredentials {
    pub fn from_authorization_token(
        token: &str,
        proxy_endpoint: &str,
    ) -> Result<Self, CredentialsError> {
        let registry = registry_host(proxy_endpoint);
        if registry.is_empty() {
            return Err(CredentialsError::MissingEndpoint);
        }

        let decoded = STANDARD
            .decode(token.trim())
            .map_err(|_| CredentialsError::InvalidEncoding)?;
        let decoded = String::from_utf8(decoded).map_err(|_| CredentialsError::InvalidEncoding)?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or(CredentialsError::MalformedToken)?;
        if username.is_empty() || password.is_empty() {
            return Err(CredentialsError::MalformedToken);
        }

        Ok(Self {
            registry,
            username: username.to_string(),
            password: SecretString::new(password),
            token: SecretString::new(token.trim()),
        })
    }
}

/// Strips the URL scheme and trailing slashes from a registry endpoint.
pub fn registry_host(endpoint: &str) -> String {
    let host = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint);
    host.trim_end_matches('/').to_string()
}
