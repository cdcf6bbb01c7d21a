use std::fmt;

/// A tagged image in a specific registry, e.g. `123456789012.dkr.ecr.eu-west-1.amazonaws.com/web:production`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReferenceError {
    MissingRegistry,
    MissingRepository,
    MissingTag,
    InvalidTag(String),
}

impl std::error::Error for ReferenceError {}
impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceError::MissingRegistry => write!(f, "registry is missing"),
            ReferenceError::MissingRepository => write!(f, "repository is missing"),
            ReferenceError::MissingTag => write!(f, "tag is missing"),
            ReferenceError::InvalidTag(tag) => write!(f, "invalid tag: {}", tag),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl ImageReference {
    pub fn new(registry: &str, repository: &str, tag: &str) -> Result<Self, ReferenceError> {
        if registry.is_empty() {
            return Err(ReferenceError::MissingRegistry);
        }
        if repository.is_empty() {
            return Err(ReferenceError::MissingRepository);
        }
        if tag.is_empty() {
            return Err(ReferenceError::MissingTag);
        }
        // digests and nested paths are not tags
        if tag.contains([':', '@', '/']) {
            return Err(ReferenceError::InvalidTag(tag.to_string()));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Same repository and tag, hosted by another registry.
    pub fn with_registry(&self, registry: &str) -> Self {
        Self {
            registry: registry.to_string(),
            ..self.clone()
        }
    }

    pub fn manifest_url(&self) -> String {
        format!(
            "https://{}/v2/{}/manifests/{}",
            self.registry, self.repository, self.tag
        )
    }
}
