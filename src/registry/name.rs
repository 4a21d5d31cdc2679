//! Image reference parsing.
//!
//! Follows the usual container reference grammar: an optional registry host,
//! a repository path, then either `:tag` or `@digest`.

use std::fmt;

use crate::registry::RegistryError;

pub const DEFAULT_REGISTRY: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageReference {
    Tag(String),
    Digest(String),
}

/// Location of one image in a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    pub registry: String,
    pub repository: String,
    pub reference: ImageReference,
}

impl ImageDescriptor {
    /// Pull scope requested when authenticating for this image
    pub fn pull_scope(&self) -> String {
        format!("repository:{}:pull", self.repository)
    }
}

impl fmt::Display for ImageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        match &self.reference {
            ImageReference::Tag(tag) => write!(f, ":{tag}"),
            ImageReference::Digest(digest) => write!(f, "@{digest}"),
        }
    }
}

fn looks_like_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn valid_path_component(component: &str) -> bool {
    !component.is_empty()
        && component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Parse an image name such as `registry2.example.com/v2/abc@sha256:...`
pub fn parse_image_name(name: &str) -> Result<ImageDescriptor, RegistryError> {
    let invalid = || RegistryError::InvalidImageName(name.to_string());
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid());
    }

    let (remainder, digest) = match name.split_once('@') {
        Some((rest, digest)) => {
            if !digest.contains(':') || digest.ends_with(':') {
                return Err(invalid());
            }
            (rest, Some(digest.to_string()))
        }
        None => (name, None),
    };

    let (registry, path) = match remainder.split_once('/') {
        Some((first, rest)) if looks_like_host(first) => (first.to_string(), rest),
        _ => (DEFAULT_REGISTRY.to_string(), remainder),
    };

    // A colon after the last slash separates the tag
    let last_slash = path.rfind('/').map_or(0, |i| i + 1);
    let (repository, tag) = match path[last_slash..].rfind(':') {
        Some(i) => {
            let split = last_slash + i;
            (&path[..split], Some(path[split + 1..].to_string()))
        }
        None => (path, None),
    };

    if !repository.split('/').all(valid_path_component) {
        return Err(invalid());
    }
    let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
        format!("library/{repository}")
    } else {
        repository.to_string()
    };

    let reference = match (digest, tag) {
        (Some(digest), _) => ImageReference::Digest(digest),
        (None, Some(tag)) if !tag.is_empty() => ImageReference::Tag(tag),
        (None, Some(_)) => return Err(invalid()),
        (None, None) => ImageReference::Tag(DEFAULT_TAG.to_string()),
    };

    Ok(ImageDescriptor {
        registry,
        repository,
        reference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_digest_reference_with_host() {
        let image = parse_image_name(
            "registry2.balena-cloud.com/v2/8ad7d2d5f6fe2ba4c4a3aa0e6d3c1f1c@sha256:1b9a0f2d",
        )
        .unwrap();
        assert_eq!(image.registry, "registry2.balena-cloud.com");
        assert_eq!(image.repository, "v2/8ad7d2d5f6fe2ba4c4a3aa0e6d3c1f1c");
        assert_eq!(image.reference, ImageReference::Digest("sha256:1b9a0f2d".into()));
    }

    #[test]
    fn test_parse_defaults_registry_and_tag() {
        let image = parse_image_name("alpine").unwrap();
        assert_eq!(image.registry, DEFAULT_REGISTRY);
        assert_eq!(image.repository, "library/alpine");
        assert_eq!(image.reference, ImageReference::Tag("latest".into()));
        assert_eq!(image.to_string(), "docker.io/library/alpine:latest");
    }

    #[test]
    fn test_parse_host_with_port_and_tag() {
        let image = parse_image_name("localhost:5000/team/app:1.2.3").unwrap();
        assert_eq!(image.registry, "localhost:5000");
        assert_eq!(image.repository, "team/app");
        assert_eq!(image.reference, ImageReference::Tag("1.2.3".into()));
        assert_eq!(image.pull_scope(), "repository:team/app:pull");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_image_name("").is_err());
        assert!(parse_image_name("Upper/Case").is_err());
        assert!(parse_image_name("app@nodigest").is_err());
        assert!(parse_image_name("app:").is_err());
    }
}
