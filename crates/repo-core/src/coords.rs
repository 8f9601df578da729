//! Translation between bundle symbolic names and Maven coordinates, plus the
//! Maven repository path layout.

use std::fmt;

use anyhow::{Result, anyhow, bail};

use crate::version::Version;

pub const JAR_EXTENSION: &str = "jar";
pub const SOURCES_CLASSIFIER: &str = "sources";
pub const METADATA_FILE: &str = "maven-metadata.xml";

/// `group:artifact` pair without a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub group: String,
    pub artifact: String,
}

impl ArtifactKey {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
        }
    }

    /// Split a symbolic name at its last dot: `org.example.api` becomes
    /// `org.example:api`.
    pub fn from_bsn(bsn: &str) -> Result<Self> {
        let (group, artifact) = bsn
            .rsplit_once('.')
            .ok_or_else(|| anyhow!("cannot map bundle symbolic name `{bsn}` to Maven coordinates"))?;
        if group.is_empty() || artifact.is_empty() {
            bail!("cannot map bundle symbolic name `{bsn}` to Maven coordinates");
        }
        Ok(Self::new(group, artifact))
    }

    /// Parse a coordinate-shaped identity `group:artifact`.
    pub fn parse(identity: &str) -> Option<Self> {
        let mut parts = identity.split(':');
        let group = parts.next()?.trim();
        let artifact = parts.next()?.trim();
        if parts.next().is_some() || !is_coordinate_part(group) || !is_coordinate_part(artifact)
        {
            return None;
        }
        Some(Self::new(group, artifact))
    }

    /// Symbolic name conventionally published for these coordinates.
    pub fn to_bsn(&self) -> String {
        let prefix = format!("{}.", self.group);
        if self.artifact.starts_with(&prefix) || self.artifact == self.group {
            self.artifact.clone()
        } else {
            format!("{}.{}", self.group, self.artifact)
        }
    }

    pub fn directory(&self) -> String {
        format!("{}/{}", self.group.replace('.', "/"), self.artifact)
    }

    pub fn metadata_path(&self) -> String {
        format!("{}/{METADATA_FILE}", self.directory())
    }

    /// Reject keys whose group or artifact would not stay inside the
    /// repository layout.
    pub fn validate(&self) -> Result<()> {
        if !self.group.split('.').all(is_path_segment) || !is_path_segment(&self.artifact) {
            bail!("`{self}` cannot be laid out as a repository path");
        }
        Ok(())
    }

    pub fn with_version(self, version: impl Into<String>) -> Coordinates {
        Coordinates {
            key: self,
            classifier: None,
            extension: JAR_EXTENSION.to_string(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

fn is_coordinate_part(part: &str) -> bool {
    !part.is_empty() && !part.contains(char::is_whitespace)
}

/// A single repository path segment: non-empty, not `.` or `..`, and free of
/// path separators.
pub(crate) fn is_path_segment(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
}

/// Translate `group:artifact` identities to symbolic names; anything else is
/// returned unchanged.
pub fn maybe_coords_to_bsn(identity: &str) -> String {
    ArtifactKey::parse(identity)
        .map(|key| key.to_bsn())
        .unwrap_or_else(|| identity.to_string())
}

/// Full Maven coordinates of one artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinates {
    pub key: ArtifactKey,
    pub classifier: Option<String>,
    pub extension: String,
    pub version: String,
}

impl Coordinates {
    pub fn validate(&self) -> Result<()> {
        self.key.validate()?;
        let parts_valid = is_path_segment(&self.version)
            && is_path_segment(&self.extension)
            && self.classifier.as_deref().is_none_or(is_path_segment);
        if !parts_valid {
            bail!("`{self}` cannot be laid out as a repository path");
        }
        Ok(())
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Coordinates for a bundle, honouring a `Maven-GroupId` manifest header
    /// when present.
    pub fn for_bundle(bsn: &str, version: &Version, group_hint: Option<&str>) -> Result<Self> {
        let key = match group_hint {
            Some(group) => {
                let prefix = format!("{group}.");
                let artifact = match bsn.strip_prefix(&prefix) {
                    Some("") => bail!("bundle symbolic name `{bsn}` has an empty artifact id"),
                    Some(rest) => rest,
                    None => bsn,
                };
                ArtifactKey::new(group, artifact)
            }
            None => ArtifactKey::from_bsn(bsn)?,
        };
        let coords = key.with_version(version.to_maven());
        coords.validate()?;
        Ok(coords)
    }

    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.key.artifact, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.key.artifact, self.version, self.extension),
        }
    }

    /// Repository-relative path in the Maven layout.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.key.directory(),
            self.version,
            self.file_name()
        )
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.extension)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        write!(f, ":{}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bsn_splits_at_last_dot() {
        let key = ArtifactKey::from_bsn("org.example.api").unwrap();
        assert_eq!(key, ArtifactKey::new("org.example", "api"));
        assert!(ArtifactKey::from_bsn("plain").is_err());
        assert!(ArtifactKey::from_bsn("trailing.").is_err());
    }

    #[test]
    fn coordinate_shaped_identities() {
        assert_eq!(
            ArtifactKey::parse("org.example:api"),
            Some(ArtifactKey::new("org.example", "api"))
        );
        assert_eq!(ArtifactKey::parse("org.example.api"), None);
        assert_eq!(ArtifactKey::parse("a:b:c"), None);
        assert_eq!(ArtifactKey::parse(":b"), None);
    }

    #[test]
    fn coordinates_translate_to_bsn() {
        assert_eq!(maybe_coords_to_bsn("org.example:api"), "org.example.api");
        assert_eq!(
            maybe_coords_to_bsn("org.example:org.example.api"),
            "org.example.api"
        );
        assert_eq!(maybe_coords_to_bsn("org.example.api"), "org.example.api");
    }

    #[test]
    fn maven_layout_paths() {
        let coords = ArtifactKey::new("org.example", "api").with_version("1.2.0");
        assert_eq!(coords.path(), "org/example/api/1.2.0/api-1.2.0.jar");
        let sources = coords.clone().with_classifier(SOURCES_CLASSIFIER);
        assert_eq!(
            sources.path(),
            "org/example/api/1.2.0/api-1.2.0-sources.jar"
        );
        assert_eq!(
            coords.key.metadata_path(),
            "org/example/api/maven-metadata.xml"
        );
        assert_eq!(coords.to_string(), "org.example:api:jar:1.2.0");
    }

    #[test]
    fn path_escaping_parts_are_rejected() {
        let key = ArtifactKey::new("org.example", "api");
        assert!(key.clone().with_version("1.0.0").validate().is_ok());
        assert!(key.clone().with_version("1/../../pwn").validate().is_err());
        assert!(key.clone().with_version("..").validate().is_err());
        assert!(key.clone().with_version("").validate().is_err());
        assert!(
            key.clone()
                .with_version("1.0")
                .with_classifier("..\\x")
                .validate()
                .is_err()
        );
        assert!(ArtifactKey::new("..", "api").validate().is_err());
        assert!(ArtifactKey::new("org/../etc", "api").validate().is_err());
        assert!(ArtifactKey::new("org.example", "..").validate().is_err());
        assert!(Coordinates::for_bundle("org/evil.api", &Version::new(1, 0, 0), None).is_err());
    }

    #[test]
    fn bundle_coordinates_use_group_hint() {
        let version = Version::new(1, 0, 0);
        let hinted = Coordinates::for_bundle("com.acme.widgets.core", &version, Some("com.acme"))
            .unwrap();
        assert_eq!(hinted.key, ArtifactKey::new("com.acme", "widgets.core"));
        let derived = Coordinates::for_bundle("com.acme.widgets", &version, None).unwrap();
        assert_eq!(derived.key, ArtifactKey::new("com.acme", "widgets"));
        assert_eq!(derived.version, "1.0.0");
    }
}
