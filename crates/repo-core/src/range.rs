use std::collections::BTreeSet;
use std::fs;

use anyhow::{Context, Result};

use crate::coords::ArtifactKey;
use crate::metadata::MavenMetadata;
use crate::session::RemoteSession;
use crate::version::{Version, VersionRange};

/// Resolves the published versions of an artifact that fall inside a range.
pub struct VersionRangeResolver<'a> {
    session: &'a RemoteSession,
}

impl<'a> VersionRangeResolver<'a> {
    pub fn new(session: &'a RemoteSession) -> Self {
        Self { session }
    }

    /// Versions the remote publishes for `key` inside `range`. Version strings
    /// that cannot be read as bundle versions are skipped.
    pub fn resolve(&self, key: &ArtifactKey, range: &VersionRange) -> Result<BTreeSet<Version>> {
        let url = self.session.remote().url_for(&key.metadata_path())?;
        let Some(fetched) = self.session.transports().fetch(&url)? else {
            tracing::debug!(artifact = %key, "no metadata published");
            return Ok(BTreeSet::new());
        };
        let xml = fs::read_to_string(fetched.path())
            .with_context(|| format!("failed to read metadata for {key}"))?;
        let metadata = MavenMetadata::parse(&xml)
            .with_context(|| format!("invalid metadata document at {url}"))?;

        let mut versions = BTreeSet::new();
        for raw in &metadata.versions {
            match Version::parse_maven(raw) {
                Ok(version) if range.includes(&version) => {
                    versions.insert(version);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(artifact = %key, version = %raw, error = %err, "skipping unreadable version");
                }
            }
        }
        Ok(versions)
    }
}
