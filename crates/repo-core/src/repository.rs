//! Repository facade: publishes bundles to a Maven-layout remote and answers
//! list/versions/get queries, preferring a pre-built index when one is
//! reachable.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use url::Url;

use crate::bundle::BundleInfo;
use crate::cache::LocalRepository;
use crate::config::RepoConfig;
use crate::coords::{ArtifactKey, Coordinates, SOURCES_CLASSIFIER, maybe_coords_to_bsn};
use crate::digest::{DigestAlgorithm, DigestReader};
use crate::error::{RepoError, Result};
use crate::index::IndexedFallback;
use crate::listener::{self, DownloadListener};
use crate::range::VersionRangeResolver;
use crate::session::{RemoteRepository, RemoteSession};
use crate::transfer::{ArtifactTransfer, LoggingListener, PutResult, TransferOutcome};
use crate::transport::{ProbeStatus, Transport, TransportRegistry};
use crate::version::{Version, VersionRange};

pub const BSN_PROPERTY: &str = "bsn";
pub const STRATEGY_PROPERTY: &str = "strategy";
pub const VERSION_PROPERTY: &str = "version";
pub const EXACT_STRATEGY: &str = "exact";
pub const SOURCE_SUFFIX: &str = ".source";

const PUT_PREFIX: &str = "put";
const PUT_SUFFIX: &str = ".bnd";

/// Answer to a query that the repository may not be able to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The repository cannot answer this kind of query.
    Unsupported,
    /// The query is supported but matched nothing.
    Empty,
    Found(T),
}

impl<T> Lookup<T> {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }

    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Unsupported | Self::Empty => None,
        }
    }
}

impl<T> Lookup<Vec<T>> {
    fn from_vec(items: Vec<T>) -> Self {
        if items.is_empty() {
            Self::Empty
        } else {
            Self::Found(items)
        }
    }
}

impl<T> Lookup<BTreeSet<T>> {
    fn from_set(items: BTreeSet<T>) -> Self {
        if items.is_empty() {
            Self::Empty
        } else {
            Self::Found(items)
        }
    }
}

/// Options accepted by [`RepositoryResolver::put`].
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Expected SHA-1 of the uploaded stream.
    pub digest: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionPhase {
    Compile,
    Build,
    Test,
    Runtime,
}

impl ResolutionPhase {
    pub const ALL: [ResolutionPhase; 4] = [
        ResolutionPhase::Compile,
        ResolutionPhase::Build,
        ResolutionPhase::Test,
        ResolutionPhase::Runtime,
    ];
}

struct Backend {
    session: RemoteSession,
    fallback: Option<IndexedFallback>,
}

enum InitState {
    Uninitialized,
    ProbeFailedRetryable,
    Ready(Arc<Backend>),
}

pub struct RepositoryResolver {
    config: RepoConfig,
    overrides: Vec<Arc<dyn Transport>>,
    state: Mutex<InitState>,
}

impl RepositoryResolver {
    pub fn new(config: RepoConfig) -> Self {
        Self {
            config,
            overrides: Vec::new(),
            state: Mutex::new(InitState::Uninitialized),
        }
    }

    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self> {
        Ok(Self::new(RepoConfig::from_properties(properties)?))
    }

    /// Use `transport` for its scheme instead of the built-in one.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.overrides.push(transport);
        self
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn location(&self) -> &str {
        &self.config.location
    }

    pub fn can_write(&self) -> bool {
        true
    }

    pub fn supported_phases(&self) -> &'static [ResolutionPhase] {
        &ResolutionPhase::ALL
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.lock(), InitState::Ready(_))
    }

    fn ensure_ready(&self) -> Result<Arc<Backend>> {
        let mut state = self.state.lock();
        if let InitState::Ready(backend) = &*state {
            return Ok(Arc::clone(backend));
        }
        if matches!(*state, InitState::ProbeFailedRetryable) {
            tracing::debug!(repository = %self.config.name, "retrying initialisation");
        }
        let (backend, probe) = self
            .initialise()
            .map_err(|err| RepoError::init(&self.config.name, err))?;
        let backend = Arc::new(backend);
        if probe == ProbeStatus::Unreachable {
            tracing::warn!(
                repository = %self.config.name,
                index = %self.config.index_url,
                "index host unreachable; continuing without fallback index"
            );
            *state = InitState::ProbeFailedRetryable;
        } else {
            *state = InitState::Ready(Arc::clone(&backend));
        }
        Ok(backend)
    }

    fn initialise(&self) -> anyhow::Result<(Backend, ProbeStatus)> {
        let config = &self.config;
        let remote = RemoteRepository::new(&config.url, config.credentials.clone());
        let mut transports = TransportRegistry::default();
        transports.register_builtin(remote.credentials())?;
        for transport in &self.overrides {
            transports.register_shared(Arc::clone(transport));
        }

        let local = LocalRepository::open(&config.cache_dir)?;

        let probe = transports.probe(&config.index_url)?;
        let fallback = match probe {
            ProbeStatus::Status(_) if probe.is_available() => {
                tracing::info!(repository = %config.name, index = %config.index_url, "using fallback index");
                Some(IndexedFallback::new(
                    vec![config.index_url.clone()],
                    &config.cache_dir,
                    transports.clone(),
                ))
            }
            ProbeStatus::Status(code) => {
                tracing::info!(repository = %config.name, index = %config.index_url, status = code, "no fallback index");
                None
            }
            ProbeStatus::Unreachable => None,
        };

        let session = RemoteSession::new(remote, local, transports);
        Ok((Backend { session, fallback }, probe))
    }

    /// Publish the bundle read from `reader`. The stream is staged in the
    /// cache directory and removed again whatever the outcome.
    pub fn put<R: Read>(&self, reader: R, options: &PutOptions) -> Result<PutResult> {
        let backend = self.ensure_ready()?;

        let mut staged = tempfile::Builder::new()
            .prefix(PUT_PREFIX)
            .suffix(PUT_SUFFIX)
            .tempfile_in(&self.config.cache_dir)?;
        let mut digesting = DigestReader::new(reader, DigestAlgorithm::Sha1);
        io::copy(&mut digesting, staged.as_file_mut())?;
        let digest = digesting.finish();

        if let Some(expected) = &options.digest {
            if expected.as_slice() != digest.as_bytes() {
                return Err(RepoError::DigestMismatch {
                    expected: hex::encode(expected),
                    actual: digest.hex(),
                });
            }
        }

        let coords = BundleInfo::read(staged.path())
            .and_then(|info| info.coordinates())
            .map_err(RepoError::Bundle)?;
        tracing::info!(artifact = %coords, repository = %self.config.name, "deploying bundle");

        let outcome = TransferOutcome::new(staged.path());
        let deployed =
            ArtifactTransfer::new(&backend.session, &outcome).deploy(&coords, staged.path());

        match (outcome.into_inner(), deployed) {
            (Some(Ok(result)), deployed) => {
                // the jar is on the remote even if its checksum or metadata is not
                if let Some(fallback) = &backend.fallback {
                    fallback.reset();
                }
                match deployed {
                    Ok(()) => Ok(result),
                    Err(err) => Err(RepoError::upload(err.context(format!(
                        "{} was published but its checksum or metadata upload failed",
                        result.artifact
                    )))),
                }
            }
            (_, Err(err)) => Err(RepoError::upload(err)),
            (Some(Err(message)), Ok(())) => Err(RepoError::upload(anyhow!(message))),
            (None, Ok(())) => Err(RepoError::NotUploaded),
        }
    }

    /// Symbolic names matching `pattern`. Only answered from the fallback
    /// index.
    pub fn list(&self, pattern: Option<&str>) -> Result<Lookup<Vec<String>>> {
        let backend = self.ensure_ready()?;
        let Some(fallback) = &backend.fallback else {
            return Ok(Lookup::Unsupported);
        };
        let names = fallback.list(pattern).map_err(RepoError::Index)?;
        Ok(Lookup::from_vec(names))
    }

    pub fn versions(&self, identity: &str) -> Result<Lookup<BTreeSet<Version>>> {
        let backend = self.ensure_ready()?;
        if let Some(fallback) = &backend.fallback {
            let versions = fallback
                .versions(&maybe_coords_to_bsn(identity))
                .map_err(RepoError::Index)?;
            return Ok(Lookup::from_set(versions));
        }

        let Some(key) = ArtifactKey::parse(identity) else {
            tracing::debug!(%identity, "not a group:artifact identity");
            return Ok(Lookup::Unsupported);
        };
        let versions = VersionRangeResolver::new(&backend.session)
            .resolve(&key, &VersionRange::any())
            .map_err(RepoError::Remote)?;
        Ok(Lookup::from_set(versions))
    }

    /// Fetch `bsn` at `version`. Every listener hears about the outcome
    /// exactly once; a missing artifact is `Ok(None)`.
    pub fn get(
        &self,
        bsn: &str,
        version: &Version,
        properties: &BTreeMap<String, String>,
        listeners: &[&dyn DownloadListener],
    ) -> Result<Option<PathBuf>> {
        let backend = self.ensure_ready()?;
        if let Some(fallback) = &backend.fallback {
            return fallback
                .get(&maybe_coords_to_bsn(bsn), version, listeners)
                .map_err(RepoError::Index);
        }

        let file = match remote_coordinates(bsn, version, properties) {
            Some(coords) => self.download(&backend.session, &coords),
            None => None,
        };
        listener::notify(listeners, file.as_ref());
        Ok(file)
    }

    fn download(&self, session: &RemoteSession, coords: &Coordinates) -> Option<PathBuf> {
        match ArtifactTransfer::new(session, &LoggingListener).download(coords) {
            Ok(Some(path)) => {
                tracing::debug!(artifact = %coords, path = %path.display(), "resolved artifact");
                Some(path)
            }
            Ok(None) => {
                tracing::debug!(artifact = %coords, "artifact not found");
                None
            }
            Err(err) => {
                tracing::warn!(artifact = %coords, error = %format!("{err:#}"), "artifact resolution failed");
                None
            }
        }
    }

    pub fn index_locations(&self) -> Result<Vec<Url>> {
        let backend = self.ensure_ready()?;
        Ok(backend
            .fallback
            .as_ref()
            .map(|fallback| fallback.index_locations().to_vec())
            .unwrap_or_default())
    }

    /// Force the fallback index to reload on next access.
    pub fn reset_index(&self) -> Result<()> {
        let backend = self.ensure_ready()?;
        if let Some(fallback) = &backend.fallback {
            fallback.reset();
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }
}

/// Maven coordinates for a live `get`. A `.source` name paired with a `bsn`
/// property asks for the sources jar of that bundle, at the literal version
/// given in the properties.
fn remote_coordinates(
    bsn: &str,
    version: &Version,
    properties: &BTreeMap<String, String>,
) -> Option<Coordinates> {
    let (bsn, sources) = match (
        bsn.strip_suffix(SOURCE_SUFFIX),
        properties.get(BSN_PROPERTY),
    ) {
        (Some(_), Some(original)) => (original.as_str(), true),
        _ => (bsn, false),
    };

    let key = match ArtifactKey::from_bsn(bsn) {
        Ok(key) => key,
        Err(err) => {
            tracing::debug!(%bsn, error = %err, "cannot map symbolic name to coordinates");
            return None;
        }
    };

    let exact = properties.get(STRATEGY_PROPERTY).map(String::as_str) == Some(EXACT_STRATEGY);
    let version = match properties.get(VERSION_PROPERTY) {
        Some(literal) if exact || sources => literal.clone(),
        _ => version.to_maven(),
    };

    let coords = key.with_version(version);
    let coords = if sources {
        coords.with_classifier(SOURCES_CLASSIFIER)
    } else {
        coords
    };
    match coords.validate() {
        Ok(()) => Some(coords),
        Err(err) => {
            tracing::debug!(artifact = %coords, error = %err, "refusing coordinates");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn maps_plain_bundle_to_maven_version() {
        let version = Version::new(1, 2, 0).with_qualifier("RC1").unwrap();
        let coords = remote_coordinates("org.example.api", &version, &props(&[])).unwrap();
        assert_eq!(coords.to_string(), "org.example:api:jar:1.2.0-RC1");
    }

    #[test]
    fn exact_strategy_uses_literal_version() {
        let coords = remote_coordinates(
            "org.example.api",
            &Version::new(1, 2, 0),
            &props(&[("strategy", "exact"), ("version", "1.2")]),
        )
        .unwrap();
        assert_eq!(coords.version, "1.2");
    }

    #[test]
    fn source_request_selects_sources_classifier() {
        let coords = remote_coordinates(
            "org.example.api.source",
            &Version::new(1, 0, 0),
            &props(&[("bsn", "org.example.api"), ("version", "1.0")]),
        )
        .unwrap();
        assert_eq!(coords.to_string(), "org.example:api:jar:sources:1.0");
        assert_eq!(coords.path(), "org/example/api/1.0/api-1.0-sources.jar");

        // without the original name the suffix is part of the symbolic name
        let plain = remote_coordinates("org.example.api.source", &Version::new(1, 0, 0), &props(&[]))
            .unwrap();
        assert_eq!(plain.key, ArtifactKey::new("org.example.api", "source"));
        assert!(plain.classifier.is_none());
    }

    #[test]
    fn literal_versions_cannot_leave_the_repository() {
        let escaping = props(&[("strategy", "exact"), ("version", "1/../../../../pwn")]);
        assert!(remote_coordinates("org.example.api", &Version::new(1, 0, 0), &escaping).is_none());
        let dots = props(&[("strategy", "exact"), ("version", "..")]);
        assert!(remote_coordinates("org.example.api", &Version::new(1, 0, 0), &dots).is_none());
        let source = props(&[("bsn", "../etc.passwd"), ("version", "1.0")]);
        assert!(remote_coordinates("x.source", &Version::new(1, 0, 0), &source).is_none());
    }

    #[test]
    fn undotted_names_have_no_coordinates() {
        assert!(remote_coordinates("standalone", &Version::new(1, 0, 0), &props(&[])).is_none());
    }

    #[test]
    fn lookup_helpers() {
        assert_eq!(Lookup::from_vec(Vec::<String>::new()), Lookup::Empty);
        assert_eq!(
            Lookup::from_vec(vec!["a".to_string()]).found(),
            Some(vec!["a".to_string()])
        );
        assert!(Lookup::<Vec<String>>::Unsupported.is_unsupported());
    }
}
