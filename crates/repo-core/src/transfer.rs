//! Artifact downloads into the local repository and deployments to the
//! remote repository, with listener-driven outcome capture.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use url::Url;

use crate::coords::Coordinates;
use crate::digest::{DigestAlgorithm, digest_file};
use crate::metadata::MavenMetadata;
use crate::session::RemoteSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Get,
    Put,
}

/// Resource a transfer event refers to.
#[derive(Debug, Clone)]
pub struct TransferResource {
    pub repository_url: String,
    pub resource_name: String,
    pub file: PathBuf,
}

impl TransferResource {
    pub fn published_url(&self) -> Result<Url> {
        let raw = format!("{}{}", self.repository_url, self.resource_name);
        Url::parse(&raw).with_context(|| format!("invalid published URL `{raw}`"))
    }
}

#[derive(Debug)]
pub struct TransferEvent<'a> {
    pub request: RequestType,
    pub resource: &'a TransferResource,
    pub error: Option<&'a anyhow::Error>,
}

/// Observer of transfer progress. Callbacks run synchronously on the thread
/// performing the transfer.
pub trait TransferListener {
    fn transfer_started(&self, _event: &TransferEvent<'_>) {}
    fn transfer_succeeded(&self, _event: &TransferEvent<'_>) {}
    fn transfer_failed(&self, _event: &TransferEvent<'_>) {}
    fn transfer_corrupted(&self, _event: &TransferEvent<'_>) {}
}

/// Listener that only logs.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl TransferListener for LoggingListener {
    fn transfer_started(&self, event: &TransferEvent<'_>) {
        tracing::debug!(request = ?event.request, resource = %event.resource.resource_name, "transfer started");
    }

    fn transfer_succeeded(&self, event: &TransferEvent<'_>) {
        tracing::debug!(request = ?event.request, resource = %event.resource.resource_name, "transfer succeeded");
    }

    fn transfer_failed(&self, event: &TransferEvent<'_>) {
        tracing::debug!(
            request = ?event.request,
            resource = %event.resource.resource_name,
            error = ?event.error,
            "transfer failed"
        );
    }
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub artifact: Url,
}

/// Single-assignment record of the upload of one file. Only the first
/// success or failure event for that file is kept.
pub struct TransferOutcome {
    file: PathBuf,
    cell: OnceLock<Result<PutResult, String>>,
}

impl TransferOutcome {
    pub fn new(file: &Path) -> Self {
        Self {
            file: file.to_path_buf(),
            cell: OnceLock::new(),
        }
    }

    fn concerns(&self, event: &TransferEvent<'_>) -> bool {
        event.request == RequestType::Put && event.resource.file == self.file
    }

    fn record_failure(&self, event: &TransferEvent<'_>) {
        if self.concerns(event) {
            let message = event
                .error
                .map(|err| format!("{err:#}"))
                .unwrap_or_else(|| "transfer failed".to_string());
            let _ = self.cell.set(Err(message));
        }
    }

    /// `None` when no event for the file was observed.
    pub fn into_inner(self) -> Option<Result<PutResult, String>> {
        self.cell.into_inner()
    }
}

impl TransferListener for TransferOutcome {
    fn transfer_succeeded(&self, event: &TransferEvent<'_>) {
        if !self.concerns(event) {
            return;
        }
        let recorded = event
            .resource
            .published_url()
            .map(|artifact| PutResult { artifact })
            .map_err(|err| format!("{err:#}"));
        if let Ok(result) = &recorded {
            tracing::info!(artifact = %result.artifact, "uploaded artifact");
        }
        let _ = self.cell.set(recorded);
    }

    fn transfer_failed(&self, event: &TransferEvent<'_>) {
        self.record_failure(event);
    }

    fn transfer_corrupted(&self, event: &TransferEvent<'_>) {
        self.record_failure(event);
    }
}

/// Performs gets and puts against the session's remote repository.
pub struct ArtifactTransfer<'a> {
    session: &'a RemoteSession,
    listener: &'a dyn TransferListener,
}

impl<'a> ArtifactTransfer<'a> {
    pub fn new(session: &'a RemoteSession, listener: &'a dyn TransferListener) -> Self {
        Self { session, listener }
    }

    /// Download `coords` into the local repository. `Ok(None)` when the
    /// remote does not have the artifact.
    pub fn download(&self, coords: &Coordinates) -> Result<Option<PathBuf>> {
        let cached = self.session.local().path_for(coords)?;
        if cached.is_file() {
            tracing::debug!(artifact = %coords, path = %cached.display(), "artifact already cached");
            return Ok(Some(cached));
        }

        let resource_name = coords.path();
        let resource = TransferResource {
            repository_url: self.session.remote().repository_url(),
            resource_name: resource_name.clone(),
            file: cached.clone(),
        };
        self.emit(RequestType::Get, &resource, None, Signal::Started);

        let url = self.session.remote().url_for(&resource_name)?;
        let fetched = match self.session.transports().fetch(&url) {
            Ok(Some(fetched)) => fetched,
            Ok(None) => {
                let err = anyhow!("{url} was not found");
                self.emit(RequestType::Get, &resource, Some(&err), Signal::Failed);
                return Ok(None);
            }
            Err(err) => {
                self.emit(RequestType::Get, &resource, Some(&err), Signal::Failed);
                return Err(err);
            }
        };

        if let Err(err) = self.verify_checksum(&url, fetched.path()) {
            self.emit(RequestType::Get, &resource, Some(&err), Signal::Corrupted);
            return Err(err);
        }

        let stored = self.session.local().store(coords, fetched.path())?;
        self.emit(RequestType::Get, &resource, None, Signal::Succeeded);
        Ok(Some(stored))
    }

    /// Upload `file` as `coords`, followed by its `.sha1` checksum and the
    /// updated `maven-metadata.xml`.
    pub fn deploy(&self, coords: &Coordinates, file: &Path) -> Result<()> {
        let remote = self.session.remote();
        let resource_name = coords.path();
        let resource = TransferResource {
            repository_url: remote.repository_url(),
            resource_name: resource_name.clone(),
            file: file.to_path_buf(),
        };
        self.emit(RequestType::Put, &resource, None, Signal::Started);
        let url = remote.url_for(&resource_name)?;
        if let Err(err) = self.session.transports().publish(&url, file) {
            self.emit(RequestType::Put, &resource, Some(&err), Signal::Failed);
            return Err(err);
        }
        self.emit(RequestType::Put, &resource, None, Signal::Succeeded);

        self.deploy_checksum(coords, file)?;
        self.deploy_metadata(coords)
    }

    fn deploy_checksum(&self, coords: &Coordinates, file: &Path) -> Result<()> {
        let checksum = digest_file(file, DigestAlgorithm::Sha1)?;
        let staged = self
            .session
            .local()
            .path_for(coords)?
            .with_extension("jar.sha1");
        write_staged(&staged, checksum.hex().as_bytes())?;
        let url = self
            .session
            .remote()
            .url_for(&format!("{}.sha1", coords.path()))?;
        self.session.transports().publish(&url, &staged)
    }

    fn deploy_metadata(&self, coords: &Coordinates) -> Result<()> {
        let url = self.session.remote().url_for(&coords.key.metadata_path())?;
        let mut metadata = match self.session.transports().fetch(&url)? {
            Some(existing) => {
                let xml = fs::read_to_string(existing.path())
                    .with_context(|| format!("failed to read metadata from {url}"))?;
                MavenMetadata::parse(&xml)?
            }
            None => MavenMetadata::default(),
        };
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        metadata.add_version(&coords.version, &timestamp);

        let staged = self.session.local().metadata_path(&coords.key)?;
        write_staged(&staged, metadata.render(&coords.key).as_bytes())?;
        self.session.transports().publish(&url, &staged)
    }

    fn verify_checksum(&self, url: &Url, file: &Path) -> Result<()> {
        let checksum_url = Url::parse(&format!("{url}.sha1"))?;
        let Some(published) = self.session.transports().fetch(&checksum_url)? else {
            return Ok(());
        };
        let expected = fs::read_to_string(published.path())?;
        let expected = expected.split_whitespace().next().unwrap_or_default();
        let actual = digest_file(file, DigestAlgorithm::Sha1)?;
        if !actual.matches_hex(expected) {
            return Err(anyhow!(
                "checksum mismatch for {url}: expected {expected}, got {}",
                actual.hex()
            ));
        }
        Ok(())
    }

    fn emit(
        &self,
        request: RequestType,
        resource: &TransferResource,
        error: Option<&anyhow::Error>,
        signal: Signal,
    ) {
        let event = TransferEvent {
            request,
            resource,
            error,
        };
        match signal {
            Signal::Started => self.listener.transfer_started(&event),
            Signal::Succeeded => self.listener.transfer_succeeded(&event),
            Signal::Failed => self.listener.transfer_failed(&event),
            Signal::Corrupted => self.listener.transfer_corrupted(&event),
        }
    }
}

#[derive(Clone, Copy)]
enum Signal {
    Started,
    Succeeded,
    Failed,
    Corrupted,
}

fn write_staged(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to stage {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(file: &str) -> TransferResource {
        TransferResource {
            repository_url: "https://repo.example.com/releases/".into(),
            resource_name: "org/example/api/1.0.0/api-1.0.0.jar".into(),
            file: PathBuf::from(file),
        }
    }

    #[test]
    fn outcome_keeps_first_matching_event() {
        let outcome = TransferOutcome::new(Path::new("/tmp/put1.bnd"));
        let ours = resource("/tmp/put1.bnd");
        let other = resource("/tmp/other.sha1");
        let err = anyhow!("connection reset");

        outcome.transfer_failed(&TransferEvent {
            request: RequestType::Put,
            resource: &other,
            error: Some(&err),
        });
        outcome.transfer_succeeded(&TransferEvent {
            request: RequestType::Put,
            resource: &ours,
            error: None,
        });
        outcome.transfer_failed(&TransferEvent {
            request: RequestType::Put,
            resource: &ours,
            error: Some(&err),
        });

        let result = outcome.into_inner().unwrap().unwrap();
        assert_eq!(
            result.artifact.as_str(),
            "https://repo.example.com/releases/org/example/api/1.0.0/api-1.0.0.jar"
        );
    }

    #[test]
    fn outcome_ignores_downloads() {
        let outcome = TransferOutcome::new(Path::new("/tmp/put2.bnd"));
        let ours = resource("/tmp/put2.bnd");
        outcome.transfer_succeeded(&TransferEvent {
            request: RequestType::Get,
            resource: &ours,
            error: None,
        });
        assert!(outcome.into_inner().is_none());
    }
}
