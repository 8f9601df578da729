use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tempfile::TempPath;
use url::Url;

mod fs;
mod http;

pub use fs::FsTransport;
pub use http::HttpTransport;

/// Response from a transport indicating where the fetched content was stored.
pub struct FetchResponse {
    location: FetchLocation,
}

impl FetchResponse {
    pub fn from_path(path: PathBuf) -> Self {
        Self {
            location: FetchLocation::Permanent(path),
        }
    }

    pub fn from_temp(path: TempPath) -> Self {
        Self {
            location: FetchLocation::Temporary(path),
        }
    }

    pub fn path(&self) -> &Path {
        match &self.location {
            FetchLocation::Permanent(path) => path,
            FetchLocation::Temporary(path) => path.as_ref(),
        }
    }
}

enum FetchLocation {
    Permanent(PathBuf),
    Temporary(TempPath),
}

/// Result of a lightweight existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The endpoint answered with this status code.
    Status(u16),
    /// The host could not be reached at all.
    Unreachable,
}

impl ProbeStatus {
    pub fn is_available(self) -> bool {
        matches!(self, Self::Status(code) if code < 400)
    }
}

/// Username/password pair attached to remote sessions.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait Transport: Send + Sync {
    fn scheme(&self) -> &'static str;
    fn probe(&self, url: &Url) -> Result<ProbeStatus>;
    /// `Ok(None)` when the remote reports the resource as missing.
    fn fetch(&self, url: &Url) -> Result<Option<FetchResponse>>;
    fn publish(&self, url: &Url, source: &Path) -> Result<()>;
}

#[derive(Default, Clone)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn register(&mut self, transport: impl Transport + 'static) {
        self.register_shared(Arc::new(transport));
    }

    pub fn register_shared(&mut self, transport: Arc<dyn Transport>) {
        self.transports
            .insert(transport.scheme().to_string(), transport);
    }

    pub fn register_builtin(&mut self, credentials: Option<&Credentials>) -> Result<()> {
        self.register(FsTransport::new());
        self.register(HttpTransport::new("http", credentials.cloned())?);
        self.register(HttpTransport::new("https", credentials.cloned())?);
        Ok(())
    }

    pub fn for_url(&self, url: &Url) -> Result<&dyn Transport> {
        self.transports
            .get(&url.scheme().to_ascii_lowercase())
            .map(Arc::as_ref)
            .ok_or_else(|| anyhow!("no transport registered for scheme `{}`", url.scheme()))
    }

    pub fn probe(&self, url: &Url) -> Result<ProbeStatus> {
        self.for_url(url)?.probe(url)
    }

    pub fn fetch(&self, url: &Url) -> Result<Option<FetchResponse>> {
        self.for_url(url)?.fetch(url)
    }

    pub fn publish(&self, url: &Url, source: &Path) -> Result<()> {
        self.for_url(url)?.publish(url, source)
    }
}
