use std::fmt;

use anyhow::{Context, Result};
use url::Url;

use crate::cache::LocalRepository;
use crate::transport::{Credentials, TransportRegistry};

/// Remote repository handle: base location plus optional credentials.
#[derive(Debug, Clone)]
pub struct RemoteRepository {
    base: String,
    credentials: Option<Credentials>,
}

impl RemoteRepository {
    pub fn new(base: &Url, credentials: Option<Credentials>) -> Self {
        Self {
            base: base.as_str().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Base location with a trailing slash, ready for resource names to be
    /// appended.
    pub fn repository_url(&self) -> String {
        format!("{}/", self.base)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn url_for(&self, resource_name: &str) -> Result<Url> {
        let raw = format!("{}{}", self.repository_url(), resource_name);
        Url::parse(&raw).with_context(|| format!("invalid repository resource URL `{raw}`"))
    }
}

impl fmt::Display for RemoteRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

/// Everything a live remote operation needs, built once per initialization.
pub struct RemoteSession {
    remote: RemoteRepository,
    local: LocalRepository,
    transports: TransportRegistry,
}

impl RemoteSession {
    pub fn new(
        remote: RemoteRepository,
        local: LocalRepository,
        transports: TransportRegistry,
    ) -> Self {
        Self {
            remote,
            local,
            transports,
        }
    }

    pub fn remote(&self) -> &RemoteRepository {
        &self.remote
    }

    pub fn local(&self) -> &LocalRepository {
        &self.local
    }

    pub fn transports(&self) -> &TransportRegistry {
        &self.transports
    }
}
