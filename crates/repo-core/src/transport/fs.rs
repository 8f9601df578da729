use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use url::Url;

use super::{FetchResponse, ProbeStatus, Transport};
use crate::cache::copy_atomic;

/// Transport for `file://` repositories.
#[derive(Debug, Default)]
pub struct FsTransport;

impl FsTransport {
    pub fn new() -> Self {
        Self
    }

    fn parse_path(&self, url: &Url) -> Result<PathBuf> {
        url.to_file_path()
            .map_err(|_| anyhow!("file locator {url} cannot be represented as a path"))
    }
}

impl Transport for FsTransport {
    fn scheme(&self) -> &'static str {
        "file"
    }

    fn probe(&self, url: &Url) -> Result<ProbeStatus> {
        let path = self.parse_path(url)?;
        Ok(if path.exists() {
            ProbeStatus::Status(200)
        } else {
            ProbeStatus::Status(404)
        })
    }

    fn fetch(&self, url: &Url) -> Result<Option<FetchResponse>> {
        let path = self.parse_path(url)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(FetchResponse::from_path(path)))
    }

    fn publish(&self, url: &Url, source: &Path) -> Result<()> {
        let dest = self.parse_path(url)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        copy_atomic(source, &dest)
    }
}
