//! Minimal reader for the identity headers of a bundle jar.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use zip::ZipArchive;

use crate::coords::Coordinates;
use crate::version::Version;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Identity headers read from `META-INF/MANIFEST.MF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub symbolic_name: String,
    pub version: Version,
    pub maven_group: Option<String>,
}

impl BundleInfo {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open bundle {}", path.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("{} is not a jar archive", path.display()))?;
        let mut manifest = String::new();
        archive
            .by_name(MANIFEST_PATH)
            .with_context(|| format!("{} has no {MANIFEST_PATH}", path.display()))?
            .read_to_string(&mut manifest)
            .context("manifest is not valid UTF-8")?;
        Self::from_manifest(&manifest)
    }

    pub fn from_manifest(manifest: &str) -> Result<Self> {
        let headers = parse_main_section(manifest);
        let symbolic_name = headers
            .get("Bundle-SymbolicName")
            .and_then(|raw| raw.split(';').next())
            .map(str::trim)
            .filter(|bsn| !bsn.is_empty())
            .ok_or_else(|| anyhow!("manifest has no Bundle-SymbolicName"))?
            .to_string();
        let version = match headers.get("Bundle-Version") {
            Some(raw) => Version::parse(raw)
                .with_context(|| format!("invalid Bundle-Version `{raw}`"))?,
            None => Version::default(),
        };
        Ok(Self {
            symbolic_name,
            version,
            maven_group: headers.get("Maven-GroupId").cloned(),
        })
    }

    pub fn coordinates(&self) -> Result<Coordinates> {
        Coordinates::for_bundle(
            &self.symbolic_name,
            &self.version,
            self.maven_group.as_deref(),
        )
    }
}

/// Parse the main section of a jar manifest, joining 72-column continuation
/// lines (lines starting with a single space).
fn parse_main_section(manifest: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let mut current: Option<(String, String)> = None;
    for line in manifest.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            headers.insert(name, value);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_string(), value.trim_start().to_string()));
        }
    }
    if let Some((name, value)) = current {
        headers.insert(name, value);
    }
    headers
}
