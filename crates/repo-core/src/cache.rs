use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use url::Url;

use crate::coords::{ArtifactKey, Coordinates};

pub const LOCAL_REPO_DIR: &str = "aether-local";
pub const INDEX_CACHE_DIR: &str = "index";

/// Maven-layout local repository rooted at `<cache>/aether-local`.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn open(cache_dir: &Path) -> Result<Self> {
        let root = cache_dir.join(LOCAL_REPO_DIR);
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create local repository {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, coords: &Coordinates) -> Result<PathBuf> {
        coords.validate()?;
        self.contained(&coords.path())
    }

    pub fn metadata_path(&self, key: &ArtifactKey) -> Result<PathBuf> {
        key.validate()?;
        self.contained(&key.metadata_path())
    }

    /// Join `relative` below the root, refusing anything that would leave it.
    fn contained(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            bail!(
                "{} escapes the local repository {}",
                relative.display(),
                self.root.display()
            );
        }
        Ok(self.root.join(relative))
    }

    /// Place `source` at the cache location for `coords`; the last writer wins
    /// when two downloads of the same artifact race.
    pub fn store(&self, coords: &Coordinates, source: &Path) -> Result<PathBuf> {
        let dest = self.path_for(coords)?;
        store_file(source, &dest)?;
        Ok(dest)
    }
}

/// Cache location of an index document downloaded from `source`.
pub fn index_cache_file(cache_dir: &Path, source: &Url) -> PathBuf {
    cache_dir
        .join(INDEX_CACHE_DIR)
        .join(sanitize_segment(source.as_str()))
}

pub fn store_file(source: &Path, dest: &Path) -> Result<()> {
    if same_path(source, dest) {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create cache dir {}", parent.display()))?;
    }
    copy_atomic(source, dest)
}

pub(crate) fn copy_atomic(source: &Path, dest: &Path) -> Result<()> {
    let tmp = dest.with_extension(format!(
        "tmp-{}-{}",
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_nanos())
            .unwrap_or(0)
    ));
    fs::copy(source, &tmp)
        .with_context(|| format!("failed to copy {} -> {}", source.display(), dest.display()))?;
    fs::rename(&tmp, dest)
        .with_context(|| format!("failed to place cached file at {}", dest.display()))?;
    Ok(())
}

fn same_path(a: &Path, b: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (a.canonicalize(), b.canonicalize()) {
        a == b
    } else {
        a == b
    }
}

pub(crate) fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '?' | '*' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}
