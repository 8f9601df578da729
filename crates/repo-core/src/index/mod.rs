//! Pre-built capability index used in preference to live remote queries.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use parking_lot::{Mutex, RwLock};
use url::Url;

use crate::cache::{INDEX_CACHE_DIR, index_cache_file, sanitize_segment, store_file};
use crate::coords::is_path_segment;
use crate::digest::{DigestAlgorithm, digest_file};
use crate::listener::{self, DownloadListener};
use crate::resource::{Resource, ResourceIdentity};
use crate::transport::TransportRegistry;
use crate::version::Version;

mod parse;

pub use parse::parse_index;

/// One resource from an index together with the document it came from.
#[derive(Debug, Clone)]
pub struct IndexedResource {
    pub identity: ResourceIdentity,
    pub resource: Resource,
    pub source: Url,
}

/// Loaded view of every configured index document.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    by_name: HashMap<String, Vec<IndexedResource>>,
}

impl IndexSnapshot {
    pub fn from_resources(resources: impl IntoIterator<Item = (Resource, Url)>) -> Self {
        let mut by_name: HashMap<String, Vec<IndexedResource>> = HashMap::new();
        for (resource, source) in resources {
            let Some(identity) = resource.identity() else {
                tracing::debug!(%resource, "index resource without identity ignored");
                continue;
            };
            by_name
                .entry(identity.symbolic_name.clone())
                .or_default()
                .push(IndexedResource {
                    identity,
                    resource,
                    source,
                });
        }
        Self { by_name }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn resources(&self, bsn: &str) -> &[IndexedResource] {
        self.by_name
            .get(bsn)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn find(&self, bsn: &str, version: &Version) -> Option<&IndexedResource> {
        self.resources(bsn)
            .iter()
            .find(|entry| &entry.identity.version == version)
    }
}

/// Read-mostly index over one or more index documents. The loaded view is an
/// `Arc` snapshot, so a concurrent [`IndexedFallback::reset`] never tears a
/// reader's view.
///
/// `generation` is bumped by every reset while holding the snapshot write
/// lock; a load only installs its result if no reset happened meanwhile.
pub struct IndexedFallback {
    locations: Vec<Url>,
    cache_dir: PathBuf,
    transports: TransportRegistry,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    generation: AtomicU64,
    loading: Mutex<()>,
}

impl IndexedFallback {
    pub fn new(locations: Vec<Url>, cache_dir: &Path, transports: TransportRegistry) -> Self {
        Self {
            locations,
            cache_dir: cache_dir.to_path_buf(),
            transports,
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
            loading: Mutex::new(()),
        }
    }

    pub fn index_locations(&self) -> &[Url] {
        &self.locations
    }

    /// Drop the loaded view; the next access reloads every index document.
    pub fn reset(&self) {
        tracing::debug!(locations = ?self.locations, "fallback index reset");
        let mut snapshot = self.snapshot.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        *snapshot = None;
    }

    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let _guard = self.loading.lock();
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let loaded = Arc::new(self.load()?);
        let mut snapshot = self.snapshot.write();
        if self.generation.load(Ordering::SeqCst) == generation {
            *snapshot = Some(Arc::clone(&loaded));
        } else {
            tracing::debug!(locations = ?self.locations, "index reset during load; not caching");
        }
        Ok(loaded)
    }

    /// Sorted symbolic names matching `pattern` (`*` and `?` wildcards).
    pub fn list(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let snapshot = self.snapshot()?;
        let mut names: Vec<String> = snapshot
            .names()
            .filter(|name| pattern.is_none_or(|pattern| glob_matches(pattern, name)))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn versions(&self, bsn: &str) -> Result<BTreeSet<Version>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .resources(bsn)
            .iter()
            .map(|entry| entry.identity.version.clone())
            .collect())
    }

    /// Download the content of `bsn`/`version` into the index cache. Every
    /// listener is notified once. Only a failure to load the index itself is
    /// an error; failed or corrupt downloads are `Ok(None)`.
    pub fn get(
        &self,
        bsn: &str,
        version: &Version,
        listeners: &[&dyn DownloadListener],
    ) -> Result<Option<PathBuf>> {
        let snapshot = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                listener::notify(listeners, None);
                return Err(err);
            }
        };
        let file = match self.fetch_content(&snapshot, bsn, version) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(%bsn, %version, error = %format!("{err:#}"), "index download failed");
                None
            }
        };
        listener::notify(listeners, file.as_ref());
        Ok(file)
    }

    fn fetch_content(
        &self,
        snapshot: &IndexSnapshot,
        bsn: &str,
        version: &Version,
    ) -> Result<Option<PathBuf>> {
        let Some(entry) = snapshot.find(bsn, version) else {
            return Ok(None);
        };
        let content = entry
            .resource
            .content()
            .ok_or_else(|| anyhow!("index entry {} has no content location", entry.resource))?;
        let url = entry
            .source
            .join(&content.url)
            .with_context(|| format!("invalid content URL `{}`", content.url))?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{bsn}-{version}.jar"));
        let bsn_dir = sanitize_segment(bsn);
        if !is_path_segment(&bsn_dir) || !is_path_segment(&file_name) {
            bail!("index entry {bsn} cannot be cached under {}", self.cache_dir.display());
        }
        let dest = self
            .cache_dir
            .join(INDEX_CACHE_DIR)
            .join(bsn_dir)
            .join(version.to_string())
            .join(file_name);

        if dest.is_file() && content_matches(&dest, content.sha256.as_deref())? {
            return Ok(Some(dest));
        }

        let Some(fetched) = self.transports.fetch(&url)? else {
            return Ok(None);
        };
        if !content_matches(fetched.path(), content.sha256.as_deref())? {
            bail!("content digest mismatch for {url}");
        }
        store_file(fetched.path(), &dest)?;
        tracing::debug!(%url, path = %dest.display(), "cached indexed artifact");
        Ok(Some(dest))
    }

    fn load(&self) -> Result<IndexSnapshot> {
        let mut resources = Vec::new();
        for location in &self.locations {
            let xml = self.read_document(location)?;
            let parsed = parse_index(&xml)
                .with_context(|| format!("failed to parse index {location}"))?;
            tracing::info!(%location, resources = parsed.len(), "loaded fallback index");
            resources.extend(parsed.into_iter().map(|resource| (resource, location.clone())));
        }
        Ok(IndexSnapshot::from_resources(resources))
    }

    /// Fetch the document, refreshing the cached copy; fall back to the cached
    /// copy when the remote cannot be read.
    fn read_document(&self, location: &Url) -> Result<String> {
        let cached = index_cache_file(&self.cache_dir, location);
        match self.transports.fetch(location) {
            Ok(Some(fetched)) => {
                store_file(fetched.path(), &cached)?;
            }
            Ok(None) if cached.is_file() => {
                tracing::warn!(%location, "index missing remotely, using cached copy");
            }
            Ok(None) => bail!("index {location} does not exist"),
            Err(err) if cached.is_file() => {
                tracing::warn!(%location, error = %format!("{err:#}"), "index download failed, using cached copy");
            }
            Err(err) => return Err(err),
        }
        fs::read_to_string(&cached)
            .with_context(|| format!("failed to read cached index {}", cached.display()))
    }
}

fn content_matches(path: &Path, expected_sha256: Option<&str>) -> Result<bool> {
    match expected_sha256 {
        Some(expected) => Ok(digest_file(path, DigestAlgorithm::Sha256)?.matches_hex(expected)),
        None => Ok(true),
    }
}

/// Match `name` against a pattern where `*` matches any run of characters and
/// `?` exactly one.
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{OnceLock, Weak};

    use super::*;
    use crate::transport::{FetchResponse, FsTransport, ProbeStatus, Transport};

    #[derive(Default)]
    struct Recorder {
        failures: Mutex<usize>,
    }

    impl DownloadListener for Recorder {
        fn success(&self, _file: &Path) {}

        fn failure(&self, _file: Option<&Path>, _reason: &str) {
            *self.failures.lock() += 1;
        }
    }

    fn write_index(dir: &Path, body: &str) -> Url {
        let path = dir.join("index.xml");
        fs::write(&path, body).unwrap();
        Url::from_file_path(path).unwrap()
    }

    fn fallback(dir: &Path, location: Url) -> IndexedFallback {
        let mut transports = TransportRegistry::default();
        transports.register(FsTransport::new());
        IndexedFallback::new(vec![location], &dir.join("cache"), transports)
    }

    fn resource_xml(bsn: &str, version: &str, url: &str, sha: Option<&str>) -> String {
        let digest = sha
            .map(|sha| format!(r#"<attribute name="osgi.content" value="{sha}"/>"#))
            .unwrap_or_default();
        format!(
            r#"<resource>
  <capability namespace="osgi.identity">
    <attribute name="osgi.identity" value="{bsn}"/>
    <attribute name="version" type="Version" value="{version}"/>
  </capability>
  <capability namespace="osgi.content">{digest}<attribute name="url" value="{url}"/></capability>
</resource>"#
        )
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_matches("*", "org.example.api"));
        assert!(glob_matches("org.*.api", "org.example.api"));
        assert!(glob_matches("org.example.ap?", "org.example.api"));
        assert!(!glob_matches("org.example", "org.example.api"));
        assert!(glob_matches("*api*", "org.example.api.spi"));
        assert!(!glob_matches("com.*", "org.example.api"));
    }

    #[test]
    fn lists_and_versions_from_index() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!(
            "<repository>{}{}{}</repository>",
            resource_xml("org.example.api", "1.0.0", "a.jar", None),
            resource_xml("org.example.api", "1.1.0", "b.jar", None),
            resource_xml("org.example.impl", "1.0.0", "c.jar", None),
        );
        let index = fallback(tmp.path(), write_index(tmp.path(), &body));

        assert_eq!(
            index.list(None).unwrap(),
            vec!["org.example.api", "org.example.impl"]
        );
        assert_eq!(index.list(Some("*.impl")).unwrap(), vec!["org.example.impl"]);
        let versions: Vec<String> = index
            .versions("org.example.api")
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(versions, vec!["1.0.0", "1.1.0"]);
        assert!(index.versions("org.unknown").unwrap().is_empty());
    }

    #[test]
    fn get_verifies_content_digest() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("good.jar"), b"good").unwrap();
        fs::write(tmp.path().join("bad.jar"), b"tampered").unwrap();
        let good_sha = crate::digest::ArtifactDigest::sha256_from_bytes(b"good").hex();
        let body = format!(
            "<repository>{}{}</repository>",
            resource_xml("org.example.good", "1.0.0", "good.jar", Some(&good_sha)),
            resource_xml("org.example.bad", "1.0.0", "bad.jar", Some(&good_sha)),
        );
        let index = fallback(tmp.path(), write_index(tmp.path(), &body));
        let version = Version::new(1, 0, 0);

        let file = index.get("org.example.good", &version, &[]).unwrap().unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"good");
        assert!(file.starts_with(tmp.path().join("cache/index/org.example.good/1.0.0")));

        let listener = Recorder::default();
        assert!(index.get("org.example.bad", &version, &[&listener]).unwrap().is_none());
        assert_eq!(*listener.failures.lock(), 1);
        assert!(!tmp.path().join("cache/index/org.example.bad/1.0.0/bad.jar").exists());
        assert!(index.get("org.example.none", &version, &[]).unwrap().is_none());
    }

    #[test]
    fn missing_content_is_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!(
            "<repository>{}</repository>",
            resource_xml("org.example.gone", "1.0.0", "gone.jar", None)
        );
        let index = fallback(tmp.path(), write_index(tmp.path(), &body));
        let listener = Recorder::default();
        let file = index
            .get("org.example.gone", &Version::new(1, 0, 0), &[&listener])
            .unwrap();
        assert!(file.is_none());
        assert_eq!(*listener.failures.lock(), 1);
    }

    #[test]
    fn unloadable_index_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let location = Url::from_file_path(tmp.path().join("absent.xml")).unwrap();
        let index = fallback(tmp.path(), location);
        let listener = Recorder::default();
        assert!(index.get("org.example.api", &Version::new(1, 0, 0), &[&listener]).is_err());
        assert_eq!(*listener.failures.lock(), 1);
    }

    #[test]
    fn reset_reloads_document() {
        let tmp = tempfile::tempdir().unwrap();
        let location = write_index(
            tmp.path(),
            &format!(
                "<repository>{}</repository>",
                resource_xml("org.example.api", "1.0.0", "a.jar", None)
            ),
        );
        let index = fallback(tmp.path(), location);
        let before = index.snapshot().unwrap();
        assert_eq!(index.list(None).unwrap().len(), 1);

        write_index(
            tmp.path(),
            &format!(
                "<repository>{}{}</repository>",
                resource_xml("org.example.api", "1.0.0", "a.jar", None),
                resource_xml("org.example.new", "1.0.0", "n.jar", None)
            ),
        );
        assert_eq!(index.list(None).unwrap().len(), 1);
        index.reset();
        assert_eq!(index.list(None).unwrap().len(), 2);
        // readers holding the old snapshot keep a consistent view
        assert_eq!(before.names().count(), 1);
    }

    /// Serves index documents in order and resets the fallback while the first
    /// one is being loaded, as a concurrent publish would.
    struct ResetDuringLoad {
        documents: Mutex<Vec<String>>,
        target: OnceLock<Weak<IndexedFallback>>,
        fetches: AtomicUsize,
    }

    impl Transport for ResetDuringLoad {
        fn scheme(&self) -> &'static str {
            "mock"
        }

        fn probe(&self, _url: &Url) -> Result<ProbeStatus> {
            Ok(ProbeStatus::Status(200))
        }

        fn fetch(&self, _url: &Url) -> Result<Option<FetchResponse>> {
            let body = {
                let mut documents = self.documents.lock();
                if documents.len() > 1 {
                    documents.remove(0)
                } else {
                    documents[0].clone()
                }
            };
            if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(fallback) = self.target.get().and_then(Weak::upgrade) {
                    fallback.reset();
                }
            }
            let mut tmp = tempfile::NamedTempFile::new()?;
            tmp.write_all(body.as_bytes())?;
            Ok(Some(FetchResponse::from_temp(tmp.into_temp_path())))
        }

        fn publish(&self, url: &Url, _source: &Path) -> Result<()> {
            bail!("read-only transport cannot publish {url}")
        }
    }

    #[test]
    fn reset_during_load_is_not_lost() {
        let tmp = tempfile::tempdir().unwrap();
        let before = format!(
            "<repository>{}</repository>",
            resource_xml("org.example.api", "1.0.0", "a.jar", None)
        );
        let after = format!(
            "<repository>{}{}</repository>",
            resource_xml("org.example.api", "1.0.0", "a.jar", None),
            resource_xml("org.example.new", "1.0.0", "n.jar", None)
        );
        let transport = Arc::new(ResetDuringLoad {
            documents: Mutex::new(vec![before, after]),
            target: OnceLock::new(),
            fetches: AtomicUsize::new(0),
        });
        let mut transports = TransportRegistry::default();
        transports.register_shared(transport.clone());
        let index = Arc::new(IndexedFallback::new(
            vec![Url::parse("mock://repo/index.xml").unwrap()],
            tmp.path(),
            transports,
        ));
        transport.target.set(Arc::downgrade(&index)).unwrap();

        assert_eq!(index.list(None).unwrap(), vec!["org.example.api"]);
        assert_eq!(
            index.list(None).unwrap(),
            vec!["org.example.api", "org.example.new"]
        );
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readers_survive_concurrent_resets() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!(
            "<repository>{}{}</repository>",
            resource_xml("org.example.api", "1.0.0", "a.jar", None),
            resource_xml("org.example.impl", "1.0.0", "b.jar", None)
        );
        let index = fallback(tmp.path(), write_index(tmp.path(), &body));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        assert_eq!(
                            index.list(None).unwrap(),
                            vec!["org.example.api", "org.example.impl"]
                        );
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..50 {
                    index.reset();
                }
            });
        });
        assert_eq!(index.versions("org.example.impl").unwrap().len(), 1);
    }
}
