use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml_bw as serde_yaml;
use url::Url;

use crate::error::{RepoError, Result};
use crate::transport::Credentials;

pub const DEFAULT_NAME: &str = "AetherRepository";

pub const NAME_KEY: &str = "name";
pub const URL_KEY: &str = "url";
pub const INDEX_URL_KEY: &str = "indexUrl";
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const CACHE_KEY: &str = "cache";

const INDEX_SUFFIX: &str = "-obr/.meta/obr.xml";

/// Validated repository configuration.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub name: String,
    /// Main repository location without a trailing slash.
    pub location: String,
    pub url: Url,
    pub index_url: Url,
    pub credentials: Option<Credentials>,
    pub cache_dir: PathBuf,
}

/// On-disk YAML form; keys mirror the property names.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    name: Option<String>,
    url: Option<String>,
    #[serde(rename = "indexUrl", alias = "index_url")]
    index_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    cache: Option<String>,
}

impl ConfigFile {
    fn into_properties(self) -> BTreeMap<String, String> {
        [
            (NAME_KEY, self.name),
            (URL_KEY, self.url),
            (INDEX_URL_KEY, self.index_url),
            (USERNAME_KEY, self.username),
            (PASSWORD_KEY, self.password),
            (CACHE_KEY, self.cache),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect()
    }
}

impl RepoConfig {
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self> {
        let name = properties
            .get(NAME_KEY)
            .cloned()
            .unwrap_or_else(|| DEFAULT_NAME.to_string());

        let raw_url = properties
            .get(URL_KEY)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| RepoError::config("the `url` property must be set"))?;
        let location = raw_url.trim_end_matches('/').to_string();
        let url = Url::parse(&location)
            .map_err(|err| RepoError::config(format!("invalid repository URI `{raw_url}`: {err}")))?;

        let index_url = match properties.get(INDEX_URL_KEY).map(|value| value.trim()) {
            Some(raw) if !raw.is_empty() => Url::parse(raw)
                .map_err(|err| RepoError::config(format!("invalid index URI `{raw}`: {err}")))?,
            _ => default_index_url(&url)?,
        };

        let credentials = properties
            .get(USERNAME_KEY)
            .map(|username| Credentials {
                username: username.clone(),
                password: properties.get(PASSWORD_KEY).cloned().unwrap_or_default(),
            });

        let cache_dir = match properties.get(CACHE_KEY) {
            Some(raw) => {
                let path = PathBuf::from(raw);
                if !path.is_dir() {
                    return Err(RepoError::config(format!(
                        "cache location `{raw}` is not an existing directory"
                    )));
                }
                path
            }
            None => default_cache_dir()?,
        };

        Ok(Self {
            name,
            location,
            url,
            index_url,
            credentials,
            cache_dir,
        })
    }

    /// Read a YAML mapping of the property keys.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let file: ConfigFile = serde_yaml::from_str(&content).map_err(|err| {
            RepoError::config(format!("failed to parse {}: {err}", path.display()))
        })?;
        Self::from_properties(&file.into_properties())
    }

    /// Build a [`RepoConfig`] from the documented REPO_* variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let properties = [
            (NAME_KEY, "REPO_NAME"),
            (URL_KEY, "REPO_URL"),
            (INDEX_URL_KEY, "REPO_INDEX_URL"),
            (USERNAME_KEY, "REPO_USERNAME"),
            (PASSWORD_KEY, "REPO_PASSWORD"),
            (CACHE_KEY, "REPO_CACHE_DIR"),
        ]
        .into_iter()
        .filter_map(|(key, var)| lookup(var).map(|value| (key.to_string(), value)))
        .collect();
        Self::from_properties(&properties)
    }
}

/// `<scheme>://<host>[:port]<path>-obr/.meta/obr.xml` next to the main
/// repository.
pub fn default_index_url(url: &Url) -> Result<Url> {
    let mut index = url.clone();
    let path = url.path().trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };
    index.set_path(&format!("{path}{INDEX_SUFFIX}"));
    index.set_query(None);
    index.set_fragment(None);
    if index.cannot_be_a_base() {
        return Err(RepoError::config(format!(
            "cannot derive an index location from `{url}`"
        )));
    }
    Ok(index)
}

fn default_cache_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".bnd").join("cache"))
        .ok_or_else(|| RepoError::config("home directory is unknown; set the `cache` property"))
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
    fn derives_defaults() {
        let cache = tempfile::tempdir().unwrap();
        let cache_path = cache.path().to_string_lossy().into_owned();
        let config = RepoConfig::from_properties(&props(&[
            ("url", "https://repo.example.com:8443/releases/"),
            ("cache", &cache_path),
        ]))
        .unwrap();

        assert_eq!(config.name, DEFAULT_NAME);
        assert_eq!(config.location, "https://repo.example.com:8443/releases");
        assert_eq!(
            config.index_url.as_str(),
            "https://repo.example.com:8443/releases-obr/.meta/obr.xml"
        );
        assert!(config.credentials.is_none());
        assert_eq!(config.cache_dir, cache.path());
    }

    #[test]
    fn password_defaults_to_empty() {
        let cache = tempfile::tempdir().unwrap();
        let cache_path = cache.path().to_string_lossy().into_owned();
        let config = RepoConfig::from_properties(&props(&[
            ("url", "https://repo.example.com/releases"),
            ("username", "deployer"),
            ("cache", &cache_path),
        ]))
        .unwrap();
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.username, "deployer");
        assert_eq!(credentials.password, "");
    }

    #[test]
    fn empty_username_still_authenticates() {
        let cache = tempfile::tempdir().unwrap();
        let cache_path = cache.path().to_string_lossy().into_owned();
        let config = RepoConfig::from_properties(&props(&[
            ("url", "https://repo.example.com/releases"),
            ("username", ""),
            ("password", "token"),
            ("cache", &cache_path),
        ]))
        .unwrap();
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.username, "");
        assert_eq!(credentials.password, "token");
    }

    #[test]
    fn rejects_invalid_properties() {
        assert!(matches!(
            RepoConfig::from_properties(&props(&[])),
            Err(RepoError::Config(_))
        ));
        assert!(matches!(
            RepoConfig::from_properties(&props(&[("url", "not a uri")])),
            Err(RepoError::Config(_))
        ));
        assert!(matches!(
            RepoConfig::from_properties(&props(&[
                ("url", "https://repo.example.com"),
                ("cache", "/definitely/not/a/dir")
            ])),
            Err(RepoError::Config(_))
        ));
    }

    #[test]
    fn root_url_index_location() {
        let url = Url::parse("http://localhost:8081").unwrap();
        assert_eq!(
            default_index_url(&url).unwrap().as_str(),
            "http://localhost:8081/-obr/.meta/obr.xml"
        );
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.yaml");
        fs::write(
            &path,
            format!(
                "name: releases\nurl: https://repo.example.com/releases\nindexUrl: https://repo.example.com/index.xml\ncache: {}\n",
                dir.path().display()
            ),
        )
        .unwrap();
        let config = RepoConfig::load_from_path(&path).unwrap();
        assert_eq!(config.name, "releases");
        assert_eq!(config.index_url.as_str(), "https://repo.example.com/index.xml");
    }

    #[test]
    fn reads_env_style_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().to_string_lossy().into_owned();
        let config = RepoConfig::from_lookup(|key| match key {
            "REPO_URL" => Some("file:///srv/repo/".to_string()),
            "REPO_CACHE_DIR" => Some(cache.clone()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.location, "file:///srv/repo");
        assert_eq!(
            config.index_url.as_str(),
            "file:///srv/repo-obr/.meta/obr.xml"
        );
    }
}
