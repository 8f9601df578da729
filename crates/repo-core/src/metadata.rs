//! Reading and writing the `maven-metadata.xml` document that lists the
//! published versions of one artifact.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::coords::ArtifactKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MavenMetadata {
    pub versions: Vec<String>,
    pub latest: Option<String>,
    pub release: Option<String>,
    pub last_updated: Option<String>,
}

impl MavenMetadata {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut path: Vec<String> = Vec::new();
        let mut metadata = Self::default();
        loop {
            match reader
                .read_event()
                .with_context(|| format!("malformed metadata at byte {}", reader.buffer_position()))?
            {
                Event::Start(start) => {
                    path.push(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Text(text) => {
                    let value = text.unescape()?.trim().to_string();
                    if value.is_empty() {
                        continue;
                    }
                    match path_tail(&path) {
                        ["versions", "version"] => metadata.versions.push(value),
                        ["versioning", "latest"] => metadata.latest = Some(value),
                        ["versioning", "release"] => metadata.release = Some(value),
                        ["versioning", "lastUpdated"] => metadata.last_updated = Some(value),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(metadata)
    }

    /// Record a newly published version, keeping the list free of duplicates.
    pub fn add_version(&mut self, version: &str, timestamp: &str) {
        if !self.versions.iter().any(|existing| existing == version) {
            self.versions.push(version.to_string());
        }
        self.latest = Some(version.to_string());
        if !version.ends_with("-SNAPSHOT") {
            self.release = Some(version.to_string());
        }
        self.last_updated = Some(timestamp.to_string());
    }

    pub fn render(&self, key: &ArtifactKey) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata>\n");
        let _ = writeln!(out, "  <groupId>{}</groupId>", escape(key.group.as_str()));
        let _ = writeln!(
            out,
            "  <artifactId>{}</artifactId>",
            escape(key.artifact.as_str())
        );
        out.push_str("  <versioning>\n");
        if let Some(latest) = &self.latest {
            let _ = writeln!(out, "    <latest>{}</latest>", escape(latest.as_str()));
        }
        if let Some(release) = &self.release {
            let _ = writeln!(out, "    <release>{}</release>", escape(release.as_str()));
        }
        out.push_str("    <versions>\n");
        for version in &self.versions {
            let _ = writeln!(out, "      <version>{}</version>", escape(version.as_str()));
        }
        out.push_str("    </versions>\n");
        if let Some(updated) = &self.last_updated {
            let _ = writeln!(
                out,
                "    <lastUpdated>{}</lastUpdated>",
                escape(updated.as_str())
            );
        }
        out.push_str("  </versioning>\n</metadata>\n");
        out
    }
}

fn path_tail(path: &[String]) -> [&str; 2] {
    match path {
        [.., parent, leaf] => [parent.as_str(), leaf.as_str()],
        [leaf] => ["", leaf.as_str()],
        [] => ["", ""],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>org.example</groupId>
  <artifactId>api</artifactId>
  <versioning>
    <latest>2.0</latest>
    <release>2.0</release>
    <versions>
      <version>1.0</version>
      <version>not-a-version</version>
      <version>2.0</version>
    </versions>
    <lastUpdated>20240101120000</lastUpdated>
  </versioning>
</metadata>"#;

    #[test]
    fn reads_version_list() {
        let metadata = MavenMetadata::parse(SAMPLE).unwrap();
        assert_eq!(metadata.versions, vec!["1.0", "not-a-version", "2.0"]);
        assert_eq!(metadata.latest.as_deref(), Some("2.0"));
        assert_eq!(metadata.last_updated.as_deref(), Some("20240101120000"));
    }

    #[test]
    fn rendered_document_parses_back() {
        let key = ArtifactKey::new("org.example", "api");
        let mut metadata = MavenMetadata::default();
        metadata.add_version("1.0.0", "20240101000000");
        metadata.add_version("1.1.0-SNAPSHOT", "20240102000000");
        metadata.add_version("1.0.0", "20240103000000");

        let reparsed = MavenMetadata::parse(&metadata.render(&key)).unwrap();
        assert_eq!(reparsed.versions, vec!["1.0.0", "1.1.0-SNAPSHOT"]);
        assert_eq!(reparsed.release.as_deref(), Some("1.0.0"));
        assert_eq!(reparsed.latest.as_deref(), Some("1.0.0"));
    }
}
