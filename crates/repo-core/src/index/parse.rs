//! Parser for repository index documents.
//!
//! Two layouts are understood:
//!
//! * the R5 layout, where each `<resource>` holds
//!   `<capability namespace="...">` / `<requirement namespace="...">` elements
//!   with `<attribute>` and `<directive>` children;
//! * the legacy OBR layout, where identity and location are attributes of
//!   `<resource symbolicname=".." version=".." uri="..">` and capabilities use
//!   `<capability name="..">` with `<p n=".." v=".." t=".."/>` properties and
//!   `<require name=".." filter=".."/>` requirements.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::resource::{
    Attr, CONTENT_NAMESPACE, Capability, Clause, IDENTITY_NAMESPACE, Requirement, Resource,
    SIZE_ATTRIBUTE, URL_ATTRIBUTE, VERSION_ATTRIBUTE,
};
use crate::version::Version;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ClauseKind {
    Capability,
    Requirement,
}

#[derive(Default)]
struct ResourceBuilder {
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
}

#[derive(Default)]
struct IndexParser {
    resources: Vec<Resource>,
    resource: Option<ResourceBuilder>,
    clause: Option<(ClauseKind, Clause)>,
}

pub fn parse_index(xml: &str) -> Result<Vec<Resource>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut parser = IndexParser::default();
    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed index at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(start) => parser.open(&start)?,
            Event::Empty(start) => {
                parser.open(&start)?;
                parser.close(start.local_name().as_ref());
            }
            Event::End(end) => parser.close(end.local_name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(parser.resources)
}

impl IndexParser {
    fn open(&mut self, element: &BytesStart<'_>) -> Result<()> {
        let attrs = attributes(element)?;
        match element.local_name().as_ref() {
            b"resource" => {
                let mut builder = ResourceBuilder::default();
                legacy_resource_clauses(&attrs, &mut builder)?;
                self.resource = Some(builder);
            }
            b"capability" if self.resource.is_some() => {
                let namespace = attrs
                    .get("namespace")
                    .or_else(|| attrs.get("name"))
                    .cloned()
                    .unwrap_or_default();
                self.clause = Some((ClauseKind::Capability, Clause::new(namespace)));
            }
            b"requirement" | b"require" if self.resource.is_some() => {
                let namespace = attrs
                    .get("namespace")
                    .or_else(|| attrs.get("name"))
                    .cloned()
                    .unwrap_or_default();
                let mut clause = Clause::new(namespace);
                if let Some(filter) = attrs.get("filter") {
                    clause = clause.with_directive("filter", filter.clone());
                }
                self.clause = Some((ClauseKind::Requirement, clause));
            }
            b"attribute" | b"p" => {
                if let Some((kind, clause)) = self.clause.take() {
                    let name = attrs.get("name").or_else(|| attrs.get("n"));
                    let value = attrs.get("value").or_else(|| attrs.get("v"));
                    let clause = match (name, value) {
                        (Some(name), Some(value)) => {
                            let value_type = attrs.get("type").or_else(|| attrs.get("t"));
                            clause.with_attribute(
                                name.clone(),
                                typed_attr(value_type.map(String::as_str), value)?,
                            )
                        }
                        _ => clause,
                    };
                    self.clause = Some((kind, clause));
                }
            }
            b"directive" => {
                if let Some((kind, clause)) = self.clause.take() {
                    let clause = match (attrs.get("name"), attrs.get("value")) {
                        (Some(name), Some(value)) => {
                            clause.with_directive(name.clone(), value.clone())
                        }
                        _ => clause,
                    };
                    self.clause = Some((kind, clause));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"capability" | b"requirement" | b"require" => {
                if let (Some((kind, clause)), Some(builder)) =
                    (self.clause.take(), self.resource.as_mut())
                {
                    match kind {
                        ClauseKind::Capability => builder.capabilities.push(clause),
                        ClauseKind::Requirement => builder.requirements.push(clause),
                    }
                }
            }
            b"resource" => {
                if let Some(builder) = self.resource.take() {
                    self.resources
                        .push(Resource::new(builder.capabilities, builder.requirements));
                }
            }
            _ => {}
        }
    }
}

fn attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.context("malformed XML attribute")?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

/// Identity and content capabilities declared as attributes of a legacy
/// `<resource>` element.
fn legacy_resource_clauses(
    attrs: &HashMap<String, String>,
    builder: &mut ResourceBuilder,
) -> Result<()> {
    let Some(bsn) = attrs.get("symbolicname") else {
        return Ok(());
    };
    let version = match attrs.get("version") {
        Some(raw) => {
            Version::parse(raw).with_context(|| format!("invalid version `{raw}` for {bsn}"))?
        }
        None => Version::default(),
    };
    builder.capabilities.push(
        Capability::new(IDENTITY_NAMESPACE)
            .with_attribute(IDENTITY_NAMESPACE, Attr::String(bsn.clone()))
            .with_attribute(VERSION_ATTRIBUTE, Attr::Version(version)),
    );
    if let Some(uri) = attrs.get("uri") {
        let mut content = Capability::new(CONTENT_NAMESPACE)
            .with_attribute(URL_ATTRIBUTE, Attr::String(uri.clone()));
        if let Some(size) = attrs.get("size").and_then(|raw| raw.parse().ok()) {
            content = content.with_attribute(SIZE_ATTRIBUTE, Attr::Long(size));
        }
        builder.capabilities.push(content);
    }
    Ok(())
}

fn typed_attr(kind: Option<&str>, value: &str) -> Result<Attr> {
    let attr = match kind.map(str::to_ascii_lowercase).as_deref() {
        None | Some("string") => Attr::String(value.to_string()),
        Some("version") => Attr::Version(
            Version::parse(value).with_context(|| format!("invalid version attribute `{value}`"))?,
        ),
        Some("long") => Attr::Long(
            value
                .trim()
                .parse()
                .with_context(|| format!("invalid long attribute `{value}`"))?,
        ),
        Some("double") => Attr::Double(
            value
                .trim()
                .parse()
                .with_context(|| format!("invalid double attribute `{value}`"))?,
        ),
        Some(list) if list.starts_with("list") || list == "set" => Attr::List(
            value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        ),
        Some(other) => bail!("unsupported attribute type `{other}`"),
    };
    Ok(attr)
}
