//! Capabilities and requirements declared by a resource, partitioned by
//! namespace.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::version::Version;

pub const IDENTITY_NAMESPACE: &str = "osgi.identity";
pub const CONTENT_NAMESPACE: &str = "osgi.content";
pub const VERSION_ATTRIBUTE: &str = "version";
pub const URL_ATTRIBUTE: &str = "url";
pub const SIZE_ATTRIBUTE: &str = "size";

/// Typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    String(String),
    Long(i64),
    Double(f64),
    Version(Version),
    List(Vec<String>),
}

impl Attr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<Version> {
        match self {
            Self::Version(version) => Some(version.clone()),
            Self::String(raw) => Version::parse(raw).ok(),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(value) => Some(*value),
            Self::String(raw) => raw.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Long(value) => write!(f, "{value}"),
            Self::Double(value) => write!(f, "{value}"),
            Self::Version(value) => write!(f, "{value}"),
            Self::List(values) => write!(f, "[{}]", values.join(",")),
        }
    }
}

/// Namespace-tagged attributes and directives; shared shape of capabilities
/// and requirements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clause {
    namespace: String,
    attributes: BTreeMap<String, Attr>,
    directives: BTreeMap<String, String>,
}

impl Clause {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Attr) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_directive(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(key.into(), value.into());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn attributes(&self) -> &BTreeMap<String, Attr> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Attr> {
        self.attributes.get(key)
    }

    pub fn directives(&self) -> &BTreeMap<String, String> {
        &self.directives
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace)?;
        for (key, value) in &self.attributes {
            write!(f, ";{key}={value}")?;
        }
        for (key, value) in &self.directives {
            write!(f, ";{key}:={value}")?;
        }
        Ok(())
    }
}

pub type Capability = Clause;
pub type Requirement = Clause;

/// Identity declared by a resource's `osgi.identity` capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub symbolic_name: String,
    pub version: Version,
}

/// Location and digest declared by a resource's `osgi.content` capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceContent {
    pub url: String,
    pub sha256: Option<String>,
    pub size: Option<u64>,
}

/// Immutable resource description with namespace lookup.
///
/// The partition maps are built once in [`Resource::new`]; an unknown
/// namespace yields an empty slice.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    capabilities_by_ns: HashMap<String, Vec<Capability>>,
    requirements_by_ns: HashMap<String, Vec<Requirement>>,
}

impl Resource {
    pub fn new(capabilities: Vec<Capability>, requirements: Vec<Requirement>) -> Self {
        Self {
            capabilities_by_ns: partition(&capabilities),
            requirements_by_ns: partition(&requirements),
            capabilities,
            requirements,
        }
    }

    pub fn capabilities(&self, namespace: Option<&str>) -> &[Capability] {
        match namespace {
            None => &self.capabilities,
            Some(ns) => self
                .capabilities_by_ns
                .get(ns)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }

    pub fn requirements(&self, namespace: Option<&str>) -> &[Requirement] {
        match namespace {
            None => &self.requirements,
            Some(ns) => self
                .requirements_by_ns
                .get(ns)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }

    /// Namespaces that carry at least one capability.
    pub fn capability_namespaces(&self) -> impl Iterator<Item = &str> {
        self.capabilities_by_ns.keys().map(String::as_str)
    }

    pub fn identity(&self) -> Option<ResourceIdentity> {
        let [capability] = self.capabilities(Some(IDENTITY_NAMESPACE)) else {
            return None;
        };
        let symbolic_name = capability.attribute(IDENTITY_NAMESPACE)?.as_str()?.to_string();
        let version = capability
            .attribute(VERSION_ATTRIBUTE)
            .and_then(Attr::as_version)
            .unwrap_or_default();
        Some(ResourceIdentity {
            symbolic_name,
            version,
        })
    }

    pub fn content(&self) -> Option<ResourceContent> {
        let capability = self.capabilities(Some(CONTENT_NAMESPACE)).first()?;
        let url = capability.attribute(URL_ATTRIBUTE)?.as_str()?.to_string();
        Some(ResourceContent {
            url,
            sha256: capability
                .attribute(CONTENT_NAMESPACE)
                .and_then(Attr::as_str)
                .map(str::to_ascii_lowercase),
            size: capability
                .attribute(SIZE_ATTRIBUTE)
                .and_then(Attr::as_long)
                .and_then(|size| u64::try_from(size).ok()),
        })
    }
}

fn partition(clauses: &[Clause]) -> HashMap<String, Vec<Clause>> {
    let mut map: HashMap<String, Vec<Clause>> = HashMap::new();
    for clause in clauses {
        map.entry(clause.namespace.clone())
            .or_default()
            .push(clause.clone());
    }
    map
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [identity] = self.capabilities(Some(IDENTITY_NAMESPACE)) {
            let id = identity.attribute(IDENTITY_NAMESPACE);
            let version = identity.attribute(VERSION_ATTRIBUTE);
            return write!(
                f,
                "{} version={}",
                display_or_null(id),
                display_or_null(version)
            );
        }
        write!(f, "Resource [caps=[")?;
        write_joined(f, &self.capabilities)?;
        write!(f, "], reqs=[")?;
        write_joined(f, &self.requirements)?;
        write!(f, "]]")
    }
}

fn display_or_null(attr: Option<&Attr>) -> String {
    attr.map(ToString::to_string)
        .unwrap_or_else(|| "null".to_string())
}

fn write_joined(f: &mut fmt::Formatter<'_>, clauses: &[Clause]) -> fmt::Result {
    for (idx, clause) in clauses.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{clause}")?;
    }
    Ok(())
}
