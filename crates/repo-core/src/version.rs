//! Bundle versions, version ranges, and the mapping to Maven version strings.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};

/// `major.minor.micro[.qualifier]` version of a bundle.
///
/// Ordering is numeric on the three numbers and lexicographic on the
/// qualifier, with an empty qualifier sorting first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u64,
    minor: u64,
    micro: u64,
    qualifier: String,
}

impl Version {
    pub const fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Result<Self> {
        let qualifier = qualifier.into();
        if !qualifier.chars().all(is_qualifier_char) {
            bail!("invalid version qualifier `{qualifier}`");
        }
        self.qualifier = qualifier;
        Ok(self)
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn micro(&self) -> u64 {
        self.micro
    }

    pub fn qualifier(&self) -> Option<&str> {
        (!self.qualifier.is_empty()).then_some(self.qualifier.as_str())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("empty version string");
        }
        let mut parts = raw.splitn(4, '.');
        let mut numbers = [0u64; 3];
        for (slot, number) in numbers.iter_mut().enumerate() {
            match parts.next() {
                Some(part) => {
                    *number = part
                        .parse()
                        .map_err(|_| anyhow!("invalid version `{raw}` at segment {slot}"))?;
                }
                None => break,
            }
        }
        let version = Self::new(numbers[0], numbers[1], numbers[2]);
        match parts.next() {
            Some(qualifier) => version.with_qualifier(qualifier),
            None => Ok(version),
        }
    }

    /// Parse a Maven version string such as `1.2`, `1.2.3-SNAPSHOT` or
    /// `2.0.1.RELEASE`.
    pub fn parse_maven(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let mut rest = raw;
        let mut numbers = [0u64; 3];
        for (slot, number) in numbers.iter_mut().enumerate() {
            if slot > 0 {
                match rest.strip_prefix('.') {
                    Some(tail) if tail.starts_with(|c: char| c.is_ascii_digit()) => rest = tail,
                    _ => break,
                }
            }
            let digits = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if digits == 0 || digits > 9 {
                bail!("`{raw}` is not a Maven version");
            }
            *number = rest[..digits].parse()?;
            rest = &rest[digits..];
        }
        let version = Self::new(numbers[0], numbers[1], numbers[2]);
        if rest.is_empty() {
            return Ok(version);
        }
        let qualifier = rest
            .strip_prefix('-')
            .or_else(|| rest.strip_prefix('.'))
            .unwrap_or(rest);
        if qualifier.is_empty()
            || !qualifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            bail!("`{raw}` has an invalid Maven qualifier");
        }
        version.with_qualifier(qualifier.replace('.', "_"))
    }

    /// Render as a Maven version string: `major.minor.micro[-qualifier]`.
    pub fn to_maven(&self) -> String {
        match self.qualifier() {
            Some(qualifier) => format!(
                "{}.{}.{}-{}",
                self.major, self.minor, self.micro, qualifier
            ),
            None => format!("{}.{}.{}", self.major, self.minor, self.micro),
        }
    }
}

fn is_qualifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(qualifier) = self.qualifier() {
            write!(f, ".{qualifier}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bound {
    Unbounded,
    Inclusive(Version),
    Exclusive(Version),
}

/// Interval of versions with open, closed, or unbounded ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    floor: Bound,
    ceiling: Bound,
}

impl VersionRange {
    pub fn new(floor: Bound, ceiling: Bound) -> Result<Self> {
        if let (
            Bound::Inclusive(low) | Bound::Exclusive(low),
            Bound::Inclusive(high) | Bound::Exclusive(high),
        ) = (&floor, &ceiling)
        {
            if low > high {
                bail!("version range floor {low} is above ceiling {high}");
            }
        }
        Ok(Self { floor, ceiling })
    }

    /// `[0.0.0,)`: every version.
    pub fn any() -> Self {
        Self {
            floor: Bound::Inclusive(Version::default()),
            ceiling: Bound::Unbounded,
        }
    }

    pub fn floor(&self) -> &Bound {
        &self.floor
    }

    pub fn ceiling(&self) -> &Bound {
        &self.ceiling
    }

    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = match &self.floor {
            Bound::Unbounded => true,
            Bound::Inclusive(low) => version >= low,
            Bound::Exclusive(low) => version > low,
        };
        let below_ceiling = match &self.ceiling {
            Bound::Unbounded => true,
            Bound::Inclusive(high) => version <= high,
            Bound::Exclusive(high) => version < high,
        };
        above_floor && below_ceiling
    }

    /// Parse `[1.0,2.0)`, `(1,]`, `[0,)` or a bare version meaning "at least".
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let Some(open) = raw.chars().next() else {
            bail!("empty version range");
        };
        if open != '[' && open != '(' {
            return Ok(Self {
                floor: Bound::Inclusive(Version::parse(raw)?),
                ceiling: Bound::Unbounded,
            });
        }
        let close = raw
            .chars()
            .last()
            .filter(|c| matches!(c, ']' | ')'))
            .ok_or_else(|| anyhow!("version range `{raw}` is not terminated"))?;
        let body = &raw[1..raw.len() - 1];
        let Some((low, high)) = body.split_once(',') else {
            // Maven's `[1.0]` pins a single version.
            let exact = Version::parse(body)?;
            if open != '[' || close != ']' {
                bail!("single-version range `{raw}` must be closed");
            }
            return Self::new(Bound::Inclusive(exact.clone()), Bound::Inclusive(exact));
        };
        let floor = match (low.trim(), open) {
            ("", _) => Bound::Unbounded,
            (v, '[') => Bound::Inclusive(Version::parse(v)?),
            (v, _) => Bound::Exclusive(Version::parse(v)?),
        };
        let ceiling = match (high.trim(), close) {
            ("", _) => Bound::Unbounded,
            (v, ']') => Bound::Inclusive(Version::parse(v)?),
            (v, _) => Bound::Exclusive(Version::parse(v)?),
        };
        Self::new(floor, ceiling)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.floor {
            Bound::Unbounded => write!(f, "(,")?,
            Bound::Inclusive(v) => write!(f, "[{v},")?,
            Bound::Exclusive(v) => write!(f, "({v},")?,
        }
        match &self.ceiling {
            Bound::Unbounded => write!(f, ")"),
            Bound::Inclusive(v) => write!(f, "{v}]"),
            Bound::Exclusive(v) => write!(f, "{v})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osgi_versions_default_missing_segments() {
        let version = Version::parse("1.2").unwrap();
        assert_eq!(version, Version::new(1, 2, 0));
        assert_eq!(version.to_string(), "1.2.0");
        let qualified = Version::parse("1.2.3.beta-1").unwrap();
        assert_eq!(qualified.qualifier(), Some("beta-1"));
        assert!(Version::parse("1.x").is_err());
        assert!(Version::parse("1.2.3.bad.qualifier").is_err());
    }

    #[test]
    fn qualifier_sorts_after_release() {
        let release = Version::new(1, 0, 0);
        let qualified = Version::new(1, 0, 0).with_qualifier("SNAPSHOT").unwrap();
        assert!(qualified > release);
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 9));
    }

    #[test]
    fn maven_strings_map_to_versions() {
        assert_eq!(Version::parse_maven("1.0").unwrap(), Version::new(1, 0, 0));
        let snapshot = Version::parse_maven("2.1-SNAPSHOT").unwrap();
        assert_eq!(snapshot.qualifier(), Some("SNAPSHOT"));
        assert_eq!(snapshot.to_maven(), "2.1.0-SNAPSHOT");
        let release = Version::parse_maven("4.3.2.RELEASE").unwrap();
        assert_eq!(release.to_string(), "4.3.2.RELEASE");
        assert!(Version::parse_maven("not-a-version").is_err());
        assert!(Version::parse_maven("").is_err());
    }

    #[test]
    fn ranges_respect_bounds() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.includes(&Version::new(1, 0, 0)));
        assert!(range.includes(&Version::new(1, 9, 9)));
        assert!(!range.includes(&Version::new(2, 0, 0)));

        let open = VersionRange::parse("[0,)").unwrap();
        assert_eq!(open, VersionRange::any());
        assert!(open.includes(&Version::new(99, 0, 0)));

        let pinned = VersionRange::parse("[1.5]").unwrap();
        assert!(pinned.includes(&Version::new(1, 5, 0)));
        assert!(!pinned.includes(&Version::new(1, 5, 1)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(VersionRange::parse("[2.0,1.0]").is_err());
    }
}
