//! Package URL parsing.
//!
//! Parses `pkg:type/namespace/name@version?qualifiers#subpath` into its
//! components, percent-decoding each one.
//!
//! See: <https://github.com/package-url/purl-spec>

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DiscoveryError;
use crate::graph::{PackageFilter, QualifierFilter};

/// A parsed package URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentifier {
    /// Package type (ecosystem), lowercased.
    pub package_type: String,
    /// Namespace segments joined by `/`; empty when absent.
    pub namespace: String,
    /// Package name.
    pub name: String,
    /// Version; empty when absent.
    pub version: String,
    /// Qualifiers keyed by lowercased name.
    pub qualifiers: BTreeMap<String, String>,
    /// Subpath within the package; empty when absent.
    pub subpath: String,
}

impl PackageIdentifier {
    /// Graph filter selecting exactly this package.
    ///
    /// Absent components are sent as empty strings so they only match
    /// packages that also lack them.
    pub fn to_filter(&self) -> PackageFilter {
        PackageFilter {
            package_type: Some(self.package_type.clone()),
            namespace: Some(self.namespace.clone()),
            name: Some(self.name.clone()),
            version: Some(self.version.clone()),
            subpath: Some(self.subpath.clone()),
            qualifiers: self
                .qualifiers
                .iter()
                .map(|(key, value)| QualifierFilter {
                    key: key.clone(),
                    value: Some(value.clone()),
                })
                .collect(),
        }
    }
}

impl FromStr for PackageIdentifier {
    type Err = DiscoveryError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DiscoveryError::InvalidPurl {
            purl: input.to_owned(),
            reason: reason.to_owned(),
        };

        let (rest, subpath) = match input.rsplit_once('#') {
            Some((rest, sub)) => (rest, decode_segments(sub)?),
            None => (input, String::new()),
        };
        let (rest, qualifiers) = match rest.rsplit_once('?') {
            Some((rest, q)) => (rest, parse_qualifiers(q)?),
            None => (rest, BTreeMap::new()),
        };

        let (scheme, rest) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing `pkg:` scheme"))?;
        if !scheme.eq_ignore_ascii_case("pkg") {
            return Err(invalid("scheme must be `pkg`"));
        }
        let rest = rest.trim_start_matches('/');

        let (package_type, rest) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing package type"))?;
        if package_type.is_empty() {
            return Err(invalid("missing package type"));
        }

        // The version separator is only honored in the final segment.
        let last_segment = rest.rfind('/').map_or(0, |i| i + 1);
        let (rest, version) = match rest[last_segment..].rfind('@') {
            Some(at) => {
                let at = last_segment + at;
                (&rest[..at], percent_decode(&rest[at + 1..])?)
            }
            None => (rest, String::new()),
        };

        let rest = rest.trim_end_matches('/');
        let (namespace, name) = match rest.rsplit_once('/') {
            Some((ns, name)) => (decode_segments(ns)?, percent_decode(name)?),
            None => (String::new(), percent_decode(rest)?),
        };
        if name.is_empty() {
            return Err(invalid("missing package name"));
        }

        Ok(Self {
            package_type: package_type.to_ascii_lowercase(),
            namespace,
            name,
            version,
            qualifiers,
            subpath,
        })
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/", self.package_type)?;
        if !self.namespace.is_empty() {
            write!(f, "{}/", self.namespace)?;
        }
        f.write_str(&self.name)?;
        if !self.version.is_empty() {
            write!(f, "@{}", self.version)?;
        }
        let mut separator = '?';
        for (key, value) in &self.qualifiers {
            write!(f, "{separator}{key}={value}")?;
            separator = '&';
        }
        if !self.subpath.is_empty() {
            write!(f, "#{}", self.subpath)?;
        }
        Ok(())
    }
}

fn parse_qualifiers(raw: &str) -> Result<BTreeMap<String, String>, DiscoveryError> {
    let mut out = BTreeMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| DiscoveryError::InvalidPurl {
            purl: raw.to_owned(),
            reason: format!("qualifier `{pair}` has no value"),
        })?;
        let value = percent_decode(value)?;
        if !value.is_empty() {
            out.insert(key.to_ascii_lowercase(), value);
        }
    }
    Ok(out)
}

/// Decode `/`-separated segments, dropping empty, `.` and `..` ones.
fn decode_segments(raw: &str) -> Result<String, DiscoveryError> {
    let segments = raw
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(percent_decode)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(segments.join("/"))
}

fn percent_decode(raw: &str) -> Result<String, DiscoveryError> {
    let bad = |reason: &str| DiscoveryError::InvalidPurl {
        purl: raw.to_owned(),
        reason: reason.to_owned(),
    };

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| bad("truncated percent escape"))?;
            let hex = std::str::from_utf8(hex).map_err(|_| bad("invalid percent escape"))?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| bad("invalid percent escape"))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| bad("percent escapes are not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_components() {
        let purl: PackageIdentifier =
            "pkg:Maven/org.apache/commons%20io/commons-io@2.11.0?type=jar&Classifier=sources#src/main"
                .parse()
                .unwrap();
        assert_eq!(purl.package_type, "maven");
        assert_eq!(purl.namespace, "org.apache/commons io");
        assert_eq!(purl.name, "commons-io");
        assert_eq!(purl.version, "2.11.0");
        assert_eq!(purl.qualifiers["type"], "jar");
        assert_eq!(purl.qualifiers["classifier"], "sources");
        assert_eq!(purl.subpath, "src/main");
    }

    #[test]
    fn minimal_purl() {
        let purl: PackageIdentifier = "pkg:pypi/django".parse().unwrap();
        assert_eq!(purl.package_type, "pypi");
        assert!(purl.namespace.is_empty());
        assert_eq!(purl.name, "django");
        assert!(purl.version.is_empty());
        assert!(purl.qualifiers.is_empty());
    }

    #[test]
    fn npm_scope_is_decoded() {
        let purl: PackageIdentifier = "pkg:npm/%40angular/core@16.0.0".parse().unwrap();
        assert_eq!(purl.namespace, "@angular");
        assert_eq!(purl.name, "core");
        assert_eq!(purl.to_string(), "pkg:npm/@angular/core@16.0.0");
        let unencoded: PackageIdentifier = purl.to_string().parse().unwrap();
        assert_eq!(unencoded, purl);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["npm/foo", "http:npm/foo", "pkg:npm", "pkg:/foo", "pkg:npm/", "pkg:npm/a%zz"] {
            assert!(
                matches!(
                    bad.parse::<PackageIdentifier>(),
                    Err(DiscoveryError::InvalidPurl { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn empty_qualifier_values_dropped() {
        let purl: PackageIdentifier = "pkg:deb/debian/curl@7.50?arch=&distro=jessie".parse().unwrap();
        assert_eq!(purl.qualifiers.len(), 1);
        assert_eq!(purl.qualifiers["distro"], "jessie");
    }

    #[test]
    fn filter_sends_empty_strings_for_absent_parts() {
        let filter = "pkg:golang/example.com/mod?goos=linux"
            .parse::<PackageIdentifier>()
            .unwrap()
            .to_filter();
        assert_eq!(filter.package_type.as_deref(), Some("golang"));
        assert_eq!(filter.namespace.as_deref(), Some("example.com"));
        assert_eq!(filter.version.as_deref(), Some(""));
        assert_eq!(filter.qualifiers[0].key, "goos");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_then_parse_is_stable(
                ty in "[a-z]{1,8}",
                ns in proptest::option::of("[a-z0-9][a-z0-9.]{0,7}"),
                name in "[a-z0-9-]{1,12}",
                version in proptest::option::of("[0-9][0-9.]{0,6}"),
            ) {
                let id = PackageIdentifier {
                    package_type: ty,
                    namespace: ns.unwrap_or_default(),
                    name,
                    version: version.unwrap_or_default(),
                    qualifiers: BTreeMap::new(),
                    subpath: String::new(),
                };
                let reparsed: PackageIdentifier = id.to_string().parse().unwrap();
                prop_assert_eq!(reparsed, id);
            }
        }
    }
}
