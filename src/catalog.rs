use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Reference table of service name -> current version, keyed by lowercase name.
///
/// Read-only once built; shared by reference with the report builder.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ServiceCatalog {
    entries: BTreeMap<String, String>,
}

impl ServiceCatalog {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }

    pub fn current_version(&self, service: &str) -> Option<&str> {
        self.entries
            .get(&service.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The current version when `found` is older than it, otherwise `None`.
    pub fn outdated(&self, service: &str, found: &str) -> Option<&str> {
        self.current_version(service)
            .filter(|current| compare_versions(found, current) == Ordering::Less)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new([("http", "2.4.52"), ("ssh", "8.6"), ("ftp", "7.68")])
    }
}

/// Parse catalog file content.
///
/// Supported formats per line:
/// - `name version`
/// - `name = version`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
///
/// Names are case-insensitive; a later line overrides an earlier one.
pub fn parse_catalog_str(s: &str) -> Result<ServiceCatalog> {
    let mut entries = Vec::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        let (name, version) = match line.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim()),
            None => match line.split_once(char::is_whitespace) {
                Some((n, v)) => (n.trim(), v.trim()),
                None => bail!("line {line_no}: expected `name version`, got: {line}"),
            },
        };
        if name.is_empty() || version.is_empty() || version.contains(char::is_whitespace) {
            bail!("line {line_no}: invalid catalog entry: {line}");
        }
        entries.push((name.to_string(), version.to_string()));
    }

    Ok(ServiceCatalog::new(entries))
}

/// Load a catalog from a file path. Errors if the file cannot be read or parsed.
pub fn load_catalog_from_path(path: impl AsRef<Path>) -> Result<ServiceCatalog> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read catalog file: {}", path.as_ref().display()))?;
    parse_catalog_str(&content)
        .with_context(|| format!("failed to parse catalog file: {}", path.as_ref().display()))
}

/// Load a catalog from a file, or fall back to the built-in table if missing, empty or invalid.
pub fn load_catalog_or_default(path: impl AsRef<Path>) -> ServiceCatalog {
    match load_catalog_from_path(&path) {
        Ok(c) if !c.is_empty() => c,
        Ok(_) => ServiceCatalog::default(),
        Err(e) => {
            warn!("{e:#}; using built-in service catalog");
            ServiceCatalog::default()
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Num(u64),
    Text(&'a str),
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = version;
    while let Some(start) = rest.find(|c: char| c.is_ascii_alphanumeric()) {
        rest = &rest[start..];
        let digits = rest.starts_with(|c: char| c.is_ascii_digit());
        let end = rest
            .find(|c: char| {
                if digits {
                    !c.is_ascii_digit()
                } else {
                    !c.is_ascii_alphabetic()
                }
            })
            .unwrap_or(rest.len());
        let run = &rest[..end];
        out.push(if digits {
            // Overlong digit runs saturate rather than fail.
            Segment::Num(run.parse().unwrap_or(u64::MAX))
        } else {
            Segment::Text(run)
        });
        rest = &rest[end..];
    }
    out
}

/// Compare two version strings segment by segment.
///
/// Digit runs compare numerically and letter runs case-insensitively; a number
/// outranks letters. A missing segment counts as `0` against a number and
/// outranks letters, so `2.4` == `2.4.0` and `1.0` > `1.0rc1`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let ord = match (left.get(i), right.get(i)) {
            (Some(Segment::Num(x)), Some(Segment::Num(y))) => x.cmp(y),
            (Some(Segment::Text(x)), Some(Segment::Text(y))) => {
                x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase())
            }
            (Some(Segment::Num(_)), Some(Segment::Text(_))) => Ordering::Greater,
            (Some(Segment::Text(_)), Some(Segment::Num(_))) => Ordering::Less,
            (Some(Segment::Num(x)), None) => x.cmp(&0u64),
            (None, Some(Segment::Num(y))) => 0u64.cmp(y),
            (Some(Segment::Text(_)), None) => Ordering::Less,
            (None, Some(Segment::Text(_))) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
