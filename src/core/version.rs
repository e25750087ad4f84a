//! npm-style version ranges over the `semver` crate.
//!
//! `semver::VersionReq` follows Cargo's grammar: a bare `1.2.3` means
//! `^1.2.3`, comparators are comma separated, and there is no `||` or hyphen
//! range. npm ranges are translated into that grammar here so containment can
//! be delegated to `VersionReq::matches`.

use std::fmt;

use semver::{Comparator, Op, Version, VersionReq};

/// A parsed npm range: a union of comparator sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    /// Parse an npm range. Returns `None` if the text is not a range.
    pub fn parse(text: &str) -> Option<NpmRange> {
        let trimmed = text.trim();
        let mut alternatives = Vec::new();

        for alternative in trimmed.split("||") {
            alternatives.push(parse_comparator_set(alternative.trim())?);
        }

        Some(NpmRange {
            raw: trimmed.to_string(),
            alternatives,
        })
    }

    /// A range that accepts every release version.
    pub fn any() -> NpmRange {
        NpmRange {
            raw: "*".to_string(),
            alternatives: vec![VersionReq::STAR],
        }
    }

    /// The range as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `version` falls inside this range.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Whether some release version satisfies both ranges.
    ///
    /// Only the lowest version admitted by each comparator is tried, which is
    /// exact for the range shapes npm manifests use in practice.
    pub fn intersects(&self, other: &NpmRange) -> bool {
        let mut candidates = vec![Version::new(0, 0, 0)];
        candidates.extend(self.lower_bounds());
        candidates.extend(other.lower_bounds());
        candidates
            .iter()
            .any(|version| self.matches(version) && other.matches(version))
    }

    fn lower_bounds(&self) -> impl Iterator<Item = Version> + '_ {
        self.alternatives
            .iter()
            .flat_map(|req| req.comparators.iter())
            .filter_map(lowest_admitted)
    }
}

fn lowest_admitted(comparator: &Comparator) -> Option<Version> {
    let major = comparator.major;
    let minor = comparator.minor.unwrap_or(0);
    let patch = comparator.patch.unwrap_or(0);
    match comparator.op {
        Op::Less | Op::LessEq => None,
        Op::Greater => Some(match (comparator.minor, comparator.patch) {
            (None, _) => Version::new(major.checked_add(1)?, 0, 0),
            (Some(_), None) => Version::new(major, minor.checked_add(1)?, 0),
            (Some(_), Some(_)) => Version::new(major, minor, patch.checked_add(1)?),
        }),
        _ => Some(Version::new(major, minor, patch)),
    }
}

impl fmt::Display for NpmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a single exact version the way npm does (`v1.2.3`, `=1.2.3`).
pub fn parse_exact(text: &str) -> Option<Version> {
    let stripped = text.trim();
    let stripped = stripped.strip_prefix('=').unwrap_or(stripped).trim_start();
    let stripped = stripped.strip_prefix('v').unwrap_or(stripped);
    Version::parse(stripped).ok()
}

fn parse_comparator_set(set: &str) -> Option<VersionReq> {
    if set.is_empty() || matches!(set, "*" | "x" | "X") {
        return Some(VersionReq::STAR);
    }

    // Hyphen range: "1.0.0 - 2.0.0" means ">=1.0.0, <=2.0.0"
    if let Some((low, high)) = set.split_once(" - ") {
        let low = normalize_bound(low.trim())?;
        let high = upper_bound(high.trim())?;
        return VersionReq::parse(&format!(">={}, {}", low, high)).ok();
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in set.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~')) {
            // Operator separated from its version: ">= 1.0.0"
            pending_op = Some(token);
            continue;
        }

        let comparator = match pending_op.take() {
            Some(op) => format!("{}{}", op, token),
            None => token.to_string(),
        };
        comparators.push(translate_comparator(&comparator)?);
    }

    if pending_op.is_some() || comparators.is_empty() {
        return None;
    }

    VersionReq::parse(&comparators.join(", ")).ok()
}

/// Translate one npm comparator into Cargo's grammar.
fn translate_comparator(comparator: &str) -> Option<String> {
    let op_len = comparator
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '^' | '~'))
        .unwrap_or(comparator.len());
    let (op, rest) = comparator.split_at(op_len);
    let rest = rest.strip_prefix('v').unwrap_or(rest);

    if rest.is_empty() {
        return None;
    }

    match op {
        // npm: a bare full version is exact, a bare partial one is an x-range
        "" | "=" => {
            if Version::parse(rest).is_ok() {
                Some(format!("={}", rest))
            } else {
                Some(x_range(rest)?)
            }
        }
        "^" | "~" | ">" | ">=" | "<" | "<=" => {
            validate_partial(rest)?;
            Some(format!("{}{}", op, rest))
        }
        _ => None,
    }
}

/// `1.2` → `1.2.*`, `1.x` → `1.*`, `*` → `*`.
fn x_range(partial: &str) -> Option<String> {
    let parts: Vec<&str> = partial.split('.').collect();
    if parts.len() > 3 {
        return None;
    }

    let mut out = Vec::new();
    for part in &parts {
        if matches!(*part, "*" | "x" | "X") {
            break;
        }
        part.parse::<u64>().ok()?;
        out.push(*part);
    }

    if out.is_empty() {
        return Some("*".to_string());
    }
    if out.len() == 3 {
        return Some(format!("={}", out.join(".")));
    }
    Some(format!("{}.*", out.join(".")))
}

fn validate_partial(partial: &str) -> Option<()> {
    if Version::parse(partial).is_ok() {
        return Some(());
    }
    let parts: Vec<&str> = partial.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    for part in parts {
        if !matches!(part, "*" | "x" | "X") {
            part.parse::<u64>().ok()?;
        }
    }
    Some(())
}

/// Hyphen-range bounds may be partial (`1.2 - 2`); pad them with zeros.
fn normalize_bound(bound: &str) -> Option<String> {
    let bound = bound.strip_prefix('v').unwrap_or(bound);
    if Version::parse(bound).is_ok() {
        return Some(bound.to_string());
    }
    let parts: Vec<u64> = bound
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [major] => Some(format!("{}.0.0", major)),
        [major, minor] => Some(format!("{}.{}.0", major, minor)),
        _ => None,
    }
}

/// A partial upper bound covers everything it names: `2` is `<3.0.0` and
/// `2.3` is `<2.4.0`. A full version is inclusive.
fn upper_bound(bound: &str) -> Option<String> {
    let bound = bound.strip_prefix('v').unwrap_or(bound);
    if Version::parse(bound).is_ok() {
        return Some(format!("<={}", bound));
    }
    let parts: Vec<u64> = bound
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [major] => Some(format!("<{}.0.0", major.checked_add(1)?)),
        [major, minor] => Some(format!("<{}.{}.0", major, minor.checked_add(1)?)),
        _ => None,
    }
}
