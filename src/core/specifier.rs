//! Dependency specifier classification.
//!
//! Turns the raw `(name, versionText)` pairs found in a `package.json` into
//! typed specifiers. Classification never fails: anything the package
//! manager accepts but we do not understand is [`SpecifierKind::Other`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

use crate::core::version::{parse_exact, NpmRange};

/// Prefix marking a dependency on a sibling workspace project.
pub const WORKSPACE_PREFIX: &str = "workspace:";

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9._-]*$").expect("valid tag pattern"));

/// The shape of a dependency specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecifierKind {
    /// `1.2.3`
    ExactVersion,
    /// `^1.2.0`, `>=1 <2`, `1.x`
    Range,
    /// `latest`, `next`
    Tag,
    /// `workspace:^1.0.0`
    LocalWorkspaceReference,
    /// `file:`, `git+https:`, `npm:` aliases, and anything else
    Other,
}

impl fmt::Display for SpecifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpecifierKind::ExactVersion => "version",
            SpecifierKind::Range => "range",
            SpecifierKind::Tag => "tag",
            SpecifierKind::LocalWorkspaceReference => "workspace",
            SpecifierKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A classified dependency specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpecifier {
    name: String,
    text: String,
    kind: SpecifierKind,
    /// The version for `ExactVersion`.
    version: Option<Version>,
    /// The range for `Range` and `LocalWorkspaceReference`.
    range: Option<NpmRange>,
    /// The sibling named by an aliased reference (`workspace:foo@*`).
    alias_target: Option<String>,
}

impl DependencySpecifier {
    /// Classify a dependency.
    pub fn parse(name: &str, text: &str) -> DependencySpecifier {
        let mut spec = DependencySpecifier {
            name: name.to_string(),
            text: text.to_string(),
            kind: SpecifierKind::Other,
            version: None,
            range: None,
            alias_target: None,
        };

        if let Some(embedded) = text.strip_prefix(WORKSPACE_PREFIX) {
            let (target, embedded) = split_alias(embedded.trim());
            spec.kind = SpecifierKind::LocalWorkspaceReference;
            spec.alias_target = target.map(str::to_string);
            spec.range = Some(match embedded {
                // `workspace:^` and `workspace:~` pin to whatever the sibling
                // currently is
                "" | "^" | "~" => NpmRange::any(),
                other => NpmRange::parse(other).unwrap_or_else(NpmRange::any),
            });
        } else if let Some(version) = parse_exact(text) {
            spec.kind = SpecifierKind::ExactVersion;
            spec.version = Some(version);
        } else if let Some(range) = NpmRange::parse(text) {
            spec.kind = SpecifierKind::Range;
            spec.range = Some(range);
        } else if TAG_PATTERN.is_match(text.trim()) {
            spec.kind = SpecifierKind::Tag;
        }

        spec
    }

    /// The dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The project a `workspace:` reference points at. Differs from
    /// [`name`](Self::name) only for aliases.
    pub fn target_name(&self) -> &str {
        self.alias_target.as_deref().unwrap_or(&self.name)
    }

    /// The version text as written in the manifest.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The classification.
    pub fn kind(&self) -> SpecifierKind {
        self.kind
    }

    /// The exact version, for `ExactVersion` specifiers.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// The range, for `Range` and `LocalWorkspaceReference` specifiers.
    pub fn range(&self) -> Option<&NpmRange> {
        self.range.as_ref()
    }

    /// Whether this specifier accepts `version`.
    ///
    /// Tags and other specifiers cannot be checked locally and accept nothing.
    pub fn allows(&self, version: &Version) -> bool {
        match self.kind {
            SpecifierKind::ExactVersion => self.version.as_ref() == Some(version),
            SpecifierKind::Range | SpecifierKind::LocalWorkspaceReference => self
                .range
                .as_ref()
                .is_some_and(|range| range.matches(version)),
            SpecifierKind::Tag | SpecifierKind::Other => false,
        }
    }

    /// The `workspace:` specifier this dependency should be rewritten to.
    ///
    /// A declared range is kept verbatim; an exact pin against a sibling
    /// means "whatever the sibling currently is" and becomes `workspace:*`.
    pub fn to_workspace_reference(&self) -> String {
        match self.kind {
            SpecifierKind::Range => format!("{}{}", WORKSPACE_PREFIX, self.text.trim()),
            SpecifierKind::LocalWorkspaceReference => self.text.clone(),
            _ => format!("{}*", WORKSPACE_PREFIX),
        }
    }
}

/// `foo@^1.0.0` → (`foo`, `^1.0.0`). A leading `@` belongs to a scope.
fn split_alias(embedded: &str) -> (Option<&str>, &str) {
    match embedded.char_indices().skip(1).find(|&(_, c)| c == '@') {
        Some((at, _)) => (Some(&embedded[..at]), &embedded[at + 1..]),
        None => (None, embedded),
    }
}

impl fmt::Display for DependencySpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.text)
    }
}
