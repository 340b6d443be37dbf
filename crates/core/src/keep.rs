//! Keep rules: patterns marking types and members that no pass may rename.
//!
//! Patterns are written in dotted form (`com.example.Api`); internal names are
//! normalized before matching.
//!
//! | pattern        | keeps                                                  |
//! |----------------|--------------------------------------------------------|
//! | `a.b.C`        | `a.b.C` and everything nested under `a.b.C.`           |
//! | `a.b.*`        | types directly or transitively under package `a.b`     |
//! | `a.b.**`       | same as `a.b.*`, plus the name `a.b` itself            |
//! | `*`            | everything                                             |
//! | `a.b.C.member` | that member of `a.b.C` (type itself stays renamable)   |

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Namespaces that belong to the platform runtime and are never part of a program.
const PLATFORM_PREFIXES: [&str; 5] = ["java/", "javax/", "sun/", "com/sun/", "jdk/"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeepRule {
    Exact(String),
    Package(String),
    PackageTree(String),
    All,
}

impl KeepRule {
    /// Whether a dotted type name matches.
    fn matches(&self, dotted: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(rule) => dotted == rule || nested_under(dotted, rule),
            Self::Package(prefix) => nested_under(dotted, prefix),
            Self::PackageTree(prefix) => dotted == prefix || nested_under(dotted, prefix),
        }
    }

    /// Whether a dotted `owner.member` name is kept by an exact rule.
    fn matches_member(&self, dotted_member: &str) -> bool {
        matches!(self, Self::Exact(rule) if rule == dotted_member)
    }
}

fn nested_under(name: &str, prefix: &str) -> bool {
    name.len() > prefix.len() && name.starts_with(prefix) && name.as_bytes()[prefix.len()] == b'.'
}

impl FromStr for KeepRule {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().replace('/', ".");
        Ok(if s == "*" || s == "**" {
            Self::All
        } else if let Some(prefix) = s.strip_suffix(".**") {
            Self::PackageTree(prefix.to_string())
        } else if let Some(prefix) = s.strip_suffix(".*") {
            Self::Package(prefix.to_string())
        } else {
            Self::Exact(s)
        })
    }
}

impl std::fmt::Display for KeepRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(s) => f.write_str(s),
            Self::Package(p) => write!(f, "{p}.*"),
            Self::PackageTree(p) => write!(f, "{p}.**"),
            Self::All => f.write_str("*"),
        }
    }
}

/// The set of keep rules for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepRules {
    rules: Vec<KeepRule>,
}

impl KeepRules {
    pub fn new(rules: Vec<KeepRule>) -> Self {
        Self { rules }
    }

    /// Parses a comma-separated pattern list. Blank items are skipped.
    pub fn parse_list(list: &str) -> Self {
        let rules = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[KeepRule] {
        &self.rules
    }

    /// Whether the type with this internal name must keep its name.
    pub fn keeps_type(&self, internal_name: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let dotted = internal_name.replace('/', ".");
        self.rules.iter().any(|r| r.matches(&dotted))
    }

    /// Whether a member must keep its name: its owner is kept, or the member is named exactly.
    pub fn keeps_member(&self, owner: &str, member: &str) -> bool {
        if self.keeps_type(owner) {
            return true;
        }
        let full = format!("{}.{member}", owner.replace('/', "."));
        self.rules.iter().any(|r| r.matches_member(&full))
    }
}

/// Whether the name belongs to the platform runtime (or is an array type).
pub fn is_platform_type(internal_name: &str) -> bool {
    internal_name.starts_with('[')
        || PLATFORM_PREFIXES
            .iter()
            .any(|p| internal_name.starts_with(p))
}
