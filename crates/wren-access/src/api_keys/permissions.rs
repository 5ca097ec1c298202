use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single API key scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "*")]
    All,
    #[serde(rename = "projects:read")]
    ProjectsRead,
    #[serde(rename = "projects:write")]
    ProjectsWrite,
    #[serde(rename = "ask:invoke")]
    AskInvoke,
    #[serde(rename = "models:read")]
    ModelsRead,
    #[serde(rename = "models:write")]
    ModelsWrite,
    #[serde(rename = "threads:read")]
    ThreadsRead,
    #[serde(rename = "threads:write")]
    ThreadsWrite,
}

impl Permission {
    pub const VARIANTS: [Permission; 8] = [
        Permission::All,
        Permission::ProjectsRead,
        Permission::ProjectsWrite,
        Permission::AskInvoke,
        Permission::ModelsRead,
        Permission::ModelsWrite,
        Permission::ThreadsRead,
        Permission::ThreadsWrite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::All => "*",
            Permission::ProjectsRead => "projects:read",
            Permission::ProjectsWrite => "projects:write",
            Permission::AskInvoke => "ask:invoke",
            Permission::ModelsRead => "models:read",
            Permission::ModelsWrite => "models:write",
            Permission::ThreadsRead => "threads:read",
            Permission::ThreadsWrite => "threads:write",
        }
    }

    /// The write scope that also grants this read scope.
    fn implied_by(self) -> Option<Permission> {
        match self {
            Permission::ProjectsRead => Some(Permission::ProjectsWrite),
            Permission::ModelsRead => Some(Permission::ModelsWrite),
            Permission::ThreadsRead => Some(Permission::ThreadsWrite),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Permission::VARIANTS
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown permission {s:?}")))
    }
}

/// Permission set attached to an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permissions(BTreeSet<Permission>);

impl Permissions {
    pub fn unrestricted() -> Self {
        Self(BTreeSet::from([Permission::All]))
    }

    pub fn new(scopes: impl IntoIterator<Item = Permission>) -> Result<Self> {
        let set: BTreeSet<Permission> = scopes.into_iter().collect();
        if set.is_empty() {
            return Err(Error::Validation("at least one permission is required".into()));
        }
        if set.contains(&Permission::All) {
            return Ok(Self::unrestricted());
        }
        Ok(Self(set))
    }

    /// Parse caller-supplied scope strings.
    pub fn parse<S: AsRef<str>>(scopes: &[S]) -> Result<Self> {
        let parsed = scopes
            .iter()
            .map(|s| s.as_ref().trim().parse())
            .collect::<Result<Vec<Permission>>>()?;
        Self::new(parsed)
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0.contains(&Permission::All)
    }

    pub fn allows(&self, required: Permission) -> bool {
        self.is_unrestricted()
            || self.0.contains(&required)
            || required.implied_by().is_some_and(|w| self.0.contains(&w))
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Stored column value. Unrestricted keys store nothing.
    pub(crate) fn to_stored(&self) -> Option<String> {
        if self.is_unrestricted() {
            return None;
        }
        let scopes: Vec<&str> = self.0.iter().map(|p| p.as_str()).collect();
        serde_json::to_string(&scopes).ok()
    }

    /// Inverse of [`Permissions::to_stored`]. Unknown scopes written by a newer
    /// release are dropped; a column that no longer parses grants nothing
    /// beyond what survives.
    pub(crate) fn from_stored(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::unrestricted();
        };
        let scopes: Vec<String> = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("unreadable api key permissions column: {e}");
                return Self(BTreeSet::new());
            }
        };
        let set = scopes
            .iter()
            .filter_map(|s| match s.parse::<Permission>() {
                Ok(p) => Some(p),
                Err(_) => {
                    warn!("ignoring unknown api key permission {s:?}");
                    None
                }
            })
            .collect::<BTreeSet<_>>();
        if set.contains(&Permission::All) {
            return Self::unrestricted();
        }
        Self(set)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::unrestricted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_everything() {
        let p = Permissions::unrestricted();
        for required in Permission::VARIANTS {
            assert!(p.allows(required));
        }
    }

    #[test]
    fn write_implies_read() {
        let p = Permissions::parse(&["projects:write", "ask:invoke"]).unwrap();
        assert!(p.allows(Permission::ProjectsRead));
        assert!(p.allows(Permission::ProjectsWrite));
        assert!(p.allows(Permission::AskInvoke));
        assert!(!p.allows(Permission::ThreadsRead));
        assert!(!p.allows(Permission::ModelsWrite));
    }

    #[test]
    fn read_does_not_imply_write() {
        let p = Permissions::parse(&["threads:read"]).unwrap();
        assert!(p.allows(Permission::ThreadsRead));
        assert!(!p.allows(Permission::ThreadsWrite));
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert!(Permissions::parse(&["projects:delete"]).is_err());
        assert!(Permissions::parse::<&str>(&[]).is_err());
    }

    #[test]
    fn stored_form() {
        assert_eq!(Permissions::unrestricted().to_stored(), None);
        assert_eq!(Permissions::from_stored(None), Permissions::unrestricted());

        let p = Permissions::parse(&["models:read", "ask:invoke"]).unwrap();
        let stored = p.to_stored().unwrap();
        assert_eq!(stored, r#"["ask:invoke","models:read"]"#);
        assert_eq!(Permissions::from_stored(Some(&stored)), p);
    }

    #[test]
    fn unknown_stored_scopes_are_dropped() {
        let p = Permissions::from_stored(Some(r#"["ask:invoke","billing:read"]"#));
        assert!(p.allows(Permission::AskInvoke));
        assert_eq!(p.iter().count(), 1);

        let broken = Permissions::from_stored(Some("not json"));
        assert!(!broken.allows(Permission::ProjectsRead));
    }
}
