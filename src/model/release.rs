use anyhow::{Result, anyhow};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::{InstallKind, ObjectId};

/// Dotted-integer release version, ordered component by component
/// (`1.0 < 1.0.1 < 1.1 < 2.0`, `2.4.2 < 2.4.10`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Vec<u32>);

impl Version {
    /// Parse `"2.4.2"`. Every component must be plain ASCII digits.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = Vec::new();
        for part in text.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            parts.push(part.parse().ok()?);
        }
        Some(Self(parts))
    }

    /// `v2.4.2`
    pub fn tag_name(&self) -> String {
        format!("v{self}")
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| anyhow!("not a dotted-integer version: {s:?}"))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A release tag and the content it stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRecord {
    pub version: Version,
    pub subhistory: String,
    pub kind: InstallKind,
    pub tree: ObjectId,
    /// `None` means no main-line commit carries this content and a
    /// synthetic commit has to be written for it
    pub main_commit: Option<ObjectId>,
}

impl ReleaseRecord {
    pub fn is_synthetic(&self) -> bool {
        self.main_commit.is_none()
    }
}
