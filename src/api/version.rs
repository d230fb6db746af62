//! API version strings
//!
//! Versions look like `v1`, `v1alpha2` or `v2beta1`. Equality is exact: each
//! handler owns exactly one version and no range matching is performed. The
//! ordering only exists so supported versions can be listed newest first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ProxyError;

/// Maturity level of an API version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    Alpha,
    Beta,
    Stable,
}

/// A validated API version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    raw: String,
    major: u32,
    stability: Stability,
    minor: u32,
}

impl ApiVersion {
    pub fn parse(s: &str) -> Result<Self, ProxyError> {
        let invalid = || ProxyError::InvalidVersion(s.to_string());

        let rest = s.strip_prefix('v').ok_or_else(invalid)?;
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let (major, suffix) = rest.split_at(digits);
        let major = parse_component(major).ok_or_else(invalid)?;

        let (stability, minor) = if suffix.is_empty() {
            (Stability::Stable, 0)
        } else if let Some(minor) = suffix.strip_prefix("alpha") {
            (Stability::Alpha, parse_component(minor).ok_or_else(invalid)?)
        } else if let Some(minor) = suffix.strip_prefix("beta") {
            (Stability::Beta, parse_component(minor).ok_or_else(invalid)?)
        } else {
            return Err(invalid());
        };

        Ok(Self {
            raw: s.to_string(),
            major,
            stability,
            minor,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }
}

/// Non-empty decimal without leading zeros, at least 1
fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || s.starts_with('0') || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.stability, self.minor).cmp(&(other.major, other.stability, other.minor))
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for ApiVersion {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = ProxyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.raw
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
