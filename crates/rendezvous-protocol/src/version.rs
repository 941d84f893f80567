//! Protocol version and the check a client's requested version must pass.
//!
//! Clients may name the version they speak on the upgrade URL
//! (`?version=1.0`). Any minor version of the server's major is accepted;
//! the server always answers in its own version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version spoken by this build.
pub const PROTOCOL_VERSION: Version = Version::new(1, 0);

/// Why a requested version was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// Not of the form `MAJOR.MINOR`.
    #[error("Malformed protocol version {0:?}, expected MAJOR.MINOR")]
    Malformed(String),

    /// Different major version.
    #[error("Protocol version {requested} is not supported, server speaks {supported}")]
    Unsupported {
        requested: Version,
        supported: Version,
    },
}

/// A `MAJOR.MINOR` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    /// Bumped on breaking changes.
    pub major: u8,
    /// Bumped on additions old clients can ignore.
    pub minor: u8,
}

impl Version {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Accept a client's requested version if this build can serve it.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] if `requested` does not parse or names
    /// another major version.
    pub fn accept(requested: &str) -> Result<Version, VersionError> {
        let version: Version = requested.parse()?;
        if version.major != PROTOCOL_VERSION.major {
            return Err(VersionError::Unsupported {
                requested: version,
                supported: PROTOCOL_VERSION,
            });
        }
        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || VersionError::Malformed(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(malformed)?;
        Ok(Self {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }
}
