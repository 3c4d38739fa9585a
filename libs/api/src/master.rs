//! Master descriptor.

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::descriptor::entries;
use crate::ApiError;

/// Oldest master release whose task API this framework relies on.
pub const MIN_MASTER_VERSION: Version = Version::new(0, 23, 0);

/// Master descriptor received on registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Master {
    pub id: String,
    pub hostname: String,
    /// Version string exactly as reported; may be absent on old masters.
    pub version: Option<String>,
}

impl Master {
    /// Parsed master version.
    ///
    /// Two-component versions (`0.23`) are padded with a zero patch level.
    /// Returns `None` when the version is absent or unparseable.
    pub fn version(&self) -> Option<Version> {
        let raw = self.version.as_deref()?.trim();
        Version::parse(raw)
            .or_else(|_| Version::parse(&format!("{raw}.0")))
            .ok()
    }

    /// True when the master is at least `min`.
    pub fn supports(&self, min: &Version) -> bool {
        self.version().is_some_and(|v| v >= *min)
    }
}

impl fmt::Display for Master {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{}, hostname:{}, version:{}",
            self.id,
            self.hostname,
            self.version.as_deref().unwrap_or("<none>")
        )
    }
}

impl FromStr for Master {
    type Err = ApiError;

    /// Parses `id:m1, hostname:master0, version:0.28.2`. Every key is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut master = Master::default();

        for (key, value) in entries(s, ',')? {
            match key {
                "id" => master.id = value.to_string(),
                "hostname" => master.hostname = value.to_string(),
                "version" => master.version = Some(value.to_string()),
                other => {
                    return Err(ApiError::UnsupportedKey {
                        kind: "master",
                        key: other.to_string(),
                    })
                }
            }
        }

        Ok(master)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", false)]
    #[case("version:0.22.0", false)]
    #[case("version:0.22.9", false)]
    #[case("version:0.23.0", true)]
    #[case("version:0.23", true)]
    #[case("version:0.28.2", true)]
    #[case("version:1.0.0", true)]
    #[case("version:garbage", false)]
    fn test_supports_min_version(#[case] descriptor: &str, #[case] supported: bool) {
        let master: Master = descriptor.parse().unwrap();
        assert_eq!(master.supports(&MIN_MASTER_VERSION), supported);
    }

    #[test]
    fn test_absent_version() {
        let master = Master::default();
        assert_eq!(master.version(), None);
    }
}
