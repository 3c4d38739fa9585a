//! Resource offers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::descriptor::{entries, split_top};
use crate::ApiError;

/// Inclusive port range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct Range {
    start: u16,
    end: u16,
}

#[derive(Deserialize)]
struct RawRange {
    start: u16,
    end: u16,
}

impl TryFrom<RawRange> for Range {
    type Error = ApiError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Range::new(raw.start, raw.end)
    }
}

impl Range {
    /// Creates a range; `start` must not exceed `end`.
    pub fn new(start: u16, end: u16) -> Result<Self, ApiError> {
        if start > end {
            return Err(ApiError::InvalidRange(format!("{start}..{end}")));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range.
    pub fn len(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    /// Always false: a range holds at least its start value.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

impl FromStr for Range {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |v: &str| {
            v.trim()
                .parse::<u16>()
                .map_err(|_| ApiError::InvalidRange(s.to_string()))
        };

        match s.split_once("..") {
            Some((start, end)) => Range::new(parse(start)?, parse(end)?),
            None => {
                let port = parse(s)?;
                Range::new(port, port)
            }
        }
    }
}

/// Ordered list of port ranges as offered by one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ranges(Vec<Range>);

impl Ranges {
    pub fn new(ranges: Vec<Range>) -> Self {
        Self(ranges)
    }

    /// Total number of ports across all ranges.
    pub fn count(&self) -> u64 {
        self.0.iter().map(Range::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range> {
        self.0.iter()
    }

    /// First `n` ports in offer order, or `None` if there are fewer than `n`.
    pub fn take(&self, n: usize) -> Option<Vec<u16>> {
        let ports: Vec<u16> = self
            .0
            .iter()
            .flat_map(|r| r.start..=r.end)
            .take(n)
            .collect();
        (ports.len() == n).then_some(ports)
    }
}

impl fmt::Display for Ranges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Range::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for Ranges {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_top(s, ',')
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// Resources carried by an offer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpus: f64,
    /// Memory in MB.
    pub mem: f64,
    pub ports: Ranges,
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpus:{};mem:{}", self.cpus, self.mem)?;
        if self.ports.count() > 0 {
            write!(f, ";ports:{}", self.ports)?;
        }
        Ok(())
    }
}

impl FromStr for Resources {
    type Err = ApiError;

    /// Parses `cpus:2;mem:2048;ports:0..10,20..30`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut resources = Resources::default();

        for (name, value) in entries(s, ';')? {
            let scalar = || {
                value.parse::<f64>().map_err(|_| ApiError::InvalidResource {
                    name: name.to_string(),
                    value: value.to_string(),
                })
            };

            match name {
                "cpus" => resources.cpus = scalar()?,
                "mem" => resources.mem = scalar()?,
                "ports" => resources.ports = value.parse()?,
                other => {
                    return Err(ApiError::UnsupportedKey {
                        kind: "resources",
                        key: other.to_string(),
                    })
                }
            }
        }

        Ok(resources)
    }
}

/// A single-use grant of resources on one host.
///
/// Either consumed entirely by one launch or declined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub agent_id: String,
    pub hostname: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub resources: Resources,
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{}, agent:{}, hostname:{}, resources:[{}]",
            self.id, self.agent_id, self.hostname, self.resources
        )?;
        if !self.attributes.is_empty() {
            let attrs: Vec<String> = self
                .attributes
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, ", attributes:[{}]", attrs.join(";"))?;
        }
        Ok(())
    }
}

impl FromStr for Offer {
    type Err = ApiError;

    /// Parses `id:o1, agent:a1, hostname:h, resources:[...], attributes:[k=v;...]`.
    ///
    /// Every key is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut offer = Offer::default();

        for (key, value) in entries(s, ',')? {
            match key {
                "id" => offer.id = value.to_string(),
                "agent" => offer.agent_id = value.to_string(),
                "hostname" => offer.hostname = value.to_string(),
                "resources" => offer.resources = value.parse()?,
                "attributes" => offer.attributes = parse_attributes(value)?,
                other => {
                    return Err(ApiError::UnsupportedKey {
                        kind: "offer",
                        key: other.to_string(),
                    })
                }
            }
        }

        Ok(offer)
    }
}

/// Parses `a=1;b=2` (or comma separated) into an attribute map.
fn parse_attributes(s: &str) -> Result<BTreeMap<String, String>, ApiError> {
    s.split([';', ','])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| ApiError::InvalidEntry(pair.to_string()))
        })
        .collect()
}
