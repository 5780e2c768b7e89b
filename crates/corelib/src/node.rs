//! Node identity for the ring.
//!
//! Nodes are named `N<integer>` and ordered on the ring by that integer. A
//! `NodeId` can still hold a malformed name (one that arrived over the wire
//! before validation); such ids sort after every valid id.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Identifier of a ring participant, e.g. `N3`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Parse and validate an id of the form `N<digits>`.
    pub fn parse(raw: &str) -> Result<Self> {
        if is_valid(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::InvalidNodeId(raw.to_string()))
        }
    }

    /// Wrap a name without validating it.
    ///
    /// Malformed names are kept as-is and sort last.
    pub fn unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build the id for ring index `n` (`N<n>`).
    pub fn from_index(n: u64) -> Self {
        Self(format!("N{}", n))
    }

    /// Numeric ring index, `None` for a malformed id.
    pub fn index(&self) -> Option<u64> {
        if is_valid(&self.0) {
            self.0[1..].parse().ok()
        } else {
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        self.index().is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid(raw: &str) -> bool {
    match raw.strip_prefix('N') {
        // Digits only, and small enough to be a ring index.
        Some(digits) => {
            !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit())
                && digits.parse::<u64>().is_ok()
        }
        None => false,
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Valid ids by index, then malformed ones.
        let key = |id: &NodeId| match id.index() {
            Some(n) => (0u8, n),
            None => (1u8, 0),
        };
        key(self)
            .cmp(&key(other))
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let id = NodeId::parse("N12").unwrap();
        assert_eq!(id.index(), Some(12));
        assert_eq!(id.to_string(), "N12");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "N", "n1", "X1", "N1a", "N-1", "1", "N 1"] {
            assert!(NodeId::parse(raw).is_err(), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_parse_rejects_index_overflow() {
        assert!(NodeId::parse("N99999999999999999999").is_err());
        let max = format!("N{}", u64::MAX);
        let id = NodeId::parse(&max).unwrap();
        assert!(id.is_valid());
        assert!(id > NodeId::from_index(7));
    }

    #[test]
    fn test_numeric_ordering() {
        let mut ids = vec![
            NodeId::from_index(10),
            NodeId::from_index(2),
            NodeId::from_index(1),
        ];
        ids.sort();
        let names: Vec<_> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(names, ["N1", "N2", "N10"]);
    }

    #[test]
    fn test_malformed_sorts_last() {
        let mut ids = vec![
            NodeId::unchecked("bogus"),
            NodeId::from_index(99),
            NodeId::from_index(3),
        ];
        ids.sort();
        assert_eq!(ids.last().unwrap().as_str(), "bogus");
        assert!(!ids.last().unwrap().is_valid());
    }
}
