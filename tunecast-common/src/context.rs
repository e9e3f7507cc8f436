//! Playback context identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one independent playback scope (e.g. one server)
///
/// Every context owns exactly one player state; contexts never share queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl ContextId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ContextId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl FromStr for ContextId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| crate::Error::InvalidInput(format!("Invalid context id '{}': {}", s, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_context_id() {
        assert_eq!("42".parse::<ContextId>().unwrap(), ContextId(42));
        assert_eq!(" 7 ".parse::<ContextId>().unwrap(), ContextId(7));
        assert!("guild".parse::<ContextId>().is_err());
    }

    #[test]
    fn test_display_matches_raw_value() {
        assert_eq!(ContextId::new(123456789).to_string(), "123456789");
    }
}
