//! Audio filter catalog and filter chains

use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Named audio effect; declaration order is the chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AudioFilter {
    Slowed,
    SpedUp,
    Nightcore,
    Reverb,
    EightD,
    Muffled,
    BassBoost,
    Earrape,
}

impl AudioFilter {
    pub const ALL: [AudioFilter; 8] = [
        AudioFilter::Slowed,
        AudioFilter::SpedUp,
        AudioFilter::Nightcore,
        AudioFilter::Reverb,
        AudioFilter::EightD,
        AudioFilter::Muffled,
        AudioFilter::BassBoost,
        AudioFilter::Earrape,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AudioFilter::Slowed => "slowed",
            AudioFilter::SpedUp => "spedup",
            AudioFilter::Nightcore => "nightcore",
            AudioFilter::Reverb => "reverb",
            AudioFilter::EightD => "8d",
            AudioFilter::Muffled => "muffled",
            AudioFilter::BassBoost => "bassboost",
            AudioFilter::Earrape => "earrape",
        }
    }

    /// ffmpeg audio-filter expression
    pub fn expression(self) -> &'static str {
        match self {
            AudioFilter::Slowed => "asetrate=48000*0.8,aresample=48000",
            AudioFilter::SpedUp => "asetrate=48000*1.2,aresample=48000",
            AudioFilter::Nightcore => "asetrate=48000*1.25,aresample=48000,atempo=1.05",
            AudioFilter::Reverb => "aecho=0.8:0.9:1000:0.3",
            AudioFilter::EightD => "apulsator=hz=0.08",
            AudioFilter::Muffled => "lowpass=f=500",
            AudioFilter::BassBoost => "bass=g=10",
            AudioFilter::Earrape => "volume=15,acrusher=level_in=8:level_out=18:bits=8:mode=log:aa=1",
        }
    }
}

impl fmt::Display for AudioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudioFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        AudioFilter::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("unknown filter '{}'", s)))
    }
}

/// Set of active filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    filters: BTreeSet<AudioFilter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `filter` if absent, remove it if present; returns whether it is now active
    pub fn toggle(&mut self, filter: AudioFilter) -> bool {
        if self.filters.remove(&filter) {
            false
        } else {
            self.filters.insert(filter);
            true
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = AudioFilter> + '_ {
        self.filters.iter().copied()
    }

    /// Effect-chain string for the transport, `None` when no filter is active
    pub fn to_chain_string(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        Some(
            self.filters
                .iter()
                .map(|f| f.expression())
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

impl FromIterator<AudioFilter> for FilterChain {
    fn from_iter<I: IntoIterator<Item = AudioFilter>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("8D".parse::<AudioFilter>().unwrap(), AudioFilter::EightD);
        assert_eq!(" bassboost ".parse::<AudioFilter>().unwrap(), AudioFilter::BassBoost);
        assert!("flanger".parse::<AudioFilter>().is_err());
    }

    #[test]
    fn test_chain_is_catalog_ordered() {
        let mut chain = FilterChain::new();
        chain.toggle(AudioFilter::BassBoost);
        chain.toggle(AudioFilter::Slowed);

        assert_eq!(
            chain.to_chain_string().as_deref(),
            Some("asetrate=48000*0.8,aresample=48000,bass=g=10")
        );
    }

    #[test]
    fn test_toggle_twice_restores_chain() {
        let mut chain: FilterChain = [AudioFilter::Reverb].into_iter().collect();
        let original = chain.clone();

        assert!(chain.toggle(AudioFilter::Nightcore));
        assert!(!chain.toggle(AudioFilter::Nightcore));
        assert_eq!(chain, original);

        assert!(!chain.toggle(AudioFilter::Reverb));
        assert_eq!(chain.to_chain_string(), None);
    }
}
