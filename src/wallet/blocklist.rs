//! Security blocklist for wallet addresses
//!
//! Checked before any session state is mutated, including when a wallet
//! reports an account that was already authorized.

use crate::error::Error;
use alloy_primitives::Address;
use regex::{Regex, RegexBuilder};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    patterns: Vec<Regex>,
    suffixes: Vec<String>,
}

impl Blocklist {
    /// Build from regex patterns and hex suffixes (both case-insensitive)
    pub fn new(patterns: &[String], suffixes: &[String]) -> Result<Self, Error> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::Config(format!("Invalid blocklist pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let suffixes = suffixes
            .iter()
            .map(|s| s.trim().trim_start_matches("0x").to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self { patterns, suffixes })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.suffixes.is_empty()
    }

    pub fn is_blocked(&self, address: &Address) -> bool {
        let hex = format!("{:#x}", address);
        self.suffixes.iter().any(|s| hex.ends_with(s.as_str()))
            || self.patterns.iter().any(|p| p.is_match(&hex))
    }

    /// Fail with `SecurityBlock` if the address is listed
    pub fn check(&self, address: &Address) -> Result<(), Error> {
        if self.is_blocked(address) {
            warn!(%address, "Blocked address rejected");
            return Err(Error::SecurityBlock(address.to_string()));
        }
        Ok(())
    }
}
