//! ABI registry for the external presale contracts
//!
//! Loads contract interface definitions from JSON and checks that the typed
//! codec agrees with them, so a drifted selector is caught at startup rather
//! than as a reverted transaction.

use crate::config::AbiSettings;
use crate::error::Error;
use crate::evm::codec;
use alloy_json_abi::{Event, JsonAbi};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const ERC20_ABI: &str = include_str!("../../abi/IERC20.json");
const ERC721_ABI: &str = include_str!("../../abi/IERC721.json");
const PRESALE_ABI: &str = include_str!("../../abi/IPresale.json");

/// Contract ABI registry keyed by interface name
#[derive(Debug, Clone)]
pub struct AbiRegistry {
    abis: HashMap<String, JsonAbi>,
}

impl AbiRegistry {
    /// Create a new empty ABI registry
    pub fn new() -> Self {
        Self {
            abis: HashMap::new(),
        }
    }

    /// Registry preloaded with the interfaces shipped in `abi/`
    pub fn bundled() -> Result<Self, Error> {
        let mut registry = Self::new();
        registry.load_from_json(ERC20_ABI, "IERC20".to_string())?;
        registry.load_from_json(ERC721_ABI, "IERC721".to_string())?;
        registry.load_from_json(PRESALE_ABI, "IPresale".to_string())?;
        Ok(registry)
    }

    /// Bundled interfaces with any configured files loaded over them
    pub fn from_settings(settings: &AbiSettings) -> Result<Self, Error> {
        let mut registry = Self::bundled()?;
        for (key, path) in &settings.files {
            registry.load_from_file(path, key.clone())?;
            info!(interface = %key, %path, "Loaded ABI override");
        }
        Ok(registry)
    }

    /// Load an ABI from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P, key: String) -> Result<(), Error> {
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!(
                "Failed to read ABI file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        self.load_from_json(&content, key)
    }

    /// Load an ABI from a JSON string
    pub fn load_from_json(&mut self, json: &str, key: String) -> Result<(), Error> {
        let abi: JsonAbi = serde_json::from_str(json)
            .map_err(|e| Error::Abi(format!("Failed to parse ABI JSON for {}: {}", key, e)))?;
        self.abis.insert(key, abi);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&JsonAbi> {
        self.abis.get(key)
    }

    /// Get an event by name from a specific ABI
    pub fn get_event(&self, abi_key: &str, event_name: &str) -> Result<&Event, Error> {
        let abi = self
            .get(abi_key)
            .ok_or_else(|| Error::Abi(format!("ABI '{}' not found", abi_key)))?;

        abi.events().find(|e| e.name == event_name).ok_or_else(|| {
            Error::Abi(format!(
                "Event '{}' not found in ABI '{}'",
                event_name, abi_key
            ))
        })
    }

    /// Check every codec selector and the purchase topic against the loaded ABIs
    pub fn validate_codec(&self) -> Result<(), Error> {
        for (signature, selector) in codec::known_selectors() {
            let found = self.abis.values().any(|abi| {
                abi.functions()
                    .any(|f| f.signature() == signature && f.selector().0 == selector)
            });
            if !found {
                return Err(Error::Abi(format!(
                    "Selector 0x{} for {} not present in any loaded ABI",
                    hex::encode(selector),
                    signature
                )));
            }
        }

        let event = self.get_event("IPresale", "TokensPurchased")?;
        if event.selector() != codec::purchase_topic() {
            return Err(Error::Abi(format!(
                "TokensPurchased topic mismatch: ABI {} vs codec {}",
                event.selector(),
                codec::purchase_topic()
            )));
        }

        debug!("Codec validated against {} ABIs", self.abis.len());
        Ok(())
    }
}

impl Default for AbiRegistry {
    fn default() -> Self {
        Self::new()
    }
}
