//! TOML device inventory.
//!
//! ```toml
//! [run]
//! debug = false
//! default_timeout = 20
//!
//! [[device]]
//! name = "wan"
//! role = "router"
//! features = ["dhcp-server"]
//! location = "rack-3"
//! transport = "ssh"
//! params = { host = "10.0.0.1", user = "admin", password = "secret", port = 22 }
//! prompts = ['router#\s*$']
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::RunConfig;
use crate::pattern::Pattern;
use crate::result::ConfigError;
use crate::session::TransportRecipe;

/// A whole bench: run settings plus the devices to wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inventory {
    /// Run-wide settings
    #[serde(default)]
    pub run: RunConfig,

    /// Device entries, in file order
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

/// One device entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Accessor name, unique per inventory
    pub name: String,

    /// Role tag (e.g. "router", "cm", "provisioner")
    pub role: String,

    /// Feature tags
    #[serde(default)]
    pub features: Vec<String>,

    /// Location tag
    #[serde(default)]
    pub location: Option<String>,

    /// Transport recipe tag: local, ssh, telnet, serial or command
    pub transport: String,

    /// Free-form recipe parameters
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,

    /// Prompt regexes, in priority order
    #[serde(default)]
    pub prompts: Vec<String>,

    /// Per-device inter-character delay, overriding the run setting
    #[serde(default, with = "super::opt_duration_secs")]
    pub char_delay: Option<Duration>,

    /// Extra environment for the launch command
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl DeviceConfig {
    /// Recipe parameters with every value rendered as a string.
    pub fn string_params(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect()
    }

    /// Resolve the transport recipe.
    pub fn recipe(&self) -> Result<TransportRecipe, ConfigError> {
        TransportRecipe::from_tag(&self.transport, &self.string_params())
    }

    /// Compile the prompt list.
    pub fn prompt_patterns(&self) -> Result<Vec<Pattern>, ConfigError> {
        self.prompts
            .iter()
            .map(|p| Pattern::regex(p).map_err(ConfigError::from))
            .collect()
    }
}

impl Inventory {
    /// Read and validate an inventory file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate inventory text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let inventory: Inventory = toml::from_str(text)?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Check names are unique and every recipe and prompt resolves.
    ///
    /// Runs before anything is spawned so wiring mistakes surface first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.name.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.name.clone()));
            }
            device.recipe()?;
            device.prompt_patterns()?;
        }
        Ok(())
    }

    /// Look up a device entry by accessor name.
    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BENCH: &str = r#"
[run]
debug = true
default_timeout = 5

[[device]]
name = "wan"
role = "router"
features = ["dhcp-server", "nat"]
location = "rack-3"
transport = "ssh"
params = { host = "10.0.0.1", user = "admin", port = 2222 }
prompts = ['router#\s*$']

[[device]]
name = "cm1"
role = "cm"
transport = "serial"
params = { device = "/dev/ttyUSB0", baud = 115200 }
prompts = ['=>\s*$', 'cm#\s*$']
char_delay = 0.01
"#;

    #[test]
    fn test_parse_inventory() {
        let inventory = Inventory::from_toml_str(BENCH).unwrap();
        assert!(inventory.run.debug);
        assert_eq!(inventory.run.default_timeout, Duration::from_secs(5));
        assert_eq!(inventory.devices.len(), 2);

        let wan = inventory.device("wan").unwrap();
        assert_eq!(wan.string_params()["port"], "2222");
        assert_eq!(wan.features, vec!["dhcp-server", "nat"]);

        let cm = inventory.device("cm1").unwrap();
        assert_eq!(cm.prompt_patterns().unwrap().len(), 2);
        assert_eq!(cm.char_delay, Some(Duration::from_millis(10)));
        assert!(cm.location.is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"
[[device]]
name = "lan"
role = "host"
transport = "local"

[[device]]
name = "lan"
role = "host"
transport = "local"
"#;
        let err = Inventory::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDevice(name) if name == "lan"));
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let text = r#"
[[device]]
name = "x"
role = "host"
transport = "carrier-pigeon"
"#;
        let err = Inventory::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTransport(t) if t == "carrier-pigeon"));
    }

    #[test]
    fn test_bad_prompt_rejected() {
        let text = r#"
[[device]]
name = "x"
role = "host"
transport = "local"
prompts = ['(unclosed']
"#;
        assert!(matches!(
            Inventory::from_toml_str(text),
            Err(ConfigError::Pattern(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(&path, BENCH).unwrap();
        let inventory = Inventory::load(&path).unwrap();
        assert_eq!(inventory.devices[0].name, "wan");

        let missing = Inventory::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
