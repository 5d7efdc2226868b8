use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::io_factory::IoFactory;
use crate::shared::constants::OPTIONS_FILE_NAME;
use crate::shared::settings::{config_path, read_json, write_json, SettingsError};

/// Plugin option values as text, keyed by plugin then option name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptionStore {
    pub plugins: BTreeMap<String, BTreeMap<String, String>>,
}

impl PluginOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_path() -> Option<PathBuf> {
        config_path(OPTIONS_FILE_NAME)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        write_json(path, self)
    }

    pub fn set(&mut self, plugin: &str, option: &str, value: impl Into<String>) {
        self.plugins
            .entry(plugin.to_string())
            .or_default()
            .insert(option.to_string(), value.into());
    }

    pub fn get(&self, plugin: &str, option: &str) -> Option<&str> {
        self.plugins.get(plugin)?.get(option).map(String::as_str)
    }

    /// Snapshot of every option of every plugin in `factory`.
    pub fn capture(factory: &IoFactory) -> Self {
        let mut store = Self::new();
        for name in factory.plugin_names() {
            let Some(plugin) = factory.plugin(name) else {
                continue;
            };
            for option in plugin.option_names() {
                if let Some(value) = plugin.option(option) {
                    store.set(name, option, value);
                }
            }
        }
        store
    }

    /// Pushes stored values into `factory`. Entries naming unknown plugins or
    /// options, or holding invalid values, are logged and skipped. Returns
    /// the number of values that changed.
    pub fn apply(&self, factory: &mut IoFactory) -> usize {
        let mut changed = 0;
        for (plugin, options) in &self.plugins {
            for (option, value) in options {
                match factory.set_option(plugin, option, value) {
                    Ok(true) => changed += 1,
                    Ok(false) => {}
                    Err(e) => log::warn!("skipping stored option {plugin}.{option}: {e}"),
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_lists_every_option() {
        let factory = IoFactory::with_default_plugins();
        let store = PluginOptionStore::capture(&factory);
        assert_eq!(store.get("DPX", "version"), Some("2.0"));
        assert_eq!(store.get("OpenEXR", "compression"), Some("ZIP"));
        assert_eq!(store.get("PPM", "data"), Some("Binary"));
        assert!(store.plugins.get("RLA").is_none());
    }

    #[test]
    fn test_save_load_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("options.json");

        let mut source = IoFactory::with_default_plugins();
        source.set_option("DPX", "endian", "LSB").unwrap();
        source.set_option("PPM", "data", "ASCII").unwrap();
        PluginOptionStore::capture(&source).save(&path).unwrap();

        let loaded = PluginOptionStore::load(&path).unwrap();
        let mut target = IoFactory::with_default_plugins();
        assert_eq!(loaded.apply(&mut target), 2);
        assert_eq!(target.option("DPX", "endian").as_deref(), Some("LSB"));
        assert_eq!(target.option("PPM", "data").as_deref(), Some("ASCII"));
    }

    #[test]
    fn test_apply_skips_invalid_entries() {
        let mut store = PluginOptionStore::new();
        store.set("DPX", "version", "3.0");
        store.set("DPX", "type", "U10");
        store.set("TGA", "rle", "on");
        store.set("OpenEXR", "dither", "on");

        let mut factory = IoFactory::with_default_plugins();
        assert_eq!(store.apply(&mut factory), 1);
        assert_eq!(factory.option("DPX", "version").as_deref(), Some("2.0"));
        assert_eq!(factory.option("DPX", "type").as_deref(), Some("U10"));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.json");
        assert!(matches!(PluginOptionStore::load(&missing), Err(SettingsError::Io { .. })));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(PluginOptionStore::load(&broken), Err(SettingsError::Json { .. })));

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "{}").unwrap();
        assert_eq!(PluginOptionStore::load(&empty).unwrap(), PluginOptionStore::new());
    }
}
