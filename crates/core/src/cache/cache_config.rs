use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::frame_cache::FrameCache;
use crate::shared::constants::{CACHE_CONFIG_FILE_NAME, DEFAULT_CACHE_GIGABYTES, DEFAULT_QUEUE_MAX};
use crate::shared::settings::{config_path, read_json, write_json, SettingsError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Budget in gigabytes of `2^30` bytes.
    pub size_gb: f64,
    /// Frames decoded ahead of playback.
    pub read_ahead: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size_gb: DEFAULT_CACHE_GIGABYTES,
            read_ahead: DEFAULT_QUEUE_MAX,
        }
    }
}

impl CacheConfig {
    pub fn default_path() -> Option<PathBuf> {
        config_path(CACHE_CONFIG_FILE_NAME)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        read_json(path)
    }

    /// Stored config, or defaults when missing or unreadable.
    pub fn load_or_default() -> Self {
        Self::default_path()
            .and_then(|path| match Self::load(&path) {
                Ok(config) => Some(config),
                Err(SettingsError::Io { .. }) => None,
                Err(e) => {
                    log::warn!("ignoring cache settings: {e}");
                    None
                }
            })
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        write_json(path, self)
    }

    pub fn build_cache(&self) -> FrameCache {
        let cache = FrameCache::with_gigabytes(self.size_gb);
        cache.set_enabled(self.enabled);
        cache
    }

    /// Pushes the size and enabled flag into a running cache.
    pub fn apply(&self, cache: &FrameCache) {
        cache.set_enabled(self.enabled);
        cache.set_max_gigabytes(self.size_gb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{ "size_gb": 2.5 }"#).unwrap();

        let config = CacheConfig::load(&path).unwrap();
        assert_relative_eq!(config.size_gb, 2.5);
        assert!(config.enabled);
        assert_eq!(config.read_ahead, DEFAULT_QUEUE_MAX);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("cache.json");
        let config = CacheConfig {
            enabled: false,
            size_gb: 0.25,
            read_ahead: 3,
        };
        config.save(&path).unwrap();
        assert_eq!(CacheConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_build_and_apply() {
        let config = CacheConfig {
            enabled: true,
            size_gb: 0.5,
            read_ahead: 4,
        };
        let cache = config.build_cache();
        assert_eq!(cache.max_bytes(), 1 << 29);
        assert!(cache.is_enabled());

        CacheConfig {
            enabled: false,
            ..config
        }
        .apply(&cache);
        assert!(!cache.is_enabled());
    }
}
