use serde::{Deserialize, Serialize};

pub const DEFAULT_RECENT_MAX: usize = 10;

/// Most-recent-first list of opened clips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentFiles {
    max: usize,
    files: Vec<String>,
}

impl RecentFiles {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            files: Vec::new(),
        }
    }

    /// Puts `path` at the front, moving it if already present.
    pub fn add(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.files.retain(|p| *p != path);
        self.files.insert(0, path);
        self.files.truncate(self.max);
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|p| p != path);
        self.files.len() != before
    }

    pub fn set_max(&mut self, max: usize) {
        self.max = max;
        self.files.truncate(max);
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}

impl Default for RecentFiles {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_moves_existing_to_front() {
        let mut recent = RecentFiles::new(3);
        recent.add("a");
        recent.add("b");
        recent.add("a");
        assert_eq!(recent.files(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_add_truncates_to_max() {
        let mut recent = RecentFiles::new(2);
        for name in ["a", "b", "c"] {
            recent.add(name);
        }
        assert_eq!(recent.files(), &["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_set_max_shrinks() {
        let mut recent = RecentFiles::new(5);
        for name in ["a", "b", "c"] {
            recent.add(name);
        }
        recent.set_max(1);
        assert_eq!(recent.files(), &["c".to_string()]);
    }

    #[test]
    fn test_remove() {
        let mut recent = RecentFiles::default();
        recent.add("a");
        assert!(recent.remove("a"));
        assert!(!recent.remove("a"));
        assert!(recent.files().is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut recent = RecentFiles::new(4);
        recent.add("/shots/render.1-3.dpx");
        let json = serde_json::to_string(&recent).unwrap();
        let restored: RecentFiles = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, recent);
    }
}
