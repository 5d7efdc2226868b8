use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::sequence::domain::file_info::{FileInfo, FileKind};
use crate::sequence::domain::frame_sequence::CompressMode;
use crate::shared::constants::SEQUENCE_EXTENSIONS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Time,
    Type,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "size" => Ok(SortKey::Size),
            "time" => Ok(SortKey::Time),
            "type" => Ok(SortKey::Type),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryListOptions {
    /// Group numbered files into sequences.
    pub sequences: bool,
    /// Lower-case extensions, with the leading dot, eligible for grouping.
    pub sequence_extensions: Vec<String>,
    pub show_hidden: bool,
    /// `*` / `?` pattern applied to file names (not directories).
    pub glob: Option<String>,
    pub sort: SortKey,
    pub reverse: bool,
    pub directories_first: bool,
}

impl Default for DirectoryListOptions {
    fn default() -> Self {
        Self {
            sequences: true,
            sequence_extensions: SEQUENCE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            show_hidden: false,
            glob: None,
            sort: SortKey::Name,
            reverse: false,
            directories_first: true,
        }
    }
}

impl DirectoryListOptions {
    pub fn is_sequence_extension(&self, extension: &str) -> bool {
        self.sequence_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Whether a directory entry named `name` is listed at all.
    pub fn accepts(&self, name: &str, is_dir: bool) -> bool {
        if !self.show_hidden && name.starts_with('.') {
            return false;
        }
        match (&self.glob, is_dir) {
            (Some(pattern), false) => glob_match(pattern, name),
            _ => true,
        }
    }

    pub fn sort(&self, entries: &mut [FileInfo]) {
        let key = self.sort;
        entries.sort_by(|a, b| {
            let ordering = compare(a, b, key);
            if self.reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });
        if self.directories_first {
            // Stable, so the order within each group is kept.
            entries.sort_by_key(|e| e.kind() != FileKind::Directory);
        }
    }
}

fn compare(a: &FileInfo, b: &FileInfo, key: SortKey) -> Ordering {
    let by_name = || a.format(CompressMode::Sparse).cmp(&b.format(CompressMode::Sparse));
    match key {
        SortKey::Name => by_name(),
        SortKey::Size => a.size().cmp(&b.size()).then_with(by_name),
        SortKey::Time => a.modified().cmp(&b.modified()).then_with(by_name),
        SortKey::Type => a
            .extension()
            .to_ascii_lowercase()
            .cmp(&b.extension().to_ascii_lowercase())
            .then_with(by_name),
    }
}

/// Shell-style matching with `*` (any run) and `?` (one char).
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((star_pi, star_ni)) = star {
            pi = star_pi + 1;
            ni = star_ni + 1;
            star = Some((star_pi, star_ni + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::star("*.dpx", "render.1.dpx", true)]
    #[case::star_miss("*.dpx", "render.1.exr", false)]
    #[case::question("img.?.ppm", "img.7.ppm", true)]
    #[case::question_miss("img.?.ppm", "img.10.ppm", false)]
    #[case::middle("r*1*", "render.100.dpx", true)]
    #[case::empty_pattern("", "a", false)]
    #[case::only_star("*", "", true)]
    fn test_glob_match(#[case] pattern: &str, #[case] name: &str, #[case] expected: bool) {
        assert_eq!(glob_match(pattern, name), expected);
    }

    #[test]
    fn test_accepts_hidden_and_glob() {
        let mut options = DirectoryListOptions {
            glob: Some("*.exr".into()),
            ..Default::default()
        };
        assert!(!options.accepts(".secret.exr", false));
        assert!(options.accepts("a.exr", false));
        assert!(!options.accepts("a.dpx", false));
        assert!(options.accepts("subdir", true));
        options.show_hidden = true;
        assert!(options.accepts(".secret.exr", false));
    }

    #[test]
    fn test_sort_name_reverse_with_directories_first() {
        let mut entries = vec![
            FileInfo::parse("b.dpx"),
            FileInfo::parse("a.dpx"),
            FileInfo::parse("zdir"),
        ];
        entries[2].set_kind(FileKind::Directory);
        let options = DirectoryListOptions {
            reverse: true,
            ..Default::default()
        };
        options.sort(&mut entries);
        let names: Vec<String> = entries.iter().map(|e| e.path()).collect();
        assert_eq!(names, vec!["zdir", "b.dpx", "a.dpx"]);
    }

    #[test]
    fn test_sort_by_type() {
        let mut entries = vec![FileInfo::parse("b.png"), FileInfo::parse("c.dpx"), FileInfo::parse("a.png")];
        let options = DirectoryListOptions {
            sort: SortKey::Type,
            ..Default::default()
        };
        options.sort(&mut entries);
        let names: Vec<String> = entries.iter().map(|e| e.path()).collect();
        assert_eq!(names, vec!["c.dpx", "a.png", "b.png"]);
    }

    #[test]
    fn test_sequence_extension_case_insensitive() {
        let options = DirectoryListOptions::default();
        assert!(options.is_sequence_extension(".DPX"));
        assert!(!options.is_sequence_extension(".mov"));
    }
}
