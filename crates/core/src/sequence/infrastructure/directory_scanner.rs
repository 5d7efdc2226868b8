use std::collections::HashMap;
use std::path::Path;

use crate::io::file_io::FileIoError;
use crate::sequence::domain::file_info::{FileInfo, FileKind};
use crate::sequence::domain::list_options::DirectoryListOptions;

/// Lists `dir`, grouping numbered files into sequences per `options`.
pub fn list_directory(dir: &Path, options: &DirectoryListOptions) -> Result<Vec<FileInfo>, FileIoError> {
    let prefix = directory_prefix(dir);
    let mut out: Vec<FileInfo> = Vec::new();
    // (base, extension) -> indices into `out` of candidate sequences.
    let mut groups: HashMap<(String, String), Vec<usize>> = HashMap::new();

    for entry in read_entries(dir)? {
        let (name, is_dir, size, modified) = entry;
        if !options.accepts(&name, is_dir) {
            continue;
        }
        let mut info = FileInfo::parse(&format!("{prefix}{name}"));
        info.set_stat(size, modified);
        if is_dir {
            info.set_kind(FileKind::Directory);
            out.push(info);
            continue;
        }

        if options.sequences && info.has_number() && options.is_sequence_extension(info.extension()) {
            let key = (info.base().to_string(), info.extension().to_string());
            let candidates = groups.entry(key).or_default();
            if candidates.iter().any(|&i| out[i].add_to_sequence(&info)) {
                continue;
            }
            candidates.push(out.len());
        }
        out.push(info);
    }

    options.sort(&mut out);
    log::debug!("listed {} entries in {}", out.len(), dir.display());
    Ok(out)
}

/// Resolves the full frame set of the sequence `info` belongs to by merging
/// every compatible sibling in its directory. Files without a number are
/// returned unchanged.
pub fn eval_sequence(info: &FileInfo) -> Result<FileInfo, FileIoError> {
    if !info.has_number() {
        return Ok(info.clone());
    }
    let dir = if info.directory().is_empty() {
        Path::new(".")
    } else {
        Path::new(info.directory())
    };

    let mut merged: Option<FileInfo> = None;
    for (name, is_dir, size, modified) in read_entries(dir)? {
        if is_dir {
            continue;
        }
        let mut sibling = FileInfo::parse(&format!("{}{name}", info.directory()));
        if !info.is_compatible(&sibling) {
            continue;
        }
        sibling.set_stat(size, modified);
        match merged.as_mut() {
            Some(existing) => {
                if !existing.add_to_sequence(&sibling) {
                    log::debug!("skipping {} (padding differs)", sibling.path());
                }
            }
            None => merged = Some(sibling),
        }
    }

    Ok(match merged {
        Some(mut found) => {
            let sequence = found.sequence().clone();
            found.set_sequence(sequence);
            found
        }
        None => info.clone(),
    })
}

type Entry = (String, bool, u64, Option<std::time::SystemTime>);

fn read_entries(dir: &Path) -> Result<Vec<Entry>, FileIoError> {
    let list_error = |source| FileIoError::List {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(list_error)? {
        let entry = entry.map_err(list_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.metadata() {
            Ok(metadata) => entries.push((name, metadata.is_dir(), metadata.len(), metadata.modified().ok())),
            Err(e) => log::warn!("cannot stat {}: {e}", entry.path().display()),
        }
    }
    Ok(entries)
}

fn directory_prefix(dir: &Path) -> String {
    let text = dir.to_string_lossy();
    if text.is_empty() || text.ends_with('/') || text.ends_with('\\') {
        text.into_owned()
    } else {
        format!("{text}{}", std::path::MAIN_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::domain::frame_sequence::CompressMode;
    use std::fs;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"x").unwrap();
        }
    }

    fn prefix(dir: &Path) -> String {
        directory_prefix(dir)
    }

    #[test]
    fn test_eval_sequence_finds_siblings() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["render.1.dpx", "render.2.dpx", "render.3.dpx", "other.1.dpx"]);
        let info = FileInfo::parse(&format!("{}render.1.dpx", prefix(dir.path())));
        let evaluated = eval_sequence(&info).unwrap();
        assert_eq!(evaluated.sequence().frames().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(evaluated.is_sequence());
        assert_eq!(evaluated.format(CompressMode::Sparse), "render.1-3.dpx");
        assert_eq!(evaluated.size(), 3);
    }

    #[test]
    fn test_eval_sequence_keeps_padding() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["shot.0009.exr", "shot.0010.exr", "shot.0012.exr"]);
        let info = FileInfo::parse(&format!("{}shot.0010.exr", prefix(dir.path())));
        let evaluated = eval_sequence(&info).unwrap();
        assert_eq!(evaluated.number(), "0009-0010,0012");
        assert_eq!(evaluated.file_name(Some(12)), format!("{}shot.0012.exr", prefix(dir.path())));
    }

    #[test]
    fn test_eval_sequence_plain_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["movie.mov"]);
        let info = FileInfo::parse(&format!("{}movie.mov", prefix(dir.path())));
        assert_eq!(eval_sequence(&info).unwrap(), info);
    }

    #[test]
    fn test_eval_sequence_missing_directory_errors() {
        let info = FileInfo::parse("/nonexistent/seqio/render.1.dpx");
        assert!(matches!(eval_sequence(&info), Err(FileIoError::List { .. })));
    }

    #[test]
    fn test_list_directory_groups_sequences() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["a.1.dpx", "a.2.dpx", "a.4.dpx", "b.txt", ".hidden.1.dpx"]);
        fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = list_directory(dir.path(), &DirectoryListOptions::default()).unwrap();
        let names: Vec<String> = entries.iter().map(|e| e.format(CompressMode::Sparse)).collect();
        assert_eq!(names, vec!["sub", "a.1-2,4.dpx", "b.txt"]);
        assert_eq!(entries[0].kind(), FileKind::Directory);
    }

    #[test]
    fn test_list_directory_without_sequences() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["a.1.dpx", "a.2.dpx"]);
        let options = DirectoryListOptions {
            sequences: false,
            ..Default::default()
        };
        let entries = list_directory(dir.path(), &options).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_list_directory_non_sequence_extension_not_grouped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["log.1.txt", "log.2.txt"]);
        let entries = list_directory(dir.path(), &DirectoryListOptions::default()).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
