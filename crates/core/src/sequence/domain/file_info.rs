use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::sequence::domain::frame_sequence::{detect_pad, CompressMode, FrameRange, FrameSequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FileKind {
    #[default]
    File,
    Sequence,
    Directory,
}

/// The four components of a path string. Concatenating them in order gives
/// back the input exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParts {
    pub directory: String,
    pub base: String,
    pub number: String,
    pub extension: String,
}

fn is_path_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '#'
}

fn is_number_separator(c: char) -> bool {
    c == '-' || c == ','
}

/// Zero-led numbers only join a range when both sides have the same width.
fn match_padding(a: &str, b: &str) -> bool {
    let zero_led = |s: &str| s.len() > 1 && s.starts_with('0');
    if zero_led(a) || zero_led(b) {
        a.len() == b.len()
    } else {
        true
    }
}

/// Splits `directory/base<number>.ext`.
///
/// The number is the trailing run of digits, `#` wildcards, `-` and `,`
/// before the extension, accepted item by item from the right while the
/// padding of neighbouring items agrees. A `-` opening the run is a negative
/// sign unless a letter or digit comes right before it.
pub fn split(input: &str) -> PathParts {
    let s: Vec<char> = input.chars().collect();
    let collect = |from: usize, to: usize| -> String { s[from..to].iter().collect() };
    let mut parts = PathParts::default();
    if s.is_empty() {
        return parts;
    }

    // Extension: the last '.' of the file name, not counting a leading one.
    let mut end = s.len();
    if let Some(dot) = s.iter().rposition(|&c| c == '.' || is_path_separator(c)) {
        if dot > 0 && s[dot] == '.' && !is_path_separator(s[dot - 1]) {
            parts.extension = collect(dot, s.len());
            end = dot;
        }
    }

    // Number.
    let mut region_start = end;
    while region_start > 0 && (is_number_char(s[region_start - 1]) || is_number_separator(s[region_start - 1])) {
        region_start -= 1;
    }
    let preceded_by_word = region_start > 0 && s[region_start - 1].is_alphanumeric();
    let number_start = region_start + accept_number(&s[region_start..end], preceded_by_word);
    parts.number = collect(number_start, end);

    // Base and directory.
    let base_start = s[..number_start]
        .iter()
        .rposition(|&c| is_path_separator(c))
        .map_or(0, |i| i + 1);
    parts.base = collect(base_start, number_start);
    parts.directory = collect(0, base_start);
    parts
}

/// Returns the offset into `region` where the accepted number begins
/// (`region.len()` when there is none).
fn accept_number(region: &[char], preceded_by_word: bool) -> usize {
    let token_start = |to: usize| -> usize {
        let mut i = to;
        while i > 0 && is_number_char(region[i - 1]) {
            i -= 1;
        }
        i
    };
    // A '-' directly before a token is a sign when it opens the run or
    // follows another separator.
    let with_sign = |start: usize| -> usize {
        if start == 0 || region[start - 1] != '-' {
            return start;
        }
        let sign = start - 1;
        let is_sign = if sign == 0 {
            !preceded_by_word
        } else {
            is_number_separator(region[sign - 1])
        };
        if is_sign {
            sign
        } else {
            start
        }
    };

    let end = region.len();
    let first = token_start(end);
    if first == end {
        return end;
    }
    let mut word: String = region[first..end].iter().collect();
    let mut accepted = with_sign(first);

    while accepted > 0 && is_number_separator(region[accepted - 1]) {
        let separator = accepted - 1;
        let start = token_start(separator);
        if start == separator {
            break;
        }
        let token: String = region[start..separator].iter().collect();
        if !match_padding(&token, &word) {
            break;
        }
        word = token;
        accepted = with_sign(start);
    }
    accepted
}

/// A path resolved into directory, base name, frame number(s) and extension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    directory: String,
    base: String,
    number: String,
    extension: String,
    kind: FileKind,
    sequence: FrameSequence,
    size: u64,
    modified: Option<SystemTime>,
}

impl FileInfo {
    /// Parses a path string. Never fails; unrecognised numbers simply leave
    /// the file as a plain file.
    pub fn parse(path: &str) -> Self {
        Self::from_parts(split(path))
    }

    /// Like [`FileInfo::parse`], but a purely numeric extension (`clip.dpx.100`)
    /// is read as the frame number when the remaining name ends in one of
    /// `extensions`.
    pub fn parse_with_extensions(path: &str, extensions: &[&str]) -> Self {
        let parts = split(path);
        let numeric_extension = parts.number.is_empty()
            && parts.extension.len() > 1
            && parts.extension[1..].bytes().all(|b| b.is_ascii_digit());
        if numeric_extension {
            let stem = split(&format!("{}{}", parts.directory, parts.base));
            let recognized = extensions
                .iter()
                .any(|ext| ext.eq_ignore_ascii_case(&stem.extension));
            if recognized {
                return Self::from_parts(PathParts {
                    directory: parts.directory,
                    base: format!("{}.", parts.base),
                    number: parts.extension[1..].to_string(),
                    extension: String::new(),
                });
            }
        }
        Self::from_parts(parts)
    }

    pub fn from_path(path: &Path) -> Self {
        Self::parse(&path.to_string_lossy())
    }

    fn from_parts(parts: PathParts) -> Self {
        let mut sequence = FrameSequence::parse(&parts.number);
        if sequence.is_empty() {
            sequence.set_pad(wildcard_pad(&parts.number));
        }
        let kind = if sequence.len() > 1 || (parts.number.contains('#') && sequence.is_empty()) {
            FileKind::Sequence
        } else {
            FileKind::File
        };
        Self {
            directory: parts.directory,
            base: parts.base,
            number: parts.number,
            extension: parts.extension,
            kind,
            sequence,
            size: 0,
            modified: None,
        }
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn sequence(&self) -> &FrameSequence {
        &self.sequence
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty() && self.base.is_empty() && self.number.is_empty() && self.extension.is_empty()
    }

    pub fn is_sequence(&self) -> bool {
        self.kind == FileKind::Sequence
    }

    /// True for `name.####.ext` style names that address frames by pattern.
    pub fn is_wildcard(&self) -> bool {
        !self.number.is_empty() && self.number.chars().all(|c| c == '#')
    }

    /// Carries a frame number (or wildcard) that can join a sequence.
    pub fn has_number(&self) -> bool {
        !self.sequence.is_empty() || self.is_wildcard()
    }

    pub fn set_sequence(&mut self, sequence: FrameSequence) {
        self.number = sequence.compress(CompressMode::Sparse);
        self.kind = if sequence.len() > 1 { FileKind::Sequence } else { FileKind::File };
        self.sequence = sequence;
    }

    pub fn set_kind(&mut self, kind: FileKind) {
        self.kind = kind;
    }

    /// Fills size, modification time and directory kind from the filesystem.
    pub fn stat(&mut self) -> std::io::Result<()> {
        let metadata = std::fs::metadata(self.path())?;
        self.size = metadata.len();
        self.modified = metadata.modified().ok();
        if metadata.is_dir() {
            self.kind = FileKind::Directory;
        }
        Ok(())
    }

    pub(crate) fn set_stat(&mut self, size: u64, modified: Option<SystemTime>) {
        self.size = size;
        self.modified = modified;
    }

    /// The path as parsed, or in sequence notation once frames were merged.
    pub fn path(&self) -> String {
        format!("{}{}{}{}", self.directory, self.base, self.number, self.extension)
    }

    pub fn path_buf(&self) -> PathBuf {
        PathBuf::from(self.path())
    }

    /// File name for one frame (`render.0002.dpx`). Without a frame, or for
    /// files without a number, the parsed path is returned.
    pub fn file_name(&self, frame: Option<i64>) -> String {
        match frame {
            Some(frame) if self.has_number() => format!(
                "{}{}{}{}",
                self.directory,
                self.base,
                self.sequence.format_frame(frame),
                self.extension
            ),
            _ => self.path(),
        }
    }

    /// Name without directory, rendered with the given compression.
    pub fn format(&self, mode: CompressMode) -> String {
        let number = if self.sequence.is_empty() {
            self.number.clone()
        } else {
            self.sequence.compress(mode)
        };
        format!("{}{}{}", self.base, number, self.extension)
    }

    /// Whether `other` belongs to the same logical clip: same directory,
    /// base and extension, both numbered, and compatible padding.
    pub fn is_compatible(&self, other: &FileInfo) -> bool {
        if self.directory != other.directory
            || self.base != other.base
            || self.extension != other.extension
            || !self.has_number()
            || !other.has_number()
        {
            return false;
        }
        pads_compatible(self, other)
    }

    /// Merges a compatible file's frames into this one. Returns false and
    /// leaves `self` untouched when `other` is not compatible.
    pub fn add_to_sequence(&mut self, other: &FileInfo) -> bool {
        if !self.is_compatible(other) {
            return false;
        }
        if self.is_wildcard() {
            let pad = self.sequence.pad();
            self.sequence = FrameSequence::new();
            self.sequence.set_pad(pad);
        }
        self.sequence.merge(&other.sequence);
        self.number = self.sequence.compress(CompressMode::Sparse);
        self.kind = FileKind::Sequence;
        self.size += other.size;
        self.modified = match (self.modified, other.modified) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        true
    }
}

impl std::fmt::Display for FileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.directory, self.format(CompressMode::Sparse))
    }
}

fn wildcard_pad(number: &str) -> usize {
    if !number.is_empty() && number.chars().all(|c| c == '#') {
        number.len()
    } else {
        0
    }
}

/// Widths of the number strings of each side. Unpadded numbers fit a padded
/// sequence when they already have at least that many digits.
fn pads_compatible(a: &FileInfo, b: &FileInfo) -> bool {
    let (pad_a, pad_b) = (a.sequence.pad(), b.sequence.pad());
    if pad_a == pad_b {
        return true;
    }
    let fits = |unpadded: &FileInfo, pad: usize| -> bool {
        unpadded.sequence.pad() == 0
            && detect_pad(&unpadded.number) == 0
            && unpadded
                .sequence
                .ranges()
                .iter()
                .map(smallest_magnitude)
                .all(|m| m.to_string().len() >= pad)
    };
    (pad_a == 0 && fits(a, pad_b)) || (pad_b == 0 && fits(b, pad_a))
}

fn smallest_magnitude(range: &FrameRange) -> u64 {
    if range.contains(0) {
        0
    } else {
        range.min.unsigned_abs().min(range.max.unsigned_abs())
    }
}
