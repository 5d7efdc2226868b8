use serde::{Deserialize, Serialize};

/// How a frame set is rendered for display and identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressMode {
    /// Every frame listed: `1,3,4`.
    Off,
    /// Consecutive runs collapsed: `1,3-4`.
    #[default]
    Sparse,
    /// Only the outer bounds: `1-4`.
    Range,
}

impl CompressMode {
    pub const ALL: &[CompressMode] = &[CompressMode::Off, CompressMode::Sparse, CompressMode::Range];
}

impl std::fmt::Display for CompressMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressMode::Off => write!(f, "off"),
            CompressMode::Sparse => write!(f, "sparse"),
            CompressMode::Range => write!(f, "range"),
        }
    }
}

impl std::str::FromStr for CompressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(CompressMode::Off),
            "sparse" => Ok(CompressMode::Sparse),
            "range" => Ok(CompressMode::Range),
            other => Err(format!("unknown compress mode: {other}")),
        }
    }
}

/// Inclusive run of consecutive frame numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub min: i64,
    pub max: i64,
}

impl FrameRange {
    pub fn new(a: i64, b: i64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Saturates at `u64::MAX` for a range covering every `i64`.
    pub fn len(&self) -> u64 {
        self.max.abs_diff(self.min).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, frame: i64) -> bool {
        (self.min..=self.max).contains(&frame)
    }
}

/// Ordered, de-duplicated set of frame numbers plus the zero-pad width used
/// when rendering them. Stored as merged inclusive ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSequence {
    ranges: Vec<FrameRange>,
    pad: usize,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_range(a: i64, b: i64, pad: usize) -> Self {
        Self {
            ranges: vec![FrameRange::new(a, b)],
            pad,
        }
    }

    pub fn from_frames(frames: impl IntoIterator<Item = i64>, pad: usize) -> Self {
        let mut out = Self {
            ranges: frames.into_iter().map(|f| FrameRange::new(f, f)).collect(),
            pad,
        };
        out.normalize();
        out
    }

    pub fn ranges(&self) -> &[FrameRange] {
        &self.ranges
    }

    pub fn pad(&self) -> usize {
        self.pad
    }

    pub fn set_pad(&mut self, pad: usize) {
        self.pad = pad;
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Saturates at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(|r| usize::try_from(r.len()).unwrap_or(usize::MAX))
            .fold(0usize, usize::saturating_add)
    }

    pub fn first(&self) -> Option<i64> {
        self.ranges.first().map(|r| r.min)
    }

    pub fn last(&self) -> Option<i64> {
        self.ranges.last().map(|r| r.max)
    }

    pub fn contains(&self, frame: i64) -> bool {
        self.ranges.iter().any(|r| r.contains(frame))
    }

    /// Frame number at a zero-based position in the ordered set.
    pub fn frame_at(&self, index: usize) -> Option<i64> {
        let mut remaining = index as u64;
        for range in &self.ranges {
            if remaining < range.len() {
                return range.min.checked_add_unsigned(remaining);
            }
            remaining -= range.len();
        }
        None
    }

    /// Position of a frame number in the ordered set.
    pub fn index_of(&self, frame: i64) -> Option<usize> {
        let mut offset = 0u64;
        for range in &self.ranges {
            if range.contains(frame) {
                let index = offset.saturating_add(frame.abs_diff(range.min));
                return usize::try_from(index).ok();
            }
            offset = offset.saturating_add(range.len());
        }
        None
    }

    /// Every frame number in ascending order.
    pub fn frames(&self) -> impl Iterator<Item = i64> + '_ {
        self.ranges.iter().flat_map(|r| r.min..=r.max)
    }

    /// Every frame number, ascending.
    pub fn expand(&self) -> Vec<i64> {
        self.frames().collect()
    }

    pub fn add_frame(&mut self, frame: i64) {
        self.add_range(frame, frame);
    }

    pub fn add_range(&mut self, a: i64, b: i64) {
        self.ranges.push(FrameRange::new(a, b));
        self.normalize();
    }

    /// Union with `other`, keeping the larger pad width.
    pub fn merge(&mut self, other: &FrameSequence) {
        self.ranges.extend_from_slice(&other.ranges);
        self.pad = self.pad.max(other.pad);
        self.normalize();
    }

    pub fn format_frame(&self, frame: i64) -> String {
        format_frame(frame, self.pad)
    }

    pub fn compress(&self, mode: CompressMode) -> String {
        let items: Vec<String> = match mode {
            CompressMode::Off => self.frames().map(|f| self.format_frame(f)).collect(),
            CompressMode::Sparse => self.ranges.iter().map(|r| self.format_range(*r)).collect(),
            CompressMode::Range => match (self.first(), self.last()) {
                (Some(min), Some(max)) => vec![self.format_range(FrameRange::new(min, max))],
                _ => Vec::new(),
            },
        };
        items.join(",")
    }

    /// Parses `1,3-4`, `001-100`, `-3--1` style notation. Anything that is not
    /// valid notation yields an empty sequence; callers treat that as a plain
    /// file name.
    pub fn parse(text: &str) -> Self {
        let mut out = Self::new();
        if text.is_empty() {
            return out;
        }
        for item in text.split(',') {
            match parse_item(item) {
                Some((a, b, pad)) => {
                    out.ranges.push(FrameRange::new(a, b));
                    out.pad = out.pad.max(pad);
                }
                None => return Self::new(),
            }
        }
        out.normalize();
        out
    }

    fn format_range(&self, range: FrameRange) -> String {
        if range.min == range.max {
            self.format_frame(range.min)
        } else {
            format!("{}-{}", self.format_frame(range.min), self.format_frame(range.max))
        }
    }

    fn normalize(&mut self) {
        self.ranges.sort_by_key(|r| (r.min, r.max));
        let mut merged: Vec<FrameRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if range.min <= last.max.saturating_add(1) => {
                    last.max = last.max.max(range.max);
                }
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }
}

impl std::fmt::Display for FrameSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.compress(CompressMode::Sparse))
    }
}

/// Zero pads the digits of `frame`; the sign is not counted in the width.
pub fn format_frame(frame: i64, pad: usize) -> String {
    if frame < 0 {
        format!("-{:0pad$}", frame.unsigned_abs())
    } else {
        format!("{frame:0pad$}")
    }
}

/// Width implied by a number's digits: zero-led numbers pin the width.
pub fn detect_pad(digits: &str) -> usize {
    let digits = digits.strip_prefix('-').unwrap_or(digits);
    if digits.len() > 1 && digits.starts_with('0') {
        digits.len()
    } else {
        0
    }
}

fn parse_number(text: &str) -> Option<(i64, usize)> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = text.parse().ok()?;
    Some((value, detect_pad(text)))
}

/// One comma item: `N`, `-N`, `A-B`, `-A--B`.
fn parse_item(item: &str) -> Option<(i64, i64, usize)> {
    if let Some((value, pad)) = parse_number(item) {
        return Some((value, value, pad));
    }
    // The range separator is the first '-' that is not a leading sign.
    let search_from = usize::from(item.starts_with('-'));
    let split = item[search_from..].find('-')? + search_from;
    let (a, pad_a) = parse_number(&item[..split])?;
    let (b, pad_b) = parse_number(&item[split + 1..])?;
    Some((a, b, pad_a.max(pad_b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::off(CompressMode::Off, "1,3,4")]
    #[case::sparse(CompressMode::Sparse, "1,3-4")]
    #[case::range(CompressMode::Range, "1-4")]
    fn test_compress_modes(#[case] mode: CompressMode, #[case] expected: &str) {
        let seq = FrameSequence::from_frames([4, 1, 3], 0);
        assert_eq!(seq.compress(mode), expected);
    }

    #[test]
    fn test_from_frames_sorts_and_dedups() {
        let seq = FrameSequence::from_frames([5, 1, 2, 2, 3], 0);
        assert_eq!(seq.frames().collect::<Vec<_>>(), vec![1, 2, 3, 5]);
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.ranges().len(), 2);
    }

    #[rstest]
    #[case::single("7", vec![7], 0)]
    #[case::zero("0", vec![0], 0)]
    #[case::padded_range("001-003", vec![1, 2, 3], 3)]
    #[case::sparse("1,3-4", vec![1, 3, 4], 0)]
    #[case::reverse_range("5-3", vec![3, 4, 5], 0)]
    #[case::negative("-2", vec![-2], 0)]
    #[case::negative_range("-3--1", vec![-3, -2, -1], 0)]
    #[case::crossing_zero("-1-1", vec![-1, 0, 1], 0)]
    fn test_parse(#[case] text: &str, #[case] frames: Vec<i64>, #[case] pad: usize) {
        let seq = FrameSequence::parse(text);
        assert_eq!(seq.frames().collect::<Vec<_>>(), frames);
        assert_eq!(seq.pad(), pad);
    }

    #[rstest]
    #[case::empty("")]
    #[case::letters("abc")]
    #[case::dangling_separator("1-")]
    #[case::hashes("####")]
    #[case::bad_item("1,x")]
    fn test_parse_invalid_is_empty(#[case] text: &str) {
        assert!(FrameSequence::parse(text).is_empty());
    }

    #[test]
    fn test_padded_compress() {
        let seq = FrameSequence::from_frames([8, 9, 10, 12], 4);
        assert_eq!(seq.compress(CompressMode::Sparse), "0008-0010,0012");
    }

    #[test]
    fn test_negative_padding_excludes_sign() {
        assert_eq!(format_frame(-5, 3), "-005");
        assert_eq!(format_frame(5, 0), "5");
        assert_eq!(detect_pad("-005"), 3);
    }

    #[rstest]
    #[case::contiguous(vec![1, 2, 3, 4])]
    #[case::gaps(vec![1, 3, 4, 10, 11, 20])]
    #[case::negatives(vec![-10, -9, -1, 0, 1])]
    #[case::single(vec![42])]
    fn test_compress_expand_idempotent(#[case] frames: Vec<i64>) {
        let seq = FrameSequence::from_frames(frames, 0);
        for &mode in CompressMode::ALL {
            let text = seq.compress(mode);
            let expanded = FrameSequence::parse(&text).expand();
            let again = FrameSequence::from_frames(expanded, seq.pad()).compress(mode);
            assert_eq!(again, text, "mode {mode}");
        }
    }

    #[test]
    fn test_frame_at_and_index_of() {
        let seq = FrameSequence::parse("1-3,10");
        assert_eq!(seq.frame_at(0), Some(1));
        assert_eq!(seq.frame_at(3), Some(10));
        assert_eq!(seq.frame_at(4), None);
        assert_eq!(seq.index_of(10), Some(3));
        assert_eq!(seq.index_of(5), None);
    }

    #[test]
    fn test_full_width_range_saturates() {
        let seq = FrameSequence::parse("-9223372036854775808-9223372036854775807");
        assert_eq!(seq.first(), Some(i64::MIN));
        assert_eq!(seq.last(), Some(i64::MAX));
        assert_eq!(seq.ranges()[0].len(), u64::MAX);
        assert_eq!(seq.len(), usize::MAX);
        assert_eq!(seq.frame_at(3), Some(i64::MIN + 3));
        assert_eq!(seq.index_of(i64::MIN + 3), Some(3));

        let top = FrameSequence::parse("9223372036854775806-9223372036854775807");
        assert_eq!(top.len(), 2);
        assert_eq!(top.frame_at(1), Some(i64::MAX));
        assert_eq!(top.index_of(i64::MAX), Some(1));
    }

    #[test]
    fn test_merge_keeps_larger_pad() {
        let mut a = FrameSequence::from_frames([1, 2], 0);
        let b = FrameSequence::from_frames([3, 7], 4);
        a.merge(&b);
        assert_eq!(a.pad(), 4);
        assert_eq!(a.compress(CompressMode::Sparse), "0001-0003,0007");
    }

    #[test]
    fn test_compress_mode_from_str() {
        assert_eq!("Range".parse::<CompressMode>(), Ok(CompressMode::Range));
        assert!("bogus".parse::<CompressMode>().is_err());
    }
}
