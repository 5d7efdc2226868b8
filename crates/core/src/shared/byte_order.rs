use serde::{Deserialize, Serialize};

/// Byte order of multi-byte values in a serialized stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endian {
    /// Most significant byte first (big endian).
    Msb,
    /// Least significant byte first (little endian).
    Lsb,
}

impl Endian {
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Msb
        } else {
            Endian::Lsb
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Endian::Msb => Endian::Lsb,
            Endian::Lsb => Endian::Msb,
        }
    }

    /// True when data in this byte order must be swapped to reach host order.
    pub fn needs_swap(self) -> bool {
        self != Endian::host()
    }
}

impl std::fmt::Display for Endian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endian::Msb => write!(f, "MSB"),
            Endian::Lsb => write!(f, "LSB"),
        }
    }
}

/// Returns a copy of `input` with every `element_size`-byte element reversed.
///
/// Element sizes of 0 or 1 return the input unchanged. A trailing partial
/// element (input length not a multiple of the element size) is copied as is.
pub fn swap_bytes(input: &[u8], element_size: usize) -> Vec<u8> {
    let mut out = input.to_vec();
    swap_bytes_in_place(&mut out, element_size);
    out
}

/// In-place form of [`swap_bytes`], used at the I/O boundary.
pub fn swap_bytes_in_place(data: &mut [u8], element_size: usize) {
    if element_size <= 1 {
        return;
    }
    for chunk in data.chunks_exact_mut(element_size) {
        chunk.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_host_matches_target() {
        let one = 1u16.to_ne_bytes();
        let expected = if one[0] == 1 { Endian::Lsb } else { Endian::Msb };
        assert_eq!(Endian::host(), expected);
        assert!(!Endian::host().needs_swap());
        assert!(Endian::host().opposite().needs_swap());
    }

    #[rstest]
    #[case::u16(2, vec![1, 2, 3, 4], vec![2, 1, 4, 3])]
    #[case::u32(4, vec![1, 2, 3, 4, 5, 6, 7, 8], vec![4, 3, 2, 1, 8, 7, 6, 5])]
    #[case::single_byte(1, vec![1, 2, 3], vec![1, 2, 3])]
    #[case::zero_size(0, vec![9, 8], vec![9, 8])]
    #[case::partial_tail(2, vec![1, 2, 3], vec![2, 1, 3])]
    fn test_swap_bytes(#[case] size: usize, #[case] input: Vec<u8>, #[case] expected: Vec<u8>) {
        assert_eq!(swap_bytes(&input, size), expected);
    }

    #[test]
    fn test_swap_bytes_leaves_input_untouched() {
        let input = vec![0xAA, 0xBB];
        let _ = swap_bytes(&input, 2);
        assert_eq!(input, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_swap_matches_std_conversion() {
        let value = 0x1234_5678u32;
        let swapped = swap_bytes(&value.to_be_bytes(), 4);
        assert_eq!(swapped, value.to_le_bytes());
    }
}
