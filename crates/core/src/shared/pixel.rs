use serde::{Deserialize, Serialize};

/// Channel layout of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    L,
    La,
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::L => 1,
            PixelFormat::La => 2,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }

    pub fn from_channels(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(PixelFormat::L),
            2 => Some(PixelFormat::La),
            3 => Some(PixelFormat::Rgb),
            4 => Some(PixelFormat::Rgba),
            _ => None,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::La | PixelFormat::Rgba)
    }
}

/// Storage type of one channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    U8,
    /// Three 10-bit values packed into one `u32` per pixel. RGB only.
    U10,
    U16,
    F16,
    F32,
}

impl DataType {
    pub fn is_float(self) -> bool {
        matches!(self, DataType::F16 | DataType::F32)
    }

    /// Bytes used by a single channel value. `U10` reports the size of its
    /// packed word; see [`PixelType::bytes_per_pixel`].
    pub fn byte_count(self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 | DataType::F16 => 2,
            DataType::U10 | DataType::F32 => 4,
        }
    }

    /// Integer code range maximum, `1` for floats.
    pub fn max_value(self) -> u32 {
        match self {
            DataType::U8 => 255,
            DataType::U10 => 1023,
            DataType::U16 => 65535,
            DataType::F16 | DataType::F32 => 1,
        }
    }

    pub fn bit_depth(self) -> u8 {
        match self {
            DataType::U8 => 8,
            DataType::U10 => 10,
            DataType::U16 | DataType::F16 => 16,
            DataType::F32 => 32,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataType::U8 => "U8",
            DataType::U10 => "U10",
            DataType::U16 => "U16",
            DataType::F16 => "F16",
            DataType::F32 => "F32",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelType {
    pub format: PixelFormat,
    pub data_type: DataType,
}

impl PixelType {
    pub const L_U8: PixelType = PixelType::new(PixelFormat::L, DataType::U8);
    pub const L_U16: PixelType = PixelType::new(PixelFormat::L, DataType::U16);
    pub const L_F32: PixelType = PixelType::new(PixelFormat::L, DataType::F32);
    pub const RGB_U8: PixelType = PixelType::new(PixelFormat::Rgb, DataType::U8);
    pub const RGB_U10: PixelType = PixelType::new(PixelFormat::Rgb, DataType::U10);
    pub const RGB_U16: PixelType = PixelType::new(PixelFormat::Rgb, DataType::U16);
    pub const RGB_F16: PixelType = PixelType::new(PixelFormat::Rgb, DataType::F16);
    pub const RGB_F32: PixelType = PixelType::new(PixelFormat::Rgb, DataType::F32);
    pub const RGBA_U8: PixelType = PixelType::new(PixelFormat::Rgba, DataType::U8);
    pub const RGBA_U16: PixelType = PixelType::new(PixelFormat::Rgba, DataType::U16);
    pub const RGBA_F16: PixelType = PixelType::new(PixelFormat::Rgba, DataType::F16);
    pub const RGBA_F32: PixelType = PixelType::new(PixelFormat::Rgba, DataType::F32);

    pub const fn new(format: PixelFormat, data_type: DataType) -> Self {
        Self { format, data_type }
    }

    /// `U10` exists only as packed RGB.
    pub fn is_valid(&self) -> bool {
        self.data_type != DataType::U10 || self.format == PixelFormat::Rgb
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self.data_type {
            DataType::U10 => 4,
            other => other.byte_count() * self.channels(),
        }
    }

    pub fn is_float(&self) -> bool {
        self.data_type.is_float()
    }

    pub fn max_value(&self) -> u32 {
        self.data_type.max_value()
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let format = match self.format {
            PixelFormat::L => "L",
            PixelFormat::La => "LA",
            PixelFormat::Rgb => "RGB",
            PixelFormat::Rgba => "RGBA",
        };
        write!(f, "{format} {}", self.data_type)
    }
}

/// Packs three 10-bit codes the way DPX "filled method A" stores them.
pub fn pack_u10(r: u16, g: u16, b: u16) -> u32 {
    ((r as u32 & 0x3ff) << 22) | ((g as u32 & 0x3ff) << 12) | ((b as u32 & 0x3ff) << 2)
}

pub fn unpack_u10(word: u32) -> [u16; 3] {
    [
        ((word >> 22) & 0x3ff) as u16,
        ((word >> 12) & 0x3ff) as u16,
        ((word >> 2) & 0x3ff) as u16,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::l_u8(PixelType::L_U8, 1)]
    #[case::rgb_u8(PixelType::RGB_U8, 3)]
    #[case::rgb_u10(PixelType::RGB_U10, 4)]
    #[case::rgb_u16(PixelType::RGB_U16, 6)]
    #[case::rgba_f16(PixelType::RGBA_F16, 8)]
    #[case::rgba_f32(PixelType::RGBA_F32, 16)]
    fn test_bytes_per_pixel(#[case] pixel: PixelType, #[case] expected: usize) {
        assert_eq!(pixel.bytes_per_pixel(), expected);
    }

    #[test]
    fn test_u10_only_valid_for_rgb() {
        assert!(PixelType::RGB_U10.is_valid());
        assert!(!PixelType::new(PixelFormat::Rgba, DataType::U10).is_valid());
    }

    #[test]
    fn test_pack_unpack_u10() {
        let word = pack_u10(1023, 512, 1);
        assert_eq!(unpack_u10(word), [1023, 512, 1]);
        assert_eq!(word & 0b11, 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(PixelType::RGBA_F16.to_string(), "RGBA F16");
        assert_eq!(PixelType::L_U8.to_string(), "L U8");
    }

    #[test]
    fn test_from_channels() {
        assert_eq!(PixelFormat::from_channels(2), Some(PixelFormat::La));
        assert_eq!(PixelFormat::from_channels(5), None);
    }
}
