use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::byte_order::Endian;
use crate::shared::pixel::PixelType;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    #[error("pixel data is {actual} bytes, expected {expected} for {width}x{height} {pixel}")]
    SizeMismatch {
        width: u32,
        height: u32,
        pixel: PixelType,
        expected: usize,
        actual: usize,
    },
    #[error("invalid pixel type {0}")]
    InvalidPixel(PixelType),
}

/// Free-form image metadata (timecode, creator, film/TV header fields, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    pub x: bool,
    pub y: bool,
}

/// Power-of-two downscale applied while decoding previews.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Proxy {
    #[default]
    None,
    Half,
    Quarter,
    Eighth,
}

impl Proxy {
    pub fn scale(self) -> u32 {
        match self {
            Proxy::None => 1,
            Proxy::Half => 2,
            Proxy::Quarter => 4,
            Proxy::Eighth => 8,
        }
    }

    pub fn from_scale(scale: u32) -> Option<Self> {
        match scale {
            1 => Some(Proxy::None),
            2 => Some(Proxy::Half),
            4 => Some(Proxy::Quarter),
            8 => Some(Proxy::Eighth),
            _ => None,
        }
    }

    /// Size of one dimension after scaling, never below one pixel.
    pub fn scale_dimension(self, value: u32) -> u32 {
        let scale = self.scale();
        value.div_ceil(scale).max(1)
    }
}

/// Describes one decoded image or one layer of a multi-layer file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub file_name: String,
    pub layer_name: String,
    pub width: u32,
    pub height: u32,
    pub pixel: PixelType,
    pub mirror: Mirror,
    pub proxy: Proxy,
    /// Byte order of the file the image came from; buffers are always host order.
    pub endian: Endian,
    pub tags: Tags,
}

impl ImageInfo {
    pub fn new(width: u32, height: u32, pixel: PixelType) -> Self {
        Self {
            file_name: String::new(),
            layer_name: String::new(),
            width,
            height,
            pixel,
            mirror: Mirror::default(),
            proxy: Proxy::None,
            endian: Endian::host(),
            tags: Tags::new(),
        }
    }

    pub fn row_byte_count(&self) -> usize {
        self.width as usize * self.pixel.bytes_per_pixel()
    }

    pub fn byte_count(&self) -> usize {
        self.row_byte_count() * self.height as usize
    }

    /// Layout equality, ignoring names and metadata.
    pub fn same_layout(&self, other: &ImageInfo) -> bool {
        self.width == other.width && self.height == other.height && self.pixel == other.pixel
    }
}

/// Owned, contiguous, host-endian pixel buffer plus its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    info: ImageInfo,
    data: Vec<u8>,
}

impl Image {
    pub fn new(info: ImageInfo, data: Vec<u8>) -> Result<Self, ImageError> {
        if !info.pixel.is_valid() {
            return Err(ImageError::InvalidPixel(info.pixel));
        }
        let expected = info.byte_count();
        if data.len() != expected {
            return Err(ImageError::SizeMismatch {
                width: info.width,
                height: info.height,
                pixel: info.pixel,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { info, data })
    }

    pub fn zeroed(info: ImageInfo) -> Self {
        let data = vec![0u8; info.byte_count()];
        Self { info, data }
    }

    /// Builds an image from typed samples (`u16`, `f32`, `half::f16`, ...).
    pub fn from_samples<T: bytemuck::Pod>(info: ImageInfo, samples: &[T]) -> Result<Self, ImageError> {
        Self::new(info, bytemuck::cast_slice::<T, u8>(samples).to_vec())
    }

    /// Copies the buffer out as typed samples. The buffer has no alignment
    /// guarantee, so values are read unaligned.
    pub fn samples<T: bytemuck::Pod>(&self) -> Vec<T> {
        self.data
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut ImageInfo {
        &mut self.info
    }

    pub fn tags(&self) -> &Tags {
        &self.info.tags
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn pixel(&self) -> PixelType {
        self.info.pixel
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.info.row_byte_count();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.info.row_byte_count();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Applies and clears the mirror flags so row 0 is the top of the image.
    pub fn normalize_mirror(&mut self) {
        let stride = self.info.row_byte_count();
        let height = self.info.height as usize;
        if self.info.mirror.y && stride > 0 {
            for y in 0..height / 2 {
                let (top, bottom) = self.data.split_at_mut((height - 1 - y) * stride);
                top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
            }
        }
        if self.info.mirror.x && stride > 0 {
            let bpp = self.info.pixel.bytes_per_pixel();
            let width = self.info.width as usize;
            for row in self.data.chunks_exact_mut(stride) {
                for x in 0..width / 2 {
                    let (left, right) = row.split_at_mut((width - 1 - x) * bpp);
                    left[x * bpp..(x + 1) * bpp].swap_with_slice(&mut right[..bpp]);
                }
            }
        }
        self.info.mirror = Mirror::default();
    }

    /// Nearest-neighbour downscale by the proxy factor.
    pub fn proxy_scale(&self, proxy: Proxy) -> Image {
        if proxy == Proxy::None {
            return self.clone();
        }
        let scale = proxy.scale() as usize;
        let bpp = self.info.pixel.bytes_per_pixel();
        let mut info = self.info.clone();
        info.width = proxy.scale_dimension(self.info.width);
        info.height = proxy.scale_dimension(self.info.height);
        info.proxy = proxy;

        let mut out = Image::zeroed(info);
        for y in 0..out.info.height {
            let src_row = self.row((y as usize * scale) as u32);
            let dst_row = out.row_mut(y);
            for (x, dst) in dst_row.chunks_exact_mut(bpp).enumerate() {
                let sx = x * scale * bpp;
                dst.copy_from_slice(&src_row[sx..sx + bpp]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::pixel::PixelType;

    fn gradient(width: u32, height: u32) -> Image {
        let info = ImageInfo::new(width, height, PixelType::L_U8);
        let data = (0..width * height).map(|i| i as u8).collect();
        Image::new(info, data).unwrap()
    }

    #[test]
    fn test_construction_and_accessors() {
        let info = ImageInfo::new(2, 2, PixelType::RGB_U8);
        let image = Image::new(info, vec![7u8; 12]).unwrap();
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 2);
        assert_eq!(image.byte_count(), 12);
        assert_eq!(image.row(1), &[7u8; 6]);
    }

    #[test]
    fn test_mismatched_data_length_is_rejected() {
        let info = ImageInfo::new(2, 2, PixelType::RGB_U16);
        let err = Image::new(info, vec![0u8; 12]).unwrap_err();
        assert!(matches!(err, ImageError::SizeMismatch { expected: 24, actual: 12, .. }));
    }

    #[test]
    fn test_samples_round_trip_f32() {
        let info = ImageInfo::new(2, 1, PixelType::L_F32);
        let image = Image::from_samples(info, &[0.25f32, -1.5]).unwrap();
        assert_eq!(image.samples::<f32>(), vec![0.25, -1.5]);
    }

    #[test]
    fn test_normalize_mirror_y_flips_rows() {
        let mut image = gradient(2, 3);
        image.info_mut().mirror.y = true;
        image.normalize_mirror();
        assert_eq!(image.data(), &[4, 5, 2, 3, 0, 1]);
        assert!(!image.info().mirror.y);
    }

    #[test]
    fn test_normalize_mirror_x_flips_columns() {
        let mut image = gradient(3, 1);
        image.info_mut().mirror.x = true;
        image.normalize_mirror();
        assert_eq!(image.data(), &[2, 1, 0]);
    }

    #[test]
    fn test_proxy_scale_picks_nearest() {
        let image = gradient(4, 4);
        let half = image.proxy_scale(Proxy::Half);
        assert_eq!(half.width(), 2);
        assert_eq!(half.height(), 2);
        assert_eq!(half.data(), &[0, 2, 8, 10]);
        assert_eq!(half.info().proxy, Proxy::Half);
    }

    #[test]
    fn test_proxy_scale_rounds_up_and_keeps_one_pixel() {
        let image = gradient(3, 1);
        let eighth = image.proxy_scale(Proxy::Eighth);
        assert_eq!((eighth.width(), eighth.height()), (1, 1));
        let half = image.proxy_scale(Proxy::Half);
        assert_eq!(half.data(), &[0, 2]);
    }

    #[test]
    fn test_tags() {
        let mut tags = Tags::new();
        tags.set("Creator", "seqio");
        assert_eq!(tags.get("Creator"), Some("seqio"));
        assert!(!tags.contains("Project"));
        assert_eq!(tags.len(), 1);
    }
}
