use half::f16;

use crate::shared::image::Image;
use crate::shared::pixel::{pack_u10, unpack_u10, DataType, PixelFormat, PixelType};

/// Rec. 709 luma weights used when collapsing color to luminance.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Converts `image` to another pixel type through normalized floats.
///
/// Integer codes map to 0..1 by their maximum value; float values pass
/// through unclamped except when written to an integer type. Missing alpha
/// becomes opaque, luminance is replicated to RGB.
pub fn convert(image: &Image, pixel: PixelType) -> Image {
    if image.pixel() == pixel {
        return image.clone();
    }
    let mut info = image.info().clone();
    info.pixel = pixel;
    let mut out = Image::zeroed(info);

    let src_pixel = image.pixel();
    let src_bpp = src_pixel.bytes_per_pixel();
    let dst_bpp = pixel.bytes_per_pixel();
    for (src, dst) in image
        .data()
        .chunks_exact(src_bpp)
        .zip(out.data_mut().chunks_exact_mut(dst_bpp))
    {
        let rgba = read_pixel(src, src_pixel);
        write_pixel(dst, pixel, rgba);
    }
    out
}

/// One pixel as normalized RGBA.
pub fn read_pixel(bytes: &[u8], pixel: PixelType) -> [f32; 4] {
    if pixel.data_type == DataType::U10 {
        let word = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let [r, g, b] = unpack_u10(word);
        return [r as f32 / 1023.0, g as f32 / 1023.0, b as f32 / 1023.0, 1.0];
    }
    let size = pixel.data_type.byte_count();
    let mut values = [0.0f32; 4];
    for (c, value) in values.iter_mut().take(pixel.channels()).enumerate() {
        *value = read_sample(&bytes[c * size..(c + 1) * size], pixel.data_type);
    }
    match pixel.format {
        PixelFormat::L => [values[0], values[0], values[0], 1.0],
        PixelFormat::La => [values[0], values[0], values[0], values[1]],
        PixelFormat::Rgb => [values[0], values[1], values[2], 1.0],
        PixelFormat::Rgba => values,
    }
}

pub fn write_pixel(bytes: &mut [u8], pixel: PixelType, rgba: [f32; 4]) {
    if pixel.data_type == DataType::U10 {
        let code = |v: f32| (v.clamp(0.0, 1.0) * 1023.0).round() as u16;
        let word = pack_u10(code(rgba[0]), code(rgba[1]), code(rgba[2]));
        bytes[..4].copy_from_slice(&word.to_ne_bytes());
        return;
    }
    let luma = rgba[0] * LUMA[0] + rgba[1] * LUMA[1] + rgba[2] * LUMA[2];
    let values = match pixel.format {
        PixelFormat::L => [luma, 0.0, 0.0, 0.0],
        PixelFormat::La => [luma, rgba[3], 0.0, 0.0],
        PixelFormat::Rgb | PixelFormat::Rgba => rgba,
    };
    let size = pixel.data_type.byte_count();
    for (c, &value) in values.iter().take(pixel.channels()).enumerate() {
        write_sample(&mut bytes[c * size..(c + 1) * size], pixel.data_type, value);
    }
}

fn read_sample(bytes: &[u8], data_type: DataType) -> f32 {
    match data_type {
        DataType::U8 => bytes[0] as f32 / 255.0,
        DataType::U16 => u16::from_ne_bytes([bytes[0], bytes[1]]) as f32 / 65535.0,
        DataType::F16 => f16::from_ne_bytes([bytes[0], bytes[1]]).to_f32(),
        DataType::F32 => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        // Packed words are handled per pixel.
        DataType::U10 => 0.0,
    }
}

fn write_sample(bytes: &mut [u8], data_type: DataType, value: f32) {
    match data_type {
        DataType::U8 => bytes[0] = (value.clamp(0.0, 1.0) * 255.0).round() as u8,
        DataType::U16 => {
            let code = (value.clamp(0.0, 1.0) * 65535.0).round() as u16;
            bytes.copy_from_slice(&code.to_ne_bytes());
        }
        DataType::F16 => bytes.copy_from_slice(&f16::from_f32(value).to_ne_bytes()),
        DataType::F32 => bytes.copy_from_slice(&value.to_ne_bytes()),
        DataType::U10 => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::image::ImageInfo;
    use approx::assert_relative_eq;

    #[test]
    fn test_same_type_is_a_copy() {
        let info = ImageInfo::new(1, 1, PixelType::RGB_U8);
        let image = Image::new(info, vec![1, 2, 3]).unwrap();
        assert_eq!(convert(&image, PixelType::RGB_U8), image);
    }

    #[test]
    fn test_u8_to_u16_scales_codes() {
        let info = ImageInfo::new(1, 1, PixelType::RGB_U8);
        let image = Image::new(info, vec![0, 255, 51]).unwrap();
        let out = convert(&image, PixelType::RGB_U16);
        assert_eq!(out.samples::<u16>(), vec![0, 65535, 13107]);
    }

    #[test]
    fn test_rgb_to_rgba_adds_opaque_alpha() {
        let info = ImageInfo::new(1, 1, PixelType::RGB_F32);
        let image = Image::from_samples(info, &[0.25f32, 0.5, 0.75]).unwrap();
        let out = convert(&image, PixelType::RGBA_F32);
        assert_eq!(out.samples::<f32>(), vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_luminance_replicates_to_rgb() {
        let info = ImageInfo::new(2, 1, PixelType::L_U8);
        let image = Image::new(info, vec![10, 200]).unwrap();
        let out = convert(&image, PixelType::RGB_U8);
        assert_eq!(out.data(), &[10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_rgb_u16_to_u10_packs() {
        let info = ImageInfo::new(1, 1, PixelType::RGB_U16);
        let image = Image::from_samples(info, &[0u16, 65535, 32768]).unwrap();
        let out = convert(&image, PixelType::RGB_U10);
        let word = u32::from_ne_bytes(out.data().try_into().unwrap());
        assert_eq!(unpack_u10(word), [0, 1023, 512]);
    }

    #[test]
    fn test_f16_to_f32() {
        let info = ImageInfo::new(1, 1, PixelType::RGB_F16);
        let samples = [f16::from_f32(0.5), f16::from_f32(2.0), f16::from_f32(-1.0)];
        let image = Image::from_samples(info, &samples).unwrap();
        let out = convert(&image, PixelType::RGB_F32).samples::<f32>();
        assert_relative_eq!(out[0], 0.5);
        assert_relative_eq!(out[1], 2.0);
        assert_relative_eq!(out[2], -1.0);
    }
}
