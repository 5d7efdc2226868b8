use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage, ImageError as DecodeError};

use crate::codec::domain::io_plugin::{
    resolve_frame_path, CodecError, ErrorContext, IoInfo, IoPlugin, Load, ReadRequest, Save,
};
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::convert::convert;
use crate::shared::image::{Image, ImageInfo, Proxy};
use crate::shared::pixel::{DataType, PixelFormat, PixelType};

pub const PLUGIN_NAME: &str = "Still";

fn decode_error(context: &ErrorContext, error: DecodeError) -> CodecError {
    match error {
        DecodeError::Unsupported(e) => context.unsupported(e.to_string()),
        e => context.decode(e),
    }
}

/// Decodes a still image, keeping its channel layout and bit depth when
/// they have a direct equivalent.
fn decode(path: &Path, context: &ErrorContext) -> Result<Image, CodecError> {
    let decoded = image::open(path).map_err(|e| decode_error(context, e))?;
    let (width, height) = (decoded.width(), decoded.height());
    let info = |pixel: PixelType| {
        let mut info = ImageInfo::new(width, height, pixel);
        info.file_name = path.to_string_lossy().into_owned();
        info
    };
    let result = match decoded {
        DynamicImage::ImageLuma8(b) => Image::new(info(PixelType::L_U8), b.into_raw()),
        DynamicImage::ImageLumaA8(b) => Image::new(info(PixelType::new(PixelFormat::La, DataType::U8)), b.into_raw()),
        DynamicImage::ImageRgb8(b) => Image::new(info(PixelType::RGB_U8), b.into_raw()),
        DynamicImage::ImageRgba8(b) => Image::new(info(PixelType::RGBA_U8), b.into_raw()),
        DynamicImage::ImageLuma16(b) => Image::from_samples(info(PixelType::L_U16), &b.into_raw()),
        DynamicImage::ImageLumaA16(b) => {
            Image::from_samples(info(PixelType::new(PixelFormat::La, DataType::U16)), &b.into_raw())
        }
        DynamicImage::ImageRgb16(b) => Image::from_samples(info(PixelType::RGB_U16), &b.into_raw()),
        DynamicImage::ImageRgba16(b) => Image::from_samples(info(PixelType::RGBA_U16), &b.into_raw()),
        DynamicImage::ImageRgb32F(b) => Image::from_samples(info(PixelType::RGB_F32), &b.into_raw()),
        DynamicImage::ImageRgba32F(b) => Image::from_samples(info(PixelType::RGBA_F32), &b.into_raw()),
        other => Image::new(info(PixelType::RGBA_U8), other.to_rgba8().into_raw()),
    };
    result.map_err(|e| context.image(e))
}

pub struct StillLoad {
    file: FileInfo,
    info: IoInfo,
}

impl StillLoad {
    pub fn open(file: &FileInfo) -> Result<Self, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, file, None)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        let image = decode(&path, &context)?;
        Ok(Self {
            file: file.clone(),
            info: IoInfo::new(image.info().clone()).with_sequence(file.sequence().clone()),
        })
    }
}

impl Load for StillLoad {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &ReadRequest) -> Result<Image, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, &self.file, request.frame)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        if request.layer != 0 {
            return Err(context.layer(request.layer, 1));
        }
        let image = decode(&path, &context)?;
        Ok(match request.proxy {
            Proxy::None => image,
            proxy => image.proxy_scale(proxy),
        })
    }
}

/// Pixel type the encoder for `extension` accepts closest to `pixel`.
fn target_pixel(extension: &str, pixel: PixelType) -> PixelType {
    match extension {
        ".jpg" | ".jpeg" => {
            let format = match pixel.format {
                PixelFormat::L | PixelFormat::La => PixelFormat::L,
                _ => PixelFormat::Rgb,
            };
            PixelType::new(format, DataType::U8)
        }
        ".bmp" => PixelType::new(pixel.format, DataType::U8),
        ".tif" | ".tiff" if pixel.is_float() && pixel.channels() >= 3 => PixelType::new(pixel.format, DataType::F32),
        _ => {
            let data_type = match pixel.data_type {
                DataType::U8 => DataType::U8,
                _ => DataType::U16,
            };
            PixelType::new(pixel.format, data_type)
        }
    }
}

fn color_type(pixel: PixelType) -> Option<ColorType> {
    Some(match (pixel.format, pixel.data_type) {
        (PixelFormat::L, DataType::U8) => ColorType::L8,
        (PixelFormat::La, DataType::U8) => ColorType::La8,
        (PixelFormat::Rgb, DataType::U8) => ColorType::Rgb8,
        (PixelFormat::Rgba, DataType::U8) => ColorType::Rgba8,
        (PixelFormat::L, DataType::U16) => ColorType::L16,
        (PixelFormat::La, DataType::U16) => ColorType::La16,
        (PixelFormat::Rgb, DataType::U16) => ColorType::Rgb16,
        (PixelFormat::Rgba, DataType::U16) => ColorType::Rgba16,
        (PixelFormat::Rgb, DataType::F32) => ColorType::Rgb32F,
        (PixelFormat::Rgba, DataType::F32) => ColorType::Rgba32F,
        _ => return None,
    })
}

pub struct StillSave {
    file: FileInfo,
}

impl StillSave {
    pub fn new(file: &FileInfo, info: &IoInfo) -> Result<Self, CodecError> {
        if info.layers.len() > 1 {
            let context = ErrorContext::new(PLUGIN_NAME, file.path_buf());
            return Err(context.refused(format!("{} layers, still images store one", info.layers.len())));
        }
        Ok(Self { file: file.clone() })
    }
}

impl Save for StillSave {
    fn write(&mut self, image: &Image, frame: Option<i64>) -> Result<(), CodecError> {
        let frame = frame.or_else(|| self.file.sequence().first());
        let path = PathBuf::from(self.file.file_name(frame));
        let context = ErrorContext::new(PLUGIN_NAME, &path);

        let pixel = target_pixel(&self.file.extension().to_ascii_lowercase(), image.pixel());
        let color = color_type(pixel).ok_or_else(|| context.refused(format!("{pixel} images")))?;
        let mut data = convert(image, pixel);
        if data.info().mirror.x || data.info().mirror.y {
            data.normalize_mirror();
        }
        image::save_buffer(&path, data.data(), data.width(), data.height(), color)
            .map_err(|e| decode_error(&context, e))?;
        log::debug!("{}: wrote {}", path.display(), pixel);
        Ok(())
    }
}

/// Common still formats through the `image` crate. Registered last so the
/// dedicated plugins keep their extensions.
#[derive(Debug, Default)]
pub struct StillImagePlugin;

impl StillImagePlugin {
    pub fn new() -> Self {
        Self
    }
}

impl IoPlugin for StillImagePlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn extensions(&self) -> &[&'static str] {
        IMAGE_EXTENSIONS
    }

    fn create_load(&self, file: &FileInfo) -> Result<Box<dyn Load>, CodecError> {
        Ok(Box::new(StillLoad::open(file)?))
    }

    fn create_save(&self, file: &FileInfo, info: &IoInfo) -> Result<Box<dyn Save>, CodecError> {
        Ok(Box::new(StillSave::new(file, info)?))
    }
}
