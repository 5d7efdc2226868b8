use std::path::PathBuf;

use exr::image::write::WritableImage;
use exr::image::{AnyChannel, AnyChannels, Encoding, FlatSamples, Layer};
use exr::math::Vec2;
use exr::meta::attribute::{IntegerBounds, Text};
use exr::meta::header::{ImageAttributes, LayerAttributes};
use half::f16;

use crate::codec::domain::io_plugin::{CodecError, ErrorContext, IoInfo, Save};
use crate::codec::infrastructure::openexr::options::ExrOptions;
use crate::codec::infrastructure::openexr::PLUGIN_NAME;
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::convert::convert;
use crate::shared::image::{Image, Tags};
use crate::shared::pixel::{DataType, PixelFormat, PixelType};

/// Writes one single-part OpenEXR file per frame with half or full float
/// channels.
pub struct ExrSave {
    file: FileInfo,
    options: ExrOptions,
}

impl ExrSave {
    pub fn new(file: &FileInfo, info: &IoInfo, options: ExrOptions) -> Result<Self, CodecError> {
        if info.layers.len() > 1 {
            let context = ErrorContext::new(PLUGIN_NAME, file.path_buf());
            return Err(context.refused(format!("{} layers, saving writes one part", info.layers.len())));
        }
        Ok(Self {
            file: file.clone(),
            options,
        })
    }
}

fn channel_names(format: PixelFormat) -> &'static [&'static str] {
    match format {
        PixelFormat::L => &["Y"],
        PixelFormat::La => &["Y", "A"],
        PixelFormat::Rgb => &["R", "G", "B"],
        PixelFormat::Rgba => &["R", "G", "B", "A"],
    }
}

/// Splits interleaved samples into one plane per channel.
fn planes<T: Copy>(samples: &[T], channels: usize) -> Vec<Vec<T>> {
    (0..channels)
        .map(|c| samples.iter().skip(c).step_by(channels).copied().collect())
        .collect()
}

fn layer_attributes(name: &str, tags: &Tags) -> LayerAttributes {
    let mut attributes = match Text::new_or_none(name) {
        Some(text) if !name.is_empty() => LayerAttributes::named(text),
        _ => LayerAttributes::default(),
    };
    let text = |key: &str| tags.get(key).and_then(Text::new_or_none);
    attributes.owner = text("Owner");
    attributes.comments = text("Comments");
    attributes.capture_date = text("Capture Date");
    attributes.software_name = text("Software");
    attributes
}

impl Save for ExrSave {
    fn write(&mut self, image: &Image, frame: Option<i64>) -> Result<(), CodecError> {
        let frame = frame.or_else(|| self.file.sequence().first());
        let path = PathBuf::from(self.file.file_name(frame));
        let context = ErrorContext::new(PLUGIN_NAME, &path);

        let source = image.pixel();
        let data_type = match source.data_type {
            DataType::F32 => DataType::F32,
            _ => DataType::F16,
        };
        let mut data = convert(image, PixelType::new(source.format, data_type));
        if data.info().mirror.x || data.info().mirror.y {
            data.normalize_mirror();
        }

        let names = channel_names(source.format);
        let sample_planes: Vec<FlatSamples> = match data_type {
            DataType::F32 => planes(&data.samples::<f32>(), names.len())
                .into_iter()
                .map(FlatSamples::F32)
                .collect(),
            _ => planes(&data.samples::<f16>(), names.len())
                .into_iter()
                .map(FlatSamples::F16)
                .collect(),
        };
        let channels: Vec<AnyChannel<FlatSamples>> = names
            .iter()
            .zip(sample_planes)
            .map(|(&name, samples)| AnyChannel::new(name, samples))
            .collect();

        let (width, height) = (image.width() as usize, image.height() as usize);
        let encoding = Encoding {
            compression: self.options.compression,
            ..Encoding::UNCOMPRESSED
        };
        let layer = Layer::new(
            (width, height),
            layer_attributes(&image.info().layer_name, image.tags()),
            encoding,
            AnyChannels::sort(channels.into()),
        );
        let mut attributes = ImageAttributes::new(IntegerBounds::new(Vec2(0, 0), Vec2(width, height)));
        if let Some(aspect) = image.tags().get("Pixel Aspect").and_then(|v| v.parse::<f32>().ok()) {
            attributes.pixel_aspect = aspect;
        }

        exr::image::Image::from_layers(attributes, vec![layer])
            .write()
            .to_file(&path)
            .map_err(|e| context.decode(e))?;
        log::debug!("{}: wrote {} as {}", path.display(), source, data_type);
        Ok(())
    }
}
