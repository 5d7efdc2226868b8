use std::path::PathBuf;

use crate::codec::domain::io_plugin::{CodecError, ErrorContext, IoInfo, Save};
use crate::codec::infrastructure::rla::header::{Header, CHANNEL_FLOAT, CHANNEL_INT, HEADER_SIZE};
use crate::codec::infrastructure::rla::rle;
use crate::codec::infrastructure::rla::PLUGIN_NAME;
use crate::io::file_io::{FileIo, OpenMode};
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::convert::convert;
use crate::shared::image::Image;
use crate::shared::pixel::{DataType, PixelType};

/// A file whose scanline offset table is still zero.
struct Pending {
    io: FileIo,
    offsets: Vec<i32>,
}

/// Writes RLA files. The offset table after the header is reserved when a
/// frame starts and filled in once its scanlines are written.
pub struct RlaSave {
    file: FileInfo,
    current: Option<Pending>,
}

impl RlaSave {
    pub fn new(file: &FileInfo, info: &IoInfo) -> Result<Self, CodecError> {
        if info.layers.len() > 1 {
            let context = ErrorContext::new(PLUGIN_NAME, file.path_buf());
            return Err(context.refused(format!("{} layers, RLA stores one", info.layers.len())));
        }
        Ok(Self {
            file: file.clone(),
            current: None,
        })
    }

    fn finish_current(&mut self) -> Result<(), CodecError> {
        let Some(mut pending) = self.current.take() else {
            return Ok(());
        };
        let context = ErrorContext::new(PLUGIN_NAME, pending.io.path());
        pending.io.set_pos(HEADER_SIZE).map_err(|e| context.io(e))?;
        for offset in &pending.offsets {
            pending.io.write_i32(*offset).map_err(|e| context.io(e))?;
        }
        pending.io.close();
        Ok(())
    }
}

fn target_pixel(pixel: PixelType) -> PixelType {
    let data_type = match pixel.data_type {
        DataType::U8 => DataType::U8,
        DataType::U10 | DataType::U16 => DataType::U16,
        DataType::F16 | DataType::F32 => DataType::F32,
    };
    PixelType::new(pixel.format, data_type)
}

/// Largest channel payload a scanline of `width` samples can need.
fn worst_case_payload(width: usize, data_type: DataType) -> usize {
    match data_type {
        DataType::F32 => width * 4,
        other => other.byte_count() * (width + width.div_ceil(128)),
    }
}

/// One channel of a row as file bytes: byte-plane RLE for integers, raw
/// big-endian floats otherwise.
fn encode_channel(row: &[u8], pixel: PixelType, channel: usize) -> Vec<u8> {
    let channels = pixel.channels();
    match pixel.data_type {
        DataType::U8 => {
            let values: Vec<u32> = row.iter().skip(channel).step_by(channels).map(|&v| v as u32).collect();
            rle::encode(&values, 1)
        }
        DataType::U16 => {
            let values: Vec<u32> = row
                .chunks_exact(2)
                .skip(channel)
                .step_by(channels)
                .map(|b| u16::from_ne_bytes([b[0], b[1]]) as u32)
                .collect();
            rle::encode(&values, 2)
        }
        _ => row
            .chunks_exact(4)
            .skip(channel)
            .step_by(channels)
            .flat_map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]).to_be_bytes())
            .collect(),
    }
}

impl Save for RlaSave {
    fn write(&mut self, image: &Image, frame: Option<i64>) -> Result<(), CodecError> {
        self.finish_current()?;

        let frame = frame.or_else(|| self.file.sequence().first());
        let path = PathBuf::from(self.file.file_name(frame));
        let context = ErrorContext::new(PLUGIN_NAME, &path);

        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 || width > i16::MAX as u32 || height > i16::MAX as u32 {
            return Err(context.refused(format!("{width}x{height} does not fit the RLA window")));
        }
        let pixel = target_pixel(image.pixel());
        if worst_case_payload(width as usize, pixel.data_type) > u16::MAX as usize {
            return Err(context.refused(format!("scanlines of {width} {} samples are too long", pixel.data_type)));
        }

        let mut data = convert(image, pixel);
        if data.info().mirror.x || data.info().mirror.y {
            data.normalize_mirror();
        }

        let has_alpha = pixel.format.has_alpha();
        let bit_depth = (pixel.data_type.byte_count() * 8) as i16;
        let channel_type = if pixel.is_float() { CHANNEL_FLOAT } else { CHANNEL_INT };
        let mut header = Header::for_save(width, height);
        header.frame = frame.unwrap_or(1) as i16;
        header.color_channels = (pixel.channels() - has_alpha as usize) as i16;
        header.matte_channels = has_alpha as i16;
        header.color_channel_type = channel_type;
        header.matte_channel_type = channel_type;
        header.color_bit_depth = bit_depth;
        header.matte_bit_depth = bit_depth;
        header.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        header.apply_tags(image.tags());

        let mut io = FileIo::open(&path, OpenMode::Write).map_err(|e| context.io(e))?;
        header.write(&mut io).map_err(|e| context.io(e))?;
        io.write_bytes(&vec![0u8; height as usize * 4]).map_err(|e| context.io(e))?;

        let mut offsets = Vec::with_capacity(height as usize);
        for y in (0..height).rev() {
            offsets.push(io.pos() as i32);
            let row = data.row(y);
            for channel in 0..pixel.channels() {
                let payload = encode_channel(row, pixel, channel);
                io.write_u16(payload.len() as u16).map_err(|e| context.io(e))?;
                io.write_bytes(&payload).map_err(|e| context.io(e))?;
            }
        }
        log::debug!("{}: wrote {} scanlines of {}", path.display(), height, pixel);
        self.current = Some(Pending { io, offsets });
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        self.finish_current()
    }
}

impl Drop for RlaSave {
    fn drop(&mut self) {
        if let Err(e) = self.finish_current() {
            log::warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::domain::io_plugin::{Load, ReadRequest};
    use crate::codec::infrastructure::rla::rla_load::RlaLoad;
    use crate::shared::image::ImageInfo;
    use crate::shared::pixel::PixelFormat;
    use rstest::rstest;

    fn save(path: &std::path::Path, image: &Image) {
        let file = FileInfo::from_path(path);
        let mut save = RlaSave::new(&file, &IoInfo::new(image.info().clone())).unwrap();
        save.write(image, None).unwrap();
        save.close().unwrap();
    }

    fn load(path: &std::path::Path) -> Image {
        let mut load = RlaLoad::open(&FileInfo::from_path(path)).unwrap();
        let mut image = load.read(&ReadRequest::new()).unwrap();
        image.normalize_mirror();
        image
    }

    #[rstest]
    #[case::rgb8(PixelType::RGB_U8)]
    #[case::rgba8(PixelType::RGBA_U8)]
    #[case::luminance16(PixelType::L_U16)]
    #[case::rgba16(PixelType::RGBA_U16)]
    fn test_integer_layouts_survive(#[case] pixel: PixelType) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.rla");
        let info = ImageInfo::new(5, 3, pixel);
        let data: Vec<u8> = (0..info.byte_count()).map(|i| (i * 7 % 256) as u8).collect();
        let image = Image::new(info, data).unwrap();

        save(&path, &image);
        let loaded = load(&path);
        assert_eq!(loaded.pixel(), pixel);
        assert_eq!(loaded.data(), image.data());
    }

    #[test]
    fn test_float_with_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.rla");
        let info = ImageInfo::new(2, 2, PixelType::new(PixelFormat::La, DataType::F32));
        let samples = [0.0f32, 1.0, 2.5, 0.5, -1.0, 0.25, 100.0, 0.0];
        let image = Image::from_samples(info, &samples).unwrap();

        save(&path, &image);
        assert_eq!(load(&path).samples::<f32>(), samples.to_vec());
    }

    #[test]
    fn test_offset_table_filled_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.rla");
        let image = Image::new(ImageInfo::new(2, 2, PixelType::L_U16), vec![0; 8]).unwrap();
        let file = FileInfo::from_path(&path);
        let mut save = RlaSave::new(&file, &IoInfo::new(image.info().clone())).unwrap();
        save.write(&image, None).unwrap();

        let before = std::fs::read(&path).unwrap();
        assert_eq!(&before[740..748], &[0; 8]);
        drop(save);

        let after = std::fs::read(&path).unwrap();
        let first = i32::from_be_bytes([after[740], after[741], after[742], after[743]]);
        assert_eq!(first, 748);
    }

    #[test]
    fn test_refuses_oversized_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.rla");
        let image = Image::zeroed(ImageInfo::new(40_000, 1, PixelType::L_U8));
        let mut save = RlaSave::new(&FileInfo::from_path(&path), &IoInfo::new(image.info().clone())).unwrap();
        let err = save.write(&image, None).unwrap_err();
        assert!(matches!(err, CodecError::SaveRefused { .. }));
    }
}
