use std::path::PathBuf;

use crate::codec::domain::io_plugin::{CodecError, ErrorContext, IoInfo, Save};
use crate::codec::infrastructure::dpx::header::{
    Header, COLORIMETRIC_FILM_PRINT, COLORIMETRIC_USER, DESCRIPTOR_L, DESCRIPTOR_RGB, DESCRIPTOR_RGBA,
    FILE_SIZE_OFFSET, PACKING_PACKED, PACKING_TYPE_A, TRANSFER_FILM_PRINT, TRANSFER_LINEAR,
};
use crate::codec::infrastructure::dpx::options::{ColorProfile, DpxOptions, SaveType};
use crate::codec::infrastructure::dpx::PLUGIN_NAME;
use crate::io::file_io::{FileIo, OpenMode};
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::convert::convert;
use crate::shared::image::Image;
use crate::shared::pixel::{DataType, PixelFormat, PixelType};

/// Writes one DPX file per frame. Each file's size field is filled in when
/// the next frame starts, on `close`, or on drop.
pub struct DpxSave {
    file: FileInfo,
    options: DpxOptions,
    current: Option<FileIo>,
}

impl DpxSave {
    pub fn new(file: &FileInfo, info: &IoInfo, options: DpxOptions) -> Result<Self, CodecError> {
        let context = ErrorContext::new(PLUGIN_NAME, file.path_buf());
        if info.layers.len() > 1 {
            return Err(context.refused(format!("{} layers, DPX stores one", info.layers.len())));
        }
        Ok(Self {
            file: file.clone(),
            options,
            current: None,
        })
    }

    fn target_pixel(&self, pixel: PixelType) -> PixelType {
        if self.options.save_type == SaveType::U10 {
            return PixelType::RGB_U10;
        }
        let format = match pixel.format {
            PixelFormat::La => PixelFormat::Rgba,
            other => other,
        };
        match pixel.data_type {
            DataType::U8 => PixelType::new(format, DataType::U8),
            DataType::U10 => PixelType::RGB_U10,
            DataType::U16 | DataType::F16 => PixelType::new(format, DataType::U16),
            DataType::F32 => PixelType::new(format, DataType::F32),
        }
    }

    fn finish_current(&mut self) -> Result<(), CodecError> {
        let Some(mut io) = self.current.take() else {
            return Ok(());
        };
        let context = ErrorContext::new(PLUGIN_NAME, io.path());
        let size = io.pos() as u32;
        io.set_pos(FILE_SIZE_OFFSET).map_err(|e| context.io(e))?;
        io.write_u32(size).map_err(|e| context.io(e))?;
        io.close();
        Ok(())
    }
}

impl Save for DpxSave {
    fn write(&mut self, image: &Image, frame: Option<i64>) -> Result<(), CodecError> {
        self.finish_current()?;

        let frame = frame.or_else(|| self.file.sequence().first());
        let path = PathBuf::from(self.file.file_name(frame));
        let context = ErrorContext::new(PLUGIN_NAME, &path);

        let pixel = self.target_pixel(image.pixel());
        let mut data = convert(image, pixel);
        if data.info().mirror.x || data.info().mirror.y {
            data.normalize_mirror();
        }
        let film_print = self.options.output_color_profile == ColorProfile::FilmPrint;
        if film_print {
            self.options.output_film_print.apply(&mut data);
        }

        let mut header = Header::for_save(image.width(), image.height(), self.options.version);
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let len = name.len().min(header.file.name.len());
        header.file.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        let element = &mut header.image.elements[0];
        element.descriptor = match pixel.format {
            PixelFormat::L => DESCRIPTOR_L,
            PixelFormat::Rgb => DESCRIPTOR_RGB,
            _ => DESCRIPTOR_RGBA,
        };
        element.bit_depth = pixel.data_type.bit_depth();
        element.packing = if pixel.data_type == DataType::U10 {
            PACKING_TYPE_A
        } else {
            PACKING_PACKED
        };
        if !pixel.is_float() {
            element.high_data = pixel.data_type.max_value();
        }
        if film_print {
            element.transfer = TRANSFER_FILM_PRINT;
            element.colorimetric = COLORIMETRIC_FILM_PRINT;
        } else {
            element.transfer = TRANSFER_LINEAR;
            element.colorimetric = COLORIMETRIC_USER;
        }
        header.apply_tags(image.tags());

        let endian = self.options.endian.resolve();
        let mut io = FileIo::open(&path, OpenMode::Write).map_err(|e| context.io(e))?;
        header.write(&mut io, endian).map_err(|e| context.io(e))?;
        let element_size = pixel.data_type.byte_count();
        io.write(data.data(), data.byte_count() / element_size, element_size)
            .map_err(|e| context.io(e))?;
        log::debug!("{}: wrote {} {}", path.display(), pixel, endian);
        self.current = Some(io);
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        self.finish_current()
    }
}

impl Drop for DpxSave {
    fn drop(&mut self) {
        if let Err(e) = self.finish_current() {
            log::warn!("{e}");
        }
    }
}
