use std::path::Path;

use crate::codec::domain::io_plugin::{resolve_frame_path, CodecError, ErrorContext, IoInfo, Load, ReadRequest};
use crate::codec::infrastructure::dpx::header::{
    valid_u32, Header, DESCRIPTOR_L, DESCRIPTOR_RGB, DESCRIPTOR_RGBA, HEADER_SIZE, PACKING_PACKED,
    PACKING_TYPE_A, TRANSFER_FILM_PRINT,
};
use crate::codec::infrastructure::dpx::options::{ColorProfile, DpxOptions};
use crate::codec::infrastructure::dpx::PLUGIN_NAME;
use crate::io::file_io::{FileIo, OpenMode};
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::image::{Image, ImageInfo, Proxy};
use crate::shared::pixel::{DataType, PixelFormat, PixelType};

/// How pixel data is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Samples of this many bytes, stored one after another.
    Samples(usize),
    /// Luminance, three 10-bit codes per 32-bit word.
    Luminance10,
}

struct FrameHeader {
    info: ImageInfo,
    layout: Layout,
    film_print: bool,
    data_offset: u64,
    data_size: usize,
}

/// Reads single-element DPX files and sequences.
pub struct DpxLoad {
    file: FileInfo,
    options: DpxOptions,
    info: IoInfo,
}

impl DpxLoad {
    pub fn open(file: &FileInfo, options: DpxOptions) -> Result<Self, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, file, None)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        let (_, header) = open_frame(&path, &context)?;
        log::debug!("{}: {} {}x{}", path.display(), header.info.pixel, header.info.width, header.info.height);
        Ok(Self {
            file: file.clone(),
            options,
            info: IoInfo::new(header.info).with_sequence(file.sequence().clone()),
        })
    }

    fn apply_film_print(&self, frame: &FrameHeader) -> bool {
        match self.options.input_color_profile {
            ColorProfile::Auto => frame.film_print,
            ColorProfile::None => false,
            ColorProfile::FilmPrint => true,
        }
    }
}

impl Load for DpxLoad {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &ReadRequest) -> Result<Image, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, &self.file, request.frame)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        if request.layer != 0 {
            return Err(context.layer(request.layer, 1));
        }
        let (mut io, frame) = open_frame(&path, &context)?;
        io.set_pos(frame.data_offset).map_err(|e| context.io(e))?;

        let data = match frame.layout {
            Layout::Samples(size) => io
                .read_vec(frame.data_size / size, size)
                .map_err(|e| context.io(e))?,
            Layout::Luminance10 => {
                let words = io.read_vec(frame.data_size / 4, 4).map_err(|e| context.io(e))?;
                unpack_luminance10(&words, frame.info.width as usize, frame.info.height as usize)
            }
        };
        io.close();

        let apply_film_print = self.apply_film_print(&frame);
        let mut image = Image::new(frame.info, data).map_err(|e| context.image(e))?;
        if apply_film_print && !image.pixel().is_float() {
            self.options.input_film_print.apply(&mut image);
        }
        Ok(match request.proxy {
            Proxy::None => image,
            proxy => image.proxy_scale(proxy),
        })
    }
}

fn open_frame(path: &Path, context: &ErrorContext) -> Result<(FileIo, FrameHeader), CodecError> {
    let mut io = FileIo::open(path, OpenMode::Read).map_err(|e| context.io(e))?;
    let (header, endian) = Header::read(&mut io, context)?;

    if header.image.element_count != 1 {
        return Err(context.unsupported(format!("{} image elements", header.image.element_count)));
    }
    let [width, height] = header.image.size;
    if !valid_u32(width) || !valid_u32(height) || width == 0 || height == 0 {
        return Err(context.corrupt("invalid image size"));
    }
    let element = &header.image.elements[0];
    let format = match element.descriptor {
        DESCRIPTOR_L => PixelFormat::L,
        DESCRIPTOR_RGB => PixelFormat::Rgb,
        DESCRIPTOR_RGBA => PixelFormat::Rgba,
        other => return Err(context.unsupported(format!("descriptor {other}"))),
    };
    let (pixel, layout) = match (element.packing, element.bit_depth, format) {
        (PACKING_PACKED, 8, _) => (PixelType::new(format, DataType::U8), Layout::Samples(1)),
        (PACKING_PACKED | PACKING_TYPE_A, 16, _) => (PixelType::new(format, DataType::U16), Layout::Samples(2)),
        (PACKING_PACKED, 32, _) => (PixelType::new(format, DataType::F32), Layout::Samples(4)),
        (PACKING_TYPE_A, 10, PixelFormat::Rgb) => (PixelType::RGB_U10, Layout::Samples(4)),
        (PACKING_TYPE_A, 10, PixelFormat::L) => (PixelType::L_U16, Layout::Luminance10),
        (packing, depth, _) => {
            return Err(context.unsupported(format!("{depth}-bit data with packing {packing}")));
        }
    };
    if element.encoding != 0 {
        return Err(context.unsupported("run-length encoded data"));
    }
    if valid_u32(element.line_padding) && element.line_padding != 0 {
        return Err(context.unsupported("line padding"));
    }
    if valid_u32(element.element_padding) && element.element_padding != 0 {
        return Err(context.unsupported("element padding"));
    }

    let data_size = match layout {
        Layout::Samples(_) => width as usize * height as usize * pixel.bytes_per_pixel(),
        Layout::Luminance10 => (width as usize).div_ceil(3) * 4 * height as usize,
    };
    let data_offset = match header.file.image_offset {
        0 | 0xffff_ffff => HEADER_SIZE as u64,
        offset => offset as u64,
    };
    if data_offset + data_size as u64 > io.size() {
        return Err(context.corrupt(format!(
            "incomplete file: {data_size} bytes of pixel data expected at offset {data_offset}, file is {} bytes",
            io.size()
        )));
    }

    let mut info = ImageInfo::new(width, height, pixel);
    info.file_name = path.to_string_lossy().into_owned();
    info.mirror = header.mirror();
    info.endian = endian;
    info.tags = header.tags();
    Ok((
        io,
        FrameHeader {
            info,
            layout,
            film_print: element.transfer == TRANSFER_FILM_PRINT,
            data_offset,
            data_size,
        },
    ))
}

/// Expands method-A luminance words to 16-bit samples, rows padded to whole
/// words.
fn unpack_luminance10(words: &[u8], width: usize, height: usize) -> Vec<u8> {
    const SHIFTS: [u32; 3] = [22, 12, 2];
    let words_per_row = width.div_ceil(3);
    let mut out = Vec::with_capacity(width * height * 2);
    for y in 0..height {
        for x in 0..width {
            let at = (y * words_per_row + x / 3) * 4;
            let word = u32::from_ne_bytes([words[at], words[at + 1], words[at + 2], words[at + 3]]);
            let code = ((word >> SHIFTS[x % 3]) & 0x3ff) as u16;
            out.extend_from_slice(&((code << 6) | (code >> 4)).to_ne_bytes());
        }
    }
    out
}
