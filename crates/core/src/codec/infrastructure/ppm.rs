//! Netpbm grey and colour maps: P2/P3 text and P5/P6 binary.

use std::path::{Path, PathBuf};

use crate::codec::domain::io_plugin::{
    resolve_frame_path, CodecError, ErrorContext, IoInfo, IoPlugin, Load, ReadRequest, Save,
};
use crate::codec::domain::plugin_options::{
    choice_name, choice_names, parse_choice, OptionError, OptionListener, OptionValues, PluginOptions,
};
use crate::io::file_io::{FileIo, OpenMode};
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::byte_order::Endian;
use crate::shared::image::{Image, ImageInfo, Proxy};
use crate::shared::pixel::{DataType, PixelFormat, PixelType};

pub const PLUGIN_NAME: &str = "PPM";
pub const EXTENSIONS: &[&str] = &[".ppm", ".pnm", ".pgm"];

pub const DATA: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpmData {
    Ascii,
    Binary,
}

const DATA_CHOICES: &[(&str, PpmData)] = &[("ASCII", PpmData::Ascii), ("Binary", PpmData::Binary)];

#[derive(Debug, Clone, PartialEq)]
pub struct PpmOptions {
    pub data: PpmData,
}

impl Default for PpmOptions {
    fn default() -> Self {
        Self { data: PpmData::Binary }
    }
}

impl OptionValues for PpmOptions {
    const NAMES: &'static [&'static str] = &[DATA];

    fn get(&self, name: &str) -> Option<String> {
        (name == DATA).then(|| choice_name(&self.data, DATA_CHOICES))
    }

    fn domain(name: &str) -> Vec<String> {
        match name {
            DATA => choice_names(DATA_CHOICES),
            _ => Vec::new(),
        }
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        if name != DATA {
            return Err("a known option".into());
        }
        self.data = parse_choice(value, DATA_CHOICES).ok_or_else(|| choice_names(DATA_CHOICES).join(", "))?;
        Ok(())
    }
}

/// Parsed header and where the samples start.
#[derive(Debug, Clone, PartialEq)]
struct Header {
    ascii: bool,
    format: PixelFormat,
    width: u32,
    height: u32,
    max_value: u32,
    data_offset: usize,
}

impl Header {
    fn data_type(&self) -> DataType {
        if self.max_value <= 255 {
            DataType::U8
        } else {
            DataType::U16
        }
    }
}

/// Splits whitespace separated tokens, skipping `#` comments.
struct Tokens<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn next_token(&mut self) -> Option<&'a [u8]> {
        loop {
            while self.pos < self.data.len() && self.data[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.data.get(self.pos) == Some(&b'#') {
                while self.pos < self.data.len() && self.data[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
        let start = self.pos;
        while self.pos < self.data.len() && !self.data[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let data: &'a [u8] = self.data;
        (self.pos > start).then_some(&data[start..self.pos])
    }

    fn next_number(&mut self) -> Option<u32> {
        std::str::from_utf8(self.next_token()?).ok()?.parse().ok()
    }
}

fn parse_header(data: &[u8], context: &ErrorContext) -> Result<Header, CodecError> {
    let mut tokens = Tokens::new(data);
    let (ascii, format) = match tokens.next_token() {
        Some(b"P2") => (true, PixelFormat::L),
        Some(b"P3") => (true, PixelFormat::Rgb),
        Some(b"P5") => (false, PixelFormat::L),
        Some(b"P6") => (false, PixelFormat::Rgb),
        Some(b"P1" | b"P4") => return Err(context.unsupported("bitmap files")),
        _ => return Err(context.unsupported("bad magic number")),
    };
    let mut number = |what: &str| {
        tokens
            .next_number()
            .ok_or_else(|| context.corrupt(format!("missing or invalid {what}")))
    };
    let width = number("width")?;
    let height = number("height")?;
    let max_value = number("maximum value")?;
    if width == 0 || height == 0 {
        return Err(context.corrupt(format!("invalid size {width}x{height}")));
    }
    if max_value == 0 || max_value > 65535 {
        return Err(context.unsupported(format!("maximum value {max_value}")));
    }
    // A single whitespace byte separates the header from binary data.
    let data_offset = (tokens.pos + 1).min(data.len());
    Ok(Header {
        ascii,
        format,
        width,
        height,
        max_value,
        data_offset,
    })
}

fn read_file(path: &Path, context: &ErrorContext) -> Result<Vec<u8>, CodecError> {
    let mut io = FileIo::open(path, OpenMode::Read).map_err(|e| context.io(e))?;
    let size = io.size() as usize;
    io.read_bytes(size).map_err(|e| context.io(e))
}

fn header_info(path: &Path, header: &Header) -> ImageInfo {
    let mut info = ImageInfo::new(header.width, header.height, PixelType::new(header.format, header.data_type()));
    info.file_name = path.to_string_lossy().into_owned();
    if !header.ascii && header.data_type() == DataType::U16 {
        info.endian = Endian::Msb;
    }
    info
}

/// Codes rescaled to the full range of the sample type.
fn scale_code(code: u32, max_value: u32, data_type: DataType) -> u32 {
    let full = data_type.max_value();
    if max_value == full {
        code.min(full)
    } else {
        ((code.min(max_value) as u64 * full as u64 + max_value as u64 / 2) / max_value as u64) as u32
    }
}

fn decode(data: &[u8], header: &Header, context: &ErrorContext) -> Result<Vec<u8>, CodecError> {
    let data_type = header.data_type();
    let count = (header.width * header.height) as usize * header.format.channels();
    let codes: Vec<u32> = if header.ascii {
        let mut tokens = Tokens::new(&data[header.data_offset.saturating_sub(1)..]);
        (0..count)
            .map(|i| {
                tokens
                    .next_number()
                    .ok_or_else(|| context.corrupt(format!("sample {i} of {count} missing")))
            })
            .collect::<Result<_, _>>()?
    } else {
        let bytes = data_type.byte_count();
        let body = data
            .get(header.data_offset..header.data_offset + count * bytes)
            .ok_or_else(|| context.corrupt(format!("{} bytes of samples expected", count * bytes)))?;
        match data_type {
            DataType::U8 => body.iter().map(|&v| v as u32).collect(),
            _ => body
                .chunks_exact(2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]) as u32)
                .collect(),
        }
    };

    let mut out = Vec::with_capacity(count * data_type.byte_count());
    for code in codes {
        let value = scale_code(code, header.max_value, data_type);
        match data_type {
            DataType::U8 => out.push(value as u8),
            _ => out.extend_from_slice(&(value as u16).to_ne_bytes()),
        }
    }
    Ok(out)
}

pub struct PpmLoad {
    file: FileInfo,
    info: IoInfo,
}

impl PpmLoad {
    pub fn open(file: &FileInfo) -> Result<Self, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, file, None)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        let data = read_file(&path, &context)?;
        let header = parse_header(&data, &context)?;
        Ok(Self {
            file: file.clone(),
            info: IoInfo::new(header_info(&path, &header)).with_sequence(file.sequence().clone()),
        })
    }
}

impl Load for PpmLoad {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &ReadRequest) -> Result<Image, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, &self.file, request.frame)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        if request.layer != 0 {
            return Err(context.layer(request.layer, 1));
        }
        let data = read_file(&path, &context)?;
        let header = parse_header(&data, &context)?;
        let pixels = decode(&data, &header, &context)?;
        let image = Image::new(header_info(&path, &header), pixels).map_err(|e| context.image(e))?;
        Ok(match request.proxy {
            Proxy::None => image,
            proxy => image.proxy_scale(proxy),
        })
    }
}

fn check_layout(pixel: PixelType, context: &ErrorContext) -> Result<(), CodecError> {
    let format_ok = matches!(pixel.format, PixelFormat::L | PixelFormat::Rgb);
    let type_ok = matches!(pixel.data_type, DataType::U8 | DataType::U16);
    if format_ok && type_ok {
        Ok(())
    } else {
        Err(context.refused(format!("{pixel} images, only L and RGB with U8 or U16 samples")))
    }
}

pub struct PpmSave {
    file: FileInfo,
    options: PpmOptions,
}

impl PpmSave {
    pub fn new(file: &FileInfo, info: &IoInfo, options: PpmOptions) -> Result<Self, CodecError> {
        let context = ErrorContext::new(PLUGIN_NAME, file.path_buf());
        if info.layers.len() > 1 {
            return Err(context.refused(format!("{} layers, PPM stores one", info.layers.len())));
        }
        if let Some(layer) = info.first_layer() {
            check_layout(layer.pixel, &context)?;
        }
        Ok(Self {
            file: file.clone(),
            options,
        })
    }
}

impl Save for PpmSave {
    fn write(&mut self, image: &Image, frame: Option<i64>) -> Result<(), CodecError> {
        let frame = frame.or_else(|| self.file.sequence().first());
        let path = PathBuf::from(self.file.file_name(frame));
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        let pixel = image.pixel();
        check_layout(pixel, &context)?;

        let mut image = image.clone();
        if image.info().mirror.x || image.info().mirror.y {
            image.normalize_mirror();
        }

        let ascii = self.options.data == PpmData::Ascii;
        let magic = match (ascii, pixel.format) {
            (true, PixelFormat::L) => "P2",
            (true, _) => "P3",
            (false, PixelFormat::L) => "P5",
            (false, _) => "P6",
        };
        let max_value = pixel.data_type.max_value();
        let mut out = format!("{magic}\n{} {}\n{max_value}\n", image.width(), image.height()).into_bytes();

        let codes: Vec<u32> = match pixel.data_type {
            DataType::U8 => image.data().iter().map(|&v| v as u32).collect(),
            _ => image.samples::<u16>().into_iter().map(u32::from).collect(),
        };
        if ascii {
            let per_row = image.width() as usize * pixel.channels();
            for row in codes.chunks(per_row) {
                let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                out.extend_from_slice(line.join(" ").as_bytes());
                out.push(b'\n');
            }
        } else if pixel.data_type == DataType::U8 {
            out.extend(codes.iter().map(|&v| v as u8));
        } else {
            out.extend(codes.iter().flat_map(|&v| (v as u16).to_be_bytes()));
        }

        let mut io = FileIo::open(&path, OpenMode::Write).map_err(|e| context.io(e))?;
        io.write_bytes(&out).map_err(|e| context.io(e))?;
        io.close();
        log::debug!("{}: wrote {magic} {}", path.display(), pixel);
        Ok(())
    }
}

pub struct PpmPlugin {
    options: PluginOptions<PpmOptions>,
}

impl PpmPlugin {
    pub fn new() -> Self {
        Self {
            options: PluginOptions::new(PLUGIN_NAME, PpmOptions::default()),
        }
    }
}

impl Default for PpmPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IoPlugin for PpmPlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    fn option_names(&self) -> Vec<&'static str> {
        self.options.names()
    }

    fn option(&self, name: &str) -> Option<String> {
        self.options.get(name)
    }

    fn option_domain(&self, name: &str) -> Option<Vec<String>> {
        self.options.domain(name)
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<bool, OptionError> {
        self.options.set(name, value)
    }

    fn set_option_listener(&mut self, listener: OptionListener) {
        self.options.set_listener(listener);
    }

    fn create_load(&self, file: &FileInfo) -> Result<Box<dyn Load>, CodecError> {
        Ok(Box::new(PpmLoad::open(file)?))
    }

    fn create_save(&self, file: &FileInfo, info: &IoInfo) -> Result<Box<dyn Save>, CodecError> {
        Ok(Box::new(PpmSave::new(file, info, self.options.values().clone())?))
    }
}
