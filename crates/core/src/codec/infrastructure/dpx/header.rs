//! SMPTE 268M header: 2048 bytes split into file (768), image (640),
//! source (256), film (256) and TV (128) sections.

use crate::codec::domain::io_plugin::{CodecError, ErrorContext};
use crate::io::file_io::{FileIo, FileIoError};
use crate::shared::byte_order::Endian;
use crate::shared::image::{Mirror, Tags};

pub const HEADER_SIZE: u32 = 2048;
pub const INDUSTRY_HEADER_SIZE: u32 = 384;
/// Byte offset of the total file size in the file section.
pub const FILE_SIZE_OFFSET: u64 = 16;

const MAGIC_MSB: [u8; 4] = *b"SDPX";
const MAGIC_LSB: [u8; 4] = *b"XPDS";

pub const DESCRIPTOR_L: u8 = 6;
pub const DESCRIPTOR_RGB: u8 = 50;
pub const DESCRIPTOR_RGBA: u8 = 51;

pub const TRANSFER_USER: u8 = 0;
pub const TRANSFER_FILM_PRINT: u8 = 1;
pub const TRANSFER_LINEAR: u8 = 2;

pub const COLORIMETRIC_USER: u8 = 0;
pub const COLORIMETRIC_FILM_PRINT: u8 = 1;

pub const PACKING_PACKED: u16 = 0;
/// 32-bit words, data in the high bits ("filled method A").
pub const PACKING_TYPE_A: u16 = 1;

pub const ORIENT_LEFT_RIGHT_TOP_BOTTOM: u16 = 0;
const ORIENT_RIGHT_LEFT_TOP_BOTTOM: u16 = 1;
const ORIENT_LEFT_RIGHT_BOTTOM_TOP: u16 = 2;
const ORIENT_RIGHT_LEFT_BOTTOM_TOP: u16 = 3;

const INT_MAX: u32 = 1_000_000;
const FLOAT_MAX: f32 = 1_000_000.0;
const UNSET_U32: u32 = 0xffff_ffff;
const UNSET_F32: u32 = 0xffff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1_0,
    V2_0,
}

impl Version {
    fn text(self) -> &'static [u8; 4] {
        match self {
            Version::V1_0 => b"V1.0",
            Version::V2_0 => b"V2.0",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSection {
    pub image_offset: u32,
    pub version: [u8; 8],
    pub size: u32,
    pub ditto_key: u32,
    pub header_size: u32,
    pub industry_header_size: u32,
    pub user_header_size: u32,
    pub name: [u8; 100],
    pub time: [u8; 24],
    pub creator: [u8; 100],
    pub project: [u8; 200],
    pub copyright: [u8; 200],
    pub encryption_key: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageElement {
    pub data_sign: u32,
    pub low_data: u32,
    pub low_quantity: f32,
    pub high_data: u32,
    pub high_quantity: f32,
    pub descriptor: u8,
    pub transfer: u8,
    pub colorimetric: u8,
    pub bit_depth: u8,
    pub packing: u16,
    pub encoding: u16,
    pub data_offset: u32,
    pub line_padding: u32,
    pub element_padding: u32,
    pub description: [u8; 32],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSection {
    pub orient: u16,
    pub element_count: u16,
    pub size: [u32; 2],
    pub elements: [ImageElement; 8],
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSection {
    pub offset: [u32; 2],
    pub center: [f32; 2],
    pub size: [u32; 2],
    pub file: [u8; 100],
    pub time: [u8; 24],
    pub input_device: [u8; 32],
    pub input_serial: [u8; 32],
    pub border: [u16; 4],
    pub pixel_aspect: [u32; 2],
    pub scan_size: [f32; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilmSection {
    pub id: [u8; 2],
    pub kind: [u8; 2],
    pub offset: [u8; 2],
    pub prefix: [u8; 6],
    pub count: [u8; 4],
    pub format: [u8; 32],
    pub frame: u32,
    pub sequence: u32,
    pub hold: u32,
    pub frame_rate: f32,
    pub shutter: f32,
    pub frame_id: [u8; 32],
    pub slate: [u8; 100],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TvSection {
    pub timecode: u32,
    pub user_bits: u32,
    pub interlace: u8,
    pub field: u8,
    pub video_signal: u8,
    pub sample_rate: [f32; 2],
    pub frame_rate: f32,
    pub time_offset: f32,
    pub gamma: f32,
    pub black_level: f32,
    pub black_gain: f32,
    pub breakpoint: f32,
    pub white_level: f32,
    pub integration_times: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub file: FileSection,
    pub image: ImageSection,
    pub source: SourceSection,
    pub film: FilmSection,
    pub tv: TvSection,
}

fn unset_f32() -> f32 {
    f32::from_bits(UNSET_F32)
}

impl ImageElement {
    fn unset() -> Self {
        Self {
            data_sign: UNSET_U32,
            low_data: UNSET_U32,
            low_quantity: unset_f32(),
            high_data: UNSET_U32,
            high_quantity: unset_f32(),
            descriptor: 0xff,
            transfer: 0xff,
            colorimetric: 0xff,
            bit_depth: 0xff,
            packing: 0xffff,
            encoding: 0xffff,
            data_offset: UNSET_U32,
            line_padding: UNSET_U32,
            element_padding: UNSET_U32,
            description: [0xff; 32],
        }
    }
}

impl Header {
    /// Every numeric field set to all ones, every string zeroed.
    pub fn unset() -> Self {
        Self {
            file: FileSection {
                image_offset: UNSET_U32,
                version: [0; 8],
                size: UNSET_U32,
                ditto_key: UNSET_U32,
                header_size: UNSET_U32,
                industry_header_size: UNSET_U32,
                user_header_size: UNSET_U32,
                name: [0; 100],
                time: [0; 24],
                creator: [0; 100],
                project: [0; 200],
                copyright: [0; 200],
                encryption_key: UNSET_U32,
            },
            image: ImageSection {
                orient: 0xffff,
                element_count: 0xffff,
                size: [UNSET_U32; 2],
                elements: [ImageElement::unset(); 8],
            },
            source: SourceSection {
                offset: [UNSET_U32; 2],
                center: [unset_f32(); 2],
                size: [UNSET_U32; 2],
                file: [0; 100],
                time: [0; 24],
                input_device: [0; 32],
                input_serial: [0; 32],
                border: [0xffff; 4],
                pixel_aspect: [UNSET_U32; 2],
                scan_size: [unset_f32(); 2],
            },
            film: FilmSection {
                id: [0; 2],
                kind: [0; 2],
                offset: [0; 2],
                prefix: [0; 6],
                count: [0; 4],
                format: [0; 32],
                frame: UNSET_U32,
                sequence: UNSET_U32,
                hold: UNSET_U32,
                frame_rate: unset_f32(),
                shutter: unset_f32(),
                frame_id: [0; 32],
                slate: [0; 100],
            },
            tv: TvSection {
                timecode: UNSET_U32,
                user_bits: UNSET_U32,
                interlace: 0xff,
                field: 0xff,
                video_signal: 0xff,
                sample_rate: [unset_f32(); 2],
                frame_rate: unset_f32(),
                time_offset: unset_f32(),
                gamma: unset_f32(),
                black_level: unset_f32(),
                black_gain: unset_f32(),
                breakpoint: unset_f32(),
                white_level: unset_f32(),
                integration_times: unset_f32(),
            },
        }
    }

    /// Header for a new single-element file of `width` x `height`.
    pub fn for_save(width: u32, height: u32, version: Version) -> Self {
        let mut header = Self::unset();
        header.file.version[..4].copy_from_slice(version.text());
        header.file.image_offset = HEADER_SIZE;
        header.file.header_size = HEADER_SIZE - INDUSTRY_HEADER_SIZE;
        header.file.industry_header_size = INDUSTRY_HEADER_SIZE;
        header.file.user_header_size = 0;
        header.file.size = 0;
        header.file.ditto_key = 0;
        header.file.encryption_key = 0;
        header.image.element_count = 1;
        header.image.size = [width, height];
        header.image.orient = ORIENT_LEFT_RIGHT_TOP_BOTTOM;
        let element = &mut header.image.elements[0];
        element.data_sign = 0;
        element.low_data = 0;
        element.encoding = 0;
        element.packing = PACKING_PACKED;
        element.data_offset = HEADER_SIZE;
        element.line_padding = 0;
        element.element_padding = 0;
        header
    }

    /// Reads the header and leaves `io` swapping in the file's byte order.
    pub fn read(io: &mut FileIo, context: &ErrorContext) -> Result<(Header, Endian), CodecError> {
        if io.size() < HEADER_SIZE as u64 {
            return Err(context.corrupt(format!("file is smaller than the {HEADER_SIZE} byte header")));
        }
        let magic: [u8; 4] = text(io).map_err(|e| context.io(e))?;
        let endian = match magic {
            MAGIC_MSB => Endian::Msb,
            MAGIC_LSB => Endian::Lsb,
            _ => return Err(context.unsupported("bad magic number")),
        };
        io.set_endian(endian);
        let header = read_sections(io).map_err(|e| context.io(e))?;
        Ok((header, endian))
    }

    /// Writes all 2048 bytes at the current position in `endian` order.
    pub fn write(&self, io: &mut FileIo, endian: Endian) -> Result<(), FileIoError> {
        io.set_endian(endian);
        io.write_bytes(match endian {
            Endian::Msb => &MAGIC_MSB,
            Endian::Lsb => &MAGIC_LSB,
        })?;
        write_file_section(io, &self.file)?;
        write_image_section(io, &self.image)?;
        write_source_section(io, &self.source)?;
        write_film_section(io, &self.film)?;
        write_tv_section(io, &self.tv)
    }

    pub fn mirror(&self) -> Mirror {
        match self.image.orient {
            ORIENT_RIGHT_LEFT_TOP_BOTTOM => Mirror { x: true, y: false },
            ORIENT_LEFT_RIGHT_BOTTOM_TOP => Mirror { x: false, y: true },
            ORIENT_RIGHT_LEFT_BOTTOM_TOP => Mirror { x: true, y: true },
            _ => Mirror::default(),
        }
    }

    /// Metadata carried in the header, keyed by display name. Unset and
    /// garbage fields are skipped.
    pub fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        let file = &self.file;
        set_text(&mut tags, "Time", &file.time);
        set_text(&mut tags, "Creator", &file.creator);
        set_text(&mut tags, "Project", &file.project);
        set_text(&mut tags, "Copyright", &file.copyright);

        let source = &self.source;
        if source.offset.iter().all(|&v| valid_u32(v)) {
            tags.set("Source Offset", join(&source.offset));
        }
        if source.center.iter().all(|&v| valid_f32(v)) {
            tags.set("Source Center", join(&source.center));
        }
        if source.size.iter().all(|&v| valid_u32(v)) {
            tags.set("Source Size", join(&source.size));
        }
        set_text(&mut tags, "Source File", &source.file);
        set_text(&mut tags, "Source Time", &source.time);
        set_text(&mut tags, "Source Input Device", &source.input_device);
        set_text(&mut tags, "Source Input Serial", &source.input_serial);
        if source.border.iter().all(|&v| v != 0xffff) {
            tags.set("Source Border", join(&source.border));
        }
        if source.pixel_aspect.iter().all(|&v| valid_u32(v)) {
            tags.set("Source Pixel Aspect", join(&source.pixel_aspect));
        }
        if source.scan_size.iter().all(|&v| valid_f32(v)) {
            tags.set("Source Scan Size", join(&source.scan_size));
        }

        let film = &self.film;
        let keycode: [&[u8]; 5] = [&film.id, &film.kind, &film.offset, &film.prefix, &film.count];
        if keycode.iter().all(|field| valid_text(field)) {
            let parts: Vec<String> = keycode.iter().map(|field| to_text(field)).collect();
            tags.set("Keycode", parts.join(":"));
        }
        set_text(&mut tags, "Film Format", &film.format);
        set_u32(&mut tags, "Film Frame", film.frame);
        set_u32(&mut tags, "Film Sequence", film.sequence);
        set_u32(&mut tags, "Film Hold", film.hold);
        set_f32(&mut tags, "Film Frame Rate", film.frame_rate);
        set_f32(&mut tags, "Film Shutter", film.shutter);
        set_text(&mut tags, "Film Frame ID", &film.frame_id);
        set_text(&mut tags, "Film Slate", &film.slate);

        let tv = &self.tv;
        if tv.timecode != UNSET_U32 {
            tags.set("Timecode", timecode_to_string(tv.timecode));
        }
        set_u8(&mut tags, "TV Interlace", tv.interlace);
        set_u8(&mut tags, "TV Field", tv.field);
        set_u8(&mut tags, "TV Video Signal", tv.video_signal);
        if tv.sample_rate.iter().all(|&v| valid_f32(v)) {
            tags.set("TV Sample Rate", join(&tv.sample_rate));
        }
        set_f32(&mut tags, "TV Frame Rate", tv.frame_rate);
        set_f32(&mut tags, "TV Time Offset", tv.time_offset);
        set_f32(&mut tags, "TV Gamma", tv.gamma);
        set_f32(&mut tags, "TV Black Level", tv.black_level);
        set_f32(&mut tags, "TV Black Gain", tv.black_gain);
        set_f32(&mut tags, "TV Breakpoint", tv.breakpoint);
        set_f32(&mut tags, "TV White Level", tv.white_level);
        set_f32(&mut tags, "TV Integration Times", tv.integration_times);
        tags
    }

    /// Stores recognised tags into the header. Unparsable values are skipped.
    pub fn apply_tags(&mut self, tags: &Tags) {
        let file = &mut self.file;
        put_text(tags, "Time", &mut file.time);
        put_text(tags, "Creator", &mut file.creator);
        put_text(tags, "Project", &mut file.project);
        put_text(tags, "Copyright", &mut file.copyright);

        let source = &mut self.source;
        put_values(tags, "Source Offset", &mut source.offset);
        put_values(tags, "Source Center", &mut source.center);
        put_values(tags, "Source Size", &mut source.size);
        put_text(tags, "Source File", &mut source.file);
        put_text(tags, "Source Time", &mut source.time);
        put_text(tags, "Source Input Device", &mut source.input_device);
        put_text(tags, "Source Input Serial", &mut source.input_serial);
        put_values(tags, "Source Border", &mut source.border);
        put_values(tags, "Source Pixel Aspect", &mut source.pixel_aspect);
        put_values(tags, "Source Scan Size", &mut source.scan_size);

        let film = &mut self.film;
        if let Some(keycode) = tags.get("Keycode") {
            let parts: Vec<&str> = keycode.split(':').collect();
            if parts.len() == 5 {
                copy_text(parts[0], &mut film.id);
                copy_text(parts[1], &mut film.kind);
                copy_text(parts[2], &mut film.offset);
                copy_text(parts[3], &mut film.prefix);
                copy_text(parts[4], &mut film.count);
            }
        }
        put_text(tags, "Film Format", &mut film.format);
        put_value(tags, "Film Frame", &mut film.frame);
        put_value(tags, "Film Sequence", &mut film.sequence);
        put_value(tags, "Film Hold", &mut film.hold);
        put_value(tags, "Film Frame Rate", &mut film.frame_rate);
        put_value(tags, "Film Shutter", &mut film.shutter);
        put_text(tags, "Film Frame ID", &mut film.frame_id);
        put_text(tags, "Film Slate", &mut film.slate);

        let tv = &mut self.tv;
        if let Some(timecode) = tags.get("Timecode").and_then(timecode_from_string) {
            tv.timecode = timecode;
        }
        put_value(tags, "TV Interlace", &mut tv.interlace);
        put_value(tags, "TV Field", &mut tv.field);
        put_value(tags, "TV Video Signal", &mut tv.video_signal);
        put_values(tags, "TV Sample Rate", &mut tv.sample_rate);
        put_value(tags, "TV Frame Rate", &mut tv.frame_rate);
        put_value(tags, "TV Time Offset", &mut tv.time_offset);
        put_value(tags, "TV Gamma", &mut tv.gamma);
        put_value(tags, "TV Black Level", &mut tv.black_level);
        put_value(tags, "TV Black Gain", &mut tv.black_gain);
        put_value(tags, "TV Breakpoint", &mut tv.breakpoint);
        put_value(tags, "TV White Level", &mut tv.white_level);
        put_value(tags, "TV Integration Times", &mut tv.integration_times);
    }
}

pub fn valid_u32(value: u32) -> bool {
    value != UNSET_U32 && value < INT_MAX
}

pub fn valid_f32(value: f32) -> bool {
    value.to_bits() != UNSET_F32 && value > -FLOAT_MAX && value < FLOAT_MAX
}

/// Non-empty and printable ASCII up to the first NUL.
pub fn valid_text(bytes: &[u8]) -> bool {
    match bytes.first() {
        None | Some(0) => false,
        Some(_) => bytes
            .iter()
            .take_while(|&&b| b != 0)
            .all(|b| (32..=126).contains(b)),
    }
}

fn to_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Copies `value` into a fixed field, truncating; the rest stays zero.
fn copy_text(value: &str, out: &mut [u8]) {
    out.fill(0);
    let len = value.len().min(out.len());
    out[..len].copy_from_slice(&value.as_bytes()[..len]);
}

/// BCD `hh:mm:ss:ff`.
fn timecode_to_string(timecode: u32) -> String {
    let [h, m, s, f] = timecode.to_be_bytes();
    format!("{h:02x}:{m:02x}:{s:02x}:{f:02x}")
}

fn timecode_from_string(text: &str) -> Option<u32> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut bytes = [0u8; 4];
    for (byte, part) in bytes.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    Some(u32::from_be_bytes(bytes))
}

fn join<T: std::fmt::Display>(values: &[T]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

fn set_text(tags: &mut Tags, key: &str, bytes: &[u8]) {
    if valid_text(bytes) {
        tags.set(key, to_text(bytes));
    }
}

fn set_u32(tags: &mut Tags, key: &str, value: u32) {
    if valid_u32(value) {
        tags.set(key, value.to_string());
    }
}

fn set_u8(tags: &mut Tags, key: &str, value: u8) {
    if value != 0xff {
        tags.set(key, value.to_string());
    }
}

fn set_f32(tags: &mut Tags, key: &str, value: f32) {
    if valid_f32(value) {
        tags.set(key, value.to_string());
    }
}

fn put_text(tags: &Tags, key: &str, out: &mut [u8]) {
    if let Some(value) = tags.get(key) {
        copy_text(value, out);
    }
}

fn put_value<T: std::str::FromStr>(tags: &Tags, key: &str, out: &mut T) {
    if let Some(value) = tags.get(key).and_then(|v| v.trim().parse().ok()) {
        *out = value;
    }
}

fn put_values<T: std::str::FromStr + Copy, const N: usize>(tags: &Tags, key: &str, out: &mut [T; N]) {
    let Some(text) = tags.get(key) else {
        return;
    };
    let parsed: Vec<T> = text.split_whitespace().filter_map(|v| v.parse().ok()).collect();
    if parsed.len() == N {
        out.copy_from_slice(&parsed);
    }
}

fn text<const N: usize>(io: &mut FileIo) -> Result<[u8; N], FileIoError> {
    let mut out = [0u8; N];
    io.read(&mut out, N, 1)?;
    Ok(out)
}

fn u32s<const N: usize>(io: &mut FileIo) -> Result<[u32; N], FileIoError> {
    let mut out = [0u32; N];
    for value in &mut out {
        *value = io.read_u32()?;
    }
    Ok(out)
}

fn f32s<const N: usize>(io: &mut FileIo) -> Result<[f32; N], FileIoError> {
    let mut out = [0f32; N];
    for value in &mut out {
        *value = io.read_f32()?;
    }
    Ok(out)
}

fn read_sections(io: &mut FileIo) -> Result<Header, FileIoError> {
    let file = FileSection {
        image_offset: io.read_u32()?,
        version: text(io)?,
        size: io.read_u32()?,
        ditto_key: io.read_u32()?,
        header_size: io.read_u32()?,
        industry_header_size: io.read_u32()?,
        user_header_size: io.read_u32()?,
        name: text(io)?,
        time: text(io)?,
        creator: text(io)?,
        project: text(io)?,
        copyright: text(io)?,
        encryption_key: io.read_u32()?,
    };
    io.seek(104)?;

    let orient = io.read_u16()?;
    let element_count = io.read_u16()?;
    let size = u32s(io)?;
    let mut elements = [ImageElement::unset(); 8];
    for element in &mut elements {
        *element = ImageElement {
            data_sign: io.read_u32()?,
            low_data: io.read_u32()?,
            low_quantity: io.read_f32()?,
            high_data: io.read_u32()?,
            high_quantity: io.read_f32()?,
            descriptor: io.read_u8()?,
            transfer: io.read_u8()?,
            colorimetric: io.read_u8()?,
            bit_depth: io.read_u8()?,
            packing: io.read_u16()?,
            encoding: io.read_u16()?,
            data_offset: io.read_u32()?,
            line_padding: io.read_u32()?,
            element_padding: io.read_u32()?,
            description: text(io)?,
        };
    }
    io.seek(52)?;
    let image = ImageSection {
        orient,
        element_count,
        size,
        elements,
    };

    let source = SourceSection {
        offset: u32s(io)?,
        center: f32s(io)?,
        size: u32s(io)?,
        file: text(io)?,
        time: text(io)?,
        input_device: text(io)?,
        input_serial: text(io)?,
        border: [io.read_u16()?, io.read_u16()?, io.read_u16()?, io.read_u16()?],
        pixel_aspect: u32s(io)?,
        scan_size: f32s(io)?,
    };
    io.seek(20)?;

    let film = FilmSection {
        id: text(io)?,
        kind: text(io)?,
        offset: text(io)?,
        prefix: text(io)?,
        count: text(io)?,
        format: text(io)?,
        frame: io.read_u32()?,
        sequence: io.read_u32()?,
        hold: io.read_u32()?,
        frame_rate: io.read_f32()?,
        shutter: io.read_f32()?,
        frame_id: text(io)?,
        slate: text(io)?,
    };
    io.seek(56)?;

    let timecode = io.read_u32()?;
    let user_bits = io.read_u32()?;
    let interlace = io.read_u8()?;
    let field = io.read_u8()?;
    let video_signal = io.read_u8()?;
    io.seek(1)?;
    let tv = TvSection {
        timecode,
        user_bits,
        interlace,
        field,
        video_signal,
        sample_rate: f32s(io)?,
        frame_rate: io.read_f32()?,
        time_offset: io.read_f32()?,
        gamma: io.read_f32()?,
        black_level: io.read_f32()?,
        black_gain: io.read_f32()?,
        breakpoint: io.read_f32()?,
        white_level: io.read_f32()?,
        integration_times: io.read_f32()?,
    };
    io.seek(76)?;

    Ok(Header {
        file,
        image,
        source,
        film,
        tv,
    })
}

fn write_u32s(io: &mut FileIo, values: &[u32]) -> Result<(), FileIoError> {
    values.iter().try_for_each(|&v| io.write_u32(v))
}

fn write_f32s(io: &mut FileIo, values: &[f32]) -> Result<(), FileIoError> {
    values.iter().try_for_each(|&v| io.write_f32(v))
}

fn write_file_section(io: &mut FileIo, file: &FileSection) -> Result<(), FileIoError> {
    io.write_u32(file.image_offset)?;
    io.write_bytes(&file.version)?;
    write_u32s(
        io,
        &[
            file.size,
            file.ditto_key,
            file.header_size,
            file.industry_header_size,
            file.user_header_size,
        ],
    )?;
    io.write_bytes(&file.name)?;
    io.write_bytes(&file.time)?;
    io.write_bytes(&file.creator)?;
    io.write_bytes(&file.project)?;
    io.write_bytes(&file.copyright)?;
    io.write_u32(file.encryption_key)?;
    io.write_bytes(&[0xff; 104])
}

fn write_image_section(io: &mut FileIo, image: &ImageSection) -> Result<(), FileIoError> {
    io.write_u16(image.orient)?;
    io.write_u16(image.element_count)?;
    write_u32s(io, &image.size)?;
    for element in &image.elements {
        io.write_u32(element.data_sign)?;
        io.write_u32(element.low_data)?;
        io.write_f32(element.low_quantity)?;
        io.write_u32(element.high_data)?;
        io.write_f32(element.high_quantity)?;
        io.write_bytes(&[
            element.descriptor,
            element.transfer,
            element.colorimetric,
            element.bit_depth,
        ])?;
        io.write_u16(element.packing)?;
        io.write_u16(element.encoding)?;
        write_u32s(io, &[element.data_offset, element.line_padding, element.element_padding])?;
        io.write_bytes(&element.description)?;
    }
    io.write_bytes(&[0xff; 52])
}

fn write_source_section(io: &mut FileIo, source: &SourceSection) -> Result<(), FileIoError> {
    write_u32s(io, &source.offset)?;
    write_f32s(io, &source.center)?;
    write_u32s(io, &source.size)?;
    io.write_bytes(&source.file)?;
    io.write_bytes(&source.time)?;
    io.write_bytes(&source.input_device)?;
    io.write_bytes(&source.input_serial)?;
    source.border.iter().try_for_each(|&v| io.write_u16(v))?;
    write_u32s(io, &source.pixel_aspect)?;
    write_f32s(io, &source.scan_size)?;
    io.write_bytes(&[0xff; 20])
}

fn write_film_section(io: &mut FileIo, film: &FilmSection) -> Result<(), FileIoError> {
    io.write_bytes(&film.id)?;
    io.write_bytes(&film.kind)?;
    io.write_bytes(&film.offset)?;
    io.write_bytes(&film.prefix)?;
    io.write_bytes(&film.count)?;
    io.write_bytes(&film.format)?;
    write_u32s(io, &[film.frame, film.sequence, film.hold])?;
    write_f32s(io, &[film.frame_rate, film.shutter])?;
    io.write_bytes(&film.frame_id)?;
    io.write_bytes(&film.slate)?;
    io.write_bytes(&[0xff; 56])
}

fn write_tv_section(io: &mut FileIo, tv: &TvSection) -> Result<(), FileIoError> {
    write_u32s(io, &[tv.timecode, tv.user_bits])?;
    io.write_bytes(&[tv.interlace, tv.field, tv.video_signal, 0xff])?;
    write_f32s(io, &tv.sample_rate)?;
    write_f32s(
        io,
        &[
            tv.frame_rate,
            tv.time_offset,
            tv.gamma,
            tv.black_level,
            tv.black_gain,
            tv.breakpoint,
            tv.white_level,
            tv.integration_times,
        ],
    )?;
    io.write_bytes(&[0xff; 76])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::file_io::OpenMode;
    use rstest::rstest;

    fn write_and_read(header: &Header, endian: Endian) -> (Header, Endian, Vec<u8>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.dpx");
        let mut io = FileIo::open(&path, OpenMode::Write).unwrap();
        header.write(&mut io, endian).unwrap();
        assert_eq!(io.pos(), HEADER_SIZE as u64);
        io.close();
        let bytes = std::fs::read(&path).unwrap();
        let mut io = FileIo::open(&path, OpenMode::Read).unwrap();
        let (read, read_endian) = Header::read(&mut io, &ErrorContext::new("DPX", &path)).unwrap();
        assert_eq!(io.pos(), HEADER_SIZE as u64);
        (read, read_endian, bytes)
    }

    #[rstest]
    #[case::msb(Endian::Msb, b"SDPX")]
    #[case::lsb(Endian::Lsb, b"XPDS")]
    fn test_header_round_trip(#[case] endian: Endian, #[case] magic: &[u8; 4]) {
        let mut header = Header::for_save(640, 480, Version::V2_0);
        header.image.elements[0].descriptor = DESCRIPTOR_RGB;
        header.image.elements[0].bit_depth = 10;
        let (read, read_endian, bytes) = write_and_read(&header, endian);
        assert_eq!(&bytes[..4], magic);
        assert_eq!(read_endian, endian);
        assert_eq!(read.image.size, [640, 480]);
        assert_eq!(read.image.element_count, 1);
        assert_eq!(read.image.elements[0].descriptor, DESCRIPTOR_RGB);
        assert_eq!(read.image.elements[0].bit_depth, 10);
        assert_eq!(read.file.image_offset, HEADER_SIZE);
        assert_eq!(&read.file.version[..4], b"V2.0");
    }

    #[test]
    fn test_big_endian_fields_on_disk() {
        let header = Header::for_save(0x0102, 7, Version::V1_0);
        let (_, _, bytes) = write_and_read(&header, Endian::Msb);
        // image offset follows the magic
        assert_eq!(&bytes[4..8], &2048u32.to_be_bytes());
        // image width lives at 768 + 4
        assert_eq!(&bytes[772..776], &0x0102u32.to_be_bytes());
    }

    #[test]
    fn test_unset_fields_are_all_ones_and_strings_zero() {
        let header = Header::unset();
        let (_, _, bytes) = write_and_read(&header, Endian::Lsb);
        assert_eq!(&bytes[36..136], &[0u8; 100][..]);
        assert_eq!(&bytes[768..770], &[0xff, 0xff]);
        assert!(bytes[1920..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dpx");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        let mut io = FileIo::open(&path, OpenMode::Read).unwrap();
        let err = Header::read(&mut io, &ErrorContext::new("DPX", &path)).unwrap_err();
        assert!(matches!(err, CodecError::Unsupported { .. }));
    }

    #[test]
    fn test_truncated_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.dpx");
        std::fs::write(&path, b"SDPX").unwrap();
        let mut io = FileIo::open(&path, OpenMode::Read).unwrap();
        let err = Header::read(&mut io, &ErrorContext::new("DPX", &path)).unwrap_err();
        assert!(matches!(err, CodecError::Corrupt { .. }));
    }

    #[test]
    fn test_tags_round_trip() {
        let mut tags = Tags::new();
        tags.set("Creator", "seqio");
        tags.set("Project", "Shorts");
        tags.set("Source Offset", "10 20");
        tags.set("Source Border", "1 2 3 4");
        tags.set("Keycode", "12:34:56:7890:12");
        tags.set("Film Frame Rate", "23.976");
        tags.set("Timecode", "01:02:03:04");
        tags.set("TV Field", "2");
        let mut header = Header::for_save(1, 1, Version::V2_0);
        header.apply_tags(&tags);
        let (read, _, _) = write_and_read(&header, Endian::Msb);
        let out = read.tags();
        for (key, value) in tags.iter() {
            assert_eq!(out.get(key), Some(value), "{key}");
        }
    }

    #[test]
    fn test_unset_header_has_no_tags() {
        assert!(Header::unset().tags().is_empty());
    }

    #[rstest]
    #[case::unset(0xffff_ffff, false)]
    #[case::too_large(1_000_000, false)]
    #[case::ok(999_999, true)]
    #[case::zero(0, true)]
    fn test_valid_u32(#[case] value: u32, #[case] expected: bool) {
        assert_eq!(valid_u32(value), expected);
    }

    #[rstest]
    #[case::empty(b"\0\0\0\0", false)]
    #[case::printable(b"ab\0\0", true)]
    #[case::control(b"a\x01\0\0", false)]
    #[case::unset(b"\xff\xff\xff\xff", false)]
    fn test_valid_text(#[case] bytes: &[u8; 4], #[case] expected: bool) {
        assert_eq!(valid_text(bytes), expected);
    }

    #[test]
    fn test_mirror_from_orient() {
        let mut header = Header::unset();
        header.image.orient = 2;
        assert_eq!(header.mirror(), Mirror { x: false, y: true });
        header.image.orient = 0;
        assert_eq!(header.mirror(), Mirror::default());
    }
}
