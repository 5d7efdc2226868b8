//! Wavefront RLA header: 740 bytes, big-endian, followed by one `i32`
//! scanline offset per row.

use crate::codec::domain::io_plugin::{CodecError, ErrorContext};
use crate::io::file_io::{FileIo, FileIoError};
use crate::shared::byte_order::Endian;
use crate::shared::image::Tags;

pub const HEADER_SIZE: u64 = 740;

pub const CHANNEL_INT: i16 = 0;
pub const CHANNEL_FLOAT: i16 = 3;

/// Revision written by current encoders.
const REVISION: i16 = -2;

/// Numeric type of a channel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Byte planes of `bit_depth` bits, run-length encoded.
    Int { bytes: usize },
    /// Raw 32-bit floats.
    Float,
}

impl ChannelKind {
    pub fn from_header(channel_type: i16, bit_depth: i16) -> Option<Self> {
        match (channel_type, bit_depth) {
            (CHANNEL_FLOAT, 32) => Some(ChannelKind::Float),
            (CHANNEL_FLOAT, _) => None,
            (_, 1..=8) => Some(ChannelKind::Int { bytes: 1 }),
            (_, 9..=16) => Some(ChannelKind::Int { bytes: 2 }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Left, right, bottom, top.
    pub window: [i16; 4],
    pub active_window: [i16; 4],
    pub frame: i16,
    pub color_channel_type: i16,
    pub color_channels: i16,
    pub matte_channels: i16,
    pub aux_channels: i16,
    pub revision: i16,
    pub gamma: String,
    pub chromaticity: [String; 3],
    pub white_point: String,
    pub job: i32,
    pub file_name: String,
    pub description: String,
    pub program: String,
    pub machine: String,
    pub user: String,
    pub date: String,
    pub aspect: String,
    pub aspect_ratio: String,
    pub color_format: String,
    pub field: i16,
    pub render_time: String,
    pub filter: String,
    pub color_bit_depth: i16,
    pub matte_channel_type: i16,
    pub matte_bit_depth: i16,
    pub aux_channel_type: i16,
    pub aux_bit_depth: i16,
    pub aux_format: String,
    pub next_offset: i32,
}

impl Header {
    /// Header for a `width` × `height` image with the window anchored at 0,0.
    pub fn for_save(width: u32, height: u32) -> Self {
        let window = [0, width as i16 - 1, 0, height as i16 - 1];
        Self {
            window,
            active_window: window,
            frame: 1,
            color_channel_type: CHANNEL_INT,
            color_channels: 3,
            matte_channels: 0,
            aux_channels: 0,
            revision: REVISION,
            gamma: "2.2".into(),
            chromaticity: Default::default(),
            white_point: String::new(),
            job: 0,
            file_name: String::new(),
            description: String::new(),
            program: "seqio".into(),
            machine: String::new(),
            user: String::new(),
            date: String::new(),
            aspect: String::new(),
            aspect_ratio: "1.0".into(),
            color_format: String::new(),
            field: 0,
            render_time: String::new(),
            filter: String::new(),
            color_bit_depth: 8,
            matte_channel_type: CHANNEL_INT,
            matte_bit_depth: 8,
            aux_channel_type: CHANNEL_INT,
            aux_bit_depth: 0,
            aux_format: String::new(),
            next_offset: 0,
        }
    }

    pub fn width(&self) -> i32 {
        self.active_window[1] as i32 - self.active_window[0] as i32 + 1
    }

    pub fn height(&self) -> i32 {
        self.active_window[3] as i32 - self.active_window[2] as i32 + 1
    }

    pub fn read(io: &mut FileIo, context: &ErrorContext) -> Result<Self, CodecError> {
        if io.size() < HEADER_SIZE {
            return Err(context.corrupt(format!("file is smaller than the {HEADER_SIZE} byte header")));
        }
        io.set_endian(Endian::Msb);
        read_header(io).map_err(|e| context.io(e))
    }

    pub fn write(&self, io: &mut FileIo) -> Result<(), FileIoError> {
        io.set_endian(Endian::Msb);
        for value in self.window.iter().chain(&self.active_window) {
            io.write_i16(*value)?;
        }
        for value in [
            self.frame,
            self.color_channel_type,
            self.color_channels,
            self.matte_channels,
            self.aux_channels,
            self.revision,
        ] {
            io.write_i16(value)?;
        }
        write_text(io, &self.gamma, 16)?;
        for value in &self.chromaticity {
            write_text(io, value, 24)?;
        }
        write_text(io, &self.white_point, 24)?;
        io.write_i32(self.job)?;
        write_text(io, &self.file_name, 128)?;
        write_text(io, &self.description, 128)?;
        write_text(io, &self.program, 64)?;
        write_text(io, &self.machine, 32)?;
        write_text(io, &self.user, 32)?;
        write_text(io, &self.date, 20)?;
        write_text(io, &self.aspect, 24)?;
        write_text(io, &self.aspect_ratio, 8)?;
        write_text(io, &self.color_format, 32)?;
        io.write_i16(self.field)?;
        write_text(io, &self.render_time, 12)?;
        write_text(io, &self.filter, 32)?;
        for value in [
            self.color_bit_depth,
            self.matte_channel_type,
            self.matte_bit_depth,
            self.aux_channel_type,
            self.aux_bit_depth,
        ] {
            io.write_i16(value)?;
        }
        write_text(io, &self.aux_format, 32)?;
        io.write_bytes(&[0u8; 36])?;
        io.write_i32(self.next_offset)
    }

    pub fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        let entries = [
            ("Description", &self.description),
            ("Program", &self.program),
            ("Machine", &self.machine),
            ("User", &self.user),
            ("Time", &self.date),
            ("Gamma", &self.gamma),
            ("Aspect Ratio", &self.aspect_ratio),
            ("Filter", &self.filter),
        ];
        for (key, value) in entries {
            if !value.is_empty() {
                tags.set(key, value.clone());
            }
        }
        tags
    }

    pub fn apply_tags(&mut self, tags: &Tags) {
        let fields = [
            ("Description", &mut self.description),
            ("Program", &mut self.program),
            ("Machine", &mut self.machine),
            ("User", &mut self.user),
            ("Time", &mut self.date),
        ];
        for (key, field) in fields {
            if let Some(value) = tags.get(key) {
                *field = value.to_string();
            }
        }
    }
}

fn read_header(io: &mut FileIo) -> Result<Header, FileIoError> {
    let mut window = [0i16; 4];
    for value in &mut window {
        *value = io.read_i16()?;
    }
    let mut active_window = [0i16; 4];
    for value in &mut active_window {
        *value = io.read_i16()?;
    }
    let frame = io.read_i16()?;
    let color_channel_type = io.read_i16()?;
    let color_channels = io.read_i16()?;
    let matte_channels = io.read_i16()?;
    let aux_channels = io.read_i16()?;
    let revision = io.read_i16()?;
    let gamma = read_text(io, 16)?;
    let chromaticity = [read_text(io, 24)?, read_text(io, 24)?, read_text(io, 24)?];
    let white_point = read_text(io, 24)?;
    let job = io.read_i32()?;
    let file_name = read_text(io, 128)?;
    let description = read_text(io, 128)?;
    let program = read_text(io, 64)?;
    let machine = read_text(io, 32)?;
    let user = read_text(io, 32)?;
    let date = read_text(io, 20)?;
    let aspect = read_text(io, 24)?;
    let aspect_ratio = read_text(io, 8)?;
    let color_format = read_text(io, 32)?;
    let field = io.read_i16()?;
    let render_time = read_text(io, 12)?;
    let filter = read_text(io, 32)?;
    let color_bit_depth = io.read_i16()?;
    let matte_channel_type = io.read_i16()?;
    let matte_bit_depth = io.read_i16()?;
    let aux_channel_type = io.read_i16()?;
    let aux_bit_depth = io.read_i16()?;
    let aux_format = read_text(io, 32)?;
    io.read_bytes(36)?;
    let next_offset = io.read_i32()?;
    Ok(Header {
        window,
        active_window,
        frame,
        color_channel_type,
        color_channels,
        matte_channels,
        aux_channels,
        revision,
        gamma,
        chromaticity,
        white_point,
        job,
        file_name,
        description,
        program,
        machine,
        user,
        date,
        aspect,
        aspect_ratio,
        color_format,
        field,
        render_time,
        filter,
        color_bit_depth,
        matte_channel_type,
        matte_bit_depth,
        aux_channel_type,
        aux_bit_depth,
        aux_format,
        next_offset,
    })
}

fn read_text(io: &mut FileIo, len: usize) -> Result<String, FileIoError> {
    let bytes = io.read_bytes(len)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&bytes[..end]).trim().to_string())
}

/// Zero padded, truncated to leave room for the terminator.
fn write_text(io: &mut FileIo, value: &str, len: usize) -> Result<(), FileIoError> {
    let mut bytes = vec![0u8; len];
    let count = value.len().min(len - 1);
    bytes[..count].copy_from_slice(&value.as_bytes()[..count]);
    io.write_bytes(&bytes)
}
