use std::path::Path;

use crate::codec::domain::io_plugin::{resolve_frame_path, CodecError, ErrorContext, IoInfo, Load, ReadRequest};
use crate::codec::infrastructure::rla::header::{ChannelKind, Header, HEADER_SIZE};
use crate::codec::infrastructure::rla::rle;
use crate::codec::infrastructure::rla::PLUGIN_NAME;
use crate::io::file_io::{FileIo, OpenMode};
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::byte_order::Endian;
use crate::shared::image::{Image, ImageInfo, Proxy};
use crate::shared::pixel::{DataType, PixelFormat, PixelType};

/// One stored channel: how it is coded and its integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Channel {
    kind: ChannelKind,
    bit_depth: u32,
}

impl Channel {
    fn max_code(&self) -> f32 {
        ((1u64 << self.bit_depth) - 1) as f32
    }
}

struct Frame {
    info: ImageInfo,
    channels: Vec<Channel>,
    offsets: Vec<i32>,
}

/// Reads Wavefront RLA files and sequences.
pub struct RlaLoad {
    file: FileInfo,
    info: IoInfo,
}

impl RlaLoad {
    pub fn open(file: &FileInfo) -> Result<Self, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, file, None)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        let (_, frame) = open_frame(&path, &context)?;
        log::debug!(
            "{}: {} {}x{}",
            path.display(),
            frame.info.pixel,
            frame.info.width,
            frame.info.height
        );
        Ok(Self {
            file: file.clone(),
            info: IoInfo::new(frame.info).with_sequence(file.sequence().clone()),
        })
    }
}

impl Load for RlaLoad {
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
        let pixel = frame.info.pixel;
        let width = frame.info.width as usize;
        let channel_count = frame.channels.len();
        let sample_bytes = pixel.data_type.byte_count();
        let mut image = Image::zeroed(frame.info);

        for (y, &offset) in frame.offsets.iter().enumerate() {
            io.set_pos(offset as u64).map_err(|e| context.io(e))?;
            let row = image.row_mut(y as u32);
            for (c, channel) in frame.channels.iter().enumerate() {
                let len = io.read_u16().map_err(|e| context.io(e))? as usize;
                let payload = io.read_bytes(len).map_err(|e| context.io(e))?;
                let values = decode_channel(channel, &payload, width, pixel.data_type)
                    .map_err(|reason| context.corrupt(format!("scanline {y}, channel {c}: {reason}")))?;
                for (x, value) in values.into_iter().enumerate() {
                    let at = (x * channel_count + c) * sample_bytes;
                    row[at..at + sample_bytes].copy_from_slice(&value[..sample_bytes]);
                }
            }
        }
        io.close();

        Ok(match request.proxy {
            Proxy::None => image,
            proxy => image.proxy_scale(proxy),
        })
    }
}

/// Decodes one channel of a scanline to native-endian samples of
/// `data_type`, each padded to four bytes.
fn decode_channel(channel: &Channel, payload: &[u8], width: usize, data_type: DataType) -> Result<Vec<[u8; 4]>, String> {
    let normalized: Vec<f32> = match channel.kind {
        ChannelKind::Float => {
            if payload.len() < width * 4 {
                return Err(format!("{} bytes of float data, {} expected", payload.len(), width * 4));
            }
            payload
                .chunks_exact(4)
                .take(width)
                .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        }
        ChannelKind::Int { bytes } => {
            let codes = rle::decode(payload, width, bytes).map_err(|e| e.to_string())?;
            let max_code = channel.max_code();
            let native = data_type.bit_depth() as u32 == channel.bit_depth && data_type != DataType::F32;
            if native {
                return Ok(codes.into_iter().map(|code| widen(code, data_type)).collect());
            }
            codes.into_iter().map(|code| code as f32 / max_code).collect()
        }
    };
    Ok(normalized
        .into_iter()
        .map(|value| match data_type {
            DataType::F32 => value.to_ne_bytes(),
            _ => widen((value.clamp(0.0, 1.0) * data_type.max_value() as f32).round() as u32, data_type),
        })
        .collect())
}

fn widen(code: u32, data_type: DataType) -> [u8; 4] {
    let mut out = [0u8; 4];
    match data_type {
        DataType::U8 => out[0] = code as u8,
        _ => out[..2].copy_from_slice(&(code as u16).to_ne_bytes()),
    }
    out
}

fn open_frame(path: &Path, context: &ErrorContext) -> Result<(FileIo, Frame), CodecError> {
    let mut io = FileIo::open(path, OpenMode::Read).map_err(|e| context.io(e))?;
    let header = Header::read(&mut io, context)?;

    if header.matte_channels > 1 {
        return Err(context.unsupported(format!("{} matte channels", header.matte_channels)));
    }
    if header.field != 0 {
        return Err(context.unsupported("field rendered image"));
    }
    if !(1..=3).contains(&header.color_channels) {
        return Err(context.unsupported(format!("{} color channels", header.color_channels)));
    }
    let (width, height) = (header.width(), header.height());
    if width <= 0 || height <= 0 {
        return Err(context.corrupt(format!("invalid active window {:?}", header.active_window)));
    }

    let color = ChannelKind::from_header(header.color_channel_type, header.color_bit_depth).ok_or_else(|| {
        context.unsupported(format!(
            "color channel type {} with {} bits",
            header.color_channel_type, header.color_bit_depth
        ))
    })?;
    let mut channels = vec![
        Channel {
            kind: color,
            bit_depth: header.color_bit_depth as u32,
        };
        header.color_channels as usize
    ];
    if header.matte_channels == 1 {
        let matte = ChannelKind::from_header(header.matte_channel_type, header.matte_bit_depth).ok_or_else(|| {
            context.unsupported(format!(
                "matte channel type {} with {} bits",
                header.matte_channel_type, header.matte_bit_depth
            ))
        })?;
        channels.push(Channel {
            kind: matte,
            bit_depth: header.matte_bit_depth as u32,
        });
    }

    let data_type = if channels.iter().any(|c| c.kind == ChannelKind::Float) {
        DataType::F32
    } else if channels.iter().any(|c| c.kind == ChannelKind::Int { bytes: 2 }) {
        DataType::U16
    } else {
        DataType::U8
    };
    let format = PixelFormat::from_channels(channels.len()).ok_or_else(|| context.unsupported("channel count"))?;

    io.set_pos(HEADER_SIZE).map_err(|e| context.io(e))?;
    let mut offsets = Vec::with_capacity(height as usize);
    for _ in 0..height {
        let offset = io.read_i32().map_err(|e| context.io(e))?;
        if offset < 0 || offset as u64 >= io.size() {
            return Err(context.corrupt(format!("scanline offset {offset} outside the file")));
        }
        offsets.push(offset);
    }

    let mut info = ImageInfo::new(width as u32, height as u32, PixelType::new(format, data_type));
    info.file_name = path.to_string_lossy().into_owned();
    info.mirror.y = true;
    info.endian = Endian::Msb;
    info.tags = header.tags();
    Ok((io, Frame { info, channels, offsets }))
}
