//! Softimage PIC reader. Saving is not supported.

use std::path::Path;

use crate::codec::domain::io_plugin::{resolve_frame_path, CodecError, ErrorContext, IoInfo, IoPlugin, Load, ReadRequest};
use crate::io::file_io::{FileIo, FileIoError, OpenMode};
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::byte_order::Endian;
use crate::shared::image::{Image, ImageInfo, Proxy};
use crate::shared::pixel::PixelType;

pub const PLUGIN_NAME: &str = "PIC";
pub const EXTENSIONS: &[&str] = &[".pic"];

const MAGIC: u32 = 0x5380_F634;
const PICTURE_ID: &[u8; 4] = b"PICT";
const COMMENT_SIZE: usize = 80;

const CHANNEL_R: u8 = 0x80;
const CHANNEL_G: u8 = 0x40;
const CHANNEL_B: u8 = 0x20;
const CHANNEL_A: u8 = 0x10;
const CHANNEL_RGB: u8 = CHANNEL_R | CHANNEL_G | CHANNEL_B;

const ENCODING_MIXED_RLE: u8 = 2;

/// One entry of the channel descriptor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChannelPacket {
    chained: bool,
    size: u8,
    encoding: u8,
    channels: u8,
}

/// Channel groups stored for every scanline, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Rgb { rle: bool },
    Rgba { rle: bool },
    /// RGB followed by a separate alpha group.
    RgbThenA { rgb_rle: bool, a_rle: bool },
}

impl Layout {
    fn pixel(self) -> PixelType {
        match self {
            Layout::Rgb { .. } => PixelType::RGB_U8,
            _ => PixelType::RGBA_U8,
        }
    }

    /// `(channel offset, channel count, run-length coded)` per group.
    fn groups(self) -> Vec<(usize, usize, bool)> {
        match self {
            Layout::Rgb { rle } => vec![(0, 3, rle)],
            Layout::Rgba { rle } => vec![(0, 4, rle)],
            Layout::RgbThenA { rgb_rle, a_rle } => vec![(0, 3, rgb_rle), (3, 1, a_rle)],
        }
    }
}

struct Frame {
    info: ImageInfo,
    layout: Layout,
}

pub struct PicLoad {
    file: FileInfo,
    info: IoInfo,
}

impl PicLoad {
    pub fn open(file: &FileInfo) -> Result<Self, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, file, None)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        let (_, frame) = open_frame(&path, &context)?;
        Ok(Self {
            file: file.clone(),
            info: IoInfo::new(frame.info).with_sequence(file.sequence().clone()),
        })
    }
}

impl Load for PicLoad {
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
        let remaining = (io.size() - io.pos()) as usize;
        let data = io.read_bytes(remaining).map_err(|e| context.io(e))?;
        io.close();

        let stride = frame.info.pixel.channels();
        let width = frame.info.width as usize;
        let groups = frame.layout.groups();
        let mut image = Image::zeroed(frame.info);
        let mut p = 0;
        for y in 0..image.height() {
            let row = image.row_mut(y);
            for &(offset, channels, rle) in &groups {
                let result = if rle {
                    read_mixed_rle(&data, &mut p, row, width, offset, channels, stride)
                } else {
                    read_raw(&data, &mut p, row, width, offset, channels, stride)
                };
                result.map_err(|reason| context.corrupt(format!("scanline {y}: {reason}")))?;
            }
        }

        Ok(match request.proxy {
            Proxy::None => image,
            proxy => image.proxy_scale(proxy),
        })
    }
}

#[derive(Debug, Default)]
pub struct PicPlugin;

impl PicPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl IoPlugin for PicPlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    fn create_load(&self, file: &FileInfo) -> Result<Box<dyn Load>, CodecError> {
        Ok(Box::new(PicLoad::open(file)?))
    }
}

fn read_packet(io: &mut FileIo) -> Result<ChannelPacket, FileIoError> {
    Ok(ChannelPacket {
        chained: io.read_u8()? != 0,
        size: io.read_u8()?,
        encoding: io.read_u8()?,
        channels: io.read_u8()?,
    })
}

fn open_frame(path: &Path, context: &ErrorContext) -> Result<(FileIo, Frame), CodecError> {
    let mut io = FileIo::open(path, OpenMode::Read).map_err(|e| context.io(e))?;
    io.set_endian(Endian::Msb);
    let io_err = |e| context.io(e);

    if io.read_u32().map_err(io_err)? != MAGIC {
        return Err(context.unsupported("bad magic number"));
    }
    let _version = io.read_f32().map_err(io_err)?;
    let comment = io.read_bytes(COMMENT_SIZE).map_err(io_err)?;
    if io.read_bytes(4).map_err(io_err)? != PICTURE_ID {
        return Err(context.unsupported("missing PICT id"));
    }
    let width = io.read_u16().map_err(io_err)?;
    let height = io.read_u16().map_err(io_err)?;
    let ratio = io.read_f32().map_err(io_err)?;
    let _fields = io.read_u16().map_err(io_err)?;
    io.seek(2).map_err(io_err)?;
    if width == 0 || height == 0 {
        return Err(context.corrupt("empty image"));
    }

    let first = read_packet(&mut io).map_err(io_err)?;
    let rle = first.encoding == ENCODING_MIXED_RLE;
    let rgb = first.channels & CHANNEL_RGB == CHANNEL_RGB && first.size == 8;
    let layout = match (rgb, first.channels & CHANNEL_A != 0, first.chained) {
        (true, true, false) => Layout::Rgba { rle },
        (true, false, false) => Layout::Rgb { rle },
        (true, false, true) => {
            let second = read_packet(&mut io).map_err(io_err)?;
            if second.channels != CHANNEL_A || second.size != 8 || second.chained {
                return Err(context.unsupported(format!("channel packet {second:?} after RGB")));
            }
            Layout::RgbThenA {
                rgb_rle: rle,
                a_rle: second.encoding == ENCODING_MIXED_RLE,
            }
        }
        _ => return Err(context.unsupported(format!("channel packet {first:?}"))),
    };

    let mut info = ImageInfo::new(width as u32, height as u32, layout.pixel());
    info.file_name = path.to_string_lossy().into_owned();
    info.mirror.y = true;
    info.endian = Endian::Msb;
    let end = comment.iter().position(|&b| b == 0).unwrap_or(COMMENT_SIZE);
    if end > 0 {
        info.tags.set("Description", String::from_utf8_lossy(&comment[..end]).into_owned());
    }
    if ratio > 0.0 {
        info.tags.set("Pixel Aspect", ratio.to_string());
    }
    Ok((io, Frame { info, layout }))
}

fn read_raw(
    data: &[u8],
    p: &mut usize,
    row: &mut [u8],
    width: usize,
    offset: usize,
    channels: usize,
    stride: usize,
) -> Result<(), String> {
    let len = width * channels;
    let src = data.get(*p..*p + len).ok_or("raw data ends early")?;
    for (x, pixel) in src.chunks_exact(channels).enumerate() {
        let at = x * stride + offset;
        row[at..at + channels].copy_from_slice(pixel);
    }
    *p += len;
    Ok(())
}

/// Mixed run-length packets: `c < 128` is `c + 1` literal pixels, `c == 128`
/// a 16-bit count and one pixel, `c > 128` is `c - 127` repeats of one pixel.
fn read_mixed_rle(
    data: &[u8],
    p: &mut usize,
    row: &mut [u8],
    width: usize,
    offset: usize,
    channels: usize,
    stride: usize,
) -> Result<(), String> {
    let mut x = 0;
    while x < width {
        let control = *data.get(*p).ok_or("run-length data ends early")?;
        *p += 1;
        let (count, literal) = match control {
            0..=127 => (control as usize + 1, true),
            128 => {
                let bytes = data.get(*p..*p + 2).ok_or("run-length data ends early")?;
                *p += 2;
                (u16::from_be_bytes([bytes[0], bytes[1]]) as usize, false)
            }
            _ => (control as usize - 127, false),
        };
        if x + count > width {
            return Err(format!("run of {count} at {x} overflows a row of {width}"));
        }
        let len = if literal { count * channels } else { channels };
        let src = data.get(*p..*p + len).ok_or("run-length data ends early")?;
        for i in 0..count {
            let pixel = if literal { &src[i * channels..(i + 1) * channels] } else { src };
            let at = (x + i) * stride + offset;
            row[at..at + channels].copy_from_slice(pixel);
        }
        *p += len;
        x += count;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(width: u16, height: u16, comment: &str) -> Vec<u8> {
        let mut out = MAGIC.to_be_bytes().to_vec();
        out.extend(3.71f32.to_be_bytes());
        let mut text = [0u8; COMMENT_SIZE];
        text[..comment.len()].copy_from_slice(comment.as_bytes());
        out.extend(text);
        out.extend(PICTURE_ID);
        out.extend(width.to_be_bytes());
        out.extend(height.to_be_bytes());
        out.extend(1.0f32.to_be_bytes());
        out.extend(3u16.to_be_bytes());
        out.extend([0, 0]);
        out
    }

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_rle_rgb_with_raw_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = header(3, 1, "softimage render");
        bytes.extend([1, 8, ENCODING_MIXED_RLE, CHANNEL_RGB]);
        bytes.extend([0, 8, 0, CHANNEL_A]);
        // Two repeats of (1,2,3), one literal (4,5,6).
        bytes.extend([129, 1, 2, 3, 0, 4, 5, 6]);
        bytes.extend([10, 20, 30]);
        let path = write(dir.path(), "a.pic", &bytes);

        let mut load = PicLoad::open(&FileInfo::from_path(&path)).unwrap();
        let info = load.info().first_layer().unwrap().clone();
        assert_eq!(info.pixel, PixelType::RGBA_U8);
        assert!(info.mirror.y);
        assert_eq!(info.tags.get("Description"), Some("softimage render"));

        let image = load.read(&ReadRequest::new()).unwrap();
        assert_eq!(image.data(), &[1, 2, 3, 10, 1, 2, 3, 20, 4, 5, 6, 30]);
    }

    #[test]
    fn test_long_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = header(300, 1, "");
        bytes.extend([0, 8, ENCODING_MIXED_RLE, CHANNEL_RGB]);
        bytes.extend([128, 0x01, 0x2c, 9, 8, 7]);
        let path = write(dir.path(), "long.pic", &bytes);

        let image = PicLoad::open(&FileInfo::from_path(&path))
            .unwrap()
            .read(&ReadRequest::new())
            .unwrap();
        assert_eq!(image.pixel(), PixelType::RGB_U8);
        assert!(image.data().chunks_exact(3).all(|p| p == [9, 8, 7]));
        assert!(image.tags().get("Description").is_none());
    }

    #[test]
    fn test_raw_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = header(1, 2, "");
        bytes.extend([0, 8, 0, CHANNEL_RGB | CHANNEL_A]);
        bytes.extend([1, 2, 3, 4, 5, 6, 7, 8]);
        let path = write(dir.path(), "raw.pic", &bytes);

        let image = PicLoad::open(&FileInfo::from_path(&path))
            .unwrap()
            .read(&ReadRequest::new())
            .unwrap();
        assert_eq!(image.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_truncated_and_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = header(4, 1, "");
        bytes.extend([0, 8, ENCODING_MIXED_RLE, CHANNEL_RGB]);
        bytes.extend([130, 1, 2, 3]);
        let path = write(dir.path(), "short.pic", &bytes);
        let err = PicLoad::open(&FileInfo::from_path(&path))
            .unwrap()
            .read(&ReadRequest::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::Corrupt { .. }));

        let path = write(dir.path(), "bad.pic", &[0u8; 200]);
        let err = PicLoad::open(&FileInfo::from_path(&path)).err().unwrap();
        assert!(matches!(err, CodecError::Unsupported { .. }));
    }

    #[test]
    fn test_save_refused() {
        let plugin = PicPlugin::new();
        let file = FileInfo::parse("out.pic");
        let err = plugin
            .create_save(&file, &IoInfo::new(ImageInfo::new(1, 1, PixelType::RGB_U8)))
            .err()
            .unwrap();
        assert!(matches!(err, CodecError::SaveRefused { plugin: "PIC", .. }));
    }
}
