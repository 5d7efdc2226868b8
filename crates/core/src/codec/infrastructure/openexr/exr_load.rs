use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exr::block::reader::{ChunksReader, Reader};
use exr::block::UncompressedBlock;
use exr::error::{Error as ExrError, UnitResult};
use exr::math::Vec2;
use exr::meta::attribute::{IntegerBounds, SampleType};
use exr::meta::header::Header;
use half::f16;

use crate::codec::domain::io_plugin::{resolve_frame_path, CodecError, ErrorContext, IoInfo, Load, ReadRequest};
use crate::codec::infrastructure::openexr::PLUGIN_NAME;
use crate::sequence::domain::file_info::FileInfo;
use crate::shared::image::{Image, ImageInfo, Proxy, Tags};
use crate::shared::pixel::{DataType, PixelFormat, PixelType};

/// One addressable layer: a set of channels taken from one part of the file.
#[derive(Debug, Clone, PartialEq)]
struct LayerMap {
    part: usize,
    name: String,
    channels: Vec<usize>,
    pixel: PixelType,
}

/// Reads OpenEXR files and sequences. Every part and every channel prefix
/// group inside a part is exposed as its own layer.
///
/// Opening reads headers only. Each read decodes the blocks of the one part
/// the requested layer lives in.
pub struct ExrLoad {
    file: FileInfo,
    info: IoInfo,
}

impl ExrLoad {
    pub fn open(file: &FileInfo) -> Result<Self, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, file, None)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        let headers = open_reader(&path)
            .map_err(|e| exr_error(&context, e))?
            .into_meta_data()
            .headers;
        let maps = layer_maps(&headers);
        if maps.is_empty() {
            return Err(context.unsupported("no channels"));
        }
        let layers = maps.iter().map(|map| layer_info(&headers, map, &path)).collect::<Vec<_>>();
        log::debug!("{}: {} layer(s)", path.display(), layers.len());
        Ok(Self {
            file: file.clone(),
            info: IoInfo {
                layers,
                sequence: file.sequence().clone(),
            },
        })
    }
}

impl Load for ExrLoad {
    fn info(&self) -> &IoInfo {
        &self.info
    }

    fn read(&mut self, request: &ReadRequest) -> Result<Image, CodecError> {
        let path = resolve_frame_path(PLUGIN_NAME, &self.file, request.frame)?;
        let context = ErrorContext::new(PLUGIN_NAME, &path);
        let reader = open_reader(&path).map_err(|e| exr_error(&context, e))?;
        let maps = layer_maps(reader.headers());
        let map = maps
            .get(request.layer)
            .ok_or_else(|| context.layer(request.layer, maps.len()))?
            .clone();

        let info = layer_info(reader.headers(), &map, &path);
        let header = reader.headers()[map.part].clone();
        let planes = read_planes(reader, &map).map_err(|e| exr_error(&context, e))?;
        let data = interleave(&header, &planes, map.pixel);
        let image = Image::new(info, data).map_err(|e| context.image(e))?;
        Ok(match request.proxy {
            Proxy::None => image,
            proxy => image.proxy_scale(proxy),
        })
    }
}

/// Reads and validates the headers, leaving the pixel blocks untouched.
fn open_reader(path: &Path) -> exr::error::Result<Reader<BufReader<File>>> {
    exr::block::read(BufReader::new(File::open(path)?), false)
}

fn exr_error(context: &ErrorContext, error: ExrError) -> CodecError {
    match error {
        ExrError::NotSupported(reason) => context.unsupported(reason.to_string()),
        e => context.decode(e),
    }
}

/// Decodes the full resolution blocks of one part, keeping only the mapped
/// channels. Each plane covers the part's data window.
fn read_planes(reader: Reader<BufReader<File>>, map: &LayerMap) -> exr::error::Result<Vec<Vec<f32>>> {
    let part = map.part;
    let width = reader.headers()[part].layer_size.width();
    let mut planes = vec![vec![0.0f32; reader.headers()[part].layer_size.area()]; map.channels.len()];
    reader
        .filter_chunks(false, |_, tile, block| block.layer == part && tile.level_index == Vec2(0, 0))?
        .decompress_sequential(false, |meta, block| {
            copy_block(&meta.headers[block.index.layer], &block, &map.channels, width, &mut planes)
        })?;
    Ok(planes)
}

fn copy_block(
    header: &Header,
    block: &UncompressedBlock,
    channels: &[usize],
    width: usize,
    planes: &mut [Vec<f32>],
) -> UnitResult {
    for line in block.lines(&header.channels) {
        let Some(plane) = channels.iter().position(|&c| c == line.location.channel) else {
            continue;
        };
        let start = line.location.position.y() * width + line.location.position.x();
        let Some(target) = planes[plane].get_mut(start..start + line.location.sample_count) else {
            return Err(ExrError::Invalid("block outside the data window".into()));
        };
        match header.channels.list[line.location.channel].sample_type {
            SampleType::F16 => {
                for (value, sample) in target.iter_mut().zip(line.read_samples::<f16>()) {
                    *value = sample?.to_f32();
                }
            }
            SampleType::F32 => {
                for (value, sample) in target.iter_mut().zip(line.read_samples::<f32>()) {
                    *value = sample?;
                }
            }
            SampleType::U32 => {
                for (value, sample) in target.iter_mut().zip(line.read_samples::<u32>()) {
                    *value = sample? as f32;
                }
            }
        }
    }
    Ok(())
}

fn channel_suffix(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) => (&name[..index], &name[index + 1..]),
        None => ("", name),
    }
}

fn join_name(part: &str, prefix: &str) -> String {
    match (part.is_empty(), prefix.is_empty()) {
        (true, _) => prefix.to_string(),
        (false, true) => part.to_string(),
        (false, false) => format!("{part}.{prefix}"),
    }
}

/// Groups the channels of every part into layers. Within a prefix group the
/// colour channels R,G,B(,A) or Y(,A) form one layer; every other channel
/// becomes a single-channel layer.
fn layer_maps(headers: &[Header]) -> Vec<LayerMap> {
    let mut maps = Vec::new();
    for (part, header) in headers.iter().enumerate() {
        let part_name = header
            .own_attributes
            .layer_name
            .as_ref()
            .map(|n| n.to_string())
            .unwrap_or_default();
        let names: Vec<String> = header.channels.list.iter().map(|c| c.name.to_string()).collect();

        let mut prefixes: Vec<&str> = Vec::new();
        for name in &names {
            let prefix = channel_suffix(name).0;
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }

        for prefix in prefixes {
            let group: Vec<usize> = (0..names.len())
                .filter(|&i| channel_suffix(&names[i]).0 == prefix)
                .collect();
            let find = |wanted: &[&str]| {
                group.iter().copied().find(|&i| {
                    let suffix = channel_suffix(&names[i]).1;
                    wanted.iter().any(|n| n.eq_ignore_ascii_case(suffix))
                })
            };

            let mut known = match (find(&["r", "red"]), find(&["g", "green"]), find(&["b", "blue"])) {
                (Some(r), Some(g), Some(b)) => vec![r, g, b],
                _ => find(&["y"]).map(|y| vec![y]).unwrap_or_default(),
            };
            if !known.is_empty() {
                if let Some(a) = find(&["a", "alpha"]) {
                    known.push(a);
                }
                maps.push(map_for(part, join_name(&part_name, prefix), &known, header));
            }
            for &i in group.iter().filter(|i| !known.contains(i)) {
                maps.push(map_for(part, join_name(&part_name, &names[i]), &[i], header));
            }
        }
    }
    maps
}

fn map_for(part: usize, name: String, indices: &[usize], header: &Header) -> LayerMap {
    let format = match indices.len() {
        1 => PixelFormat::L,
        2 => PixelFormat::La,
        3 => PixelFormat::Rgb,
        _ => PixelFormat::Rgba,
    };
    let all_half = indices
        .iter()
        .all(|&i| header.channels.list[i].sample_type == SampleType::F16);
    let data_type = if all_half { DataType::F16 } else { DataType::F32 };
    LayerMap {
        part,
        name,
        channels: indices.to_vec(),
        pixel: PixelType::new(format, data_type),
    }
}

fn bounds_text(bounds: &IntegerBounds) -> String {
    format!(
        "{} {} {} {}",
        bounds.position.x(),
        bounds.position.y(),
        bounds.size.width(),
        bounds.size.height()
    )
}

fn layer_info(headers: &[Header], map: &LayerMap, path: &Path) -> ImageInfo {
    let header = &headers[map.part];
    let display = header.shared_attributes.display_window;
    let layer = &header.own_attributes;

    let mut tags = Tags::new();
    if !map.name.is_empty() {
        tags.set("Layer", map.name.clone());
    }
    tags.set("Display Window", bounds_text(&display));
    tags.set("Data Window", bounds_text(&header.data_window()));
    tags.set("Pixel Aspect", header.shared_attributes.pixel_aspect.to_string());
    let text_attributes = [
        ("Owner", &layer.owner),
        ("Comments", &layer.comments),
        ("Capture Date", &layer.capture_date),
        ("Software", &layer.software_name),
    ];
    for (key, value) in text_attributes {
        if let Some(value) = value {
            tags.set(key, value.to_string());
        }
    }

    let mut info = ImageInfo::new(display.size.width() as u32, display.size.height() as u32, map.pixel);
    info.file_name = path.to_string_lossy().into_owned();
    info.layer_name = map.name.clone();
    info.tags = tags;
    info
}

fn push_sample(out: &mut Vec<u8>, data_type: DataType, value: f32) {
    if data_type == DataType::F32 {
        out.extend_from_slice(&value.to_ne_bytes());
    } else {
        out.extend_from_slice(&f16::from_f32(value).to_ne_bytes());
    }
}

/// Interleaves the planes into display window sized pixels. Pixels outside
/// the data window stay zero.
fn interleave(header: &Header, planes: &[Vec<f32>], pixel: PixelType) -> Vec<u8> {
    let display = header.shared_attributes.display_window;
    let data = header.data_window();
    let (width, height) = (display.size.width(), display.size.height());
    let pixel_bytes = pixel.bytes_per_pixel();

    if data == display {
        let mut out = Vec::with_capacity(width * height * pixel_bytes);
        for index in 0..width * height {
            for plane in planes {
                push_sample(&mut out, pixel.data_type, plane[index]);
            }
        }
        return out;
    }

    let mut out = vec![0u8; width * height * pixel_bytes];
    let (data_width, data_height) = (data.size.width() as i64, data.size.height() as i64);
    let mut scratch = Vec::with_capacity(pixel_bytes);
    for y in 0..height {
        let dy = display.position.y() as i64 + y as i64 - data.position.y() as i64;
        if dy < 0 || dy >= data_height {
            continue;
        }
        for x in 0..width {
            let dx = display.position.x() as i64 + x as i64 - data.position.x() as i64;
            if dx < 0 || dx >= data_width {
                continue;
            }
            let index = dy as usize * data_width as usize + dx as usize;
            scratch.clear();
            for plane in planes {
                push_sample(&mut scratch, pixel.data_type, plane[index]);
            }
            let at = (y * width + x) * pixel_bytes;
            out[at..at + pixel_bytes].copy_from_slice(&scratch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use exr::image::write::WritableImage;
    use exr::image::{AnyChannel, AnyChannels, Encoding, FlatSamples, Layer};
    use exr::meta::header::{ImageAttributes, LayerAttributes};

    fn channel(name: &str, values: Vec<f32>) -> AnyChannel<FlatSamples> {
        AnyChannel::new(name, FlatSamples::F32(values))
    }

    fn write_exr(path: &Path, display: IntegerBounds, position: (i32, i32), size: (usize, usize), channels: Vec<AnyChannel<FlatSamples>>) {
        let mut layer = Layer::new(
            size,
            LayerAttributes::named("beauty"),
            Encoding::UNCOMPRESSED,
            AnyChannels::sort(channels.into()),
        );
        layer.attributes.layer_position = Vec2(position.0, position.1);
        let image = exr::image::Image::from_layers(ImageAttributes::new(display), vec![layer]);
        image.write().to_file(path).unwrap();
    }

    #[test]
    fn test_data_window_inside_display_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("window.exr");
        let values: Vec<f32> = (1..=4).map(|v| v as f32).collect();
        write_exr(
            &path,
            IntegerBounds::new(Vec2(0, 0), Vec2(4, 3)),
            (1, 1),
            (2, 2),
            vec![channel("Y", values)],
        );

        let mut load = ExrLoad::open(&FileInfo::from_path(&path)).unwrap();
        let info = load.info().first_layer().unwrap().clone();
        assert_eq!((info.width, info.height), (4, 3));
        assert_eq!(info.pixel, PixelType::L_F32);
        assert_eq!(info.tags.get("Data Window"), Some("1 1 2 2"));

        let image = load.read(&ReadRequest::new()).unwrap();
        let samples = image.samples::<f32>();
        #[rustfmt::skip]
        let expected = [
            0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 2.0, 0.0,
            0.0, 3.0, 4.0, 0.0,
        ];
        assert_eq!(samples, expected);
    }

    #[test]
    fn test_data_window_clipped_by_display_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.exr");
        let values: Vec<f32> = (0..9).map(|v| v as f32).collect();
        write_exr(
            &path,
            IntegerBounds::new(Vec2(0, 0), Vec2(2, 2)),
            (-1, 0),
            (3, 3),
            vec![channel("Y", values)],
        );

        let image = ExrLoad::open(&FileInfo::from_path(&path))
            .unwrap()
            .read(&ReadRequest::new())
            .unwrap();
        assert_eq!(image.samples::<f32>(), vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_disjoint_windows_read_black() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outside.exr");
        write_exr(
            &path,
            IntegerBounds::new(Vec2(0, 0), Vec2(2, 1)),
            (10, 10),
            (1, 1),
            vec![channel("Y", vec![7.0])],
        );

        let image = ExrLoad::open(&FileInfo::from_path(&path))
            .unwrap()
            .read(&ReadRequest::new())
            .unwrap();
        assert_eq!(image.samples::<f32>(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_prefix_groups_become_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aovs.exr");
        let display = IntegerBounds::new(Vec2(0, 0), Vec2(1, 1));
        write_exr(
            &path,
            display,
            (0, 0),
            (1, 1),
            vec![
                channel("A", vec![1.0]),
                channel("B", vec![0.25]),
                channel("G", vec![0.5]),
                channel("R", vec![0.75]),
                channel("diffuse.B", vec![0.1]),
                channel("diffuse.G", vec![0.2]),
                channel("diffuse.R", vec![0.3]),
                channel("depth.Z", vec![9.0]),
            ],
        );

        let mut load = ExrLoad::open(&FileInfo::from_path(&path)).unwrap();
        let names: Vec<&str> = load.info().layers.iter().map(|l| l.layer_name.as_str()).collect();
        assert_eq!(names, vec!["beauty", "beauty.depth.Z", "beauty.diffuse"]);
        assert_eq!(load.info().layers[0].pixel, PixelType::RGBA_F32);
        assert_eq!(load.info().layers[2].pixel, PixelType::RGB_F32);

        let beauty = load.read(&ReadRequest::new()).unwrap().samples::<f32>();
        assert_relative_eq!(beauty.as_slice(), [0.75f32, 0.5, 0.25, 1.0].as_slice());
        let diffuse = load.read(&ReadRequest::new().with_layer(2)).unwrap().samples::<f32>();
        assert_relative_eq!(diffuse.as_slice(), [0.3f32, 0.2, 0.1].as_slice());

        let err = load.read(&ReadRequest::new().with_layer(3)).unwrap_err();
        assert!(matches!(err, CodecError::LayerOutOfRange { layer: 3, count: 3, .. }));
    }

    #[test]
    fn test_half_channels_stay_half() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.exr");
        let half = |v: f32| AnyChannel::new("Y", FlatSamples::F16(vec![f16::from_f32(v)]));
        write_exr(&path, IntegerBounds::new(Vec2(0, 0), Vec2(1, 1)), (0, 0), (1, 1), vec![half(0.5)]);

        let image = ExrLoad::open(&FileInfo::from_path(&path))
            .unwrap()
            .read(&ReadRequest::new())
            .unwrap();
        assert_eq!(image.pixel(), PixelType::new(PixelFormat::L, DataType::F16));
        assert_eq!(image.samples::<f16>(), vec![f16::from_f32(0.5)]);
    }

    fn named_layer(name: &str, channels: Vec<AnyChannel<FlatSamples>>) -> Layer<AnyChannels<FlatSamples>> {
        Layer::new(
            (1, 1),
            LayerAttributes::named(name),
            Encoding::UNCOMPRESSED,
            AnyChannels::sort(channels.into()),
        )
    }

    #[test]
    fn test_read_decodes_requested_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parts.exr");
        let display = IntegerBounds::new(Vec2(0, 0), Vec2(1, 1));
        let layers = vec![
            named_layer(
                "beauty",
                vec![channel("B", vec![0.25]), channel("G", vec![0.5]), channel("R", vec![0.75])],
            ),
            named_layer("depth", vec![channel("Z", vec![42.0])]),
        ];
        exr::image::Image::from_layers(ImageAttributes::new(display), layers)
            .write()
            .to_file(&path)
            .unwrap();

        let mut load = ExrLoad::open(&FileInfo::from_path(&path)).unwrap();
        let names: Vec<&str> = load.info().layers.iter().map(|l| l.layer_name.as_str()).collect();
        assert_eq!(names, vec!["beauty", "depth.Z"]);

        let depth = load.read(&ReadRequest::new().with_layer(1)).unwrap();
        assert_eq!(depth.pixel(), PixelType::L_F32);
        assert_eq!(depth.samples::<f32>(), vec![42.0]);
        let beauty = load.read(&ReadRequest::new()).unwrap().samples::<f32>();
        assert_relative_eq!(beauty.as_slice(), [0.75f32, 0.5, 0.25].as_slice());
    }

    #[test]
    fn test_open_reads_headers_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.exr");
        let values: Vec<f32> = (0..64).map(|v| v as f32).collect();
        write_exr(
            &path,
            IntegerBounds::new(Vec2(0, 0), Vec2(8, 8)),
            (0, 0),
            (8, 8),
            vec![channel("Y", values)],
        );
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 40]).unwrap();

        let mut load = ExrLoad::open(&FileInfo::from_path(&path)).unwrap();
        let info = load.info().first_layer().unwrap();
        assert_eq!((info.width, info.height), (8, 8));
        assert!(load.read(&ReadRequest::new()).is_err());
    }

    #[test]
    fn test_subsampled_channel_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chroma.exr");
        write_exr(
            &path,
            IntegerBounds::new(Vec2(0, 0), Vec2(2, 2)),
            (0, 0),
            (2, 2),
            vec![channel("Y", vec![1.0, 2.0, 3.0, 4.0])],
        );

        // chlist value: "Y\0", type i32, linear u8, 3 reserved, x and y sampling i32.
        let mut bytes = std::fs::read(&path).unwrap();
        let tag = b"chlist\0";
        let attribute = bytes.windows(tag.len()).position(|w| w == tag).unwrap();
        let channel_start = attribute + tag.len() + 4;
        assert_eq!(&bytes[channel_start..channel_start + 2], b"Y\0");
        let sampling = channel_start + 2 + 4 + 1 + 3;
        bytes[sampling..sampling + 4].copy_from_slice(&2i32.to_le_bytes());
        bytes[sampling + 4..sampling + 8].copy_from_slice(&2i32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let err = ExrLoad::open(&FileInfo::from_path(&path)).err().unwrap();
        assert!(matches!(err, CodecError::Unsupported { .. }), "{err}");
    }
}
