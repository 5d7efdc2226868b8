use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::domain::plugin_options::{OptionError, OptionListener};
use crate::io::file_io::FileIoError;
use crate::sequence::domain::file_info::FileInfo;
use crate::sequence::domain::frame_sequence::FrameSequence;
use crate::shared::image::{Image, ImageError, ImageInfo, Proxy};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{plugin}: {source}")]
    Io {
        plugin: &'static str,
        path: PathBuf,
        #[source]
        source: FileIoError,
    },
    #[error("{plugin}: {path}: unsupported file: {reason}")]
    Unsupported {
        plugin: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error("{plugin}: {path}: corrupt file: {reason}")]
    Corrupt {
        plugin: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error("{plugin}: {path}: cannot save: {reason}")]
    SaveRefused {
        plugin: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error("{plugin}: {path}: frame {frame} is not part of the sequence")]
    FrameOutOfRange {
        plugin: &'static str,
        path: PathBuf,
        frame: i64,
    },
    #[error("{plugin}: {path}: layer {layer} requested, file has {count}")]
    LayerOutOfRange {
        plugin: &'static str,
        path: PathBuf,
        layer: usize,
        count: usize,
    },
    #[error("{plugin}: {path}: {source}")]
    Image {
        plugin: &'static str,
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error("{plugin}: {path}: {source}")]
    Decode {
        plugin: &'static str,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CodecError {
    pub fn plugin(&self) -> &'static str {
        match self {
            CodecError::Io { plugin, .. }
            | CodecError::Unsupported { plugin, .. }
            | CodecError::Corrupt { plugin, .. }
            | CodecError::SaveRefused { plugin, .. }
            | CodecError::FrameOutOfRange { plugin, .. }
            | CodecError::LayerOutOfRange { plugin, .. }
            | CodecError::Image { plugin, .. }
            | CodecError::Decode { plugin, .. } => plugin,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            CodecError::Io { path, .. }
            | CodecError::Unsupported { path, .. }
            | CodecError::Corrupt { path, .. }
            | CodecError::SaveRefused { path, .. }
            | CodecError::FrameOutOfRange { path, .. }
            | CodecError::LayerOutOfRange { path, .. }
            | CodecError::Image { path, .. }
            | CodecError::Decode { path, .. } => path,
        }
    }
}

/// Plugin name and file path stamped onto every error a codec raises.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    plugin: &'static str,
    path: PathBuf,
}

impl ErrorContext {
    pub fn new(plugin: &'static str, path: impl Into<PathBuf>) -> Self {
        Self {
            plugin,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn io(&self, source: FileIoError) -> CodecError {
        CodecError::Io {
            plugin: self.plugin,
            path: self.path.clone(),
            source,
        }
    }

    pub fn unsupported(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Unsupported {
            plugin: self.plugin,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Corrupt {
            plugin: self.plugin,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    pub fn refused(&self, reason: impl Into<String>) -> CodecError {
        CodecError::SaveRefused {
            plugin: self.plugin,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    pub fn image(&self, source: ImageError) -> CodecError {
        CodecError::Image {
            plugin: self.plugin,
            path: self.path.clone(),
            source,
        }
    }

    pub fn decode(&self, source: impl std::error::Error + Send + Sync + 'static) -> CodecError {
        CodecError::Decode {
            plugin: self.plugin,
            path: self.path.clone(),
            source: Box::new(source),
        }
    }

    pub fn layer(&self, layer: usize, count: usize) -> CodecError {
        CodecError::LayerOutOfRange {
            plugin: self.plugin,
            path: self.path.clone(),
            layer,
            count,
        }
    }
}

/// What an opened file contains: one `ImageInfo` per addressable layer and
/// the frames it spans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IoInfo {
    pub layers: Vec<ImageInfo>,
    pub sequence: FrameSequence,
}

impl IoInfo {
    pub fn new(info: ImageInfo) -> Self {
        Self {
            layers: vec![info],
            sequence: FrameSequence::new(),
        }
    }

    pub fn with_sequence(mut self, sequence: FrameSequence) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn first_layer(&self) -> Option<&ImageInfo> {
        self.layers.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadRequest {
    /// `None` reads the first frame of a sequence, or the file itself.
    pub frame: Option<i64>,
    pub layer: usize,
    pub proxy: Proxy,
}

impl ReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(frame: i64) -> Self {
        Self {
            frame: Some(frame),
            ..Self::default()
        }
    }

    pub fn with_layer(mut self, layer: usize) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = proxy;
        self
    }
}

/// An opened file (or sequence) that decodes frames on demand.
///
/// Construction parses the header, so a `Load` that exists is open.
/// Dropping it releases any handles.
pub trait Load: Send {
    fn info(&self) -> &IoInfo;

    /// Decodes one frame. Frames may be requested in any order.
    fn read(&mut self, request: &ReadRequest) -> Result<Image, CodecError>;

    fn close(&mut self) {}
}

/// Writes frames of one layout. Implementations finalize in `close`, and
/// again best-effort from `Drop` when `close` was not called.
pub trait Save: Send {
    fn write(&mut self, image: &Image, frame: Option<i64>) -> Result<(), CodecError>;

    fn close(&mut self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// A registered file format.
pub trait IoPlugin: Send {
    fn name(&self) -> &'static str;

    /// Lower-case extensions with the leading dot.
    fn extensions(&self) -> &[&'static str];

    /// Whether numbered files of this format form frame sequences.
    fn is_sequence(&self) -> bool {
        true
    }

    fn option_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn option(&self, _name: &str) -> Option<String> {
        None
    }

    fn option_domain(&self, _name: &str) -> Option<Vec<String>> {
        None
    }

    /// `Ok(true)` when the value changed, `Ok(false)` when it was already
    /// set. Unknown names and invalid values leave the option untouched.
    fn set_option(&mut self, name: &str, _value: &str) -> Result<bool, OptionError> {
        Err(OptionError::Unknown {
            plugin: self.name(),
            option: name.to_string(),
        })
    }

    fn set_option_listener(&mut self, _listener: OptionListener) {}

    /// Opens `file` with a snapshot of the current options.
    fn create_load(&self, file: &FileInfo) -> Result<Box<dyn Load>, CodecError>;

    fn create_save(&self, file: &FileInfo, _info: &IoInfo) -> Result<Box<dyn Save>, CodecError> {
        Err(ErrorContext::new(self.name(), file.path_buf()).refused("format is read-only"))
    }
}

/// Path of the file holding `frame` of `file`. Files without a number ignore
/// the frame; numbered files reject frames outside their sequence.
pub fn resolve_frame_path(plugin: &'static str, file: &FileInfo, frame: Option<i64>) -> Result<PathBuf, CodecError> {
    if !file.has_number() || file.is_wildcard() {
        return match frame {
            Some(frame) if file.is_wildcard() => Ok(PathBuf::from(file.file_name(Some(frame)))),
            _ => Ok(file.path_buf()),
        };
    }
    let sequence = file.sequence();
    let frame = match frame {
        Some(frame) => frame,
        None => sequence.first().unwrap_or_default(),
    };
    if !sequence.contains(frame) {
        return Err(CodecError::FrameOutOfRange {
            plugin,
            path: file.path_buf(),
            frame,
        });
    }
    Ok(PathBuf::from(file.file_name(Some(frame))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_frame_in_sequence() {
        let file = FileInfo::parse("/shots/render.0001-0003.dpx");
        let path = resolve_frame_path("DPX", &file, Some(2)).unwrap();
        assert_eq!(path, PathBuf::from("/shots/render.0002.dpx"));
        let first = resolve_frame_path("DPX", &file, None).unwrap();
        assert_eq!(first, PathBuf::from("/shots/render.0001.dpx"));
    }

    #[test]
    fn test_resolve_frame_out_of_range() {
        let file = FileInfo::parse("render.1-3.dpx");
        let err = resolve_frame_path("DPX", &file, Some(9)).unwrap_err();
        assert!(matches!(err, CodecError::FrameOutOfRange { frame: 9, .. }));
        assert_eq!(err.plugin(), "DPX");
    }

    #[test]
    fn test_resolve_plain_file_ignores_frame() {
        let file = FileInfo::parse("plate.exr");
        assert_eq!(resolve_frame_path("OpenEXR", &file, Some(7)).unwrap(), PathBuf::from("plate.exr"));
    }

    #[test]
    fn test_resolve_wildcard() {
        let file = FileInfo::parse("out.####.ppm");
        assert_eq!(resolve_frame_path("PPM", &file, Some(12)).unwrap(), PathBuf::from("out.0012.ppm"));
    }

    #[test]
    fn test_error_context_carries_plugin_and_path() {
        let context = ErrorContext::new("RLA", "a.rla");
        let err = context.corrupt("bad offset table");
        assert_eq!(err.path(), Path::new("a.rla"));
        assert!(err.to_string().contains("bad offset table"));
        assert!(err.to_string().starts_with("RLA"));
    }

    #[test]
    fn test_read_request_builders() {
        let request = ReadRequest::frame(5).with_layer(2).with_proxy(Proxy::Half);
        assert_eq!(request.frame, Some(5));
        assert_eq!(request.layer, 2);
        assert_eq!(request.proxy, Proxy::Half);
        assert_eq!(ReadRequest::new().frame, None);
    }
}
