use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::codec::domain::io_plugin::{CodecError, IoInfo, IoPlugin, Load, Save};
use crate::codec::domain::plugin_options::{OptionError, OptionListener};
use crate::codec::infrastructure::dpx::dpx_plugin::DpxPlugin;
use crate::codec::infrastructure::openexr::exr_plugin::ExrPlugin;
use crate::codec::infrastructure::pic::PicPlugin;
use crate::codec::infrastructure::ppm::PpmPlugin;
use crate::codec::infrastructure::rla::rla_plugin::RlaPlugin;
use crate::codec::infrastructure::still_image::StillImagePlugin;
use crate::sequence::domain::file_info::FileInfo;

#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("{path}: unrecognized file")]
    UnrecognizedFile { path: PathBuf },
    #[error("{plugin}: {path}: cannot save: {reason}")]
    SaveRefused {
        plugin: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("a plugin named \"{0}\" is already registered")]
    DuplicatePlugin(String),
    #[error("no plugin named \"{0}\"")]
    UnknownPlugin(String),
    #[error(transparent)]
    Option(#[from] OptionError),
}

type SharedListener = Arc<Mutex<Option<OptionListener>>>;

/// Registry of codec plugins, keyed by name and by file extension.
///
/// Owned by whatever needs codec dispatch; there is no process-wide
/// instance. On an extension claimed by two plugins the one registered first
/// keeps it.
pub struct IoFactory {
    plugins: Vec<Box<dyn IoPlugin>>,
    by_name: HashMap<String, usize>,
    by_extension: HashMap<String, usize>,
    listener: SharedListener,
}

impl IoFactory {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            by_name: HashMap::new(),
            by_extension: HashMap::new(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// DPX, OpenEXR, RLA, PIC, PPM, then the generic still formats.
    pub fn with_default_plugins() -> Self {
        let mut factory = Self::new();
        let plugins: Vec<Box<dyn IoPlugin>> = vec![
            Box::new(DpxPlugin::new()),
            Box::new(ExrPlugin::new()),
            Box::new(RlaPlugin::new()),
            Box::new(PicPlugin::new()),
            Box::new(PpmPlugin::new()),
            Box::new(StillImagePlugin::new()),
        ];
        for plugin in plugins {
            if let Err(e) = factory.register(plugin) {
                log::warn!("{e}");
            }
        }
        factory
    }

    pub fn register(&mut self, mut plugin: Box<dyn IoPlugin>) -> Result<(), FactoryError> {
        let name = plugin.name();
        let key = name.to_ascii_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(FactoryError::DuplicatePlugin(name.to_string()));
        }

        let shared = Arc::clone(&self.listener);
        plugin.set_option_listener(Arc::new(move |plugin: &str, option: &str| {
            let listener = shared.lock().unwrap().clone();
            if let Some(listener) = listener {
                listener(plugin, option);
            }
        }));

        let index = self.plugins.len();
        for extension in plugin.extensions() {
            let extension = extension.to_ascii_lowercase();
            match self.by_extension.get(&extension) {
                Some(&owner) => log::debug!(
                    "{name}: extension {extension} already handled by {}",
                    self.plugins[owner].name()
                ),
                None => {
                    self.by_extension.insert(extension, index);
                }
            }
        }
        self.by_name.insert(key, index);
        self.plugins.push(plugin);
        log::debug!("registered plugin {name}");
        Ok(())
    }

    /// Called with `(plugin, option)` whenever any registered plugin's
    /// options change.
    pub fn set_options_changed_listener(&mut self, listener: OptionListener) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn IoPlugin> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| self.plugins[i].as_ref())
    }

    fn plugin_mut(&mut self, name: &str) -> Result<&mut Box<dyn IoPlugin>, FactoryError> {
        match self.by_name.get(&name.to_ascii_lowercase()) {
            Some(&i) => Ok(&mut self.plugins[i]),
            None => Err(FactoryError::UnknownPlugin(name.to_string())),
        }
    }

    /// Plugin names in registration order.
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Every claimed extension, sorted.
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    /// Extensions whose numbered files group into frame sequences.
    pub fn sequence_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self
            .by_extension
            .iter()
            .filter(|(_, &i)| self.plugins[i].is_sequence())
            .map(|(extension, _)| extension.clone())
            .collect();
        extensions.sort();
        extensions
    }

    /// Plugin claiming the extension of `file`.
    pub fn plugin_for(&self, file: &FileInfo) -> Option<&dyn IoPlugin> {
        self.by_extension
            .get(&file.extension().to_ascii_lowercase())
            .map(|&i| self.plugins[i].as_ref())
    }

    fn require_plugin(&self, file: &FileInfo) -> Result<&dyn IoPlugin, FactoryError> {
        self.plugin_for(file).ok_or_else(|| FactoryError::UnrecognizedFile {
            path: file.path_buf(),
        })
    }

    pub fn load(&self, file: &FileInfo) -> Result<Box<dyn Load>, FactoryError> {
        let plugin = self.require_plugin(file)?;
        log::info!("{}: loading with {}", file.path(), plugin.name());
        Ok(plugin.create_load(file)?)
    }

    pub fn save(&self, file: &FileInfo, info: &IoInfo) -> Result<Box<dyn Save>, FactoryError> {
        let plugin = self.require_plugin(file)?;
        log::info!("{}: saving with {}", file.path(), plugin.name());
        plugin.create_save(file, info).map_err(|e| match e {
            CodecError::SaveRefused { plugin, path, reason } => FactoryError::SaveRefused { plugin, path, reason },
            other => FactoryError::Codec(other),
        })
    }

    pub fn option(&self, plugin: &str, name: &str) -> Option<String> {
        self.plugin(plugin).and_then(|p| p.option(name))
    }

    /// `Ok(true)` when the value changed. Invalid values leave the previous
    /// value in place and notify nobody.
    pub fn set_option(&mut self, plugin: &str, name: &str, value: &str) -> Result<bool, FactoryError> {
        Ok(self.plugin_mut(plugin)?.set_option(name, value)?)
    }
}

impl Default for IoFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::domain::io_plugin::{ErrorContext, ReadRequest};
    use crate::sequence::infrastructure::directory_scanner::eval_sequence;
    use crate::shared::image::{Image, ImageInfo};
    use crate::shared::pixel::PixelType;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakePlugin {
        name: &'static str,
        extensions: &'static [&'static str],
    }

    impl IoPlugin for FakePlugin {
        fn name(&self) -> &'static str {
            self.name
        }

        fn extensions(&self) -> &[&'static str] {
            self.extensions
        }

        fn is_sequence(&self) -> bool {
            false
        }

        fn create_load(&self, file: &FileInfo) -> Result<Box<dyn Load>, CodecError> {
            Err(ErrorContext::new(self.name, file.path_buf()).unsupported("fake"))
        }
    }

    #[test]
    fn test_default_plugins_in_order() {
        let factory = IoFactory::with_default_plugins();
        assert_eq!(factory.plugin_names(), vec!["DPX", "OpenEXR", "RLA", "PIC", "PPM", "Still"]);
    }

    #[rstest]
    #[case::dpx("shot.0001.dpx", "DPX")]
    #[case::upper_case("PLATE.EXR", "OpenEXR")]
    #[case::rpf("beauty.rpf", "RLA")]
    #[case::pgm("grey.pgm", "PPM")]
    #[case::png("logo.png", "Still")]
    fn test_extension_lookup(#[case] path: &str, #[case] expected: &str) {
        let factory = IoFactory::with_default_plugins();
        let plugin = factory.plugin_for(&FileInfo::parse(path)).unwrap();
        assert_eq!(plugin.name(), expected);
    }

    #[test]
    fn test_first_registered_keeps_extension() {
        let mut factory = IoFactory::new();
        factory
            .register(Box::new(FakePlugin {
                name: "First",
                extensions: &[".abc"],
            }))
            .unwrap();
        factory
            .register(Box::new(FakePlugin {
                name: "Second",
                extensions: &[".ABC", ".xyz"],
            }))
            .unwrap();
        assert_eq!(factory.plugin_for(&FileInfo::parse("a.abc")).unwrap().name(), "First");
        assert_eq!(factory.plugin_for(&FileInfo::parse("a.xyz")).unwrap().name(), "Second");
        assert_eq!(factory.extensions(), vec![".abc", ".xyz"]);
        assert!(factory.sequence_extensions().is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut factory = IoFactory::with_default_plugins();
        let err = factory
            .register(Box::new(FakePlugin {
                name: "dpx",
                extensions: &[".zzz"],
            }))
            .unwrap_err();
        assert!(matches!(err, FactoryError::DuplicatePlugin(_)));
        assert!(factory.plugin_for(&FileInfo::parse("a.zzz")).is_none());
    }

    #[test]
    fn test_unrecognized_file() {
        let factory = IoFactory::with_default_plugins();
        let err = factory.load(&FileInfo::parse("notes.txt")).err().unwrap();
        assert!(matches!(err, FactoryError::UnrecognizedFile { .. }));
        let info = IoInfo::new(ImageInfo::new(1, 1, PixelType::L_U8));
        let err = factory.save(&FileInfo::parse("notes.txt"), &info).err().unwrap();
        assert!(matches!(err, FactoryError::UnrecognizedFile { .. }));
    }

    #[test]
    fn test_save_refusal_is_distinct() {
        let factory = IoFactory::with_default_plugins();
        let info = IoInfo::new(ImageInfo::new(1, 1, PixelType::L_U8));
        let err = factory.save(&FileInfo::parse("in.pic"), &info).err().unwrap();
        assert!(matches!(err, FactoryError::SaveRefused { plugin: "PIC", .. }));
    }

    #[test]
    fn test_options_changed_aggregated() {
        let mut factory = IoFactory::with_default_plugins();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (c, s) = (Arc::clone(&count), Arc::clone(&seen));
        factory.set_options_changed_listener(Arc::new(move |plugin: &str, option: &str| {
            c.fetch_add(1, Ordering::SeqCst);
            s.lock().unwrap().push(format!("{plugin}.{option}"));
        }));

        assert!(factory.set_option("DPX", "version", "1.0").unwrap());
        assert!(factory.set_option("openexr", "Compression", "PIZ").unwrap());
        assert!(!factory.set_option("OpenEXR", "compression", "piz").unwrap());
        assert!(factory.set_option("PPM", "data", "bogus").is_err());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["DPX.version", "OpenEXR.compression"]);
        assert_eq!(factory.option("DPX", "version").as_deref(), Some("1.0"));
    }

    #[test]
    fn test_unknown_plugin_option() {
        let mut factory = IoFactory::with_default_plugins();
        let err = factory.set_option("TGA", "rle", "on").unwrap_err();
        assert!(matches!(err, FactoryError::UnknownPlugin(_)));
    }

    #[test]
    fn test_dpx_sequence_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let factory = IoFactory::with_default_plugins();
        let info = ImageInfo::new(3, 2, PixelType::RGB_U16);
        let mut written = Vec::new();
        for frame in 1..=3i64 {
            let samples: Vec<u16> = (0..18).map(|i| (i as u16 + frame as u16 * 100) * 97).collect();
            let image = Image::from_samples(info.clone(), &samples).unwrap();
            let path = dir.path().join(format!("render.{frame}.dpx"));
            let mut save = factory
                .save(&FileInfo::from_path(&path), &IoInfo::new(info.clone()))
                .unwrap();
            save.write(&image, None).unwrap();
            save.close().unwrap();
            written.push(image);
        }

        let file = eval_sequence(&FileInfo::from_path(&dir.path().join("render.1.dpx"))).unwrap();
        assert_eq!(file.sequence().frames().collect::<Vec<_>>(), vec![1, 2, 3]);

        let mut load = factory.load(&file).unwrap();
        assert_eq!(load.info().sequence.first(), Some(1));
        assert_eq!(load.info().sequence.last(), Some(3));
        let mut frame = load.read(&ReadRequest::frame(2)).unwrap();
        frame.normalize_mirror();
        assert_eq!(frame.pixel(), PixelType::RGB_U16);
        assert_eq!(frame.samples::<u16>(), written[1].samples::<u16>());
    }
}
