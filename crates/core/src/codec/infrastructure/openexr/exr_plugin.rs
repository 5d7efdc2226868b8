use crate::codec::domain::io_plugin::{CodecError, IoInfo, IoPlugin, Load, Save};
use crate::codec::domain::plugin_options::{OptionError, OptionListener, PluginOptions};
use crate::codec::infrastructure::openexr::exr_load::ExrLoad;
use crate::codec::infrastructure::openexr::exr_save::ExrSave;
use crate::codec::infrastructure::openexr::options::ExrOptions;
use crate::codec::infrastructure::openexr::{EXTENSIONS, PLUGIN_NAME};
use crate::sequence::domain::file_info::FileInfo;

pub struct ExrPlugin {
    options: PluginOptions<ExrOptions>,
}

impl ExrPlugin {
    pub fn new() -> Self {
        Self {
            options: PluginOptions::new(PLUGIN_NAME, ExrOptions::default()),
        }
    }
}

impl Default for ExrPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IoPlugin for ExrPlugin {
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
        Ok(Box::new(ExrLoad::open(file)?))
    }

    fn create_save(&self, file: &FileInfo, info: &IoInfo) -> Result<Box<dyn Save>, CodecError> {
        Ok(Box::new(ExrSave::new(file, info, self.options.values().clone())?))
    }
}
