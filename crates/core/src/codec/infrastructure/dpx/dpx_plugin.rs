use crate::codec::domain::io_plugin::{CodecError, IoInfo, IoPlugin, Load, Save};
use crate::codec::domain::plugin_options::{OptionError, OptionListener, PluginOptions};
use crate::codec::infrastructure::dpx::dpx_load::DpxLoad;
use crate::codec::infrastructure::dpx::dpx_save::DpxSave;
use crate::codec::infrastructure::dpx::options::DpxOptions;
use crate::codec::infrastructure::dpx::{EXTENSIONS, PLUGIN_NAME};
use crate::sequence::domain::file_info::FileInfo;

pub struct DpxPlugin {
    options: PluginOptions<DpxOptions>,
}

impl DpxPlugin {
    pub fn new() -> Self {
        Self {
            options: PluginOptions::new(PLUGIN_NAME, DpxOptions::default()),
        }
    }
}

impl Default for DpxPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IoPlugin for DpxPlugin {
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
        Ok(Box::new(DpxLoad::open(file, self.options.values().clone())?))
    }

    fn create_save(&self, file: &FileInfo, info: &IoInfo) -> Result<Box<dyn Save>, CodecError> {
        Ok(Box::new(DpxSave::new(file, info, self.options.values().clone())?))
    }
}
