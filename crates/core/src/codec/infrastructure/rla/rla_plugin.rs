use crate::codec::domain::io_plugin::{CodecError, IoInfo, IoPlugin, Load, Save};
use crate::codec::infrastructure::rla::rla_load::RlaLoad;
use crate::codec::infrastructure::rla::rla_save::RlaSave;
use crate::codec::infrastructure::rla::{EXTENSIONS, PLUGIN_NAME};
use crate::sequence::domain::file_info::FileInfo;

#[derive(Debug, Default)]
pub struct RlaPlugin;

impl RlaPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl IoPlugin for RlaPlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    fn create_load(&self, file: &FileInfo) -> Result<Box<dyn Load>, CodecError> {
        Ok(Box::new(RlaLoad::open(file)?))
    }

    fn create_save(&self, file: &FileInfo, info: &IoInfo) -> Result<Box<dyn Save>, CodecError> {
        Ok(Box::new(RlaSave::new(file, info)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::domain::plugin_options::OptionError;

    #[test]
    fn test_has_no_options() {
        let mut plugin = RlaPlugin::new();
        assert_eq!(plugin.extensions(), &[".rla", ".rpf"]);
        assert!(plugin.option_names().is_empty());
        assert!(matches!(
            plugin.set_option("compression", "RLE"),
            Err(OptionError::Unknown { plugin: "RLA", .. })
        ));
    }
}
