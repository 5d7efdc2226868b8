pub mod header;
pub mod rla_load;
pub mod rla_plugin;
pub mod rla_save;
pub mod rle;

pub const PLUGIN_NAME: &str = "RLA";
pub const EXTENSIONS: &[&str] = &[".rla", ".rpf"];
