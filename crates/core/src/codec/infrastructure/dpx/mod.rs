pub mod dpx_load;
pub mod dpx_plugin;
pub mod dpx_save;
pub mod header;
pub mod options;

pub const PLUGIN_NAME: &str = "DPX";
pub const EXTENSIONS: &[&str] = &[".dpx"];
