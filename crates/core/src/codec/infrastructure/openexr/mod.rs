pub mod exr_load;
pub mod exr_plugin;
pub mod exr_save;
pub mod options;

pub const PLUGIN_NAME: &str = "OpenEXR";
pub const EXTENSIONS: &[&str] = &[".exr"];
