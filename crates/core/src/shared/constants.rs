/// One gigabyte as used by cache size settings (`2^30` bytes).
pub const GIGABYTE: u64 = 1 << 30;

pub const DEFAULT_CACHE_GIGABYTES: f64 = 1.0;

/// Frames the read-ahead queue holds before the decode thread waits.
pub const DEFAULT_QUEUE_MAX: usize = 8;

/// Extensions grouped into numbered sequences by directory listings.
pub const SEQUENCE_EXTENSIONS: &[&str] = &[
    ".dpx", ".cin", ".exr", ".rla", ".rpf", ".pic", ".ppm", ".pnm", ".pgm", ".png", ".jpg",
    ".jpeg", ".tif", ".tiff", ".bmp", ".tga", ".sgi", ".iff",
];

/// Still formats decoded through the `image` crate.
pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".tif", ".tiff", ".bmp"];

pub const CONFIG_DIR_NAME: &str = "seqio";
pub const OPTIONS_FILE_NAME: &str = "plugin_options.json";
pub const CACHE_CONFIG_FILE_NAME: &str = "cache.json";
