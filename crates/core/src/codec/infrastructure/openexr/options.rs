use exr::compression::Compression;

use crate::codec::domain::plugin_options::{choice_name, choice_names, parse_choice, OptionValues};

const COMPRESSIONS: &[(&str, Compression)] = &[
    ("None", Compression::Uncompressed),
    ("RLE", Compression::RLE),
    ("ZIPS", Compression::ZIP1),
    ("ZIP", Compression::ZIP16),
    ("PIZ", Compression::PIZ),
];

pub const COMPRESSION: &str = "compression";

#[derive(Debug, Clone, PartialEq)]
pub struct ExrOptions {
    pub compression: Compression,
}

impl Default for ExrOptions {
    fn default() -> Self {
        Self {
            compression: Compression::ZIP16,
        }
    }
}

impl OptionValues for ExrOptions {
    const NAMES: &'static [&'static str] = &[COMPRESSION];

    fn get(&self, name: &str) -> Option<String> {
        match name {
            COMPRESSION => Some(choice_name(&self.compression, COMPRESSIONS)),
            _ => None,
        }
    }

    fn domain(name: &str) -> Vec<String> {
        match name {
            COMPRESSION => choice_names(COMPRESSIONS),
            _ => Vec::new(),
        }
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            COMPRESSION => {
                self.compression =
                    parse_choice(value, COMPRESSIONS).ok_or_else(|| choice_names(COMPRESSIONS).join(", "))?;
                Ok(())
            }
            _ => Err("a known option".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::domain::plugin_options::PluginOptions;
    use rstest::rstest;

    #[rstest]
    #[case::none("None", Compression::Uncompressed)]
    #[case::single_line_zip("zips", Compression::ZIP1)]
    #[case::zip("ZIP", Compression::ZIP16)]
    #[case::piz("piz", Compression::PIZ)]
    fn test_set_compression(#[case] value: &str, #[case] expected: Compression) {
        let mut options = PluginOptions::new("OpenEXR", ExrOptions { compression: Compression::RLE });
        assert_eq!(options.set(COMPRESSION, value), Ok(true));
        assert_eq!(options.values().compression, expected);
    }

    #[test]
    fn test_rejects_unknown_compression() {
        let mut options = PluginOptions::new("OpenEXR", ExrOptions::default());
        assert!(options.set(COMPRESSION, "DWAA").is_err());
        assert_eq!(options.get(COMPRESSION).as_deref(), Some("ZIP"));
    }
}
