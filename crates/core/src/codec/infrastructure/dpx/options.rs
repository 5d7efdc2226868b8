use crate::codec::domain::plugin_options::{choice_name, choice_names, parse_choice, OptionValues};
use crate::codec::infrastructure::dpx::header::Version;
use crate::codec::infrastructure::film_print::{FilmPrintToLinear, LinearToFilmPrint};
use crate::shared::byte_order::Endian;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorProfile {
    /// Film print when the header says so, otherwise untouched.
    Auto,
    None,
    FilmPrint,
}

/// Bit layout used when saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveType {
    /// Follow the input: 8, 10 or 16 bit integers, F32 as 32-bit float,
    /// F16 widened to 16-bit integers.
    Auto,
    /// 10-bit RGB, type A packing.
    U10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveEndian {
    /// Host byte order.
    Auto,
    Msb,
    Lsb,
}

impl SaveEndian {
    pub fn resolve(self) -> Endian {
        match self {
            SaveEndian::Auto => Endian::host(),
            SaveEndian::Msb => Endian::Msb,
            SaveEndian::Lsb => Endian::Lsb,
        }
    }
}

const COLOR_PROFILES: &[(&str, ColorProfile)] = &[
    ("Auto", ColorProfile::Auto),
    ("None", ColorProfile::None),
    ("FilmPrint", ColorProfile::FilmPrint),
];
const VERSIONS: &[(&str, Version)] = &[("1.0", Version::V1_0), ("2.0", Version::V2_0)];
const TYPES: &[(&str, SaveType)] = &[("Auto", SaveType::Auto), ("U10", SaveType::U10)];
const ENDIANS: &[(&str, SaveEndian)] = &[
    ("Auto", SaveEndian::Auto),
    ("MSB", SaveEndian::Msb),
    ("LSB", SaveEndian::Lsb),
];

pub const INPUT_COLOR_PROFILE: &str = "input_color_profile";
pub const INPUT_FILM_PRINT: &str = "input_film_print";
pub const OUTPUT_COLOR_PROFILE: &str = "output_color_profile";
pub const OUTPUT_FILM_PRINT: &str = "output_film_print";
pub const VERSION: &str = "version";
pub const TYPE: &str = "type";
pub const ENDIAN: &str = "endian";

#[derive(Debug, Clone, PartialEq)]
pub struct DpxOptions {
    pub input_color_profile: ColorProfile,
    pub input_film_print: FilmPrintToLinear,
    pub output_color_profile: ColorProfile,
    pub output_film_print: LinearToFilmPrint,
    pub version: Version,
    pub save_type: SaveType,
    pub endian: SaveEndian,
}

impl Default for DpxOptions {
    fn default() -> Self {
        Self {
            input_color_profile: ColorProfile::Auto,
            input_film_print: FilmPrintToLinear::default(),
            output_color_profile: ColorProfile::Auto,
            output_film_print: LinearToFilmPrint::default(),
            version: Version::V2_0,
            save_type: SaveType::Auto,
            endian: SaveEndian::Auto,
        }
    }
}

impl OptionValues for DpxOptions {
    const NAMES: &'static [&'static str] = &[
        INPUT_COLOR_PROFILE,
        INPUT_FILM_PRINT,
        OUTPUT_COLOR_PROFILE,
        OUTPUT_FILM_PRINT,
        VERSION,
        TYPE,
        ENDIAN,
    ];

    fn get(&self, name: &str) -> Option<String> {
        Some(match name {
            INPUT_COLOR_PROFILE => choice_name(&self.input_color_profile, COLOR_PROFILES),
            INPUT_FILM_PRINT => {
                let f = &self.input_film_print;
                format!("{} {} {} {}", f.black, f.white, f.gamma, f.soft_clip)
            }
            OUTPUT_COLOR_PROFILE => choice_name(&self.output_color_profile, COLOR_PROFILES),
            OUTPUT_FILM_PRINT => {
                let f = &self.output_film_print;
                format!("{} {} {}", f.black, f.white, f.gamma)
            }
            VERSION => choice_name(&self.version, VERSIONS),
            TYPE => choice_name(&self.save_type, TYPES),
            ENDIAN => choice_name(&self.endian, ENDIANS),
            _ => return None,
        })
    }

    fn domain(name: &str) -> Vec<String> {
        match name {
            INPUT_COLOR_PROFILE | OUTPUT_COLOR_PROFILE => choice_names(COLOR_PROFILES),
            VERSION => choice_names(VERSIONS),
            TYPE => choice_names(TYPES),
            ENDIAN => choice_names(ENDIANS),
            _ => Vec::new(),
        }
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        let expected = |names: Vec<String>| names.join(", ");
        match name {
            INPUT_COLOR_PROFILE => {
                self.input_color_profile =
                    parse_choice(value, COLOR_PROFILES).ok_or_else(|| expected(choice_names(COLOR_PROFILES)))?;
            }
            INPUT_FILM_PRINT => {
                let [black, white, gamma, soft_clip] = parse_numbers::<4>(value)
                    .ok_or("four numbers: black white gamma soft-clip")?;
                self.input_film_print = FilmPrintToLinear {
                    black: black as i32,
                    white: white as i32,
                    gamma: gamma as f32,
                    soft_clip: soft_clip as i32,
                };
            }
            OUTPUT_COLOR_PROFILE => {
                self.output_color_profile =
                    parse_choice(value, COLOR_PROFILES).ok_or_else(|| expected(choice_names(COLOR_PROFILES)))?;
            }
            OUTPUT_FILM_PRINT => {
                let [black, white, gamma] =
                    parse_numbers::<3>(value).ok_or("three numbers: black white gamma")?;
                self.output_film_print = LinearToFilmPrint {
                    black: black as i32,
                    white: white as i32,
                    gamma: gamma as f32,
                };
            }
            VERSION => {
                self.version = parse_choice(value, VERSIONS).ok_or_else(|| expected(choice_names(VERSIONS)))?;
            }
            TYPE => {
                self.save_type = parse_choice(value, TYPES).ok_or_else(|| expected(choice_names(TYPES)))?;
            }
            ENDIAN => {
                self.endian = parse_choice(value, ENDIANS).ok_or_else(|| expected(choice_names(ENDIANS)))?;
            }
            _ => return Err("a known option".into()),
        }
        Ok(())
    }
}

/// Exactly `N` whitespace separated numbers, with a positive gamma
/// in third place when present.
fn parse_numbers<const N: usize>(value: &str) -> Option<[f64; N]> {
    let parsed: Vec<f64> = value
        .split_whitespace()
        .map(|v| v.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let numbers: [f64; N] = parsed.try_into().ok()?;
    if N >= 3 && numbers[2] <= 0.0 {
        return None;
    }
    Some(numbers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::domain::plugin_options::PluginOptions;

    #[test]
    fn test_defaults_render() {
        let options = PluginOptions::new("DPX", DpxOptions::default());
        assert_eq!(options.get(INPUT_FILM_PRINT).as_deref(), Some("95 685 1.7 0"));
        assert_eq!(options.get(OUTPUT_FILM_PRINT).as_deref(), Some("95 685 1.7"));
        assert_eq!(options.get(VERSION).as_deref(), Some("2.0"));
        assert_eq!(options.get("ENDIAN").as_deref(), Some("Auto"));
    }

    #[test]
    fn test_set_film_print() {
        let mut options = PluginOptions::new("DPX", DpxOptions::default());
        assert_eq!(options.set(INPUT_FILM_PRINT, "90 700 2.2 10"), Ok(true));
        let film = options.values().input_film_print;
        assert_eq!((film.black, film.white, film.soft_clip), (90, 700, 10));
        assert!(options.set(INPUT_FILM_PRINT, "90 700").is_err());
        assert!(options.set(OUTPUT_FILM_PRINT, "90 700 0").is_err());
        assert_eq!(options.values().input_film_print.white, 700);
    }

    #[test]
    fn test_set_enumerations() {
        let mut options = PluginOptions::new("DPX", DpxOptions::default());
        assert_eq!(options.set("Endian", "msb"), Ok(true));
        assert_eq!(options.values().endian.resolve(), Endian::Msb);
        assert_eq!(options.set("version", "1.0"), Ok(true));
        assert_eq!(options.values().version, Version::V1_0);
        assert_eq!(options.set("type", "U10"), Ok(true));
        assert!(options.set("type", "U12").is_err());
        assert_eq!(
            options.domain(OUTPUT_COLOR_PROFILE),
            Some(vec!["Auto".into(), "None".into(), "FilmPrint".into()])
        );
    }

    #[test]
    fn test_auto_endian_is_host() {
        assert_eq!(SaveEndian::Auto.resolve(), Endian::host());
    }
}
