//! Cineon film print (printing density) <-> linear conversion.
//!
//! Codes are 10-bit printing density values; other integer depths are
//! scaled into the 0..1023 range before the curve is applied.

use serde::{Deserialize, Serialize};

use crate::shared::image::Image;
use crate::shared::pixel::{pack_u10, unpack_u10, DataType};

const DENSITY_PER_CODE: f64 = 0.002;
const NEGATIVE_GAMMA: f64 = 0.6;
const CODE_MAX: f64 = 1023.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilmPrintToLinear {
    pub black: i32,
    pub white: i32,
    pub gamma: f32,
    pub soft_clip: i32,
}

impl Default for FilmPrintToLinear {
    fn default() -> Self {
        Self {
            black: 95,
            white: 685,
            gamma: 1.7,
            soft_clip: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearToFilmPrint {
    pub black: i32,
    pub white: i32,
    pub gamma: f32,
}

impl Default for LinearToFilmPrint {
    fn default() -> Self {
        Self {
            black: 95,
            white: 685,
            gamma: 1.7,
        }
    }
}

fn density(code: f64, white: i32, gamma: f32) -> f64 {
    10f64
        .powf((code - white as f64) * DENSITY_PER_CODE / NEGATIVE_GAMMA)
        .powf(gamma as f64 / 1.7)
}

fn gain(black: i32, white: i32, gamma: f32) -> f64 {
    1.0 / (1.0 - density(black as f64, white, gamma))
}

impl FilmPrintToLinear {
    /// Maps a 10-bit code to linear light in 0..1.
    pub fn linear(&self, code: f64) -> f64 {
        if code < self.black as f64 {
            return 0.0;
        }
        let gain = gain(self.black, self.white, self.gamma);
        let offset = gain - 1.0;
        let break_point = (self.white - self.soft_clip) as f64;
        if code > break_point {
            let knee_offset = density(break_point, self.white, self.gamma) * gain - offset;
            let exponent = self.soft_clip as f64 / 100.0;
            let knee_gain = (1.0 - knee_offset) / (5.0 * self.soft_clip as f64).powf(exponent);
            return ((code - break_point).powf(exponent) * knee_gain + knee_offset).clamp(0.0, 1.0);
        }
        (density(code, self.white, self.gamma) * gain - offset).clamp(0.0, 1.0)
    }

    /// Replaces printing density codes in `image` with linear values of the
    /// same data type. Alpha is left alone.
    pub fn apply(&self, image: &mut Image) {
        apply_curve(image, |v| self.linear(v * CODE_MAX));
    }
}

impl LinearToFilmPrint {
    /// Maps linear light in 0..1 to a 10-bit code.
    pub fn code(&self, linear: f64) -> f64 {
        let gain = gain(self.black, self.white, self.gamma);
        let offset = gain - 1.0;
        let scaled = ((linear + offset) / gain).max(f64::MIN_POSITIVE);
        let code = self.white as f64
            + scaled.powf(1.7 / self.gamma as f64).log10() / (DENSITY_PER_CODE / NEGATIVE_GAMMA);
        code.clamp(0.0, CODE_MAX)
    }

    pub fn apply(&self, image: &mut Image) {
        apply_curve(image, |v| self.code(v) / CODE_MAX);
    }
}

/// Runs `curve` (normalized in, normalized out) over every color channel.
/// Integer types go through a lookup table of every possible code.
fn apply_curve(image: &mut Image, curve: impl Fn(f64) -> f64) {
    let pixel = image.pixel();
    let channels = pixel.channels();
    let alpha = pixel.format.has_alpha().then_some(channels - 1);
    let is_color = |index: usize| Some(index % channels) != alpha;

    match pixel.data_type {
        DataType::U8 => {
            let lut = build_lut(255, &curve);
            for (i, v) in image.data_mut().iter_mut().enumerate() {
                if is_color(i) {
                    *v = lut[*v as usize] as u8;
                }
            }
        }
        DataType::U16 => {
            let lut = build_lut(65535, &curve);
            for (i, chunk) in image.data_mut().chunks_exact_mut(2).enumerate() {
                if is_color(i) {
                    let v = u16::from_ne_bytes([chunk[0], chunk[1]]);
                    chunk.copy_from_slice(&lut[v as usize].to_ne_bytes());
                }
            }
        }
        DataType::U10 => {
            let lut = build_lut(1023, &curve);
            for chunk in image.data_mut().chunks_exact_mut(4) {
                let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let [r, g, b] = unpack_u10(word);
                let mapped = pack_u10(lut[r as usize], lut[g as usize], lut[b as usize]);
                chunk.copy_from_slice(&mapped.to_ne_bytes());
            }
        }
        DataType::F16 => {
            for (i, chunk) in image.data_mut().chunks_exact_mut(2).enumerate() {
                if is_color(i) {
                    let v = half::f16::from_ne_bytes([chunk[0], chunk[1]]).to_f64();
                    chunk.copy_from_slice(&half::f16::from_f64(curve(v)).to_ne_bytes());
                }
            }
        }
        DataType::F32 => {
            for (i, chunk) in image.data_mut().chunks_exact_mut(4).enumerate() {
                if is_color(i) {
                    let v = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64;
                    chunk.copy_from_slice(&(curve(v) as f32).to_ne_bytes());
                }
            }
        }
    }
}

fn build_lut(max: u32, curve: &impl Fn(f64) -> f64) -> Vec<u16> {
    (0..=max)
        .map(|code| {
            let out = curve(code as f64 / max as f64).clamp(0.0, 1.0);
            (out * max as f64).round() as u16
        })
        .collect()
}
