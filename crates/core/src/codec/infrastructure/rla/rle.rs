//! RLA run-length coding. Each control byte is signed: `n >= 0` repeats the
//! next byte `n + 1` times, `n < 0` copies the next `-n` bytes. Multi-byte
//! samples are stored as separate byte planes, most significant first.

use thiserror::Error;

const MAX_RUN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RleError {
    #[error("run-length data of {len} bytes ends early")]
    Truncated { len: usize },
    #[error("run of {run} overflows a scanline of {width} samples")]
    Overrun { run: usize, width: usize },
}

/// Decodes `width` samples of `bytes` bytes each.
pub fn decode(payload: &[u8], width: usize, bytes: usize) -> Result<Vec<u32>, RleError> {
    let mut out = vec![0u32; width];
    let mut p = 0;
    let truncated = || RleError::Truncated { len: payload.len() };
    for plane in 0..bytes {
        let shift = 8 * (bytes - 1 - plane) as u32;
        let mut x = 0;
        while x < width {
            let control = *payload.get(p).ok_or_else(truncated)? as i8;
            p += 1;
            if control >= 0 {
                let run = control as usize + 1;
                if x + run > width {
                    return Err(RleError::Overrun { run, width });
                }
                let value = *payload.get(p).ok_or_else(truncated)? as u32;
                p += 1;
                for sample in &mut out[x..x + run] {
                    *sample |= value << shift;
                }
                x += run;
            } else {
                let run = control.unsigned_abs() as usize;
                if x + run > width {
                    return Err(RleError::Overrun { run, width });
                }
                let literal = payload.get(p..p + run).ok_or_else(truncated)?;
                for (sample, &value) in out[x..x + run].iter_mut().zip(literal) {
                    *sample |= (value as u32) << shift;
                }
                p += run;
                x += run;
            }
        }
    }
    Ok(out)
}

/// Encodes `values` as `bytes` byte planes.
pub fn encode(values: &[u32], bytes: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for plane in 0..bytes {
        let shift = 8 * (bytes - 1 - plane) as u32;
        let plane: Vec<u8> = values.iter().map(|v| (v >> shift) as u8).collect();
        encode_plane(&plane, &mut out);
    }
    out
}

fn encode_plane(plane: &[u8], out: &mut Vec<u8>) {
    let n = plane.len();
    let mut i = 0;
    while i < n {
        let mut run = 1;
        while i + run < n && run < MAX_RUN && plane[i + run] == plane[i] {
            run += 1;
        }
        if run > 1 {
            out.push((run - 1) as u8);
            out.push(plane[i]);
            i += run;
            continue;
        }

        let start = i;
        while i < n && i - start < MAX_RUN && !(i + 1 < n && plane[i] == plane[i + 1]) {
            i += 1;
        }
        out.push((-((i - start) as i16)) as u8);
        out.extend_from_slice(&plane[start..i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_decode_repeat_and_literal() {
        // 3 × 7, then literals 1 2
        let payload = [2u8, 7, 0xfe, 1, 2];
        assert_eq!(decode(&payload, 5, 1).unwrap(), vec![7, 7, 7, 1, 2]);
    }

    #[test]
    fn test_decode_two_planes_msb_first() {
        let payload = [1u8, 0x12, 1u8, 0x34];
        assert_eq!(decode(&payload, 2, 2).unwrap(), vec![0x1234, 0x1234]);
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(decode(&[0xfd, 1], 3, 1), Err(RleError::Truncated { .. })));
        assert!(matches!(decode(&[], 1, 1), Err(RleError::Truncated { .. })));
    }

    #[test]
    fn test_decode_overrun() {
        assert_eq!(decode(&[9, 1], 4, 1), Err(RleError::Overrun { run: 10, width: 4 }));
    }

    #[rstest]
    #[case::flat(vec![5; 300], 1)]
    #[case::ramp((0..300).collect(), 2)]
    #[case::mixed(vec![1, 1, 2, 3, 3, 3, 4, 5, 6, 6], 1)]
    #[case::single(vec![9], 2)]
    fn test_encoded_planes_decode(#[case] values: Vec<u32>, #[case] bytes: usize) {
        let encoded = encode(&values, bytes);
        assert_eq!(decode(&encoded, values.len(), bytes).unwrap(), values);
    }

    #[test]
    fn test_runs_compress() {
        assert_eq!(encode(&[4; 10], 1), vec![9, 4]);
        assert_eq!(encode(&[1, 2, 3], 1), vec![0xfd, 1, 2, 3]);
    }
}
