//! Zero run-length transform.
//!
//! Runs of zero bytes collapse to a 0x00 marker followed by the run length
//! minus one (LEB128). 0xFF escapes the two byte values that collide with
//! the marker space. The forward direction refuses to expand: output must
//! fit in `src.len()` bytes or the transform reports `BufferTooSmall`.

use crate::error::{Error, Result};

use super::{read_varint, write_varint, Transform};

pub struct ZrltCodec;

impl ZrltCodec {
    pub fn new() -> Self {
        ZrltCodec
    }
}

impl Default for ZrltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ZrltCodec {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let mut src_idx = 0;
        let mut dst_idx = 0;

        while src_idx < src.len() {
            let b = src[src_idx];

            if b == 0 {
                let mut run = 1usize;
                while src_idx + run < src.len() && src[src_idx + run] == 0 {
                    run += 1;
                }
                if dst_idx >= dst.len() {
                    return Err(Error::BufferTooSmall {
                        size: dst.len(),
                        required: dst_idx + 1,
                    });
                }
                dst[dst_idx] = 0;
                dst_idx = write_varint(dst, dst_idx + 1, run - 1)?;
                src_idx += run;
                continue;
            }

            let needed = if b >= 0xFE { 2 } else { 1 };
            if dst_idx + needed > dst.len() {
                return Err(Error::BufferTooSmall {
                    size: dst.len(),
                    required: dst_idx + needed,
                });
            }
            if b >= 0xFE {
                dst[dst_idx] = 0xFF;
                dst[dst_idx + 1] = b;
            } else {
                dst[dst_idx] = b;
            }
            dst_idx += needed;
            src_idx += 1;
        }

        Ok((src_idx, dst_idx))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let mut src_idx = 0;
        let mut dst_idx = 0;

        while src_idx < src.len() {
            let b = src[src_idx];
            src_idx += 1;

            if b == 0 {
                let (run_m1, next) = read_varint(src, src_idx)?;
                src_idx = next;
                let run = run_m1 + 1;
                if dst_idx + run > dst.len() {
                    return Err(Error::InvalidData("zero run crosses block end".into()));
                }
                dst[dst_idx..dst_idx + run].fill(0);
                dst_idx += run;
                continue;
            }

            let value = if b == 0xFF {
                let v = *src
                    .get(src_idx)
                    .ok_or_else(|| Error::InvalidData("truncated escape".into()))?;
                src_idx += 1;
                v
            } else {
                b
            };
            if dst_idx >= dst.len() {
                return Err(Error::InvalidData("literal crosses block end".into()));
            }
            dst[dst_idx] = value;
            dst_idx += 1;
        }

        Ok((src_idx, dst_idx))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        // Only useful on zero-heavy data; never allowed to expand.
        src_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8]) -> usize {
        let mut codec = ZrltCodec::new();
        let mut fwd = vec![0u8; codec.max_encoded_len(data.len())];
        let (consumed, produced) = codec.forward(data, &mut fwd).unwrap();
        assert_eq!(consumed, data.len());
        fwd.truncate(produced);

        let mut back = vec![0u8; data.len()];
        let (read, written) = codec.inverse(&fwd, &mut back).unwrap();
        assert_eq!(read, fwd.len());
        assert_eq!(written, data.len());
        assert_eq!(back, data);
        produced
    }

    #[test]
    fn collapses_zero_runs() {
        let mut data = vec![0u8; 1000];
        data.extend_from_slice(b"tail");
        let out = roundtrip(&data);
        assert!(out < 10, "run should collapse, got {out}");
    }

    #[test]
    fn escapes_high_values() {
        let data = [0xFE, 0xFF, 0x01, 0x00, 0x00, 0xFD, 0, 0, 0, 0];
        roundtrip(&data);
    }

    #[test]
    fn refuses_to_expand() {
        let data = vec![0xFFu8; 64];
        let mut codec = ZrltCodec::new();
        let mut fwd = vec![0u8; codec.max_encoded_len(data.len())];
        assert!(matches!(
            codec.forward(&data, &mut fwd),
            Err(Error::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn rejects_truncated_run() {
        let mut codec = ZrltCodec::new();
        let mut out = vec![0u8; 16];
        // Marker with a dangling continuation bit.
        assert!(matches!(
            codec.inverse(&[0x00, 0x80], &mut out),
            Err(Error::InvalidData(_))
        ));
    }
}
