//! General run-length transform.
//!
//! Two equal adjacent bytes signal a run: they are followed by the
//! remaining run length (LEB128). Isolated bytes pass through untouched.
//! Like ZRLT, the forward direction refuses to expand beyond the input
//! size.

use crate::error::{Error, Result};

use super::{read_varint, write_varint, Transform};

pub struct RltCodec;

impl RltCodec {
    pub fn new() -> Self {
        RltCodec
    }
}

impl Default for RltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for RltCodec {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let mut src_idx = 0;
        let mut dst_idx = 0;

        while src_idx < src.len() {
            let b = src[src_idx];
            let mut run = 1usize;
            while src_idx + run < src.len() && src[src_idx + run] == b {
                run += 1;
            }

            if run >= 2 {
                if dst_idx + 2 > dst.len() {
                    return Err(Error::BufferTooSmall {
                        size: dst.len(),
                        required: dst_idx + 2,
                    });
                }
                dst[dst_idx] = b;
                dst[dst_idx + 1] = b;
                dst_idx = write_varint(dst, dst_idx + 2, run - 2)?;
            } else {
                if dst_idx >= dst.len() {
                    return Err(Error::BufferTooSmall {
                        size: dst.len(),
                        required: dst_idx + 1,
                    });
                }
                dst[dst_idx] = b;
                dst_idx += 1;
            }

            src_idx += run;
        }

        Ok((src_idx, dst_idx))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let mut src_idx = 0;
        let mut dst_idx = 0;

        while src_idx < src.len() {
            let b = src[src_idx];
            src_idx += 1;

            if src_idx < src.len() && src[src_idx] == b {
                src_idx += 1;
                let (extra, next) = read_varint(src, src_idx)?;
                src_idx = next;
                let run = extra + 2;
                if dst_idx + run > dst.len() {
                    return Err(Error::InvalidData("run crosses block end".into()));
                }
                dst[dst_idx..dst_idx + run].fill(b);
                dst_idx += run;
            } else {
                if dst_idx >= dst.len() {
                    return Err(Error::InvalidData("literal crosses block end".into()));
                }
                dst[dst_idx] = b;
                dst_idx += 1;
            }
        }

        Ok((src_idx, dst_idx))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8]) -> usize {
        let mut codec = RltCodec::new();
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
    fn collapses_long_runs() {
        let mut data = b"x".repeat(5000);
        data.extend_from_slice(b"yz");
        let out = roundtrip(&data);
        assert!(out < 12, "run should collapse, got {out}");
    }

    #[test]
    fn mixed_runs_and_literals() {
        roundtrip(b"aaabcccccdefffffffffffgg");
        roundtrip(b"ab");
        roundtrip(b"aa");
        roundtrip(b"a");
        roundtrip(b"");
    }

    #[test]
    fn refuses_to_expand_on_pairs() {
        // Alternating pairs are RLT's worst case.
        let data: Vec<u8> = (0..64u8).flat_map(|i| [i, i]).collect();
        let mut codec = RltCodec::new();
        let mut fwd = vec![0u8; codec.max_encoded_len(data.len())];
        assert!(matches!(
            codec.forward(&data, &mut fwd),
            Err(Error::BufferTooSmall { .. })
        ));
    }
}
