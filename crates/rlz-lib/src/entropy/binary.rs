//! Binary arithmetic coder driven by a bit predictor.
//!
//! Both bounds live in a 56-bit window. Whenever the top 32 bits of the
//! window settle, they are emitted as one big-endian group and the window
//! shifts left; disposing flushes the remaining 56 bits of `low`. The
//! decoder mirrors this with a 56-bit `current` value. The byte sequence is
//! part of the stream format: decoders depend on it exactly.

use std::io::{Read, Write};

use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;

use super::Predictor;

const TOP: u64 = 0x00FF_FFFF_FFFF_FFFF;
const MASK_24_56: u64 = 0x00FF_FFFF_FF00_0000;
const MASK_0_32: u64 = 0x0000_0000_FFFF_FFFF;
const MASK_0_56: u64 = 0x00FF_FFFF_FFFF_FFFF;

pub struct BinaryEntropyEncoder<'a, W: Write> {
    obs: &'a mut BitWriter<W>,
    pred: Box<dyn Predictor>,
    low: u64,
    high: u64,
    disposed: bool,
}

impl<'a, W: Write> BinaryEntropyEncoder<'a, W> {
    pub fn new(obs: &'a mut BitWriter<W>, pred: Box<dyn Predictor>) -> Self {
        Self {
            obs,
            pred,
            low: 0,
            high: TOP,
            disposed: false,
        }
    }

    pub fn encode(&mut self, block: &[u8]) -> Result<usize> {
        for &byte in block {
            self.encode_byte(byte)?;
        }
        Ok(block.len())
    }

    pub fn encode_byte(&mut self, val: u8) -> Result<()> {
        for shift in (0..8).rev() {
            self.encode_bit((val >> shift) & 1)?;
        }
        Ok(())
    }

    pub fn encode_bit(&mut self, bit: u8) -> Result<()> {
        let split = (((self.high - self.low) >> 4) * (self.pred.get() as u64)) >> 8;

        if bit != 0 {
            self.high = self.low + split;
        } else {
            self.low += split + 1;
        }

        self.pred.update(bit);

        while (self.low ^ self.high) & MASK_24_56 == 0 {
            self.obs.write_bits((self.high >> 24) & MASK_0_32, 32)?;
            self.low = (self.low << 32) & MASK_0_56;
            self.high = ((self.high << 32) | MASK_0_32) & MASK_0_56;
        }

        Ok(())
    }

    /// Flush the final window. Must be called exactly once, after the last
    /// encoded bit.
    pub fn dispose(&mut self) -> Result<()> {
        if !self.disposed {
            self.obs.write_bits(self.low, 56)?;
            self.disposed = true;
        }
        Ok(())
    }
}

pub struct BinaryEntropyDecoder<'a, R: Read> {
    ibs: &'a mut BitReader<R>,
    pred: Box<dyn Predictor>,
    low: u64,
    high: u64,
    current: u64,
}

impl<'a, R: Read> BinaryEntropyDecoder<'a, R> {
    pub fn new(ibs: &'a mut BitReader<R>, pred: Box<dyn Predictor>) -> Result<Self> {
        let current = ibs.read_bits(56)?;
        Ok(Self {
            ibs,
            pred,
            low: 0,
            high: TOP,
            current,
        })
    }

    pub fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        for byte in block.iter_mut() {
            *byte = self.decode_byte()?;
        }
        Ok(block.len())
    }

    pub fn decode_byte(&mut self) -> Result<u8> {
        let mut val = 0u8;
        for _ in 0..8 {
            val = (val << 1) | self.decode_bit()?;
        }
        Ok(val)
    }

    pub fn decode_bit(&mut self) -> Result<u8> {
        let split = self.low + ((((self.high - self.low) >> 4) * (self.pred.get() as u64)) >> 8);

        let bit = if self.current <= split {
            self.high = split;
            self.pred.update(1);
            1
        } else {
            self.low = split + 1;
            self.pred.update(0);
            0
        };

        while (self.low ^ self.high) & MASK_24_56 == 0 {
            self.low = (self.low << 32) & MASK_0_56;
            self.high = ((self.high << 32) | MASK_0_32) & MASK_0_56;
            let val = self.ibs.read_bits(32)?;
            self.current = ((self.current << 32) | val) & MASK_0_56;
        }

        Ok(bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::cm::CmPredictor;
    use crate::entropy::fpaq::FpaqPredictor;

    /// Predictor pinned to a constant probability; updates are ignored.
    struct FixedPredictor(i32);

    impl Predictor for FixedPredictor {
        fn update(&mut self, _bit: u8) {}
        fn get(&mut self) -> i32 {
            self.0
        }
    }

    #[test]
    fn alternating_bits_with_fixed_predictor() {
        // 10000 alternating bits through a pinned 50% predictor.
        let mut w = BitWriter::new(Vec::new());
        {
            let mut enc = BinaryEntropyEncoder::new(&mut w, Box::new(FixedPredictor(2048)));
            for i in 0..10_000 {
                enc.encode_bit((i & 1) as u8).unwrap();
            }
            enc.dispose().unwrap();
        }
        let (bytes, _) = w.finish().unwrap();

        let mut r = BitReader::new(&bytes[..]);
        let mut dec =
            BinaryEntropyDecoder::new(&mut r, Box::new(FixedPredictor(2048))).unwrap();
        for i in 0..10_000 {
            assert_eq!(dec.decode_bit().unwrap(), (i & 1) as u8, "bit {i}");
        }
    }

    fn roundtrip_with<P: Predictor + 'static, F: Fn() -> P>(make: F, data: &[u8]) {
        let mut w = BitWriter::new(Vec::new());
        {
            let mut enc = BinaryEntropyEncoder::new(&mut w, Box::new(make()));
            enc.encode(data).unwrap();
            enc.dispose().unwrap();
        }
        let (bytes, _) = w.finish().unwrap();

        let mut r = BitReader::new(&bytes[..]);
        let mut dec = BinaryEntropyDecoder::new(&mut r, Box::new(make())).unwrap();
        let mut out = vec![0u8; data.len()];
        dec.decode(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn roundtrip_fpaq() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
        roundtrip_with(FpaqPredictor::new, &data);
    }

    #[test]
    fn roundtrip_cm_text() {
        let data = b"compression is the art of expectation ".repeat(64);
        roundtrip_with(CmPredictor::new, &data);
    }

    #[test]
    fn roundtrip_empty() {
        roundtrip_with(FpaqPredictor::new, &[]);
    }

    #[test]
    fn compresses_biased_input() {
        let data = vec![0u8; 8192];
        let mut w = BitWriter::new(Vec::new());
        {
            let mut enc = BinaryEntropyEncoder::new(&mut w, Box::new(FpaqPredictor::new()));
            enc.encode(&data).unwrap();
            enc.dispose().unwrap();
        }
        let (bytes, _) = w.finish().unwrap();
        assert!(bytes.len() < data.len() / 4, "got {} bytes", bytes.len());
    }
}
