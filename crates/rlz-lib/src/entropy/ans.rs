//! Tabular range ANS for byte streams, order 0 and order 1.
//!
//! Frequency tables are rebuilt per call from the observed bytes,
//! normalized to a 12-bit total and serialized into the bitstream ahead of
//! the payload. Symbols are encoded back to front (ANS is last-in
//! first-out); order 1 keys its 256 tables by the previous plaintext byte,
//! which the decoder reproduces front to back. Renormalization spills
//! 32-bit words; the final state is written as 64 bits.

use std::io::{Read, Write};

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{Error, Result};

const LOG_RANGE: u32 = 12;
const RANGE: u32 = 1 << LOG_RANGE;
const RANS_L: u64 = 1 << 31;

/// Normalize raw counts to sum exactly to `RANGE`, keeping every present
/// symbol at frequency >= 1. Returns None when no symbol occurred.
fn normalize_freqs(counts: &[u32; 256]) -> Option<[u16; 256]> {
    let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
    if total == 0 {
        return None;
    }

    let mut freqs = [0u16; 256];
    let mut sum: i64 = 0;
    for (f, &c) in freqs.iter_mut().zip(counts.iter()) {
        if c > 0 {
            *f = (((u64::from(c) * u64::from(RANGE)) / total) as u16).max(1);
            sum += i64::from(*f);
        }
    }

    // Settle rounding drift on the largest entries.
    while sum != i64::from(RANGE) {
        let idx = (0..256).max_by_key(|&i| freqs[i]).unwrap();
        if sum < i64::from(RANGE) {
            let add = (i64::from(RANGE) - sum) as u16;
            freqs[idx] += add;
            sum += i64::from(add);
        } else {
            let take = (sum - i64::from(RANGE)).min(i64::from(freqs[idx]) - 1) as u16;
            freqs[idx] -= take;
            sum -= i64::from(take);
        }
    }

    Some(freqs)
}

/// Per-context decode table: cumulative bounds plus a slot->symbol map.
struct DecodeTable {
    cum: [u32; 257],
    slots: Vec<u8>,
}

impl DecodeTable {
    fn from_freqs(freqs: &[u16; 256]) -> Self {
        let mut cum = [0u32; 257];
        for i in 0..256 {
            cum[i + 1] = cum[i] + u32::from(freqs[i]);
        }
        let mut slots = vec![0u8; RANGE as usize];
        for sym in 0..256 {
            for slot in cum[sym]..cum[sym + 1] {
                slots[slot as usize] = sym as u8;
            }
        }
        Self { cum, slots }
    }
}

pub struct AnsRangeEncoder<'a, W: Write> {
    obs: &'a mut BitWriter<W>,
    order: u32,
}

impl<'a, W: Write> AnsRangeEncoder<'a, W> {
    pub fn new(obs: &'a mut BitWriter<W>, order: u32) -> Result<Self> {
        if order > 1 {
            return Err(Error::InvalidParameter(format!(
                "invalid ANS order: {order} (must be 0 or 1)"
            )));
        }
        Ok(Self { obs, order })
    }

    pub fn encode(&mut self, block: &[u8]) -> Result<usize> {
        if block.is_empty() {
            return Ok(0);
        }

        let nb_ctx = if self.order == 0 { 1 } else { 256 };
        let mut counts = vec![[0u32; 256]; nb_ctx];
        let mut prev = 0usize;
        for &b in block {
            let ctx = if self.order == 0 { 0 } else { prev };
            counts[ctx][b as usize] += 1;
            prev = b as usize;
        }

        let mut freqs: Vec<Option<[u16; 256]>> = Vec::with_capacity(nb_ctx);
        let mut cums: Vec<[u32; 257]> = Vec::with_capacity(nb_ctx);
        for ctx_counts in &counts {
            let f = normalize_freqs(ctx_counts);
            let mut cum = [0u32; 257];
            if let Some(f) = &f {
                for i in 0..256 {
                    cum[i + 1] = cum[i] + u32::from(f[i]);
                }
            }
            freqs.push(f);
            cums.push(cum);
        }

        self.write_tables(&freqs)?;

        // LIFO: encode back to front so the decoder runs front to back.
        let mut state = RANS_L;
        let mut words: Vec<u32> = Vec::new();
        for i in (0..block.len()).rev() {
            let ctx = if self.order == 1 && i > 0 {
                block[i - 1] as usize
            } else {
                0
            };
            let sym = block[i] as usize;
            let freq = u64::from(cums[ctx][sym + 1] - cums[ctx][sym]);
            let cum = u64::from(cums[ctx][sym]);

            let x_max = ((RANS_L >> LOG_RANGE) * freq) << 32;
            while state >= x_max {
                words.push((state & 0xFFFF_FFFF) as u32);
                state >>= 32;
            }
            state = (state / freq) * u64::from(RANGE) + (state % freq) + cum;
        }
        words.reverse();

        self.obs.write_bits(words.len() as u64, 32)?;
        self.obs.write_bits(state, 64)?;
        for w in &words {
            self.obs.write_bits(u64::from(*w), 32)?;
        }

        Ok(block.len())
    }

    fn write_tables(&mut self, freqs: &[Option<[u16; 256]>]) -> Result<()> {
        // One presence bit per context: order-1 blocks leave most of their
        // 256 contexts unused and must not pay a header for them.
        for f in freqs {
            match f {
                None => {
                    self.obs.write_bit(0)?;
                }
                Some(f) => {
                    self.obs.write_bit(1)?;
                    let present = f.iter().filter(|&&x| x > 0).count() as u64;
                    self.obs.write_bits(present, 9)?;
                    for (sym, &freq) in f.iter().enumerate() {
                        if freq > 0 {
                            self.obs.write_bits(sym as u64, 8)?;
                            self.obs.write_bits(u64::from(freq) - 1, 12)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct AnsRangeDecoder<'a, R: Read> {
    ibs: &'a mut BitReader<R>,
    order: u32,
}

impl<'a, R: Read> AnsRangeDecoder<'a, R> {
    pub fn new(ibs: &'a mut BitReader<R>, order: u32) -> Result<Self> {
        if order > 1 {
            return Err(Error::InvalidParameter(format!(
                "invalid ANS order: {order} (must be 0 or 1)"
            )));
        }
        Ok(Self { ibs, order })
    }

    pub fn decode(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let nb_ctx = if self.order == 0 { 1 } else { 256 };
        let mut tables: Vec<Option<DecodeTable>> = Vec::with_capacity(nb_ctx);
        for _ in 0..nb_ctx {
            tables.push(self.read_table()?);
        }

        let nb_words = self.ibs.read_bits(32)? as usize;
        let mut state = self.ibs.read_bits(64)?;
        let mut words = Vec::with_capacity(nb_words);
        for _ in 0..nb_words {
            words.push(self.ibs.read_bits(32)?);
        }
        let mut next = words.into_iter();

        let mut prev = 0usize;
        for slot_out in out.iter_mut() {
            let ctx = if self.order == 0 { 0 } else { prev };
            let table = tables[ctx]
                .as_ref()
                .ok_or_else(|| Error::InvalidData("ANS context has no frequency table".into()))?;

            let slot = (state & u64::from(RANGE - 1)) as u32;
            let sym = table.slots[slot as usize] as usize;
            let freq = u64::from(table.cum[sym + 1] - table.cum[sym]);
            state = freq * (state >> LOG_RANGE) + u64::from(slot) - u64::from(table.cum[sym]);
            while state < RANS_L {
                match next.next() {
                    Some(w) => state = (state << 32) | u64::from(w),
                    None => break,
                }
            }

            *slot_out = sym as u8;
            prev = sym;
        }

        Ok(out.len())
    }

    fn read_table(&mut self) -> Result<Option<DecodeTable>> {
        if self.ibs.read_bit()? == 0 {
            return Ok(None);
        }
        let present = self.ibs.read_bits(9)? as usize;
        if present == 0 || present > 256 {
            return Err(Error::InvalidData(format!(
                "ANS table declares {present} symbols"
            )));
        }

        let mut freqs = [0u16; 256];
        let mut sum = 0u32;
        for _ in 0..present {
            let sym = self.ibs.read_bits(8)? as usize;
            let freq = self.ibs.read_bits(12)? as u16 + 1;
            if freqs[sym] != 0 {
                return Err(Error::InvalidData(format!("duplicate ANS symbol {sym}")));
            }
            freqs[sym] = freq;
            sum += u32::from(freq);
        }
        if sum != RANGE {
            return Err(Error::InvalidData(format!(
                "ANS frequencies sum to {sum}, expected {RANGE}"
            )));
        }

        Ok(Some(DecodeTable::from_freqs(&freqs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(order: u32, data: &[u8]) -> usize {
        let mut w = BitWriter::new(Vec::new());
        {
            let mut enc = AnsRangeEncoder::new(&mut w, order).unwrap();
            enc.encode(data).unwrap();
        }
        let (bytes, _) = w.finish().unwrap();

        let mut r = BitReader::new(&bytes[..]);
        let mut dec = AnsRangeDecoder::new(&mut r, order).unwrap();
        let mut out = vec![0u8; data.len()];
        dec.decode(&mut out).unwrap();
        assert_eq!(out, data);
        bytes.len()
    }

    #[test]
    fn order0_roundtrip_text() {
        let data = b"abracadabra abracadabra abracadabra".repeat(20);
        let size = roundtrip(0, &data);
        assert!(size < data.len(), "no compression: {size} >= {}", data.len());
    }

    #[test]
    fn order1_roundtrip_text() {
        let data = b"the rain in spain stays mainly in the plain ".repeat(30);
        let o1 = roundtrip(1, &data);
        let o0 = roundtrip(0, &data);
        assert!(o1 < o0, "order 1 ({o1}) should beat order 0 ({o0}) on text");
    }

    #[test]
    fn single_symbol_run() {
        roundtrip(0, &[0u8; 10_000]);
        roundtrip(1, &[0xAAu8; 10_000]);
    }

    #[test]
    fn single_byte() {
        roundtrip(0, &[0x41]);
        roundtrip(1, &[0x41]);
    }

    #[test]
    fn empty_input_writes_nothing() {
        let mut w = BitWriter::new(Vec::new());
        {
            let mut enc = AnsRangeEncoder::new(&mut w, 0).unwrap();
            enc.encode(&[]).unwrap();
        }
        let (bytes, written) = w.finish().unwrap();
        assert_eq!(written, 0);
        assert!(bytes.is_empty());
    }

    #[test]
    fn rejects_bad_order() {
        let mut w = BitWriter::new(Vec::new());
        assert!(AnsRangeEncoder::new(&mut w, 2).is_err());
    }

    #[test]
    fn rejects_corrupt_table_sum() {
        let mut w = BitWriter::new(Vec::new());
        // 1 symbol present, frequency 100 (won't sum to the 12-bit range).
        w.write_bit(1).unwrap();
        w.write_bits(1, 9).unwrap();
        w.write_bits(0x41, 8).unwrap();
        w.write_bits(99, 12).unwrap();
        let (bytes, _) = w.finish().unwrap();

        let mut r = BitReader::new(&bytes[..]);
        let mut dec = AnsRangeDecoder::new(&mut r, 0).unwrap();
        let mut out = vec![0u8; 4];
        assert!(matches!(
            dec.decode(&mut out),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn normalization_is_exact() {
        let mut counts = [0u32; 256];
        counts[0] = 1;
        counts[1] = 1_000_000;
        counts[200] = 3;
        let freqs = normalize_freqs(&counts).unwrap();
        let sum: u32 = freqs.iter().map(|&f| u32::from(f)).sum();
        assert_eq!(sum, RANGE);
        assert!(freqs[0] >= 1 && freqs[200] >= 1);
    }

    proptest! {
        #[test]
        fn prop_roundtrip_order0(data in prop::collection::vec(any::<u8>(), 0..2000)) {
            roundtrip(0, &data);
        }

        #[test]
        fn prop_roundtrip_order1(data in prop::collection::vec(any::<u8>(), 0..2000)) {
            roundtrip(1, &data);
        }
    }
}
