//! Reduced-offset Lempel-Ziv transform.
//!
//! A match is coded as (relative rank in the per-key position history,
//! length) instead of (offset, length). Two backends share the match
//! finder: the fast one splits literals, packed lengths and match ranks
//! into three streams coded with ANS; the extra one drives a binary
//! arithmetic coder with two local bit predictors.
//!
//! Blocks are processed in 64 MiB chunks. The position index is cleared at
//! every chunk boundary while the per-key insertion counters persist for
//! the whole block. The final four bytes of a block bypass the match
//! finder entirely.

use crate::bitstream::{BitReader, BitWriter};
use crate::entropy::ans::{AnsRangeDecoder, AnsRangeEncoder};
use crate::error::{Error, Result};

use super::Transform;

const HASH_SIZE: usize = 1 << 16;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = MIN_MATCH + 255;
const LOG_POS_CHECKS_FAST: u32 = 4;
const LOG_POS_CHECKS_EXTRA: u32 = 5;
const CHUNK_SIZE: usize = 1 << 26;
const HASH_FACTOR: i32 = 200002979;
const HASH_MASK: i32 = !(CHUNK_SIZE as i32 - 1);
const MAX_BLOCK_SIZE: usize = 1 << 27;

const LITERAL_FLAG: u8 = 0;
const MATCH_FLAG: u8 = 1;

const TOP: u64 = 0x00FF_FFFF_FFFF_FFFF;
const MASK_24_56: u64 = 0x00FF_FFFF_FF00_0000;
const MASK_0_32: u64 = 0x0000_0000_FFFF_FFFF;
const MASK_0_56: u64 = 0x00FF_FFFF_FFFF_FFFF;

#[inline(always)]
fn key_at(buf: &[u8], pos: usize) -> usize {
    usize::from(u16::from_le_bytes([buf[pos - 2], buf[pos - 1]]))
}

#[inline(always)]
fn hash_at(buf: &[u8], pos: usize) -> i32 {
    let v = i32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
    (v & 0x00FF_FFFF).wrapping_mul(HASH_FACTOR) & HASH_MASK
}

/// Forward overlapping copy; `m_len` excludes the implicit minimum.
fn emit_copy(buf: &mut [u8], mut dst_idx: usize, mut ref_idx: usize, m_len: usize) -> usize {
    for _ in 0..m_len + MIN_MATCH {
        buf[dst_idx] = buf[ref_idx];
        dst_idx += 1;
        ref_idx += 1;
    }
    dst_idx
}

/// Shared match index: per-key circular history of (hash | position)
/// records plus insertion counters.
struct RolzIndex {
    matches: Vec<i32>,
    counters: Vec<i32>,
    log_pos_checks: u32,
    pos_checks: i32,
    mask_checks: i32,
}

impl RolzIndex {
    fn new(log_pos_checks: u32) -> Result<Self> {
        if !(2..=8).contains(&log_pos_checks) {
            return Err(Error::InvalidParameter(format!(
                "invalid logPosChecks: {log_pos_checks} (must be in [2..8])"
            )));
        }
        Ok(Self {
            matches: vec![0; HASH_SIZE << log_pos_checks],
            counters: vec![0; HASH_SIZE],
            log_pos_checks,
            pos_checks: 1 << log_pos_checks,
            mask_checks: (1 << log_pos_checks) - 1,
        })
    }

    fn reset_counters(&mut self) {
        self.counters.fill(0);
    }

    fn reset_matches(&mut self) {
        self.matches.fill(0);
    }

    /// Search the history of the 2-byte key preceding `pos` and register
    /// `pos` unconditionally (the decoder replays the same insertions).
    /// Returns (rank, length - MIN_MATCH) of the best match of length
    /// >= MIN_MATCH, walking newest to oldest so ties keep the newest
    /// position. `limit` is the logical end of the chunk; `buf` must extend
    /// at least 4 bytes past any probed position for hashing.
    fn find_match(&mut self, buf: &[u8], pos: usize, limit: usize) -> Option<(u8, usize)> {
        let key = key_at(buf, pos);
        let base = key << self.log_pos_checks;
        let hash32 = hash_at(buf, pos);
        let counter = self.counters[key];
        let mut best_len = MIN_MATCH - 1;
        let mut best_idx = 0u8;
        let max_match = MAX_MATCH.min(limit - pos);

        for delta in 0..self.pos_checks {
            let i = counter - delta;
            let r = self.matches[base + (i & self.mask_checks) as usize];

            if r == 0 {
                break;
            }

            // Hash check may save a memory access
            if r & HASH_MASK != hash32 {
                continue;
            }

            let ref_pos = (r & !HASH_MASK) as usize;
            if buf[ref_pos] != buf[pos] {
                continue;
            }

            let mut n = 1;
            while n < max_match && buf[ref_pos + n] == buf[pos + n] {
                n += 1;
            }

            if n > best_len {
                best_idx = delta as u8;
                best_len = n;
                if best_len == max_match {
                    break;
                }
            }
        }

        self.counters[key] += 1;
        self.matches[base + ((counter + 1) & self.mask_checks) as usize] = hash32 | pos as i32;

        if best_len < MIN_MATCH {
            None
        } else {
            Some((best_idx, best_len - MIN_MATCH))
        }
    }

    /// Decoder-side registration: plain chunk-relative position.
    fn register(&mut self, key: usize, pos: usize) {
        self.counters[key] += 1;
        self.matches[(key << self.log_pos_checks)
            + (self.counters[key] & self.mask_checks) as usize] = pos as i32;
    }

    /// Resolve a decoded rank back to the recorded position.
    fn lookup(&self, key: usize, rank: i32) -> i32 {
        self.matches
            [(key << self.log_pos_checks) + ((self.counters[key] - rank) & self.mask_checks) as usize]
    }
}

/// Pack (litLen, matchLen) as LLLLLMMM with extension bytes. Returns the
/// number of bytes written.
fn emit_lengths(buf: &mut [u8], lit_len: usize, m_len: usize) -> usize {
    let mode = if lit_len < 31 {
        (lit_len << 3) as u8
    } else {
        0xF8
    };

    let mut idx;
    if m_len >= 7 {
        buf[0] = mode | 0x07;
        buf[1] = (m_len - 7) as u8;
        idx = 2;
    } else {
        buf[0] = mode | m_len as u8;
        idx = 1;
    }

    if lit_len >= 31 {
        let rest = lit_len - 31;
        if rest >= 1 << 7 {
            if rest >= 1 << 14 {
                if rest >= 1 << 21 {
                    buf[idx] = (0x80 | ((rest >> 21) & 0x7F)) as u8;
                    idx += 1;
                }
                buf[idx] = (0x80 | ((rest >> 14) & 0x7F)) as u8;
                idx += 1;
            }
            buf[idx] = (0x80 | ((rest >> 7) & 0x7F)) as u8;
            idx += 1;
        }
        buf[idx] = (rest & 0x7F) as u8;
        idx += 1;
    }

    idx
}

/// Inverse of `emit_lengths`: (litLen, matchLen, bytes consumed).
fn read_lengths(buf: &[u8]) -> Result<(usize, usize, usize)> {
    let get = |i: usize| -> Result<u8> {
        buf.get(i)
            .copied()
            .ok_or_else(|| Error::InvalidData("truncated length stream".into()))
    };

    let mode = get(0)?;
    let mut idx = 1;
    let mut m_len = usize::from(mode & 0x07);

    if m_len == 7 {
        m_len += usize::from(get(1)?);
        idx = 2;
    }

    if mode < 0xF8 {
        return Ok((usize::from(mode >> 3), m_len, idx));
    }

    let mut next = get(idx)?;
    idx += 1;
    let mut lit_len = usize::from(next & 0x7F);

    while next & 0x80 != 0 {
        next = get(idx)?;
        idx += 1;
        lit_len = (lit_len << 7) | usize::from(next & 0x7F);
    }

    Ok((lit_len + 31, m_len, idx))
}

// ---------------------------------------------------------------------------
// Fast backend: literal / length / rank streams over ANS
// ---------------------------------------------------------------------------

struct RolzFast {
    index: RolzIndex,
}

impl RolzFast {
    fn new(log_pos_checks: u32) -> Result<Self> {
        Ok(Self {
            index: RolzIndex::new(log_pos_checks)?,
        })
    }

    fn max_encoded_len(src_len: usize) -> usize {
        if src_len <= 512 {
            src_len + 32
        } else {
            src_len
        }
    }

    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let required = Self::max_encoded_len(src.len());
        if dst.len() < required {
            return Err(Error::BufferTooSmall {
                size: dst.len(),
                required,
            });
        }

        dst[0..4].copy_from_slice(&(src.len() as u32).to_be_bytes());
        let mut dst_idx = 4;

        let src_end = src.len().saturating_sub(4);
        let mut size_chunk = src.len().min(CHUNK_SIZE);
        let mut start_chunk = 0;

        let mut lit_buf = vec![0u8; Self::max_encoded_len(size_chunk)];
        let mut len_buf = vec![0u8; size_chunk / 2 + 16];
        let mut idx_buf = vec![0u8; size_chunk / 2 + 16];

        self.index.reset_counters();

        while start_chunk < src_end {
            self.index.reset_matches();

            let end_chunk = (start_chunk + size_chunk).min(src_end);
            size_chunk = end_chunk - start_chunk;
            // The slice runs to the end of src: hashing may look at up to 4
            // bytes past the logical chunk, which always exist.
            let buf = &src[start_chunk..];

            let mut lit_idx = 0;
            let mut len_idx = 0;
            let mut m_idx = 0;
            let mut src_idx = 0;

            lit_buf[lit_idx] = buf[src_idx];
            lit_idx += 1;
            src_idx += 1;

            if start_chunk + 1 < src_end {
                lit_buf[lit_idx] = buf[src_idx];
                lit_idx += 1;
                src_idx += 1;
            }

            let mut first_lit = src_idx;

            while src_idx < size_chunk {
                match self.index.find_match(buf, src_idx, size_chunk) {
                    None => src_idx += 1,
                    Some((rank, m_len)) => {
                        let lit_len = src_idx - first_lit;
                        len_idx += emit_lengths(&mut len_buf[len_idx..], lit_len, m_len);
                        if lit_len > 0 {
                            lit_buf[lit_idx..lit_idx + lit_len]
                                .copy_from_slice(&buf[first_lit..first_lit + lit_len]);
                            lit_idx += lit_len;
                        }
                        idx_buf[m_idx] = rank;
                        m_idx += 1;
                        src_idx += m_len + MIN_MATCH;
                        first_lit = src_idx;
                    }
                }
            }

            // Pending literals of this chunk
            let lit_len = src_idx - first_lit;
            len_idx += emit_lengths(&mut len_buf[len_idx..], lit_len, 0);
            lit_buf[lit_idx..lit_idx + lit_len]
                .copy_from_slice(&buf[first_lit..first_lit + lit_len]);
            lit_idx += lit_len;

            // Entropy-code the three streams into the chunk bitstream
            let mut obs = BitWriter::new(Vec::new());
            obs.write_bits(lit_idx as u64, 32)?;
            AnsRangeEncoder::new(&mut obs, 1)?.encode(&lit_buf[..lit_idx])?;
            obs.write_bits(len_idx as u64, 32)?;
            AnsRangeEncoder::new(&mut obs, 0)?.encode(&len_buf[..len_idx])?;
            obs.write_bits(m_idx as u64, 32)?;
            AnsRangeEncoder::new(&mut obs, 0)?.encode(&idx_buf[..m_idx])?;
            let (chunk_bytes, _) = obs.finish()?;

            if dst_idx + chunk_bytes.len() + 4 > dst.len() {
                return Err(Error::BufferTooSmall {
                    size: dst.len(),
                    required: dst_idx + chunk_bytes.len() + 4,
                });
            }
            dst[dst_idx..dst_idx + chunk_bytes.len()].copy_from_slice(&chunk_bytes);
            dst_idx += chunk_bytes.len();
            start_chunk = end_chunk;
        }

        // Trailing bytes are stored verbatim
        let trailer = src.len() - src_end;
        dst[dst_idx..dst_idx + trailer].copy_from_slice(&src[src_end..]);
        dst_idx += trailer;

        Ok((src.len(), dst_idx))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.len() < 4 {
            return Err(Error::InvalidData("truncated ROLZ block".into()));
        }
        let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > dst.len() {
            return Err(Error::InvalidData(format!(
                "declared size {declared} exceeds buffer of {}",
                dst.len()
            )));
        }

        let dst_end = declared.saturating_sub(4);
        let mut size_chunk = declared.min(CHUNK_SIZE);
        let mut start_chunk = 0;
        let mut src_idx = 4;

        let mut lit_buf = vec![0u8; Self::max_encoded_len(size_chunk)];
        let mut len_buf = vec![0u8; size_chunk / 2 + 16];
        let mut idx_buf = vec![0u8; size_chunk / 2 + 16];

        self.index.reset_counters();

        while start_chunk < dst_end {
            self.index.reset_matches();

            let end_chunk = (start_chunk + size_chunk).min(dst_end);
            size_chunk = end_chunk - start_chunk;

            // Decode the three chunk streams
            let (lit_len_total, len_len_total, m_len_total, consumed) = {
                let mut ibs = BitReader::new(&src[src_idx..]);

                let lit_len = ibs.read_bits(32)? as usize;
                if lit_len > size_chunk {
                    return Err(Error::InvalidData(format!(
                        "literal stream length {lit_len} exceeds chunk size {size_chunk}"
                    )));
                }
                AnsRangeDecoder::new(&mut ibs, 1)?.decode(&mut lit_buf[..lit_len])?;

                let len_len = ibs.read_bits(32)? as usize;
                if len_len > size_chunk {
                    return Err(Error::InvalidData(format!(
                        "length stream length {len_len} exceeds chunk size {size_chunk}"
                    )));
                }
                AnsRangeDecoder::new(&mut ibs, 0)?.decode(&mut len_buf[..len_len])?;

                let m_len = ibs.read_bits(32)? as usize;
                if m_len > size_chunk {
                    return Err(Error::InvalidData(format!(
                        "match index stream length {m_len} exceeds chunk size {size_chunk}"
                    )));
                }
                AnsRangeDecoder::new(&mut ibs, 0)?.decode(&mut idx_buf[..m_len])?;

                let consumed = ((ibs.read() + 7) / 8) as usize;
                (lit_len, len_len, m_len, consumed)
            };
            src_idx += consumed;

            let initial_lits = if start_chunk + 1 < dst_end { 2 } else { 1 };
            if lit_len_total < initial_lits {
                return Err(Error::InvalidData("missing chunk head literals".into()));
            }

            let buf = &mut dst[start_chunk..end_chunk];
            let mut d = 0;
            let mut lit_idx = 0;
            let mut len_idx = 0;
            let mut m_cursor = 0;

            buf[d] = lit_buf[lit_idx];
            d += 1;
            lit_idx += 1;

            if initial_lits == 2 {
                buf[d] = lit_buf[lit_idx];
                d += 1;
                lit_idx += 1;
            }

            while d < size_chunk {
                if len_idx >= len_len_total {
                    return Err(Error::InvalidData("length stream exhausted".into()));
                }
                let (lit_len, m_len, delta) = read_lengths(&len_buf[len_idx..len_len_total])?;
                len_idx += delta;

                if lit_idx + lit_len > lit_len_total || d + lit_len > size_chunk {
                    return Err(Error::InvalidData("literal run crosses chunk end".into()));
                }

                // Literals re-enter the match index position by position
                buf[d..d + lit_len].copy_from_slice(&lit_buf[lit_idx..lit_idx + lit_len]);
                for n in 0..lit_len {
                    let key = key_at(buf, d + n);
                    self.index.register(key, d + n);
                }
                lit_idx += lit_len;
                d += lit_len;

                if d >= size_chunk {
                    if d == size_chunk {
                        break;
                    }
                    return Err(Error::InvalidData("chunk overrun".into()));
                }

                if d + m_len + MIN_MATCH > size_chunk {
                    return Err(Error::InvalidData("match crosses chunk end".into()));
                }
                if m_cursor >= m_len_total {
                    return Err(Error::InvalidData("match index stream exhausted".into()));
                }

                let rank = i32::from(idx_buf[m_cursor]);
                m_cursor += 1;
                let key = key_at(buf, d);
                let r = self.index.lookup(key, rank);
                if r < 0 || (r as usize) >= d {
                    return Err(Error::InvalidData("match reference out of range".into()));
                }
                let saved = d;
                d = emit_copy(buf, d, r as usize, m_len);
                self.index.register(key, saved);
            }

            start_chunk = end_chunk;
        }

        // Verbatim trailer
        let trailer = declared - dst_end;
        if src_idx + trailer != src.len() {
            return Err(Error::InvalidData(format!(
                "consumed {} of {} input bytes",
                src_idx + trailer,
                src.len()
            )));
        }
        dst[dst_end..declared].copy_from_slice(&src[src_idx..src_idx + trailer]);

        Ok((src.len(), declared))
    }
}

// ---------------------------------------------------------------------------
// Extra backend: context-mixing arithmetic coder
// ---------------------------------------------------------------------------

/// Local bit model: 256 context rows of `1 << log_size` probabilities with
/// a sliding bit context.
struct RolzPredictor {
    probs: Vec<i32>,
    log_size: u32,
    size: i32,
    c1: i32,
    ctx: i32,
}

impl RolzPredictor {
    fn new(log_size: u32) -> Self {
        let size = 1i32 << log_size;
        let mut p = Self {
            probs: vec![0; 256 * size as usize],
            log_size,
            size,
            c1: 1,
            ctx: 0,
        };
        p.reset();
        p
    }

    fn reset(&mut self) {
        self.c1 = 1;
        self.ctx = 0;
        self.probs.fill(1 << 15);
    }

    fn set_context(&mut self, ctx: u8) {
        self.ctx = i32::from(ctx) << self.log_size;
    }

    fn update(&mut self, bit: u8) {
        let idx = (self.ctx + self.c1) as usize;
        let b = i32::from(bit & 1);
        self.probs[idx] -= ((self.probs[idx] - (-b & 0xFFFF)) >> 5) + b;
        self.c1 = (self.c1 << 1) + b;
        if self.c1 >= self.size {
            self.c1 = 1;
        }
    }

    fn get(&mut self) -> i32 {
        self.probs[(self.ctx + self.c1) as usize] >> 4
    }
}

/// Raw-buffer arithmetic encoder shared by the literal and match models.
struct RolzBitEncoder {
    low: u64,
    high: u64,
    out: Vec<u8>,
}

impl RolzBitEncoder {
    fn new() -> Self {
        Self {
            low: 0,
            high: TOP,
            out: Vec::new(),
        }
    }

    fn encode_bit(&mut self, pred: &mut RolzPredictor, bit: u8) {
        let range = self.high.wrapping_sub(self.low);
        let split = ((range >> 4) * (pred.get() as u64)) >> 8;

        let b = u64::from(bit).wrapping_neg();
        self.high = self.high.wrapping_sub(b & (range - split));
        self.low = self.low.wrapping_add(!b & (split + 1));

        pred.update(bit);

        while (self.low ^ self.high) & MASK_24_56 == 0 {
            self.out
                .extend_from_slice(&((self.high >> 32) as u32).to_be_bytes());
            self.low <<= 32;
            self.high = (self.high << 32) | MASK_0_32;
        }
    }

    fn encode_byte(&mut self, pred: &mut RolzPredictor, val: u8) {
        for shift in (0..8).rev() {
            self.encode_bit(pred, (val >> shift) & 1);
        }
    }

    fn dispose(mut self) -> Vec<u8> {
        for _ in 0..8 {
            self.out.push((self.low >> 56) as u8);
            self.low <<= 8;
        }
        self.out
    }
}

struct RolzBitDecoder<'a> {
    low: u64,
    high: u64,
    current: u64,
    buf: &'a [u8],
    idx: usize,
}

impl<'a> RolzBitDecoder<'a> {
    fn new(buf: &'a [u8], idx: usize) -> Result<Self> {
        if idx + 8 > buf.len() {
            return Err(Error::InvalidData("truncated arithmetic stream".into()));
        }
        let mut current = 0u64;
        for i in 0..8 {
            current = (current << 8) | u64::from(buf[idx + i]);
        }
        Ok(Self {
            low: 0,
            high: TOP,
            current,
            buf,
            idx: idx + 8,
        })
    }

    fn decode_bit(&mut self, pred: &mut RolzPredictor) -> Result<u8> {
        let split = self.low + ((((self.high - self.low) >> 4) * (pred.get() as u64)) >> 8);

        let bit = if split >= self.current {
            self.high = split;
            pred.update(1);
            1
        } else {
            self.low = split.wrapping_add(1);
            pred.update(0);
            0
        };

        while (self.low ^ self.high) & MASK_24_56 == 0 {
            self.low = (self.low << 32) & MASK_0_56;
            self.high = ((self.high << 32) | MASK_0_32) & MASK_0_56;
            if self.idx + 4 > self.buf.len() {
                return Err(Error::InvalidData("truncated arithmetic stream".into()));
            }
            let val = u64::from(u32::from_be_bytes([
                self.buf[self.idx],
                self.buf[self.idx + 1],
                self.buf[self.idx + 2],
                self.buf[self.idx + 3],
            ]));
            self.current = ((self.current << 32) | val) & MASK_0_56;
            self.idx += 4;
        }

        Ok(bit)
    }

    fn decode_byte(&mut self, pred: &mut RolzPredictor) -> Result<u8> {
        let mut val = 0u8;
        for _ in 0..8 {
            val = (val << 1) | self.decode_bit(pred)?;
        }
        Ok(val)
    }
}

struct RolzExtra {
    index: RolzIndex,
    lit_pred: RolzPredictor,
    match_pred: RolzPredictor,
}

impl RolzExtra {
    fn new(log_pos_checks: u32) -> Result<Self> {
        Ok(Self {
            index: RolzIndex::new(log_pos_checks)?,
            lit_pred: RolzPredictor::new(9),
            match_pred: RolzPredictor::new(log_pos_checks),
        })
    }

    fn max_encoded_len(src_len: usize) -> usize {
        // No per-byte bounds checks inside the coder: leave headroom for
        // incompressible data.
        if src_len >= CHUNK_SIZE {
            src_len
        } else if src_len <= 512 {
            src_len + 32
        } else {
            src_len + src_len / 8
        }
    }

    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let required = Self::max_encoded_len(src.len());
        if dst.len() < required {
            return Err(Error::BufferTooSmall {
                size: dst.len(),
                required,
            });
        }

        let src_end = src.len().saturating_sub(4);
        let mut size_chunk = src.len().min(CHUNK_SIZE);
        let mut start_chunk = 0;

        self.lit_pred.reset();
        self.match_pred.reset();
        self.index.reset_counters();
        let mut enc = RolzBitEncoder::new();
        let log = self.index.log_pos_checks;

        while start_chunk < src_end {
            self.index.reset_matches();

            let end_chunk = (start_chunk + size_chunk).min(src_end);
            size_chunk = end_chunk - start_chunk;
            let buf = &src[start_chunk..];
            let mut src_idx = 0;

            self.lit_pred.set_context(0);
            enc.encode_bit(&mut self.lit_pred, LITERAL_FLAG);
            enc.encode_byte(&mut self.lit_pred, buf[src_idx]);
            src_idx += 1;

            if start_chunk + 1 < src_end {
                enc.encode_bit(&mut self.lit_pred, LITERAL_FLAG);
                enc.encode_byte(&mut self.lit_pred, buf[src_idx]);
                src_idx += 1;
            }

            while src_idx < size_chunk {
                self.lit_pred.set_context(buf[src_idx - 1]);

                match self.index.find_match(buf, src_idx, size_chunk) {
                    None => {
                        enc.encode_bit(&mut self.lit_pred, LITERAL_FLAG);
                        enc.encode_byte(&mut self.lit_pred, buf[src_idx]);
                        src_idx += 1;
                    }
                    Some((rank, m_len)) => {
                        enc.encode_bit(&mut self.lit_pred, MATCH_FLAG);
                        enc.encode_byte(&mut self.lit_pred, m_len as u8);
                        self.match_pred.set_context(buf[src_idx - 1]);
                        for shift in (1..=log).rev() {
                            enc.encode_bit(&mut self.match_pred, (rank >> (shift - 1)) & 1);
                        }
                        src_idx += m_len + MIN_MATCH;
                    }
                }
            }

            start_chunk = end_chunk;
        }

        // Trailing bytes go through the coder as plain literals
        for p in src_end..src.len() {
            let ctx = if p == 0 { 0 } else { src[p - 1] };
            self.lit_pred.set_context(ctx);
            enc.encode_bit(&mut self.lit_pred, LITERAL_FLAG);
            enc.encode_byte(&mut self.lit_pred, src[p]);
        }

        let payload = enc.dispose();
        let total = 4 + payload.len();
        if total > dst.len() {
            return Err(Error::BufferTooSmall {
                size: dst.len(),
                required: total,
            });
        }

        dst[0..4].copy_from_slice(&(src.len() as u32).to_be_bytes());
        dst[4..total].copy_from_slice(&payload);

        Ok((src.len(), total))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.len() < 4 {
            return Err(Error::InvalidData("truncated ROLZX block".into()));
        }
        let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > dst.len() {
            return Err(Error::InvalidData(format!(
                "declared size {declared} exceeds buffer of {}",
                dst.len()
            )));
        }

        let dst_end = declared.saturating_sub(4);
        let mut size_chunk = declared.min(CHUNK_SIZE);
        let mut start_chunk = 0;

        self.lit_pred.reset();
        self.match_pred.reset();
        self.index.reset_counters();
        let mut dec = RolzBitDecoder::new(src, 4)?;
        let log = self.index.log_pos_checks;

        while start_chunk < dst_end {
            self.index.reset_matches();

            let end_chunk = (start_chunk + size_chunk).min(dst_end);
            size_chunk = end_chunk - start_chunk;
            let buf = &mut dst[start_chunk..end_chunk];
            let mut d = 0;

            self.lit_pred.set_context(0);
            if dec.decode_bit(&mut self.lit_pred)? != LITERAL_FLAG {
                return Err(Error::InvalidData("chunk does not start with a literal".into()));
            }
            buf[d] = dec.decode_byte(&mut self.lit_pred)?;
            d += 1;

            if start_chunk + 1 < dst_end {
                if dec.decode_bit(&mut self.lit_pred)? != LITERAL_FLAG {
                    return Err(Error::InvalidData(
                        "chunk does not start with a literal".into(),
                    ));
                }
                buf[d] = dec.decode_byte(&mut self.lit_pred)?;
                d += 1;
            }

            while d < size_chunk {
                let saved = d;
                let key = key_at(buf, d);
                self.lit_pred.set_context(buf[d - 1]);

                if dec.decode_bit(&mut self.lit_pred)? == MATCH_FLAG {
                    let m_len = usize::from(dec.decode_byte(&mut self.lit_pred)?);
                    if d + m_len + MIN_MATCH > size_chunk {
                        return Err(Error::InvalidData("match crosses chunk end".into()));
                    }

                    self.match_pred.set_context(buf[d - 1]);
                    let mut rank = 0i32;
                    for shift in (1..=log).rev() {
                        rank |= i32::from(dec.decode_bit(&mut self.match_pred)?) << (shift - 1);
                    }

                    let r = self.index.lookup(key, rank);
                    if r < 0 || (r as usize) >= d {
                        return Err(Error::InvalidData("match reference out of range".into()));
                    }
                    d = emit_copy(buf, d, r as usize, m_len);
                } else {
                    buf[d] = dec.decode_byte(&mut self.lit_pred)?;
                    d += 1;
                }

                self.index.register(key, saved);
            }

            start_chunk = end_chunk;
        }

        // Trailing literals
        for p in dst_end..declared {
            let ctx = if p == 0 { 0 } else { dst[p - 1] };
            self.lit_pred.set_context(ctx);
            if dec.decode_bit(&mut self.lit_pred)? != LITERAL_FLAG {
                return Err(Error::InvalidData("trailer is not literal-coded".into()));
            }
            dst[p] = dec.decode_byte(&mut self.lit_pred)?;
        }

        Ok((src.len(), declared))
    }
}

// ---------------------------------------------------------------------------
// Public codec
// ---------------------------------------------------------------------------

enum Backend {
    Fast(RolzFast),
    Extra(RolzExtra),
}

pub struct RolzCodec {
    backend: Backend,
}

impl RolzCodec {
    /// `extra` selects the arithmetic-coder backend (ROLZX).
    pub fn new(extra: bool) -> Result<Self> {
        if extra {
            Self::with_log_pos_checks(true, LOG_POS_CHECKS_EXTRA)
        } else {
            Self::with_log_pos_checks(false, LOG_POS_CHECKS_FAST)
        }
    }

    pub fn with_log_pos_checks(extra: bool, log_pos_checks: u32) -> Result<Self> {
        let backend = if extra {
            Backend::Extra(RolzExtra::new(log_pos_checks)?)
        } else {
            Backend::Fast(RolzFast::new(log_pos_checks)?)
        };
        Ok(Self { backend })
    }

    fn check_len(len: usize) -> Result<()> {
        if len > MAX_BLOCK_SIZE {
            return Err(Error::InvalidParameter(format!(
                "the max ROLZ block size is {MAX_BLOCK_SIZE}, got {len}"
            )));
        }
        Ok(())
    }
}

impl Transform for RolzCodec {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.is_empty() {
            return Ok((0, 0));
        }
        Self::check_len(src.len())?;
        match &mut self.backend {
            Backend::Fast(b) => b.forward(src, dst),
            Backend::Extra(b) => b.forward(src, dst),
        }
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.is_empty() {
            return Ok((0, 0));
        }
        Self::check_len(src.len())?;
        match &mut self.backend {
            Backend::Fast(b) => b.inverse(src, dst),
            Backend::Extra(b) => b.inverse(src, dst),
        }
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        match &self.backend {
            Backend::Fast(_) => RolzFast::max_encoded_len(src_len),
            Backend::Extra(_) => RolzExtra::max_encoded_len(src_len),
        }
    }
}
