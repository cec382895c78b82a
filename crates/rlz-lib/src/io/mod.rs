//! Compressed container and the parallel block pipeline.
//!
//! Stream layout: a 15-byte header (magic, version, entropy id, packed
//! transform chain, flags, block size), then framed blocks, then a
//! zero-length terminator frame. Each frame is byte-delimited so blocks
//! can be handed to workers independently.
//!
//! Both directions run the same pipeline shape: the calling thread reads
//! batches of up to `jobs` blocks and feeds a bounded channel; a worker
//! thread processes each batch with rayon; a writer thread drains results
//! in ordinal order. Per-block codec instances live entirely inside the
//! worker closure - nothing adaptive is ever shared.

pub mod listener;

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::bitstream::{BitReader, BitWriter};
use crate::config::{CompressConfig, DecompressConfig, MAX_BLOCK_SIZE, MAX_JOBS, MIN_BLOCK_SIZE};
use crate::entropy::{self, Entropy};
use crate::error::{Error, Result};
use crate::transform::TransformChain;

use listener::{notify, Event, EventKind, Listener};

pub const MAGIC: [u8; 4] = *b"RLZ\x1A";
pub const STREAM_VERSION: u8 = 1;

/// Pipelining depth of the batch channels.
const CHANNEL_BOUND: usize = 2;

const MODE_CHAIN_SKIPPED: u8 = 0x01;
const MODE_ENTROPY_SKIPPED: u8 = 0x02;

/// Decoded stream parameters, echoed verbatim between encoder and decoder.
#[derive(Clone, Debug)]
pub struct StreamHeader {
    pub block_size: usize,
    pub chain: TransformChain,
    pub entropy: Entropy,
    pub checksum: bool,
}

impl StreamHeader {
    fn write(&self, out: &mut dyn Write) -> Result<usize> {
        let mut buf = Vec::with_capacity(15);
        buf.extend_from_slice(&MAGIC);
        buf.push(STREAM_VERSION);
        buf.push(self.entropy.id());
        buf.extend_from_slice(&self.chain.packed_id().to_be_bytes());
        buf.push(u8::from(self.checksum));
        buf.extend_from_slice(&(self.block_size as u32).to_be_bytes());
        out.write_all(&buf)?;
        Ok(buf.len())
    }

    fn read(input: &mut dyn Read) -> Result<Self> {
        let mut buf = [0u8; 15];
        input
            .read_exact(&mut buf)
            .map_err(|_| Error::InvalidData("truncated stream header".into()))?;

        if buf[0..4] != MAGIC {
            return Err(Error::InvalidData("bad magic bytes".into()));
        }
        if buf[4] != STREAM_VERSION {
            return Err(Error::Unsupported(format!(
                "stream version {} (expected {STREAM_VERSION})",
                buf[4]
            )));
        }

        let entropy = Entropy::from_id(buf[5])?;
        let chain =
            TransformChain::from_packed_id(u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]))?;
        let checksum = match buf[10] {
            0 => false,
            1 => true,
            v => {
                return Err(Error::InvalidData(format!("bad header flags: {v:#04x}")));
            }
        };
        let block_size = u32::from_be_bytes([buf[11], buf[12], buf[13], buf[14]]) as usize;
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
            return Err(Error::InvalidData(format!(
                "block size {block_size} out of range"
            )));
        }

        Ok(Self {
            block_size,
            chain,
            entropy,
            checksum,
        })
    }
}

/// One block, processed and ready for framing.
struct EncodedBlock {
    ordinal: usize,
    mode: u8,
    orig_len: usize,
    transformed_len: usize,
    crc: Option<u32>,
    payload: Vec<u8>,
}

/// One parsed frame, ready for a worker.
struct Frame {
    ordinal: usize,
    mode: u8,
    orig_len: usize,
    transformed_len: usize,
    crc: Option<u32>,
    payload: Vec<u8>,
}

/// Result counters reported to the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineSummary {
    pub blocks: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

fn validate_jobs(jobs: usize) -> Result<()> {
    if jobs == 0 || jobs > MAX_JOBS {
        return Err(Error::InvalidParameter(format!(
            "jobs must be in [1..{MAX_JOBS}], got {jobs}"
        )));
    }
    Ok(())
}

/// Encode one block: transform chain, then entropy, each stage skipped when
/// it fails to shrink its input.
fn encode_one_block(
    header: &StreamHeader,
    ordinal: usize,
    data: &[u8],
    listeners: &[Box<dyn Listener>],
) -> Result<EncodedBlock> {
    let crc = header.checksum.then(|| crc32fast::hash(data));

    notify(
        listeners,
        &Event::block(EventKind::BeforeTransform, ordinal, data.len(), crc),
    );

    let mut mode = 0u8;
    let transformed = if header.chain.is_empty() {
        mode |= MODE_CHAIN_SKIPPED;
        data.to_vec()
    } else {
        match header.chain.forward(data) {
            Ok(t) if t.len() < data.len() => t,
            Ok(_) | Err(Error::BufferTooSmall { .. }) => {
                mode |= MODE_CHAIN_SKIPPED;
                data.to_vec()
            }
            Err(e) => return Err(e),
        }
    };

    notify(
        listeners,
        &Event::block(EventKind::AfterTransform, ordinal, transformed.len(), crc),
    );
    notify(
        listeners,
        &Event::block(EventKind::BeforeEntropy, ordinal, transformed.len(), crc),
    );

    let mut obs = BitWriter::new(Vec::new());
    entropy::encode_block(header.entropy, &mut obs, &transformed)?;
    let (coded, _) = obs.finish()?;

    let (payload, transformed_len) = if coded.len() >= transformed.len() {
        mode |= MODE_ENTROPY_SKIPPED;
        let len = transformed.len();
        (transformed, len)
    } else {
        let len = transformed.len();
        (coded, len)
    };

    notify(
        listeners,
        &Event::block(EventKind::AfterEntropy, ordinal, payload.len(), crc),
    );

    Ok(EncodedBlock {
        ordinal,
        mode,
        orig_len: data.len(),
        transformed_len,
        crc,
        payload,
    })
}

/// Decode one frame back to its original bytes, verifying the CRC last.
fn decode_one_block(
    header: &StreamHeader,
    frame: &Frame,
    listeners: &[Box<dyn Listener>],
) -> Result<Vec<u8>> {
    if frame.orig_len > header.block_size {
        return Err(Error::InvalidData(format!(
            "block {} declares {} bytes, block size is {}",
            frame.ordinal, frame.orig_len, header.block_size
        )));
    }
    if frame.transformed_len > frame.orig_len.max(1) {
        return Err(Error::InvalidData(format!(
            "block {}: transformed length {} exceeds original {}",
            frame.ordinal, frame.transformed_len, frame.orig_len
        )));
    }

    let transformed = if frame.mode & MODE_ENTROPY_SKIPPED != 0 {
        if frame.payload.len() != frame.transformed_len {
            return Err(Error::InvalidData(format!(
                "block {}: raw payload length mismatch",
                frame.ordinal
            )));
        }
        frame.payload.clone()
    } else {
        let mut ibs = BitReader::new(&frame.payload[..]);
        let mut out = vec![0u8; frame.transformed_len];
        entropy::decode_block(header.entropy, &mut ibs, &mut out)?;
        out
    };

    let data = if frame.mode & MODE_CHAIN_SKIPPED != 0 {
        if transformed.len() != frame.orig_len {
            return Err(Error::InvalidData(format!(
                "block {}: untransformed length mismatch",
                frame.ordinal
            )));
        }
        transformed
    } else {
        header
            .chain
            .inverse(&transformed, frame.orig_len, header.block_size)?
    };

    if let Some(stored) = frame.crc {
        let computed = crc32fast::hash(&data);
        if computed != stored {
            return Err(Error::CrcMismatch {
                block: frame.ordinal,
                stored,
                computed,
            });
        }
    }

    notify(
        listeners,
        &Event::block(EventKind::BlockInfo, frame.ordinal, data.len(), frame.crc),
    );

    Ok(data)
}

/// Fill `buf` from `input`, tolerating short reads. Returns bytes read.
fn read_full(input: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn read_exact_or(input: &mut dyn Read, buf: &mut [u8], what: &str) -> Result<()> {
    input
        .read_exact(buf)
        .map_err(|_| Error::InvalidData(format!("truncated stream: {what}")))
}

fn write_frame(out: &mut dyn Write, block: &EncodedBlock) -> Result<u64> {
    // A zero payload length is the stream terminator; no codec emits zero
    // bytes for a non-empty block.
    debug_assert!(!block.payload.is_empty());
    let mut head = Vec::with_capacity(17);
    head.extend_from_slice(&(block.payload.len() as u32).to_be_bytes());
    head.push(block.mode);
    head.extend_from_slice(&(block.orig_len as u32).to_be_bytes());
    head.extend_from_slice(&(block.transformed_len as u32).to_be_bytes());
    if let Some(crc) = block.crc {
        head.extend_from_slice(&crc.to_be_bytes());
    }
    out.write_all(&head)?;
    out.write_all(&block.payload)?;
    Ok((head.len() + block.payload.len()) as u64)
}

/// Compress `input` into `output`. Returns the pipeline counters.
pub fn compress_stream(
    input: &mut dyn Read,
    output: &mut (dyn Write + Send),
    config: &CompressConfig,
    listeners: &[Box<dyn Listener>],
) -> Result<PipelineSummary> {
    validate_jobs(config.jobs)?;
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&config.block_size) {
        return Err(Error::InvalidParameter(format!(
            "block size must be in [{MIN_BLOCK_SIZE}..{MAX_BLOCK_SIZE}], got {}",
            config.block_size
        )));
    }

    let header = StreamHeader {
        block_size: config.block_size,
        chain: TransformChain::from_name(&config.transform)?,
        entropy: Entropy::from_name(&config.entropy)?,
        checksum: config.checksum,
    };

    notify(listeners, &Event::stream(EventKind::CompressionStart, 0));
    let header_len = header.write(output)? as u64;

    let cancel = AtomicBool::new(false);
    let jobs = config.jobs;

    let (bytes_in, read_error, worker_res, writer_res) = std::thread::scope(|scope| {
        let (batch_tx, batch_rx) = sync_channel::<Vec<(usize, Vec<u8>)>>(CHANNEL_BOUND);
        let (res_tx, res_rx) = sync_channel::<Result<Vec<EncodedBlock>>>(CHANNEL_BOUND);

        let header_ref = &header;
        let cancel_ref = &cancel;
        let out_ref = &mut *output;

        let worker = scope.spawn(move || -> Result<()> {
            for batch in batch_rx {
                if cancel_ref.load(Ordering::SeqCst) {
                    break;
                }
                let result: Result<Vec<EncodedBlock>> = batch
                    .par_iter()
                    .map(|(ordinal, data)| {
                        if cancel_ref.load(Ordering::SeqCst) {
                            return Err(Error::InvalidData("cancelled".into()));
                        }
                        encode_one_block(header_ref, *ordinal, data, listeners)
                    })
                    .collect();
                let failed = result.is_err();
                if failed {
                    cancel_ref.store(true, Ordering::SeqCst);
                }
                if res_tx.send(result).is_err() || failed {
                    break;
                }
            }
            Ok(())
        });

        let writer = scope.spawn(move || -> Result<(usize, u64)> {
            let mut blocks = 0usize;
            let mut written = 0u64;
            for result in res_rx {
                match result {
                    Ok(encoded) => {
                        for block in &encoded {
                            written += write_frame(out_ref, block)?;
                            blocks += 1;
                            debug!(
                                block = block.ordinal,
                                orig = block.orig_len,
                                out = block.payload.len(),
                                "block written"
                            );
                        }
                    }
                    Err(e) => {
                        cancel_ref.store(true, Ordering::SeqCst);
                        return Err(e);
                    }
                }
            }
            Ok((blocks, written))
        });

        // Producer: sequential reads on the calling thread.
        let mut bytes_in = 0u64;
        let mut ordinal = 0usize;
        let mut read_error = None;
        'produce: loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let mut batch = Vec::with_capacity(jobs);
            for _ in 0..jobs {
                let mut buf = vec![0u8; config.block_size];
                let n = match read_full(input, &mut buf) {
                    Ok(n) => n,
                    Err(e) => {
                        read_error = Some(e);
                        cancel.store(true, Ordering::SeqCst);
                        break 'produce;
                    }
                };
                if n == 0 {
                    break;
                }
                buf.truncate(n);
                bytes_in += n as u64;
                batch.push((ordinal, buf));
                ordinal += 1;
            }
            if batch.is_empty() {
                break;
            }
            let last_full = batch.len() == jobs;
            if batch_tx.send(batch).is_err() {
                break;
            }
            if !last_full {
                break;
            }
        }
        drop(batch_tx);

        let worker_res = match worker.join() {
            Ok(v) => v,
            Err(e) => std::panic::resume_unwind(e),
        };
        let writer_res = match writer.join() {
            Ok(v) => v,
            Err(e) => std::panic::resume_unwind(e),
        };
        (bytes_in, read_error, worker_res, writer_res)
    });

    // A concrete block failure beats a read failure in specificity; report
    // writer errors first, then reader, then worker bookkeeping.
    let (blocks, frame_bytes) = writer_res?;
    if let Some(e) = read_error {
        return Err(e);
    }
    worker_res?;

    // Terminator frame
    output.write_all(&0u32.to_be_bytes())?;
    output.flush()?;

    let summary = PipelineSummary {
        blocks,
        bytes_in,
        bytes_out: header_len + frame_bytes + 4,
    };

    notify(
        listeners,
        &Event::stream(EventKind::CompressionEnd, summary.bytes_out as usize),
    );
    info!(
        blocks = summary.blocks,
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        "compression finished"
    );

    Ok(summary)
}

/// Read one frame. Returns None at the terminator.
fn read_frame(
    input: &mut dyn Read,
    checksum: bool,
    ordinal: usize,
    block_size: usize,
) -> Result<Option<Frame>> {
    let mut len4 = [0u8; 4];
    read_exact_or(input, &mut len4, "frame length")?;
    let payload_len = u32::from_be_bytes(len4) as usize;
    if payload_len == 0 {
        return Ok(None);
    }
    // A frame payload can never meaningfully exceed the block size plus
    // codec headroom; anything bigger is structural corruption.
    if payload_len > block_size + block_size / 4 + 1024 {
        return Err(Error::InvalidData(format!(
            "frame payload of {payload_len} bytes exceeds any valid encoding"
        )));
    }

    let mut mode1 = [0u8; 1];
    read_exact_or(input, &mut mode1, "frame mode")?;
    let mode = mode1[0];
    let mut len4b = [0u8; 4];
    read_exact_or(input, &mut len4b, "original length")?;
    let orig_len = u32::from_be_bytes(len4b) as usize;
    read_exact_or(input, &mut len4b, "transformed length")?;
    let transformed_len = u32::from_be_bytes(len4b) as usize;

    let crc = if checksum {
        read_exact_or(input, &mut len4b, "block checksum")?;
        Some(u32::from_be_bytes(len4b))
    } else {
        None
    };

    let mut payload = vec![0u8; payload_len];
    read_exact_or(input, &mut payload, "frame payload")?;

    Ok(Some(Frame {
        ordinal,
        mode,
        orig_len,
        transformed_len,
        crc,
        payload,
    }))
}

/// Decompress `input` into `output`. Returns the pipeline counters.
pub fn decompress_stream(
    input: &mut dyn Read,
    output: &mut (dyn Write + Send),
    config: &DecompressConfig,
    listeners: &[Box<dyn Listener>],
) -> Result<PipelineSummary> {
    validate_jobs(config.jobs)?;
    if let (Some(from), Some(to)) = (config.from, config.to) {
        if from >= to {
            return Err(Error::InvalidParameter(format!(
                "empty block range: from {from}, to {to}"
            )));
        }
    }

    let header = StreamHeader::read(input)?;
    notify(listeners, &Event::stream(EventKind::DecompressionStart, 0));
    debug!(
        entropy = header.entropy.name(),
        transform = header.chain.name(),
        block_size = header.block_size,
        checksum = header.checksum,
        "stream header"
    );

    let cancel = AtomicBool::new(false);
    let jobs = config.jobs;
    let from = config.from.unwrap_or(0);
    let to = config.to.unwrap_or(usize::MAX);

    let (bytes_in_res, worker_res, writer_res) = std::thread::scope(|scope| {
        let (batch_tx, batch_rx) = sync_channel::<Vec<Frame>>(CHANNEL_BOUND);
        let (res_tx, res_rx) = sync_channel::<Result<Vec<(usize, Vec<u8>)>>>(CHANNEL_BOUND);

        let header_ref = &header;
        let cancel_ref = &cancel;
        let out_ref = &mut *output;

        let worker = scope.spawn(move || -> Result<()> {
            for batch in batch_rx {
                if cancel_ref.load(Ordering::SeqCst) {
                    break;
                }
                let result: Result<Vec<(usize, Vec<u8>)>> = batch
                    .par_iter()
                    .map(|frame| {
                        if cancel_ref.load(Ordering::SeqCst) {
                            return Err(Error::InvalidData("cancelled".into()));
                        }
                        decode_one_block(header_ref, frame, listeners)
                            .map(|data| (frame.ordinal, data))
                    })
                    .collect();
                let failed = result.is_err();
                if failed {
                    cancel_ref.store(true, Ordering::SeqCst);
                }
                if res_tx.send(result).is_err() || failed {
                    break;
                }
            }
            Ok(())
        });

        let writer = scope.spawn(move || -> Result<(usize, u64)> {
            let mut blocks = 0usize;
            let mut written = 0u64;
            for result in res_rx {
                match result {
                    Ok(decoded) => {
                        for (ordinal, data) in &decoded {
                            if *ordinal >= to {
                                cancel_ref.store(true, Ordering::SeqCst);
                                return Ok((blocks, written));
                            }
                            if *ordinal >= from {
                                out_ref.write_all(data)?;
                                written += data.len() as u64;
                            }
                            blocks += 1;
                        }
                    }
                    Err(e) => {
                        cancel_ref.store(true, Ordering::SeqCst);
                        return Err(e);
                    }
                }
            }
            Ok((blocks, written))
        });

        // Producer: parse frames sequentially.
        let mut bytes_in = 0u64;
        let mut ordinal = 0usize;
        let mut read_result: Result<()> = Ok(());
        'produce: loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let mut batch = Vec::with_capacity(jobs);
            let mut done = false;
            for _ in 0..jobs {
                match read_frame(input, header.checksum, ordinal, header.block_size) {
                    Ok(Some(frame)) => {
                        bytes_in += 13
                            + if header.checksum { 4 } else { 0 }
                            + frame.payload.len() as u64;
                        batch.push(frame);
                        ordinal += 1;
                    }
                    Ok(None) => {
                        done = true;
                        break;
                    }
                    Err(e) => {
                        read_result = Err(e);
                        cancel.store(true, Ordering::SeqCst);
                        break 'produce;
                    }
                }
            }
            if !batch.is_empty() && batch_tx.send(batch).is_err() {
                break;
            }
            if done {
                break;
            }
        }
        drop(batch_tx);

        let worker_res = match worker.join() {
            Ok(v) => v,
            Err(e) => std::panic::resume_unwind(e),
        };
        let writer_res = match writer.join() {
            Ok(v) => v,
            Err(e) => std::panic::resume_unwind(e),
        };
        (
            read_result.map(|_| bytes_in),
            worker_res,
            writer_res,
        )
    });

    let writer_out = writer_res;
    // Writer errors describe a concrete bad block; report them first.
    let (blocks, bytes_out) = writer_out?;
    worker_res?;
    let bytes_in = bytes_in_res?;

    output.flush()?;

    let summary = PipelineSummary {
        blocks,
        bytes_in: bytes_in + 15,
        bytes_out,
    };

    notify(
        listeners,
        &Event::stream(EventKind::DecompressionEnd, summary.bytes_out as usize),
    );
    info!(
        blocks = summary.blocks,
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        "decompression finished"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BLOCK_SIZE;

    fn compress_cfg(transform: &str, entropy: &str, jobs: usize) -> CompressConfig {
        CompressConfig {
            transform: transform.to_string(),
            entropy: entropy.to_string(),
            jobs,
            block_size: DEFAULT_BLOCK_SIZE,
            ..CompressConfig::default()
        }
    }

    fn roundtrip_bytes(data: &[u8], cfg: &CompressConfig) -> Vec<u8> {
        let mut compressed = Vec::new();
        compress_stream(&mut &data[..], &mut compressed, cfg, &[]).unwrap();

        let dcfg = DecompressConfig {
            jobs: cfg.jobs,
            ..DecompressConfig::default()
        };
        let mut out = Vec::new();
        decompress_stream(&mut &compressed[..], &mut out, &dcfg, &[]).unwrap();
        assert_eq!(out, data);
        compressed
    }

    #[test]
    fn header_roundtrip() {
        let header = StreamHeader {
            block_size: 1 << 20,
            chain: TransformChain::from_name("RLT+ROLZ").unwrap(),
            entropy: Entropy::Ans1,
            checksum: true,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let parsed = StreamHeader::read(&mut &buf[..]).unwrap();
        assert_eq!(parsed.block_size, header.block_size);
        assert_eq!(parsed.chain, header.chain);
        assert_eq!(parsed.entropy, header.entropy);
        assert_eq!(parsed.checksum, header.checksum);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut buf = Vec::new();
        StreamHeader {
            block_size: 1 << 20,
            chain: TransformChain::from_name("NONE").unwrap(),
            entropy: Entropy::None,
            checksum: false,
        }
        .write(&mut buf)
        .unwrap();
        buf[0] = b'X';
        assert!(matches!(
            StreamHeader::read(&mut &buf[..]),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut buf = Vec::new();
        StreamHeader {
            block_size: 1 << 20,
            chain: TransformChain::from_name("NONE").unwrap(),
            entropy: Entropy::None,
            checksum: false,
        }
        .write(&mut buf)
        .unwrap();
        buf[4] = 99;
        assert!(matches!(
            StreamHeader::read(&mut &buf[..]),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn empty_input_roundtrips() {
        let compressed = roundtrip_bytes(&[], &compress_cfg("ROLZ", "ANS0", 2));
        // Header + terminator only.
        assert_eq!(compressed.len(), 19);
    }

    #[test]
    fn single_byte_roundtrips() {
        roundtrip_bytes(&[0x41], &compress_cfg("ROLZ", "ANS0", 1));
    }

    #[test]
    fn multi_block_text_roundtrips() {
        let data = b"a block is cut, transformed, coded and framed in order. ".repeat(2000);
        let mut cfg = compress_cfg("ROLZ", "ANS0", 3);
        cfg.block_size = 4096;
        let compressed = roundtrip_bytes(&data, &cfg);
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn random_data_expands_by_frame_overhead_only() {
        let mut s = 42u64;
        let data: Vec<u8> = (0..4096)
            .map(|_| {
                s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (s >> 56) as u8
            })
            .collect();
        let compressed = roundtrip_bytes(&data, &compress_cfg("ROLZ", "ANS0", 1));
        assert!(
            compressed.len() <= data.len() + 32,
            "compressed {} vs input {}",
            compressed.len(),
            data.len()
        );
    }

    #[test]
    fn output_is_independent_of_worker_count() {
        let data = b"ordering must not depend on concurrency at all ".repeat(3000);
        let mut one = compress_cfg("ROLZ", "ANS0", 1);
        one.block_size = 8192;
        let mut four = compress_cfg("ROLZ", "ANS0", 4);
        four.block_size = 8192;
        let a = roundtrip_bytes(&data, &one);
        let b = roundtrip_bytes(&data, &four);
        assert_eq!(a, b);
    }

    #[test]
    fn crc_mismatch_detected() {
        let data = b"integrity matters more than speed here ".repeat(100);
        let mut cfg = compress_cfg("ROLZ", "ANS0", 1);
        cfg.checksum = true;
        let mut compressed = Vec::new();
        compress_stream(&mut &data[..], &mut compressed, &cfg, &[]).unwrap();

        // Flip one bit inside the stored CRC of the first frame
        // (header 15 + frame length 4 + mode 1 + lengths 8 => CRC at 28).
        compressed[28] ^= 0x01;

        let mut out = Vec::new();
        let err = decompress_stream(
            &mut &compressed[..],
            &mut out,
            &DecompressConfig::default(),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::CrcMismatch { .. }), "got {err:?}");
    }

    #[test]
    fn block_range_selection() {
        let block = 1024usize;
        let mut data = Vec::new();
        for i in 0..5u8 {
            data.extend(std::iter::repeat(b'a' + i).take(block));
        }
        let mut cfg = compress_cfg("ROLZ", "ANS0", 2);
        cfg.block_size = block;
        let mut compressed = Vec::new();
        compress_stream(&mut &data[..], &mut compressed, &cfg, &[]).unwrap();

        let dcfg = DecompressConfig {
            from: Some(1),
            to: Some(3),
            ..DecompressConfig::default()
        };
        let mut out = Vec::new();
        decompress_stream(&mut &compressed[..], &mut out, &dcfg, &[]).unwrap();
        assert_eq!(out, data[block..3 * block].to_vec());
    }

    #[test]
    fn truncated_stream_is_invalid() {
        let data = b"cut short".repeat(50);
        let cfg = compress_cfg("ROLZ", "ANS0", 1);
        let mut compressed = Vec::new();
        compress_stream(&mut &data[..], &mut compressed, &cfg, &[]).unwrap();
        compressed.truncate(compressed.len() / 2);

        let mut out = Vec::new();
        assert!(decompress_stream(
            &mut &compressed[..],
            &mut out,
            &DecompressConfig::default(),
            &[],
        )
        .is_err());
    }
}
