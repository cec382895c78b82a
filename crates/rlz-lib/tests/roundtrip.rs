use std::fs;
use std::io::{Read, Write};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tempfile::TempDir;

use rlz_lib::config::{CompressConfig, DecompressConfig};
use rlz_lib::io::{compress_stream, decompress_stream};

const TRANSFORMS: [&str; 6] = ["NONE", "ROLZ", "ROLZX", "RLT", "ZRLT", "RLT+ROLZ"];
const ENTROPIES: [&str; 6] = ["NONE", "FPAQ", "ANS0", "CM", "TPAQ", "ANS1"];

fn compress_cfg(transform: &str, entropy: &str) -> CompressConfig {
    CompressConfig {
        transform: transform.to_string(),
        entropy: entropy.to_string(),
        block_size: 64 * 1024,
        jobs: 2,
        ..CompressConfig::default()
    }
}

/// Compress then decompress in memory, asserting exact recovery.
/// Returns the compressed size.
fn roundtrip(data: &[u8], cfg: &CompressConfig) -> usize {
    let mut compressed = Vec::new();
    compress_stream(&mut &data[..], &mut compressed, cfg, &[])
        .unwrap_or_else(|e| panic!("compress failed ({}/{}): {e}", cfg.transform, cfg.entropy));

    let dcfg = DecompressConfig {
        jobs: cfg.jobs,
        ..DecompressConfig::default()
    };
    let mut out = Vec::new();
    decompress_stream(&mut &compressed[..], &mut out, &dcfg, &[])
        .unwrap_or_else(|e| panic!("decompress failed ({}/{}): {e}", cfg.transform, cfg.entropy));
    assert_eq!(
        out, data,
        "roundtrip mismatch for {}/{}",
        cfg.transform, cfg.entropy
    );
    compressed.len()
}

#[test]
fn empty_input_roundtrips_everywhere() {
    for transform in TRANSFORMS {
        for entropy in ENTROPIES {
            roundtrip(&[], &compress_cfg(transform, entropy));
        }
    }
}

#[test]
fn single_byte_roundtrips_everywhere() {
    for transform in TRANSFORMS {
        for entropy in ENTROPIES {
            roundtrip(&[0x41], &compress_cfg(transform, entropy));
        }
    }
}

#[test]
fn text_roundtrips_across_codec_matrix() {
    let data =
        b"No amount of elegance excuses a codec that cannot reproduce its input. ".repeat(300);
    for transform in TRANSFORMS {
        for entropy in ENTROPIES {
            roundtrip(&data, &compress_cfg(transform, entropy));
        }
    }
}

#[test]
fn zero_run_compresses_strictly() {
    let data = vec![0u8; 1024];
    for transform in ["ROLZ", "ROLZX", "ZRLT", "RLT"] {
        let size = roundtrip(&data, &compress_cfg(transform, "ANS0"));
        assert!(
            size < data.len(),
            "{transform} produced {size} bytes for 1024 zeros"
        );
    }
}

#[test]
fn random_input_expands_at_most_32_bytes() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut data = vec![0u8; 4096];
    rng.fill_bytes(&mut data);

    let size = roundtrip(&data, &compress_cfg("ROLZ", "ANS0"));
    assert!(
        size <= data.len() + 32,
        "random block expanded: {size} vs {}",
        data.len()
    );
}

#[test]
fn binary_codecs_roundtrip_random_data() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut data = vec![0u8; 16 * 1024];
    rng.fill_bytes(&mut data);

    for entropy in ["FPAQ", "CM", "TPAQ", "TPAQX"] {
        roundtrip(&data, &compress_cfg("NONE", entropy));
    }
}

#[test]
fn structured_data_benefits_from_chaining() {
    // Sparse records: many zeros, a few repeated fields.
    let mut data = Vec::new();
    for i in 0..2000u32 {
        data.extend_from_slice(&i.to_be_bytes());
        data.extend_from_slice(&[0u8; 28]);
    }
    let chained = roundtrip(&data, &compress_cfg("ZRLT+ROLZ", "ANS0"));
    assert!(chained < data.len() / 2, "chained size {chained}");
}

#[test]
fn checksummed_streams_roundtrip() {
    let data = b"check me twice ".repeat(500);
    let mut cfg = compress_cfg("ROLZ", "ANS1");
    cfg.checksum = true;
    roundtrip(&data, &cfg);
}

#[test]
fn multi_block_output_is_worker_count_invariant() {
    let data = b"the frames of block k precede the frames of block k+1 ".repeat(4000);
    let mut sizes = Vec::new();
    let mut outputs = Vec::new();
    for jobs in [1, 2, 4, 8] {
        let mut cfg = compress_cfg("ROLZ", "ANS0");
        cfg.block_size = 16 * 1024;
        cfg.jobs = jobs;
        let mut compressed = Vec::new();
        compress_stream(&mut &data[..], &mut compressed, &cfg, &[]).unwrap();
        sizes.push(compressed.len());
        outputs.push(compressed);
    }
    for o in &outputs[1..] {
        assert_eq!(o, &outputs[0], "output depends on worker count");
    }
    assert!(sizes[0] < data.len());
}

#[test]
fn file_to_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let input_path = temp_path.join("input.bin");
    let archive_path = temp_path.join("input.rlz");
    let output_path = temp_path.join("output.bin");

    let mut data = b"files go in, identical files come out. ".repeat(3000);
    data.extend(vec![0u8; 10_000]);
    fs::write(&input_path, &data).unwrap();

    let mut cfg = compress_cfg("RLT+ROLZ", "ANS1");
    cfg.block_size = 32 * 1024;
    cfg.checksum = true;

    {
        let mut input = fs::File::open(&input_path).unwrap();
        let mut output = fs::File::create(&archive_path).unwrap();
        compress_stream(&mut input, &mut output, &cfg, &[]).unwrap();
        output.flush().unwrap();
    }

    {
        let mut input = fs::File::open(&archive_path).unwrap();
        let mut output = fs::File::create(&output_path).unwrap();
        decompress_stream(&mut input, &mut output, &DecompressConfig::default(), &[]).unwrap();
        output.flush().unwrap();
    }

    let mut restored = Vec::new();
    fs::File::open(&output_path)
        .unwrap()
        .read_to_end(&mut restored)
        .unwrap();
    assert_eq!(restored, data);

    let archived = fs::metadata(&archive_path).unwrap().len() as usize;
    assert!(archived < data.len(), "archive is {archived} bytes");
}

#[test]
fn tampered_payload_is_rejected() {
    let data = b"flip one byte and the stream must not decode quietly ".repeat(200);
    let mut cfg = compress_cfg("ROLZ", "ANS0");
    cfg.checksum = true;
    let mut compressed = Vec::new();
    compress_stream(&mut &data[..], &mut compressed, &cfg, &[]).unwrap();

    // Damage a payload byte well past the header and frame head.
    let idx = compressed.len() / 2;
    compressed[idx] ^= 0xFF;

    let mut out = Vec::new();
    assert!(
        decompress_stream(
            &mut &compressed[..],
            &mut out,
            &DecompressConfig::default(),
            &[]
        )
        .is_err(),
        "corrupted stream decoded without error"
    );
}
