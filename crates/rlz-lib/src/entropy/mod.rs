//! Entropy coders and the predictors that drive them.

pub mod ans;
pub mod apm;
pub mod binary;
pub mod cm;
pub mod fpaq;
pub mod tables;
pub mod tpaq;

use std::io::{Read, Write};

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{Error, Result};

/// Adaptive bit model: `get` returns P(next bit = 1) in [0..4095], `update`
/// absorbs the observed bit. One predictor serves one coder; instances are
/// never shared.
pub trait Predictor {
    fn update(&mut self, bit: u8);
    fn get(&mut self) -> i32;
}

/// The closed set of entropy codecs, tagged by stream id.
///
/// Ids 1 (Huffman), 3 (PAQ) and 4 (Range) are reserved names of peer
/// plug-ins not built into this distribution; the factory rejects them with
/// `Unsupported` rather than reusing their ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entropy {
    None,
    Fpaq,
    Ans0,
    Cm,
    Tpaq,
    Ans1,
    Tpaqx,
}

impl Entropy {
    pub const NONE_ID: u8 = 0;
    pub const HUFFMAN_ID: u8 = 1;
    pub const FPAQ_ID: u8 = 2;
    pub const PAQ_ID: u8 = 3;
    pub const RANGE_ID: u8 = 4;
    pub const ANS0_ID: u8 = 5;
    pub const CM_ID: u8 = 6;
    pub const TPAQ_ID: u8 = 7;
    pub const ANS1_ID: u8 = 8;
    pub const TPAQX_ID: u8 = 9;

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            Self::NONE_ID => Ok(Entropy::None),
            Self::FPAQ_ID => Ok(Entropy::Fpaq),
            Self::ANS0_ID => Ok(Entropy::Ans0),
            Self::CM_ID => Ok(Entropy::Cm),
            Self::TPAQ_ID => Ok(Entropy::Tpaq),
            Self::ANS1_ID => Ok(Entropy::Ans1),
            Self::TPAQX_ID => Ok(Entropy::Tpaqx),
            Self::HUFFMAN_ID | Self::PAQ_ID | Self::RANGE_ID => Err(Error::Unsupported(format!(
                "entropy codec id {id} is not built into this distribution"
            ))),
            _ => Err(Error::Unsupported(format!("unknown entropy codec id: {id}"))),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Entropy::None => Self::NONE_ID,
            Entropy::Fpaq => Self::FPAQ_ID,
            Entropy::Ans0 => Self::ANS0_ID,
            Entropy::Cm => Self::CM_ID,
            Entropy::Tpaq => Self::TPAQ_ID,
            Entropy::Ans1 => Self::ANS1_ID,
            Entropy::Tpaqx => Self::TPAQX_ID,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_uppercase().as_str() {
            "NONE" => Ok(Entropy::None),
            "FPAQ" => Ok(Entropy::Fpaq),
            "ANS0" => Ok(Entropy::Ans0),
            "CM" => Ok(Entropy::Cm),
            "TPAQ" => Ok(Entropy::Tpaq),
            "ANS1" => Ok(Entropy::Ans1),
            "TPAQX" => Ok(Entropy::Tpaqx),
            "HUFFMAN" | "PAQ" | "RANGE" => Err(Error::Unsupported(format!(
                "entropy codec '{name}' is not built into this distribution"
            ))),
            _ => Err(Error::Unsupported(format!("unknown entropy codec: '{name}'"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Entropy::None => "NONE",
            Entropy::Fpaq => "FPAQ",
            Entropy::Ans0 => "ANS0",
            Entropy::Cm => "CM",
            Entropy::Tpaq => "TPAQ",
            Entropy::Ans1 => "ANS1",
            Entropy::Tpaqx => "TPAQX",
        }
    }
}

fn encode_binary<W: Write>(
    obs: &mut BitWriter<W>,
    pred: Box<dyn Predictor>,
    block: &[u8],
) -> Result<()> {
    let mut enc = binary::BinaryEntropyEncoder::new(obs, pred);
    enc.encode(block)?;
    enc.dispose()
}

fn decode_binary<R: Read>(
    ibs: &mut BitReader<R>,
    pred: Box<dyn Predictor>,
    out: &mut [u8],
) -> Result<()> {
    let mut dec = binary::BinaryEntropyDecoder::new(ibs, pred)?;
    dec.decode(out)?;
    Ok(())
}

/// Entropy-code `block` into the bitstream. Every codec constructs its own
/// predictor; nothing adaptive outlives the call.
pub fn encode_block<W: Write>(
    entropy: Entropy,
    obs: &mut BitWriter<W>,
    block: &[u8],
) -> Result<()> {
    match entropy {
        Entropy::None => {
            for &b in block {
                obs.write_bits(u64::from(b), 8)?;
            }
            Ok(())
        }
        Entropy::Ans0 => {
            ans::AnsRangeEncoder::new(obs, 0)?.encode(block)?;
            Ok(())
        }
        Entropy::Ans1 => {
            ans::AnsRangeEncoder::new(obs, 1)?.encode(block)?;
            Ok(())
        }
        Entropy::Fpaq => encode_binary(obs, Box::new(fpaq::FpaqPredictor::new()), block),
        Entropy::Cm => encode_binary(obs, Box::new(cm::CmPredictor::new()), block),
        Entropy::Tpaq => encode_binary(obs, Box::new(tpaq::TpaqPredictor::new(false)), block),
        Entropy::Tpaqx => encode_binary(obs, Box::new(tpaq::TpaqPredictor::new(true)), block),
    }
}

/// Decode exactly `out.len()` bytes from the bitstream.
pub fn decode_block<R: Read>(
    entropy: Entropy,
    ibs: &mut BitReader<R>,
    out: &mut [u8],
) -> Result<()> {
    match entropy {
        Entropy::None => {
            for b in out.iter_mut() {
                *b = ibs.read_bits(8)? as u8;
            }
            Ok(())
        }
        Entropy::Ans0 => {
            ans::AnsRangeDecoder::new(ibs, 0)?.decode(out)?;
            Ok(())
        }
        Entropy::Ans1 => {
            ans::AnsRangeDecoder::new(ibs, 1)?.decode(out)?;
            Ok(())
        }
        Entropy::Fpaq => decode_binary(ibs, Box::new(fpaq::FpaqPredictor::new()), out),
        Entropy::Cm => decode_binary(ibs, Box::new(cm::CmPredictor::new()), out),
        Entropy::Tpaq => decode_binary(ibs, Box::new(tpaq::TpaqPredictor::new(false)), out),
        Entropy::Tpaqx => decode_binary(ibs, Box::new(tpaq::TpaqPredictor::new(true)), out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Entropy; 7] = [
        Entropy::None,
        Entropy::Fpaq,
        Entropy::Ans0,
        Entropy::Cm,
        Entropy::Tpaq,
        Entropy::Ans1,
        Entropy::Tpaqx,
    ];

    #[test]
    fn id_name_mapping_is_stable() {
        for e in ALL {
            assert_eq!(Entropy::from_id(e.id()).unwrap(), e);
            assert_eq!(Entropy::from_name(e.name()).unwrap(), e);
        }
        assert_eq!(Entropy::from_name("ans0").unwrap(), Entropy::Ans0);
    }

    #[test]
    fn reserved_ids_are_rejected() {
        for id in [1u8, 3, 4] {
            assert!(matches!(Entropy::from_id(id), Err(Error::Unsupported(_))));
        }
        assert!(matches!(Entropy::from_id(42), Err(Error::Unsupported(_))));
        assert!(matches!(
            Entropy::from_name("HUFFMAN"),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn every_codec_round_trips() {
        let data = b"an entropy coder must invert itself exactly, always ".repeat(12);
        for e in ALL {
            let mut w = BitWriter::new(Vec::new());
            encode_block(e, &mut w, &data).unwrap();
            let (bytes, _) = w.finish().unwrap();

            let mut r = BitReader::new(&bytes[..]);
            let mut out = vec![0u8; data.len()];
            decode_block(e, &mut r, &mut out).unwrap();
            assert_eq!(out, data, "codec {} failed", e.name());
        }
    }

    #[test]
    fn every_codec_round_trips_empty() {
        for e in ALL {
            let mut w = BitWriter::new(Vec::new());
            encode_block(e, &mut w, &[]).unwrap();
            let (bytes, _) = w.finish().unwrap();

            let mut r = BitReader::new(&bytes[..]);
            let mut out = [0u8; 0];
            decode_block(e, &mut r, &mut out).unwrap();
        }
    }
}
