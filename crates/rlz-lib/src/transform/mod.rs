//! Reversible byte transforms and the chain/factory machinery.

pub mod rlt;
pub mod rolz;
pub mod zrlt;

use crate::error::{Error, Result};

/// A reversible byte transform. `forward` and `inverse` return the number
/// of source bytes consumed and destination bytes produced; the caller
/// allocates `dst` (`max_encoded_len` bounds the forward direction).
/// Transforms may refuse to expand data by returning `BufferTooSmall`.
pub trait Transform {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)>;
    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)>;
    fn max_encoded_len(&self, src_len: usize) -> usize;
}

/// Pass-through transform (id 0, also the empty chain).
pub struct NoneTransform;

impl Transform for NoneTransform {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if dst.len() < src.len() {
            return Err(Error::BufferTooSmall {
                size: dst.len(),
                required: src.len(),
            });
        }
        dst[..src.len()].copy_from_slice(src);
        Ok((src.len(), src.len()))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        self.forward(src, dst)
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len
    }
}

/// The closed set of built-in transforms, tagged by stream id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    None,
    Rolz,
    Rolzx,
    Rlt,
    Zrlt,
}

impl TransformKind {
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(TransformKind::None),
            1 => Ok(TransformKind::Rolz),
            2 => Ok(TransformKind::Rolzx),
            3 => Ok(TransformKind::Rlt),
            4 => Ok(TransformKind::Zrlt),
            _ => Err(Error::Unsupported(format!("unknown transform id: {id}"))),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            TransformKind::None => 0,
            TransformKind::Rolz => 1,
            TransformKind::Rolzx => 2,
            TransformKind::Rlt => 3,
            TransformKind::Zrlt => 4,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_uppercase().as_str() {
            "NONE" => Ok(TransformKind::None),
            "ROLZ" => Ok(TransformKind::Rolz),
            "ROLZX" => Ok(TransformKind::Rolzx),
            "RLT" => Ok(TransformKind::Rlt),
            "ZRLT" => Ok(TransformKind::Zrlt),
            "LZ4" | "SNAPPY" | "BWT" | "BWTS" | "MTFT" | "TEXT" => Err(Error::Unsupported(
                format!("transform '{name}' is not built into this distribution"),
            )),
            _ => Err(Error::Unsupported(format!("unknown transform: '{name}'"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransformKind::None => "NONE",
            TransformKind::Rolz => "ROLZ",
            TransformKind::Rolzx => "ROLZX",
            TransformKind::Rlt => "RLT",
            TransformKind::Zrlt => "ZRLT",
        }
    }

    fn instantiate(self) -> Result<Box<dyn Transform>> {
        match self {
            TransformKind::None => Ok(Box::new(NoneTransform)),
            TransformKind::Rolz => Ok(Box::new(rolz::RolzCodec::new(false)?)),
            TransformKind::Rolzx => Ok(Box::new(rolz::RolzCodec::new(true)?)),
            TransformKind::Rlt => Ok(Box::new(rlt::RltCodec::new())),
            TransformKind::Zrlt => Ok(Box::new(zrlt::ZrltCodec::new())),
        }
    }
}

/// Up to four transform stages applied in order on the forward path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformChain {
    stages: Vec<TransformKind>,
}

pub const MAX_CHAIN_STAGES: usize = 4;

impl TransformChain {
    pub fn new(stages: Vec<TransformKind>) -> Result<Self> {
        let stages: Vec<TransformKind> = stages
            .into_iter()
            .filter(|&s| s != TransformKind::None)
            .collect();
        if stages.len() > MAX_CHAIN_STAGES {
            return Err(Error::InvalidParameter(format!(
                "transform chain has {} stages (max {MAX_CHAIN_STAGES})",
                stages.len()
            )));
        }
        Ok(Self { stages })
    }

    /// Parse names joined by '+', e.g. "RLT+ROLZ".
    pub fn from_name(name: &str) -> Result<Self> {
        let stages = name
            .split('+')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TransformKind::from_name)
            .collect::<Result<Vec<_>>>()?;
        Self::new(stages)
    }

    pub fn name(&self) -> String {
        if self.stages.is_empty() {
            return "NONE".to_string();
        }
        self.stages
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Pack the chain into the 32-bit header field, stage 0 in the most
    /// significant byte. Unused stages hold the NONE id.
    pub fn packed_id(&self) -> u32 {
        let mut id = 0u32;
        for (i, stage) in self.stages.iter().enumerate() {
            id |= u32::from(stage.id()) << (24 - 8 * i);
        }
        id
    }

    pub fn from_packed_id(id: u32) -> Result<Self> {
        let mut stages = Vec::new();
        for i in 0..MAX_CHAIN_STAGES {
            let byte = ((id >> (24 - 8 * i)) & 0xFF) as u8;
            stages.push(TransformKind::from_id(byte)?);
        }
        Self::new(stages)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Upper bound on the forward output size, composed stage by stage.
    pub fn max_encoded_len(&self, src_len: usize) -> Result<usize> {
        let mut len = src_len;
        for stage in &self.stages {
            len = stage.instantiate()?.max_encoded_len(len);
        }
        Ok(len)
    }

    /// Apply all stages in order. Fails with `BufferTooSmall` when a stage
    /// cannot fit its output, which callers treat as "incompressible".
    pub fn forward(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut cur = data.to_vec();
        for stage in &self.stages {
            let mut t = stage.instantiate()?;
            let mut dst = vec![0u8; t.max_encoded_len(cur.len())];
            let (consumed, produced) = t.forward(&cur, &mut dst)?;
            if consumed != cur.len() {
                return Err(Error::BufferTooSmall {
                    size: dst.len(),
                    required: cur.len(),
                });
            }
            dst.truncate(produced);
            cur = dst;
        }
        Ok(cur)
    }

    /// Apply all stages in reverse. `max_out` bounds every intermediate
    /// output (the container's block size); the final output length must be
    /// exactly `orig_len`.
    pub fn inverse(&self, data: &[u8], orig_len: usize, max_out: usize) -> Result<Vec<u8>> {
        let mut cur = data.to_vec();
        for stage in self.stages.iter().rev() {
            let mut t = stage.instantiate()?;
            let mut dst = vec![0u8; max_out.max(orig_len)];
            let (consumed, produced) = t.inverse(&cur, &mut dst)?;
            if consumed != cur.len() {
                return Err(Error::InvalidData(format!(
                    "transform {} consumed {consumed} of {} input bytes",
                    stage.name(),
                    cur.len()
                )));
            }
            dst.truncate(produced);
            cur = dst;
        }
        if cur.len() != orig_len {
            return Err(Error::InvalidData(format!(
                "detransformed size {} does not match declared size {orig_len}",
                cur.len()
            )));
        }
        Ok(cur)
    }
}

/// Append a run length as LEB128 (7-bit groups, low group first).
pub(crate) fn write_varint(dst: &mut [u8], mut idx: usize, mut value: usize) -> Result<usize> {
    loop {
        if idx >= dst.len() {
            return Err(Error::BufferTooSmall {
                size: dst.len(),
                required: idx + 1,
            });
        }
        if value >= 0x80 {
            dst[idx] = ((value & 0x7F) | 0x80) as u8;
            value >>= 7;
        } else {
            dst[idx] = value as u8;
            return Ok(idx + 1);
        }
        idx += 1;
    }
}

/// Read a LEB128 run length; returns (value, next index).
pub(crate) fn read_varint(src: &[u8], mut idx: usize) -> Result<(usize, usize)> {
    let mut value = 0usize;
    let mut shift = 0u32;
    loop {
        let byte = *src
            .get(idx)
            .ok_or_else(|| Error::InvalidData("truncated run length".into()))?;
        idx += 1;
        value |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, idx));
        }
        shift += 7;
        if shift > 63 {
            return Err(Error::InvalidData("run length overflow".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_name_roundtrip() {
        let chain = TransformChain::from_name("RLT+ROLZ").unwrap();
        assert_eq!(chain.name(), "RLT+ROLZ");
        let packed = chain.packed_id();
        assert_eq!(TransformChain::from_packed_id(packed).unwrap(), chain);
    }

    #[test]
    fn none_chain_is_empty() {
        let chain = TransformChain::from_name("NONE").unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.packed_id(), 0);
    }

    #[test]
    fn reserved_transforms_are_rejected() {
        for name in ["LZ4", "SNAPPY", "BWT"] {
            assert!(matches!(
                TransformKind::from_name(name),
                Err(Error::Unsupported(_))
            ));
        }
        assert!(matches!(TransformKind::from_id(99), Err(Error::Unsupported(_))));
    }

    #[test]
    fn too_many_stages_rejected() {
        assert!(TransformChain::from_name("RLT+RLT+RLT+RLT+RLT").is_err());
    }

    #[test]
    fn empty_chain_forward_is_identity() {
        let chain = TransformChain::from_name("NONE").unwrap();
        let data = b"identity".to_vec();
        let out = chain.forward(&data).unwrap();
        assert_eq!(out, data);
        let back = chain.inverse(&out, data.len(), data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn two_stage_chain_roundtrip() {
        let chain = TransformChain::from_name("ZRLT+RLT").unwrap();
        let mut data = vec![0u8; 500];
        data.extend_from_slice(b"payload");
        data.extend(std::iter::repeat(7u8).take(300));
        let fwd = chain.forward(&data).unwrap();
        let back = chain.inverse(&fwd, data.len(), 4096).unwrap();
        assert_eq!(back, data);
    }
}
