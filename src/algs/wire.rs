//! Fixed little-endian wire records for the ghost exchange.
//!
//! All multi-byte integers and floats in these structs are **little-endian** on the
//! wire. They are stored pre-LE with `.to_le()` and decoded with `.from_le()`;
//! floats travel as their IEEE-754 bit pattern.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::afc_error::AfcError;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode a received byte buffer into records. The buffer need not be aligned.
pub fn decode_records<T: Pod>(peer: usize, bytes: &[u8], expected: usize) -> Result<Vec<T>, AfcError> {
    expect_exact_len(peer, bytes.len(), expected * size_of::<T>())?;
    Ok(bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect())
}

pub fn expect_exact_len(peer: usize, actual: usize, expected: usize) -> Result<(), AfcError> {
    if actual == expected {
        Ok(())
    } else {
        Err(AfcError::GhostMessageSize {
            peer,
            expected,
            actual,
        })
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following records
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A global node id carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireNode {
    pub id_le: u64,
}
impl WireNode {
    pub fn of(id: u64) -> Self {
        Self { id_le: id.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.id_le)
    }
}

/// A directed node pair `(from, to)` by global ids.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WirePair {
    pub from_le: u64,
    pub to_le: u64,
}
impl WirePair {
    pub fn new(from: u64, to: u64) -> Self {
        Self {
            from_le: from.to_le(),
            to_le: to.to_le(),
        }
    }
    pub fn from(&self) -> u64 {
        u64::from_le(self.from_le)
    }
    pub fn to(&self) -> u64 {
        u64::from_le(self.to_le)
    }
}

/// A real value (nodal unknown or `K` entry).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireReal {
    pub bits_le: u64,
}
impl WireReal {
    pub fn of(v: f64) -> Self {
        Self {
            bits_le: v.to_bits().to_le(),
        }
    }
    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }
}

/// A pair occurrence count.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireValence {
    pub n_le: u32,
}
impl WireValence {
    pub fn of(n: u32) -> Self {
        Self { n_le: n.to_le() }
    }
    pub fn get(&self) -> u32 {
        u32::from_le(self.n_le)
    }
}

/// Conversion between a payload value and its wire record.
pub trait WireValue: Copy {
    type Wire: Pod;
    fn to_wire(self) -> Self::Wire;
    fn from_wire(w: Self::Wire) -> Self;
}

impl WireValue for f64 {
    type Wire = WireReal;
    fn to_wire(self) -> WireReal {
        WireReal::of(self)
    }
    fn from_wire(w: WireReal) -> f64 {
        w.get()
    }
}

impl WireValue for u32 {
    type Wire = WireValence;
    fn to_wire(self) -> WireValence {
        WireValence::of(self)
    }
    fn from_wire(w: WireValence) -> u32 {
        w.get()
    }
}

// Layout guards
const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireNode>(), 8);
const_assert_eq!(size_of::<WirePair>(), 16);
const_assert_eq!(size_of::<WireReal>(), 8);
const_assert_eq!(size_of::<WireValence>(), 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_survives_unaligned_decode() {
        let vals = [WireReal::of(-0.25), WireReal::of(f64::MAX)];
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(cast_slice(&vals));
        let back: Vec<WireReal> = decode_records(3, &bytes[1..], 2).unwrap();
        assert_eq!(back[0].get(), -0.25);
        assert_eq!(back[1].get(), f64::MAX);
    }

    #[test]
    fn length_mismatch_names_peer() {
        let bytes = [0u8; 12];
        let err = decode_records::<WirePair>(2, &bytes, 1).unwrap_err();
        assert_eq!(
            err,
            AfcError::GhostMessageSize {
                peer: 2,
                expected: 16,
                actual: 12
            }
        );
    }

    #[test]
    fn pair_accessors() {
        let p = WirePair::new(7, 11);
        assert_eq!((p.from(), p.to()), (7, 11));
    }
}
