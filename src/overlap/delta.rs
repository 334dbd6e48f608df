//! Delta trait: rules for fusing ghost-exchanged values into local storage.
//!
//! Nodal unknowns are owned by exactly one rank, so a received value replaces
//! the local one ([`CopyDelta`]). `K` entries and pair valences are partial sums
//! over each rank's owned cells, so received values are added ([`AddDelta`]).

/// *Delta* encapsulates restriction & fusion for an exchanged value `V`.
pub trait Delta<V>: Sized {
    /// What travels on the wire for one value (often identical to `V`).
    type Part: Send;

    /// Extract the part of `v` that is sent to a peer.
    fn restrict(v: &V) -> Self::Part;

    /// Merge an incoming fragment into the local value.
    fn fuse(local: &mut V, incoming: Self::Part);
}

/// Owner value overwrites the local one.
#[derive(Copy, Clone, Debug)]
pub struct CopyDelta;

impl<V: Clone + Send> Delta<V> for CopyDelta {
    type Part = V;
    #[inline]
    fn restrict(v: &V) -> V {
        v.clone()
    }
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        *local = incoming;
    }
}

/// Partial sums accumulate.
#[derive(Copy, Clone, Debug)]
pub struct AddDelta;

impl<V> Delta<V> for AddDelta
where
    V: std::ops::AddAssign + Copy + Send,
{
    type Part = V;
    #[inline]
    fn restrict(v: &V) -> V {
        *v
    }
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        *local += incoming;
    }
}
