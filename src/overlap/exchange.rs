//! Blocking point-to-point exchange on top of [`Communicator`].
//!
//! Every exchange visits its peers in ascending rank order. With each peer, the
//! lower rank sends first and then receives; the higher rank receives first and
//! then sends. This keeps blocking backends deadlock-free without any
//! collective operation. The relation "I send to `p`" must be symmetric with
//! "`p` receives from me"; the manifests guarantee this.

use std::collections::{BTreeMap, BTreeSet};

use bytemuck::Pod;

use crate::afc_error::AfcError;
use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, WireReal, WireValue, cast_slice, decode_records};
use crate::data::nodal_values::NodalValues;
use crate::overlap::delta::{CopyDelta, Delta};
use crate::overlap::manifest::GhostManifest;

/// Send `outgoing[p]` to every `p`, receive `incoming_counts[p]` records from every `p`.
pub fn exchange_records<C, W>(
    comm: &C,
    tag: CommTag,
    outgoing: &BTreeMap<usize, Vec<W>>,
    incoming_counts: &BTreeMap<usize, usize>,
) -> Result<BTreeMap<usize, Vec<W>>, AfcError>
where
    C: Communicator,
    W: Pod,
{
    let me = comm.rank();
    let peers: BTreeSet<usize> = outgoing
        .keys()
        .chain(incoming_counts.keys())
        .copied()
        .collect();
    if let Some(&bad) = peers.iter().find(|&&p| p == me || p >= comm.size()) {
        return Err(AfcError::UnexpectedPeer(bad));
    }

    let mut received = BTreeMap::new();
    let mut pending_sends = Vec::with_capacity(outgoing.len());
    for &peer in &peers {
        let send = |sends: &mut Vec<C::SendHandle>| {
            if let Some(records) = outgoing.get(&peer) {
                log::trace!("rank {me} -> {peer}: {} records (tag {:#x})", records.len(), tag.as_u16());
                sends.push(comm.isend(peer, tag.as_u16(), cast_slice(records)));
            }
        };
        let recv = |received: &mut BTreeMap<usize, Vec<W>>| -> Result<(), AfcError> {
            if let Some(&count) = incoming_counts.get(&peer) {
                let mut buf = vec![0u8; count * std::mem::size_of::<W>()];
                let data = comm
                    .irecv(peer, tag.as_u16(), &mut buf)
                    .wait()
                    .ok_or(AfcError::MissingGhostMessage {
                        peer,
                        tag: tag.as_u16(),
                    })?;
                received.insert(peer, decode_records::<W>(peer, &data, count)?);
            }
            Ok(())
        };
        if me < peer {
            send(&mut pending_sends);
            recv(&mut received)?;
        } else {
            recv(&mut received)?;
            send(&mut pending_sends);
        }
    }

    // always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }
    Ok(received)
}

/// Deliver `outgoing[p]` to every `p` when the receivers do not know the
/// sizes in advance: counts go to every other rank first.
pub fn push_records<C, W>(
    comm: &C,
    sizes_tag: CommTag,
    data_tag: CommTag,
    outgoing: &BTreeMap<usize, Vec<W>>,
) -> Result<BTreeMap<usize, Vec<W>>, AfcError>
where
    C: Communicator,
    W: Pod,
{
    let me = comm.rank();
    let others: Vec<usize> = (0..comm.size()).filter(|&p| p != me).collect();
    let counts_out: BTreeMap<usize, Vec<WireCount>> = others
        .iter()
        .map(|&p| (p, vec![WireCount::new(outgoing.get(&p).map_or(0, Vec::len))]))
        .collect();
    let one_each: BTreeMap<usize, usize> = others.iter().map(|&p| (p, 1)).collect();
    let counts_in = exchange_records(comm, sizes_tag, &counts_out, &one_each)?;

    let incoming_counts: BTreeMap<usize, usize> = counts_in
        .into_iter()
        .map(|(p, c)| (p, c.first().map_or(0, WireCount::get)))
        .filter(|&(_, n)| n > 0)
        .collect();
    let nonempty: BTreeMap<usize, Vec<W>> = outgoing
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(&p, v)| (p, v.clone()))
        .collect();
    exchange_records(comm, data_tag, &nonempty, &incoming_counts)
}

/// Maximum of `value` over all ranks.
pub fn all_reduce_max<C: Communicator>(comm: &C, tag: CommTag, value: f64) -> Result<f64, AfcError> {
    let me = comm.rank();
    let others: Vec<usize> = (0..comm.size()).filter(|&p| p != me).collect();
    let out: BTreeMap<usize, Vec<WireReal>> =
        others.iter().map(|&p| (p, vec![WireReal::of(value)])).collect();
    let counts: BTreeMap<usize, usize> = others.iter().map(|&p| (p, 1)).collect();
    let received = exchange_records(comm, tag, &out, &counts)?;
    Ok(received
        .values()
        .flatten()
        .map(WireReal::get)
        .fold(value, f64::max))
}

/// Storage addressed by `(sequential node, connection index)`.
pub trait PairStore<V> {
    fn pair_value(&self, seq: usize, index: usize) -> V;
    fn pair_value_mut(&mut self, seq: usize, index: usize) -> &mut V;
}

impl PairStore<f64> for crate::data::transport_matrix::TransportMatrix {
    fn pair_value(&self, seq: usize, index: usize) -> f64 {
        self.get(seq, index)
    }
    fn pair_value_mut(&mut self, seq: usize, index: usize) -> &mut f64 {
        self.get_mut(seq, index)
    }
}

impl PairStore<u32> for crate::data::valence::PairValence {
    fn pair_value(&self, seq: usize, index: usize) -> u32 {
        self.get(seq, index)
    }
    fn pair_value_mut(&mut self, seq: usize, index: usize) -> &mut u32 {
        self.get_mut(seq, index)
    }
}

/// Send this rank's values for the manifest's outgoing pairs and fuse the
/// received values with `D`.
pub fn exchange_pair_entries<D, V, S, C>(
    comm: &C,
    tag: CommTag,
    manifest: &GhostManifest,
    store: &mut S,
) -> Result<(), AfcError>
where
    D: Delta<V, Part = V>,
    V: WireValue,
    S: PairStore<V>,
    C: Communicator,
{
    let outgoing: BTreeMap<usize, Vec<V::Wire>> = manifest
        .pairs_to_send()
        .iter()
        .map(|(&p, pairs)| {
            let recs = pairs
                .iter()
                .map(|&(s, idx)| D::restrict(&store.pair_value(s, idx)).to_wire())
                .collect();
            (p, recs)
        })
        .collect();
    let counts: BTreeMap<usize, usize> = manifest
        .pairs_to_receive()
        .iter()
        .map(|(&p, v)| (p, v.len()))
        .collect();
    let incoming = exchange_records(comm, tag, &outgoing, &counts)?;
    for (peer, recs) in incoming {
        let targets = manifest
            .pairs_to_receive()
            .get(&peer)
            .ok_or(AfcError::UnexpectedPeer(peer))?;
        for (&(s, idx), rec) in targets.iter().zip(recs) {
            D::fuse(store.pair_value_mut(s, idx), V::from_wire(rec));
        }
    }
    Ok(())
}

/// Replace ghost nodal values with their owners' values.
pub fn exchange_nodal_values<C: Communicator>(
    comm: &C,
    tag: CommTag,
    manifest: &GhostManifest,
    values: &mut NodalValues,
) -> Result<(), AfcError> {
    let outgoing: BTreeMap<usize, Vec<WireReal>> = manifest
        .nodes_to_send()
        .iter()
        .map(|(&p, nodes)| (p, nodes.iter().map(|&s| WireReal::of(values.get(s))).collect()))
        .collect();
    let counts: BTreeMap<usize, usize> = manifest
        .nodes_to_receive()
        .iter()
        .map(|(&p, v)| (p, v.len()))
        .collect();
    let incoming = exchange_records(comm, tag, &outgoing, &counts)?;
    for (peer, recs) in incoming {
        let targets = manifest
            .nodes_to_receive()
            .get(&peer)
            .ok_or(AfcError::UnexpectedPeer(peer))?;
        for (&s, rec) in targets.iter().zip(recs) {
            let mut v = values.get(s);
            CopyDelta::fuse(&mut v, rec.get());
            values.set(s, v);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};
    use crate::algs::wire::WireNode;

    #[test]
    fn push_delivers_to_unaware_receivers() {
        let world = LocalComm::world(3);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mut out = BTreeMap::new();
                        // every rank asks the next one for its own rank id
                        let next = (comm.rank() + 1) % comm.size();
                        out.insert(next, vec![WireNode::of(comm.rank() as u64)]);
                        push_records(comm, CommTag::new(1), CommTag::new(2), &out).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (rank, got) in results.iter().enumerate() {
            let prev = (rank + 2) % 3;
            assert_eq!(got.len(), 1);
            assert_eq!(got[&prev][0].get(), prev as u64);
        }
    }

    #[test]
    fn max_over_ranks() {
        let world = LocalComm::world(4);
        let maxima: Vec<f64> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .map(|comm| s.spawn(move || all_reduce_max(comm, CommTag::new(9), comm.rank() as f64 * 1.5).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(maxima, vec![4.5; 4]);
    }

    #[test]
    fn serial_exchange_is_a_no_op() {
        let v = all_reduce_max(&NoComm, CommTag::new(1), 2.5).unwrap();
        assert_eq!(v, 2.5);
    }

    #[test]
    fn self_peer_is_rejected() {
        let out: BTreeMap<usize, Vec<WireNode>> = [(0, vec![WireNode::of(1)])].into();
        let err = exchange_records(&NoComm, CommTag::new(1), &out, &BTreeMap::new()).unwrap_err();
        assert_eq!(err, AfcError::UnexpectedPeer(0));
    }
}
