//! Ghost send/receive manifests.
//!
//! For every ghost cell owned by rank `p`, this rank needs `p`'s nodal values
//! at the cell's nodes and `p`'s partial `K` sums for the cell's node pairs.
//! The requests are pushed to the owners once per topology change. Afterwards
//! both sides hold the same lists in the same order, in sequential ids, so
//! recomputations move only values.

use std::collections::{BTreeMap, BTreeSet};

use crate::afc_error::AfcError;
use crate::algs::communicator::{Communicator, GhostCommTags};
use crate::algs::wire::{WireNode, WirePair};
use crate::overlap::exchange::push_records;
use crate::topology::cell::LocalMesh;
use crate::topology::connected_nodes::{ConnectedNodes, GlobalNodeId, SequentialId};

/// `(sequential node, connection index)`.
pub type PairSlot = (SequentialId, usize);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GhostManifest {
    nodes_to_send: BTreeMap<usize, Vec<SequentialId>>,
    nodes_to_receive: BTreeMap<usize, Vec<SequentialId>>,
    pairs_to_send: BTreeMap<usize, Vec<PairSlot>>,
    pairs_to_receive: BTreeMap<usize, Vec<PairSlot>>,
}

impl GhostManifest {
    /// Manifest of a rank without ghosts (or a serial run).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the manifests from the ghost cells of `mesh`.
    pub fn build<C: Communicator>(
        mesh: &LocalMesh,
        blocks: Option<&BTreeSet<u32>>,
        connections: &ConnectedNodes,
        comm: &C,
        tags: GhostCommTags,
    ) -> Result<Self, AfcError> {
        let mut node_requests: BTreeMap<usize, BTreeSet<GlobalNodeId>> = BTreeMap::new();
        let mut pair_requests: BTreeMap<usize, BTreeSet<(GlobalNodeId, GlobalNodeId)>> =
            BTreeMap::new();
        for cell in mesh.ghost_cells(blocks) {
            let nodes = node_requests.entry(cell.owner).or_default();
            let pairs = pair_requests.entry(cell.owner).or_default();
            for &gi in &cell.nodes {
                nodes.insert(gi);
                for &gj in &cell.nodes {
                    pairs.insert((gi, gj));
                }
            }
        }
        if comm.size() == 1 {
            if let Some(&owner) = node_requests.keys().next() {
                return Err(AfcError::UnexpectedPeer(owner));
            }
            return Ok(Self::empty());
        }

        let node_wire: BTreeMap<usize, Vec<WireNode>> = node_requests
            .iter()
            .map(|(&p, set)| (p, set.iter().map(|&g| WireNode::of(g)).collect()))
            .collect();
        let pair_wire: BTreeMap<usize, Vec<WirePair>> = pair_requests
            .iter()
            .map(|(&p, set)| (p, set.iter().map(|&(a, b)| WirePair::new(a, b)).collect()))
            .collect();
        let node_asks = push_records(comm, tags.sizes, tags.node_requests, &node_wire)?;
        let pair_asks = push_records(comm, tags.sizes, tags.pair_requests, &pair_wire)?;

        let slot = |a: GlobalNodeId, b: GlobalNodeId| -> Result<PairSlot, AfcError> {
            Ok((
                connections.sequential_id(a)?,
                connections.index_of_global_connection(a, b)?,
            ))
        };

        let mut manifest = Self::empty();
        for (p, set) in node_requests {
            let seqs = set
                .into_iter()
                .map(|g| connections.sequential_id(g))
                .collect::<Result<_, _>>()?;
            manifest.nodes_to_receive.insert(p, seqs);
        }
        for (p, set) in pair_requests {
            let slots = set
                .into_iter()
                .map(|(a, b)| slot(a, b))
                .collect::<Result<_, _>>()?;
            manifest.pairs_to_receive.insert(p, slots);
        }
        for (p, recs) in node_asks {
            let seqs = recs
                .iter()
                .map(|r| connections.sequential_id(r.get()))
                .collect::<Result<_, _>>()?;
            manifest.nodes_to_send.insert(p, seqs);
        }
        for (p, recs) in pair_asks {
            let slots = recs
                .iter()
                .map(|r| slot(r.from(), r.to()))
                .collect::<Result<_, _>>()?;
            manifest.pairs_to_send.insert(p, slots);
        }

        log::debug!(
            "rank {}: ghost manifest, receive nodes {:?}, send nodes {:?}",
            comm.rank(),
            manifest.nodes_to_receive.iter().map(|(p, v)| (*p, v.len())).collect::<Vec<_>>(),
            manifest.nodes_to_send.iter().map(|(p, v)| (*p, v.len())).collect::<Vec<_>>(),
        );
        Ok(manifest)
    }

    pub fn nodes_to_send(&self) -> &BTreeMap<usize, Vec<SequentialId>> {
        &self.nodes_to_send
    }

    pub fn nodes_to_receive(&self) -> &BTreeMap<usize, Vec<SequentialId>> {
        &self.nodes_to_receive
    }

    pub fn pairs_to_send(&self) -> &BTreeMap<usize, Vec<PairSlot>> {
        &self.pairs_to_send
    }

    pub fn pairs_to_receive(&self) -> &BTreeMap<usize, Vec<PairSlot>> {
        &self.pairs_to_receive
    }

    /// Ranks this rank talks to.
    pub fn peers(&self) -> BTreeSet<usize> {
        self.nodes_to_send
            .keys()
            .chain(self.nodes_to_receive.keys())
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes_to_receive.is_empty() && self.nodes_to_send.is_empty()
    }
}
