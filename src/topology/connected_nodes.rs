//! Connected-node registry: sparse global ids ↔ dense sequential ids, plus
//! directed adjacency.
//!
//! The registry is built in three typed stages so that usage-order mistakes do
//! not compile:
//!
//! 1. [`NodeSetBuilder`] collects global node ids (idempotent).
//! 2. [`NodeSetBuilder::finalize_nodes`] assigns sequential ids in ascending
//!    global order and returns a [`ConnectionBuilder`], which collects directed
//!    `(from, to)` connections (idempotent, uni-directional).
//! 3. [`ConnectionBuilder::finalize_connections`] freezes everything into an
//!    immutable [`ConnectedNodes`], which is cheap to share behind an `Arc`.
//!
//! The global → sequential lookup is a dense table of 4-byte slots spanning
//! `min_global..=max_global`; this trades memory for O(1) lookups and is the
//! reason [`ConnectedNodes::size_sequential`] is exposed. A span that cannot be
//! allocated is reported by [`NodeSetBuilder::finalize_nodes`].

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::afc_error::AfcError;

/// Sparse, mesh-assigned node identifier.
pub type GlobalNodeId = u64;
/// Dense index in `[0, num_nodes)`.
pub type SequentialId = usize;

/// Stage 1: collects global node ids.
#[derive(Clone, Debug, Default)]
pub struct NodeSetBuilder {
    nodes: BTreeSet<GlobalNodeId>,
}

impl NodeSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. Re-adding a known id is a no-op.
    #[inline]
    pub fn add_global_node(&mut self, id: GlobalNodeId) {
        self.nodes.insert(id);
    }

    /// Number of distinct ids seen so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Freeze the node set and assign sequential ids (ascending global order).
    pub fn finalize_nodes(self) -> Result<ConnectionBuilder, AfcError> {
        let numbering = NodeNumbering::from_sorted(self.nodes.into_iter().collect())?;
        let pending = vec![BTreeSet::new(); numbering.num_nodes()];
        Ok(ConnectionBuilder { numbering, pending })
    }
}

/// Lookup slot that maps to no node.
const VACANT: u32 = u32::MAX;

/// Bytes per lookup slot.
pub const LOOKUP_SLOT_BYTES: usize = std::mem::size_of::<u32>();

/// Bijection between global and sequential ids.
#[derive(Clone, Debug, Default)]
pub struct NodeNumbering {
    /// `sequential -> global`, strictly ascending.
    global_ids: Vec<GlobalNodeId>,
    min_global: GlobalNodeId,
    /// `global - min_global -> sequential`, [`VACANT`] for gaps.
    lookup: Vec<u32>,
}

impl NodeNumbering {
    fn from_sorted(global_ids: Vec<GlobalNodeId>) -> Result<Self, AfcError> {
        let (lo, hi) = match (global_ids.first(), global_ids.last()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => return Ok(Self::default()),
        };
        let too_large = || AfcError::RegistrySpanTooLarge { min: lo, max: hi };
        // sequential ids must stay below the sentinel
        if global_ids.len() >= VACANT as usize {
            return Err(too_large());
        }
        let span = (hi - lo)
            .checked_add(1)
            .and_then(|s| usize::try_from(s).ok())
            .filter(|&s| s.checked_mul(LOOKUP_SLOT_BYTES).is_some_and(|b| b <= isize::MAX as usize))
            .ok_or_else(too_large)?;
        let mut lookup = Vec::new();
        lookup.try_reserve_exact(span).map_err(|_| too_large())?;
        lookup.resize(span, VACANT);
        for (seq, &g) in global_ids.iter().enumerate() {
            lookup[(g - lo) as usize] = seq as u32;
        }
        Ok(Self {
            global_ids,
            min_global: lo,
            lookup,
        })
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.global_ids.len()
    }

    /// Span of the dense lookup table, `max_global - min_global + 1` (0 if empty).
    #[inline]
    pub fn size_sequential(&self) -> usize {
        self.lookup.len()
    }

    #[inline]
    pub fn global_id(&self, seq: SequentialId) -> Result<GlobalNodeId, AfcError> {
        self.global_ids
            .get(seq)
            .copied()
            .ok_or(AfcError::UnknownSequentialNode(seq))
    }

    #[inline]
    pub fn sequential_id(&self, global: GlobalNodeId) -> Result<SequentialId, AfcError> {
        global
            .checked_sub(self.min_global)
            .and_then(|off| usize::try_from(off).ok())
            .and_then(|off| self.lookup.get(off).copied())
            .filter(|&slot| slot != VACANT)
            .map(|slot| slot as SequentialId)
            .ok_or(AfcError::UnknownGlobalNode(global))
    }

    #[inline]
    pub fn contains(&self, global: GlobalNodeId) -> bool {
        self.sequential_id(global).is_ok()
    }

    /// All global ids in sequential order.
    #[inline]
    pub fn global_ids(&self) -> &[GlobalNodeId] {
        &self.global_ids
    }
}

/// Stage 2: node numbering is fixed, directed connections are collected.
#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    numbering: NodeNumbering,
    pending: Vec<BTreeSet<SequentialId>>,
}

impl ConnectionBuilder {
    pub fn numbering(&self) -> &NodeNumbering {
        &self.numbering
    }

    pub fn num_nodes(&self) -> usize {
        self.numbering.num_nodes()
    }

    pub fn global_id(&self, seq: SequentialId) -> Result<GlobalNodeId, AfcError> {
        self.numbering.global_id(seq)
    }

    pub fn sequential_id(&self, global: GlobalNodeId) -> Result<SequentialId, AfcError> {
        self.numbering.sequential_id(global)
    }

    /// Register the directed connection `from -> to`. Both ids must be registered.
    pub fn add_connection(&mut self, from: GlobalNodeId, to: GlobalNodeId) -> Result<(), AfcError> {
        let s_from = self.numbering.sequential_id(from)?;
        let s_to = self.numbering.sequential_id(to)?;
        self.pending[s_from].insert(s_to);
        Ok(())
    }

    /// Freeze the adjacency.
    pub fn finalize_connections(self) -> ConnectedNodes {
        let numbering = self.numbering;
        let sequential_connections: Vec<Vec<SequentialId>> = self
            .pending
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect();
        // Sequential order follows global order, so the global lists come out sorted too.
        let global_connections = sequential_connections
            .iter()
            .map(|con| con.iter().map(|&s| numbering.global_ids[s]).collect_vec())
            .collect();
        ConnectedNodes {
            numbering,
            sequential_connections,
            global_connections,
        }
    }
}

/// Stage 3: immutable registry with adjacency, freely shareable.
#[derive(Clone, Debug, Default)]
pub struct ConnectedNodes {
    numbering: NodeNumbering,
    sequential_connections: Vec<Vec<SequentialId>>,
    global_connections: Vec<Vec<GlobalNodeId>>,
}

impl ConnectedNodes {
    pub fn numbering(&self) -> &NodeNumbering {
        &self.numbering
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.numbering.num_nodes()
    }

    #[inline]
    pub fn size_sequential(&self) -> usize {
        self.numbering.size_sequential()
    }

    #[inline]
    pub fn global_id(&self, seq: SequentialId) -> Result<GlobalNodeId, AfcError> {
        self.numbering.global_id(seq)
    }

    #[inline]
    pub fn sequential_id(&self, global: GlobalNodeId) -> Result<SequentialId, AfcError> {
        self.numbering.sequential_id(global)
    }

    /// Total number of directed connections.
    pub fn num_connections(&self) -> usize {
        self.sequential_connections.iter().map(Vec::len).sum()
    }

    /// Sorted sequential neighbours of sequential node `seq`.
    #[inline]
    pub fn sequential_connections_to_sequential_id(
        &self,
        seq: SequentialId,
    ) -> Result<&[SequentialId], AfcError> {
        self.sequential_connections
            .get(seq)
            .map(Vec::as_slice)
            .ok_or(AfcError::UnknownSequentialNode(seq))
    }

    /// Unchecked row access for loops that already walk `0..num_nodes`.
    #[inline]
    pub(crate) fn row(&self, seq: SequentialId) -> &[SequentialId] {
        &self.sequential_connections[seq]
    }

    /// Sorted global neighbours of sequential node `seq`.
    #[inline]
    pub fn global_connections_to_sequential_id(
        &self,
        seq: SequentialId,
    ) -> Result<&[GlobalNodeId], AfcError> {
        self.global_connections
            .get(seq)
            .map(Vec::as_slice)
            .ok_or(AfcError::UnknownSequentialNode(seq))
    }

    /// Sorted sequential neighbours of global node `global`.
    pub fn sequential_connections_to_global_id(
        &self,
        global: GlobalNodeId,
    ) -> Result<&[SequentialId], AfcError> {
        self.sequential_connections_to_sequential_id(self.sequential_id(global)?)
    }

    /// Sorted global neighbours of global node `global`.
    pub fn global_connections_to_global_id(
        &self,
        global: GlobalNodeId,
    ) -> Result<&[GlobalNodeId], AfcError> {
        self.global_connections_to_sequential_id(self.sequential_id(global)?)
    }

    /// Position of `to` within the neighbour list of `from` (sequential ids).
    pub fn index_of_sequential_connection(
        &self,
        from: SequentialId,
        to: SequentialId,
    ) -> Result<usize, AfcError> {
        self.sequential_connections_to_sequential_id(from)?
            .binary_search(&to)
            .map_err(|_| AfcError::NotConnected {
                from: self.global_id(from).unwrap_or(from as u64),
                to: self.global_id(to).unwrap_or(to as u64),
            })
    }

    /// Position of `to` within the neighbour list of `from` (global ids).
    ///
    /// Identical to the sequential index because both lists share one ordering.
    pub fn index_of_global_connection(
        &self,
        from: GlobalNodeId,
        to: GlobalNodeId,
    ) -> Result<usize, AfcError> {
        self.global_connections_to_global_id(from)?
            .binary_search(&to)
            .map_err(|_| AfcError::NotConnected { from, to })
    }

    /// Iterate `(sequential, neighbours)` rows.
    pub fn rows(&self) -> impl Iterator<Item = (SequentialId, &[SequentialId])> + '_ {
        self.sequential_connections
            .iter()
            .enumerate()
            .map(|(s, con)| (s, con.as_slice()))
    }

    /// Megabytes spent on lookup slots that map to no node.
    pub fn wasted_megabytes(&self) -> f64 {
        ((self.size_sequential() - self.num_nodes()) * LOOKUP_SLOT_BYTES) as f64 / 1_048_576.0
    }
}
