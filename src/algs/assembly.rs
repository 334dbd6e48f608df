//! Thread-parallel assembly of `K` and the nodal unknowns over owned cells.
//!
//! Each worker owns a private [`ThreadAccumulator`] over the shared, frozen
//! registry, so the per-cell loop takes no locks. The accumulators live in an
//! [`Assembler`] for as long as the registry does: every recompute zeroes
//! them, lets each worker integrate one contiguous chunk of cells and joins
//! them in worker order.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::afc_error::AfcError;
use crate::data::nodal_values::NodalValues;
use crate::data::transport_matrix::TransportMatrix;
use crate::physics::TransportProvider;
use crate::topology::cell::MeshCell;
use crate::topology::connected_nodes::ConnectedNodes;

/// Worker-private partial `K` and nodal cache.
#[derive(Clone, Debug)]
pub struct ThreadAccumulator {
    pub kij: TransportMatrix,
    pub nodal: NodalValues,
}

impl ThreadAccumulator {
    pub fn new(connections: Arc<ConnectedNodes>) -> Self {
        let nodal = NodalValues::new(connections.num_nodes());
        Self {
            kij: TransportMatrix::new(connections),
            nodal,
        }
    }

    /// Zero `K` and forget all nodal values.
    pub fn reset(&mut self) {
        self.kij.reset();
        self.nodal.reset();
    }

    /// Add one cell: its `K` contributions and, for nodes not seen yet, their value.
    pub fn execute<P>(&mut self, cell: &MeshCell, provider: &P) -> Result<(), AfcError>
    where
        P: TransportProvider + ?Sized,
    {
        let connections = self.kij.connections().clone();
        for (local, &global) in cell.nodes.iter().enumerate() {
            let seq = connections.sequential_id(global)?;
            self.nodal
                .record_once(seq, || provider.nodal_value(cell, local));
        }
        self.kij.accumulate_cell(cell, provider)
    }

    /// Fold another worker's results into this one.
    pub fn join(&mut self, other: &ThreadAccumulator) -> Result<(), AfcError> {
        self.kij.merge(&other.kij)?;
        self.nodal.merge(&other.nodal)
    }
}

/// Build a worker pool; `num_threads == 0` uses rayon's default size.
pub fn build_pool(num_threads: usize) -> Result<ThreadPool, AfcError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| AfcError::ThreadPool(e.to_string()))
}

/// One accumulator per worker, reused across recomputes.
#[derive(Debug)]
pub struct Assembler {
    workers: Vec<ThreadAccumulator>,
}

impl Assembler {
    /// Accumulators over `connections` for `num_workers` workers (at least one).
    pub fn new(connections: Arc<ConnectedNodes>, num_workers: usize) -> Self {
        let workers = (0..num_workers.max(1))
            .map(|_| ThreadAccumulator::new(connections.clone()))
            .collect();
        Self { workers }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn connections(&self) -> &Arc<ConnectedNodes> {
        self.total().kij.connections()
    }

    /// Zero every worker's accumulator.
    pub fn initialize(&mut self) {
        for worker in &mut self.workers {
            worker.reset();
        }
    }

    /// Reset, integrate `cells` on `pool` and join. The joined result is
    /// returned and stays readable through [`Assembler::total`].
    pub fn assemble<P>(
        &mut self,
        pool: &ThreadPool,
        cells: &[&MeshCell],
        provider: &P,
    ) -> Result<&mut ThreadAccumulator, AfcError>
    where
        P: TransportProvider + ?Sized,
    {
        self.initialize();
        let chunk = cells.len().div_ceil(self.workers.len()).max(1);
        let workers = &mut self.workers;
        pool.install(|| {
            workers
                .par_iter_mut()
                .zip(cells.par_chunks(chunk))
                .try_for_each(|(acc, part)| {
                    for cell in part {
                        acc.execute(cell, provider)?;
                    }
                    Ok::<(), AfcError>(())
                })
        })?;

        let (total, rest) = self
            .workers
            .split_first_mut()
            .ok_or_else(|| AfcError::ThreadPool("assembler has no workers".to_string()))?;
        for part in rest.iter() {
            total.join(part)?;
        }
        Ok(total)
    }

    /// Joined result of the last [`Assembler::assemble`].
    pub fn total(&self) -> &ThreadAccumulator {
        &self.workers[0]
    }
}
