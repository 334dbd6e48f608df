//! `AdvectiveFluxCalculator`: lifecycle orchestration and solver-facing getters.
//!
//! One calculator serves one transported field on one mesh. Its lifecycle is
//!
//! 1. [`AdvectiveFluxCalculator::setup`] builds the topology (registry, pair
//!    valence, ghost manifests) unless a valid one exists,
//! 2. [`AdvectiveFluxCalculator::compute`] assembles `K` and the nodal unknowns
//!    over the owned cells on the worker pool, exchanges ghost data and runs the
//!    Kuzmin-Turek correction,
//! 3. the getters read the results until the next `compute`.
//!
//! [`AdvectiveFluxCalculator::mesh_changed`] drops the topology; the next
//! `setup` rebuilds it. A topology can be shared between calculators that
//! transport different fields on the same mesh.

use std::collections::BTreeSet;
use std::sync::Arc;

use rayon::ThreadPool;

use crate::afc_error::AfcError;
use crate::algs::assembly::{Assembler, ThreadAccumulator, build_pool};
use crate::algs::communicator::{Communicator, GhostCommTags};
use crate::config::{ExecuteOn, FluxCalculatorConfig};
use crate::data::valence::PairValence;
use crate::debug_invariants::DebugInvariants;
use crate::flux::kuzmin_turek::{FluxCorrection, KuzminTurek};
use crate::flux::sparse::SparseRow;
use crate::overlap::delta::AddDelta;
use crate::overlap::exchange::{
    all_reduce_max, exchange_nodal_values, exchange_pair_entries,
};
use crate::overlap::manifest::GhostManifest;
use crate::physics::TransportProvider;
use crate::topology::cell::{LocalMesh, MeshCell};
use crate::topology::connected_nodes::{ConnectedNodes, GlobalNodeId, NodeSetBuilder};

/// Everything that depends on the mesh only.
#[derive(Debug)]
pub struct CalculatorTopology {
    connections: Arc<ConnectedNodes>,
    valence: PairValence,
    manifest: GhostManifest,
    blocks: Option<BTreeSet<u32>>,
}

impl CalculatorTopology {
    /// Register every node and node pair of the evaluable cells, count pair
    /// valences over owned cells and build the ghost manifests.
    pub fn build<C: Communicator>(
        mesh: &LocalMesh,
        blocks: Option<&BTreeSet<u32>>,
        comm: &C,
        tags: GhostCommTags,
    ) -> Result<Self, AfcError> {
        let mut nodes = NodeSetBuilder::new();
        for cell in mesh.evaluable_cells(blocks) {
            for &g in &cell.nodes {
                nodes.add_global_node(g);
            }
        }
        let mut cons = nodes.finalize_nodes()?;
        for cell in mesh.evaluable_cells(blocks) {
            for &a in &cell.nodes {
                for &b in &cell.nodes {
                    cons.add_connection(a, b)?;
                }
            }
        }
        let connections = Arc::new(cons.finalize_connections());
        connections.debug_assert_invariants();

        let manifest = GhostManifest::build(mesh, blocks, &connections, comm, tags)?;

        let mut valence = PairValence::new(connections.clone());
        for cell in mesh.owned_cells(blocks) {
            valence.count_cell(cell)?;
        }
        if comm.size() > 1 {
            exchange_pair_entries::<AddDelta, u32, _, _>(comm, tags.valence, &manifest, &mut valence)?;
        }

        log::debug!(
            "rank {}: topology with {} nodes, {} connections, {} ghost peers",
            comm.rank(),
            connections.num_nodes(),
            connections.num_connections(),
            manifest.peers().len()
        );
        Ok(Self {
            connections,
            valence,
            manifest,
            blocks: blocks.cloned(),
        })
    }

    pub fn connections(&self) -> &Arc<ConnectedNodes> {
        &self.connections
    }

    pub fn valence(&self) -> &PairValence {
        &self.valence
    }

    pub fn manifest(&self) -> &GhostManifest {
        &self.manifest
    }

    pub fn blocks(&self) -> Option<&BTreeSet<u32>> {
        self.blocks.as_ref()
    }
}

pub struct AdvectiveFluxCalculator {
    config: FluxCalculatorConfig,
    engine: KuzminTurek,
    pool: ThreadPool,
    tags: GhostCommTags,
    topology: Option<Arc<CalculatorTopology>>,
    /// Per-worker `K` and nodal caches, sized to the current topology.
    assembler: Option<Assembler>,
    computed: Option<FluxCorrection>,
}

impl AdvectiveFluxCalculator {
    pub fn new(config: FluxCalculatorConfig) -> Result<Self, AfcError> {
        config.validate()?;
        let pool = build_pool(config.num_threads)?;
        Ok(Self {
            engine: KuzminTurek::new(config.flux_limiter_type),
            config,
            pool,
            tags: GhostCommTags::default(),
            topology: None,
            assembler: None,
            computed: None,
        })
    }

    /// Use distinct tags when several calculators exchange concurrently.
    pub fn with_tags(mut self, tags: GhostCommTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn config(&self) -> &FluxCalculatorConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether the solver should recompute at `phase`.
    pub fn executes_on(&self, phase: ExecuteOn) -> bool {
        self.config.execute_on.contains(&phase)
    }

    /// Invalidate topology and results.
    pub fn mesh_changed(&mut self) {
        self.topology = None;
        self.assembler = None;
        self.computed = None;
    }

    /// Build the topology if it is missing. Collective over `comm`.
    pub fn setup<C: Communicator>(&mut self, mesh: &LocalMesh, comm: &C) -> Result<(), AfcError> {
        if self.topology.is_some() {
            log::debug!("{}: reusing topology", self.config.name);
            return Ok(());
        }
        let topology = CalculatorTopology::build(mesh, self.config.blocks.as_ref(), comm, self.tags)?;

        let wasted = topology.connections.wasted_megabytes();
        let max_wasted = if comm.size() > 1 {
            all_reduce_max(comm, self.tags.gather, wasted)?
        } else {
            wasted
        };
        if comm.rank() == 0 && max_wasted > self.config.allowable_mb_wastage {
            log::warn!(
                "{}: the node registry wastes {max_wasted:.3} MB of memory on at least one rank \
                 (allowable_mb_wastage = {}); global node ids are sparse, consider renumbering the mesh",
                self.config.name,
                self.config.allowable_mb_wastage
            );
        }

        self.adopt(Arc::new(topology));
        Ok(())
    }

    /// Adopt a topology built by another calculator on the same mesh.
    pub fn setup_with(&mut self, topology: Arc<CalculatorTopology>) -> Result<(), AfcError> {
        if topology.blocks.as_ref() != self.config.blocks.as_ref() {
            return Err(AfcError::InvalidConfig(format!(
                "{}: shared topology was built for blocks {:?}, this calculator uses {:?}",
                self.config.name, topology.blocks, self.config.blocks
            )));
        }
        self.adopt(topology);
        Ok(())
    }

    fn adopt(&mut self, topology: Arc<CalculatorTopology>) {
        self.assembler = Some(Assembler::new(
            topology.connections.clone(),
            self.pool.current_num_threads(),
        ));
        self.topology = Some(topology);
        self.computed = None;
    }

    pub fn topology(&self) -> Result<&Arc<CalculatorTopology>, AfcError> {
        self.topology.as_ref().ok_or(AfcError::TopologyNotBuilt)
    }

    /// Recompute `K`, the nodal unknowns and all fluxes. Collective over `comm`.
    pub fn compute<P, C>(&mut self, mesh: &LocalMesh, provider: &P, comm: &C) -> Result<(), AfcError>
    where
        P: TransportProvider + ?Sized,
        C: Communicator,
    {
        let topology = self.topology()?.clone();
        self.computed = None;

        let owned: Vec<&MeshCell> = mesh.owned_cells(topology.blocks()).collect();
        log::debug!(
            "{}: rank {} assembling {} owned cells ({} ghost) on {} workers",
            self.config.name,
            comm.rank(),
            owned.len(),
            mesh.ghost_cells(topology.blocks()).count(),
            self.pool.current_num_threads()
        );
        let assembler = self.assembler.as_mut().ok_or(AfcError::TopologyNotBuilt)?;
        let total = assembler.assemble(&self.pool, &owned, provider)?;

        if comm.size() > 1 {
            exchange_nodal_values(comm, self.tags.nodal_values, &topology.manifest, &mut total.nodal)?;
            exchange_pair_entries::<AddDelta, f64, _, _>(
                comm,
                self.tags.kij,
                &topology.manifest,
                &mut total.kij,
            )?;
        }

        let correction = self.engine.compute(&total.kij, total.nodal.as_slice())?;
        correction.debug_assert_invariants();
        self.computed = Some(correction);
        Ok(())
    }

    /// The full result of the last recompute.
    pub fn correction(&self) -> Result<&FluxCorrection, AfcError> {
        self.computed.as_ref().ok_or(AfcError::NotComputed)
    }

    /// Assembled `K` and nodal unknowns of the last recompute.
    fn assembled(&self) -> Result<&ThreadAccumulator, AfcError> {
        self.correction()?;
        self.assembler
            .as_ref()
            .map(Assembler::total)
            .ok_or(AfcError::NotComputed)
    }

    /// `-(L u + f)` summed over the connections of `node`.
    pub fn flux_out(&self, node: GlobalNodeId) -> Result<f64, AfcError> {
        self.correction()?.flux_out(node)
    }

    pub fn dflux_out_du(&self, node: GlobalNodeId) -> Result<&SparseRow, AfcError> {
        self.correction()?.dflux_out_du(node)
    }

    /// `[j][k] = ∂flux_out[node] / ∂K[j][k]` over the connections of `node`
    /// and of each `j`.
    pub fn dflux_out_dkjk(&self, node: GlobalNodeId) -> Result<&[Vec<f64>], AfcError> {
        self.correction()?.dflux_out_dkjk(node)
    }

    /// `((j, k), ∂flux_out[node] / ∂K[j][k])` by global ids.
    pub fn dflux_out_dk_pairs(
        &self,
        node: GlobalNodeId,
    ) -> Result<impl Iterator<Item = ((GlobalNodeId, GlobalNodeId), f64)> + '_, AfcError> {
        let correction = self.correction()?;
        let con = correction.connections();
        let rows = correction.dflux_out_dkjk(node)?;
        let con_i = con.global_connections_to_global_id(node)?;
        Ok(con_i.iter().zip(rows).flat_map(move |(&gj, row)| {
            let con_j = con.global_connections_to_global_id(gj).unwrap_or(&[]);
            con_j.iter().zip(row).map(move |(&gk, &v)| ((gj, gk), v))
        }))
    }

    /// Occurrences of the pair `(i, j)` over all cells of all ranks.
    pub fn valence(&self, node_i: GlobalNodeId, node_j: GlobalNodeId) -> Result<u32, AfcError> {
        self.topology()?.valence.valence(node_i, node_j)
    }

    /// Fully assembled `K[i][j]`.
    pub fn kij(&self, node_i: GlobalNodeId, node_j: GlobalNodeId) -> Result<f64, AfcError> {
        self.assembled()?.kij.kij(node_i, node_j)
    }

    /// The transported unknown as used by the last recompute.
    pub fn nodal_value(&self, node: GlobalNodeId) -> Result<f64, AfcError> {
        let assembled = self.assembled()?;
        let seq = assembled.kij.connections().sequential_id(node)?;
        Ok(assembled.nodal.get(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::meshgen::line_mesh;
    use crate::flux::limiter::FluxLimiterType;
    use crate::physics::ConstantVelocity;

    #[test]
    fn getters_fail_before_setup_and_compute() {
        let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
        assert_eq!(calc.valence(0, 1), Err(AfcError::TopologyNotBuilt));
        let mesh = line_mesh(3, 1.0).unwrap().serial();
        let provider = ConstantVelocity::new([1.0, 0.0, 0.0], |n: u64| n as f64);
        assert_eq!(
            calc.compute(&mesh, &provider, &NoComm),
            Err(AfcError::TopologyNotBuilt)
        );
        calc.setup(&mesh, &NoComm).unwrap();
        assert_eq!(calc.flux_out(0), Err(AfcError::NotComputed));
        calc.compute(&mesh, &provider, &NoComm).unwrap();
        assert!(calc.flux_out(0).is_ok());
        assert_eq!(calc.flux_out(17), Err(AfcError::UnknownGlobalNode(17)));
        calc.mesh_changed();
        assert_eq!(calc.flux_out(0), Err(AfcError::NotComputed));
        assert!(calc.topology().is_err());
    }

    #[test]
    fn assembled_k_matches_line_stencil() {
        let mesh = line_mesh(4, 4.0).unwrap().serial();
        let provider = ConstantVelocity::new([2.0, 0.0, 0.0], |_: u64| 1.0);
        let mut calc = AdvectiveFluxCalculator::new(
            FluxCalculatorConfig::default().with_limiter(FluxLimiterType::MinMod),
        )
        .unwrap();
        calc.setup(&mesh, &NoComm).unwrap();
        calc.compute(&mesh, &provider, &NoComm).unwrap();
        // interior node: K[i][i+1] = -v/2, K[i][i-1] = v/2, K[i][i] = 0
        assert!((calc.kij(2, 3).unwrap() + 1.0).abs() < 1e-14);
        assert!((calc.kij(2, 1).unwrap() - 1.0).abs() < 1e-14);
        assert!(calc.kij(2, 2).unwrap().abs() < 1e-14);
        assert_eq!(calc.valence(2, 2).unwrap(), 2);
        assert_eq!(calc.valence(2, 3).unwrap(), 1);
        assert_eq!(calc.valence(0, 0).unwrap(), 1);
        assert!(calc.kij(0, 2).is_err());
    }

    #[test]
    fn dk_pairs_follow_nested_layout() {
        let mesh = line_mesh(3, 1.0).unwrap().serial();
        let provider = ConstantVelocity::new([1.0, 0.0, 0.0], |n: u64| (n * n) as f64);
        let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
        calc.setup(&mesh, &NoComm).unwrap();
        calc.compute(&mesh, &provider, &NoComm).unwrap();
        let nested = calc.dflux_out_dkjk(1).unwrap().to_vec();
        let pairs: Vec<_> = calc.dflux_out_dk_pairs(1).unwrap().collect();
        // node 1 -> {0, 1, 2}; 0 -> {0, 1}, 1 -> {0, 1, 2}, 2 -> {1, 2, 3}
        assert_eq!(pairs.len(), 2 + 3 + 3);
        assert_eq!(pairs[0].0, (0, 0));
        assert_eq!(pairs[2].0, (1, 0));
        assert_eq!(pairs[7].0, (2, 3));
        assert_eq!(pairs[7].1, nested[2][2]);
    }

    #[test]
    fn shared_topology_must_match_blocks() {
        let mesh = line_mesh(2, 1.0).unwrap().serial();
        let mut first = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
        first.setup(&mesh, &NoComm).unwrap();
        let shared = first.topology().unwrap().clone();
        let mut other =
            AdvectiveFluxCalculator::new(FluxCalculatorConfig::default().with_blocks([1])).unwrap();
        assert!(matches!(other.setup_with(shared), Err(AfcError::InvalidConfig(_))));
    }

    #[test]
    fn recompute_with_new_field_matches_fresh_calculator() {
        let mesh = line_mesh(12, 3.0).unwrap().serial();
        let first = ConstantVelocity::new([1.0, 0.0, 0.0], |n: u64| (n % 3) as f64);
        let second = ConstantVelocity::new([-0.5, 0.0, 0.0], |n: u64| (n as f64).sqrt());
        let cfg = FluxCalculatorConfig::default().with_threads(3);

        let mut reused = AdvectiveFluxCalculator::new(cfg.clone()).unwrap();
        reused.setup(&mesh, &NoComm).unwrap();
        reused.compute(&mesh, &first, &NoComm).unwrap();
        reused.compute(&mesh, &second, &NoComm).unwrap();

        let mut fresh = AdvectiveFluxCalculator::new(cfg).unwrap();
        fresh.setup(&mesh, &NoComm).unwrap();
        fresh.compute(&mesh, &second, &NoComm).unwrap();

        for n in 0..=12u64 {
            assert_eq!(reused.nodal_value(n).unwrap(), fresh.nodal_value(n).unwrap());
            assert_eq!(reused.kij(n, n).unwrap(), fresh.kij(n, n).unwrap());
            assert_eq!(reused.flux_out(n).unwrap(), fresh.flux_out(n).unwrap());
        }
    }
}
