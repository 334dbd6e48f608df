//! Kuzmin-Turek flux correction over an assembled transport matrix.
//!
//! Given `K` and the nodal unknown `u`, [`KuzminTurek::compute`] builds
//!
//! 1. the artificial diffusion `D` that removes every negative off-diagonal
//!    entry of `K` (`D[i][j] = max(0, -K[i][j], -K[j][i])`, zero row sums),
//! 2. the low-order operator `L = K + D`,
//! 3. the nodal limiter bounds `R+`/`R-` from the antidiffusion budgets `P±`, `Q±`,
//! 4. the antidiffusive flux `f`, computed on the upwind side of each edge and
//!    mirrored to the downwind side,
//! 5. `flux_out[i] = -(Σ_j L[i][j] u[j] + Σ_j f[i][j])` with its exact derivatives
//!    with respect to `u` and to every entry of `K`.
//!
//! Every intermediate carries its derivative alongside its value. Rows are
//! independent within each stage and are evaluated in parallel with rayon.

use std::iter::once;
use std::sync::Arc;

use rayon::prelude::*;

use crate::afc_error::AfcError;
use crate::data::transport_matrix::TransportMatrix;
use crate::flux::limiter::FluxLimiterType;
use crate::flux::sparse::SparseRow;
use crate::topology::connected_nodes::{ConnectedNodes, GlobalNodeId, SequentialId};

/// Position of the self-connection and of every reverse connection.
struct EdgeLayout {
    /// `self_index[i]`: index of `i` in its own row.
    self_index: Vec<usize>,
    /// `reverse[i][m]`: index of `i` in the row of `row(i)[m]`.
    reverse: Vec<Vec<usize>>,
}

impl EdgeLayout {
    fn new(con: &ConnectedNodes) -> Result<Self, AfcError> {
        let mut self_index = Vec::with_capacity(con.num_nodes());
        let mut reverse = Vec::with_capacity(con.num_nodes());
        for (i, con_i) in con.rows() {
            let global_i = con.global_id(i)?;
            let ii = con
                .index_of_sequential_connection(i, i)
                .map_err(|_| AfcError::MissingSelfConnection(global_i))?;
            let rev = con_i
                .iter()
                .map(|&j| con.index_of_sequential_connection(j, i))
                .collect::<Result<Vec<_>, _>>()?;
            self_index.push(ii);
            reverse.push(rev);
        }
        Ok(Self {
            self_index,
            reverse,
        })
    }
}

/// One row of `D` with its derivatives with respect to `K`.
#[derive(Clone, Debug)]
struct DiffusionRow {
    dij: Vec<f64>,
    /// `∂D[i][j] / ∂K[i][j]`
    d_dij_dkij: Vec<f64>,
    /// `∂D[i][j] / ∂K[j][i]`
    d_dij_dkji: Vec<f64>,
    /// `∂D[i][i] / ∂K[i][j]`
    d_dii_dkij: Vec<f64>,
    /// `∂D[i][i] / ∂K[j][i]`
    d_dii_dkji: Vec<f64>,
}

/// A nodal quantity with its derivatives along the row of its node.
#[derive(Clone, Debug)]
struct Sensitive {
    value: f64,
    du: Vec<f64>,
    dk: Vec<f64>,
}

impl Sensitive {
    fn zero(len: usize) -> Self {
        Self {
            value: 0.0,
            du: vec![0.0; len],
            dk: vec![0.0; len],
        }
    }
}

/// Antidiffusion budgets of a node.
#[derive(Copy, Clone, Debug)]
enum Budget {
    PPlus,
    PMinus,
    QPlus,
    QMinus,
}

impl Budget {
    #[inline]
    fn admits(self, uj_minus_ui: f64, k: f64) -> bool {
        match self {
            Budget::PPlus => uj_minus_ui < 0.0 && k < 0.0,
            Budget::PMinus => uj_minus_ui > 0.0 && k < 0.0,
            Budget::QPlus => uj_minus_ui > 0.0 && k > 0.0,
            Budget::QMinus => uj_minus_ui < 0.0 && k > 0.0,
        }
    }
}

/// Antidiffusive flux on one directed edge `(i, j)`.
#[derive(Clone, Debug)]
struct EdgeFlux {
    value: f64,
    /// Over `row(i) ∪ row(j)`, keyed by global id.
    du: SparseRow,
    /// `∂f / ∂K[i][k]`, aligned with `row(i)`.
    dk_row_i: Vec<f64>,
    /// `∂f / ∂K[j][k]`, aligned with `row(j)`.
    dk_row_j: Vec<f64>,
}

impl EdgeFlux {
    fn mirrored(&self) -> EdgeFlux {
        let mut du = self.du.clone();
        du.scale(-1.0);
        EdgeFlux {
            value: -self.value,
            du,
            dk_row_i: self.dk_row_j.iter().map(|v| -v).collect(),
            dk_row_j: self.dk_row_i.iter().map(|v| -v).collect(),
        }
    }
}

/// Read-only view shared by the per-row stages.
struct Stencil<'a> {
    con: &'a ConnectedNodes,
    layout: &'a EdgeLayout,
    k: &'a TransportMatrix,
    u: &'a [f64],
    globals: &'a [GlobalNodeId],
}

impl Stencil<'_> {
    fn diffusion_row(&self, i: SequentialId) -> DiffusionRow {
        let con_i = self.con.row(i);
        let n = con_i.len();
        let ii = self.layout.self_index[i];
        let mut row = DiffusionRow {
            dij: vec![0.0; n],
            d_dij_dkij: vec![0.0; n],
            d_dij_dkji: vec![0.0; n],
            d_dii_dkij: vec![0.0; n],
            d_dii_dkji: vec![0.0; n],
        };
        for (jdx, &j) in con_i.iter().enumerate() {
            if j == i {
                continue;
            }
            let kij = self.k.get(i, jdx);
            let kji = self.k.get(j, self.layout.reverse[i][jdx]);
            if kij <= kji && kij < 0.0 {
                row.dij[jdx] = -kij;
                row.d_dij_dkij[jdx] = -1.0;
                row.d_dii_dkij[jdx] += 1.0;
            } else if kji <= kij && kji < 0.0 {
                row.dij[jdx] = -kji;
                row.d_dij_dkji[jdx] = -1.0;
                row.d_dii_dkji[jdx] += 1.0;
            }
            row.dij[ii] -= row.dij[jdx];
        }
        row
    }

    /// `Σ_j K[i][j] (u_j - u_i)` over the neighbours admitted by `kind`.
    fn budget(&self, i: SequentialId, kind: Budget) -> Sensitive {
        let con_i = self.con.row(i);
        let ii = self.layout.self_index[i];
        let u_i = self.u[i];
        let mut out = Sensitive::zero(con_i.len());
        for (jdx, &j) in con_i.iter().enumerate() {
            if j == i {
                continue;
            }
            let k = self.k.get(i, jdx);
            let uj_minus_ui = self.u[j] - u_i;
            if kind.admits(uj_minus_ui, k) {
                out.value += k * uj_minus_ui;
                out.du[jdx] += k;
                out.du[ii] -= k;
                out.dk[jdx] += uj_minus_ui;
            }
        }
        out
    }

    /// Limited ratio `Q/P` of node `i`; 1 when there is no antidiffusion to restrict.
    fn bound(&self, limiter: FluxLimiterType, i: SequentialId, p: Budget, q: Budget) -> Sensitive {
        let n = self.con.row(i).len();
        let mut out = Sensitive::zero(n);
        if limiter == FluxLimiterType::None {
            return out;
        }
        let p = self.budget(i, p);
        if p.value == 0.0 {
            out.value = 1.0;
            return out;
        }
        let q = self.budget(i, q);
        let (limited, dlimited_dr) = limiter.limit(1.0, q.value / p.value);
        let p2 = p.value * p.value;
        for m in 0..n {
            out.du[m] = dlimited_dr * (q.du[m] / p.value - q.value * p.du[m] / p2);
            out.dk[m] = dlimited_dr * (q.dk[m] / p.value - q.value * p.dk[m] / p2);
        }
        out.value = limited;
        out
    }

    fn edge_support(&self, i: SequentialId, j: SequentialId) -> SparseRow {
        SparseRow::with_support(
            self.con
                .row(i)
                .iter()
                .chain(self.con.row(j))
                .map(|&s| self.globals[s]),
        )
    }

    /// `i` is upwind of `j` if `L[j][i] >= L[i][j]`; exact ties go to the smaller id.
    #[inline]
    fn is_upwind(i: SequentialId, j: SequentialId, l_ij: f64, l_ji: f64) -> bool {
        l_ji > l_ij || (l_ji == l_ij && i < j)
    }
}

/// The flux-correction engine. Stateless apart from the limiter choice.
#[derive(Copy, Clone, Debug)]
pub struct KuzminTurek {
    limiter: FluxLimiterType,
}

impl KuzminTurek {
    pub fn new(limiter: FluxLimiterType) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> FluxLimiterType {
        self.limiter
    }

    /// Run the full correction for `u` (sequential order) over the fully
    /// assembled matrix `k`.
    pub fn compute(&self, k: &TransportMatrix, u: &[f64]) -> Result<FluxCorrection, AfcError> {
        let con = k.connections();
        let n = con.num_nodes();
        if u.len() != n {
            return Err(AfcError::NodalValueCount {
                expected: n,
                found: u.len(),
            });
        }
        let layout = EdgeLayout::new(con)?;
        let st = Stencil {
            con,
            layout: &layout,
            k,
            u,
            globals: con.numbering().global_ids(),
        };

        let diffusion: Vec<DiffusionRow> = (0..n)
            .into_par_iter()
            .map(|i| st.diffusion_row(i))
            .collect();

        let lij: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                k.row(i)
                    .iter()
                    .zip(&diffusion[i].dij)
                    .map(|(kij, dij)| kij + dij)
                    .collect()
            })
            .collect();

        let (r_plus, r_minus): (Vec<Sensitive>, Vec<Sensitive>) = (0..n)
            .into_par_iter()
            .map(|i| {
                (
                    st.bound(self.limiter, i, Budget::PPlus, Budget::QPlus),
                    st.bound(self.limiter, i, Budget::PMinus, Budget::QMinus),
                )
            })
            .unzip();

        // Upwind side of every edge; downwind entries stay as zero placeholders.
        let upwind: Vec<Vec<EdgeFlux>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let con_i = con.row(i);
                con_i
                    .iter()
                    .enumerate()
                    .map(|(jdx, &j)| {
                        let mut edge = EdgeFlux {
                            value: 0.0,
                            du: st.edge_support(i, j),
                            dk_row_i: vec![0.0; con_i.len()],
                            dk_row_j: vec![0.0; con.row(j).len()],
                        };
                        let ji = layout.reverse[i][jdx];
                        if j != i && Stencil::is_upwind(i, j, lij[i][jdx], lij[j][ji]) {
                            self.upwind_edge(&st, &diffusion, &lij, &r_plus, &r_minus, i, jdx, &mut edge);
                        }
                        edge
                    })
                    .collect()
            })
            .collect();

        let fa: Vec<Vec<EdgeFlux>> = (0..n)
            .into_par_iter()
            .map(|i| {
                con.row(i)
                    .iter()
                    .enumerate()
                    .map(|(jdx, &j)| {
                        let ji = layout.reverse[i][jdx];
                        if j != i && !Stencil::is_upwind(i, j, lij[i][jdx], lij[j][ji]) {
                            upwind[j][ji].mirrored()
                        } else {
                            upwind[i][jdx].clone()
                        }
                    })
                    .collect()
            })
            .collect();

        let rows: Vec<(f64, SparseRow, Vec<Vec<f64>>)> = (0..n)
            .into_par_iter()
            .map(|i| assemble_row(&st, &diffusion[i], &lij[i], &fa[i], i))
            .collect();

        let mut flux_out = Vec::with_capacity(n);
        let mut dflux_out_du = Vec::with_capacity(n);
        let mut dflux_out_dkjk = Vec::with_capacity(n);
        for (f, du, dk) in rows {
            flux_out.push(f);
            dflux_out_du.push(du);
            dflux_out_dkjk.push(dk);
        }

        Ok(FluxCorrection {
            connections: con.clone(),
            dij: diffusion.into_iter().map(|d| d.dij).collect(),
            lij,
            r_plus: r_plus.into_iter().map(|r| r.value).collect(),
            r_minus: r_minus.into_iter().map(|r| r.value).collect(),
            fa: fa
                .into_iter()
                .map(|row| row.into_iter().map(|e| e.value).collect())
                .collect(),
            flux_out,
            dflux_out_du,
            dflux_out_dkjk,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn upwind_edge(
        &self,
        st: &Stencil<'_>,
        diffusion: &[DiffusionRow],
        lij: &[Vec<f64>],
        r_plus: &[Sensitive],
        r_minus: &[Sensitive],
        i: SequentialId,
        jdx: usize,
        edge: &mut EdgeFlux,
    ) {
        let con_i = st.con.row(i);
        let n_i = con_i.len();
        let j = con_i[jdx];
        let ji = st.layout.reverse[i][jdx];
        let (u_i, u_j) = (st.u[i], st.u[j]);
        let l_ji = lij[j][ji];
        let d_ij = diffusion[i].dij[jdx];
        let bound = if u_i >= u_j { &r_plus[i] } else { &r_minus[i] };

        let mut dpref_du = vec![0.0; n_i];
        let mut dpref_dkij = vec![0.0; n_i];
        let mut dpref_dkji = 0.0;
        let prefactor = if l_ji <= bound.value * d_ij {
            dpref_dkij[jdx] += diffusion[j].d_dij_dkji[ji];
            dpref_dkji += 1.0 + diffusion[j].d_dij_dkij[ji];
            l_ji
        } else {
            for m in 0..n_i {
                dpref_du[m] = bound.du[m] * d_ij;
                dpref_dkij[m] += bound.dk[m] * d_ij;
            }
            dpref_dkij[jdx] += bound.value * diffusion[i].d_dij_dkij[jdx];
            dpref_dkji += bound.value * diffusion[i].d_dij_dkji[jdx];
            bound.value * d_ij
        };

        let du_ij = u_i - u_j;
        edge.value = prefactor * du_ij;
        edge.du.add(st.globals[i], prefactor);
        edge.du.add(st.globals[j], -prefactor);
        for (m, &s) in con_i.iter().enumerate() {
            edge.du.add(st.globals[s], dpref_du[m] * du_ij);
            edge.dk_row_i[m] += dpref_dkij[m] * du_ij;
        }
        edge.dk_row_j[ji] += dpref_dkji * du_ij;
    }
}

/// Net outflow of node `i` and its derivative rows.
fn assemble_row(
    st: &Stencil<'_>,
    diffusion: &DiffusionRow,
    lij: &[f64],
    fa: &[EdgeFlux],
    i: SequentialId,
) -> (f64, SparseRow, Vec<Vec<f64>>) {
    let con_i = st.con.row(i);
    let n_i = con_i.len();
    let ii = st.layout.self_index[i];
    let reverse = &st.layout.reverse[i];

    let mut flux = 0.0;
    let mut du = SparseRow::with_support(con_i.iter().flat_map(|&j| {
        once(st.globals[j]).chain(st.con.row(j).iter().map(|&k| st.globals[k]))
    }));
    let mut dk: Vec<Vec<f64>> = con_i
        .iter()
        .map(|&j| vec![0.0; st.con.row(j).len()])
        .collect();

    for (jdx, &j) in con_i.iter().enumerate() {
        let u_j = st.u[j];
        let edge = &fa[jdx];

        flux -= lij[jdx] * u_j + edge.value;

        du.add(st.globals[j], -lij[jdx]);
        for (node, d) in edge.du.iter() {
            du.add(node, -d);
        }

        // K in L = K + D
        dk[ii][jdx] -= u_j;
        // D in L = K + D, row i entries
        if j == i {
            for m in 0..n_i {
                dk[ii][m] -= diffusion.d_dii_dkij[m] * u_j;
            }
        } else {
            dk[ii][jdx] -= diffusion.d_dij_dkij[jdx] * u_j;
        }
        for m in 0..n_i {
            dk[ii][m] -= edge.dk_row_i[m];
        }
        // D in L = K + D, transposed entries
        if j == i {
            for m in 0..n_i {
                dk[m][reverse[m]] -= diffusion.d_dii_dkji[m] * u_j;
            }
        } else {
            dk[jdx][reverse[jdx]] -= diffusion.d_dij_dkji[jdx] * u_j;
        }
        for (m, d) in edge.dk_row_j.iter().enumerate() {
            dk[jdx][m] -= d;
        }
    }
    (flux, du, dk)
}

/// Result of one correction: fluxes, exact Jacobians and the intermediate
/// matrices for diagnostics. Entries are aligned with the registry rows.
#[derive(Clone, Debug)]
pub struct FluxCorrection {
    connections: Arc<ConnectedNodes>,
    dij: Vec<Vec<f64>>,
    lij: Vec<Vec<f64>>,
    r_plus: Vec<f64>,
    r_minus: Vec<f64>,
    fa: Vec<Vec<f64>>,
    flux_out: Vec<f64>,
    dflux_out_du: Vec<SparseRow>,
    dflux_out_dkjk: Vec<Vec<Vec<f64>>>,
}

impl FluxCorrection {
    pub fn connections(&self) -> &Arc<ConnectedNodes> {
        &self.connections
    }

    fn pair(&self, gi: GlobalNodeId, gj: GlobalNodeId) -> Result<(usize, usize), AfcError> {
        Ok((
            self.connections.sequential_id(gi)?,
            self.connections.index_of_global_connection(gi, gj)?,
        ))
    }

    /// Net outflow of node `node`.
    pub fn flux_out(&self, node: GlobalNodeId) -> Result<f64, AfcError> {
        Ok(self.flux_out[self.connections.sequential_id(node)?])
    }

    /// All fluxes in sequential order.
    pub fn flux_out_slice(&self) -> &[f64] {
        &self.flux_out
    }

    /// `∂flux_out[node] / ∂u[k]` keyed by global `k`.
    pub fn dflux_out_du(&self, node: GlobalNodeId) -> Result<&SparseRow, AfcError> {
        Ok(&self.dflux_out_du[self.connections.sequential_id(node)?])
    }

    /// `[j][k] = ∂flux_out[node] / ∂K[j][k]`, where `j` walks the connections of
    /// `node` and `k` walks the connections of `j`.
    pub fn dflux_out_dkjk(&self, node: GlobalNodeId) -> Result<&[Vec<f64>], AfcError> {
        Ok(&self.dflux_out_dkjk[self.connections.sequential_id(node)?])
    }

    pub fn dij(&self, gi: GlobalNodeId, gj: GlobalNodeId) -> Result<f64, AfcError> {
        let (i, jdx) = self.pair(gi, gj)?;
        Ok(self.dij[i][jdx])
    }

    pub fn lij(&self, gi: GlobalNodeId, gj: GlobalNodeId) -> Result<f64, AfcError> {
        let (i, jdx) = self.pair(gi, gj)?;
        Ok(self.lij[i][jdx])
    }

    /// Antidiffusive flux `f[i][j]`.
    pub fn antidiffusive_flux(&self, gi: GlobalNodeId, gj: GlobalNodeId) -> Result<f64, AfcError> {
        let (i, jdx) = self.pair(gi, gj)?;
        Ok(self.fa[i][jdx])
    }

    pub fn r_plus(&self, node: GlobalNodeId) -> Result<f64, AfcError> {
        Ok(self.r_plus[self.connections.sequential_id(node)?])
    }

    pub fn r_minus(&self, node: GlobalNodeId) -> Result<f64, AfcError> {
        Ok(self.r_minus[self.connections.sequential_id(node)?])
    }

    pub(crate) fn dij_rows(&self) -> &[Vec<f64>] {
        &self.dij
    }

    pub(crate) fn lij_rows(&self) -> &[Vec<f64>] {
        &self.lij
    }

    pub(crate) fn fa_rows(&self) -> &[Vec<f64>] {
        &self.fa
    }
}
