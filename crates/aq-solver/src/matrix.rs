//! Symmetric nodal linear system.
//!
//! One row per non-fixed-grade node; coefficients are link conductances.
//! The sparsity pattern is frozen when the system is built and every
//! buffer is allocated once; assembly and solving reallocate nothing.
//!
//! Two back ends: a dense LU factorization (nalgebra) and a
//! Jacobi-preconditioned conjugate gradient working directly on the
//! edge-list sparse form.

use crate::error::{SolverError, SolverResult};
use aq_network::{Network, SolverKind};
use aq_core::{ensure_finite, MIN_GRADIENT};
use nalgebra::{DMatrix, DVector};

const CG_TOLERANCE: f64 = 1.0e-10;
const CG_MAX_ITERATIONS: usize = 1000;

/// The assembled system `A*h = b` over junction rows.
pub struct NodalSystem {
    kind: SolverKind,
    /// node index -> row (None for fixed-grade nodes)
    row_of_node: Vec<Option<usize>>,
    /// row -> node index
    node_of_row: Vec<usize>,
    /// link index -> (row_from, row_to), usize::MAX marks a fixed end
    link_rows: Vec<(usize, usize)>,
    diag: Vec<f64>,
    rhs: Vec<f64>,
    /// per-link off-diagonal coefficient (negated conductance)
    off_diag: Vec<f64>,
    /// solution vector, row-indexed
    solution: Vec<f64>,

    // dense LU workspace
    dense: DMatrix<f64>,
    dense_rhs: DVector<f64>,

    // conjugate-gradient workspace
    cg_x: Vec<f64>,
    cg_r: Vec<f64>,
    cg_z: Vec<f64>,
    cg_p: Vec<f64>,
    cg_ap: Vec<f64>,
}

const NO_ROW: usize = usize::MAX;

impl NodalSystem {
    /// Size the system for a network. Called once from `init_solver`.
    pub fn new(net: &Network, kind: SolverKind) -> Self {
        let mut row_of_node = vec![None; net.nodes.len()];
        let mut node_of_row = Vec::new();
        for (i, node) in net.nodes.iter().enumerate() {
            if !node.is_fixed_grade() {
                row_of_node[i] = Some(node_of_row.len());
                node_of_row.push(i);
            }
        }
        let n = node_of_row.len();
        let link_rows = net
            .links
            .iter()
            .map(|l| {
                (
                    row_of_node[l.from.idx()].unwrap_or(NO_ROW),
                    row_of_node[l.to.idx()].unwrap_or(NO_ROW),
                )
            })
            .collect();
        Self {
            kind,
            row_of_node,
            node_of_row,
            link_rows,
            diag: vec![0.0; n],
            rhs: vec![0.0; n],
            off_diag: vec![0.0; net.links.len()],
            solution: vec![0.0; n],
            dense: DMatrix::zeros(n, n),
            dense_rhs: DVector::zeros(n),
            cg_x: vec![0.0; n],
            cg_r: vec![0.0; n],
            cg_z: vec![0.0; n],
            cg_p: vec![0.0; n],
            cg_ap: vec![0.0; n],
        }
    }

    pub fn size(&self) -> usize {
        self.node_of_row.len()
    }

    pub fn row_of_node(&self, node: usize) -> Option<usize> {
        self.row_of_node[node]
    }

    pub fn node_of_row(&self, row: usize) -> usize {
        self.node_of_row[row]
    }

    pub fn link_rows(&self, link: usize) -> (Option<usize>, Option<usize>) {
        let (a, b) = self.link_rows[link];
        (
            (a != NO_ROW).then_some(a),
            (b != NO_ROW).then_some(b),
        )
    }

    /// Zero all coefficients for a fresh assembly pass.
    pub fn reset(&mut self) {
        self.diag.fill(0.0);
        self.rhs.fill(0.0);
        self.off_diag.fill(0.0);
    }

    pub fn add_diag(&mut self, row: usize, v: f64) {
        self.diag[row] += v;
    }

    pub fn add_rhs(&mut self, row: usize, v: f64) {
        self.rhs[row] += v;
    }

    /// Record the symmetric off-diagonal contribution of one link
    /// (conductance between two junction rows).
    pub fn add_off_diag(&mut self, link: usize, p: f64) {
        self.off_diag[link] -= p;
    }

    /// Solve for nodal heads into [`Self::solution`].
    pub fn solve(&mut self, net: &Network) -> SolverResult<()> {
        // a row whose incident conductances all vanished would make the
        // matrix singular; regularize it in place
        for d in self.diag.iter_mut() {
            if *d < MIN_GRADIENT {
                *d = MIN_GRADIENT;
            }
        }
        match self.kind {
            SolverKind::Lu => self.solve_lu(net)?,
            SolverKind::Cg => self.solve_cg(net)?,
        }
        // an ill-conditioned factorization can hand back NaN heads
        // without reporting singularity; catch them here
        for &h in &self.solution {
            ensure_finite(h, "nodal head").map_err(|_| SolverError::Numeric {
                what: "non-finite nodal head from linear solve",
            })?;
        }
        Ok(())
    }

    /// The row-indexed head solution of the latest `solve`.
    pub fn solution(&self) -> &[f64] {
        &self.solution
    }

    fn solve_lu(&mut self, net: &Network) -> SolverResult<()> {
        let n = self.size();
        self.dense.fill(0.0);
        for row in 0..n {
            self.dense[(row, row)] = self.diag[row];
            self.dense_rhs[row] = self.rhs[row];
        }
        for (li, &(a, b)) in self.link_rows.iter().enumerate() {
            if a != NO_ROW && b != NO_ROW {
                // ties in pivot quality resolve toward the lower index by
                // construction: rows are ordered by node index
                self.dense[(a, b)] += self.off_diag[li];
                self.dense[(b, a)] += self.off_diag[li];
            }
        }
        let lu = self.dense.clone().lu();
        match lu.solve(&self.dense_rhs) {
            Some(x) => {
                for row in 0..n {
                    self.solution[row] = x[row];
                }
                Ok(())
            }
            None => Err(self.singular_error(net)),
        }
    }

    fn solve_cg(&mut self, net: &Network) -> SolverResult<()> {
        let n = self.size();
        if n == 0 {
            return Ok(());
        }
        // starting guess: previous solution
        self.cg_x.copy_from_slice(&self.solution);
        self.matvec_into_ap();
        for row in 0..n {
            self.cg_r[row] = self.rhs[row] - self.cg_ap[row];
        }
        let b_norm: f64 = self.rhs.iter().map(|v| v * v).sum::<f64>().sqrt();
        let threshold = CG_TOLERANCE * b_norm.max(1.0);

        // Jacobi preconditioner z = r / diag
        for row in 0..n {
            if self.diag[row] <= 0.0 {
                return Err(self.singular_error(net));
            }
            self.cg_z[row] = self.cg_r[row] / self.diag[row];
        }
        self.cg_p.copy_from_slice(&self.cg_z);
        let mut rz: f64 = dot(&self.cg_r, &self.cg_z);

        for _ in 0..CG_MAX_ITERATIONS {
            let r_norm: f64 = self.cg_r.iter().map(|v| v * v).sum::<f64>().sqrt();
            if r_norm <= threshold {
                break;
            }
            self.cg_x.copy_from_slice(&self.cg_p);
            self.matvec_into_ap();
            let p_ap = dot(&self.cg_p, &self.cg_ap);
            if p_ap.abs() < f64::MIN_POSITIVE {
                return Err(self.singular_error(net));
            }
            let alpha = rz / p_ap;
            for row in 0..n {
                self.solution[row] += alpha * self.cg_p[row];
                self.cg_r[row] -= alpha * self.cg_ap[row];
            }
            for row in 0..n {
                self.cg_z[row] = self.cg_r[row] / self.diag[row];
            }
            let rz_new = dot(&self.cg_r, &self.cg_z);
            let beta = rz_new / rz;
            rz = rz_new;
            for row in 0..n {
                self.cg_p[row] = self.cg_z[row] + beta * self.cg_p[row];
            }
        }
        Ok(())
    }

    /// `ap = A * cg_x` using the edge-list sparse form.
    fn matvec_into_ap(&mut self) {
        for row in 0..self.size() {
            self.cg_ap[row] = self.diag[row] * self.cg_x[row];
        }
        for (li, &(a, b)) in self.link_rows.iter().enumerate() {
            if a != NO_ROW && b != NO_ROW {
                let c = self.off_diag[li];
                if c != 0.0 {
                    self.cg_ap[a] += c * self.cg_x[b];
                    self.cg_ap[b] += c * self.cg_x[a];
                }
            }
        }
    }

    fn singular_error(&self, net: &Network) -> SolverError {
        // report the junction whose row looks worst conditioned
        let worst = (0..self.size())
            .min_by(|&a, &b| {
                self.diag[a]
                    .partial_cmp(&self.diag[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(0);
        SolverError::Singular {
            node: net.nodes[self.node_of_row[worst]].name.clone(),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
