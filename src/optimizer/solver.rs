//! QP solver adapter
//!
//! Hands the sparse problem assembled by the formulator to OSQP and maps its
//! outcome onto [`SolverStatus`]. The last solution is kept per horizon and
//! seeds the next solve when warm starting is enabled.

use log::{debug, warn};
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use osqp::{Problem, Settings, SetupError, Status};
use std::borrow::Cow;
use std::convert::TryFrom;

use crate::config::SolverSettings;
use crate::optimizer::formulation::QpProblem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Solved,
    PrimalInfeasible,
    DualInfeasible,
    MaxIterationsReached,
    /// Cost matrix is not positive semidefinite
    NonConvex,
    DimensionMismatch,
    /// OSQP rejected the problem data or settings
    SetupFailed,
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: DVector<f64>,
    /// Constraint multipliers
    pub y: DVector<f64>,
    pub iterations: u32,
    pub objective: f64,
}

/// Iterates kept between solves of the same horizon.
struct Workspace {
    horizon: usize,
    x: Vec<f64>,
    y: Vec<f64>,
}

pub struct QpSolver {
    settings: SolverSettings,
    workspace: Option<Workspace>,
}

impl QpSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            workspace: None,
        }
    }

    /// Drop the retained iterates; the next solve starts cold.
    pub fn reset(&mut self) {
        self.workspace = None;
    }

    /// Horizon of the retained iterates, if any
    pub fn horizon(&self) -> Option<usize> {
        self.workspace.as_ref().map(|w| w.horizon)
    }

    pub fn solve(&mut self, problem: &QpProblem) -> Result<QpSolution, SolverStatus> {
        let n = problem.num_variables();
        let m = problem.num_constraints();
        if problem.hessian.nrows() != n
            || problem.hessian.ncols() != n
            || problem.constraints.nrows() != m
            || problem.constraints.ncols() != n
            || problem.upper.len() != m
        {
            return Err(SolverStatus::DimensionMismatch);
        }
        let (l, u) = (&problem.lower, &problem.upper);
        if let Some(row) = (0..m).find(|&i| l[i] > u[i]) {
            debug!(
                "Constraint row {} has crossed bounds [{:.3}, {:.3}]",
                row, l[row], u[row]
            );
            return Err(SolverStatus::PrimalInfeasible);
        }

        let mut osqp_problem = Problem::new(
            as_osqp(&problem.hessian).into_upper_tri(),
            problem.gradient.as_slice(),
            as_osqp(&problem.constraints),
            l.as_slice(),
            u.as_slice(),
            &osqp_settings(&self.settings),
        )
        .map_err(setup_status)?;

        if self.settings.warm_start {
            if let Some(ws) = &self.workspace {
                if ws.horizon == problem.horizon && ws.x.len() == n && ws.y.len() == m {
                    osqp_problem.warm_start(&ws.x, &ws.y);
                }
            }
        }

        let status = osqp_problem.solve();
        let iterations = status.iter();
        let solution = match status {
            Status::Solved(solution) => solution,
            Status::SolvedInaccurate(solution) => {
                warn!("QP solved inaccurately after {} iterations", iterations);
                solution
            }
            Status::MaxIterationsReached(_) => {
                debug!("QP reached {} iterations without converging", iterations);
                return Err(SolverStatus::MaxIterationsReached);
            }
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                debug!("QP is primal infeasible");
                return Err(SolverStatus::PrimalInfeasible);
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                debug!("QP is dual infeasible");
                return Err(SolverStatus::DualInfeasible);
            }
            Status::NonConvex(_) => return Err(SolverStatus::NonConvex),
            _ => return Err(SolverStatus::SetupFailed),
        };

        let x = solution.x().to_vec();
        let y = solution.y().to_vec();
        let objective = solution.obj_val();
        debug!(
            "QP solved in {} iterations, objective {:.6}",
            iterations, objective
        );
        self.workspace = Some(Workspace {
            horizon: problem.horizon,
            x: x.clone(),
            y: y.clone(),
        });
        Ok(QpSolution {
            x: DVector::from_vec(x),
            y: DVector::from_vec(y),
            iterations,
            objective,
        })
    }
}

/// Borrow a compressed-column matrix in OSQP's layout.
fn as_osqp(matrix: &CscMatrix<f64>) -> osqp::CscMatrix<'_> {
    osqp::CscMatrix {
        nrows: matrix.nrows(),
        ncols: matrix.ncols(),
        indptr: Cow::Borrowed(matrix.col_offsets()),
        indices: Cow::Borrowed(matrix.row_indices()),
        data: Cow::Borrowed(matrix.values()),
    }
}

fn osqp_settings(settings: &SolverSettings) -> Settings {
    let max_iter = u32::try_from(settings.max_iter).unwrap_or(u32::MAX);
    let interval = u32::try_from(settings.adaptive_rho_interval).unwrap_or(u32::MAX);
    Settings::default()
        .verbose(false)
        .max_iter(max_iter)
        .eps_abs(settings.eps_abs)
        .eps_rel(settings.eps_rel)
        .eps_prim_inf(settings.eps_prim_inf)
        .rho(settings.rho)
        .sigma(settings.sigma)
        .alpha(settings.alpha)
        // A fixed interval keeps repeated solves identical.
        .adaptive_rho(interval > 0)
        .adaptive_rho_interval(Some(interval))
        .polish(settings.polish)
        .warm_start(settings.warm_start)
}

fn setup_status(error: SetupError) -> SolverStatus {
    warn!("QP setup failed: {:?}", error);
    match error {
        SetupError::NonConvex => SolverStatus::NonConvex,
        _ => SolverStatus::SetupFailed,
    }
}
