//! QP-based path optimization
//!
//! Segmentation of the smoothed reference, QP formulation over the lateral
//! and heading errors, the QP solver and the output builder, tied together
//! by [`PathOptimizer`].

pub mod formulation;
pub mod output;
pub mod path_optimizer;
pub mod segmenter;
pub mod solver;

pub use formulation::{QpFormulator, QpProblem, TerminalConstraint};
pub use output::OptimizedPath;
pub use path_optimizer::PathOptimizer;
pub use solver::{QpSolution, QpSolver, SolverStatus};
