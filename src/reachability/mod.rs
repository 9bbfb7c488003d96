//! Hamilton-Jacobi reachability: lattice, dynamics, solver and value function.

pub mod dynamics;
pub mod grid;
pub mod solver;
pub mod value_function;

pub use dynamics::{CartPoleDynamics, DisturbanceBounds, Dynamics, DynamicsParams};
pub use grid::{Dimension, Grid};
pub use solver::{Accuracy, LaxFriedrichsSolver, Solver};
pub use value_function::{CONVERGENCE_EPSILON, CachePolicy, Convergence, SolveConfig, ValueFunctionStore};
