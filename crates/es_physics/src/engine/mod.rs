// crates/es_physics/src/engine/mod.rs

//! 引擎模块：时间步长控制与求解器编排

pub mod solver;
pub mod timestep;

pub use solver::{RunoffOutput, RunoffSolver, SolverInputs, StepReport};
pub use timestep::TimeStepController;
