// crates/es_foundation/src/numerics/mod.rs

//! 数值工具模块

pub mod kahan_sum;

pub use kahan_sum::KahanSum;
