// crates/es_foundation/src/lib.rs

//! Erosim Foundation Layer
//!
//! 零重依赖基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `EsError` / `EsResult`
//! - [`numerics`]: 数值工具（Kahan 补偿求和）
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 thiserror
//! 2. **易用性**: 提供便捷的错误构造方法与 `ensure!` / `require!` 宏
//! 3. **可追溯**: 支持错误链

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod numerics;

// 重导出常用类型
pub use error::{EsError, EsResult};
pub use numerics::KahanSum;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{EsError, EsResult};
    pub use crate::numerics::KahanSum;
    pub use crate::{ensure, require};
}
