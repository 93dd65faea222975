// crates/es_physics/src/lib.rs

//! Erosim 物理引擎
//!
//! 分布式降雨-径流数值模拟核心：
//!
//! - [`rainfall`]: 降雨过程线
//! - [`infiltration`]: Philip 入渗模型与参数分组
//! - [`hydraulics`]: 水力参数构建（坡度修正阻力系数、临界水深）
//! - [`state`]: 地表瞬态状态与流态机
//! - [`routing`]: 坡面片流/细沟汇流器
//! - [`stream`]: 河段汇流器与结果表
//! - [`cumulative`]: 时间积分累计量与收支闭合
//! - [`engine`]: 时间步长控制与求解器编排
//!
//! 单线程同步数值循环；逐单元遍历可在内部并行，但不改变外部
//! 行为与顺序。引擎实例在一次运行期间独占全部栅格与累计量。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cumulative;
pub mod engine;
pub mod error;
pub mod hydraulics;
pub mod infiltration;
pub mod rainfall;
pub mod routing;
pub mod state;
pub mod stream;

pub use cumulative::{CumulativeState, MassTotals, OutputCategory, OutputGrid};
pub use engine::{RunoffOutput, RunoffSolver, SolverInputs, StepReport};
pub use error::{RunoffError, RunoffResult};
pub use infiltration::{InfiltrationGroup, PhilipInfiltration};
pub use rainfall::Hyetograph;
pub use state::{FlowRegime, SurfaceState};
pub use stream::{ChannelNetwork, ReachDefinition, ReachRow, ReachTable};
