// crates/es_terrain/src/lib.rs

//! Erosim 地形数据层
//!
//! 提供栅格数据、计算域几何与单元参数矩阵：
//!
//! - [`raster`]: 带无数据标记的 R×C 栅格
//! - [`domain`]: 计算域几何（范围、单元尺寸、活动单元掩膜）
//! - [`params`]: 模拟所需的单元参数矩阵集合
//!
//! 所有结构在模拟开始前构建完成，积分过程中只读。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod params;
pub mod raster;

pub use domain::DomainGeometry;
pub use params::ParameterSet;
pub use raster::RasterData;
