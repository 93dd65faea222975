// crates/es_config/src/lib.rs

//! Erosim 配置层
//!
//! 定义一次径流模拟的运行配置取值与校验规则。
//! 配置文件的定位与读取属于外部协作方，本层不做文件 IO。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod run_config;

pub use error::ConfigError;
pub use run_config::{ConstantsConfig, ProcessConfig, RunConfig, TimeConfig};
