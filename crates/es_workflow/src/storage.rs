// crates/es_workflow/src/storage.rs

//! 预处理输入的持久化
//!
//! 数据准备与径流计算是两阶段工作流：准备阶段产出的中间状态带有
//! 显式格式版本号，版本不匹配时显式失败，绝不静默加载过期数据。

use es_config::RunConfig;
use es_physics::stream::ReachDefinition;
use es_physics::SolverInputs;
use es_terrain::{DomainGeometry, ParameterSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// 当前中间状态格式版本
pub const PREPARED_FORMAT_VERSION: u32 = 3;

/// 存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 格式版本不匹配
    #[error("prepared data format version {found} does not match expected {expected}")]
    VersionMismatch {
        /// 文件中的版本
        found: u32,
        /// 期望版本
        expected: u32,
    },
}

/// 预处理输入（带版本号的中间状态）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedInputs {
    /// 格式版本号
    pub format_version: u32,
    /// 计算域几何
    pub geometry: DomainGeometry,
    /// 单元参数矩阵
    pub params: ParameterSet,
    /// 入渗参数表 (k, s)
    pub groups: Vec<(f64, f64)>,
    /// 降雨序列
    pub rainfall: Vec<(f64, f64)>,
    /// 河段定义
    pub reaches: Vec<ReachDefinition>,
    /// 运行配置
    pub config: RunConfig,
}

impl PreparedInputs {
    /// 以当前格式版本打包
    pub fn new(
        geometry: DomainGeometry,
        params: ParameterSet,
        groups: Vec<(f64, f64)>,
        rainfall: Vec<(f64, f64)>,
        reaches: Vec<ReachDefinition>,
        config: RunConfig,
    ) -> Self {
        Self {
            format_version: PREPARED_FORMAT_VERSION,
            geometry,
            params,
            groups,
            rainfall,
            reaches,
            config,
        }
    }

    /// 拆解为求解器输入与运行配置
    pub fn into_solver_inputs(self) -> (SolverInputs, RunConfig) {
        (
            SolverInputs {
                geometry: self.geometry,
                params: self.params,
                groups: self.groups,
                rainfall: self.rainfall,
                reaches: self.reaches,
            },
            self.config,
        )
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// 从 JSON 字符串加载并检查版本
    pub fn from_json(content: &str) -> Result<Self, StorageError> {
        let prepared: PreparedInputs = serde_json::from_str(content)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if prepared.format_version != PREPARED_FORMAT_VERSION {
            return Err(StorageError::VersionMismatch {
                found: prepared.format_version,
                expected: PREPARED_FORMAT_VERSION,
            });
        }
        Ok(prepared)
    }

    /// 保存到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let content = self.to_json()?;
        std::fs::write(path.as_ref(), content)?;
        tracing::info!("Prepared inputs stored in <{}>", path.as_ref().display());
        Ok(())
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }
}
