// crates/es_physics/src/error.rs

//! 物理引擎错误类型
//!
//! 在基础层错误之上扩展径流计算特有的失败类别。
//! 所有失败都会中止整次运行，引擎内部不做重试。

use es_foundation::error::EsError;
use thiserror::Error;

/// 物理引擎结果类型
pub type RunoffResult<T> = Result<T, RunoffError>;

/// 径流计算错误
#[derive(Debug, Error)]
pub enum RunoffError {
    /// 运行配置错误（进入主循环前暴露）
    #[error("configuration error: {0}")]
    Config(#[from] es_config::ConfigError),

    /// 输入数据准备错误（进入主循环前暴露）
    #[error("data preparation failed: {message}")]
    DataPreparation {
        /// 具体错误信息
        message: String,
    },

    /// 负水深不变量被破坏
    ///
    /// 入渗在负的可用水深上被调用，说明上游核算存在缺陷，
    /// 不是可恢复的输入问题。
    #[error("negative water level at step {step}: min depth {min:.3e} m")]
    NegativeWaterLevel {
        /// 发生违例的时间步
        step: u64,
        /// 检测到的最小水深
        min: f64,
    },

    /// 河段结果一致性错误
    ///
    /// 同一河段归并出多个不同的累计值，说明汇流逻辑存在缺陷；
    /// 绝不允许静默取其一。
    #[error("reach table inconsistency: {message}")]
    Consistency {
        /// 具体错误信息
        message: String,
    },

    /// 基础层错误
    #[error(transparent)]
    Foundation(#[from] EsError),
}

impl RunoffError {
    /// 数据准备错误便捷构造
    pub fn data_preparation(message: impl Into<String>) -> Self {
        Self::DataPreparation {
            message: message.into(),
        }
    }

    /// 一致性错误便捷构造
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RunoffError::NegativeWaterLevel { step: 7, min: -0.01 };
        let msg = err.to_string();
        assert!(msg.contains("step 7"));
        assert!(msg.contains("negative water level"));
    }

    #[test]
    fn test_from_foundation() {
        let err: RunoffError = EsError::validation("bad grid").into();
        assert!(matches!(err, RunoffError::Foundation(_)));
    }
}
