// crates/es_config/src/run_config.rs

//! RunConfig - 模拟运行配置（全 f64）
//!
//! 定义一次径流模拟的全部运行参数。配置文件的加载属于外部协作方，
//! 本层只定义取值类型、JSON 线格式与校验规则。

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 模拟运行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// 时间控制
    #[serde(default)]
    pub time: TimeConfig,

    /// 过程开关
    #[serde(default)]
    pub processes: ProcessConfig,

    /// 物理常数与数值参数
    #[serde(default)]
    pub constants: ConstantsConfig,
}

/// 时间控制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// 模拟总时长 [s]
    #[serde(default = "default_end_time")]
    pub end_time: f64,

    /// 最大时间步长 [s]
    #[serde(default = "default_max_dt")]
    pub max_dt: f64,

    /// 最小时间步长 [s]
    #[serde(default = "default_min_dt")]
    pub min_dt: f64,
}

fn default_end_time() -> f64 {
    3600.0
}
fn default_max_dt() -> f64 {
    30.0
}
fn default_min_dt() -> f64 {
    1e-3
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            end_time: default_end_time(),
            max_dt: default_max_dt(),
            min_dt: default_min_dt(),
        }
    }
}

/// 过程开关配置
///
/// 对应计算类型：仅片流 / 片流+细沟 / 片流+细沟+河道。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// 是否启用细沟流转换
    #[serde(default = "default_true")]
    pub rill: bool,

    /// 是否启用河道汇流
    #[serde(default = "default_true")]
    pub stream: bool,

    /// 是否使用多流向分配（false = D8 单流向）
    #[serde(default)]
    pub multi_flow: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            rill: true,
            stream: true,
            multi_flow: false,
        }
    }
}

/// 物理常数与数值参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantsConfig {
    /// 重力加速度 [m/s²]
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    /// 水密度 [kg/m³]
    #[serde(default = "default_water_density")]
    pub water_density: f64,

    /// 单步最大出流体积分数（类 Courant 数）
    #[serde(default = "default_courant_max")]
    pub courant_max: f64,

    /// 坡度修正指数 y（aa = a·slope^y）
    #[serde(default = "default_slope_exponent")]
    pub slope_exponent: f64,

    /// 平地临界水深常量 [m]（坡度为零时细沟永不形成）
    #[serde(default = "default_flat_hcrit")]
    pub flat_critical_depth: f64,

    /// 干单元水深阈值 [m]
    #[serde(default = "default_h_dry")]
    pub h_dry: f64,
}

fn default_gravity() -> f64 {
    9.81
}
fn default_water_density() -> f64 {
    1000.0
}
fn default_courant_max() -> f64 {
    0.6
}
fn default_slope_exponent() -> f64 {
    0.5
}
fn default_flat_hcrit() -> f64 {
    1000.0
}
fn default_h_dry() -> f64 {
    1e-9
}

impl Default for ConstantsConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            water_density: default_water_density(),
            courant_max: default_courant_max(),
            slope_exponent: default_slope_exponent(),
            flat_critical_depth: default_flat_hcrit(),
            h_dry: default_h_dry(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            time: TimeConfig::default(),
            processes: ProcessConfig::default(),
            constants: ConstantsConfig::default(),
        }
    }
}

impl RunConfig {
    /// 从 JSON 字符串解析并校验
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 校验配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time.end_time > 0.0) {
            return Err(ConfigError::invalid_value(
                "time.end_time",
                self.time.end_time,
                "模拟时长必须为正",
            ));
        }
        if !(self.time.max_dt > 0.0) || self.time.max_dt > self.time.end_time {
            return Err(ConfigError::invalid_value(
                "time.max_dt",
                self.time.max_dt,
                "最大步长必须为正且不超过模拟时长",
            ));
        }
        if !(self.time.min_dt > 0.0) || self.time.min_dt > self.time.max_dt {
            return Err(ConfigError::invalid_value(
                "time.min_dt",
                self.time.min_dt,
                "最小步长必须为正且不超过最大步长",
            ));
        }
        if !(self.constants.courant_max > 0.0) || self.constants.courant_max > 1.0 {
            return Err(ConfigError::invalid_value(
                "constants.courant_max",
                self.constants.courant_max,
                "必须在 (0, 1] 范围内",
            ));
        }
        if !(self.constants.gravity > 0.0) {
            return Err(ConfigError::invalid_value(
                "constants.gravity",
                self.constants.gravity,
                "重力必须为正",
            ));
        }
        if !(self.constants.water_density > 0.0) {
            return Err(ConfigError::invalid_value(
                "constants.water_density",
                self.constants.water_density,
                "密度必须为正",
            ));
        }
        if !(self.constants.slope_exponent >= 0.0) {
            return Err(ConfigError::invalid_value(
                "constants.slope_exponent",
                self.constants.slope_exponent,
                "不能为负",
            ));
        }
        if !(self.constants.flat_critical_depth > 0.0) {
            return Err(ConfigError::invalid_value(
                "constants.flat_critical_depth",
                self.constants.flat_critical_depth,
                "必须为正",
            ));
        }
        if !(self.constants.h_dry >= 0.0) {
            return Err(ConfigError::invalid_value(
                "constants.h_dry",
                self.constants.h_dry,
                "不能为负",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.processes.rill);
        assert!(config.processes.stream);
        assert!(!config.processes.multi_flow);
    }

    #[test]
    fn test_invalid_end_time() {
        let mut config = RunConfig::default();
        config.time.end_time = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_dt_above_end_time() {
        let mut config = RunConfig::default();
        config.time.end_time = 10.0;
        config.time.max_dt = 20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_courant() {
        let mut config = RunConfig::default();
        config.constants.courant_max = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = RunConfig::default();
        let json = config.to_json().unwrap();
        let parsed = RunConfig::from_json(&json).unwrap();
        assert_eq!(parsed.time.end_time, config.time.end_time);
        assert_eq!(parsed.processes.multi_flow, config.processes.multi_flow);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed = RunConfig::from_json(r#"{"time": {"end_time": 600.0}}"#).unwrap();
        assert_eq!(parsed.time.end_time, 600.0);
        assert_eq!(parsed.time.max_dt, 30.0);
    }
}
