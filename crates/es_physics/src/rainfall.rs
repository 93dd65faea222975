// crates/es_physics/src/rainfall.rs

//! 降雨过程线
//!
//! 有序的（时间偏移, 雨强）序列，雨强在相邻断点之间保持常量。
//! 最后一个断点之后雨强保持其取值，因此序列约定以零强度断点收尾。

use crate::error::{RunoffError, RunoffResult};
use serde::{Deserialize, Serialize};

/// 过程线断点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RainPoint {
    /// 时间偏移 [s]
    pub time: f64,
    /// 雨强 [m/s]
    pub intensity: f64,
}

/// 降雨过程线（分段常量雨强）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hyetograph {
    points: Vec<RainPoint>,
}

impl Hyetograph {
    /// 从（时间, 雨强）序列构建
    ///
    /// 时间必须严格递增且非负，雨强必须非负且有限。
    pub fn from_points(pairs: &[(f64, f64)]) -> RunoffResult<Self> {
        if pairs.is_empty() {
            return Err(RunoffError::data_preparation("rainfall series is empty"));
        }
        let mut points = Vec::with_capacity(pairs.len());
        let mut prev_time = f64::NEG_INFINITY;
        for &(time, intensity) in pairs {
            if !time.is_finite() || time < 0.0 {
                return Err(RunoffError::data_preparation(format!(
                    "rainfall time offset {} is invalid",
                    time
                )));
            }
            if time <= prev_time {
                return Err(RunoffError::data_preparation(format!(
                    "rainfall time offsets must be strictly increasing (got {} after {})",
                    time, prev_time
                )));
            }
            if !intensity.is_finite() || intensity < 0.0 {
                return Err(RunoffError::data_preparation(format!(
                    "rainfall intensity {} at t={} is invalid",
                    intensity, time
                )));
            }
            points.push(RainPoint { time, intensity });
            prev_time = time;
        }
        Ok(Self { points })
    }

    /// 无降雨过程线
    pub fn none() -> Self {
        Self {
            points: vec![RainPoint {
                time: 0.0,
                intensity: 0.0,
            }],
        }
    }

    /// 断点列表
    pub fn points(&self) -> &[RainPoint] {
        &self.points
    }

    /// t 时刻的雨强 [m/s]
    ///
    /// 第一个断点之前为 0，最后一个断点之后保持末值。
    pub fn intensity_at(&self, t: f64) -> f64 {
        if t < self.points[0].time {
            return 0.0;
        }
        let mut current = self.points[0].intensity;
        for p in &self.points {
            if p.time <= t {
                current = p.intensity;
            } else {
                break;
            }
        }
        current
    }

    /// 区间 [t0, t1) 内的降雨深度 [m]
    ///
    /// 跨断点的步长按分段积分，保证步长切分不影响总量。
    pub fn depth_between(&self, t0: f64, t1: f64) -> f64 {
        if t1 <= t0 {
            return 0.0;
        }
        let mut depth = 0.0;
        let mut t = t0;
        while t < t1 {
            // 找到当前段的结束时刻
            let mut seg_end = t1;
            for p in &self.points {
                if p.time > t {
                    seg_end = seg_end.min(p.time);
                    break;
                }
            }
            depth += self.intensity_at(t) * (seg_end - t);
            t = seg_end;
        }
        depth
    }
}
