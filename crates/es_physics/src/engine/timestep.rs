// crates/es_physics/src/engine/timestep.rs

//! 时间步长控制
//!
//! 提供基于单元特征长度与最大流速的自适应步长控制：
//!
//! $$ \Delta t \leq C \cdot \frac{\Delta x_{min}}{v_{max}} $$
//!
//! ## 特性
//!
//! - 步长上下限约束
//! - 稳定步计数驱动的自适应增长
//! - 稳定性违例时按收缩因子回退

use es_config::RunConfig;

/// 静止判定流速阈值 [m/s]
const MIN_VELOCITY: f64 = 1e-12;

/// 时间步长控制器
#[derive(Debug, Clone)]
pub struct TimeStepController {
    /// Courant 数
    cfl: f64,
    /// 最小时间步长
    dt_min: f64,
    /// 最大时间步长
    dt_max: f64,
    /// 网格最小特征长度
    dx_min: f64,
    /// 当前时间步长
    current_dt: f64,
    /// 增长因子
    growth_factor: f64,
    /// 收缩因子
    shrink_factor: f64,
    /// 最大允许增长因子
    max_growth_factor: f64,
    /// 连续稳定步数
    stable_steps: usize,
    /// 稳定增长阈值
    stable_growth_threshold: usize,
    /// 是否启用自适应增长
    adaptive_growth: bool,
}

impl TimeStepController {
    /// 创建控制器
    pub fn new(config: &RunConfig, dx_min: f64) -> Self {
        Self {
            cfl: config.constants.courant_max,
            dt_min: config.time.min_dt,
            dt_max: config.time.max_dt,
            dx_min,
            current_dt: config.time.max_dt,
            growth_factor: 1.1,
            shrink_factor: 0.5,
            max_growth_factor: 1.5,
            stable_steps: 0,
            stable_growth_threshold: 10,
            adaptive_growth: true,
        }
    }

    /// 获取当前时间步长
    #[inline]
    pub fn current_dt(&self) -> f64 {
        self.current_dt
    }

    /// 用剩余模拟时长约束步长
    ///
    /// 步长不超过最大步长与到结束时刻的剩余时间。
    #[inline]
    pub fn bounded(&self, remaining: f64) -> f64 {
        self.current_dt.min(remaining)
    }

    /// 从本步最大流速更新下一步步长
    pub fn update_from_max_velocity(&mut self, max_velocity: f64) -> f64 {
        let suggested = if max_velocity < MIN_VELOCITY {
            self.dt_max
        } else {
            (self.cfl * self.dx_min / max_velocity).clamp(self.dt_min, self.dt_max)
        };

        let growth = if self.adaptive_growth {
            self.compute_adaptive_growth()
        } else {
            self.growth_factor
        };

        let grown = self.current_dt * growth;
        let new_dt = suggested.min(grown);

        if new_dt >= self.current_dt * 0.95 {
            self.stable_steps += 1;
        } else {
            self.stable_steps = 0;
        }

        self.current_dt = new_dt.clamp(self.dt_min, self.dt_max);
        self.current_dt
    }

    /// 计算自适应增长因子
    fn compute_adaptive_growth(&self) -> f64 {
        if self.stable_steps >= self.stable_growth_threshold {
            // 长期稳定，允许更大增长
            self.growth_factor.min(self.max_growth_factor)
        } else if self.stable_steps >= self.stable_growth_threshold / 2 {
            // 中等稳定
            self.growth_factor
        } else {
            // 不稳定，保守增长
            1.0 + (self.growth_factor - 1.0) * 0.5
        }
    }

    /// 收缩时间步长（稳定性违例时调用）
    pub fn shrink(&mut self) {
        self.current_dt = (self.current_dt * self.shrink_factor).max(self.dt_min);
        self.stable_steps = 0;
    }

    /// 设置时间步长（手动覆盖）
    pub fn set_dt(&mut self, dt: f64) {
        self.current_dt = dt.clamp(self.dt_min, self.dt_max);
        self.stable_steps = 0;
    }

    /// 启用/禁用自适应增长
    pub fn set_adaptive_growth(&mut self, enabled: bool) {
        self.adaptive_growth = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> TimeStepController {
        TimeStepController::new(&RunConfig::default(), 10.0)
    }

    #[test]
    fn test_initial_dt_is_max() {
        let c = controller();
        assert_eq!(c.current_dt(), 30.0);
    }

    #[test]
    fn test_static_water_keeps_max_dt() {
        let mut c = controller();
        let dt = c.update_from_max_velocity(0.0);
        assert_eq!(dt, 30.0);
    }

    #[test]
    fn test_velocity_bounds_dt() {
        let mut c = controller();
        // dt = cfl·dx/v = 0.6·10/2 = 3.0
        let dt = c.update_from_max_velocity(2.0);
        assert!((dt - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_shrink_resets_stability() {
        let mut c = controller();
        c.update_from_max_velocity(0.0);
        assert!(c.stable_steps > 0);
        c.shrink();
        assert_eq!(c.stable_steps, 0);
        assert_eq!(c.current_dt(), 15.0);
    }

    #[test]
    fn test_growth_is_limited() {
        let mut c = controller();
        c.set_dt(1.0);
        // 流速极小，建议值为 dt_max，但增长受因子限制
        let dt = c.update_from_max_velocity(1e-15);
        assert!(dt <= 1.0 * 1.5 + 1e-12);
        assert!(dt > 1.0);
    }

    #[test]
    fn test_bounded_by_remaining() {
        let c = controller();
        assert_eq!(c.bounded(5.0), 5.0);
        assert_eq!(c.bounded(100.0), 30.0);
    }

    #[test]
    fn test_dt_floor() {
        let mut c = controller();
        for _ in 0..100 {
            c.shrink();
        }
        assert!(c.current_dt() >= RunConfig::default().time.min_dt);
    }
}
