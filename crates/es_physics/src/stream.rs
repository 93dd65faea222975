// crates/es_physics/src/stream.rs

//! 河段汇流器
//!
//! 每个河段接收由坡面单元汇入的侧向入流，按梯形断面的
//! Manning 水深-流量关系出流。一个时间步内河段彼此独立；
//! 如需河网演算，须按自上游向下游的拓扑顺序处理。
//!
//! 河段累计出流体积与洪峰流量以标量状态维护。结果表构建时
//! 对每个河段记录的样本做归并：同一河段出现多个不同取值说明
//! 汇流逻辑存在缺陷，必须报一致性错误，绝不静默取其一。

use crate::error::{RunoffError, RunoffResult};
use es_foundation::error::EsError;
use serde::{Deserialize, Serialize};

/// 河段定义
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReachDefinition {
    /// 河段编号
    pub segment_id: u32,
    /// 底宽 b [m]
    pub width: f64,
    /// 边坡系数 m [-]
    pub side_slope: f64,
    /// Manning 糙率
    pub roughness: f64,
    /// 河床坡度 [-]
    pub bed_slope: f64,
    /// 基流 q365 [m³/s]
    pub q365: f64,
    /// 河段长度 [m]
    pub length: f64,
}

/// 河段运行状态
#[derive(Debug, Clone)]
pub struct ReachState {
    /// 河段定义
    pub def: ReachDefinition,
    /// 蓄水体积 [m³]
    pub volume: f64,
    /// 水深 [m]
    pub depth: f64,
    /// 累计出流体积 [m³]
    pub v_out_cum: f64,
    /// 洪峰流量 [m³/s]
    pub q_max: f64,
}

/// 河道网络
#[derive(Debug, Clone)]
pub struct ChannelNetwork {
    reaches: Vec<ReachState>,
}

impl ChannelNetwork {
    /// 从河段定义构建
    pub fn new(defs: Vec<ReachDefinition>) -> RunoffResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for def in &defs {
            if !seen.insert(def.segment_id) {
                return Err(RunoffError::data_preparation(format!(
                    "duplicate reach segment id {}",
                    def.segment_id
                )));
            }
            if !(def.width > 0.0) {
                return Err(RunoffError::data_preparation(format!(
                    "reach {}: width {} must be positive",
                    def.segment_id, def.width
                )));
            }
            if !(def.side_slope >= 0.0) {
                return Err(RunoffError::data_preparation(format!(
                    "reach {}: side slope {} must be non-negative",
                    def.segment_id, def.side_slope
                )));
            }
            if !(def.roughness > 0.0) {
                return Err(RunoffError::data_preparation(format!(
                    "reach {}: roughness {} must be positive",
                    def.segment_id, def.roughness
                )));
            }
            if !(def.bed_slope >= 0.0) {
                return Err(RunoffError::data_preparation(format!(
                    "reach {}: bed slope {} must be non-negative",
                    def.segment_id, def.bed_slope
                )));
            }
            if !(def.q365 >= 0.0) {
                return Err(RunoffError::data_preparation(format!(
                    "reach {}: baseflow {} must be non-negative",
                    def.segment_id, def.q365
                )));
            }
            if !(def.length > 0.0) {
                return Err(RunoffError::data_preparation(format!(
                    "reach {}: length {} must be positive",
                    def.segment_id, def.length
                )));
            }
        }

        Ok(Self {
            reaches: defs
                .into_iter()
                .map(|def| ReachState {
                    def,
                    volume: 0.0,
                    depth: 0.0,
                    v_out_cum: 0.0,
                    q_max: 0.0,
                })
                .collect(),
        })
    }

    /// 河段数
    #[inline]
    pub fn len(&self) -> usize {
        self.reaches.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reaches.is_empty()
    }

    /// 河段状态列表
    #[inline]
    pub fn reaches(&self) -> &[ReachState] {
        &self.reaches
    }

    /// 执行一个汇流步
    ///
    /// `lateral` 为各河段本步接收的侧向入流体积 [m³]。
    /// 出流体积不超过蓄水体积，不足部分顺延到下一步。
    pub fn route_step(&mut self, lateral: &[f64], dt: f64) -> RunoffResult<()> {
        EsError::check_size("reach lateral inflow", self.reaches.len(), lateral.len())?;

        for (reach, &inflow) in self.reaches.iter_mut().zip(lateral.iter()) {
            reach.volume += inflow;
            reach.depth = depth_from_volume(&reach.def, reach.volume);
            let q = trapezoid_discharge(&reach.def, reach.depth);
            let out = (q * dt).min(reach.volume);
            reach.volume -= out;
            reach.v_out_cum += out;
            let q_eff = out / dt;
            if q_eff > reach.q_max {
                reach.q_max = q_eff;
            }
        }
        Ok(())
    }
}

/// 由蓄水体积反求梯形断面水深
///
/// 单位长度过水面积 A = V/L 满足 m·h² + b·h = A。
fn depth_from_volume(def: &ReachDefinition, volume: f64) -> f64 {
    if volume <= 0.0 {
        return 0.0;
    }
    let area = volume / def.length;
    if def.side_slope > 0.0 {
        let b = def.width;
        let m = def.side_slope;
        ((b * b + 4.0 * m * area).sqrt() - b) / (2.0 * m)
    } else {
        area / def.width
    }
}

/// 梯形断面 Manning 流量（叠加基流）
fn trapezoid_discharge(def: &ReachDefinition, depth: f64) -> f64 {
    if depth <= 0.0 {
        return def.q365;
    }
    let b = def.width;
    let m = def.side_slope;
    let area = depth * (b + m * depth);
    let wetted = b + 2.0 * depth * (1.0 + m * m).sqrt();
    let radius = area / wetted;
    let q = area * radius.powf(2.0 / 3.0) * def.bed_slope.sqrt() / def.roughness;
    q + def.q365
}

// ========================================================================
// 结果表
// ========================================================================

/// 河段结果表一行
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReachRow {
    /// 河段编号
    pub segment_id: u32,
    /// 底宽 [m]
    pub width: f64,
    /// 边坡系数 [-]
    pub side_slope: f64,
    /// Manning 糙率
    pub roughness: f64,
    /// 基流 [m³/s]
    pub q365: f64,
    /// 累计出流体积 [m³]
    pub v_out_cum: f64,
    /// 洪峰流量 [m³/s]
    pub q_max: f64,
}

/// 河段结果表（每河段一行）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachTable {
    /// 行集合
    pub rows: Vec<ReachRow>,
}

/// 按河段收集的结果样本
///
/// 每个河道单元在收尾时记录其所属河段的累计值；正确的汇流实现
/// 对同一河段只会产生一个不同取值。
#[derive(Debug, Clone, Default)]
pub struct ReachSamples {
    /// 累计出流体积样本
    pub volume: Vec<Vec<f64>>,
    /// 洪峰流量样本
    pub peak: Vec<Vec<f64>>,
}

impl ReachSamples {
    /// 按河段数创建空样本集
    pub fn new(n_reaches: usize) -> Self {
        Self {
            volume: vec![Vec::new(); n_reaches],
            peak: vec![Vec::new(); n_reaches],
        }
    }

    /// 为河段追加一个样本
    pub fn push(&mut self, reach_idx: usize, v_out_cum: f64, q_max: f64) {
        self.volume[reach_idx].push(v_out_cum);
        self.peak[reach_idx].push(q_max);
    }
}

/// 把河段样本归并为单一标量
///
/// 样本之间按精确相等比较；出现一个以上不同取值时报一致性错误。
pub fn reduce_samples(kind: &str, segment_id: u32, samples: &[f64]) -> RunoffResult<f64> {
    let first = match samples.first() {
        Some(&v) => v,
        None => {
            return Err(RunoffError::consistency(format!(
                "reach {}: no {} samples recorded",
                segment_id, kind
            )))
        }
    };
    for &v in &samples[1..] {
        if v != first {
            return Err(RunoffError::consistency(format!(
                "reach {}: multiple distinct {} values recorded ({} and {})",
                segment_id, kind, first, v
            )));
        }
    }
    Ok(first)
}

impl ReachTable {
    /// 从河段状态与记录样本构建结果表
    ///
    /// 无样本的河段（未被任何单元引用）直接采用其标量状态。
    pub fn build(network: &ChannelNetwork, samples: &ReachSamples) -> RunoffResult<Self> {
        EsError::check_size("reach volume samples", network.len(), samples.volume.len())?;
        EsError::check_size("reach peak samples", network.len(), samples.peak.len())?;

        let mut rows = Vec::with_capacity(network.len());
        for (idx, reach) in network.reaches().iter().enumerate() {
            let def = &reach.def;
            let v_out_cum = if samples.volume[idx].is_empty() {
                reach.v_out_cum
            } else {
                reduce_samples("cumulative volume", def.segment_id, &samples.volume[idx])?
            };
            let q_max = if samples.peak[idx].is_empty() {
                reach.q_max
            } else {
                reduce_samples("peak discharge", def.segment_id, &samples.peak[idx])?
            };
            rows.push(ReachRow {
                segment_id: def.segment_id,
                width: def.width,
                side_slope: def.side_slope,
                roughness: def.roughness,
                q365: def.q365,
                v_out_cum,
                q_max,
            });
        }
        Ok(Self { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> ReachDefinition {
        ReachDefinition {
            segment_id: 1,
            width: 2.0,
            side_slope: 1.5,
            roughness: 0.035,
            bed_slope: 0.01,
            q365: 0.0,
            length: 100.0,
        }
    }

    #[test]
    fn test_validation() {
        let mut bad = def();
        bad.width = 0.0;
        assert!(ChannelNetwork::new(vec![bad]).is_err());

        let duplicated = vec![def(), def()];
        assert!(ChannelNetwork::new(duplicated).is_err());

        assert!(ChannelNetwork::new(vec![def()]).is_ok());
    }

    #[test]
    fn test_depth_from_volume_round_trip() {
        let d = def();
        // 已知水深构造体积，再反求
        let h = 0.4;
        let area = h * (d.width + d.side_slope * h);
        let volume = area * d.length;
        let h_back = depth_from_volume(&d, volume);
        assert!((h_back - h).abs() < 1e-12);
    }

    #[test]
    fn test_rectangular_section() {
        let mut d = def();
        d.side_slope = 0.0;
        let volume = 0.3 * d.width * d.length;
        assert!((depth_from_volume(&d, volume) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_route_step_caps_outflow() {
        let mut net = ChannelNetwork::new(vec![def()]).unwrap();
        // 大步长下出流不超过蓄水
        net.route_step(&[50.0], 1e6).unwrap();
        let reach = &net.reaches()[0];
        assert!(reach.volume >= 0.0);
        assert!((reach.v_out_cum + reach.volume - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_route_step_tracks_peak() {
        let mut net = ChannelNetwork::new(vec![def()]).unwrap();
        net.route_step(&[10.0], 60.0).unwrap();
        let q1 = net.reaches()[0].q_max;
        net.route_step(&[100.0], 60.0).unwrap();
        let q2 = net.reaches()[0].q_max;
        assert!(q2 >= q1);
        assert!(q2 > 0.0);
    }

    #[test]
    fn test_lateral_size_mismatch() {
        let mut net = ChannelNetwork::new(vec![def()]).unwrap();
        assert!(net.route_step(&[1.0, 2.0], 60.0).is_err());
    }

    #[test]
    fn test_reduce_samples_identical() {
        let v = reduce_samples("cumulative volume", 1, &[12.5, 12.5, 12.5]).unwrap();
        assert_eq!(v, 12.5);
    }

    #[test]
    fn test_reduce_samples_distinct_fails() {
        let err = reduce_samples("cumulative volume", 1, &[12.5, 13.0]).unwrap_err();
        assert!(matches!(err, RunoffError::Consistency { .. }));
    }

    #[test]
    fn test_table_build() {
        let mut net = ChannelNetwork::new(vec![def()]).unwrap();
        net.route_step(&[10.0], 60.0).unwrap();
        let v = net.reaches()[0].v_out_cum;
        let q = net.reaches()[0].q_max;

        let mut samples = ReachSamples::new(1);
        samples.push(0, v, q);
        samples.push(0, v, q);

        let table = ReachTable::build(&net, &samples).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].v_out_cum, v);
        assert_eq!(table.rows[0].q_max, q);

        // 注入不一致样本必须失败
        samples.push(0, v + 1.0, q);
        assert!(ReachTable::build(&net, &samples).is_err());
    }
}
