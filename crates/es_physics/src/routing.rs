// crates/es_physics/src/routing.rs

//! 坡面汇流器（片流 / 细沟）
//!
//! 每个时间步分两遍执行：
//!
//! 1. 纯计算遍（可并行）：按当前水深计算每个单元的流态转换、
//!    出流量与接收单元；
//! 2. 应用遍（顺序、确定性）：提交全部增量。
//!
//! 两遍结构保证一个步要么对所有受影响单元完整提交，要么完全
//! 不提交；内部并行不改变外部行为与顺序。
//!
//! 质量守恒不变量：单元单步出流体积不超过其蓄水体积，不足部分
//! 顺延至下一步，绝不凭空产生或湮灭水量。

use rayon::prelude::*;

use crate::cumulative::CumulativeState;
use crate::error::{RunoffError, RunoffResult};
use crate::state::{FlowRegime, SurfaceState};
use es_config::RunConfig;
use es_terrain::{DomainGeometry, ParameterSet};

/// D8 流向编码对应的 (Δrow, Δcol) 偏移
///
/// 2 的幂编码：1=东, 2=东南, 4=南, 8=西南, 16=西, 32=西北, 64=北, 128=东北。
pub const D8_OFFSETS: [(u32, (isize, isize)); 8] = [
    (1, (0, 1)),
    (2, (1, 1)),
    (4, (1, 0)),
    (8, (1, -1)),
    (16, (0, -1)),
    (32, (-1, -1)),
    (64, (-1, 0)),
    (128, (-1, 1)),
];

/// D8 编码转偏移（0 或未知编码 = 无出流）
#[inline]
pub fn d8_offset(code: u32) -> Option<(isize, isize)> {
    D8_OFFSETS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, off)| *off)
}

/// 出流接收方
#[derive(Debug, Clone, PartialEq)]
enum Targets {
    /// 无出流（洼地或无流向）
    None,
    /// 流出计算域边界
    Boundary,
    /// 单一接收单元（D8）
    Single(usize),
    /// 多接收单元及权重（多流向，权重和为 1）
    Multi(Vec<(usize, f64)>),
}

/// 单元单步通量（纯计算遍的结果）
#[derive(Debug, Clone)]
struct CellFlux {
    idx: usize,
    to_rill: bool,
    h_before: f64,
    h_rill: f64,
    out_vol: f64,
    vol_sheet: f64,
    vol_rill: f64,
    q_sheet: f64,
    q_rill: f64,
    v_sheet: f64,
    v_rill: f64,
    shear: f64,
    stability_capped: bool,
    targets: Targets,
}

/// 坡面汇流步的汇总通量
#[derive(Debug, Clone)]
pub struct StepFluxes {
    /// 各河段侧向入流体积 [m³]
    pub lateral: Vec<f64>,
    /// 流出计算域边界的体积 [m³]
    pub boundary_outflow: f64,
    /// 本步最大流速 [m/s]（自适应步长用）
    pub max_velocity: f64,
    /// 是否触发稳定性限幅（出流需求超过允许的蓄水分数）
    pub stability_capped: bool,
}

/// 坡面汇流器
#[derive(Debug, Clone)]
pub struct OverlandRouter {
    multi_flow: bool,
    rill_enabled: bool,
    courant_max: f64,
    rho: f64,
    gravity: f64,
    h_dry: f64,
}

impl OverlandRouter {
    /// 按运行配置创建
    pub fn new(config: &RunConfig) -> Self {
        Self {
            multi_flow: config.processes.multi_flow,
            rill_enabled: config.processes.rill,
            courant_max: config.constants.courant_max,
            rho: config.constants.water_density,
            gravity: config.constants.gravity,
            h_dry: config.constants.h_dry,
        }
    }

    /// 执行一个坡面汇流步
    ///
    /// 返回的侧向入流按河段索引排列（长度 `n_reaches`）。
    pub fn step(
        &self,
        geometry: &DomainGeometry,
        params: &ParameterSet,
        state: &mut SurfaceState,
        n_reaches: usize,
        dt: f64,
        cumulative: &mut CumulativeState,
    ) -> RunoffResult<StepFluxes> {
        let area = geometry.cell_area();

        // 纯计算遍：逐活动单元求通量（并行，不修改状态）
        let fluxes: Vec<CellFlux> = geometry
            .active_cells()
            .par_iter()
            .filter_map(|&(row, col)| {
                let idx = geometry.index(row, col);
                if state.is_channel[idx] {
                    return None;
                }
                Some(self.cell_flux(geometry, params, state, row, col, idx, dt, area))
            })
            .collect();

        // 应用遍：按扫描顺序提交增量
        let mut lateral = vec![0.0; n_reaches];
        let mut boundary_outflow = 0.0;
        let mut max_velocity: f64 = 0.0;
        let mut stability_capped = false;

        for flux in &fluxes {
            let idx = flux.idx;
            if flux.to_rill {
                state.regime[idx] = FlowRegime::Rill;
            }
            max_velocity = max_velocity.max(flux.v_sheet).max(flux.v_rill);
            stability_capped |= flux.stability_capped;

            if flux.out_vol > 0.0 {
                state.h[idx] = (state.h[idx] - flux.out_vol / area).max(0.0);
                self.scatter(
                    geometry,
                    params,
                    state,
                    &mut lateral,
                    &mut boundary_outflow,
                    cumulative,
                    flux,
                )?;
            }

            CumulativeState::add(&mut cumulative.vol_sheet, idx, flux.vol_sheet);
            CumulativeState::add(&mut cumulative.vol_rill, idx, flux.vol_rill);
            CumulativeState::record_max(&mut cumulative.q_sheet_max, idx, flux.q_sheet);
            CumulativeState::record_max(&mut cumulative.q_rill_max, idx, flux.q_rill);
            CumulativeState::record_max(
                &mut cumulative.q_sur_max,
                idx,
                flux.q_sheet + flux.q_rill,
            );
            CumulativeState::record_max(&mut cumulative.h_sur_max, idx, flux.h_before);
            CumulativeState::record_max(&mut cumulative.h_rill_max, idx, flux.h_rill);
            CumulativeState::record_max(&mut cumulative.v_sheet_max, idx, flux.v_sheet);
            CumulativeState::record_max(&mut cumulative.shear_sheet_max, idx, flux.shear);
        }

        Ok(StepFluxes {
            lateral,
            boundary_outflow,
            max_velocity,
            stability_capped,
        })
    }

    /// 单元通量计算（纯函数）
    #[allow(clippy::too_many_arguments)]
    fn cell_flux(
        &self,
        geometry: &DomainGeometry,
        params: &ParameterSet,
        state: &SurfaceState,
        row: usize,
        col: usize,
        idx: usize,
        dt: f64,
        area: f64,
    ) -> CellFlux {
        let h = state.h[idx];
        let hcrit_raw = params.hcrit.at(idx);
        let hcrit = if params.hcrit.is_nodata(hcrit_raw) {
            f64::INFINITY
        } else {
            hcrit_raw
        };

        // 流态转换：超过临界水深即永久转入细沟
        let to_rill =
            self.rill_enabled && state.regime[idx] == FlowRegime::Sheet && h > hcrit;
        let in_rill = to_rill || state.regime[idx] == FlowRegime::Rill;

        let mut flux = CellFlux {
            idx,
            to_rill,
            h_before: h,
            h_rill: 0.0,
            out_vol: 0.0,
            vol_sheet: 0.0,
            vol_rill: 0.0,
            q_sheet: 0.0,
            q_rill: 0.0,
            v_sheet: 0.0,
            v_rill: 0.0,
            shear: 0.0,
            stability_capped: false,
            targets: Targets::None,
        };

        if h <= self.h_dry {
            return flux;
        }

        let slope = params.slope.at(idx);
        let aa = params.aa.at(idx);
        let b = params.b.at(idx);
        if params.slope.is_nodata(slope) || params.aa.is_nodata(aa) || params.b.is_nodata(b) {
            return flux;
        }

        let h_sheet = if in_rill { h.min(hcrit) } else { h };
        let h_rill = h - h_sheet;
        flux.h_rill = h_rill;

        // 片流：幂律水深-流量关系（单宽流量 × 有效过流宽度）
        if h_sheet > self.h_dry {
            let q_unit = aa * h_sheet.powf(b);
            flux.q_sheet = q_unit * geometry.dx();
            flux.v_sheet = aa * h_sheet.powf(b - 1.0);
            flux.shear = self.rho * self.gravity * h_sheet * slope;
        }

        // 细沟：宽浅断面 Manning 关系
        if h_rill > self.h_dry {
            let n = params.n.at(idx);
            if !params.n.is_nodata(n) && n > 0.0 {
                let v = h_rill.powf(2.0 / 3.0) * slope.sqrt() / n;
                flux.v_rill = v;
                flux.q_rill = v * h_rill * geometry.dx();
            }
        }

        let q_total = flux.q_sheet + flux.q_rill;
        if q_total <= 0.0 {
            return flux;
        }

        flux.targets = self.resolve_targets(geometry, params, row, col, idx);
        if flux.targets == Targets::None {
            // 洼地：无接收方，水量滞留原地
            flux.q_sheet = 0.0;
            flux.q_rill = 0.0;
            flux.v_sheet = 0.0;
            flux.v_rill = 0.0;
            return flux;
        }

        let available = h * area;
        let desired = q_total * dt;
        let out = desired.min(available);
        flux.stability_capped = desired > self.courant_max * available;
        flux.out_vol = out;
        flux.vol_sheet = out * flux.q_sheet / q_total;
        flux.vol_rill = out - flux.vol_sheet;
        flux
    }

    /// 确定出流接收方
    fn resolve_targets(
        &self,
        geometry: &DomainGeometry,
        params: &ParameterSet,
        row: usize,
        col: usize,
        idx: usize,
    ) -> Targets {
        if self.multi_flow {
            let z = params.dem.at(idx);
            if !params.dem.is_nodata(z) {
                let mut downslope: Vec<(usize, f64)> = Vec::new();
                let mut total = 0.0;
                for &(_, (dr, dc)) in &D8_OFFSETS {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;
                    if !geometry.contains(nr, nc)
                        || !geometry.is_active(nr as usize, nc as usize)
                    {
                        continue;
                    }
                    let nidx = geometry.index(nr as usize, nc as usize);
                    let zn = params.dem.at(nidx);
                    if params.dem.is_nodata(zn) || zn >= z {
                        continue;
                    }
                    let dist = ((dr as f64 * geometry.dy()).powi(2)
                        + (dc as f64 * geometry.dx()).powi(2))
                    .sqrt();
                    let drop = (z - zn) / dist;
                    downslope.push((nidx, drop));
                    total += drop;
                }
                if !downslope.is_empty() {
                    for target in downslope.iter_mut() {
                        target.1 /= total;
                    }
                    return Targets::Multi(downslope);
                }
                // 无域内下坡邻元：回退 D8 编码（可能指向域外）
            }
        }

        match d8_offset(params.flow_dir_at(idx)) {
            None => Targets::None,
            Some((dr, dc)) => {
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if !geometry.contains(nr, nc) || !geometry.is_active(nr as usize, nc as usize)
                {
                    Targets::Boundary
                } else {
                    Targets::Single(geometry.index(nr as usize, nc as usize))
                }
            }
        }
    }

    /// 把出流体积分配给接收方
    #[allow(clippy::too_many_arguments)]
    fn scatter(
        &self,
        geometry: &DomainGeometry,
        params: &ParameterSet,
        state: &mut SurfaceState,
        lateral: &mut [f64],
        boundary_outflow: &mut f64,
        cumulative: &mut CumulativeState,
        flux: &CellFlux,
    ) -> RunoffResult<()> {
        let area = geometry.cell_area();
        let mut deliver = |target: usize, volume: f64| -> RunoffResult<()> {
            if state.is_channel[target] {
                let reach = params.reach_at(target).ok_or_else(|| {
                    RunoffError::data_preparation(format!(
                        "channel cell {} has no reach assignment",
                        target
                    ))
                })?;
                lateral[reach] += volume;
            } else {
                state.h[target] += volume / area;
                CumulativeState::add(&mut cumulative.inflow, target, volume);
            }
            Ok(())
        };

        match &flux.targets {
            Targets::None => {}
            Targets::Boundary => *boundary_outflow += flux.out_vol,
            Targets::Single(target) => deliver(*target, flux.out_vol)?,
            Targets::Multi(targets) => {
                for &(target, weight) in targets {
                    deliver(target, flux.out_vol * weight)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use es_terrain::RasterData;

    fn config() -> RunConfig {
        RunConfig::default()
    }

    /// 1×3 南北向没有意义，用 1 行 3 列向东的串联坡面
    fn setup_eastward() -> (DomainGeometry, ParameterSet) {
        let g = DomainGeometry::fully_active(1, 3, 1.0, 1.0, -9999.0).unwrap();
        let mut p = ParameterSet::allocate(&g);
        p.slope.fill(0.05);
        p.a.fill(5.0);
        p.aa.fill(5.0 * 0.05_f64.powf(0.5));
        p.b.fill(1.5);
        p.n.fill(0.04);
        p.retention.fill(0.0);
        p.hcrit = RasterData::filled(1, 3, -9999.0, 0.5);
        p.flow_dir.fill(1.0); // 全部向东
        (g, p)
    }

    #[test]
    fn test_d8_offsets() {
        assert_eq!(d8_offset(1), Some((0, 1)));
        assert_eq!(d8_offset(4), Some((1, 0)));
        assert_eq!(d8_offset(64), Some((-1, 0)));
        assert_eq!(d8_offset(0), None);
        assert_eq!(d8_offset(3), None);
    }

    #[test]
    fn test_outflow_capped_by_available_volume() {
        let (g, p) = setup_eastward();
        let mut state = SurfaceState::new(&g, &p);
        state.h[0] = 0.01;
        let mut cum = CumulativeState::new(&g);
        let router = OverlandRouter::new(&config());

        // 极大步长迫使限幅
        let fluxes = router.step(&g, &p, &mut state, 0, 1e9, &mut cum).unwrap();
        assert!(fluxes.stability_capped);
        assert!(state.h[0] >= 0.0);
        // 总量守恒：起始水量全部仍在域内（单元 0 → 单元 1）
        let total: f64 = state.h.iter().sum::<f64>() + fluxes.boundary_outflow;
        assert!((total - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_outflow_at_edge() {
        let (g, p) = setup_eastward();
        let mut state = SurfaceState::new(&g, &p);
        state.h[2] = 0.01; // 最东侧单元向东出流即离开计算域
        let mut cum = CumulativeState::new(&g);
        let router = OverlandRouter::new(&config());

        let fluxes = router.step(&g, &p, &mut state, 0, 1e9, &mut cum).unwrap();
        assert!(fluxes.boundary_outflow > 0.0);
        assert!((state.h[2] + fluxes.boundary_outflow - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_rill_transition_is_permanent() {
        let (g, p) = setup_eastward();
        let mut state = SurfaceState::new(&g, &p);
        let mut cum = CumulativeState::new(&g);
        let router = OverlandRouter::new(&config());

        // 超过临界水深 0.5 m
        state.h[0] = 0.6;
        router.step(&g, &p, &mut state, 0, 1.0, &mut cum).unwrap();
        assert_eq!(state.regime[0], FlowRegime::Rill);

        // 水深降回临界以下后流态保持细沟
        state.h[0] = 0.01;
        router.step(&g, &p, &mut state, 0, 1.0, &mut cum).unwrap();
        assert_eq!(state.regime[0], FlowRegime::Rill);
    }

    #[test]
    fn test_no_transition_without_rill_process() {
        let (g, p) = setup_eastward();
        let mut cfg = config();
        cfg.processes.rill = false;
        let mut state = SurfaceState::new(&g, &p);
        let mut cum = CumulativeState::new(&g);
        let router = OverlandRouter::new(&cfg);

        state.h[0] = 0.6;
        router.step(&g, &p, &mut state, 0, 1.0, &mut cum).unwrap();
        assert_eq!(state.regime[0], FlowRegime::Sheet);
    }

    #[test]
    fn test_channel_cell_receives_into_reach() {
        let (g, mut p) = setup_eastward();
        p.reach_id.set_at(1, 0.0); // 中间单元是河道
        let mut state = SurfaceState::new(&g, &p);
        state.h[0] = 0.01;
        let mut cum = CumulativeState::new(&g);
        let router = OverlandRouter::new(&config());

        let fluxes = router.step(&g, &p, &mut state, 1, 1e9, &mut cum).unwrap();
        assert!(fluxes.lateral[0] > 0.0);
        // 汇入河段的体积等于单元 0 的出流体积
        assert!((fluxes.lateral[0] + state.h[0] * g.cell_area() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_multi_flow_splits_by_slope() {
        let g = DomainGeometry::fully_active(2, 2, 1.0, 1.0, -9999.0).unwrap();
        let mut p = ParameterSet::allocate(&g);
        p.slope.fill(0.05);
        p.aa.fill(1.0);
        p.b.fill(1.5);
        p.n.fill(0.04);
        p.hcrit = RasterData::filled(2, 2, -9999.0, 10.0);
        // (0,0) 最高，(0,1) 与 (1,0) 更低，(1,1) 最低
        p.dem = RasterData::from_data(vec![10.0, 9.0, 9.0, 8.0], 2, 2, -9999.0).unwrap();
        p.flow_dir.fill(0.0);

        let mut cfg = config();
        cfg.processes.multi_flow = true;
        let router = OverlandRouter::new(&cfg);

        let mut state = SurfaceState::new(&g, &p);
        state.h[0] = 0.01;
        let mut cum = CumulativeState::new(&g);
        let fluxes = router.step(&g, &p, &mut state, 0, 1e9, &mut cum).unwrap();

        // 全部三个下坡邻元都应得到水量，且总量守恒
        assert!(state.h[1] > 0.0);
        assert!(state.h[2] > 0.0);
        assert!(state.h[3] > 0.0);
        let total: f64 = state.h.iter().sum::<f64>() + fluxes.boundary_outflow;
        assert!((total - 0.01).abs() < 1e-12);
        // 对角邻元高差 2 m、距离 √2，坡降最大，权重应高于正交邻元
        assert!(state.h[3] > state.h[1]);
        assert!((state.h[1] - state.h[2]).abs() < 1e-15);
    }

    #[test]
    fn test_pit_cell_retains_water() {
        let (g, mut p) = setup_eastward();
        p.flow_dir.fill(0.0); // 无流向
        let mut state = SurfaceState::new(&g, &p);
        state.h[0] = 0.01;
        let mut cum = CumulativeState::new(&g);
        let router = OverlandRouter::new(&config());

        let fluxes = router.step(&g, &p, &mut state, 0, 60.0, &mut cum).unwrap();
        assert_eq!(state.h[0], 0.01);
        assert_eq!(fluxes.boundary_outflow, 0.0);
    }
}
