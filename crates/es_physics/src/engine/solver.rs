// crates/es_physics/src/engine/solver.rs

//! 径流求解器
//!
//! 组织一个时间步内的过程调用顺序：
//! 降雨 → 表面滞留 → 入渗 → 坡面汇流 → 河段汇流 → 累计。
//!
//! 求解器在整个运行期间独占持有全部栅格与累计量；一个步要么
//! 完整提交，要么完全不提交。协作式取消与进度上报由外层运行器
//! 在步边界处完成。

use tracing::{debug, info};

use crate::cumulative::{CumulativeState, MassTotals, OutputGrid};
use crate::engine::timestep::TimeStepController;
use crate::error::{RunoffError, RunoffResult};
use crate::hydraulics::{self, HydraulicConstants};
use crate::infiltration::PhilipInfiltration;
use crate::rainfall::Hyetograph;
use crate::routing::OverlandRouter;
use crate::state::SurfaceState;
use crate::stream::{ChannelNetwork, ReachDefinition, ReachSamples, ReachTable};
use es_config::RunConfig;
use es_terrain::{DomainGeometry, ParameterSet};

/// 求解器输入（由外部数据准备方提供）
#[derive(Debug, Clone)]
pub struct SolverInputs {
    /// 计算域几何
    pub geometry: DomainGeometry,
    /// 单元参数矩阵
    pub params: ParameterSet,
    /// 按组编号索引的入渗参数表 (k, s)
    pub groups: Vec<(f64, f64)>,
    /// 降雨序列（时间偏移, 雨强）
    pub rainfall: Vec<(f64, f64)>,
    /// 河段定义
    pub reaches: Vec<ReachDefinition>,
}

/// 单步执行报告
#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    /// 本步步长 [s]
    pub dt: f64,
    /// 步后模拟时刻 [s]
    pub time: f64,
    /// 已完成步数
    pub steps: u64,
    /// 本步最大流速 [m/s]
    pub max_velocity: f64,
    /// 是否触发稳定性限幅
    pub capped: bool,
}

/// 运行输出（交由外部写出方消费）
#[derive(Debug, Clone)]
pub struct RunoffOutput {
    /// 命名输出栅格
    pub grids: Vec<OutputGrid>,
    /// 河段结果表（未启用河道汇流时为空）
    pub reach_table: Option<ReachTable>,
    /// 全域质量累计
    pub totals: MassTotals,
    /// 流出计算域边界的体积 [m³]
    pub boundary_outflow: f64,
    /// 总步数
    pub steps: u64,
    /// 模拟时长 [s]
    pub simulated_time: f64,
}

/// 径流求解器
#[derive(Debug)]
pub struct RunoffSolver {
    geometry: DomainGeometry,
    params: ParameterSet,
    config: RunConfig,
    infiltration: PhilipInfiltration,
    rainfall: Hyetograph,
    network: Option<ChannelNetwork>,
    router: OverlandRouter,
    controller: TimeStepController,
    state: SurfaceState,
    cumulative: CumulativeState,
    /// 入渗步的逐单元结果缓冲
    inf_buffer: Vec<f64>,
    time: f64,
    steps: u64,
    boundary_outflow: f64,
}

impl RunoffSolver {
    /// 构建求解器
    ///
    /// 所有配置与输入数据校验在此完成；任何失败都在主循环开始前
    /// 暴露，不产生部分状态。
    pub fn new(inputs: SolverInputs, config: RunConfig) -> RunoffResult<Self> {
        config.validate()?;

        let SolverInputs {
            geometry,
            mut params,
            groups,
            rainfall,
            reaches,
        } = inputs;

        params
            .validate(&geometry)
            .map_err(|e| RunoffError::data_preparation(e.to_string()))?;

        let rainfall = if rainfall.is_empty() {
            Hyetograph::none()
        } else {
            Hyetograph::from_points(&rainfall)?
        };

        let infiltration = PhilipInfiltration::from_table(&groups, geometry.nodata())?;

        // 未启用河道汇流时清除河段分配，所有单元按坡面处理
        if !config.processes.stream {
            params.reach_id.fill(geometry.nodata());
        }
        let network = if config.processes.stream && !reaches.is_empty() {
            Some(ChannelNetwork::new(reaches)?)
        } else {
            None
        };

        // 水力参数构建：补齐 aa 与临界水深
        let constants = HydraulicConstants {
            rho: config.constants.water_density,
            gravity: config.constants.gravity,
            flat_hcrit: config.constants.flat_critical_depth,
        };
        let derived_aa = hydraulics::derive_aa(
            &geometry,
            &params.a,
            &params.slope,
            config.constants.slope_exponent,
        );
        for idx in 0..params.aa.len() {
            if params.aa.is_nodata(params.aa.at(idx)) {
                params.aa.set_at(idx, derived_aa.at(idx));
            }
        }
        let derived_hcrit = hydraulics::critical_depth_grid(
            &geometry,
            &params.slope,
            &params.aa,
            &params.b,
            &params.tau_crit,
            &params.v_crit,
            &constants,
        );
        for idx in 0..params.hcrit.len() {
            if params.hcrit.is_nodata(params.hcrit.at(idx)) {
                params.hcrit.set_at(idx, derived_hcrit.at(idx));
            }
        }

        // 组编号与河段编号的一致性校验
        let n_groups = infiltration.n_groups();
        let n_reaches = network.as_ref().map(|n| n.len()).unwrap_or(0);
        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            if let Some(group) = params.group_at(idx) {
                if group >= n_groups {
                    return Err(RunoffError::data_preparation(format!(
                        "cell ({}, {}) references infiltration group {} of {}",
                        row, col, group, n_groups
                    )));
                }
            }
            if let Some(reach) = params.reach_at(idx) {
                if reach >= n_reaches {
                    return Err(RunoffError::data_preparation(format!(
                        "cell ({}, {}) references reach {} of {}",
                        row, col, reach, n_reaches
                    )));
                }
            }
        }

        let state = SurfaceState::new(&geometry, &params);
        let cumulative = CumulativeState::new(&geometry);
        let router = OverlandRouter::new(&config);
        let dx_min = geometry.dx().min(geometry.dy());
        let controller = TimeStepController::new(&config, dx_min);
        let n_cells = geometry.n_cells();

        info!(
            "runoff solver ready: {} active cells, {} infiltration groups, {} reaches",
            geometry.n_active(),
            n_groups,
            n_reaches
        );

        Ok(Self {
            geometry,
            params,
            config,
            infiltration,
            rainfall,
            network,
            router,
            controller,
            state,
            cumulative,
            inf_buffer: vec![0.0; n_cells],
            time: 0.0,
            steps: 0,
            boundary_outflow: 0.0,
        })
    }

    /// 当前模拟时刻 [s]
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// 已完成步数
    #[inline]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// 是否到达配置的结束时刻
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.time >= self.config.time.end_time
    }

    /// 进度百分比 [0, 100]
    #[inline]
    pub fn progress(&self) -> f64 {
        (self.time / self.config.time.end_time * 100.0).clamp(0.0, 100.0)
    }

    /// 地表状态（只读）
    #[inline]
    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    /// 累计量（只读）
    #[inline]
    pub fn cumulative(&self) -> &CumulativeState {
        &self.cumulative
    }

    /// 河道网络（只读）
    #[inline]
    pub fn network(&self) -> Option<&ChannelNetwork> {
        self.network.as_ref()
    }

    /// 执行一个时间步
    ///
    /// 过程顺序：降雨 → 滞留 → 入渗 → 坡面汇流 → 河段汇流。
    pub fn advance(&mut self) -> RunoffResult<StepReport> {
        let remaining = self.config.time.end_time - self.time;
        debug_assert!(remaining > 0.0);
        let dt = self.controller.bounded(remaining);
        let area = self.geometry.cell_area();
        let n_reaches = self.network.as_ref().map(|n| n.len()).unwrap_or(0);
        let mut lateral_seed = vec![0.0; n_reaches];

        // 降雨（空间均匀过程线）
        let rain_depth = self.rainfall.depth_between(self.time, self.time + dt);
        if rain_depth > 0.0 {
            for &(row, col) in self.geometry.active_cells() {
                let idx = self.geometry.index(row, col);
                self.state.h[idx] += rain_depth;
                CumulativeState::add(
                    &mut self.cumulative.precipitation,
                    idx,
                    rain_depth * area,
                );
            }
        }

        // 河道单元的水量整体移交所属河段
        for &(row, col) in self.geometry.active_cells() {
            let idx = self.geometry.index(row, col);
            if !self.state.is_channel[idx] || self.state.h[idx] <= 0.0 {
                continue;
            }
            if let Some(reach) = self.params.reach_at(idx) {
                lateral_seed[reach] += self.state.h[idx] * area;
                self.state.h[idx] = 0.0;
            }
        }

        // 表面滞留先于产流
        for &(row, col) in self.geometry.active_cells() {
            let idx = self.geometry.index(row, col);
            if self.state.is_channel[idx] {
                continue;
            }
            let take = self.state.h[idx].min(self.state.ret_remaining[idx]);
            if take > 0.0 {
                self.state.h[idx] -= take;
                self.state.ret_remaining[idx] -= take;
                CumulativeState::add(&mut self.cumulative.sur_ret, idx, take * area);
            }
        }

        // 入渗
        self.infiltration.step(
            &self.geometry,
            &self.params.inf_group,
            &mut self.state.h,
            &self.state.is_channel,
            self.time,
            dt,
            self.steps,
            &mut self.inf_buffer,
        )?;
        for &(row, col) in self.geometry.active_cells() {
            let idx = self.geometry.index(row, col);
            let inf = self.inf_buffer[idx];
            if inf > 0.0 {
                CumulativeState::add(&mut self.cumulative.infiltration, idx, inf * area);
            }
        }

        // 坡面汇流
        let fluxes = self.router.step(
            &self.geometry,
            &self.params,
            &mut self.state,
            n_reaches,
            dt,
            &mut self.cumulative,
        )?;
        self.boundary_outflow += fluxes.boundary_outflow;

        // 河段汇流
        if let Some(network) = self.network.as_mut() {
            for (seed, routed) in lateral_seed.iter_mut().zip(fluxes.lateral.iter()) {
                *seed += routed;
            }
            network.route_step(&lateral_seed, dt)?;
        }

        // 步长自适应
        if fluxes.stability_capped {
            self.controller.shrink();
        } else {
            self.controller.update_from_max_velocity(fluxes.max_velocity);
        }

        self.time += dt;
        self.steps += 1;

        debug!(
            "step {} committed: t={:.2}s dt={:.3}s v_max={:.3e} m/s",
            self.steps, self.time, dt, fluxes.max_velocity
        );

        Ok(StepReport {
            dt,
            time: self.time,
            steps: self.steps,
            max_velocity: fluxes.max_velocity,
            capped: fluxes.stability_capped,
        })
    }

    /// 收尾并产出最终结果
    ///
    /// 最终状态的纯函数：不修改求解器，重复调用得到逐位相同的结果。
    pub fn finalize(&self) -> RunoffResult<RunoffOutput> {
        let grids = self.cumulative.output_grids(&self.geometry, &self.state);

        let reach_table = match self.network.as_ref() {
            Some(network) => {
                // 每个河道单元记录其所属河段的累计值，
                // 结果表构建时归并并校验一致性。
                let mut samples = ReachSamples::new(network.len());
                for &(row, col) in self.geometry.active_cells() {
                    let idx = self.geometry.index(row, col);
                    if !self.state.is_channel[idx] {
                        continue;
                    }
                    if let Some(reach_idx) = self.params.reach_at(idx) {
                        let reach = &network.reaches()[reach_idx];
                        samples.push(reach_idx, reach.v_out_cum, reach.q_max);
                    }
                }
                Some(ReachTable::build(network, &samples)?)
            }
            None => None,
        };

        Ok(RunoffOutput {
            grids,
            reach_table,
            totals: self.cumulative.totals(&self.geometry),
            boundary_outflow: self.boundary_outflow,
            steps: self.steps,
            simulated_time: self.time,
        })
    }
}
