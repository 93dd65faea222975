// crates/es_physics/tests/mass_conservation.rs

//! 质量守恒验证测试
//!
//! 全面检验引擎在降雨-入渗-坡面汇流-河段汇流全链路上的
//! 收支闭合性能。
//!
//! # 测试覆盖
//!
//! - 逐单元收支闭合
//! - 全域水量核算（降雨 = 入渗 + 滞留 + 蓄水 + 边界出流 + 河段）
//! - 坡面-河段交接量一致性
//! - 收尾计算幂等性
//! - 入渗与平地情景（与规格场景一致）

use es_config::RunConfig;
use es_physics::infiltration::philip_capacity;
use es_physics::stream::ReachDefinition;
use es_physics::{FlowRegime, RunoffSolver, SolverInputs};
use es_terrain::{DomainGeometry, ParameterSet, RasterData};

// ============================================================================
// 测试辅助函数
// ============================================================================

const NODATA: f64 = -9999.0;

/// 构造向东排水的坡面，最东一列为河道
///
/// 所有坡面单元 D8 向东；列 `cols-1` 的单元分配给河段 0。
fn hillslope_with_channel(rows: usize, cols: usize) -> SolverInputs {
    let geometry = DomainGeometry::fully_active(rows, cols, 2.0, 2.0, NODATA).unwrap();
    let mut params = ParameterSet::allocate(&geometry);
    params.slope.fill(0.05);
    params.a.fill(5.0);
    params.b.fill(1.5);
    params.n.fill(0.04);
    params.retention.fill(0.001);
    params.tau_crit.fill(4.0);
    params.v_crit.fill(0.4);
    params.inf_group.fill(0.0);
    params.flow_dir.fill(1.0); // 东
    for row in 0..rows {
        // 高程向东降低，供多流向测试复用
        for col in 0..cols {
            params.dem.set(row, col, 10.0 - col as f64);
        }
        params.reach_id.set(row, cols - 1, 0.0);
    }

    SolverInputs {
        geometry,
        params,
        groups: vec![(2e-5, 1e-3)],
        rainfall: vec![(0.0, 1e-5), (600.0, 0.0)],
        reaches: vec![ReachDefinition {
            segment_id: 1,
            width: 1.5,
            side_slope: 1.0,
            roughness: 0.035,
            bed_slope: 0.01,
            q365: 0.0,
            length: 2.0 * rows as f64,
        }],
    }
}

fn short_run_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.time.end_time = 600.0;
    config.time.max_dt = 10.0;
    config
}

fn run_to_end(solver: &mut RunoffSolver) {
    while !solver.is_finished() {
        solver.advance().expect("step failed");
    }
}

/// 栅格有效像元求和
fn grid_sum(grid: &RasterData) -> f64 {
    grid.data
        .iter()
        .filter(|&&v| !grid.is_nodata(v))
        .sum::<f64>()
}

// ============================================================================
// 逐单元收支闭合
// ============================================================================

#[test]
fn test_per_cell_balance_closes() {
    let inputs = hillslope_with_channel(3, 4);
    let mut solver = RunoffSolver::new(inputs, short_run_config()).unwrap();
    run_to_end(&mut solver);

    let output = solver.finalize().unwrap();
    let balance = output
        .grids
        .iter()
        .find(|g| g.name == "massbalance")
        .expect("massbalance grid missing");

    for &v in &balance.data.data {
        if balance.data.is_nodata(v) {
            continue;
        }
        assert!(v.abs() < 1e-9, "收支闭合失败: 残差 {:.3e} m³", v);
    }
}

#[test]
fn test_channel_cells_excluded_from_balance() {
    let inputs = hillslope_with_channel(2, 3);
    let mut solver = RunoffSolver::new(inputs, short_run_config()).unwrap();
    run_to_end(&mut solver);

    let output = solver.finalize().unwrap();
    let balance = output
        .grids
        .iter()
        .find(|g| g.name == "massbalance")
        .unwrap();

    // 最东一列是河道，收支栅格中应为无数据值
    for row in 0..2 {
        let v = balance.data.get(row, 2).unwrap();
        assert!(balance.data.is_nodata(v), "河道单元未被剔除: {}", v);
    }
    // 坡面单元保留有效值
    let v = balance.data.get(0, 0).unwrap();
    assert!(!balance.data.is_nodata(v));
}

// ============================================================================
// 全域水量核算
// ============================================================================

#[test]
fn test_global_water_accounting() {
    let inputs = hillslope_with_channel(3, 4);
    let mut solver = RunoffSolver::new(inputs, short_run_config()).unwrap();
    run_to_end(&mut solver);

    let output = solver.finalize().unwrap();
    let totals = output.totals;

    let rest = grid_sum(
        &output
            .grids
            .iter()
            .find(|g| g.name == "volrest_m3")
            .unwrap()
            .data,
    );
    let reach_water: f64 = solver
        .network()
        .unwrap()
        .reaches()
        .iter()
        .map(|r| r.volume + r.v_out_cum)
        .sum();

    // 每立方米降雨最终去向：入渗、滞留、坡面蓄水、边界出流或河段
    let accounted = totals.infiltration
        + totals.retention
        + rest
        + output.boundary_outflow
        + reach_water;
    let residual = (totals.precipitation - accounted).abs();
    assert!(
        residual < 1e-9 * totals.precipitation.max(1.0),
        "全域核算失败: 降雨 {:.6e}, 去向合计 {:.6e}, 残差 {:.3e}",
        totals.precipitation,
        accounted,
        residual
    );
    assert!(totals.precipitation > 0.0);
    assert!(totals.infiltration > 0.0);
}

#[test]
fn test_overland_to_reach_handover() {
    let inputs = hillslope_with_channel(3, 4);
    let geometry = inputs.geometry.clone();
    let area = geometry.cell_area();
    let mut solver = RunoffSolver::new(inputs, short_run_config()).unwrap();
    run_to_end(&mut solver);

    let output = solver.finalize().unwrap();

    // 紧邻河道的一列（col = 2）向东的全部出流都交给河段；
    // 河段收到的水量 = 该列出流 + 河道单元自身降雨
    let vol_sur_tot = &output
        .grids
        .iter()
        .find(|g| g.name == "vol_sur_tot")
        .unwrap()
        .data;
    let mut handover = 0.0;
    for row in 0..3 {
        handover += vol_sur_tot.get(row, 2).unwrap();
    }
    let precipitation = &output
        .grids
        .iter()
        .find(|g| g.name == "precipitation")
        .unwrap()
        .data;
    let mut channel_rain = 0.0;
    for row in 0..3 {
        // 主输出中的降雨为水深 [m]，换算回体积
        channel_rain += precipitation.get(row, 3).unwrap() * area;
    }

    let reach_water: f64 = solver
        .network()
        .unwrap()
        .reaches()
        .iter()
        .map(|r| r.volume + r.v_out_cum)
        .sum();

    let expected = handover + channel_rain;
    assert!(
        (reach_water - expected).abs() < 1e-9 * expected.max(1.0),
        "河段交接失败: 期望 {:.6e}, 实际 {:.6e}",
        expected,
        reach_water
    );
}

// ============================================================================
// 收尾幂等性
// ============================================================================

#[test]
fn test_finalize_is_idempotent() {
    let inputs = hillslope_with_channel(2, 3);
    let mut solver = RunoffSolver::new(inputs, short_run_config()).unwrap();
    run_to_end(&mut solver);

    let first = solver.finalize().unwrap();
    let second = solver.finalize().unwrap();

    for (a, b) in first.grids.iter().zip(second.grids.iter()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.data.data, b.data.data, "栅格 {} 两次收尾不一致", a.name);
    }
    let t1 = first.reach_table.unwrap();
    let t2 = second.reach_table.unwrap();
    assert_eq!(t1.rows.len(), t2.rows.len());
    for (r1, r2) in t1.rows.iter().zip(t2.rows.iter()) {
        assert_eq!(r1.v_out_cum, r2.v_out_cum);
        assert_eq!(r1.q_max, r2.q_max);
    }
}

// ============================================================================
// 规格场景
// ============================================================================

#[test]
fn test_single_cell_infiltration_scenario() {
    // 单元无出流（洼地），一步 60 s，降雨形成 0.02 m 水深
    let geometry = DomainGeometry::fully_active(1, 1, 1.0, 1.0, NODATA).unwrap();
    let mut params = ParameterSet::allocate(&geometry);
    params.slope.fill(0.05);
    params.a.fill(5.0);
    params.b.fill(1.5);
    params.n.fill(0.04);
    params.retention.fill(0.0);
    params.tau_crit.fill(4.0);
    params.v_crit.fill(0.4);
    params.inf_group.fill(0.0);
    params.flow_dir.fill(0.0); // 无出流

    let inputs = SolverInputs {
        geometry,
        params,
        groups: vec![(2e-5, 1e-3)],
        rainfall: vec![(0.0, 0.02 / 60.0), (60.0, 0.0)],
        reaches: Vec::new(),
    };

    let mut config = RunConfig::default();
    config.time.end_time = 60.0;
    config.time.max_dt = 60.0;

    let mut solver = RunoffSolver::new(inputs, config).unwrap();
    let report = solver.advance().unwrap();
    assert_eq!(report.steps, 1);
    assert!(solver.is_finished());

    let capacity = philip_capacity(2e-5, 1e-3, 0.0, 60.0, NODATA);
    let expected_inf = capacity.min(0.02);

    let output = solver.finalize().unwrap();
    let infiltration = &output
        .grids
        .iter()
        .find(|g| g.name == "infiltration")
        .unwrap()
        .data;
    assert!((infiltration.at(0) - expected_inf).abs() < 1e-12);
    // 剩余水深 = 降雨 − 入渗
    assert!((solver.state().h[0] - (0.02 - expected_inf)).abs() < 1e-12);
}

#[test]
fn test_zero_slope_cell_stays_sheet() {
    let geometry = DomainGeometry::fully_active(1, 1, 1.0, 1.0, NODATA).unwrap();
    let mut params = ParameterSet::allocate(&geometry);
    params.slope.fill(0.0); // 平地
    params.a.fill(5.0);
    params.b.fill(1.5);
    params.n.fill(0.04);
    params.retention.fill(0.0);
    params.tau_crit.fill(4.0);
    params.v_crit.fill(0.4);
    params.inf_group.fill(0.0);
    params.flow_dir.fill(0.0);

    let inputs = SolverInputs {
        geometry,
        params,
        groups: vec![(0.0, 0.0)],
        // 强降雨蓄出远超常规临界水深的水量
        rainfall: vec![(0.0, 0.01), (600.0, 0.0)],
        reaches: Vec::new(),
    };

    let mut config = RunConfig::default();
    config.time.end_time = 600.0;
    config.time.max_dt = 10.0;

    let mut solver = RunoffSolver::new(inputs, config).unwrap();
    run_to_end(&mut solver);

    // 平地临界水深取固定大值，无论蓄水多深流态保持片流
    assert!(solver.state().h[0] > 1.0);
    assert_eq!(solver.state().regime[0], FlowRegime::Sheet);
}
