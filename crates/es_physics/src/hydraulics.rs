// crates/es_physics/src/hydraulics.rs

//! 水力参数构建器
//!
//! 从坡度、阻力系数与流态转换参数推导单元的坡度修正阻力系数
//! `aa = a·slope^y` 与临界水深。
//!
//! 临界水深取三个相互独立估计的最小值（先达到哪个判据就在哪个
//! 判据处转换流态）：
//!
//! - 临界剪切应力: `h_tau = τ_c / (ρ·g·S)`
//! - 临界流速:     `h_v = (v_c / aa)^(1/(b−1))`（片流流速 v = aa·h^(b−1)）
//! - 临界单宽功率: `h_p = (τ_c·v_c / (ρ·g·S·aa))^(1/b)`（功率 = 剪切×流速）
//!
//! 退化情形：坡度为零时取固定大值（平地永不转入细沟）。
//! 无数据传播：坡度或剪切参数为无数据值时三个估计与组合值皆为无数据值。

use es_terrain::{DomainGeometry, RasterData};

/// 临界水深推导用常数
#[derive(Debug, Clone, Copy)]
pub struct HydraulicConstants {
    /// 水密度 [kg/m³]
    pub rho: f64,
    /// 重力加速度 [m/s²]
    pub gravity: f64,
    /// 平地临界水深常量 [m]
    pub flat_hcrit: f64,
}

impl Default for HydraulicConstants {
    fn default() -> Self {
        Self {
            rho: 1000.0,
            gravity: 9.81,
            flat_hcrit: 1000.0,
        }
    }
}

/// 推导坡度修正阻力系数 aa = a·slope^y
///
/// a 或坡度为无数据值时结果为无数据值。
pub fn derive_aa(
    geometry: &DomainGeometry,
    a: &RasterData,
    slope: &RasterData,
    y: f64,
) -> RasterData {
    let mut aa = RasterData::new(geometry.rows(), geometry.cols(), geometry.nodata());
    for &(row, col) in geometry.active_cells() {
        let idx = geometry.index(row, col);
        let a_v = a.at(idx);
        let s_v = slope.at(idx);
        if a.is_nodata(a_v) || slope.is_nodata(s_v) {
            continue;
        }
        aa.set_at(idx, a_v * s_v.powf(y));
    }
    aa
}

/// 单元临界水深（三判据最小值）
///
/// 返回 `None` 表示无数据（坡度或剪切参数缺失）。
pub fn critical_depth(
    slope: f64,
    aa: f64,
    b: f64,
    tau_crit: f64,
    v_crit: f64,
    constants: &HydraulicConstants,
) -> Option<f64> {
    if slope == 0.0 {
        return Some(constants.flat_hcrit);
    }
    // aa ≤ 0 或 b 退化为 1 时流速判据失去深度依赖，回退平地常量
    if aa <= 0.0 || (b - 1.0).abs() < 1e-9 {
        return Some(constants.flat_hcrit);
    }

    let rho_g_s = constants.rho * constants.gravity * slope;
    let h_tau = tau_crit / rho_g_s;
    let h_v = (v_crit / aa).powf(1.0 / (b - 1.0));
    let h_power = (tau_crit * v_crit / (rho_g_s * aa)).powf(1.0 / b);

    Some(h_tau.min(h_v).min(h_power))
}

/// 构建临界水深栅格
pub fn critical_depth_grid(
    geometry: &DomainGeometry,
    slope: &RasterData,
    aa: &RasterData,
    b: &RasterData,
    tau_crit: &RasterData,
    v_crit: &RasterData,
    constants: &HydraulicConstants,
) -> RasterData {
    let mut hcrit = RasterData::new(geometry.rows(), geometry.cols(), geometry.nodata());
    for &(row, col) in geometry.active_cells() {
        let idx = geometry.index(row, col);
        let s_v = slope.at(idx);
        let tau_v = tau_crit.at(idx);
        // 无数据传播：坡度或剪切参数缺失时组合值保持无数据
        if slope.is_nodata(s_v) || tau_crit.is_nodata(tau_v) {
            continue;
        }
        let aa_v = aa.at(idx);
        let b_v = b.at(idx);
        let vc_v = v_crit.at(idx);
        if aa.is_nodata(aa_v) || b.is_nodata(b_v) || v_crit.is_nodata(vc_v) {
            continue;
        }
        if let Some(h) = critical_depth(s_v, aa_v, b_v, tau_v, vc_v, constants) {
            hcrit.set_at(idx, h);
        }
    }
    hcrit
}
