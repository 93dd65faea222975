// crates/es_physics/src/cumulative.rs

//! 时间积分累计量与收尾输出
//!
//! 运行开始时创建，逐步累计各通量，运行结束后一次性收尾。
//! 收尾计算是最终状态的纯函数：对同一最终状态重复调用得到
//! 逐位相同的结果。
//!
//! 收支闭合（逐单元，单位 m³）：
//!
//! `balance = (降雨 + 汇入) − (入渗 + 出流) − 滞留 − 剩余蓄水`
//!
//! 最终状态为河道的单元从收支栅格中剔除（置无数据值），其水量
//! 由河段结果表核算。

use crate::state::{FlowRegime, SurfaceState};
use es_foundation::KahanSum;
use es_terrain::{DomainGeometry, RasterData};

/// 输出类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    /// 主输出
    Primary,
    /// 诊断/控制输出
    Control,
}

/// 命名输出栅格
#[derive(Debug, Clone)]
pub struct OutputGrid {
    /// 输出名
    pub name: String,
    /// 输出类别
    pub category: OutputCategory,
    /// 栅格数据
    pub data: RasterData,
}

/// 时间积分累计量
///
/// 体积类字段单位 m³，深度类 m，流量类 m³/s，剪切应力 Pa。
#[derive(Debug, Clone)]
pub struct CumulativeState {
    cell_area: f64,
    /// 降雨体积
    pub precipitation: RasterData,
    /// 上坡汇入体积
    pub inflow: RasterData,
    /// 入渗体积
    pub infiltration: RasterData,
    /// 表面滞留体积
    pub sur_ret: RasterData,
    /// 片流出流体积
    pub vol_sheet: RasterData,
    /// 细沟出流体积
    pub vol_rill: RasterData,
    /// 片流最大流量
    pub q_sheet_max: RasterData,
    /// 细沟最大流量
    pub q_rill_max: RasterData,
    /// 地表最大总流量
    pub q_sur_max: RasterData,
    /// 最大总水深
    pub h_sur_max: RasterData,
    /// 最大细沟水深
    pub h_rill_max: RasterData,
    /// 最大片流流速
    pub v_sheet_max: RasterData,
    /// 最大片流剪切应力
    pub shear_sheet_max: RasterData,
}

/// 全域质量累计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MassTotals {
    /// 降雨体积 [m³]
    pub precipitation: f64,
    /// 汇入体积 [m³]
    pub inflow: f64,
    /// 入渗体积 [m³]
    pub infiltration: f64,
    /// 滞留体积 [m³]
    pub retention: f64,
    /// 出流体积 [m³]
    pub outflow: f64,
}

impl CumulativeState {
    /// 创建零值累计量
    pub fn new(geometry: &DomainGeometry) -> Self {
        let zeros = || {
            RasterData::filled(geometry.rows(), geometry.cols(), geometry.nodata(), 0.0)
        };
        Self {
            cell_area: geometry.cell_area(),
            precipitation: zeros(),
            inflow: zeros(),
            infiltration: zeros(),
            sur_ret: zeros(),
            vol_sheet: zeros(),
            vol_rill: zeros(),
            q_sheet_max: zeros(),
            q_rill_max: zeros(),
            q_sur_max: zeros(),
            h_sur_max: zeros(),
            h_rill_max: zeros(),
            v_sheet_max: zeros(),
            shear_sheet_max: zeros(),
        }
    }

    /// 单元面积 [m²]
    #[inline]
    pub fn cell_area(&self) -> f64 {
        self.cell_area
    }

    /// 更新最大值栅格
    #[inline]
    pub fn record_max(grid: &mut RasterData, idx: usize, value: f64) {
        if value > grid.at(idx) {
            grid.set_at(idx, value);
        }
    }

    /// 累加栅格值
    #[inline]
    pub fn add(grid: &mut RasterData, idx: usize, value: f64) {
        let v = grid.at(idx);
        grid.set_at(idx, v + value);
    }

    /// 全域质量累计（Kahan 补偿求和）
    pub fn totals(&self, geometry: &DomainGeometry) -> MassTotals {
        let mut precipitation = KahanSum::new();
        let mut inflow = KahanSum::new();
        let mut infiltration = KahanSum::new();
        let mut retention = KahanSum::new();
        let mut outflow = KahanSum::new();
        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            precipitation.add(self.precipitation.at(idx));
            inflow.add(self.inflow.at(idx));
            infiltration.add(self.infiltration.at(idx));
            retention.add(self.sur_ret.at(idx));
            outflow.add(self.vol_sheet.at(idx) + self.vol_rill.at(idx));
        }
        MassTotals {
            precipitation: precipitation.value(),
            inflow: inflow.value(),
            infiltration: infiltration.value(),
            retention: retention.value(),
            outflow: outflow.value(),
        }
    }

    /// 逐单元收支闭合栅格 [m³]
    ///
    /// 河道单元置无数据值。
    pub fn mass_balance(
        &self,
        geometry: &DomainGeometry,
        state: &SurfaceState,
    ) -> RasterData {
        let mut balance =
            RasterData::new(geometry.rows(), geometry.cols(), geometry.nodata());
        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            if state.regime[idx] == FlowRegime::Channel {
                continue;
            }
            let rest = state.h[idx] * self.cell_area;
            let value = (self.precipitation.at(idx) + self.inflow.at(idx))
                - (self.infiltration.at(idx)
                    + self.vol_sheet.at(idx)
                    + self.vol_rill.at(idx))
                - self.sur_ret.at(idx)
                - rest;
            balance.set_at(idx, value);
        }
        balance
    }

    /// 剩余蓄水体积栅格 [m³]（河道单元置无数据值）
    pub fn volume_rest(
        &self,
        geometry: &DomainGeometry,
        state: &SurfaceState,
    ) -> RasterData {
        let mut rest = RasterData::new(geometry.rows(), geometry.cols(), geometry.nodata());
        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            if state.regime[idx] == FlowRegime::Channel {
                continue;
            }
            rest.set_at(idx, state.h[idx] * self.cell_area);
        }
        rest
    }

    /// 最终流态编码栅格
    pub fn surface_state_grid(
        geometry: &DomainGeometry,
        state: &SurfaceState,
    ) -> RasterData {
        let mut grid = RasterData::new(geometry.rows(), geometry.cols(), geometry.nodata());
        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            grid.set_at(idx, state.regime[idx].code());
        }
        grid
    }

    /// 收尾：生成全部命名输出栅格
    ///
    /// 体积类主输出中降雨、入渗与滞留换算为水深 [m]，与输入雨量
    /// 同量纲；活动区域之外统一置无数据值。
    pub fn output_grids(
        &self,
        geometry: &DomainGeometry,
        state: &SurfaceState,
    ) -> Vec<OutputGrid> {
        let area = self.cell_area;
        let mask = |data: &RasterData| {
            data.masked_by(|row, col| geometry.is_active(row, col))
        };
        let to_depth = |data: &RasterData| {
            let mut out = data.clone();
            for v in out.data.iter_mut() {
                *v /= area;
            }
            out
        };
        let sum_of = |a: &RasterData, b: &RasterData| {
            let mut out = a.clone();
            for (v, w) in out.data.iter_mut().zip(b.data.iter()) {
                *v += *w;
            }
            out
        };

        let grid = |name: &str, category, data: RasterData| OutputGrid {
            name: name.to_string(),
            category,
            data,
        };

        vec![
            // 主输出
            grid(
                "infiltration",
                OutputCategory::Primary,
                mask(&to_depth(&self.infiltration)),
            ),
            grid(
                "precipitation",
                OutputCategory::Primary,
                mask(&to_depth(&self.precipitation)),
            ),
            grid("v_sheet", OutputCategory::Primary, mask(&self.v_sheet_max)),
            grid(
                "shear_sheet",
                OutputCategory::Primary,
                mask(&self.shear_sheet_max),
            ),
            grid("q_sur_tot", OutputCategory::Primary, mask(&self.q_sur_max)),
            grid(
                "vol_sur_tot",
                OutputCategory::Primary,
                mask(&sum_of(&self.vol_sheet, &self.vol_rill)),
            ),
            // 诊断/控制输出
            grid("h_sur_tot", OutputCategory::Control, mask(&self.h_sur_max)),
            grid(
                "q_sheet_tot",
                OutputCategory::Control,
                mask(&self.q_sheet_max),
            ),
            grid("vol_sheet", OutputCategory::Control, mask(&self.vol_sheet)),
            grid("h_rill", OutputCategory::Control, mask(&self.h_rill_max)),
            grid(
                "q_rill_tot",
                OutputCategory::Control,
                mask(&self.q_rill_max),
            ),
            grid("vol_rill", OutputCategory::Control, mask(&self.vol_rill)),
            grid("inflow_sur", OutputCategory::Control, mask(&self.inflow)),
            grid(
                "sur_ret",
                OutputCategory::Control,
                mask(&to_depth(&self.sur_ret)),
            ),
            grid(
                "massbalance",
                OutputCategory::Control,
                self.mass_balance(geometry, state),
            ),
            grid(
                "volrest_m3",
                OutputCategory::Control,
                self.volume_rest(geometry, state),
            ),
            grid(
                "surfacestate",
                OutputCategory::Control,
                Self::surface_state_grid(geometry, state),
            ),
        ]
    }
}
