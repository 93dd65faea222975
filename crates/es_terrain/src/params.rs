// crates/es_terrain/src/params.rs

//! 单元参数矩阵集合
//!
//! 模拟开始前由数据准备方填充，积分过程中只读。
//! 每个矩阵与计算域同形，非活动单元保持无数据值。

use crate::domain::DomainGeometry;
use crate::raster::RasterData;
use es_foundation::error::{EsError, EsResult};
use serde::{Deserialize, Serialize};

/// 单元参数矩阵集合
///
/// `aa` 与 `hcrit` 由水力参数构建器在求解器初始化时填充，
/// 其余矩阵为外部输入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSet {
    /// 地形高程 [m]（多流向分配时使用）
    pub dem: RasterData,
    /// 坡度 [-]
    pub slope: RasterData,
    /// 片流阻力系数 a
    pub a: RasterData,
    /// 坡度修正阻力系数 aa = a·slope^y
    pub aa: RasterData,
    /// 水深-流量关系指数 b
    pub b: RasterData,
    /// Manning 糙率 n
    pub n: RasterData,
    /// 表面滞留容量 [m]
    pub retention: RasterData,
    /// 临界剪切应力 [Pa]
    pub tau_crit: RasterData,
    /// 临界流速 [m/s]
    pub v_crit: RasterData,
    /// 临界水深 [m]（由三个判据的最小值组合而来）
    pub hcrit: RasterData,
    /// D8 流向编码（2 的幂，1=东 … 128=东北；0 = 无出流）
    pub flow_dir: RasterData,
    /// 入渗参数组编号
    pub inf_group: RasterData,
    /// 河段编号（非河道单元为无数据值）
    pub reach_id: RasterData,
}

impl ParameterSet {
    /// 分配与计算域同形的参数矩阵，全部填充无数据值
    pub fn allocate(geometry: &DomainGeometry) -> Self {
        let alloc = || RasterData::new(geometry.rows(), geometry.cols(), geometry.nodata());
        Self {
            dem: alloc(),
            slope: alloc(),
            a: alloc(),
            aa: alloc(),
            b: alloc(),
            n: alloc(),
            retention: alloc(),
            tau_crit: alloc(),
            v_crit: alloc(),
            hcrit: alloc(),
            flow_dir: alloc(),
            inf_group: alloc(),
            reach_id: alloc(),
        }
    }

    /// 校验矩阵形状与活动单元上的取值
    ///
    /// `aa` 与 `hcrit` 在构建器运行前允许保持无数据值，不在此校验。
    pub fn validate(&self, geometry: &DomainGeometry) -> EsResult<()> {
        let n = geometry.n_cells();
        EsError::check_size("dem", n, self.dem.len())?;
        EsError::check_size("slope", n, self.slope.len())?;
        EsError::check_size("a", n, self.a.len())?;
        EsError::check_size("aa", n, self.aa.len())?;
        EsError::check_size("b", n, self.b.len())?;
        EsError::check_size("n", n, self.n.len())?;
        EsError::check_size("retention", n, self.retention.len())?;
        EsError::check_size("tau_crit", n, self.tau_crit.len())?;
        EsError::check_size("v_crit", n, self.v_crit.len())?;
        EsError::check_size("hcrit", n, self.hcrit.len())?;
        EsError::check_size("flow_dir", n, self.flow_dir.len())?;
        EsError::check_size("inf_group", n, self.inf_group.len())?;
        EsError::check_size("reach_id", n, self.reach_id.len())?;

        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            let slope = self.slope.at(idx);
            if !self.slope.is_nodata(slope) && !(slope.is_finite() && slope >= 0.0) {
                return Err(EsError::validation(format!(
                    "invalid slope {} at cell ({}, {})",
                    slope, row, col
                )));
            }
            let b = self.b.at(idx);
            if !self.b.is_nodata(b) && !(b.is_finite() && b > 0.0) {
                return Err(EsError::validation(format!(
                    "invalid exponent b {} at cell ({}, {})",
                    b, row, col
                )));
            }
            let mann = self.n.at(idx);
            if !self.n.is_nodata(mann) && !(mann.is_finite() && mann > 0.0) {
                return Err(EsError::validation(format!(
                    "invalid roughness n {} at cell ({}, {})",
                    mann, row, col
                )));
            }
            let ret = self.retention.at(idx);
            if !self.retention.is_nodata(ret) && !(ret.is_finite() && ret >= 0.0) {
                return Err(EsError::validation(format!(
                    "invalid retention {} at cell ({}, {})",
                    ret, row, col
                )));
            }
        }
        Ok(())
    }

    /// 读取入渗参数组编号
    #[inline]
    pub fn group_at(&self, idx: usize) -> Option<usize> {
        let v = self.inf_group.at(idx);
        if self.inf_group.is_nodata(v) || v < 0.0 {
            None
        } else {
            Some(v as usize)
        }
    }

    /// 读取河段编号
    #[inline]
    pub fn reach_at(&self, idx: usize) -> Option<usize> {
        let v = self.reach_id.at(idx);
        if self.reach_id.is_nodata(v) || v < 0.0 {
            None
        } else {
            Some(v as usize)
        }
    }

    /// 读取 D8 流向编码（无数据视为无出流）
    #[inline]
    pub fn flow_dir_at(&self, idx: usize) -> u32 {
        let v = self.flow_dir.at(idx);
        if self.flow_dir.is_nodata(v) || v < 0.0 {
            0
        } else {
            v as u32
        }
    }
}
