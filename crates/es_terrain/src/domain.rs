// crates/es_terrain/src/domain.rs

//! 计算域几何
//!
//! 描述栅格计算域：行列数、单元尺寸、原点坐标、无数据标记，
//! 以及活动单元掩膜和按行主序排列的活动单元列表。
//! 构建后不可变，由引擎在整个模拟期间独占持有。

use es_foundation::error::{EsError, EsResult};
use serde::{Deserialize, Serialize};

/// 计算域几何
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainGeometry {
    /// 行数
    rows: usize,
    /// 列数
    cols: usize,
    /// x 方向单元尺寸 [m]
    dx: f64,
    /// y 方向单元尺寸 [m]
    dy: f64,
    /// 左下角 x 坐标
    x0: f64,
    /// 左下角 y 坐标
    y0: f64,
    /// 无数据值
    nodata: f64,
    /// 活动单元掩膜（行主序，true = 参与计算）
    mask: Vec<bool>,
    /// 活动单元 (row, col) 列表，按行主序扫描顺序排列
    active: Vec<(usize, usize)>,
}

impl DomainGeometry {
    /// 创建计算域
    ///
    /// `mask` 为行主序活动单元掩膜，长度必须等于 rows*cols。
    pub fn new(
        rows: usize,
        cols: usize,
        dx: f64,
        dy: f64,
        origin: (f64, f64),
        nodata: f64,
        mask: Vec<bool>,
    ) -> EsResult<Self> {
        es_foundation::ensure!(
            rows > 0 && cols > 0,
            EsError::invalid_input("domain must have at least one row and column")
        );
        EsError::check_size("domain mask", rows * cols, mask.len())?;
        es_foundation::ensure!(
            dx > 0.0 && dy > 0.0,
            EsError::invalid_input("cell size must be positive")
        );

        let mut active = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                if mask[row * cols + col] {
                    active.push((row, col));
                }
            }
        }
        es_foundation::ensure!(
            !active.is_empty(),
            EsError::invalid_input("domain mask has no active cell")
        );

        Ok(Self {
            rows,
            cols,
            dx,
            dy,
            x0: origin.0,
            y0: origin.1,
            nodata,
            mask,
            active,
        })
    }

    /// 创建全域活动的计算域（一维剖面与测试常用）
    pub fn fully_active(
        rows: usize,
        cols: usize,
        dx: f64,
        dy: f64,
        nodata: f64,
    ) -> EsResult<Self> {
        Self::new(rows, cols, dx, dy, (0.0, 0.0), nodata, vec![true; rows * cols])
    }

    /// 行数
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// 列数
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// 单元总数（含非活动单元）
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// 活动单元数
    #[inline]
    pub fn n_active(&self) -> usize {
        self.active.len()
    }

    /// x 方向单元尺寸
    #[inline]
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// y 方向单元尺寸
    #[inline]
    pub fn dy(&self) -> f64 {
        self.dy
    }

    /// 单元面积 [m²]
    #[inline]
    pub fn cell_area(&self) -> f64 {
        self.dx * self.dy
    }

    /// 原点坐标（左下角）
    #[inline]
    pub fn origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    /// 无数据值
    #[inline]
    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    /// 行主序线性索引
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// 是否在栅格范围内
    #[inline]
    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows && (col as usize) < self.cols
    }

    /// 是否为活动单元
    #[inline]
    pub fn is_active(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.mask[row * self.cols + col]
    }

    /// 活动单元 (row, col) 列表
    #[inline]
    pub fn active_cells(&self) -> &[(usize, usize)] {
        &self.active
    }
}
