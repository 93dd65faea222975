// crates/es_terrain/src/raster.rs

//! 栅格数据管理
//!
//! 提供带无数据标记的行主序栅格存储和访问。

use es_foundation::error::{EsError, EsResult};
use serde::{Deserialize, Serialize};

/// 栅格数据（行主序）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterData {
    /// 数据
    pub data: Vec<f64>,
    /// 行数
    pub rows: usize,
    /// 列数
    pub cols: usize,
    /// 无数据值
    pub nodata: f64,
}

impl RasterData {
    /// 创建新的栅格数据，初始填充无数据值
    pub fn new(rows: usize, cols: usize, nodata: f64) -> Self {
        Self {
            data: vec![nodata; rows * cols],
            rows,
            cols,
            nodata,
        }
    }

    /// 创建填充给定常量的栅格
    pub fn filled(rows: usize, cols: usize, nodata: f64, value: f64) -> Self {
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
            nodata,
        }
    }

    /// 从数据创建
    pub fn from_data(data: Vec<f64>, rows: usize, cols: usize, nodata: f64) -> EsResult<Self> {
        if data.len() != rows * cols {
            return Err(EsError::size_mismatch(
                "raster data",
                rows * cols,
                data.len(),
            ));
        }
        Ok(Self {
            data,
            rows,
            cols,
            nodata,
        })
    }

    /// 单元总数
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 行主序线性索引
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// 获取像元值
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// 设置像元值
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
        }
    }

    /// 按线性索引获取
    #[inline]
    pub fn at(&self, idx: usize) -> f64 {
        self.data[idx]
    }

    /// 按线性索引设置
    #[inline]
    pub fn set_at(&mut self, idx: usize, value: f64) {
        self.data[idx] = value;
    }

    /// 判断是否为无数据
    #[inline]
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || (self.nodata.is_finite() && (value - self.nodata).abs() < 1e-10)
    }

    /// 全栅格填充
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// 有效像元统计（忽略无数据值）
    ///
    /// 返回 (min, max, mean)，无有效像元时返回 None。
    pub fn stats(&self) -> Option<(f64, f64, f64)> {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut sum = 0.0;
        let mut count = 0usize;
        for &v in &self.data {
            if self.is_nodata(v) {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }
        if count == 0 {
            None
        } else {
            Some((min, max, sum / count as f64))
        }
    }

    /// 将活动区域之外的像元置为无数据值
    ///
    /// 保证无数据值只出现在计算区域之外。
    pub fn masked_by<F: Fn(usize, usize) -> bool>(&self, is_active: F) -> RasterData {
        let mut out = RasterData::new(self.rows, self.cols, self.nodata);
        for row in 0..self.rows {
            for col in 0..self.cols {
                if is_active(row, col) {
                    out.data[row * self.cols + col] = self.data[row * self.cols + col];
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_filled_nodata() {
        let r = RasterData::new(2, 3, -9999.0);
        assert_eq!(r.len(), 6);
        assert!(r.is_nodata(r.get(1, 2).unwrap()));
    }

    #[test]
    fn test_from_data_size_check() {
        assert!(RasterData::from_data(vec![0.0; 5], 2, 3, -9999.0).is_err());
        assert!(RasterData::from_data(vec![0.0; 6], 2, 3, -9999.0).is_ok());
    }

    #[test]
    fn test_get_set() {
        let mut r = RasterData::new(2, 2, -9999.0);
        r.set(0, 1, 3.5);
        assert_eq!(r.get(0, 1), Some(3.5));
        assert_eq!(r.get(2, 0), None);
    }

    #[test]
    fn test_stats_ignores_nodata() {
        let mut r = RasterData::new(1, 3, -9999.0);
        r.set(0, 0, 1.0);
        r.set(0, 1, 3.0);
        let (min, max, mean) = r.stats().unwrap();
        assert_eq!(min, 1.0);
        assert_eq!(max, 3.0);
        assert!((mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_masked_by() {
        let mut r = RasterData::filled(2, 2, -9999.0, 1.0);
        r.set(0, 0, 5.0);
        let masked = r.masked_by(|row, col| row == 0 && col == 0);
        assert_eq!(masked.get(0, 0), Some(5.0));
        assert!(masked.is_nodata(masked.get(1, 1).unwrap()));
    }
}
