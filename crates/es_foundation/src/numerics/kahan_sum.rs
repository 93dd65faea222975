// crates/es_foundation/src/numerics/kahan_sum.rs

//! Kahan 求和算法
//!
//! 使用 Kahan 算法减少浮点累加误差。质量平衡核算对长时间序列的
//! 体积累加十分敏感，普通求和的舍入误差会污染收支闭合检查。

/// Kahan 求和器
///
/// # 示例
///
/// ```rust
/// use es_foundation::KahanSum;
///
/// let data = vec![0.1f64; 1000];
/// let sum = KahanSum::sum_iter(data.iter().cloned());
/// assert!((sum - 100.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    /// 创建新的求和器
    pub fn new() -> Self {
        Self {
            sum: 0.0,
            compensation: 0.0,
        }
    }

    /// 添加一个值
    #[inline]
    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// 获取当前求和值
    #[inline]
    pub fn value(&self) -> f64 {
        self.sum
    }

    /// 重置求和器
    #[inline]
    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.compensation = 0.0;
    }

    /// 从迭代器求和
    pub fn sum_iter<I: IntoIterator<Item = f64>>(iter: I) -> f64 {
        let mut kahan = Self::new();
        for v in iter {
            kahan.add(v);
        }
        kahan.value()
    }
}
