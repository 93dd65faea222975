// crates/es_physics/src/state.rs

//! 地表瞬态状态
//!
//! 按数组结构（SoA）存储每个单元的瞬态量。每个时间步由入渗模型
//! 与坡面汇流器各修改一次，只在运行开始时重置。

use es_terrain::{DomainGeometry, ParameterSet};

/// 单元水力流态
///
/// 单元从片流开始；累计水深超过临界水深后转入细沟并保持；
/// 河道网络单元恒为河道流态，由河段汇流器处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRegime {
    /// 片流
    Sheet,
    /// 细沟流
    Rill,
    /// 河道流
    Channel,
}

impl FlowRegime {
    /// 输出栅格用的状态编码
    #[inline]
    pub fn code(&self) -> f64 {
        match self {
            Self::Sheet => 0.0,
            Self::Rill => 1.0,
            Self::Channel => 2.0,
        }
    }
}

/// 地表瞬态状态
#[derive(Debug, Clone)]
pub struct SurfaceState {
    /// 总地表水深 [m]（行主序）
    pub h: Vec<f64>,
    /// 单元流态
    pub regime: Vec<FlowRegime>,
    /// 剩余表面滞留容量 [m]
    pub ret_remaining: Vec<f64>,
    /// 河道单元标记（入渗与坡面汇流跳过）
    pub is_channel: Vec<bool>,
}

impl SurfaceState {
    /// 按计算域与参数矩阵初始化
    ///
    /// 已分配河段编号的单元恒为河道流态；滞留容量取自参数矩阵，
    /// 无数据视为零。
    pub fn new(geometry: &DomainGeometry, params: &ParameterSet) -> Self {
        let n = geometry.n_cells();
        let mut regime = vec![FlowRegime::Sheet; n];
        let mut is_channel = vec![false; n];
        let mut ret_remaining = vec![0.0; n];

        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            if params.reach_at(idx).is_some() {
                regime[idx] = FlowRegime::Channel;
                is_channel[idx] = true;
            }
            let ret = params.retention.at(idx);
            if !params.retention.is_nodata(ret) && ret > 0.0 {
                ret_remaining[idx] = ret;
            }
        }

        Self {
            h: vec![0.0; n],
            regime,
            ret_remaining,
            is_channel,
        }
    }

    /// 单元总数
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.h.len()
    }
}
