// crates/es_physics/src/infiltration.rs

//! Philip 入渗模型
//!
//! 按 (导水率 k, 吸渗率 s) 参数对把单元分组，逐组施加两项入渗定律。
//! 每步的分组入渗容量增量为
//!
//! `cap = (0.5·s/√(t_total + dt) + k)·dt`
//!
//! 单元实际入渗量取容量与地表水深的较小者。
//!
//! 分组去重采用 (k, s) 对的精确相等查找：首次出现的参数对分配下一个
//! 连续编号。组编号因此从 0 起连续，按首次扫描顺序排列。

use std::collections::HashMap;

use crate::error::{RunoffError, RunoffResult};
use es_terrain::{DomainGeometry, RasterData};

/// 入渗参数组
#[derive(Debug, Clone)]
pub struct InfiltrationGroup {
    /// 组编号（从 0 起连续）
    pub id: usize,
    /// 导水率 k [m/s]
    pub conductivity: f64,
    /// 吸渗率 s [m/s^0.5]
    pub sorptivity: f64,
    /// 累计入渗深度（满足供水条件下的潜在累计）[m]
    pub cum_depth: f64,
    /// 当前步的入渗容量 [m]
    step_capacity: f64,
}

/// Philip 两项入渗容量增量
///
/// k 或 s 为无数据值时返回无数据值，绝不与真实单元混算。
#[inline]
pub fn philip_capacity(k: f64, s: f64, total_time: f64, dt: f64, nodata: f64) -> f64 {
    let is_nodata = |v: f64| v.is_nan() || (nodata.is_finite() && (v - nodata).abs() < 1e-10);
    if is_nodata(k) || is_nodata(s) {
        return nodata;
    }
    (0.5 * s / (total_time + dt).sqrt() + k) * dt
}

/// Philip 入渗模型
///
/// 持有分组表，供水深度逐步扣减。模型实例由求解器独占持有，
/// 分组状态只在入渗步内被修改。
#[derive(Debug, Clone)]
pub struct PhilipInfiltration {
    groups: Vec<InfiltrationGroup>,
    nodata: f64,
}

impl PhilipInfiltration {
    /// 从按组编号索引的 (k, s) 表构建
    pub fn from_table(pairs: &[(f64, f64)], nodata: f64) -> RunoffResult<Self> {
        let mut groups = Vec::with_capacity(pairs.len());
        for (id, &(k, s)) in pairs.iter().enumerate() {
            if !k.is_finite() || k < 0.0 {
                return Err(RunoffError::data_preparation(format!(
                    "infiltration group {}: conductivity {} is invalid",
                    id, k
                )));
            }
            if !s.is_finite() || s < 0.0 {
                return Err(RunoffError::data_preparation(format!(
                    "infiltration group {}: sorptivity {} is invalid",
                    id, s
                )));
            }
            groups.push(InfiltrationGroup {
                id,
                conductivity: k,
                sorptivity: s,
                cum_depth: 0.0,
                step_capacity: 0.0,
            });
        }
        Ok(Self { groups, nodata })
    }

    /// 扫描参数栅格发现分组
    ///
    /// 对每个活动单元读取 (k, s)，按精确相等在已见参数对映射中查找；
    /// 首次出现时分配下一个连续组编号。返回模型与单元组编号栅格。
    pub fn discover(
        geometry: &DomainGeometry,
        k_grid: &RasterData,
        s_grid: &RasterData,
    ) -> RunoffResult<(Self, RasterData)> {
        let mut seen: HashMap<(u64, u64), usize> = HashMap::new();
        let mut groups: Vec<InfiltrationGroup> = Vec::new();
        let mut group_grid =
            RasterData::new(geometry.rows(), geometry.cols(), geometry.nodata());

        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            let k = k_grid.at(idx);
            let s = s_grid.at(idx);
            if k_grid.is_nodata(k) || s_grid.is_nodata(s) {
                continue;
            }
            if !k.is_finite() || k < 0.0 || !s.is_finite() || s < 0.0 {
                return Err(RunoffError::data_preparation(format!(
                    "invalid infiltration parameters (k={}, s={}) at cell ({}, {})",
                    k, s, row, col
                )));
            }
            let key = (k.to_bits(), s.to_bits());
            let id = match seen.get(&key) {
                Some(&id) => id,
                None => {
                    let id = groups.len();
                    seen.insert(key, id);
                    groups.push(InfiltrationGroup {
                        id,
                        conductivity: k,
                        sorptivity: s,
                        cum_depth: 0.0,
                        step_capacity: 0.0,
                    });
                    id
                }
            };
            group_grid.set_at(idx, id as f64);
        }

        Ok((
            Self {
                groups,
                nodata: geometry.nodata(),
            },
            group_grid,
        ))
    }

    /// 分组表
    pub fn groups(&self) -> &[InfiltrationGroup] {
        &self.groups
    }

    /// 组数
    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// 执行一个入渗步
    ///
    /// `depth` 为行主序地表水深 [m]，就地扣减；`infiltrated` 写入本步
    /// 各单元的入渗深度 [m]。`skip` 标记不参与入渗的单元（河道单元）。
    ///
    /// 前置条件：所有活动单元水深非负。违反时在处理任何分组之前
    /// 返回 `NegativeWaterLevel`，该错误指示上游核算缺陷并中止运行。
    pub fn step(
        &mut self,
        geometry: &DomainGeometry,
        group_grid: &RasterData,
        depth: &mut [f64],
        skip: &[bool],
        total_time: f64,
        dt: f64,
        step: u64,
        infiltrated: &mut [f64],
    ) -> RunoffResult<()> {
        // 负水深检查先于一切分组处理
        let mut min_depth = f64::INFINITY;
        for &(row, col) in geometry.active_cells() {
            let idx = geometry.index(row, col);
            if depth[idx] < min_depth {
                min_depth = depth[idx];
            }
        }
        if min_depth < 0.0 {
            return Err(RunoffError::NegativeWaterLevel {
                step,
                min: min_depth,
            });
        }

        infiltrated.fill(0.0);

        // 按组编号升序处理；每一遍只改写匹配单元，
        // 后处理的分组不会覆盖先前分组的结果。
        for group in self.groups.iter_mut() {
            let capacity = philip_capacity(
                group.conductivity,
                group.sorptivity,
                total_time,
                dt,
                self.nodata,
            );
            let is_nodata =
                capacity.is_nan() || (self.nodata.is_finite() && (capacity - self.nodata).abs() < 1e-10);
            if is_nodata {
                continue;
            }
            group.step_capacity = capacity;
            group.cum_depth += capacity;

            for &(row, col) in geometry.active_cells() {
                let idx = geometry.index(row, col);
                if skip[idx] {
                    continue;
                }
                let cell_group = group_grid.at(idx);
                if group_grid.is_nodata(cell_group)
                    || cell_group < 0.0
                    || cell_group as usize != group.id
                {
                    continue;
                }
                let inf = capacity.min(depth[idx]);
                depth[idx] -= inf;
                infiltrated[idx] = inf;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> DomainGeometry {
        DomainGeometry::fully_active(1, 2, 1.0, 1.0, -9999.0).unwrap()
    }

    #[test]
    fn test_philip_capacity_formula() {
        let cap = philip_capacity(2e-5, 1e-3, 0.0, 60.0, -9999.0);
        let expected = (0.5 * 1e-3 / 60.0_f64.sqrt() + 2e-5) * 60.0;
        assert!((cap - expected).abs() < 1e-15);
    }

    #[test]
    fn test_philip_capacity_nodata() {
        let cap = philip_capacity(-9999.0, 1e-3, 0.0, 60.0, -9999.0);
        assert_eq!(cap, -9999.0);
        let cap = philip_capacity(2e-5, -9999.0, 0.0, 60.0, -9999.0);
        assert_eq!(cap, -9999.0);
    }

    #[test]
    fn test_step_limits_to_available_depth() {
        let g = geometry();
        let mut model = PhilipInfiltration::from_table(&[(2e-5, 1e-3)], g.nodata()).unwrap();
        let group_grid = RasterData::filled(1, 2, g.nodata(), 0.0);
        let capacity = philip_capacity(2e-5, 1e-3, 0.0, 60.0, g.nodata());

        // 一个单元水深充足，另一个不足
        let mut depth = vec![0.02, capacity * 0.25];
        let mut infiltrated = vec![0.0; 2];
        model
            .step(
                &g,
                &group_grid,
                &mut depth,
                &[false, false],
                0.0,
                60.0,
                0,
                &mut infiltrated,
            )
            .unwrap();

        assert!((infiltrated[0] - capacity).abs() < 1e-15);
        assert!((depth[0] - (0.02 - capacity)).abs() < 1e-15);
        // 不足的单元全部入渗，水深归零
        assert!((infiltrated[1] - capacity * 0.25).abs() < 1e-15);
        assert!(depth[1].abs() < 1e-18);
        assert!(depth.iter().all(|&h| h >= 0.0));
    }

    #[test]
    fn test_negative_depth_rejected_before_groups() {
        let g = geometry();
        let mut model = PhilipInfiltration::from_table(&[(2e-5, 1e-3)], g.nodata()).unwrap();
        let group_grid = RasterData::filled(1, 2, g.nodata(), 0.0);
        let mut depth = vec![0.02, -0.01];
        let mut infiltrated = vec![0.0; 2];
        let err = model
            .step(
                &g,
                &group_grid,
                &mut depth,
                &[false, false],
                0.0,
                60.0,
                3,
                &mut infiltrated,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RunoffError::NegativeWaterLevel { step: 3, .. }
        ));
        // 深度数组未被改动
        assert_eq!(depth, vec![0.02, -0.01]);
        assert_eq!(model.groups()[0].cum_depth, 0.0);
    }

    #[test]
    fn test_later_groups_do_not_clobber_earlier() {
        let g = geometry();
        let mut model =
            PhilipInfiltration::from_table(&[(2e-5, 1e-3), (1e-6, 1e-4)], g.nodata()).unwrap();
        let mut group_grid = RasterData::new(1, 2, g.nodata());
        group_grid.set_at(0, 0.0);
        group_grid.set_at(1, 1.0);

        let mut depth = vec![0.02, 0.02];
        let mut infiltrated = vec![0.0; 2];
        model
            .step(
                &g,
                &group_grid,
                &mut depth,
                &[false, false],
                0.0,
                60.0,
                0,
                &mut infiltrated,
            )
            .unwrap();

        let cap0 = philip_capacity(2e-5, 1e-3, 0.0, 60.0, g.nodata());
        let cap1 = philip_capacity(1e-6, 1e-4, 0.0, 60.0, g.nodata());
        assert!((infiltrated[0] - cap0).abs() < 1e-15);
        assert!((infiltrated[1] - cap1).abs() < 1e-15);
    }

    #[test]
    fn test_discover_dedups_exact_pairs() {
        let g = DomainGeometry::fully_active(1, 4, 1.0, 1.0, -9999.0).unwrap();
        let k = RasterData::from_data(vec![2e-5, 1e-6, 2e-5, -9999.0], 1, 4, -9999.0).unwrap();
        let s = RasterData::from_data(vec![1e-3, 1e-4, 1e-3, 1e-3], 1, 4, -9999.0).unwrap();
        let (model, grid) = PhilipInfiltration::discover(&g, &k, &s).unwrap();

        assert_eq!(model.n_groups(), 2);
        assert_eq!(model.groups()[0].conductivity, 2e-5);
        assert_eq!(model.groups()[1].conductivity, 1e-6);
        assert_eq!(grid.at(0), 0.0);
        assert_eq!(grid.at(1), 1.0);
        assert_eq!(grid.at(2), 0.0);
        // 无数据参数的单元不分配组
        assert!(grid.is_nodata(grid.at(3)));
    }

    #[test]
    fn test_skip_cells_keep_depth() {
        let g = geometry();
        let mut model = PhilipInfiltration::from_table(&[(2e-5, 1e-3)], g.nodata()).unwrap();
        let group_grid = RasterData::filled(1, 2, g.nodata(), 0.0);
        let mut depth = vec![0.02, 0.02];
        let mut infiltrated = vec![0.0; 2];
        model
            .step(
                &g,
                &group_grid,
                &mut depth,
                &[false, true],
                0.0,
                60.0,
                0,
                &mut infiltrated,
            )
            .unwrap();
        assert_eq!(depth[1], 0.02);
        assert_eq!(infiltrated[1], 0.0);
    }
}
