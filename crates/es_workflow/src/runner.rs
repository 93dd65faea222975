// crates/es_workflow/src/runner.rs

//! 运行器模块
//!
//! 驱动求解器主循环，承担引擎/观察者边界上仅有的两份共享状态：
//! 观察者写取消标志，引擎写单调进度值。两者都是单字原子量，
//! 无需加锁。取消是协作式的：只在步边界检查，绝不抢占；观察到
//! 取消后终止运行且不产出任何部分输出。

use crate::events::{EventDispatcher, RunEvent};
use es_physics::{RunoffError, RunoffOutput, RunoffSolver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// 运行ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// 创建新的运行ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 协作式取消令牌（观察者写，引擎在步边界读）
#[derive(Debug, Default)]
pub struct CancelToken {
    flag: AtomicBool,
}

impl CancelToken {
    /// 创建未触发的令牌
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// 是否已请求取消
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// 单调进度值 [0, 100]（引擎写，观察者读）
///
/// 以 f64 位模式存入 AtomicU64；非负浮点的位序与数值序一致，
/// `fetch_max` 即可保证单调不减。
#[derive(Debug)]
pub struct Progress {
    bits: AtomicU64,
}

impl Progress {
    /// 创建零进度
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// 上报进度（小于当前值的上报被忽略）
    pub fn report(&self, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0);
        self.bits.fetch_max(clamped.to_bits(), Ordering::Relaxed);
    }

    /// 读取当前进度
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行上下文
///
/// 跨引擎/观察者边界共享的状态只有取消令牌与进度值。
pub struct RunContext {
    /// 运行ID
    pub id: RunId,
    cancel: Arc<CancelToken>,
    progress: Arc<Progress>,
    started: Instant,
}

impl RunContext {
    /// 创建运行上下文
    pub fn new() -> Self {
        Self {
            id: RunId::new(),
            cancel: Arc::new(CancelToken::new()),
            progress: Arc::new(Progress::new()),
            started: Instant::now(),
        }
    }

    /// 取消令牌（供观察者持有）
    pub fn cancel_token(&self) -> Arc<CancelToken> {
        self.cancel.clone()
    }

    /// 进度值（供观察者持有）
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// 是否已请求取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 已运行墙钟时长（秒）
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行器错误
#[derive(Debug, Error)]
pub enum RunnerError {
    /// 计算错误
    #[error(transparent)]
    Physics(#[from] RunoffError),

    /// 步边界处观察到取消
    #[error("computation aborted by cancellation")]
    Cancelled,
}

/// 终止状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// 正常完成
    Completed,
    /// 失败
    Failed,
    /// 被取消
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
        };
        write!(f, "{}", s)
    }
}

/// 运行报告
///
/// 单一终止状态加描述信息；只有正常完成才携带输出。
pub struct RunReport {
    /// 运行ID
    pub id: RunId,
    /// 终止状态
    pub status: RunStatus,
    /// 最终输出（仅正常完成）
    pub output: Option<RunoffOutput>,
    /// 错误信息（仅失败）
    pub error: Option<String>,
    /// 已完成步数
    pub steps: u64,
    /// 最终进度
    pub progress: f64,
    /// 开始时刻
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// 结束时刻
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

/// 运行器配置
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// 进度事件的墙钟间隔 (秒)
    pub progress_interval: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            progress_interval: 1.0,
        }
    }
}

/// 运行器
#[derive(Default)]
pub struct Runner {
    config: RunnerConfig,
    events: EventDispatcher,
}

impl Runner {
    /// 创建运行器
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
            events: EventDispatcher::new(),
        }
    }

    /// 设置配置
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// 事件分发器
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// 同步执行一次完整运行
    ///
    /// 返回单一终止状态：正常完成携带输出；取消与失败均不产出
    /// 部分输出。引擎内部不做重试。
    pub fn run(&self, solver: &mut RunoffSolver, context: &RunContext) -> RunReport {
        let started_at = chrono::Utc::now();
        self.events.emit(RunEvent::Started { run_id: context.id });

        tracing::info!("Starting runoff simulation {}", context.id);

        let result = self.run_loop(solver, context);

        let (status, output, error) = match result {
            Ok(()) => match solver.finalize() {
                Ok(output) => {
                    context.progress.report(solver.progress());
                    self.events.emit(RunEvent::Completed {
                        run_id: context.id,
                        duration_secs: context.elapsed_secs(),
                        steps: solver.steps(),
                    });
                    (RunStatus::Completed, Some(output), None)
                }
                Err(e) => {
                    let msg = e.to_string();
                    self.events.emit(RunEvent::Failed {
                        run_id: context.id,
                        error: msg.clone(),
                    });
                    (RunStatus::Failed, None, Some(msg))
                }
            },
            Err(RunnerError::Cancelled) => {
                self.events.emit(RunEvent::Aborted { run_id: context.id });
                tracing::warn!(
                    "Run {} aborted at t={:.2}s after {} steps",
                    context.id,
                    solver.time(),
                    solver.steps()
                );
                (RunStatus::Aborted, None, None)
            }
            Err(RunnerError::Physics(e)) => {
                let msg = e.to_string();
                self.events.emit(RunEvent::Failed {
                    run_id: context.id,
                    error: msg.clone(),
                });
                tracing::error!("Run {} failed: {}", context.id, msg);
                (RunStatus::Failed, None, Some(msg))
            }
        };

        RunReport {
            id: context.id,
            status,
            output,
            error,
            steps: solver.steps(),
            progress: context.progress.get(),
            started_at,
            finished_at: chrono::Utc::now(),
        }
    }

    /// 主循环：取消只在步边界检查
    fn run_loop(
        &self,
        solver: &mut RunoffSolver,
        context: &RunContext,
    ) -> Result<(), RunnerError> {
        let mut last_progress_emit = Instant::now();

        while !solver.is_finished() {
            if context.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }

            let report = solver.advance()?;
            context.progress.report(solver.progress());

            if last_progress_emit.elapsed().as_secs_f64() >= self.config.progress_interval {
                self.events.emit(RunEvent::Progress {
                    run_id: context.id,
                    percent: context.progress.get(),
                    sim_time: report.time,
                    steps: report.steps,
                });
                last_progress_emit = Instant::now();
            }
        }

        Ok(())
    }
}
