// crates/es_workflow/src/events.rs

//! 事件系统模块
//!
//! 提供运行生命周期事件的定义和分发机制。

use crate::runner::RunId;
use parking_lot::RwLock;
use std::sync::Arc;

/// 运行事件
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// 运行已开始
    Started {
        /// 运行ID
        run_id: RunId,
    },
    /// 进度更新
    Progress {
        /// 运行ID
        run_id: RunId,
        /// 进度 (0-100)
        percent: f64,
        /// 当前模拟时刻 [s]
        sim_time: f64,
        /// 已完成步数
        steps: u64,
    },
    /// 运行已完成
    Completed {
        /// 运行ID
        run_id: RunId,
        /// 运行时长 (秒)
        duration_secs: f64,
        /// 总步数
        steps: u64,
    },
    /// 运行失败
    Failed {
        /// 运行ID
        run_id: RunId,
        /// 错误信息
        error: String,
    },
    /// 运行被取消（步边界处观察到取消标志）
    Aborted {
        /// 运行ID
        run_id: RunId,
    },
}

impl RunEvent {
    /// 获取事件对应的运行ID
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Started { run_id } => *run_id,
            Self::Progress { run_id, .. } => *run_id,
            Self::Completed { run_id, .. } => *run_id,
            Self::Failed { run_id, .. } => *run_id,
            Self::Aborted { run_id } => *run_id,
        }
    }

    /// 获取事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "Started",
            Self::Progress { .. } => "Progress",
            Self::Completed { .. } => "Completed",
            Self::Failed { .. } => "Failed",
            Self::Aborted { .. } => "Aborted",
        }
    }
}

/// 事件监听器trait
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &RunEvent);

    /// 获取监听器名称 (用于调试)
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// 函数式事件监听器
pub struct FnListener<F>
where
    F: Fn(&RunEvent) + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&RunEvent) + Send + Sync,
{
    /// 创建函数式监听器
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&RunEvent) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 日志事件监听器
pub struct LoggingListener {
    /// 日志前缀
    prefix: String,
}

impl LoggingListener {
    /// 创建日志监听器
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl EventListener for LoggingListener {
    fn on_event(&self, event: &RunEvent) {
        let msg = match event {
            RunEvent::Started { run_id } => {
                format!("Run {} started", run_id)
            }
            RunEvent::Progress {
                run_id,
                percent,
                sim_time,
                steps,
            } => {
                format!(
                    "Run {} progress: {:.1}% (t={:.2}s, {} steps)",
                    run_id, percent, sim_time, steps
                )
            }
            RunEvent::Completed {
                run_id,
                duration_secs,
                steps,
            } => {
                format!(
                    "Run {} completed in {:.2}s ({} steps)",
                    run_id, duration_secs, steps
                )
            }
            RunEvent::Failed { run_id, error } => {
                format!("Run {} failed: {}", run_id, error)
            }
            RunEvent::Aborted { run_id } => {
                format!("Run {} aborted", run_id)
            }
        };

        tracing::info!("{}: {}", self.prefix, msg);
    }

    fn name(&self) -> &str {
        "LoggingListener"
    }
}

/// 事件分发器
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    /// 创建新的事件分发器
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// 添加监听器
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let name = listener.name().to_string();
        self.listeners.write().push(listener);
        tracing::debug!("Added event listener: {}", name);
    }

    /// 添加函数式监听器
    pub fn add_fn_listener<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        let listener = Arc::new(FnListener::new(name, handler));
        self.add_listener(listener);
    }

    /// 清除所有监听器
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// 分发事件
    pub fn emit(&self, event: RunEvent) {
        let listeners = self.listeners.read();

        tracing::trace!("Emitting event: {}", event.name());

        for listener in listeners.iter() {
            listener.on_event(&event);
        }
    }

    /// 获取监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}
