//! Sink 基座层级：共享状态机、控制回路与 Enqueue 预检。
//!
//! # 设计背景（Why）
//! - 三种 Sink 变体（Direct/Buffered/Batched）共享完全相同的状态机、控制
//!   回路与 Enqueue 预检逻辑，只在"变体专属交接"这一步分叉——把公共部分
//!   抽成 [`SinkCore`]，变体各自只实现交接与生命周期回调，封闭事件 +
//!   处理 trait 的形状在这里体现为 `SinkLifecycle`。
//! - 恐慌防护只包在用户提供的 `onMessage` 回调周围：那是唯一来自调用方、
//!   可信度未知的代码；队列/批量内部逻辑是本 crate 自己的代码，不需要
//!   同等的不信任假设（这一点在 DESIGN.md 中作为设计判断记录）。

pub mod batched;
pub mod buffered;
pub mod direct;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::ids::StreamId;
use crate::message::Message;
use crate::modulator::{ModulatorArray, ModulatorVerdict};
use crate::observability::{ComponentHealthState, HealthCheckProvider};
use crate::registry::StreamRegistry;
use crate::router::{route_original, Router};

pub use batched::BatchedSink;
pub use buffered::BufferedSink;
pub use direct::DirectSink;

/// 总序状态机：`Initializing → Active → Waiting ⇄ Active →
/// PrepareStop → Stopping → Dead`。声明顺序即比较顺序，满足 `≥ Stopping`、
/// `≥ PrepareStop` 等门控所需的偏序关系；`Active`/`Waiting` 之间允许来回
/// 切换，其余转换单向。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SinkState {
    Initializing = 0,
    Active = 1,
    Waiting = 2,
    PrepareStop = 3,
    Stopping = 4,
    Dead = 5,
}

impl SinkState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SinkState::Initializing,
            1 => SinkState::Active,
            2 => SinkState::Waiting,
            3 => SinkState::PrepareStop,
            4 => SinkState::Stopping,
            _ => SinkState::Dead,
        }
    }
}

impl From<SinkState> for ComponentHealthState {
    /// `/<pluginID>/pluginState`（§6）reads `SinkCore::state()` through this
    /// mapping: only `Active` reports 200, every other state reports 503.
    fn from(state: SinkState) -> Self {
        match state {
            SinkState::Initializing => ComponentHealthState::Initializing,
            SinkState::Active => ComponentHealthState::Active,
            SinkState::Waiting => ComponentHealthState::Waiting,
            SinkState::PrepareStop => ComponentHealthState::PrepareStop,
            SinkState::Stopping => ComponentHealthState::Stopping,
            SinkState::Dead => ComponentHealthState::Dead,
        }
    }
}

/// Sink 控制通道接受的命令（与 `source::ControlEvent` 分开定义，
/// 因为 Sink 只在 `Stop` 内部经过 `PrepareStop`，不作为独立外部命令）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkControlEvent {
    Stop,
    Roll,
}

/// `onPrepareStop`/`onStop`/`onRoll` 生命周期钩子：封闭事件 + 处理
/// trait，取代若干可空回调字段。默认实现均为空操作。
#[async_trait]
pub trait SinkLifecycle: Send + Sync {
    async fn on_prepare_stop(&self) {}
    async fn on_stop(&self) {}
    async fn on_roll(&self) {}
}

/// 用户提供的消息处理回调；Direct 变体在入队线程上直接调用，
/// Buffered/Batched 变体在各自的消费者任务上调用。
pub type OnMessage = Arc<dyn Fn(Message) -> Result<(), CoreError> + Send + Sync>;

/// Enqueue 预检的结果：要么交给变体专属交接继续处理，要么已经被完全处理
/// （丢弃/改道），调用方直接把内层结果上抛。
pub enum PreCheckOutcome {
    Proceed(Message),
    Handled(Result<(), CoreError>),
}

/// 三种 Sink 变体共享的状态、配置与预检逻辑。
pub struct SinkCore {
    id: String,
    state: AtomicU8,
    fallback_stream: StreamId,
    modulators: ModulatorArray,
    shutdown_timeout: Duration,
    registry: Arc<StreamRegistry>,
    control_tx: mpsc::Sender<SinkControlEvent>,
    control_rx: tokio::sync::Mutex<mpsc::Receiver<SinkControlEvent>>,
}

impl SinkCore {
    pub fn new(
        id: impl Into<String>,
        fallback_stream: StreamId,
        modulators: ModulatorArray,
        shutdown_timeout: Duration,
        registry: Arc<StreamRegistry>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(1);
        Self {
            id: id.into(),
            state: AtomicU8::new(SinkState::Initializing as u8),
            fallback_stream,
            modulators,
            shutdown_timeout,
            registry,
            control_tx,
            control_rx: tokio::sync::Mutex::new(control_rx),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SinkState {
        SinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: SinkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn control_sender(&self) -> mpsc::Sender<SinkControlEvent> {
        self.control_tx.clone()
    }

    pub fn fallback_router(&self) -> Option<Arc<dyn Router>> {
        self.registry.get_router_or_fallback(self.fallback_stream)
    }

    /// 把消息路由到配置的 Fallback 流，使用 `RouteOriginal`（未被修改的
    /// 原始消息——`TryFallback` 路径，见 DESIGN.md 的设计判断）。
    pub async fn try_fallback(&self, msg: &Message) -> Result<(), CoreError> {
        route_original(msg, self.fallback_router(), &self.registry).await
    }

    /// Enqueue 预检（不含恐慌防护——那包在变体专属交接周围）：
    /// - `≥ Stopping`：通过 `fallbackStream` 改道原始消息。
    /// - 应用 Modulator 链：`Continue` 放行；`Fallback` 按当前（可能被
    ///   修改的）`streamID` 路由；`Discard` 计数丢弃。
    pub async fn pre_check(&self, mut msg: Message) -> PreCheckOutcome {
        if self.state() >= SinkState::Stopping {
            return PreCheckOutcome::Handled(self.try_fallback(&msg).await);
        }

        match self.modulators.modulate(&mut msg).await {
            ModulatorVerdict::Continue => PreCheckOutcome::Proceed(msg),
            ModulatorVerdict::Fallback => {
                // Same attribution rule as `router::route`: `Fallback` only ever
                // comes from a `Filter`'s `Reject(target)`, so it is the point
                // where "filtered" can be counted unambiguously.
                self.registry.metrics().incr_messages_filtered();
                let target = self.registry.get_router_or_fallback(msg.stream_id());
                PreCheckOutcome::Handled(crate::router::route(msg, target, &self.registry).await)
            }
            ModulatorVerdict::Discard => {
                self.registry.metrics().incr_messages_discarded();
                PreCheckOutcome::Handled(Ok(()))
            }
        }
    }

    /// `Timeout` 入队失败的反应：改道到 Fallback 流并转入 `Waiting`。
    pub async fn handle_enqueue_timeout(&self, msg: &Message) -> Result<(), CoreError> {
        self.set_state(SinkState::Waiting);
        self.try_fallback(msg).await
    }

    /// `Discard` 入队失败的反应：只计数并转入 `Waiting`，**不**尝试改道
    /// （与 `handle_enqueue_timeout` 的区别正是这一点）。
    pub fn handle_enqueue_discard(&self) {
        self.registry.metrics().incr_messages_discarded();
        self.set_state(SinkState::Waiting);
    }

    pub fn mark_active(&self) {
        if self.state() == SinkState::Waiting {
            self.set_state(SinkState::Active);
        }
    }

    /// 控制回路（所有变体共用）：`Stop` 触发两段式 `5 ×
    /// shutdownTimeout` 预算的 `onPrepareStop`/`onStop`，超时只记录日志，
    /// 不阻塞关闭；`Roll` 调用 `onRoll`；未知命令记录日志并继续
    /// （这里用穷尽的 `SinkControlEvent` 枚举，不存在真正未知命令）。
    pub async fn control_loop(&self, lifecycle: &dyn SinkLifecycle) {
        let mut rx = self.control_rx.lock().await;
        while let Some(event) = rx.recv().await {
            match event {
                SinkControlEvent::Stop => {
                    self.set_state(SinkState::PrepareStop);
                    let budget = self.shutdown_timeout * 5;
                    if tokio::time::timeout(budget, lifecycle.on_prepare_stop()).await.is_err() {
                        tracing::warn!(sink = %self.id, "onPrepareStop exceeded budget");
                    }
                    self.set_state(SinkState::Stopping);
                    if tokio::time::timeout(budget, lifecycle.on_stop()).await.is_err() {
                        tracing::warn!(sink = %self.id, "onStop exceeded budget");
                    }
                    self.set_state(SinkState::Dead);
                    return;
                }
                SinkControlEvent::Roll => lifecycle.on_roll().await,
            }
        }
    }
}

impl HealthCheckProvider for SinkCore {
    fn health(&self) -> ComponentHealthState {
        self.state().into()
    }
}
