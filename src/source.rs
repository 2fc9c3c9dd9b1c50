//! `Source` 基座：控制回路、Ticker 回路与 `Emit`。
//!
//! # 设计背景（Why）
//! - Source 与 Sink 共享"capacity-1 控制通道 + 专用任务"这一生命周期骨架，
//!   这里复用 `tokio::sync::mpsc::channel(1)` 这一相同的原语，保持两者的
//!   控制面读起来是同一套惯用法。
//! - `Fuse` 是一个可插拔的熔断开关；默认实现永远"未熔断"，不接入强制性
//!   控制流，作为一个可选项存在。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::ids::StreamId;
use crate::message::{Message, SourceRef};
use crate::registry::StreamRegistry;
use crate::router::route;

/// Source 控制回路接受的命令（Sink 生命周期的那套回调繁多问题同样适用
/// 于 Source：这里选用封闭变体而不是若干个可空回调字段）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    Stop,
    Roll,
    PrepareStop,
}

/// 熔断开关契约：`Source` 可选地在 `Emit` 之前
/// 查询是否处于"烧断"状态。不接入强制控制流，默认永远放行。
pub trait Fuse: Send + Sync {
    fn is_burned(&self) -> bool;
}

pub struct NoopFuse;

impl Fuse for NoopFuse {
    fn is_burned(&self) -> bool {
        false
    }
}

/// Source 生命周期回调；均为可选。
pub trait SourceCallbacks: Send + Sync {
    fn on_roll(&self) {}
    fn on_stop(&self) {}
    fn on_prepare_stop(&self) {}
}

pub struct NoopCallbacks;
impl SourceCallbacks for NoopCallbacks {}

/// Source 的共享状态：输出流列表、控制通道、回调与可选熔断开关。
pub struct Source {
    id: String,
    output_streams: Vec<StreamId>,
    source_ref: SourceRef,
    control_tx: mpsc::Sender<ControlEvent>,
    control_rx: tokio::sync::Mutex<mpsc::Receiver<ControlEvent>>,
    callbacks: Arc<dyn SourceCallbacks>,
    fuse: Arc<dyn Fuse>,
    discarded: AtomicU64,
}

impl Source {
    pub fn new(id: impl Into<String>, output_streams: Vec<StreamId>) -> Self {
        Self::with_callbacks(id, output_streams, Arc::new(NoopCallbacks))
    }

    pub fn with_callbacks(id: impl Into<String>, output_streams: Vec<StreamId>, callbacks: Arc<dyn SourceCallbacks>) -> Self {
        let id = id.into();
        let (control_tx, control_rx) = mpsc::channel(1);
        Self {
            source_ref: SourceRef::new(id.clone()),
            id,
            output_streams,
            control_tx,
            control_rx: tokio::sync::Mutex::new(control_rx),
            callbacks,
            fuse: Arc::new(NoopFuse),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn with_fuse(mut self, fuse: Arc<dyn Fuse>) -> Self {
        self.fuse = fuse;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn control_sender(&self) -> mpsc::Sender<ControlEvent> {
        self.control_tx.clone()
    }

    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// `Emit(payload, sequence, copyPayload)`：为每个配置的输出
    /// 流构造一条消息并路由；单一输出流时直接路由同一条消息，多输出流时
    /// 为每个流单独构造一条消息（第一个流的 id 同时被记为 `prevStreamID`）。
    /// 入队失败计入 `discarded`。
    pub async fn emit(&self, payload: Vec<u8>, sequence: u64, registry: &StreamRegistry) -> Result<(), CoreError> {
        if self.fuse.is_burned() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        if self.output_streams.len() == 1 {
            let stream = self.output_streams[0];
            let msg = Message::new(payload, stream, sequence, Some(self.source_ref.clone()));
            let router = registry.get_router_or_fallback(stream);
            return self.route_and_count(msg, router, registry).await;
        }

        let first_stream = self.output_streams[0];
        for (i, &stream) in self.output_streams.iter().enumerate() {
            let msg = if i == 0 {
                Message::new(payload.clone(), stream, sequence, Some(self.source_ref.clone()))
            } else {
                let mut msg = Message::new(payload.clone(), first_stream, sequence, Some(self.source_ref.clone()));
                msg.set_stream_id(stream);
                msg
            };
            let router = registry.get_router_or_fallback(stream);
            self.route_and_count(msg, router, registry).await?;
        }
        Ok(())
    }

    async fn route_and_count(
        &self,
        msg: Message,
        router: Option<Arc<dyn crate::router::Router>>,
        registry: &StreamRegistry,
    ) -> Result<(), CoreError> {
        if router.is_none() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
        route(msg, router, registry).await
    }

    /// `ControlLoop`：阻塞在控制通道上，按命令分发回调；
    /// 收到 `Stop` 时转入终态并返回。
    pub async fn control_loop(&self) {
        let mut rx = self.control_rx.lock().await;
        while let Some(event) = rx.recv().await {
            match event {
                ControlEvent::Stop => {
                    self.callbacks.on_stop();
                    return;
                }
                ControlEvent::Roll => self.callbacks.on_roll(),
                ControlEvent::PrepareStop => self.callbacks.on_prepare_stop(),
            }
        }
    }

    /// `TickerLoop(interval, onTick)`：每次调用后重新排定下一次
    /// 触发，即使 `on_tick` 本身超过了 `interval`，也不跳过下一拍。
    pub async fn ticker_loop<F, Fut>(&self, interval: Duration, mut on_tick: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            tokio::time::sleep(interval).await;
            on_tick().await;
        }
    }
}
