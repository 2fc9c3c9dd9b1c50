//! `Router` 基座、`Sink` 出口契约与 `Route`/`RouteOriginal` 分发器。
//!
//! # 设计背景（Why）
//! - `Route` 是一个天然递归的控制流（`Fallback` 改道后再次 `Route`），而
//!   Rust 的 `async fn` 不能直接自递归——这里用返回 `Pin<Box<dyn Future>>`
//!   的显式写法打破递归类型，是该模式的标准解法，不引入额外依赖。
//! - `RouteOriginal` 提升为公开 API：Sink 在"入队失败
//!   后改道"（`TryFallback`，见 `sink` 模块）时直接调用它。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::error::{codes, CoreError, ErrorCategory};
use crate::ids::StreamId;
use crate::message::Message;
use crate::modulator::{ModulatorArray, ModulatorVerdict};
use crate::registry::StreamRegistry;

/// 消息的最终出口：队列、批量累积器或直接回调背后的统一契约（由 `sink`
/// 模块的三种实现满足）。
#[async_trait]
pub trait Sink: Send + Sync {
    fn id(&self) -> &str;
    async fn enqueue(&self, msg: Message) -> Result<(), CoreError>;
}

/// 每个流的分发入口：应用 Modulator 链，再交给具体的投递策略
/// （目前只有 `BroadcastRouter` 在范围内）。
#[async_trait]
pub trait Router: Send + Sync {
    fn id(&self) -> &str;
    fn stream_id(&self) -> StreamId;
    /// 按身份去重后加入订阅的 Sink 列表。
    fn add_sink(&self, sink: Arc<dyn Sink>);
    async fn modulate(&self, msg: &mut Message) -> ModulatorVerdict;
    async fn enqueue(&self, msg: Message) -> Result<(), CoreError>;
}

/// 向所有订阅的 Sink 广播投递；是目前唯一在范围内的投递策略
/// （round-robin/routed/random 等留给调用方未来扩展)。
pub struct BroadcastRouter {
    id: String,
    stream_id: StreamId,
    sinks: ArcSwap<Vec<Arc<dyn Sink>>>,
    modulators: ModulatorArray,
    per_message_timeout: Duration,
}

impl BroadcastRouter {
    pub fn new(id: impl Into<String>, stream_id: StreamId, modulators: ModulatorArray, per_message_timeout: Duration) -> Self {
        Self {
            id: id.into(),
            stream_id,
            sinks: ArcSwap::from_pointee(Vec::new()),
            modulators,
            per_message_timeout,
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.load().len()
    }
}

#[async_trait]
impl Router for BroadcastRouter {
    fn id(&self) -> &str {
        &self.id
    }

    fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// 按身份（指针相等）去重后加入订阅列表；读路径（`enqueue`）永远不会
    /// 等待这次写入的锁——`ArcSwap` 让热路径只做一次原子指针加载，
    /// 绝不争用全局互斥锁。
    fn add_sink(&self, sink: Arc<dyn Sink>) {
        let current = self.sinks.load();
        if current.iter().any(|existing| Arc::ptr_eq(existing, &sink)) {
            return;
        }
        let mut next = (**current).clone();
        next.push(sink);
        self.sinks.store(Arc::new(next));
    }

    async fn modulate(&self, msg: &mut Message) -> ModulatorVerdict {
        self.modulators.modulate(msg).await
    }

    async fn enqueue(&self, msg: Message) -> Result<(), CoreError> {
        let sinks = self.sinks.load_full();
        let mut first_error = None;
        for sink in sinks.iter() {
            let result = tokio::time::timeout(self.per_message_timeout, sink.enqueue(msg.clone())).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(
                            CoreError::new(codes::ROUTER_SINK_TIMEOUT, "sink enqueue exceeded router timeout")
                                .with_category(ErrorCategory::Timeout),
                        );
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn emit_trace(msg: &Message, registry: &StreamRegistry) {
    if let Some(trace_router) = registry.get_router(StreamId::TRACE_INTERNAL) {
        if let Err(err) = trace_router.enqueue(msg.clone()).await {
            tracing::warn!(error = %err, "trace emission failed");
        }
    }
}

/// `Route(msg, router)`：
/// 1. `router` 为空：计数 discarded，成功返回。
/// 2. `Modulate`：`Discard` 计数返回；`Continue` 计数 routed、触发 trace
///    钩子后 `Enqueue`；`Fallback` 在同流复用时报路由环路错误，否则按
///    `msg.streamID` 解析新 Router 递归路由（**不**恢复原始载荷——就地
///    修改后的改道按设计路由被修改后的消息）。
pub fn route<'a>(
    mut msg: Message,
    router: Option<Arc<dyn Router>>,
    registry: &'a StreamRegistry,
) -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + 'a>> {
    Box::pin(async move {
        registry.metrics().incr_messages();
        let router = match router {
            None => {
                registry.metrics().incr_messages_discarded();
                return Ok(());
            }
            Some(r) => r,
        };

        match router.modulate(&mut msg).await {
            ModulatorVerdict::Discard => {
                registry.metrics().incr_messages_discarded();
                Ok(())
            }
            ModulatorVerdict::Continue => {
                registry.metrics().incr_messages_routed();
                registry.metrics().incr_per_stream(msg.stream_id());
                emit_trace(&msg, registry).await;
                router.enqueue(msg).await
            }
            ModulatorVerdict::Fallback => {
                // A `Fallback` verdict only ever originates from a `Filter`'s
                // `Reject(target)` — `FormatterModulator` never emits it (§4.3) —
                // so this is the one point in the dispatcher where "filtered"
                // can be attributed unambiguously, as opposed to "discarded".
                registry.metrics().incr_messages_filtered();
                if msg.stream_id() == router.stream_id() {
                    return Err(CoreError::new(codes::ROUTE_LOOP, "fallback target equals current router's stream")
                        .with_category(ErrorCategory::RoutingLoop));
                }
                let target = registry.get_router_or_fallback(msg.stream_id());
                route(msg, target, registry).await
            }
        }
    })
}

/// `RouteOriginal(msg, router)`：克隆
/// `msg` 的原始快照（或当前值，若从未 `FreezeOriginal`）并对其调用
/// [`route`]。Sink 在入队失败后改道投递未被修改的原始消息时使用。
pub fn route_original<'a>(
    msg: &Message,
    router: Option<Arc<dyn Router>>,
    registry: &'a StreamRegistry,
) -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + 'a>> {
    let original = msg.clone_original();
    route(original, router, registry)
}
