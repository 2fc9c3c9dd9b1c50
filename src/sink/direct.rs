//! `DirectSink`：在入队线程上同步调用 `onMessage`，无中间缓冲。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::ids::StreamId;
use crate::message::Message;
use crate::modulator::ModulatorArray;
use crate::registry::StreamRegistry;
use crate::router::Sink as RouterSink;

use super::{OnMessage, PreCheckOutcome, SinkCore, SinkLifecycle};

pub struct DirectSink {
    core: SinkCore,
    on_message: OnMessage,
}

impl DirectSink {
    pub fn new(
        id: impl Into<String>,
        fallback_stream: StreamId,
        modulators: ModulatorArray,
        shutdown_timeout: Duration,
        registry: Arc<StreamRegistry>,
        on_message: OnMessage,
    ) -> Self {
        Self {
            core: SinkCore::new(id, fallback_stream, modulators, shutdown_timeout, registry),
            on_message,
        }
    }

    pub fn core(&self) -> &SinkCore {
        &self.core
    }
}

#[async_trait]
impl SinkLifecycle for DirectSink {}

#[async_trait]
impl RouterSink for DirectSink {
    fn id(&self) -> &str {
        self.core.id()
    }

    /// 预检放行后，在当前（入队）任务上同步调用 `onMessage`；一次恐慌
    /// 被 `catch_unwind` 吸收，计入 discarded 并改道到 Fallback 流
    /// （Enqueue 的恐慌防护步骤）。
    async fn enqueue(&self, msg: Message) -> Result<(), CoreError> {
        match self.core.pre_check(msg).await {
            PreCheckOutcome::Handled(result) => result,
            PreCheckOutcome::Proceed(msg) => {
                let snapshot = msg.clone();
                let on_message = self.on_message.clone();
                match std::panic::catch_unwind(AssertUnwindSafe(|| on_message(msg))) {
                    Ok(result) => result,
                    Err(_) => {
                        self.core.registry().metrics().incr_messages_discarded();
                        tracing::error!(
                            sink = %self.core.id(),
                            state = ?self.core.state(),
                            stream = %snapshot.stream_id(),
                            "onMessage panicked, routing to fallback"
                        );
                        self.core.try_fallback(&snapshot).await
                    }
                }
            }
        }
    }
}
