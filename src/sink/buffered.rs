//! `BufferedSink`：`MessageQueue` + `channelTimeout`，独立消费者任务
//! 独立消费者任务逐条弹出并分发。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::ids::StreamId;
use crate::message::Message;
use crate::modulator::ModulatorArray;
use crate::queue::{MessageQueue, PushOutcome, PushTimeout};
use crate::registry::StreamRegistry;
use crate::router::Sink as RouterSink;

use super::{OnMessage, PreCheckOutcome, SinkCore, SinkLifecycle};

pub struct BufferedSink {
    core: SinkCore,
    queue: Arc<MessageQueue>,
    channel_timeout: PushTimeout,
    on_message: OnMessage,
}

impl BufferedSink {
    pub fn new(
        id: impl Into<String>,
        fallback_stream: StreamId,
        modulators: ModulatorArray,
        shutdown_timeout: Duration,
        registry: Arc<StreamRegistry>,
        capacity: usize,
        channel_timeout: PushTimeout,
        on_message: OnMessage,
    ) -> Self {
        Self {
            core: SinkCore::new(id, fallback_stream, modulators, shutdown_timeout, registry),
            queue: Arc::new(MessageQueue::new(capacity)),
            channel_timeout,
            on_message,
        }
    }

    pub fn core(&self) -> &SinkCore {
        &self.core
    }

    fn dispatch(&self, msg: Message) -> Result<(), CoreError> {
        let on_message = self.on_message.clone();
        match std::panic::catch_unwind(AssertUnwindSafe(|| on_message(msg))) {
            Ok(result) => result,
            Err(_) => {
                self.core.registry().metrics().incr_messages_discarded();
                tracing::error!(sink = %self.core.id(), "onMessage panicked while draining buffered sink");
                Ok(())
            }
        }
    }

    /// 消费者任务体：持续从队列弹出并分发，直至队列关闭且排空
    /// （独立消费者任务）。独立于控制回路运行。
    pub async fn consumer_loop(&self) {
        while let Some(msg) = self.queue.pop().await {
            let _ = self.dispatch(msg);
        }
    }

    /// `MessageControlLoop`：在后台任务启动控制回路，当前任务内联运行
    /// 消费者循环，直至状态离开 `Active`——`Stop` 驱动控制回路关闭队列，
    /// 消费者循环随队列排空而自然退出，二者在此汇合。
    pub async fn message_control_loop(self: &Arc<Self>) {
        let control_handle = {
            let sink = self.clone();
            tokio::spawn(async move { sink.core.control_loop(sink.as_ref()).await })
        };
        self.consumer_loop().await;
        let _ = control_handle.await;
    }

    /// `DefaultDrain`（`PrepareStop` 时注册）：以 `shutdownTimeout` 为超时
    /// 逐条弹出并分发，弹出超时且队列已空时停止。
    async fn default_drain(&self) {
        loop {
            match self.queue.pop_with_timeout(self.core.shutdown_timeout()).await {
                Some(msg) => {
                    let _ = self.dispatch(msg);
                }
                None => {
                    if self.queue.is_empty() {
                        return;
                    }
                }
            }
        }
    }

    /// `DefaultClose`（`Stop` 时注册）：先 `DefaultDrain`，关闭队列后排空
    /// 剩余条目；每条分发都受 `shutdownTimeout` 限制，超时的消息记为
    /// "leaked"。
    async fn default_close(&self) {
        self.default_drain().await;
        self.queue.close();
        while let Some(msg) = self.queue.try_pop_remaining() {
            let started = tokio::time::Instant::now();
            let _ = self.dispatch(msg);
            if started.elapsed() > self.core.shutdown_timeout() {
                tracing::warn!(sink = %self.core.id(), "message leaked: dispatch exceeded shutdown timeout during close");
            }
        }
    }
}

#[async_trait]
impl SinkLifecycle for BufferedSink {
    async fn on_prepare_stop(&self) {
        self.default_drain().await;
    }

    async fn on_stop(&self) {
        self.default_close().await;
    }
}

#[async_trait]
impl RouterSink for BufferedSink {
    fn id(&self) -> &str {
        self.core.id()
    }

    async fn enqueue(&self, msg: Message) -> Result<(), CoreError> {
        match self.core.pre_check(msg).await {
            PreCheckOutcome::Handled(result) => result,
            PreCheckOutcome::Proceed(msg) => {
                let snapshot = msg.clone();
                match self.queue.push(msg, self.channel_timeout).await {
                    PushOutcome::Ok => {
                        self.core.mark_active();
                        Ok(())
                    }
                    PushOutcome::Timeout => self.core.handle_enqueue_timeout(&snapshot).await,
                    PushOutcome::Discard => {
                        self.core.handle_enqueue_discard();
                        Ok(())
                    }
                }
            }
        }
    }
}
