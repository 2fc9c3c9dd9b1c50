//! `BatchedSink`：`MessageBatch` + 定时/定量双阈值刷新。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::batch::MessageBatch;
use crate::error::CoreError;
use crate::ids::StreamId;
use crate::message::Message;
use crate::modulator::ModulatorArray;
use crate::registry::StreamRegistry;
use crate::router::Sink as RouterSink;

use super::{PreCheckOutcome, SinkCore, SinkLifecycle, SinkState};

/// 一次刷新得到的快照的处理回调；与 `OnMessage` 不同，收到的是一批消息。
pub type OnFlush = Arc<dyn Fn(Vec<Message>) + Send + Sync>;

pub struct BatchedSink {
    core: SinkCore,
    batch: Arc<MessageBatch>,
    batch_flush_count: usize,
    batch_timeout: Duration,
    on_flush: OnFlush,
}

impl BatchedSink {
    pub fn new(
        id: impl Into<String>,
        fallback_stream: StreamId,
        modulators: ModulatorArray,
        shutdown_timeout: Duration,
        registry: Arc<StreamRegistry>,
        batch_max_count: usize,
        batch_flush_count: usize,
        batch_timeout: Duration,
        on_flush: OnFlush,
    ) -> Self {
        Self {
            core: SinkCore::new(id, fallback_stream, modulators, shutdown_timeout, registry),
            batch: Arc::new(MessageBatch::new(batch_max_count)),
            batch_flush_count: batch_flush_count.min(batch_max_count),
            batch_timeout,
            on_flush,
        }
    }

    pub fn core(&self) -> &SinkCore {
        &self.core
    }

    /// 启动一次后台刷新并等待其提交（供 `AppendOrFlush` 与 ticker 共用）。
    async fn flush_now(&self) {
        let on_flush = self.on_flush.clone();
        self.batch
            .flush(move |items| {
                let on_flush = on_flush.clone();
                async move { on_flush(items) }
            })
            .await;
    }

    /// 定时刷新任务体：按 `batchTimeout` 轮询定量/定时阈值，达到任一则
    /// 触发 `Flush`（ticker 按时间或大小阈值刷新）。独立于
    /// 控制回路运行，直至 Sink 进入 `Stopping`（此后由 `on_stop` 做最终刷新）。
    pub async fn ticker_loop(&self) {
        loop {
            tokio::time::sleep(self.batch_timeout).await;
            if self.core.state() >= SinkState::Stopping {
                return;
            }
            if self.batch.reached_size_threshold(self.batch_flush_count) || self.batch.reached_time_threshold(self.batch_timeout) {
                self.flush_now().await;
            }
        }
    }

    /// `TickerMessageControlLoop`：在后台任务启动控制回路，当前任务内联
    /// 运行 ticker 循环，直至状态离开 `Active`——ticker 在状态达到
    /// `Stopping` 时自行返回，`on_stop` 接手最终一次 `Flush`。
    pub async fn ticker_message_control_loop(self: &Arc<Self>) {
        let control_handle = {
            let sink = self.clone();
            tokio::spawn(async move { sink.core.control_loop(sink.as_ref()).await })
        };
        self.ticker_loop().await;
        let _ = control_handle.await;
    }
}

#[async_trait]
impl SinkLifecycle for BatchedSink {
    async fn on_stop(&self) {
        let on_flush = self.on_flush.clone();
        self.batch
            .close(move |items| { let on_flush = on_flush.clone(); async move { on_flush(items) } }, self.core.shutdown_timeout())
            .await;
    }
}

#[async_trait]
impl RouterSink for BatchedSink {
    fn id(&self) -> &str {
        self.core.id()
    }

    /// `AppendOrFlush(msg, flushFn, stillActive, dropFn)`：先
    /// 尝试 `Append`；满了则在仍处于活动态时触发一次刷新并重试，否则把
    /// 消息计入 discarded 并改道到 Fallback 流。
    async fn enqueue(&self, msg: Message) -> Result<(), CoreError> {
        match self.core.pre_check(msg).await {
            PreCheckOutcome::Handled(result) => result,
            PreCheckOutcome::Proceed(msg) => {
                let snapshot = msg.clone();
                let still_active = self.core.state() < SinkState::Stopping;
                let dropped = Arc::new(AtomicBool::new(false));
                let dropped_flag = dropped.clone();

                let on_flush = self.on_flush.clone();
                let batch_for_flush = self.batch.clone();
                self.batch
                    .append_or_flush(
                        msg,
                        move || async move {
                            batch_for_flush
                                .flush(move |items| {
                                    let on_flush = on_flush.clone();
                                    async move { on_flush(items) }
                                })
                                .await;
                        },
                        move || still_active,
                        move |_dropped_msg| dropped_flag.store(true, Ordering::SeqCst),
                    )
                    .await;

                if dropped.load(Ordering::SeqCst) {
                    self.core.handle_enqueue_discard();
                    self.core.try_fallback(&snapshot).await
                } else {
                    self.core.mark_active();
                    Ok(())
                }
            }
        }
    }
}
