//! 有界消息队列：阻塞 / 非阻塞 / 限时 Push，严格 FIFO。
//!
//! # 设计背景（Why）
//! - 缓冲 Sink 需要在"生产者过快"时有三种互不相同的处置策略：立即丢弃、
//!   无限等待、限时等待后放弃——三者对应配置里的 `ChannelTimeoutMs < 0 / == 0 / > 0`。
//! - `timeout > 0` 的路径使用"有界忙让出（渐进退避的协作式自旋）"
//!   而非纯粹的条件变量等待：这样在截止时间即将到达时能更快地感知队列腾出
//!   空间，代价是截止期内有少量忙等开销。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::message::Message;

/// `Push` 的超时策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushTimeout {
    /// `timeout < 0`：队列已满时立即丢弃，从不阻塞。
    NeverBlock,
    /// `timeout == 0`：阻塞直至有空位或队列关闭。
    Block,
    /// `timeout > 0`：有界忙让出，超过时限返回 `Timeout`。
    Bounded(Duration),
}

/// `Push` 的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Ok,
    Timeout,
    Discard,
}

struct Inner {
    items: VecDeque<Message>,
    capacity: usize,
    closed: bool,
}

/// 有界 FIFO 队列。`capacity == 0` 表示同步交接：队列没有自己的存储槽位，
/// 一次 Push 只有在已经有一个 Pop 在等待时才会被接受，消息随即被那个等待者
/// 取走——否则 `items.len() >= capacity` 恒为 `0 >= 0`，Push 将永远无法成功，
/// 队列也就无法再称为"同步交接"。`waiting_poppers` 记录当前正在等待新条目
/// 的 Pop 数量，只在 `capacity == 0` 时参与容量判定。
pub struct MessageQueue {
    inner: Mutex<Inner>,
    not_empty: Notify,
    not_full: Notify,
    waiting_poppers: AtomicUsize,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            waiting_poppers: AtomicUsize::new(0),
        }
    }

    fn try_push(&self, msg: Message) -> Result<(), Message> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(msg);
        }
        let effective_capacity = if guard.capacity == 0 {
            if self.waiting_poppers.load(Ordering::Acquire) > 0 {
                1
            } else {
                0
            }
        } else {
            guard.capacity
        };
        if guard.items.len() >= effective_capacity {
            return Err(msg);
        }
        guard.items.push_back(msg);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// 按 `timeout` 策略推入一条消息。
    pub async fn push(&self, msg: Message, timeout: PushTimeout) -> PushOutcome {
        if self.inner.lock().closed {
            return PushOutcome::Discard;
        }

        match timeout {
            PushTimeout::NeverBlock => match self.try_push(msg) {
                Ok(()) => PushOutcome::Ok,
                Err(_) => PushOutcome::Discard,
            },
            PushTimeout::Block => {
                let mut msg = msg;
                loop {
                    match self.try_push(msg) {
                        Ok(()) => return PushOutcome::Ok,
                        Err(returned) => {
                            if self.inner.lock().closed {
                                return PushOutcome::Discard;
                            }
                            msg = returned;
                            self.not_full.notified().await;
                        }
                    }
                }
            }
            PushTimeout::Bounded(budget) => {
                let deadline = Instant::now() + budget;
                let mut msg = msg;
                let mut backoff = Duration::from_micros(1);
                loop {
                    match self.try_push(msg) {
                        Ok(()) => return PushOutcome::Ok,
                        Err(returned) => {
                            msg = returned;
                            if self.inner.lock().closed {
                                return PushOutcome::Discard;
                            }
                            if Instant::now() >= deadline {
                                return PushOutcome::Timeout;
                            }
                            tokio::task::yield_now().await;
                            let remaining = deadline.saturating_duration_since(Instant::now());
                            if remaining.is_zero() {
                                return PushOutcome::Timeout;
                            }
                            tokio::time::sleep(backoff.min(remaining)).await;
                            backoff = (backoff * 2).min(Duration::from_millis(10));
                        }
                    }
                }
            }
        }
    }

    fn try_pop(&self) -> Option<Message> {
        let mut guard = self.inner.lock();
        let msg = guard.items.pop_front()?;
        drop(guard);
        self.not_full.notify_one();
        Some(msg)
    }

    /// 注册为"正在等待的 Pop"：`capacity == 0` 的队列据此判断是否有人在
    /// 场接收，从而允许恰好一次同步交接的 Push 成功。
    fn enter_waiting(&self) {
        self.waiting_poppers.fetch_add(1, Ordering::AcqRel);
        self.not_full.notify_one();
    }

    fn leave_waiting(&self) {
        self.waiting_poppers.fetch_sub(1, Ordering::AcqRel);
    }

    /// 阻塞直至有条目可用，或队列已关闭且为空（此时返回 `None`）。
    ///
    /// Rust 惯用写法：spec 原文以 Go 风格的 `(msg, more)` 二元组表达"channel
    /// 已关闭时收到零值"，这里改用 `Option`——`None` 恰好承载同一信息
    /// （`more == false`），且不需要为"没有消息"伪造一个哨兵 `Message`。
    pub async fn pop(&self) -> Option<Message> {
        self.enter_waiting();
        let result = loop {
            if let Some(msg) = self.try_pop() {
                break Some(msg);
            }
            if self.inner.lock().closed {
                break None;
            }
            self.not_empty.notified().await;
        };
        self.leave_waiting();
        result
    }

    /// 限时弹出；`d` 到期且无条目时返回 `None`。
    pub async fn pop_with_timeout(&self, d: Duration) -> Option<Message> {
        let deadline = Instant::now() + d;
        self.enter_waiting();
        let result = loop {
            if let Some(msg) = self.try_pop() {
                break Some(msg);
            }
            if self.inner.lock().closed {
                break None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break None;
            }
            tokio::select! {
                _ = self.not_empty.notified() => {}
                _ = tokio::time::sleep(remaining) => break None,
            }
        };
        self.leave_waiting();
        result
    }

    /// 关闭队列：唤醒所有阻塞的弹出者；后续 `pop`/`pop_with_timeout` 会先排空
    /// 剩余条目，再报告 `more == false` / `None`。
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// 非阻塞地弹出一条（若有）；供关闭后的最终排空使用
    /// （`DefaultClose`："关闭队列后排空剩余条目"）。
    pub fn try_pop_remaining(&self) -> Option<Message> {
        self.try_pop()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn get_num_queued(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
