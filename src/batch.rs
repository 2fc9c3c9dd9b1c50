//! `MessageBatch`：双缓冲无锁累积器，供批量 Sink 使用。
//!
//! # 设计背景（Why）
//! - 批量 Sink 必须能在生产者线程上接受消息而不必为每条消息获取互斥锁，
//!   同时后台 Flush 需要拿到一份"提交完成"的一致快照。拆分 `written_count`
//!   （预占槽位）与 `committed_count`（写入完成）正是为了让 `Flush` 能精确
//!   等到所有"在途写者"提交完毕，再读取快照——不能简化成单一计数器。
//! - 本 crate 在 lib.rs 顶层声明了 `#![deny(unsafe_code)]`，因此槽位数组用
//!   `Vec<Mutex<Option<Message>>>` 承载而非裸指针写入：槽位的*预占*仍然是
//!   一次无锁的原子 `fetch_add`，而每个槽位在整个批次周期内只会被预占到它
//!   的那一个写者触碰一次，互斥锁在该路径上永不产生实际竞争，因而保留了
//!   "生产者不必等待全局锁"的设计意图。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::message::Message;

struct SlotBuffer {
    slots: Vec<Mutex<Option<Message>>>,
    written_count: AtomicUsize,
    committed_count: AtomicUsize,
}

impl SlotBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Mutex::new(None)).collect(),
            written_count: AtomicUsize::new(0),
            committed_count: AtomicUsize::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn reset(&self) {
        self.written_count.store(0, Ordering::SeqCst);
        self.committed_count.store(0, Ordering::SeqCst);
    }
}

/// 双缓冲累积器。`Append` 写入"活动"缓冲，`Flush` 原子切换活动索引并等待
/// 刚变为非活动的缓冲排空在途写者后，交给调用方提供的回调处理。
pub struct MessageBatch {
    buffers: [SlotBuffer; 2],
    active_index: AtomicUsize,
    flush_lock: tokio::sync::Mutex<()>,
    last_flush_time: Mutex<Instant>,
    closed: std::sync::atomic::AtomicBool,
}

impl MessageBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: [SlotBuffer::new(capacity), SlotBuffer::new(capacity)],
            active_index: AtomicUsize::new(0),
            flush_lock: tokio::sync::Mutex::new(()),
            last_flush_time: Mutex::new(Instant::now()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn active(&self) -> &SlotBuffer {
        &self.buffers[self.active_index.load(Ordering::Acquire)]
    }

    /// 预占活动缓冲的下一个槽位并写入消息；槽位数超过容量时回滚计数，
    /// 视为"已满"。批次关闭后恒为 `false`。
    pub fn append(&self, msg: Message) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let buf = self.active();
        let idx = buf.written_count.fetch_add(1, Ordering::AcqRel);
        if idx >= buf.capacity() {
            buf.written_count.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        *buf.slots[idx].lock() = Some(msg);
        buf.committed_count.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// 先尝试 `append`；若失败则在 `still_active()` 为真时触发一次刷新并重试
    /// 一次，否则把消息交给 `drop_fn`。
    pub async fn append_or_flush<F, Fut, S, D>(&self, msg: Message, flush_fn: F, still_active: S, drop_fn: D)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
        S: FnOnce() -> bool,
        D: FnOnce(Message),
    {
        if self.append(msg.clone()) {
            return;
        }
        if still_active() {
            flush_fn().await;
            if !self.append(msg.clone()) {
                drop_fn(msg);
            }
        } else {
            drop_fn(msg);
        }
    }

    /// 协作式自旋直至成功或批次关闭。
    pub async fn append_or_block(&self, msg: Message) -> bool {
        loop {
            if self.append(msg.clone()) {
                return true;
            }
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            tokio::task::yield_now().await;
        }
    }

    /// 切换活动缓冲、等待旧活动缓冲排空在途写者，并把快照交给 `assembly`
    /// 在后台任务上处理。
    pub async fn flush<A, Fut>(&self, assembly: A)
    where
        A: FnOnce(Vec<Message>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let _guard = self.flush_lock.lock().await;
        let old_index = self.active_index.swap(1 - self.active_index.load(Ordering::Acquire), Ordering::AcqRel);
        let old_buf = &self.buffers[old_index];

        while old_buf.committed_count.load(Ordering::Acquire) < old_buf.written_count.load(Ordering::Acquire) {
            tokio::task::yield_now().await;
        }

        let committed = old_buf.committed_count.load(Ordering::Acquire);
        let mut snapshot = Vec::with_capacity(committed);
        for slot in old_buf.slots.iter().take(committed) {
            if let Some(msg) = slot.lock().take() {
                snapshot.push(msg);
            }
        }
        old_buf.reset();
        *self.last_flush_time.lock() = Instant::now();

        tokio::spawn(async move {
            assembly(snapshot).await;
        });
    }

    /// 标记批次关闭，在 `grace_timeout` 预算内做最后一次 `Flush`；若超时仍有
    /// 残留消息则同步交给 `assembly`。
    pub async fn close<A, Fut>(&self, assembly: A, grace_timeout: Duration)
    where
        A: Fn(Vec<Message>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        self.closed.store(true, Ordering::Release);
        let _guard = self.flush_lock.lock().await;
        let old_index = self.active_index.swap(1 - self.active_index.load(Ordering::Acquire), Ordering::AcqRel);
        let old_buf = &self.buffers[old_index];

        let deadline = Instant::now() + grace_timeout;
        while old_buf.committed_count.load(Ordering::Acquire) < old_buf.written_count.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                break;
            }
            tokio::task::yield_now().await;
        }

        let committed = old_buf.committed_count.load(Ordering::Acquire);
        let mut snapshot = Vec::with_capacity(committed);
        for slot in old_buf.slots.iter().take(committed) {
            if let Some(msg) = slot.lock().take() {
                snapshot.push(msg);
            }
        }
        old_buf.reset();
        assembly(snapshot).await;
    }

    pub fn reached_size_threshold(&self, n: usize) -> bool {
        self.active().committed_count.load(Ordering::Acquire) >= n
    }

    pub fn reached_time_threshold(&self, d: Duration) -> bool {
        self.active().committed_count.load(Ordering::Acquire) > 0
            && self.last_flush_time.lock().elapsed() >= d
    }

    pub async fn wait_for_flush(&self, d: Duration) {
        let _ = tokio::time::timeout(d, self.flush_lock.lock()).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
