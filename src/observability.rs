//! 日志与指标门面：计数器命名与健康检查语义落地在这里，具体传输留给
//! 系统边界之外的组件。
//!
//! # 设计背景（Why）
//! - 本 crate 没有独立的 trace-propagation/OpsEventBus 层，只保留 Metrics 与
//!   一个轻量 HealthCheck 契约，日志直接使用 `tracing` 的宏，不再包一层
//!   Logger trait。
//! - 指标传输（Prometheus/StatsD 等）不在范围内；这里只承诺稳定的计数器
//!   *名称* 与 *语义*，具体导出交给系统边界之外的组件。

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::ids::StreamId;

/// 聚合计数器，以及按流 ID 拆分的 per-stream 计数器。
#[derive(Default)]
pub struct AtomicMetrics {
    streams: AtomicU64,
    fallback_streams: AtomicU64,
    messages: AtomicU64,
    messages_discarded: AtomicU64,
    messages_routed: AtomicU64,
    messages_filtered: AtomicU64,
    active_workers: AtomicU64,
    per_stream: DashMap<u64, AtomicU64>,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_streams(&self) {
        self.streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_fallback_streams(&self) {
        self.fallback_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_messages(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_messages_discarded(&self) {
        self.messages_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_messages_routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_messages_filtered(&self) {
        self.messages_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_workers(&self, n: u64) {
        self.active_workers.store(n, Ordering::Relaxed);
    }

    pub fn active_workers(&self) -> u64 {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// 按流 ID 递增一次计数；该流首次出现时惰性创建计数器。
    pub fn incr_per_stream(&self, stream: StreamId) {
        self.per_stream
            .entry(stream.as_u64())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn per_stream_count(&self, stream: StreamId) -> u64 {
        self.per_stream
            .get(&stream.as_u64())
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn streams(&self) -> u64 {
        self.streams.load(Ordering::Relaxed)
    }

    pub fn fallback_streams(&self) -> u64 {
        self.fallback_streams.load(Ordering::Relaxed)
    }

    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    pub fn messages_discarded(&self) -> u64 {
        self.messages_discarded.load(Ordering::Relaxed)
    }

    pub fn messages_routed(&self) -> u64 {
        self.messages_routed.load(Ordering::Relaxed)
    }

    pub fn messages_filtered(&self) -> u64 {
        self.messages_filtered.load(Ordering::Relaxed)
    }
}

/// 一个组件（目前主要是 Sink）在某一时刻的健康快照，供 §6
/// `/<pluginID>/pluginState` 语义落地——本 crate 不跑 HTTP，只给出状态与
/// 对应的状态码，由系统边界接入实际传输。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentHealthState {
    Active,
    Waiting,
    PrepareStop,
    Stopping,
    Dead,
    Initializing,
}

impl ComponentHealthState {
    /// `Active` → 200，其余 → 503。
    pub fn status_code(self) -> u16 {
        match self {
            ComponentHealthState::Active => 200,
            _ => 503,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ComponentHealthState::Active => "active",
            ComponentHealthState::Waiting => "waiting",
            ComponentHealthState::PrepareStop => "preparing to stop",
            ComponentHealthState::Stopping => "stopping",
            ComponentHealthState::Dead => "dead",
            ComponentHealthState::Initializing => "initializing",
        }
    }
}

pub trait HealthCheckProvider: Send + Sync {
    fn health(&self) -> ComponentHealthState;
}
