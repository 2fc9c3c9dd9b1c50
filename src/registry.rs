//! `StreamRegistry`：name↔id 映射、通配符订阅者与 fallback Router 创建。
//!
//! # 设计背景（Why）
//! - 注册表是热路径唯一允许触碰的"全局"状态，因此查找路径必须
//!   是读多写少、低争用的；`DashMap` 按键分片加锁，满足"永不争用单一
//!   进程级互斥锁"的要求，同时仍对外表现为一把锁。

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::ids::{reserved, StreamId};
use crate::observability::AtomicMetrics;
use crate::router::{BroadcastRouter, Router, Sink};

/// 保留流名称反查使用的规范名称；避免为它们去查 `names` 映射。
fn canonical_reserved_name(id: StreamId) -> Option<&'static str> {
    if id == StreamId::INVALID {
        Some(reserved::INVALID)
    } else if id == StreamId::WILDCARD {
        Some(reserved::WILDCARD)
    } else if id == StreamId::LOG_INTERNAL {
        Some(reserved::LOG_INTERNAL)
    } else if id == StreamId::TRACE_INTERNAL {
        Some(reserved::TRACE_INTERNAL)
    } else {
        None
    }
}

/// `routers: StreamID → Router`、`names: StreamID → string`、
/// `wildcardSinks: list<Sink>`。
pub struct StreamRegistry {
    routers: DashMap<u64, Arc<dyn Router>>,
    names: DashMap<u64, String>,
    wildcard_sinks: Mutex<Vec<Arc<dyn Sink>>>,
    metrics: Arc<AtomicMetrics>,
    fallback_timeout: std::time::Duration,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(AtomicMetrics::new()))
    }

    pub fn with_metrics(metrics: Arc<AtomicMetrics>) -> Self {
        Self {
            routers: DashMap::new(),
            names: DashMap::new(),
            wildcard_sinks: Mutex::new(Vec::new()),
            metrics,
            fallback_timeout: std::time::Duration::from_secs(1),
        }
    }

    pub fn metrics(&self) -> &AtomicMetrics {
        &self.metrics
    }

    /// 对流名称做纯函数式哈希，同时在 `names` 映射下记录反查条目。
    /// 首次出现的名称计入 "streams" 指标。
    pub fn get_stream_id(&self, name: &str) -> StreamId {
        let id = StreamId::from_name(name);
        let previous = self.names.insert(id.as_u64(), name.to_string());
        if previous.is_none() {
            self.metrics.incr_streams();
        }
        id
    }

    /// 保留 id 直接返回规范名称，不查 `names` 映射。
    pub fn get_stream_name(&self, id: StreamId) -> Option<String> {
        if let Some(canonical) = canonical_reserved_name(id) {
            return Some(canonical.to_string());
        }
        self.names.get(&id.as_u64()).map(|entry| entry.value().clone())
    }

    /// 已注册的 Router；不存在也不自动创建 fallback（`route` 的 trace 钩子
    /// 等只读路径使用）。
    pub fn get_router(&self, id: StreamId) -> Option<Arc<dyn Router>> {
        self.routers.get(&id.as_u64()).map(|entry| entry.value().clone())
    }

    /// 已占用流重新注册时替换旧 Router 并记录警告。
    pub fn register_router(&self, id: StreamId, router: Arc<dyn Router>) {
        if self.routers.insert(id.as_u64(), router).is_some() {
            tracing::warn!(stream = %id, "replacing previously registered router");
        }
    }

    pub fn add_wildcard_sink(&self, sink: Arc<dyn Sink>) {
        self.wildcard_sinks.lock().push(sink);
    }

    /// `GetRouterOrFallback(id)`：`Invalid` 返回 `None`；已注册
    /// 则直接返回；否则创建一个挂载了全部通配符 Sink（`LogInternal` 除外）
    /// 的广播 fallback Router，注册并计数 "streams"/"fallback-streams"。
    ///
    /// 用 `DashMap::entry` 而非"先 `get` 再 `insert`"：后者在两个并发的
    /// 首条消息同时落在同一未路由流上时会各自判定"不存在"，各自构造一个
    /// fallback Router 并各自计数，使指标重复计入且其中一个广播 Router
    /// 白白构造后被覆盖。`entry` 持有分片写锁贯穿"检查 + 构造 + 插入"的
    /// 整个过程，恰好满足 §5 要求的"注册表写入在锁下串行化"。
    pub fn get_router_or_fallback(&self, id: StreamId) -> Option<Arc<dyn Router>> {
        if id.is_invalid() {
            return None;
        }

        let mut created = false;
        let entry = self.routers.entry(id.as_u64()).or_insert_with(|| {
            created = true;
            let synthetic_name = format!("{}fallback-{:#018x}", reserved::LEGACY_DROPPED, id.as_u64());
            let fallback = Arc::new(BroadcastRouter::new(
                synthetic_name,
                id,
                crate::modulator::ModulatorArray::new(),
                self.fallback_timeout,
            ));

            if id != StreamId::LOG_INTERNAL {
                for sink in self.wildcard_sinks.lock().iter() {
                    fallback.add_sink(sink.clone());
                }
            }

            fallback as Arc<dyn Router>
        });
        let router = entry.value().clone();
        drop(entry);

        if created {
            self.metrics.incr_streams();
            self.metrics.incr_fallback_streams();
        }
        Some(router)
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
