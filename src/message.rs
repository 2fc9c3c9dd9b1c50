//! `Message`：载荷 + 元数据 + 流谱系 + 原始快照。
//!
//! # 设计背景（Why）
//! - 消息在 Source → Router → Sink 的流水线上被反复传递与变换；必须有明确
//!   的"谁拥有它"语义（单一所有权、按值转移）与"何时可以恢复原貌"语义
//!   （`FreezeOriginal`/`CloneOriginal`），否则 Fallback 与审计路径无法正确工作。
//! - 载荷与元数据使用拥有所有权的 `Vec`，而非引用计数的 `bytes::Bytes`：
//!   "克隆体的变更不可观察地影响原件"是一条硬性不变式，对日志体量级别的
//!   消息而言深拷贝的成本可接受，选择值语义换取这条不变式的零心智负担。
//!
//! # 契约说明（What）
//! - `SetStreamID` 必须记录 `prevStreamID`；`FreezeOriginal` 幂等；
//!   `Clone`/`CloneOriginal` 都遵循这组流谱系不变式。

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{codes, CoreError, ErrorCategory};
use crate::ids::StreamId;

/// 消息来源的不透明标识：仅用于日志/指标打点，不参与序列化（wire format
/// 字段列表中不包含 `source`）。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceRef(Arc<str>);

impl SourceRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// 元数据：保持插入顺序的字符串→字节序列映射。
///
/// `HashMap` 会丢失顺序，`BTreeMap` 会按键重排；两者都不满足"插入顺序
/// 保留"的要求，这里用一个线性 `Vec` 承载，写路径在 `set` 时原地覆盖已存在
/// 的键以保持其原始位置。对日志消息典型的个位数到几十个字段规模，线性扫描
/// 的常数因子远小于引入一个顺序保持哈希表依赖的复杂度。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMap(Vec<(String, Vec<u8>)>);

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// 设置字段值；若键已存在则原地覆盖（保留位置），否则追加到末尾。
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// `FreezeOriginal` 捕获的一次性快照：载荷、元数据、当时的流 ID。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalSnapshot {
    pub payload: Vec<u8>,
    pub metadata: MetadataMap,
    pub stream_id: u64,
}

/// 线序单调时钟：进程内第一次访问时锚定起点，后续返回相对纳秒数。
///
/// `timestamp` 是"单调 int64 纳秒"；使用 `Instant` 而非
/// `SystemTime` 可以避免系统时钟回拨导致消息时间戳倒退。
fn monotonic_nanos() -> i64 {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as i64
}

/// 数据面的核心消息类型。不提供共享所有权：一个 `Message` 在任意时刻只被
/// 一个组件持有；经由队列或函数调用传递即视为所有权转移，`clone()` 是获得
/// 独立副本的唯一方式。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    payload: Vec<u8>,
    metadata: MetadataMap,
    stream_id: u64,
    prev_stream_id: u64,
    orig_stream_id: u64,
    timestamp: i64,
    sequence: u64,
    #[serde(skip)]
    source: Option<SourceRef>,
    original: Option<OriginalSnapshot>,
}

impl Message {
    /// 构造一条新消息。`stream_id` 是初始目的流；`prevStreamID`/`origStreamID`
    /// 初始均为 `Invalid`，直至分别被 `SetStreamID`/`FreezeOriginal` 修改。
    pub fn new(payload: impl Into<Vec<u8>>, stream_id: StreamId, sequence: u64, source: Option<SourceRef>) -> Self {
        Self {
            payload: payload.into(),
            metadata: MetadataMap::new(),
            stream_id: stream_id.as_u64(),
            prev_stream_id: StreamId::INVALID.as_u64(),
            orig_stream_id: StreamId::INVALID.as_u64(),
            timestamp: monotonic_nanos(),
            sequence,
            source,
            original: None,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn store_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.payload = payload.into();
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    pub fn stream_id(&self) -> StreamId {
        StreamId::from_raw(self.stream_id)
    }

    pub fn prev_stream_id(&self) -> StreamId {
        StreamId::from_raw(self.prev_stream_id)
    }

    pub fn orig_stream_id(&self) -> StreamId {
        StreamId::from_raw(self.orig_stream_id)
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    /// 切换目的流，并把旧值记入 `prevStreamID`。
    pub fn set_stream_id(&mut self, id: StreamId) {
        self.prev_stream_id = self.stream_id;
        self.stream_id = id.as_u64();
    }

    /// 捕获当前载荷/元数据/流 ID 作为原始快照。幂等：第二次及之后的调用
    /// 是空操作。
    pub fn freeze_original(&mut self) {
        if self.original.is_some() {
            return;
        }
        self.orig_stream_id = self.stream_id;
        self.original = Some(OriginalSnapshot {
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            stream_id: self.stream_id,
        });
    }

    /// 返回一条以原始快照（若存在，否则当前值）为内容的新消息，`origStreamID`
    /// 随之设置。
    pub fn clone_original(&self) -> Message {
        match &self.original {
            Some(snapshot) => Message {
                payload: snapshot.payload.clone(),
                metadata: snapshot.metadata.clone(),
                stream_id: snapshot.stream_id,
                prev_stream_id: self.stream_id,
                orig_stream_id: snapshot.stream_id,
                timestamp: monotonic_nanos(),
                sequence: self.sequence,
                source: self.source.clone(),
                original: None,
            },
            None => Message {
                payload: self.payload.clone(),
                metadata: self.metadata.clone(),
                stream_id: self.stream_id,
                prev_stream_id: self.stream_id,
                orig_stream_id: self.stream_id,
                timestamp: monotonic_nanos(),
                sequence: self.sequence,
                source: self.source.clone(),
                original: None,
            },
        }
    }

    /// 将消息编码为自描述的线格式（JSON），满足
    /// `Deserialize(Serialize(m)) ≡ m` 的往返要求。
    pub fn serialize(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| {
            CoreError::new(codes::SERIALIZATION_FAILED, "failed to encode message")
                .with_category(ErrorCategory::NonRetryable)
                .with_cause(e)
        })
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Message, CoreError> {
        serde_json::from_slice(bytes).map_err(|e| {
            CoreError::new(codes::SERIALIZATION_FAILED, "failed to decode message")
                .with_category(ErrorCategory::NonRetryable)
                .with_cause(e)
        })
    }
}
