//! `StreamId`：流名称的 64 位 FNV-1a 哈希契约。
//!
//! # 设计背景（Why）
//! - 运行时需要频繁比较、哈希与在 `DashMap` 中按键查找流，使用定长整数
//!   远比直接比较字符串高效；
//! - FNV-1a 足够快且分布均匀，是固定的哈希算法选择，本 crate 不引入
//!   额外的哈希依赖（`sha2` 等）：算法本身是一处硬性契约，必须可独立验证。
//!
//! # 契约说明（What）
//! - `StreamId::from_name` 对名称的 UTF-8 字节做 FNV-1a/64 运算，纯函数、无副作用；
//! - 四个保留值（`INVALID`/`WILDCARD`/`LOG_INTERNAL`/`TRACE_INTERNAL`）必须
//!   对应各自保留名称的哈希，调用方不得为业务流重新使用这些哈希值。

use std::fmt;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// 流标识：流名称字节串的 FNV-1a/64 哈希。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u64);

impl StreamId {
    /// 空字符串的哈希，表示"无效流"。
    pub const INVALID: StreamId = StreamId(fnv1a(b""));
    /// `"*"` 的哈希，表示"所有非内部流"。
    pub const WILDCARD: StreamId = StreamId(fnv1a(b"*"));
    /// `"_GOLLUM_"` 的哈希，承载日志事件的内部流。
    pub const LOG_INTERNAL: StreamId = StreamId(fnv1a(b"_GOLLUM_"));
    /// `"_TRACE_"` 的哈希，承载可选的追踪事件。
    pub const TRACE_INTERNAL: StreamId = StreamId(fnv1a(b"_TRACE_"));

    /// 对任意流名称做 FNV-1a/64 运算。纯函数，等价于重复调用 [`Self::from_name`]
    /// 始终返回相同结果。
    pub fn from_name(name: &str) -> Self {
        StreamId(fnv1a(name.as_bytes()))
    }

    /// 返回底层的原始 64 位哈希值，供序列化与跨进程传输使用。
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// 从原始哈希值重建 `StreamId`（反序列化路径使用）。
    pub fn from_raw(raw: u64) -> Self {
        StreamId(raw)
    }

    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }

    pub fn is_internal(self) -> bool {
        self == Self::LOG_INTERNAL || self == Self::TRACE_INTERNAL
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

const fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// 保留流名称，供注册表反查与配置校验使用。
pub mod reserved {
    pub const INVALID: &str = "";
    pub const WILDCARD: &str = "*";
    pub const LOG_INTERNAL: &str = "_GOLLUM_";
    pub const TRACE_INTERNAL: &str = "_TRACE_";
    pub const LEGACY_DROPPED: &str = "_DROPPED_";
}
