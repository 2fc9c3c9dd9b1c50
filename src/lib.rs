#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "logrelay-core：可插拔、高吞吐的日志/事件路由守护进程核心数据面契约。"]
#![doc = ""]
#![doc = "== 范围声明 =="]
#![doc = "本 crate 只承载进程内数据面：Message 模型、有界队列、批量累积器、"]
#![doc = "Modulator 链、Stream 注册表与 Route 分发器、Source/Sink 基座与生命周期。"]
#![doc = "具体的网络/文件插件、YAML 配置解析、指标传输与进程监督器不在本 crate 范围内，"]
#![doc = "调用方应在系统边界自行接入（参见 `config::ConfigReader`、`observability` 模块）。"]

/// 框架级错误分层（`CoreError` / `DomainError` / `ImplError`）与稳定错误码。
pub mod error;
/// `StreamID` 与保留流名称的哈希契约。
pub mod ids;
/// `Message` 数据模型：载荷、元数据、流谱系与原始快照。
pub mod message;
/// 有界消息队列（阻塞 / 非阻塞 / 限时 Push）。
pub mod queue;
/// 双缓冲无锁累积器，供批量 Sink 使用。
pub mod batch;
/// Modulator 链：Filter、Formatter 与三态裁决。
pub mod modulator;
/// Stream 注册表与 Route() 分发器。
pub mod registry;
/// Router 基座与广播实现。
pub mod router;
/// Source 基座：控制回路、Ticker 回路与 Emit。
pub mod source;
/// Sink 基座层级：状态机、直连 / 缓冲 / 批量变体。
pub mod sink;
/// 可观测性外观：结构化日志与指标。
pub mod observability;
/// 类型化配置读取契约（配置加载器本身不在范围内）。
pub mod config;
/// 常用类型的一站式导入。
pub mod prelude;

pub use error::{CoreError, DomainError, ErrorCategory, ImplError, Result};
pub use ids::StreamId;
pub use message::Message;
