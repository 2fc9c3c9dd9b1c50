//! 错误分层契约：`ImplError → DomainError → CoreError`。
//!
//! # 设计背景（Why）
//! - 数据面跨越队列、批量累积器、Modulator 链与 Sink 状态机等多个子系统，
//!   若各处自行定义错误类型，可观测性系统将无法统一聚合与告警。
//! - 实现细节（`ImplError`）向上折叠为领域语义（`DomainError`），最终统一
//!   为携带稳定错误码的 `CoreError`，保持 `source()` 链完整可追溯。
//!
//! # 契约说明（What）
//! - 所有错误码遵循 `<领域>.<语义>` 命名约定，定义在 [`codes`] 模块中；
//! - `ErrorCategory` 供 Sink 状态机与 Route 分发器据此做自动化决策
//!   （重试、预算耗尽、路由环路等），而不必解析错误消息字符串。

use std::borrow::Cow;
use std::fmt;

pub mod codes {
    //! 稳定错误码集合，供日志聚合与自动化策略引用。

    pub const QUEUE_CLOSED: &str = "queue.closed";
    pub const QUEUE_TIMEOUT: &str = "queue.timeout";
    pub const QUEUE_DISCARD: &str = "queue.discard";
    pub const BATCH_CLOSED: &str = "batch.closed";
    pub const BATCH_FULL: &str = "batch.full";
    pub const MODULATOR_FAILED: &str = "modulator.failed";
    pub const ROUTE_LOOP: &str = "route.loop";
    pub const ROUTE_BAD_VERDICT: &str = "route.bad_verdict";
    pub const ROUTER_SINK_TIMEOUT: &str = "router.sink_timeout";
    pub const SINK_PANIC: &str = "sink.panic";
    pub const SINK_SHUTDOWN_OVERRUN: &str = "sink.shutdown_overrun";
    pub const SERIALIZATION_FAILED: &str = "message.serialization_failed";
    pub const CONFIG_MISSING_KEY: &str = "config.missing_key";
    pub const CONFIG_TYPE_MISMATCH: &str = "config.type_mismatch";
}

/// 驱动自动化容错策略的结构化错误分类。
///
/// Sink 的 Enqueue 预检（§4.6）与 Route 分发器（§4.4）依据该分类决定是否
/// 转入 `Waiting` 状态、触发 Fallback，还是把错误原样向上抛出。
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    Retryable,
    NonRetryable,
    ResourceExhausted,
    Timeout,
    Cancelled,
    RoutingLoop,
    ProtocolViolation,
}

pub type ErrorCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 核心错误：稳定错误码 + 人类可读消息 + 可选根因。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    category: ErrorCategory,
    cause: Option<ErrorCause>,
}

impl CoreError {
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            category: ErrorCategory::NonRetryable,
            cause: None,
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category.clone()
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// 域层错误：在核心错误之上附带子系统分类，便于评审者快速定位责任边界。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DomainErrorKind {
    Queue,
    Batch,
    Modulator,
    Router,
    Sink,
    Source,
    Message,
    Config,
}

#[derive(Debug)]
pub struct DomainError {
    kind: DomainErrorKind,
    core: CoreError,
}

impl DomainError {
    pub fn new(kind: DomainErrorKind, core: CoreError) -> Self {
        Self { kind, core }
    }

    pub fn kind(&self) -> DomainErrorKind {
        self.kind
    }

    pub fn core(&self) -> &CoreError {
        &self.core
    }

    pub fn into_core(self) -> CoreError {
        self.core
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.core)
    }
}

impl std::error::Error for DomainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.core as &dyn std::error::Error)
    }
}

/// 实现层错误：包装领域错误并附带实现细节，通常只在日志中展开。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ImplErrorKind {
    Io,
    StateViolation,
    Timeout,
    Uncategorized,
}

#[derive(Debug)]
pub struct ImplError {
    kind: ImplErrorKind,
    domain: DomainError,
    detail: Option<Cow<'static, str>>,
}

impl ImplError {
    pub fn new(kind: ImplErrorKind, domain: DomainError) -> Self {
        Self { kind, domain, detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<Cow<'static, str>>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> ImplErrorKind {
        self.kind
    }

    pub fn into_domain(self) -> DomainError {
        self.domain
    }
}

impl fmt::Display for ImplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({})", self.domain, detail),
            None => write!(f, "{}", self.domain),
        }
    }
}

impl std::error::Error for ImplError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.domain as &dyn std::error::Error)
    }
}

/// 框架统一的返回值别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
