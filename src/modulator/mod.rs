//! Modulator 链：Filter + Formatter 组合成三态裁决。
//!
//! # 设计背景（Why）
//! - 过滤与格式化是流水线中最常见的两类变换，但对外层（Router/Sink）而言
//!   只需要关心一个统一的三态结果：继续、改道、丢弃。把 `Filter`/`Formatter`
//!   分别包装成 `Modulator`，上层代码不必区分两者的具体语义。
//! - `ModulatorArray` 短路求值：第一个非 `Continue` 的结果立即返回，既是
//!   性能优化，也是正确性要求——一旦链路判定改道或丢弃，后续 Modulator
//!   不得被调用。

pub mod filter;
pub mod formatter;

use async_trait::async_trait;

use crate::message::Message;

pub use filter::{Filter, FilterVerdict};
pub use formatter::{FieldSelector, Formatter};

/// Modulator 的三态裁决。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModulatorVerdict {
    /// 继续交给链中的下一个 Modulator（或最终的 Sink/Router 处理）。
    Continue,
    /// 改道：消息应重新经由 `msg.stream_id()` 对应的 Router 路由。
    Fallback,
    /// 丢弃：消息不再继续流转。
    Discard,
}

/// 流水线中的一个变换步骤。
#[async_trait]
pub trait Modulator: Send + Sync {
    async fn modulate(&self, msg: &mut Message) -> ModulatorVerdict;
}

/// 按顺序应用的 Modulator 链；空链返回 `Continue`。
#[derive(Default)]
pub struct ModulatorArray {
    steps: Vec<Box<dyn Modulator>>,
}

impl ModulatorArray {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn push(&mut self, modulator: Box<dyn Modulator>) -> &mut Self {
        self.steps.push(modulator);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 依次调用每个 Modulator；第一个非 `Continue` 的结果短路返回。
    pub async fn modulate(&self, msg: &mut Message) -> ModulatorVerdict {
        for step in &self.steps {
            match step.modulate(msg).await {
                ModulatorVerdict::Continue => continue,
                other => return other,
            }
        }
        ModulatorVerdict::Continue
    }
}
